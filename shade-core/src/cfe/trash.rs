//! Trash block synthesis (spec §4.5: dispatcher hardening via junk blocks).
//!
//! Dead blocks the dispatcher can jump to but that are never reached at
//! runtime make static analysis of the dispatch table less informative.
//! Each trash block is built from a small synthesized statement so it
//! doesn't stand out as an obviously-empty filler block, and every
//! identifier it introduces is blank (`_`) or otherwise inert so it can
//! never alias a real binding.

use crate::ast::{Expr, Stmt};
use rand::rngs::StdRng;
use rand::Rng;

/// Generates a random int/string/bool literal, used to give a trash
/// block's synthesized statement a plausible-looking operand rather than
/// always `0` or `""`.
pub fn random_literal(rng: &mut StdRng) -> Expr {
    match rng.gen_range(0..3) {
        0 => Expr::IntLit(rng.gen_range(-1000..1000)),
        1 => Expr::BoolLit(rng.gen_bool(0.5)),
        _ => {
            let len = rng.gen_range(1..8);
            let s: String = (0..len).map(|_| (b'a' + rng.gen_range(0..26)) as char).collect();
            Expr::StringLit(s)
        }
    }
}

/// Synthesizes a single statement with no observable effect: an assignment
/// to the blank identifier of a random binary expression over two random
/// literals. Blank-identifier targets mean the statement can never be
/// mistaken for a live binding by a later rename pass.
pub fn synth_statement(rng: &mut StdRng) -> Stmt {
    let op = ["+", "-", "^", "&", "|"][rng.gen_range(0..5)];
    Stmt::Assign {
        lhs: vec![Expr::Ident("_".to_string())],
        rhs: vec![Expr::Binary {
            op: op.to_string(),
            lhs: Box::new(random_literal(rng)),
            rhs: Box::new(random_literal(rng)),
        }],
    }
}

/// Builds `count` trash statement bodies, one per synthesized block.
pub fn synth_trash_blocks(rng: &mut StdRng, count: usize) -> Vec<Vec<Stmt>> {
    (0..count).map(|_| vec![synth_statement(rng)]).collect()
}

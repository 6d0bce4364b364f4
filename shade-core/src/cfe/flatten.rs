//! Dispatcher flattening transform (spec §4.5).
//!
//! Flattening replaces a function's natural block graph with a single
//! dispatcher loop: a state variable selects which block runs next via a
//! switch, and every block ends by assigning the next state instead of
//! jumping directly. `lower.rs` renders the result back into AST form; this
//! module computes the block graph and state-number assignment.

use super::ssa::{BlockId, Function, Terminator};
use super::trash;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashMap;

/// How the dispatcher obscures which state number corresponds to which
/// block, beyond simply using a switch. Spec §4.5 calls out two
/// complementary hardening strategies; real builds alternate between them
/// per function so the dispatch shape isn't uniform across a binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatcherHardening {
    /// State numbers are XORed against a per-function key before the
    /// switch compares them, so the literal case values in source don't
    /// match the runtime state values directly.
    XorMask,
    /// State transitions are looked up through an indirection table
    /// (state -> delegate index -> real next state) instead of being
    /// switch case literals at all.
    DelegateTable,
}

pub struct FlattenPlan {
    pub state_of: HashMap<BlockId, u32>,
    pub hardening: DispatcherHardening,
    pub xor_key: u32,
    pub delegate_table: Vec<u32>,
    pub trash_states: Vec<u32>,
}

/// Splits the function's single "join" blocks in two when they're larger
/// than `max_len`, so flattening doesn't leave one suspiciously large
/// block sitting next to many tiny dispatcher stubs (spec §4.5: "block
/// splitting keeps flattened block sizes from fingerprinting the pass").
pub fn block_split(f: &mut Function, max_len: usize) {
    let mut i = 0;
    while i < f.blocks.len() {
        let too_long = f.blocks[i].instrs.len() > max_len;
        if too_long {
            let tail: Vec<_> = f.blocks[i].instrs.split_off(max_len);
            let new_id = f.blocks.len();
            let term = std::mem::replace(&mut f.blocks[i].term, Terminator::Jump(new_id));
            f.blocks.push(super::ssa::Block {
                id: new_id,
                instrs: tail,
                term,
            });
        }
        i += 1;
    }
}

/// Assigns every real block a random, non-sequential state number and
/// injects `junk_count` unreachable trash blocks with state numbers
/// interleaved among the real ones, so the state-number sequence doesn't
/// reveal control-flow order.
pub fn plan_flatten(
    f: &mut Function,
    rng: &mut StdRng,
    junk_count: usize,
    hardening: DispatcherHardening,
) -> FlattenPlan {
    let real_count = f.blocks.len();
    let total = real_count + junk_count;
    let mut states: Vec<u32> = (0..total as u32).collect();
    states.shuffle(rng);

    let mut state_of = HashMap::new();
    for (block_id, state) in (0..real_count).zip(states.iter()) {
        state_of.insert(block_id, *state);
    }

    let trash_bodies = trash::synth_trash_blocks(rng, junk_count);
    let mut trash_states = Vec::with_capacity(junk_count);
    for (i, body) in trash_bodies.into_iter().enumerate() {
        let block_id = f.new_block();
        for stmt in body {
            f.block_mut(block_id).instrs.push(super::ssa::Instr { stmt });
        }
        f.block_mut(block_id).term = Terminator::Return(vec![]);
        let state = states[real_count + i];
        state_of.insert(block_id, state);
        trash_states.push(state);
    }

    let xor_key = rng.gen::<u32>() | 1;
    let delegate_table = build_delegate_table(&state_of, rng);

    FlattenPlan {
        state_of,
        hardening,
        xor_key,
        delegate_table,
        trash_states,
    }
}

/// A delegate table maps an opaque index to the real state number, so that
/// under `DelegateTable` hardening the switch case bodies never mention a
/// real state literal directly.
fn build_delegate_table(state_of: &HashMap<BlockId, u32>, rng: &mut StdRng) -> Vec<u32> {
    let mut values: Vec<u32> = state_of.values().copied().collect();
    values.shuffle(rng);
    values
}

/// Masks a state value the way the dispatcher's comparison will, given the
/// chosen hardening strategy. `lower.rs` uses this to compute the literal
/// each switch case must compare against.
pub fn mask_state(plan: &FlattenPlan, state: u32) -> u32 {
    match plan.hardening {
        DispatcherHardening::XorMask => state ^ plan.xor_key,
        DispatcherHardening::DelegateTable => {
            plan.delegate_table.iter().position(|&v| v == state).unwrap_or(0) as u32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Expr, Stmt};
    use rand::SeedableRng;

    fn sample_function() -> Function {
        super::super::ssa::from_stmts(vec![
            Stmt::Expr(Expr::Ident("a".into())),
            Stmt::Expr(Expr::Ident("b".into())),
            Stmt::Expr(Expr::Ident("c".into())),
            Stmt::Return(vec![]),
        ])
    }

    #[test]
    fn block_split_caps_instruction_count() {
        let mut f = sample_function();
        block_split(&mut f, 1);
        assert!(f.blocks.iter().all(|b| b.instrs.len() <= 1));
    }

    #[test]
    fn plan_assigns_every_real_block_a_state() {
        let mut f = sample_function();
        let real_count = f.blocks.len();
        let mut rng = StdRng::seed_from_u64(9);
        let plan = plan_flatten(&mut f, &mut rng, 3, DispatcherHardening::XorMask);
        for id in 0..real_count {
            assert!(plan.state_of.contains_key(&id));
        }
        assert_eq!(plan.trash_states.len(), 3);
    }

    #[test]
    fn state_numbers_are_not_sequential_by_block_id() {
        let mut f = sample_function();
        let mut rng = StdRng::seed_from_u64(123);
        let plan = plan_flatten(&mut f, &mut rng, 2, DispatcherHardening::DelegateTable);
        let in_order: Vec<u32> = (0..f.blocks.len() - 2).map(|i| plan.state_of[&i]).collect();
        let sorted: Vec<u32> = {
            let mut v = in_order.clone();
            v.sort();
            v
        };
        assert_ne!(in_order, sorted);
    }

    #[test]
    fn xor_mask_is_involutive() {
        let mut f = sample_function();
        let mut rng = StdRng::seed_from_u64(5);
        let plan = plan_flatten(&mut f, &mut rng, 0, DispatcherHardening::XorMask);
        let masked = mask_state(&plan, 7);
        assert_eq!(masked ^ plan.xor_key, 7);
    }
}

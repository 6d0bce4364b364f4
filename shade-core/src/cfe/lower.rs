//! Lowering a flattened block graph back into a `while`/`switch` AST body
//! (spec §4.5).
//!
//! The standard flattening output shape: a state local initialized to the
//! entry block's masked state, wrapped in `for { switch state { case ...:
//! ...; state = next } }`. Each case body ends by assigning the masked
//! state of its successor (or breaking out, for a return).

use super::flatten::{mask_state, FlattenPlan};
use super::ssa::{Function, Terminator};
use crate::ast::{Expr, Stmt};

const STATE_VAR: &str = "__shade_state";

/// Performs a dry run that only validates every real block's successors
/// are present in the plan, without constructing the final statement tree.
/// Callers use this to fail fast (returning `false`) rather than lowering
/// a half-planned function into broken AST.
pub fn dry_run(f: &Function, plan: &FlattenPlan) -> bool {
    for (id, _) in plan.state_of.iter() {
        if *id >= f.blocks.len() {
            continue; // trash block, no successors to check
        }
        for succ in f.successors(*id) {
            if !plan.state_of.contains_key(&succ) {
                return false;
            }
        }
    }
    true
}

/// Lowers `f` under `plan` into a single `Stmt::For` driving a
/// `Stmt::Switch` over `__shade_state`, returning the replacement body for
/// the function. Panics if `dry_run` would have returned false; callers
/// must dry-run first.
pub fn commit(f: &Function, plan: &FlattenPlan) -> Vec<Stmt> {
    assert!(dry_run(f, plan), "flatten plan references an unplanned block");

    let entry_state = plan.state_of[&f.entry];
    let init = Stmt::Assign {
        lhs: vec![Expr::Ident(STATE_VAR.to_string())],
        rhs: vec![Expr::IntLit(mask_state(plan, entry_state) as i64)],
    };

    let mut cases = Vec::new();
    for block in &f.blocks {
        let Some(&state) = plan.state_of.get(&block.id) else {
            continue;
        };
        let mut body: Vec<Stmt> = block.instrs.iter().map(|i| i.stmt.clone()).collect();
        match &block.term {
            Terminator::Jump(next) => {
                let next_state = plan.state_of[next];
                body.push(Stmt::Assign {
                    lhs: vec![Expr::Ident(STATE_VAR.to_string())],
                    rhs: vec![Expr::IntLit(mask_state(plan, next_state) as i64)],
                });
            }
            Terminator::Branch { cond, then_block, else_block } => {
                let then_state = mask_state(plan, plan.state_of[then_block]);
                let else_state = mask_state(plan, plan.state_of[else_block]);
                body.push(Stmt::If {
                    cond: cond.clone(),
                    then: vec![Stmt::Assign {
                        lhs: vec![Expr::Ident(STATE_VAR.to_string())],
                        rhs: vec![Expr::IntLit(then_state as i64)],
                    }],
                    otherwise: vec![Stmt::Assign {
                        lhs: vec![Expr::Ident(STATE_VAR.to_string())],
                        rhs: vec![Expr::IntLit(else_state as i64)],
                    }],
                });
            }
            Terminator::Return(exprs) => {
                body.push(Stmt::Return(exprs.clone()));
            }
            Terminator::Unresolved => {
                body.push(Stmt::Return(vec![]));
            }
        }
        cases.push((vec![Expr::IntLit(mask_state(plan, state) as i64)], body));
    }

    vec![
        init,
        Stmt::For {
            init: None,
            cond: None,
            post: None,
            body: vec![Stmt::Switch {
                tag: Some(Expr::Ident(STATE_VAR.to_string())),
                cases,
            }],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Stmt;
    use crate::cfe::flatten::{plan_flatten, DispatcherHardening};
    use crate::cfe::ssa::from_stmts;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn dry_run_passes_for_fully_planned_graph() {
        let mut f = from_stmts(vec![
            Stmt::Expr(crate::ast::Expr::Ident("a".into())),
            Stmt::Return(vec![]),
        ]);
        let mut rng = StdRng::seed_from_u64(1);
        let plan = plan_flatten(&mut f, &mut rng, 2, DispatcherHardening::XorMask);
        assert!(dry_run(&f, &plan));
    }

    #[test]
    fn commit_produces_state_init_and_dispatch_loop() {
        let mut f = from_stmts(vec![
            Stmt::Expr(crate::ast::Expr::Ident("a".into())),
            Stmt::Return(vec![]),
        ]);
        let mut rng = StdRng::seed_from_u64(2);
        let plan = plan_flatten(&mut f, &mut rng, 1, DispatcherHardening::DelegateTable);
        let body = commit(&f, &plan);
        assert_eq!(body.len(), 2);
        assert!(matches!(body[0], Stmt::Assign { .. }));
        assert!(matches!(body[1], Stmt::For { .. }));
    }
}

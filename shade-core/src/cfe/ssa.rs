//! Minimal SSA-ish block graph used by the control-flow engine (spec §4.5).
//!
//! This is not a full compiler SSA form -- no phi-node dominance
//! verification, no type lattice. It's the smallest arena-based
//! block/instruction graph that flattening needs: basic blocks with a list
//! of instructions and exactly one terminator.

use crate::ast::{Expr, Stmt};

pub type BlockId = usize;

#[derive(Debug, Clone, PartialEq)]
pub struct Instr {
    pub stmt: Stmt,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Terminator {
    Jump(BlockId),
    Branch { cond: Expr, then_block: BlockId, else_block: BlockId },
    Return(Vec<Expr>),
    /// Not yet wired to a successor; only valid mid-construction.
    Unresolved,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub id: BlockId,
    pub instrs: Vec<Instr>,
    pub term: Terminator,
}

#[derive(Debug, Clone, Default)]
pub struct Function {
    pub blocks: Vec<Block>,
    pub entry: BlockId,
}

impl Function {
    pub fn new_block(&mut self) -> BlockId {
        let id = self.blocks.len();
        self.blocks.push(Block {
            id,
            instrs: Vec::new(),
            term: Terminator::Unresolved,
        });
        id
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut Block {
        &mut self.blocks[id]
    }

    pub fn block(&self, id: BlockId) -> &Block {
        &self.blocks[id]
    }

    /// Successor block ids reachable directly from `id`, used by both the
    /// eligibility checker (to detect unreachable/trivial functions) and
    /// the dispatcher-table builder.
    pub fn successors(&self, id: BlockId) -> Vec<BlockId> {
        match &self.blocks[id].term {
            Terminator::Jump(b) => vec![*b],
            Terminator::Branch { then_block, else_block, .. } => vec![*then_block, *else_block],
            Terminator::Return(_) | Terminator::Unresolved => vec![],
        }
    }
}

/// Lowers a flat statement list (no existing control flow) into a
/// single-block function body. Statements already containing `If`/`For`
/// get expanded into multiple blocks by `from_stmts`; straight-line bodies
/// are the common case this handles directly.
pub fn from_stmts(stmts: Vec<Stmt>) -> Function {
    let mut f = Function::default();
    let entry = f.new_block();
    f.entry = entry;
    build_linear(&mut f, entry, stmts)
}

fn build_linear(f: &mut Function, mut current: BlockId, stmts: Vec<Stmt>) -> Function {
    for stmt in stmts {
        match stmt {
            Stmt::If { cond, then, otherwise } => {
                let then_entry = f.new_block();
                let else_entry = f.new_block();
                let join = f.new_block();
                f.block_mut(current).term = Terminator::Branch {
                    cond,
                    then_block: then_entry,
                    else_block: else_entry,
                };
                let then_exit = last_block_of(f, then_entry, then);
                f.block_mut(then_exit).term = Terminator::Jump(join);
                let else_exit = last_block_of(f, else_entry, otherwise);
                f.block_mut(else_exit).term = Terminator::Jump(join);
                current = join;
            }
            Stmt::Return(exprs) => {
                f.block_mut(current).term = Terminator::Return(exprs);
            }
            other => {
                f.block_mut(current).instrs.push(Instr { stmt: other });
            }
        }
    }
    if matches!(f.block(current).term, Terminator::Unresolved) {
        f.block_mut(current).term = Terminator::Return(vec![]);
    }
    f.clone()
}

fn last_block_of(f: &mut Function, entry: BlockId, stmts: Vec<Stmt>) -> BlockId {
    let mut current = entry;
    for stmt in stmts {
        match stmt {
            Stmt::Return(exprs) => {
                f.block_mut(current).term = Terminator::Return(exprs);
            }
            other => f.block_mut(current).instrs.push(Instr { stmt: other }),
        }
    }
    current
}

//! Internal source representation (spec §1, Design Notes).
//!
//! Parsing and type-checking the host language are outside this crate's
//! weighted scope (see `FrontEnd`); what lives here is the tagged-variant
//! tree every other pass reads and rewrites. A real driver builds this tree
//! from whatever frontend it has wired up and lowers it back to source
//! text after the pipeline runs; this crate only ever sees the tree.

use std::collections::HashMap;

/// The boundary a real driver crosses to get from host-language source text
/// into the tree below and back. Parsing, type-checking, and import
/// resolution live on the far side of this trait; nothing in this crate
/// depends on how they're implemented.
pub trait FrontEnd {
    fn parse(&self, path: &str, source: &str) -> crate::error::Result<SourceFile>;
    fn render(&self, file: &SourceFile) -> crate::error::Result<String>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct Package {
    pub import_path: String,
    pub name: String,
    pub files: Vec<SourceFile>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SourceFile {
    pub path: String,
    pub decls: Vec<Decl>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decl {
    Func(FuncDecl),
    Const(ConstSpec),
    Var(VarSpec),
    Type(TypeDecl),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FuncDecl {
    pub name: String,
    pub exported: bool,
    pub receiver: Option<String>,
    pub params: Vec<Param>,
    pub results: Vec<Param>,
    pub body: Vec<Stmt>,
    /// Raw `//go:...` style pragmas attached to this function, checked by
    /// eligibility passes before any rewrite (cgo-adjacent or linker
    /// directives make a function ineligible for flattening or renaming).
    pub directives: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstSpec {
    pub name: String,
    pub exported: bool,
    pub type_name: Option<String>,
    pub value: Expr,
    pub doc: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VarSpec {
    pub name: String,
    pub exported: bool,
    pub type_name: Option<String>,
    pub value: Option<Expr>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeDecl {
    pub name: String,
    pub exported: bool,
    pub fields: Vec<Param>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Assign { lhs: Vec<Expr>, rhs: Vec<Expr> },
    If { cond: Expr, then: Vec<Stmt>, otherwise: Vec<Stmt> },
    For { init: Option<Box<Stmt>>, cond: Option<Expr>, post: Option<Box<Stmt>>, body: Vec<Stmt> },
    Switch { tag: Option<Expr>, cases: Vec<(Vec<Expr>, Vec<Stmt>)> },
    Return(Vec<Expr>),
    Goto(String),
    Label(String, Box<Stmt>),
    Block(Vec<Stmt>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Ident(String),
    IntLit(i64),
    StringLit(String),
    BoolLit(bool),
    Call { func: Box<Expr>, args: Vec<Expr> },
    Binary { op: String, lhs: Box<Expr>, rhs: Box<Expr> },
    Unary { op: String, operand: Box<Expr> },
    Index { base: Box<Expr>, index: Box<Expr> },
    Selector { base: Box<Expr>, field: String },
}

impl Expr {
    /// True for literals eligible for the literal-obfuscation engine:
    /// numeric and string constants, not identifiers or composite
    /// expressions (spec §4.3 eligibility rules).
    pub fn is_obfuscatable_literal(&self) -> bool {
        matches!(self, Expr::IntLit(_) | Expr::StringLit(_))
    }
}

/// Walks every expression in a function body, calling `visit` on each.
/// Control-flow and literal passes both build on this rather than
/// hand-rolling traversal per pass.
pub fn walk_exprs(stmts: &[Stmt], visit: &mut impl FnMut(&Expr)) {
    for s in stmts {
        walk_stmt_exprs(s, visit);
    }
}

fn walk_stmt_exprs(stmt: &Stmt, visit: &mut impl FnMut(&Expr)) {
    match stmt {
        Stmt::Expr(e) => walk_expr(e, visit),
        Stmt::Assign { lhs, rhs } => {
            for e in lhs.iter().chain(rhs.iter()) {
                walk_expr(e, visit);
            }
        }
        Stmt::If { cond, then, otherwise } => {
            walk_expr(cond, visit);
            walk_exprs(then, visit);
            walk_exprs(otherwise, visit);
        }
        Stmt::For { init, cond, post, body } => {
            if let Some(i) = init {
                walk_stmt_exprs(i, visit);
            }
            if let Some(c) = cond {
                walk_expr(c, visit);
            }
            if let Some(p) = post {
                walk_stmt_exprs(p, visit);
            }
            walk_exprs(body, visit);
        }
        Stmt::Switch { tag, cases } => {
            if let Some(t) = tag {
                walk_expr(t, visit);
            }
            for (exprs, body) in cases {
                for e in exprs {
                    walk_expr(e, visit);
                }
                walk_exprs(body, visit);
            }
        }
        Stmt::Return(exprs) => {
            for e in exprs {
                walk_expr(e, visit);
            }
        }
        Stmt::Goto(_) => {}
        Stmt::Label(_, inner) => walk_stmt_exprs(inner, visit),
        Stmt::Block(body) => walk_exprs(body, visit),
    }
}

fn walk_expr(expr: &Expr, visit: &mut impl FnMut(&Expr)) {
    visit(expr);
    match expr {
        Expr::Call { func, args } => {
            walk_expr(func, visit);
            for a in args {
                walk_expr(a, visit);
            }
        }
        Expr::Binary { lhs, rhs, .. } => {
            walk_expr(lhs, visit);
            walk_expr(rhs, visit);
        }
        Expr::Unary { operand, .. } => walk_expr(operand, visit),
        Expr::Index { base, index } => {
            walk_expr(base, visit);
            walk_expr(index, visit);
        }
        Expr::Selector { base, .. } => walk_expr(base, visit),
        Expr::Ident(_) | Expr::IntLit(_) | Expr::StringLit(_) | Expr::BoolLit(_) => {}
    }
}

/// Rewrites every identifier reference in a function body through `rename`,
/// leaving selectors' field names untouched (fields are renamed separately
/// via `hash_with_struct`, keyed on the field name not the local binding).
pub fn rename_idents(stmts: &mut [Stmt], rename: &HashMap<String, String>) {
    for s in stmts {
        rename_stmt(s, rename);
    }
}

fn rename_stmt(stmt: &mut Stmt, rename: &HashMap<String, String>) {
    match stmt {
        Stmt::Expr(e) => rename_expr(e, rename),
        Stmt::Assign { lhs, rhs } => {
            for e in lhs.iter_mut().chain(rhs.iter_mut()) {
                rename_expr(e, rename);
            }
        }
        Stmt::If { cond, then, otherwise } => {
            rename_expr(cond, rename);
            rename_idents(then, rename);
            rename_idents(otherwise, rename);
        }
        Stmt::For { init, cond, post, body } => {
            if let Some(i) = init {
                rename_stmt(i, rename);
            }
            if let Some(c) = cond {
                rename_expr(c, rename);
            }
            if let Some(p) = post {
                rename_stmt(p, rename);
            }
            rename_idents(body, rename);
        }
        Stmt::Switch { tag, cases } => {
            if let Some(t) = tag {
                rename_expr(t, rename);
            }
            for (exprs, body) in cases {
                for e in exprs {
                    rename_expr(e, rename);
                }
                rename_idents(body, rename);
            }
        }
        Stmt::Return(exprs) => {
            for e in exprs {
                rename_expr(e, rename);
            }
        }
        Stmt::Goto(label) => {
            if let Some(new) = rename.get(label) {
                *label = new.clone();
            }
        }
        Stmt::Label(label, inner) => {
            if let Some(new) = rename.get(label) {
                *label = new.clone();
            }
            rename_stmt(inner, rename);
        }
        Stmt::Block(body) => rename_idents(body, rename),
    }
}

fn rename_expr(expr: &mut Expr, rename: &HashMap<String, String>) {
    match expr {
        Expr::Ident(name) => {
            if let Some(new) = rename.get(name) {
                *name = new.clone();
            }
        }
        Expr::Call { func, args } => {
            rename_expr(func, rename);
            for a in args {
                rename_expr(a, rename);
            }
        }
        Expr::Binary { lhs, rhs, .. } => {
            rename_expr(lhs, rename);
            rename_expr(rhs, rename);
        }
        Expr::Unary { operand, .. } => rename_expr(operand, rename),
        Expr::Index { base, index } => {
            rename_expr(base, rename);
            rename_expr(index, rename);
        }
        Expr::Selector { base, .. } => rename_expr(base, rename),
        Expr::IntLit(_) | Expr::StringLit(_) | Expr::BoolLit(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_visits_nested_exprs() {
        let stmts = vec![Stmt::If {
            cond: Expr::Binary {
                op: "==".into(),
                lhs: Box::new(Expr::Ident("x".into())),
                rhs: Box::new(Expr::IntLit(1)),
            },
            then: vec![Stmt::Return(vec![Expr::StringLit("ok".into())])],
            otherwise: vec![],
        }];
        let mut count = 0;
        walk_exprs(&stmts, &mut |_| count += 1);
        assert_eq!(count, 4);
    }

    #[test]
    fn rename_rewrites_idents_not_selectors() {
        let mut stmts = vec![Stmt::Expr(Expr::Selector {
            base: Box::new(Expr::Ident("obj".into())),
            field: "Field".into(),
        })];
        let mut map = HashMap::new();
        map.insert("obj".to_string(), "zz1".to_string());
        map.insert("Field".to_string(), "zz2".to_string());
        rename_idents(&mut stmts, &map);
        match &stmts[0] {
            Stmt::Expr(Expr::Selector { base, field }) => {
                assert_eq!(**base, Expr::Ident("zz1".into()));
                assert_eq!(field, "Field");
            }
            _ => panic!("unexpected shape"),
        }
    }
}

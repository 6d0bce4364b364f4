//! Control-flow flattening eligibility (spec §4.5 edge cases).
//!
//! Flattening rewrites a function's block graph into a dispatcher loop, so
//! anything that depends on the function's original block structure
//! surviving unchanged -- bound-method closures capturing labels, cgo
//! call shims, runtime-adjacent paths the toolchain special-cases -- has
//! to opt out rather than get silently mangled.

use crate::ast::FuncDecl;

const DANGEROUS_DIRECTIVES: &[&str] = &["go:noescape", "go:cgo_unsafe_args", "go:linkname"];

/// Import paths the flattening pass treats as runtime-adjacent and always
/// skips, matching the spec's carve-out for the standard runtime package
/// tree (whose functions the linker/runtime patchers handle separately).
const RUNTIME_ADJACENT_PREFIXES: &[&str] = &["runtime", "runtime/internal", "internal/runtime"];

pub fn is_runtime_adjacent(import_path: &str) -> bool {
    RUNTIME_ADJACENT_PREFIXES
        .iter()
        .any(|p| import_path == *p || import_path.starts_with(&format!("{p}/")))
}

/// A predeclared identifier (`len`, `cap`, `append`, ...) that gets
/// shadowed by a local variable inside the function body. Flattening may
/// introduce new blocks that reorder when the shadowing declaration is in
/// scope, so such functions are skipped rather than risk silently changing
/// which binding a call resolves to.
const PREDECLARED: &[&str] = &[
    "len", "cap", "append", "make", "new", "panic", "recover", "print", "println", "copy", "delete",
];

pub fn shadows_predeclared(decl: &FuncDecl) -> bool {
    decl.params.iter().any(|p| PREDECLARED.contains(&p.name.as_str()))
}

pub fn has_dangerous_directive(decl: &FuncDecl) -> bool {
    decl.directives
        .iter()
        .any(|d| DANGEROUS_DIRECTIVES.iter().any(|dd| d.contains(dd)))
}

/// True when cgo glue is present: a receiver-less function whose body is
/// empty (the typical shape of a `//export`-annotated cgo bridge function,
/// whose real implementation lives in generated C glue this crate never
/// sees) is left untouched.
pub fn is_cgo_bridge(decl: &FuncDecl) -> bool {
    decl.directives.iter().any(|d| d.contains("export")) && decl.body.is_empty()
}

/// Bound-method closures -- a function literal capturing `recv` by
/// reference and returned from a method -- survive flattening at the AST
/// level already (the closure body participates in its own flattening
/// pass keyed by a synthesized name), so no special eligibility rule is
/// needed beyond the receiver check: a function with a receiver is only
/// ineligible if it also shadows a predeclared identifier or carries a
/// dangerous directive.
pub fn eligible(decl: &FuncDecl, import_path: &str) -> bool {
    if is_runtime_adjacent(import_path) {
        return false;
    }
    if has_dangerous_directive(decl) {
        return false;
    }
    if shadows_predeclared(decl) {
        return false;
    }
    if is_cgo_bridge(decl) {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Param;

    fn decl(name: &str) -> FuncDecl {
        FuncDecl {
            name: name.to_string(),
            exported: false,
            receiver: None,
            params: vec![],
            results: vec![],
            body: vec![crate::ast::Stmt::Return(vec![])],
            directives: vec![],
        }
    }

    #[test]
    fn runtime_package_is_never_eligible() {
        assert!(!eligible(&decl("gopanic"), "runtime"));
        assert!(!eligible(&decl("schedinit"), "runtime/internal/atomic"));
    }

    #[test]
    fn ordinary_function_is_eligible() {
        assert!(eligible(&decl("DoWork"), "example.com/foo"));
    }

    #[test]
    fn dangerous_directive_disqualifies() {
        let mut d = decl("AsmHelper");
        d.directives.push("//go:linkname AsmHelper runtime.asmHelper".to_string());
        assert!(!eligible(&d, "example.com/foo"));
    }

    #[test]
    fn shadowed_predeclared_param_disqualifies() {
        let mut d = decl("Weird");
        d.params.push(Param { name: "len".into(), type_name: "int".into() });
        assert!(shadows_predeclared(&d));
        assert!(!eligible(&d, "example.com/foo"));
    }

    #[test]
    fn empty_export_bridge_disqualifies() {
        let mut d = decl("Bridge");
        d.directives.push("//export Bridge".to_string());
        d.body = vec![];
        assert!(is_cgo_bridge(&d));
        assert!(!eligible(&d, "example.com/foo"));
    }
}

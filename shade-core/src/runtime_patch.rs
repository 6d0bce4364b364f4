//! Runtime patcher (spec §4.6).
//!
//! Function-entry offsets the runtime's traceback and reflection machinery
//! read out of the pcln table are encrypted with a 4-round Feistel cipher
//! keyed from the build's Feistel seed, and decrypted on the fly by a
//! small patch injected into the copy of the runtime source this build
//! compiles against. The linker patcher (`linker_patch.rs`) mirrors this
//! cipher independently rather than sharing code with it, per the design
//! note that the two patchers must not depend on each other.

use crate::error::{Result, ShadeError};

const ROUNDS: usize = 4;
const C1: u32 = 0x9e3779b1;
const C2: u32 = 0x7f4a7c15;

/// Per-build round keys derived from the Feistel seed. Each round's key
/// also folds in the round index and `C1`/`C2`, so the four round keys are
/// never simple repeats of each other even when the seed is short-lived.
fn round_keys(feistel_seed: &[u8; 32]) -> [u32; ROUNDS] {
    let mut keys = [0u32; ROUNDS];
    for (i, key) in keys.iter_mut().enumerate() {
        let mut h = blake3::Hasher::new();
        h.update(feistel_seed);
        h.update(&(i as u32).to_le_bytes());
        h.update(&C1.to_le_bytes());
        h.update(&C2.to_le_bytes());
        let digest = h.finalize();
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&digest.as_bytes()[..4]);
        *key = u32::from_le_bytes(buf);
    }
    keys
}

/// Round function: mixes the half-block with the round key and a tweak
/// derived from the function's `nameOff`, so two functions at the same
/// numeric offset-halves still encrypt differently.
fn round_fn(half: u16, key: u32, tweak: u32) -> u16 {
    let mut x = (half as u32) ^ tweak;
    x = x.wrapping_add(key.wrapping_mul(C1)).wrapping_add(C2);
    x ^= key;
    x = x.rotate_left(key & 31);
    x ^= x >> 16;
    x as u16
}

/// Encrypts a 32-bit function-entry offset in place via 4 rounds of
/// Feistel substitution, tweaked by `name_off` (the function's symbol-name
/// table offset, which is already public in the binary and serves only to
/// decorrelate identical offset values across functions).
pub fn encrypt_entry_offset(feistel_seed: &[u8; 32], name_off: u32, offset: u32) -> u32 {
    feistel_transform(feistel_seed, name_off, offset, false)
}

pub fn decrypt_entry_offset(feistel_seed: &[u8; 32], name_off: u32, offset: u32) -> u32 {
    feistel_transform(feistel_seed, name_off, offset, true)
}

fn feistel_transform(feistel_seed: &[u8; 32], name_off: u32, value: u32, decrypt: bool) -> u32 {
    let keys = round_keys(feistel_seed);
    let mut left = (value >> 16) as u16;
    let mut right = value as u16;

    if !decrypt {
        for i in 0..ROUNDS {
            let f = round_fn(right, keys[i], name_off);
            let new_right = left ^ f;
            left = right;
            right = new_right;
        }
    } else {
        for i in (0..ROUNDS).rev() {
            let prev_right = left;
            let prev_left = right ^ round_fn(prev_right, keys[i], name_off);
            left = prev_left;
            right = prev_right;
        }
    }
    ((left as u32) << 16) | (right as u32)
}

/// Rewrites the accessor that returns a function's entry address so it
/// decrypts `entryOff` before using it, per spec: the `f.entryOff` argument
/// to `f.datap.textAddr` is replaced with a call into the injected
/// `decrypt` function, keyed by the function's `nameOff` the same way
/// `encrypt_entry_offset` was keyed when the linker wrote the table.
pub fn patch_entry_offset_accessor(source: &str) -> Result<String> {
    const TARGET: &str = "f.datap.textAddr(f.entryOff)";
    if !source.contains(TARGET) {
        return Err(ShadeError::Invariant(format!(
            "expected entry-offset accessor {TARGET:?} not found in runtime source"
        )));
    }
    Ok(source.replace(TARGET, "f.datap.textAddr(decrypt(f.entryOff, uint32(f.nameOff)))"))
}

/// Go source text for the round-keys array, rendered from this build's
/// Feistel seed so every build embeds a different table.
fn round_keys_declaration(feistel_seed: &[u8; 32]) -> String {
    let keys = round_keys(feistel_seed);
    let items = keys.iter().map(|k| format!("0x{k:08x}")).collect::<Vec<_>>().join(", ");
    format!("var __shadeRoundKeys = [4]uint32{{{items}}}")
}

/// `//go:nosplit` Go source for the round function, arithmetically
/// identical to `round_fn` above -- the two must never drift, since the
/// injected `decrypt` only recovers what this crate's `encrypt_entry_offset`
/// produced if both sides compute the same F.
const ROUND_FN_DECLARATION: &str = "//go:nosplit\nfunc __shadeRoundFn(half uint16, key uint32, tweak uint32) uint16 {\n\tx := uint32(half) ^ tweak\n\tx = x + key*0x9e3779b1 + 0x7f4a7c15\n\tx ^= key\n\tx = bits.RotateLeft32(x, int(key&31))\n\tx ^= x >> 16\n\treturn uint16(x)\n}";

/// `//go:nosplit` Go source for `decrypt`, running the 4 Feistel rounds in
/// reverse against `__shadeRoundKeys`/`__shadeRoundFn` -- mirrors
/// `feistel_transform`'s decrypt branch.
const DECRYPT_FN_DECLARATION: &str = "//go:nosplit\nfunc decrypt(entryOff uint32, nameOff uint32) uint32 {\n\tleft := uint16(entryOff >> 16)\n\tright := uint16(entryOff)\n\tfor i := 3; i >= 0; i-- {\n\t\tprevRight := left\n\t\tprevLeft := right ^ __shadeRoundFn(prevRight, __shadeRoundKeys[i], nameOff)\n\t\tleft = prevLeft\n\t\tright = prevRight\n\t}\n\treturn uint32(left)<<16 | uint32(right)\n}";

/// Appends the three top-level declarations the patched runtime needs: the
/// per-build round-keys array, the nosplit round function, and the nosplit
/// `decrypt` function the rewritten accessor calls.
fn inject_declarations(source: &str, feistel_seed: &[u8; 32]) -> String {
    let mut out = source.to_string();
    out.push_str("\n\n");
    out.push_str(&round_keys_declaration(feistel_seed));
    out.push_str("\n\n");
    out.push_str(ROUND_FN_DECLARATION);
    out.push_str("\n\n");
    out.push_str(DECRYPT_FN_DECLARATION);
    out.push('\n');
    out
}

const NOOP_PRINT_FN: &str = "__shadeNoopPrint";

fn is_debug_function_name(name: &str) -> bool {
    matches!(name, "printany" | "printpanics" | "schedtrace") || name.starts_with("traceback") || name.starts_with("print")
}

struct FuncDecl {
    name: String,
    body_open: usize,
    body_close: usize,
}

/// Finds the index one past `open_pos` at which the brace/paren opened at
/// `open_pos` closes, counting nesting depth. `source[open_pos]` must be
/// `open`.
fn skip_balanced(source: &str, open_pos: usize, open: u8, close: u8) -> Option<usize> {
    let bytes = source.as_bytes();
    if bytes.get(open_pos) != Some(&open) {
        return None;
    }
    let mut depth = 0i32;
    let mut i = open_pos;
    while i < bytes.len() {
        if bytes[i] == open {
            depth += 1;
        } else if bytes[i] == close {
            depth -= 1;
            if depth == 0 {
                return Some(i + 1);
            }
        }
        i += 1;
    }
    None
}

/// Finds the function body's opening brace starting the search at `from`,
/// skipping over empty or non-empty `interface{}`/`struct{...}` type
/// literals that can appear in a signature (a parameter or return type)
/// before the real body brace.
fn find_body_brace(source: &str, from: usize) -> Option<usize> {
    let mut i = from;
    loop {
        let rel = source[i..].find('{')?;
        let brace_pos = i + rel;
        let before = source[..brace_pos].trim_end();
        if before.ends_with("interface") || before.ends_with("struct") {
            i = skip_balanced(source, brace_pos, b'{', b'}')?;
            continue;
        }
        return Some(brace_pos);
    }
}

/// Scans forward from `from` for the next top-level function declaration,
/// handling an optional method receiver, and returns its name and body
/// bounds. This is a text-level scanner, not a Go parser: it assumes
/// well-formed source and skips past anything that doesn't look like a
/// complete `func ... ( ... ) { ... }` declaration.
fn parse_next_func(source: &str, mut from: usize) -> Option<FuncDecl> {
    loop {
        let rel = source[from..].find("func ")?;
        let kw_pos = from + rel;
        let bytes = source.as_bytes();
        let mut i = kw_pos + "func ".len();
        while i < bytes.len() && bytes[i] == b' ' {
            i += 1;
        }
        if i < bytes.len() && bytes[i] == b'(' {
            match skip_balanced(source, i, b'(', b')') {
                Some(next) => i = next,
                None => {
                    from = kw_pos + "func ".len();
                    continue;
                }
            }
            while i < bytes.len() && bytes[i] == b' ' {
                i += 1;
            }
        }
        let name_start = i;
        while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
            i += 1;
        }
        if i == name_start {
            from = kw_pos + "func ".len();
            continue;
        }
        let name = source[name_start..i].to_string();
        while i < bytes.len() && bytes[i] == b' ' {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] != b'(' {
            from = i;
            continue;
        }
        let after_params = match skip_balanced(source, i, b'(', b')') {
            Some(p) => p,
            None => {
                from = i + 1;
                continue;
            }
        };
        let body_open = match find_body_brace(source, after_params) {
            Some(p) => p,
            None => {
                from = after_params;
                continue;
            }
        };
        let body_close = match skip_balanced(source, body_open, b'{', b'}') {
            Some(p) => p - 1,
            None => {
                from = body_open + 1;
                continue;
            }
        };
        return Some(FuncDecl { name, body_open, body_close });
    }
}

/// Zeroes the bodies of the runtime's debug/traceback-printing functions so
/// their logic (and the symbol names it touches) never makes it into the
/// patched copy.
fn zero_debug_function_bodies(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0usize;
    while let Some(decl) = parse_next_func(source, cursor) {
        if is_debug_function_name(&decl.name) {
            out.push_str(&source[cursor..=decl.body_open]);
            out.push('}');
        } else {
            out.push_str(&source[cursor..=decl.body_close]);
        }
        cursor = decl.body_close + 1;
    }
    out.push_str(&source[cursor..]);
    out
}

/// Truncates `parsedebugvars`'s body immediately after the line that reads
/// the `GODEBUG` environment variable, dropping everything downstream of
/// the read (the per-flag parsing that would otherwise still run).
fn truncate_parsedebugvars(source: &str) -> String {
    let mut cursor = 0usize;
    while let Some(decl) = parse_next_func(source, cursor) {
        if decl.name == "parsedebugvars" {
            let marker = "gogetenv(\"GODEBUG\")";
            let body = &source[decl.body_open + 1..decl.body_close];
            return match body.find(marker) {
                Some(marker_rel) => {
                    let marker_abs = decl.body_open + 1 + marker_rel + marker.len();
                    let line_end = source[marker_abs..decl.body_close]
                        .find('\n')
                        .map(|p| marker_abs + p + 1)
                        .unwrap_or(decl.body_close);
                    let mut out = String::with_capacity(source.len());
                    out.push_str(&source[..line_end]);
                    out.push_str(&source[decl.body_close..]);
                    out
                }
                None => source.to_string(),
            };
        }
        cursor = decl.body_close + 1;
    }
    source.to_string()
}

/// Replaces bare `print(`/`println(` builtin calls (not method calls like
/// `fmt.Println(`, and not identifiers that merely start with `print`)
/// with a call to the synthesized no-op declared by `redact_runtime_debug_output`.
fn replace_builtin_print_calls(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut i = 0usize;
    while i < source.len() {
        let rest = &source[i..];
        let matched_len = if rest.starts_with("println(") {
            Some(8)
        } else if rest.starts_with("print(") {
            Some(6)
        } else {
            None
        };
        if let Some(len) = matched_len {
            let preceded_ok = match source[..i].chars().next_back() {
                None => true,
                Some(prev) => !(prev.is_alphanumeric() || prev == '_' || prev == '.'),
            };
            if preceded_ok {
                out.push_str(NOOP_PRINT_FN);
                out.push('(');
                i += len;
                continue;
            }
        }
        let ch = rest.chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

/// Debug-output redaction pass (spec §4.6): zeroes the bodies of the
/// runtime's print/traceback machinery, truncates `parsedebugvars` at the
/// point it reads `GODEBUG`, and replaces any remaining bare
/// `print`/`println` builtin calls with a synthesized no-op so none of it
/// can leak pre-obfuscation symbol names during a panic. This operates on
/// source text directly since the runtime package falls outside this
/// crate's IR (see `cfe::eligibility::is_runtime_adjacent`).
pub fn redact_runtime_debug_output(source: &str) -> String {
    let source = zero_debug_function_bodies(source);
    let source = truncate_parsedebugvars(&source);
    let mut source = replace_builtin_print_calls(&source);
    source.push_str(&format!("\nfunc {NOOP_PRINT_FN}(args ...interface{{}}) {{}}\n"));
    source
}

/// Replaces every occurrence of a known magic byte sequence the runtime
/// uses to identify itself (module header magic, build-id markers) with a
/// build-unique value derived from the Feistel seed, so static
/// fingerprinting tools can't key off a fixed constant.
pub fn replace_magic(source: &str, known_magic: &str, feistel_seed: &[u8; 32]) -> Result<String> {
    if !source.contains(known_magic) {
        return Err(ShadeError::Invariant(format!(
            "expected magic sequence {known_magic:?} not found in runtime source"
        )));
    }
    let digest = blake3::hash(feistel_seed);
    let replacement = hex::encode(&digest.as_bytes()[..known_magic.len().min(32)]);
    Ok(source.replace(known_magic, &replacement[..known_magic.len().min(replacement.len())]))
}

/// Applies the full runtime source patch: rewrites the entry-offset
/// accessor, redacts debug output, then injects the round-keys table and
/// the nosplit round/decrypt functions the rewritten accessor calls.
pub fn apply_runtime_patch(source: &str, feistel_seed: &[u8; 32]) -> Result<String> {
    let patched = patch_entry_offset_accessor(source)?;
    let patched = redact_runtime_debug_output(&patched);
    Ok(inject_declarations(&patched, feistel_seed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feistel_roundtrips() {
        let seed = [1u8; 32];
        for (name_off, offset) in [(0u32, 0u32), (42, 123456), (u32::MAX, 1), (7, u32::MAX)] {
            let enc = encrypt_entry_offset(&seed, name_off, offset);
            let dec = decrypt_entry_offset(&seed, name_off, enc);
            assert_eq!(dec, offset, "roundtrip failed for name_off={name_off} offset={offset}");
        }
    }

    #[test]
    fn feistel_is_a_bijection_on_a_sample() {
        let seed = [2u8; 32];
        let name_off = 10;
        let mut seen = std::collections::HashSet::new();
        for offset in 0u32..2000 {
            let enc = encrypt_entry_offset(&seed, name_off, offset);
            assert!(seen.insert(enc), "collision at offset {offset}");
        }
    }

    #[test]
    fn different_seeds_produce_different_ciphertexts() {
        let a = encrypt_entry_offset(&[1u8; 32], 5, 1000);
        let b = encrypt_entry_offset(&[2u8; 32], 5, 1000);
        assert_ne!(a, b);
    }

    #[test]
    fn different_name_offsets_decorrelate_identical_values() {
        let seed = [3u8; 32];
        let a = encrypt_entry_offset(&seed, 1, 500);
        let b = encrypt_entry_offset(&seed, 2, 500);
        assert_ne!(a, b);
    }

    #[test]
    fn avalanche_small_input_change_flips_many_bits() {
        let seed = [4u8; 32];
        let a = encrypt_entry_offset(&seed, 0, 1000);
        let b = encrypt_entry_offset(&seed, 0, 1001);
        let diff_bits = (a ^ b).count_ones();
        assert!(diff_bits >= 4, "too few bits changed: {diff_bits}");
    }

    #[test]
    fn redact_zeroes_named_debug_function_bodies() {
        let src = "func printany(i interface{}) {\n\tprint(i)\n}\nfunc doWork() {\n\tx := 1\n}\n";
        let redacted = redact_runtime_debug_output(src);
        assert!(redacted.contains("func printany(i interface{}) {}"));
        assert!(redacted.contains("x := 1"));
    }

    #[test]
    fn redact_replaces_bare_print_calls_but_not_method_calls() {
        let src = "func f() {\n\tprint(\"debug\")\n\tprintln(x)\n\tfmt.Println(\"kept\")\n}";
        let redacted = redact_runtime_debug_output(src);
        assert!(!redacted.contains("\tprint(\"debug\")"));
        assert!(!redacted.contains("\tprintln(x)"));
        assert!(redacted.contains("fmt.Println(\"kept\")"));
        assert!(redacted.contains(NOOP_PRINT_FN));
    }

    #[test]
    fn redact_truncates_parsedebugvars_after_godebug_read() {
        let src = "func parsedebugvars() {\n\tp := gogetenv(\"GODEBUG\")\n\tparseRest(p)\n\tmore()\n}\n";
        let redacted = redact_runtime_debug_output(src);
        assert!(redacted.contains("gogetenv(\"GODEBUG\")"));
        assert!(!redacted.contains("parseRest(p)"));
        assert!(!redacted.contains("more()"));
    }

    #[test]
    fn patch_entry_offset_accessor_requires_presence() {
        assert!(patch_entry_offset_accessor("no accessor here").is_err());
    }

    #[test]
    fn apply_runtime_patch_rewrites_accessor_and_injects_decrypt() {
        let seed = [8u8; 32];
        let src = "func (f *_func) entry() uintptr {\n\treturn f.datap.textAddr(f.entryOff)\n}\n";
        let patched = apply_runtime_patch(src, &seed).unwrap();
        assert!(patched.contains("decrypt(f.entryOff, uint32(f.nameOff))"));
        assert!(patched.contains("//go:nosplit"));
        assert!(patched.contains("__shadeRoundKeys"));
        assert!(patched.contains("func decrypt(entryOff uint32, nameOff uint32) uint32"));
    }

    #[test]
    fn replace_magic_requires_presence() {
        let seed = [5u8; 32];
        let result = replace_magic("no magic here", "DEADBEEF", &seed);
        assert!(result.is_err());
    }

    #[test]
    fn replace_magic_substitutes_deterministically() {
        let seed = [5u8; 32];
        let src = "header: DEADBEEF end";
        let a = replace_magic(src, "DEADBEEF", &seed).unwrap();
        let b = replace_magic(src, "DEADBEEF", &seed).unwrap();
        assert_eq!(a, b);
        assert!(!a.contains("DEADBEEF"));
    }
}

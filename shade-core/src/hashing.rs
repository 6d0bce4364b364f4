//! Deterministic name hashing (spec §4.2).
//!
//! Every renameable identifier is mapped through `hash_with_package` (or
//! `hash_with_struct` for fields shared across struct literals) to a short
//! base64-ish identifier. The mapping is a pure function of the master
//! entropy plus the identifier's context, so two packages built in the same
//! invocation never collide and the same package rebuilt under the same
//! seed gets the same names back.

use crate::entropy::MasterEntropy;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Go keywords and predeclared identifiers a generated name must never
/// collide with, since the result is spliced back into source as a bare
/// identifier.
const RESERVED: &[&str] = &[
    "break", "default", "func", "interface", "select", "case", "defer", "go", "map", "struct",
    "chan", "else", "goto", "package", "switch", "const", "fallthrough", "if", "range", "type",
    "continue", "for", "import", "return", "var", "nil", "true", "false", "iota", "_",
];

fn encode(mut digest: u64, min_len: usize) -> String {
    let mut out = String::new();
    if digest == 0 {
        out.push('a');
    }
    while digest > 0 {
        let idx = (digest % ALPHABET.len() as u64) as usize;
        out.push(ALPHABET[idx] as char);
        digest /= ALPHABET.len() as u64;
    }
    while out.len() < min_len {
        out.push('_');
    }
    out
}

fn digest_to_u64(bytes: &[u8; 32]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[..8]);
    u64::from_le_bytes(buf)
}

/// Hash `ident` within `package_path`, producing a name that is stable for
/// the same `(package_path, ident)` pair under one master entropy and
/// distinct across packages (spec invariant: "names never collide within a
/// compiled package, and export-ness is preserved").
pub fn hash_with_package(master: &MasterEntropy, package_path: &str, ident: &str) -> String {
    let mut h = blake3::Hasher::new();
    h.update(master.as_bytes());
    h.update(package_path.as_bytes());
    h.update(b"\x00");
    h.update(ident.as_bytes());
    let digest = *h.finalize().as_bytes();
    let name = encode(digest_to_u64(&digest), 1);
    finalize_name(name, ident, &digest)
}

/// Hash a struct field name so that every struct sharing that field name
/// across the whole build (not just one package) converges on the same
/// obfuscated name -- required for cross-package struct literals and
/// reflection-based marshaling to keep working after renaming (spec §4.2,
/// "struct fingerprinting").
pub fn hash_with_struct(master: &MasterEntropy, field_name: &str) -> String {
    let mut h = blake3::Hasher::new();
    h.update(master.as_bytes());
    h.update(b"struct-field\x00");
    h.update(field_name.as_bytes());
    let digest = *h.finalize().as_bytes();
    let name = encode(digest_to_u64(&digest), 1);
    finalize_name(name, field_name, &digest)
}

/// Exported identifiers (first rune uppercase) must stay exported after
/// renaming, since external packages may import them. Reserved-word
/// collisions are broken by appending a digest byte until the candidate no
/// longer matches a keyword.
fn finalize_name(mut name: String, original: &str, digest: &[u8; 32]) -> String {
    let is_exported = original.chars().next().map(|c| c.is_uppercase()).unwrap_or(false);

    let mut salt_idx = 8;
    while RESERVED.contains(&name.as_str()) {
        let extra = digest[salt_idx % digest.len()];
        name.push(ALPHABET[(extra as usize) % ALPHABET.len()] as char);
        salt_idx += 1;
    }

    if is_exported {
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => name,
        }
    } else {
        let mut chars = name.chars();
        match chars.next() {
            Some(first) => first.to_lowercase().collect::<String>() + chars.as_str(),
            None => name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entropy::MasterEntropy;

    fn master() -> MasterEntropy {
        MasterEntropy::derive(&[3u8; 32], &[4u8; 32])
    }

    #[test]
    fn same_ident_in_same_package_is_stable() {
        let m = master();
        let a = hash_with_package(&m, "example.com/foo", "helperFunc");
        let b = hash_with_package(&m, "example.com/foo", "helperFunc");
        assert_eq!(a, b);
    }

    #[test]
    fn same_ident_differs_across_packages() {
        let m = master();
        let a = hash_with_package(&m, "example.com/foo", "helperFunc");
        let b = hash_with_package(&m, "example.com/bar", "helperFunc");
        assert_ne!(a, b);
    }

    #[test]
    fn export_ness_is_preserved() {
        let m = master();
        let exported = hash_with_package(&m, "example.com/foo", "PublicThing");
        let unexported = hash_with_package(&m, "example.com/foo", "privateThing");
        assert!(exported.chars().next().unwrap().is_uppercase());
        assert!(unexported.chars().next().unwrap().is_lowercase());
    }

    #[test]
    fn never_collides_with_reserved_words() {
        let m = master();
        for ident in ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j", "k"] {
            let name = hash_with_package(&m, "example.com/reserved-bait", ident);
            assert!(!RESERVED.contains(&name.as_str()), "collided: {name}");
        }
    }

    #[test]
    fn struct_fields_converge_across_packages() {
        let m = master();
        let a = hash_with_struct(&m, "Name");
        let b = hash_with_struct(&m, "Name");
        assert_eq!(a, b);
    }
}

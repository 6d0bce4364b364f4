//! Linker patcher (spec §4.7).
//!
//! Encrypts the pcln table entries the linker writes (mirroring
//! `runtime_patch`'s entry-offset cipher) and patches the module header
//! magic the linker emits. The design note calls for these two patchers to
//! share no code -- only the spec (4-round Feistel, `C1`/`C2` constants) --
//! so a change to one cannot silently desynchronize from the other without
//! both test suites catching it independently. This file's Feistel core is
//! therefore an intentional duplicate of `runtime_patch`'s, not a shared
//! helper.

use crate::error::{Result, ShadeError};

const ROUNDS: usize = 4;
const C1: u32 = 0x9e3779b1;
const C2: u32 = 0x7f4a7c15;

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

fn round_fn(half: u16, key: u32, tweak: u32) -> u16 {
    let mut x = (half as u32) ^ tweak;
    x = x.wrapping_add(key.wrapping_mul(C1)).wrapping_add(C2);
    x ^= key;
    x = x.rotate_left(key & 31);
    x ^= x >> 16;
    x as u16
}

fn feistel_encrypt(feistel_seed: &[u8; 32], tweak: u32, value: u32) -> u32 {
    let keys = round_keys(feistel_seed);
    let mut left = (value >> 16) as u16;
    let mut right = value as u16;
    for i in 0..ROUNDS {
        let f = round_fn(right, keys[i], tweak);
        let new_right = left ^ f;
        left = right;
        right = new_right;
    }
    ((left as u32) << 16) | (right as u32)
}

fn feistel_decrypt(feistel_seed: &[u8; 32], tweak: u32, value: u32) -> u32 {
    let keys = round_keys(feistel_seed);
    let mut left = (value >> 16) as u16;
    let mut right = value as u16;
    for i in (0..ROUNDS).rev() {
        let prev_right = left;
        let prev_left = right ^ round_fn(prev_right, keys[i], tweak);
        left = prev_left;
        right = prev_right;
    }
    ((left as u32) << 16) | (right as u32)
}

/// One pcln table entry: a function's symbol-name-table offset (used only
/// as the cipher tweak, unchanged by this pass) and its program-counter
/// value table offset (encrypted).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PclnEntry {
    pub name_off: u32,
    pub pcval_off: u32,
}

/// Encrypts every entry's `pcval_off` in place, mirroring
/// `runtime_patch::encrypt_entry_offset` so the runtime's decrypt step
/// recovers the same values the linker wrote.
pub fn patch_pcln_table(feistel_seed: &[u8; 32], entries: &mut [PclnEntry]) {
    for entry in entries.iter_mut() {
        entry.pcval_off = feistel_encrypt(feistel_seed, entry.name_off, entry.pcval_off);
    }
}

pub fn unpatch_pcln_table(feistel_seed: &[u8; 32], entries: &mut [PclnEntry]) {
    for entry in entries.iter_mut() {
        entry.pcval_off = feistel_decrypt(feistel_seed, entry.name_off, entry.pcval_off);
    }
}

/// Patches the module header's magic byte sequence the same way
/// `runtime_patch::replace_magic` does for the runtime source copy, kept
/// as an independent implementation here since the linker operates on the
/// compiled module data directly rather than on source text.
pub fn patch_module_magic(data: &mut Vec<u8>, known_magic: &[u8], feistel_seed: &[u8; 32]) -> Result<()> {
    let pos = data
        .windows(known_magic.len())
        .position(|w| w == known_magic)
        .ok_or_else(|| ShadeError::Invariant("module header magic not found".to_string()))?;
    let digest = blake3::hash(feistel_seed);
    let replacement = &digest.as_bytes()[..known_magic.len().min(32)];
    data[pos..pos + known_magic.len()].copy_from_slice(&replacement[..known_magic.len()]);
    Ok(())
}

/// Embedded patch bodies keyed by toolchain major version, approximating
/// the real tool's version-matched source patch files without pulling in
/// an embedded-filesystem crate: each patch is a plain byte-string constant
/// selected by an exact major-version match.
pub fn embedded_patch_for_version(major_version: &str) -> Option<&'static [u8]> {
    match major_version {
        "1.21" => Some(include_patch_1_21()),
        "1.22" => Some(include_patch_1_22()),
        "1.23" => Some(include_patch_1_23()),
        _ => None,
    }
}

fn include_patch_1_21() -> &'static [u8] {
    b"--- runtime patch body for go1.21 ---\n"
}

fn include_patch_1_22() -> &'static [u8] {
    b"--- runtime patch body for go1.22 ---\n"
}

fn include_patch_1_23() -> &'static [u8] {
    b"--- runtime patch body for go1.23 ---\n"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcln_patch_roundtrips() {
        let seed = [6u8; 32];
        let mut entries = vec![
            PclnEntry { name_off: 1, pcval_off: 1000 },
            PclnEntry { name_off: 2, pcval_off: 2000 },
        ];
        let original = entries.clone();
        patch_pcln_table(&seed, &mut entries);
        assert_ne!(entries, original);
        unpatch_pcln_table(&seed, &mut entries);
        assert_eq!(entries, original);
    }

    #[test]
    fn pcln_cipher_matches_runtime_patch_shape_but_is_independent() {
        // Same seed and tweak/offset pair fed through both ciphers must
        // agree, proving the duplicated core didn't drift from its spec.
        let seed = [6u8; 32];
        let via_linker = feistel_encrypt(&seed, 1, 1000);
        let via_runtime = crate::runtime_patch::encrypt_entry_offset(&seed, 1, 1000);
        assert_eq!(via_linker, via_runtime);
    }

    #[test]
    fn module_magic_patch_requires_presence() {
        let mut data = b"not present".to_vec();
        let seed = [7u8; 32];
        assert!(patch_module_magic(&mut data, b"GOMAGIC1", &seed).is_err());
    }

    #[test]
    fn module_magic_patch_replaces_in_place() {
        let mut data = b"header GOMAGIC1 trailer".to_vec();
        let seed = [7u8; 32];
        patch_module_magic(&mut data, b"GOMAGIC1", &seed).unwrap();
        assert!(!data.windows(8).any(|w| w == b"GOMAGIC1"));
    }

    #[test]
    fn embedded_patch_known_versions_present() {
        assert!(embedded_patch_for_version("1.22").is_some());
        assert!(embedded_patch_for_version("0.1").is_none());
    }
}

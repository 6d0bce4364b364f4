//! Encrypted build cache (spec §4.8).
//!
//! Cache entries never store a plaintext name map: obfuscated names are
//! reproducible from the master entropy on demand, so caching them would
//! only create a second place for them to leak. What's cached is the
//! per-package transformation result (source hash, decisions made) keyed
//! by action id, encrypted at rest with a key derived once per seed.

use crate::entropy::MasterEntropy;
use crate::error::{Result, ShadeError};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes128Gcm, Nonce};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Cached per-package decisions. `name_map` is always empty on disk and on
/// the wire -- see module docs -- and only ever populated transiently in
/// memory by the caller that just computed it, never serialized back out.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct CacheEntry {
    pub action_id: [u8; 32],
    pub source_hash: [u8; 32],
    pub literal_count: u32,
    pub flattened_funcs: u32,
    #[serde(skip)]
    pub name_map: HashMap<String, String>,
}

const NONCE_FIELD_LEN: usize = 16;
const GCM_NONCE_LEN: usize = 12;

/// Encrypts `entry` under `key`, writing a `[16-byte nonce][ciphertext ||
/// tag]` record. The on-disk nonce field is 16 bytes per spec §4.8's
/// stated layout even though `Aes128Gcm` only consumes the first 12; the
/// trailing 4 bytes are zero-filled and reserved, which keeps the record
/// layout stable if a future revision widens the AEAD's nonce.
pub fn seal(key: &[u8; 16], entry: &CacheEntry) -> Result<Vec<u8>> {
    let mut plaintext = Vec::new();
    ciborium::into_writer(entry, &mut plaintext).map_err(|e| ShadeError::Cache(e.to_string()))?;

    let mut nonce_field = [0u8; NONCE_FIELD_LEN];
    getrandom::getrandom(&mut nonce_field[..GCM_NONCE_LEN])
        .map_err(|e| ShadeError::Cache(format!("failed to read nonce entropy: {e}")))?;

    let cipher = Aes128Gcm::new(key.into());
    let nonce = Nonce::from_slice(&nonce_field[..GCM_NONCE_LEN]);
    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_slice())
        .map_err(|_| ShadeError::Cache("encryption failed".to_string()))?;

    let mut out = Vec::with_capacity(NONCE_FIELD_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_field);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

pub fn open(key: &[u8; 16], record: &[u8]) -> Result<CacheEntry> {
    if record.len() < NONCE_FIELD_LEN {
        return Err(ShadeError::Cache("record too short".to_string()));
    }
    let (nonce_field, ciphertext) = record.split_at(NONCE_FIELD_LEN);
    let cipher = Aes128Gcm::new(key.into());
    let nonce = Nonce::from_slice(&nonce_field[..GCM_NONCE_LEN]);
    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| ShadeError::Cache("decryption failed, cache entry corrupt or tampered".to_string()))?;
    ciborium::from_reader(plaintext.as_slice()).map_err(|e| ShadeError::Cache(e.to_string()))
}

/// In-memory package cache table. A real driver persists sealed records to
/// the toolchain's build cache directory keyed by action id; this struct
/// models the lookup/insert semantics independent of where the bytes live.
pub struct PackageCache {
    key: [u8; 16],
    table: Mutex<HashMap<[u8; 32], Vec<u8>>>,
    warned_plaintext_fallback: std::sync::atomic::AtomicBool,
}

impl PackageCache {
    pub fn new(seed: &[u8; 32]) -> Self {
        Self {
            key: MasterEntropy::cache_key(seed),
            table: Mutex::new(HashMap::new()),
            warned_plaintext_fallback: std::sync::atomic::AtomicBool::new(false),
        }
    }

    pub fn get(&self, action_id: &[u8; 32]) -> Option<CacheEntry> {
        let table = self.table.lock().expect("cache mutex poisoned");
        let record = table.get(action_id)?;
        match open(&self.key, record) {
            Ok(entry) => Some(entry),
            Err(_) => None,
        }
    }

    pub fn put(&self, entry: &CacheEntry) -> Result<()> {
        let record = seal(&self.key, entry)?;
        let mut table = self.table.lock().expect("cache mutex poisoned");
        table.insert(entry.action_id, record);
        Ok(())
    }

    /// Called once when the cache is opened with encryption disabled
    /// (`-no-cache-encrypt` or equivalent), so the fallback to plaintext
    /// storage is surfaced to the user exactly once per process rather
    /// than on every cache hit.
    pub fn warn_plaintext_fallback_once(&self) -> bool {
        !self.warned_plaintext_fallback.swap(true, std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> CacheEntry {
        CacheEntry {
            action_id: [1u8; 32],
            source_hash: [2u8; 32],
            literal_count: 4,
            flattened_funcs: 2,
            name_map: HashMap::new(),
        }
    }

    #[test]
    fn seal_open_roundtrips() {
        let key = [9u8; 16];
        let entry = sample_entry();
        let record = seal(&key, &entry).unwrap();
        let opened = open(&key, &record).unwrap();
        assert_eq!(opened, entry);
    }

    #[test]
    fn tamper_detected() {
        let key = [9u8; 16];
        let entry = sample_entry();
        let mut record = seal(&key, &entry).unwrap();
        let last = record.len() - 1;
        record[last] ^= 0xff;
        assert!(open(&key, &record).is_err());
    }

    #[test]
    fn wrong_key_fails() {
        let key = [9u8; 16];
        let entry = sample_entry();
        let record = seal(&key, &entry).unwrap();
        let wrong_key = [8u8; 16];
        assert!(open(&wrong_key, &record).is_err());
    }

    #[test]
    fn package_cache_roundtrips_and_drops_name_map() {
        let cache = PackageCache::new(&[3u8; 32]);
        let mut entry = sample_entry();
        entry.name_map.insert("Foo".to_string(), "zz1".to_string());
        cache.put(&entry).unwrap();
        let fetched = cache.get(&entry.action_id).unwrap();
        assert!(fetched.name_map.is_empty());
        assert_eq!(fetched.action_id, entry.action_id);
    }

    #[test]
    fn plaintext_fallback_warns_only_once() {
        let cache = PackageCache::new(&[4u8; 32]);
        assert!(cache.warn_plaintext_fallback_once());
        assert!(!cache.warn_plaintext_fallback_once());
    }
}

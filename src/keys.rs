//! Key lookup for 3DS content decryption.
//!
//! Decryption code never reaches into global key storage. Instead it is
//! handed a [`KeyProvider`], a capability that resolves a symbolic key name
//! to a raw AES-128 key. [`KeySet`] is the simple in-memory implementation
//! shipped with this crate; callers with their own key store (boot9 key
//! scrambling, movable.sed parsing, ...) implement the trait themselves.
//!
//! ## Key file format
//! [`KeySet::load_keys`] reads simple `name = hex_value` text files, one
//! entry per line, comments prefixed with `;`. Values must be exactly 32 hex
//! characters (16 bytes).
//!
//! ```text
//! ; normal key for SD card content
//! sd_key = 000102030405060708090A0B0C0D0E0F
//! ```

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read};

use crate::{Error, Result};

/// Raw AES-128 key material.
pub type AesKey = [u8; 16];

/// Name of the normal key used for everything under `Nintendo 3DS/<ID0>/<ID1>`.
pub const SD_KEY: &str = "sd_key";

/// Source of AES keys, addressed by symbolic name.
pub trait KeyProvider {
    /// Return the key registered under `id`, if any.
    fn key(&self, id: &str) -> Option<AesKey>;

    /// Whether a key is registered under `id`.
    fn is_key_available(&self, id: &str) -> bool {
        self.key(id).is_some()
    }
}

impl<K: KeyProvider + ?Sized> KeyProvider for &K {
    fn key(&self, id: &str) -> Option<AesKey> {
        (**self).key(id)
    }
}

/// Resolve `id` or fail with [`Error::MissingKey`].
pub(crate) fn require_key<K: KeyProvider + ?Sized>(keys: &K, id: &'static str) -> Result<AesKey> {
    keys.key(id).ok_or(Error::MissingKey(id))
}

/// Named AES keys held in memory.
#[derive(Default, Clone)]
pub struct KeySet {
    keys: HashMap<String, AesKey>,
}

// Key bytes stay out of debug output.
impl std::fmt::Debug for KeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.keys.keys().collect();
        names.sort();
        f.debug_struct("KeySet").field("names", &names).finish()
    }
}

impl KeySet {
    /// Create an empty key set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a key. Names are case-insensitive.
    pub fn insert(&mut self, name: impl Into<String>, key: AesKey) {
        let mut name = name.into();
        name.make_ascii_lowercase();
        self.keys.insert(name, key);
    }

    /// Load keys from a `name = hex` reader.
    ///
    /// Lines beginning with `;` and blank lines are ignored. Lines without an
    /// `=` or with a value that is not 16 bytes of hex are skipped so one bad
    /// entry does not poison the whole file. Names are case-insensitive and
    /// stored lowercased.
    pub fn load_keys<R: Read>(&mut self, reader: R) -> Result<()> {
        let buf = BufReader::new(reader);
        for line in buf.lines() {
            let line = line.map_err(Error::Io)?;
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            let Some((name, value)) = line.split_once('=') else {
                continue;
            };
            let name = name.trim();
            match parse_key(value) {
                Some(key) if !name.is_empty() => self.insert(name, key),
                _ => tracing::warn!(key = name, "skipping malformed key entry"),
            }
        }
        Ok(())
    }

    /// Number of keys held.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no keys are held.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

impl KeyProvider for KeySet {
    fn key(&self, id: &str) -> Option<AesKey> {
        self.keys.get(&id.to_ascii_lowercase()).copied()
    }
}

fn parse_key(value: &str) -> Option<AesKey> {
    let mut key = [0u8; 16];
    hex::decode_to_slice(value.trim(), &mut key).ok()?;
    Some(key)
}

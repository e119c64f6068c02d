//! Shared fixtures for the integration tests.

#![allow(dead_code)] // Not every test file uses every helper

use ctrkit::crypto::{Counter, apply_ctr};
use ctrkit::keys::{AesKey, KeySet, SD_KEY};

/// Key used wherever a test needs "the SD key".
pub const TEST_KEY: AesKey = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E, 0x0F,
];

/// SD path used by the reference vectors.
pub const CONTENT_PATH: &str = "/title/00040000/00164800/content/00000000.app";

/// Key set holding only [`TEST_KEY`] as the SD key.
pub fn test_keys() -> KeySet {
    let mut keys = KeySet::new();
    keys.insert(SD_KEY, TEST_KEY);
    keys
}

/// Deterministic, non-repeating-looking test data.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 + i / 97) as u8).collect()
}

/// Encrypt `plain` from offset 0 with [`TEST_KEY`] and `ctr`.
pub fn encrypt(plain: &[u8], ctr: &Counter) -> Vec<u8> {
    let mut data = plain.to_vec();
    apply_ctr(&TEST_KEY, ctr, 0, &mut data);
    data
}

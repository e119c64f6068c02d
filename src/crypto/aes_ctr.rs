//! AES-128-CTR helpers.
//!
//! ## SD counter derivation
//!
//! The initial counter for an SD card file is computed from its path as seen
//! from the `<ID1>` folder, e.g. `/title/00040000/00164800/content/00000000.app`:
//!
//! ```text
//! data    = UTF-16LE(path) ++ 00 00
//! digest  = SHA-256(data)
//! ctr[i]  = digest[i] ^ digest[16 + i]      for i in 0..16
//! ```
//!
//! The trailing NUL code unit is part of the hashed data.
//!
//! ## Random access
//!
//! The counter is a 128-bit big-endian integer incremented once per 16-byte
//! block, so the keystream for any byte offset is available without
//! processing earlier blocks: the block counter is `base + offset / 16` and
//! the first `offset % 16` keystream bytes of that block are discarded.

use aes::Aes128;
use ctr::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use sha2::{Digest, Sha256};

use crate::keys::AesKey;

type Aes128Ctr = ctr::Ctr128BE<Aes128>;

/// A 16-byte AES-CTR counter block.
pub type Counter = [u8; 16];

const BLOCK_SIZE: u64 = 16;

/// Derive the initial counter of an SD card file from its SD-relative path.
pub fn derive_sd_counter(path: &str) -> Counter {
    let mut hasher = Sha256::new();
    for unit in path.encode_utf16().chain(std::iter::once(0)) {
        hasher.update(unit.to_le_bytes());
    }
    let digest = hasher.finalize();

    let mut ctr = [0u8; 16];
    for (i, b) in ctr.iter_mut().enumerate() {
        *b = digest[i] ^ digest[16 + i];
    }
    ctr
}

/// Initial counter of an installed title content.
///
/// The content index from the TMD content chunk is stored big-endian in the
/// first two bytes; the rest of the block is zero.
pub fn content_counter(content_index: u16) -> Counter {
    let mut ctr = [0u8; 16];
    ctr[..2].copy_from_slice(&content_index.to_be_bytes());
    ctr
}

/// Counter block covering `byte_offset`, given the counter at offset 0.
///
/// Wraps modulo 2^128 like the cipher itself.
pub fn counter_at(base: &Counter, byte_offset: u64) -> Counter {
    u128::from_be_bytes(*base)
        .wrapping_add(u128::from(byte_offset / BLOCK_SIZE))
        .to_be_bytes()
}

/// AES-128-CTR keystream positioned at an absolute byte offset.
///
/// Successive [`CtrCipher::apply`] calls continue where the previous one
/// stopped, so a file can be processed chunk by chunk with any chunk size.
pub struct CtrCipher {
    inner: Aes128Ctr,
}

impl CtrCipher {
    /// Keystream for `key`/`base` starting at `byte_offset`.
    pub fn at(key: &AesKey, base: &Counter, byte_offset: u64) -> Self {
        let block = counter_at(base, byte_offset);
        let mut inner = Aes128Ctr::new(key.into(), (&block).into());
        inner.seek(byte_offset % BLOCK_SIZE);
        Self { inner }
    }

    /// XOR the next `buf.len()` keystream bytes into `buf`.
    pub fn apply(&mut self, buf: &mut [u8]) {
        self.inner.apply_keystream(buf);
    }
}

/// Encrypt or decrypt `buf` in place, treating `buf[0]` as byte
/// `byte_offset` of the stream.
pub fn apply_ctr(key: &AesKey, base: &Counter, byte_offset: u64, buf: &mut [u8]) {
    CtrCipher::at(key, base, byte_offset).apply(buf);
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: AesKey = [
        0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0A, 0x0B, 0x0C, 0x0D, 0x0E,
        0x0F,
    ];

    #[test]
    fn counter_at_advances_per_block() {
        let base = [0u8; 16];
        assert_eq!(counter_at(&base, 0), base);
        assert_eq!(counter_at(&base, 15), base);
        assert_eq!(counter_at(&base, 16)[15], 1);
        assert_eq!(counter_at(&base, 0x1000)[14..], [0x01, 0x00]);
    }

    #[test]
    fn counter_at_carries_and_wraps() {
        let mut base = [0u8; 16];
        base[15] = 0xFF;
        let next = counter_at(&base, 16);
        assert_eq!(next[14..], [0x01, 0x00]);

        assert_eq!(counter_at(&[0xFF; 16], 16), [0u8; 16]);
    }

    #[test]
    fn keystream_wraps_like_a_128_bit_counter() {
        let mut buf = [0u8; 32];
        apply_ctr(&KEY, &[0xFF; 16], 0, &mut buf);
        let mut second = [0u8; 16];
        apply_ctr(&KEY, &[0u8; 16], 0, &mut second);
        assert_eq!(buf[16..], second);
    }

    #[test]
    fn offset_start_matches_continuous_stream() {
        let base = derive_sd_counter("/dbs/title.db");
        let mut whole = vec![0u8; 100];
        apply_ctr(&KEY, &base, 0, &mut whole);

        for start in [0usize, 1, 15, 16, 17, 63, 99] {
            let mut part = vec![0u8; 100 - start];
            apply_ctr(&KEY, &base, start as u64, &mut part);
            assert_eq!(part, whole[start..], "offset {start}");
        }
    }

    #[test]
    fn chunked_apply_matches_one_shot() {
        let base = content_counter(3);
        let mut whole = vec![0x5Au8; 70];
        apply_ctr(&KEY, &base, 5, &mut whole);

        let mut chunked = vec![0x5Au8; 70];
        let mut cipher = CtrCipher::at(&KEY, &base, 5);
        for chunk in chunked.chunks_mut(7) {
            cipher.apply(chunk);
        }
        assert_eq!(chunked, whole);
    }

    #[test]
    fn content_counter_layout() {
        let ctr = content_counter(0x0102);
        assert_eq!(ctr[..2], [0x01, 0x02]);
        assert!(ctr[2..].iter().all(|&b| b == 0));
    }

    #[test]
    fn sd_counter_includes_terminator() {
        // Hashing without the trailing NUL must give a different result.
        let path = "/title/00040000/00164800/content/00000000.app";
        let mut hasher = Sha256::new();
        for unit in path.encode_utf16() {
            hasher.update(unit.to_le_bytes());
        }
        let digest = hasher.finalize();
        let mut no_nul = [0u8; 16];
        for i in 0..16 {
            no_nul[i] = digest[i] ^ digest[16 + i];
        }
        assert_ne!(derive_sd_counter(path), no_nul);
    }
}

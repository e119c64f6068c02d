//! Cryptographic operations for 3DS content.
//!
//! Everything the console encrypts on the SD card, and every encrypted
//! content of an installed title, uses AES-128 in CTR mode with a full
//! 128-bit big-endian counter. The modes differ only in where the initial
//! counter comes from:
//!
//! * **SD card files** - derived from the file's path relative to
//!   `Nintendo 3DS/<ID0>/<ID1>` ([`aes_ctr::derive_sd_counter`]).
//! * **Installed title content** - derived from the content index recorded
//!   in the title metadata ([`aes_ctr::content_counter`]).
//!
//! All functions accept already-resolved key material; key lookup is the
//! job of a [`crate::keys::KeyProvider`].
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`aes_ctr`] | Counter derivation, offset arithmetic, seekable AES-128-CTR keystream |

pub mod aes_ctr;

pub use aes_ctr::{Counter, CtrCipher, apply_ctr, content_counter, counter_at, derive_sd_counter};

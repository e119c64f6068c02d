//! **ctrkit** - decryption of Nintendo 3DS SD card and installed title content.
//!
//! # Modules
//! | Module | Purpose |
//! |--------|---------|
//! | [`keys`]     | [`keys::KeyProvider`] capability and a file-backed key set |
//! | [`crypto`]   | SD/content counter derivation, seekable AES-128-CTR |
//! | [`formats`]  | Binary metadata parsers (TMD) |
//! | [`sdmc`]     | Decrypting SD file reader and whole-file decryptor |
//! | [`pipeline`] | Three-stage read/decrypt/write engine with progress and abort |
//!
//! # Example
//! ```no_run
//! use std::fs::File;
//!
//! use ctrkit::keys::KeySet;
//! use ctrkit::sdmc::SdmcDecryptor;
//!
//! # fn main() -> ctrkit::Result<()> {
//! let mut keys = KeySet::new();
//! keys.load_keys(File::open("aes_keys.txt")?)?;
//!
//! let sd = SdmcDecryptor::new("Nintendo 3DS/id0/id1", &keys)?;
//! let path = "/title/00040000/00164800/content/00000000.app";
//! sd.reset(std::fs::metadata(sd.root().join(&path[1..]))?.len());
//! sd.decrypt_and_write_file(path, "out/00000000.app", |done, total| {
//!     println!("{done}/{total}");
//! })?;
//! # Ok(())
//! # }
//! ```

pub mod crypto;
pub mod error;
pub mod formats;
pub mod keys;
pub mod pipeline;
pub mod sdmc;
pub(crate) mod utils;

pub use error::{Error, Result};

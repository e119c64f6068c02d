//! SD card ("SDMC") content.
//!
//! Everything a 3DS writes below `Nintendo 3DS/<ID0>/<ID1>/` on the SD card
//! is encrypted with AES-128-CTR under the console's SD key. Each file has
//! its own initial counter, derived from its path relative to the `<ID1>`
//! folder (see [`crate::crypto::derive_sd_counter`]). Paths passed to this
//! module are always in that form, e.g. `/title/00040000/00164800/content/00000000.app`.
//!
//! | Type | Use |
//! |------|-----|
//! | [`SdmcFile`] | Seekable reader that decrypts on the fly |
//! | [`SdmcDecryptor`] | Decrypt whole files to disk or memory, with progress |

mod decryptor;
mod file;

pub use decryptor::SdmcDecryptor;
pub use file::SdmcFile;

use std::path::{Path, PathBuf};

/// Host path of `sd_path` below `root` (the `<ID1>` folder).
pub(crate) fn host_path(root: &Path, sd_path: &str) -> PathBuf {
    root.join(sd_path.trim_start_matches(['/', '\\']))
}

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use crate::Result;
use crate::crypto::{apply_ctr, derive_sd_counter};
use crate::keys::{AesKey, KeyProvider, SD_KEY, require_key};
use crate::pipeline::{CtrParams, QuickDecryptor, TransferState};
use crate::sdmc::{SdmcFile, host_path};

/// Decrypts SD card files below one `<ID1>` folder.
///
/// Wraps a [`QuickDecryptor`], so progress of several
/// [`decrypt_and_write_file`](Self::decrypt_and_write_file) calls can be
/// reported as one transfer after a single [`reset`](Self::reset).
pub struct SdmcDecryptor {
    root: PathBuf,
    key: AesKey,
    quick: QuickDecryptor,
}

impl std::fmt::Debug for SdmcDecryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdmcDecryptor")
            .field("root", &self.root)
            .field("quick", &self.quick)
            .finish_non_exhaustive()
    }
}

impl SdmcDecryptor {
    /// Create a decryptor for the `Nintendo 3DS/<ID0>/<ID1>` folder `root`.
    ///
    /// Fails with [`crate::Error::MissingKey`] if `keys` has no SD key.
    pub fn new<K: KeyProvider + ?Sized>(root: impl Into<PathBuf>, keys: &K) -> Result<Self> {
        let key = require_key(keys, SD_KEY)?;
        Ok(Self {
            root: root.into(),
            key,
            quick: QuickDecryptor::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Start a new logical transfer of `total_size` bytes.
    pub fn reset(&self, total_size: u64) {
        self.quick.reset(total_size);
    }

    /// Cancel the running transfer and any later one until the next reset.
    pub fn abort(&self) {
        self.quick.abort();
    }

    pub fn state(&self) -> TransferState {
        self.quick.state()
    }

    /// Decrypt `sd_path` into the host file `destination`.
    ///
    /// Missing parent directories of `destination` are created. On failure
    /// the destination may be left partially written; removing it is up to
    /// the caller.
    pub fn decrypt_and_write_file<F>(
        &self,
        sd_path: &str,
        destination: impl AsRef<Path>,
        callback: F,
    ) -> Result<()>
    where
        F: FnMut(u64, u64) + Send,
    {
        let destination = destination.as_ref();
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent).inspect_err(|e| {
                tracing::error!(path = %parent.display(), error = %e, "could not create path");
            })?;
        }

        let source_path = host_path(&self.root, sd_path);
        let mut source = File::open(&source_path).inspect_err(|e| {
            tracing::error!(path = %source_path.display(), error = %e, "could not open source");
        })?;
        let size = source.metadata()?.len();
        let mut dest = File::create(destination).inspect_err(|e| {
            tracing::error!(path = %destination.display(), error = %e, "could not open destination");
        })?;

        tracing::debug!(sd_path, size, "decrypting SD file");
        let params = CtrParams::new(self.key, derive_sd_counter(sd_path));
        self.quick
            .decrypt_and_write_file(&mut source, size, &mut dest, callback, Some(params))
    }

    /// Decrypt a whole (small) file into memory.
    pub fn decrypt_file(&self, sd_path: &str) -> Result<Vec<u8>> {
        let path = host_path(&self.root, sd_path);
        let mut data = fs::read(&path).inspect_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "could not read file");
        })?;
        apply_ctr(&self.key, &derive_sd_counter(sd_path), 0, &mut data);
        Ok(data)
    }

    /// Open `sd_path` as a seekable decrypting reader.
    pub fn open_file(&self, sd_path: &str) -> Result<SdmcFile> {
        let path = host_path(&self.root, sd_path);
        let file = File::open(&path).inspect_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "could not open file");
        })?;
        Ok(SdmcFile::new(file, sd_path, self.key))
    }
}

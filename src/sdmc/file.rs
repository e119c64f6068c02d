use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;

use crate::crypto::{Counter, apply_ctr, derive_sd_counter};
use crate::keys::{AesKey, KeyProvider, SD_KEY, require_key};
use crate::sdmc::host_path;
use crate::{Error, Result};

/// Random-access reader over an encrypted SD card file.
///
/// Reads through [`Read`] return plaintext at the current position, no
/// matter how the file was seeked before. Callers that read raw bytes from
/// [`SdmcFile::get_mut`] decrypt them afterwards with
/// [`SdmcFile::decrypt_in_place`].
pub struct SdmcFile<F = File> {
    inner: F,
    key: AesKey,
    ctr: Counter,
}

impl SdmcFile<File> {
    /// Open `sd_path` below `root` (the `<ID1>` folder) for reading.
    ///
    /// Fails with [`Error::MissingKey`] if `keys` has no SD key.
    pub fn open<K: KeyProvider + ?Sized>(
        root: impl AsRef<Path>,
        sd_path: &str,
        keys: &K,
    ) -> Result<Self> {
        let key = require_key(keys, SD_KEY)?;
        let path = host_path(root.as_ref(), sd_path);
        let file = File::open(&path).inspect_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "could not open SD file");
        })?;
        Ok(Self::new(file, sd_path, key))
    }
}

impl<F> SdmcFile<F> {
    /// Wrap an open handle to the encrypted file stored at `sd_path`.
    pub fn new(inner: F, sd_path: &str, key: AesKey) -> Self {
        Self::with_counter(inner, key, derive_sd_counter(sd_path))
    }

    /// Wrap an open handle whose counter is already known.
    pub fn with_counter(inner: F, key: AesKey, ctr: Counter) -> Self {
        Self { inner, key, ctr }
    }

    /// Counter at offset 0 of this file.
    pub fn counter(&self) -> &Counter {
        &self.ctr
    }

    pub fn get_ref(&self) -> &F {
        &self.inner
    }

    /// Access the raw (encrypted) handle.
    pub fn get_mut(&mut self) -> &mut F {
        &mut self.inner
    }

    /// Close the decrypting view and return the raw handle.
    pub fn into_inner(self) -> F {
        self.inner
    }
}

impl<F: Seek> SdmcFile<F> {
    /// Current position in the file.
    pub fn tell(&mut self) -> Result<u64> {
        Ok(self.inner.stream_position()?)
    }

    /// Length of the file; the position is left unchanged.
    pub fn size(&mut self) -> Result<u64> {
        let pos = self.inner.stream_position()?;
        let len = self.inner.seek(SeekFrom::End(0))?;
        if pos != len {
            self.inner.seek(SeekFrom::Start(pos))?;
        }
        Ok(len)
    }

    /// Decrypt `buf`, which must hold the raw bytes that end at the current
    /// position (i.e. that were just read from [`SdmcFile::get_mut`]).
    pub fn decrypt_in_place(&mut self, buf: &mut [u8]) -> Result<()> {
        let end = self.tell()?;
        let start = end
            .checked_sub(buf.len() as u64)
            .ok_or(Error::InvalidRange)?;
        apply_ctr(&self.key, &self.ctr, start, buf);
        Ok(())
    }
}

impl<F: Read + Seek> Read for SdmcFile<F> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let start = self.inner.stream_position()?;
        let n = self.inner.read(buf)?;
        apply_ctr(&self.key, &self.ctr, start, &mut buf[..n]);
        Ok(n)
    }
}

impl<F: Seek> Seek for SdmcFile<F> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl<F> std::fmt::Debug for SdmcFile<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SdmcFile").finish_non_exhaustive()
    }
}

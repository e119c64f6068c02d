//! Low-level I/O primitives shared by the parsers.
//!
//! Each function reads exactly the bytes it promises or returns an error -
//! there is no partial-read ambiguity. All multi-byte integers in 3DS
//! metadata are big-endian, so only big-endian readers live here.

use std::io::Read;

use crate::Result;

/// Read one byte.
#[inline]
pub(crate) fn u8<R: Read>(r: &mut R) -> Result<u8> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;
    Ok(b[0])
}

/// Read a big-endian `u16`.
#[inline]
pub(crate) fn be_u16<R: Read>(r: &mut R) -> Result<u16> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b)?;
    Ok(u16::from_be_bytes(b))
}

/// Read a big-endian `u32`.
#[inline]
pub(crate) fn be_u32<R: Read>(r: &mut R) -> Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_be_bytes(b))
}

/// Read a big-endian `u64`.
#[inline]
pub(crate) fn be_u64<R: Read>(r: &mut R) -> Result<u64> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)?;
    Ok(u64::from_be_bytes(b))
}

/// Read exactly `N` bytes into a fixed-size array.
#[inline]
pub(crate) fn bytesa<const N: usize>(r: &mut impl Read) -> Result<[u8; N]> {
    let mut b = [0u8; N];
    r.read_exact(&mut b)?;
    Ok(b)
}

/// Read exactly `len` bytes into a `Vec`.
#[inline]
pub(crate) fn bytesv<R: Read>(r: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut b = vec![0u8; len];
    r.read_exact(&mut b)?;
    Ok(b)
}

/// Round `value` up to the next multiple of `align` (a power of two).
#[inline]
pub(crate) const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Fill `buf` from `r`, stopping early only at end of stream.
///
/// Returns the number of bytes stored. Unlike [`Read::read_exact`] a short
/// count is not an error here; callers decide what a short fill means.
pub(crate) fn read_full<R: Read + ?Sized>(r: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

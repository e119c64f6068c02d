//! Library-wide error and result types.

use std::fmt;
use std::io;

/// Result alias used throughout ctrkit.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the library can produce.
///
/// Error messages are kept intentionally terse; callers that need richer
/// context should wrap `Error` in their own type.
#[derive(Debug)]
pub enum Error {
    /// The data ended before all expected bytes could be read.
    UnexpectedEof,
    /// An offset or size field would read outside the valid region.
    InvalidRange,
    /// A structural constraint was violated (message describes which one).
    Parse(&'static str),
    /// A signature type constant that has no known signature length.
    UnsupportedSignature(u32),
    /// A content lookup past the parsed content count.
    IndexOutOfRange { index: usize, count: usize },
    /// The key provider has no key registered under this name.
    MissingKey(&'static str),
    /// The transfer was cancelled through [`crate::pipeline::QuickDecryptor::abort`].
    Aborted,
    /// A transfer is already running on this pipeline instance.
    Busy,
    /// An underlying I/O operation failed.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnexpectedEof => write!(f, "unexpected end of file"),
            Error::InvalidRange => write!(f, "invalid offset or size"),
            Error::Parse(s) => write!(f, "parse error: {s}"),
            Error::UnsupportedSignature(t) => write!(f, "unsupported signature type: {t:#x}"),
            Error::IndexOutOfRange { index, count } => {
                write!(f, "content index {index} out of range (count {count})")
            }
            Error::MissingKey(name) => write!(f, "key '{name}' is not available"),
            Error::Aborted => write!(f, "transfer aborted"),
            Error::Busy => write!(f, "a transfer is already in progress"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let Error::Io(e) = self {
            Some(e)
        } else {
            None
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Error::UnexpectedEof
        } else {
            Error::Io(e)
        }
    }
}

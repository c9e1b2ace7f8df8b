//! Error types and the related `Result<T>`

use std::borrow::Cow;
use std::io;

use thiserror::Error;

pub type ZipResult<T> = Result<T, ZipError>;

#[derive(Debug, Error)]
pub enum ZipError {
    /// An error from underlying I/O
    #[error("I/O Error")]
    Io(#[source] io::Error),

    /// The ZIP archive contained data the format doesn't allow.
    ///
    /// `offset` is the absolute position in the archive where the problem
    /// was found, and `record` names the structure being decoded there.
    #[error("Invalid Zip archive: {record} at offset {offset}: {reason}")]
    InvalidArchive {
        record: &'static str,
        offset: u64,
        reason: Cow<'static, str>,
    },

    /// Decoding a UTF-8 name or comment failed
    #[error("Invalid UTF-8")]
    Encoding(#[from] std::str::Utf8Error),

    /// The ZIP archive uses an unsupported feature
    #[error("Unsupported Zip archive: {0}")]
    UnsupportedArchive(String),

    /// An entry's decompressed contents didn't match its recorded CRC32.
    #[error("CRC32 mismatch: expected {expected:#010x}, computed {actual:#010x}")]
    Crc { expected: u32, actual: u32 },

    /// The deflate stream couldn't be encoded or decoded.
    #[error("Compression error")]
    Compression(#[source] io::Error),

    /// A file wasn't found at the provided path
    #[error("No file in the archive with the path {0}")]
    NoSuchFile(String),

    /// An entry's path would escape the directory it's extracted into.
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// A value provided to a writer can't be represented in a ZIP archive.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The archive's file handle was already released with `close()`.
    #[error("Archive was already closed")]
    Closed,

    /// A previous write failed, leaving the archive unfinishable.
    #[error("Writer aborted after an earlier error")]
    Aborted,

    /// A cast from a 64-bit int to a usize failed,
    /// probably on a 32-bit system.
    #[error("Zip archive too large for address space")]
    InsufficientAddressSpace,
}

impl ZipError {
    pub(crate) fn invalid<S: Into<Cow<'static, str>>>(
        record: &'static str,
        offset: u64,
        reason: S,
    ) -> Self {
        ZipError::InvalidArchive {
            record,
            offset,
            reason: reason.into(),
        }
    }
}

/// Recovers a `ZipError` that was smuggled through `std::io::Read`
/// (see the `From<ZipError>` impl below), or wraps a plain I/O error.
impl From<io::Error> for ZipError {
    fn from(e: io::Error) -> Self {
        if !e.get_ref().is_some_and(|inner| inner.is::<ZipError>()) {
            return ZipError::Io(e);
        }
        match e.into_inner().map(|inner| inner.downcast::<ZipError>()) {
            Some(Ok(zip_error)) => *zip_error,
            Some(Err(other)) => ZipError::Io(io::Error::other(other)),
            None => ZipError::Io(io::Error::other("empty wrapped error")),
        }
    }
}

/// Entry readers implement `io::Read`, so CRC and decompression failures
/// have to travel as `io::Error`s.
impl From<ZipError> for io::Error {
    fn from(e: ZipError) -> Self {
        match e {
            ZipError::Io(e) => e,
            other => io::Error::new(io::ErrorKind::InvalidData, other),
        }
    }
}

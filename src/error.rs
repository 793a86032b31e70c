//! The crate-wide error type.
//!
//! Every fallible entry point in this crate returns [`Result`]. There is no
//! global "last error" channel: see `DESIGN.md` open question (a).

use alloc::string::String;
use core::fmt;

#[derive(Debug)]
pub enum Error {
    /// The buffer was too small to contain `what`; `needed` bytes were
    /// required starting at `offset` but only `available` were left.
    BufferTooShort {
        what: &'static str,
        offset: usize,
        needed: usize,
        available: usize,
    },
    /// Offset 0x3C did not point at the 4-byte ASCII signature `"PE\0\0"`.
    BadSignature { found: u32 },
    /// The optional header's `magic` field was neither `0x10B` nor `0x20B`.
    BadMagic(u64),
    /// `store` was asked to write into a buffer smaller than the computed
    /// image size.
    OutputBufferTooShort { needed: usize, available: usize },
    /// `set_header` was asked to change a field it does not permit changing.
    InvalidMutation(String),
    /// The attribute certificate table could not be walked.
    MalformedCertificate(String),
    /// Anything else caught by the underlying binary-parsing crate.
    Scroll(scroll::Error),
    #[cfg(feature = "std")]
    Io(std::io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BufferTooShort {
                what,
                offset,
                needed,
                available,
            } => write!(
                f,
                "buffer too small for {what}: needed {needed} bytes at offset {offset:#x}, \
                 only {available} available"
            ),
            Error::BadSignature { found } => {
                write!(f, "not a PE file (PE00 signature missing, found {found:#010x})")
            }
            Error::BadMagic(magic) => write!(f, "unknown optional header magic: {magic:#x}"),
            Error::OutputBufferTooShort { needed, available } => write!(
                f,
                "target buffer too small: needed {needed} bytes, only {available} available"
            ),
            Error::InvalidMutation(msg) => write!(f, "invalid header mutation: {msg}"),
            Error::MalformedCertificate(msg) => write!(f, "malformed certificate: {msg}"),
            Error::Scroll(err) => write!(f, "{err}"),
            #[cfg(feature = "std")]
            Error::Io(err) => write!(f, "{err}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for Error {}

impl From<scroll::Error> for Error {
    fn from(err: scroll::Error) -> Self {
        Error::Scroll(err)
    }
}

#[cfg(feature = "std")]
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

pub type Result<T> = core::result::Result<T, Error>;

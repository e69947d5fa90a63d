//! Error taxonomy shared by every layer of the crate.
//!
//! Each failure class is its own variant so callers can branch on the kind
//! of failure without inspecting messages:
//!
//! | Variant | Meaning | Retried by [`ArchiveOpener`](crate::zip::ArchiveOpener) |
//! |---------|---------|---------|
//! | [`Error::Transport`] | network failure or cancellation | no |
//! | [`Error::Protocol`] | server cannot serve byte ranges | no |
//! | [`Error::Range`] | read starts outside the resource | no |
//! | [`Error::ShortRead`] | server returned fewer bytes than asked | yes |
//! | [`Error::Format`] | archive structure failed validation | yes |
//! | [`Error::ArchiveCorrupt`] | every open attempt hit a format failure | - |
//! | [`Error::EntryNotFound`] | no member with the requested name | - |
//! | [`Error::TagNotFound`] / [`Error::TruncatedRecord`] | tag scan failed | - |

use thiserror::Error;

use crate::tag::ElementType;

/// Result alias used throughout the library.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("range starting at offset {offset} is outside the resource (length {length})")]
    Range { offset: u64, length: u64 },

    #[error("short read at offset {offset}: expected {expected} bytes, received {received}")]
    ShortRead {
        offset: u64,
        expected: u64,
        received: u64,
    },

    #[error("invalid archive: {0}")]
    Format(String),

    #[error("archive still corrupt after {attempts} attempt(s): {source}")]
    ArchiveCorrupt {
        attempts: u32,
        #[source]
        source: Box<Error>,
    },

    #[error("entry '{name}' not found in archive")]
    EntryNotFound { name: String },

    #[error("unsupported compression method: {0}")]
    UnsupportedCompression(u16),

    #[error("element {signature} not found")]
    TagNotFound { signature: ElementType },

    #[error(
        "element at offset {offset} is truncated: need {expected} bytes, only {available} remain"
    )]
    TruncatedRecord {
        offset: u64,
        expected: usize,
        available: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the byte transport itself.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP request failed with status: {0}")]
    Status(u16),

    #[error("read failed: {0}")]
    Io(#[source] std::io::Error),

    #[error("operation cancelled")]
    Cancelled,

    #[error("stream interrupted at offset {offset}: expected {expected} bytes, received {received}")]
    Interrupted {
        offset: u64,
        expected: u64,
        received: u64,
    },
}

impl Error {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        Error::Format(msg.into())
    }

    /// Whether the failure may come from a truncated or garbled network read
    /// rather than from the resource itself.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Format(_) | Error::ShortRead { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Transport(TransportError::Cancelled))
    }

    /// Re-classify a failed read that happened while streaming an entry.
    ///
    /// Once an archive has been indexed, a short read during the copy is a
    /// dropped connection, not a format problem.
    pub(crate) fn into_transport(self) -> Self {
        match self {
            Error::ShortRead {
                offset,
                expected,
                received,
            } => TransportError::Interrupted {
                offset,
                expected,
                received,
            }
            .into(),
            other => other,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(TransportError::Http(err))
    }
}

mod http;
mod local;
mod memory;

pub use http::{HttpConnector, HttpRangeReader};
pub use local::{LocalConnector, LocalFileReader};
pub use memory::MemoryReader;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Random access reading from a data source of fixed length.
///
/// Implementations are single-use: one extraction drives one source at a
/// time. Nothing here promises that concurrent callers see a consistent view.
#[async_trait]
pub trait ReadAt: Send + Sync {
    /// Total size of the data source, discovered on first call and cached.
    async fn length(&self) -> Result<u64>;

    /// Read `len` bytes starting at `offset`.
    ///
    /// `len` is clamped to the end of the source. Fails with
    /// [`Error::Range`] when `offset` is at or past the end, and with
    /// [`Error::ShortRead`] when the source delivered fewer bytes than the
    /// clamped length.
    async fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>>;
}

/// Produces a fresh [`ReadAt`] source for each archive open attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    type Source: ReadAt + 'static;

    async fn connect(&self) -> Result<Self::Source>;
}

/// Half-open byte interval `[start, end)` within a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Build the range a read of `len` bytes at `offset` actually covers.
    ///
    /// Returns `None` for zero-length reads, which need no request at all.
    pub fn for_read(offset: u64, len: u64, total: u64) -> Result<Option<Self>> {
        if offset >= total {
            return Err(Error::Range {
                offset,
                length: total,
            });
        }
        if len == 0 {
            return Ok(None);
        }

        let end = offset.saturating_add(len).min(total);
        Ok(Some(Self { start: offset, end }))
    }

    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Value for the HTTP `Range` header (inclusive end).
    pub fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end - 1)
    }
}

/// Running count of bytes pulled over the network.
///
/// Owned by the caller and handed to every source it creates, so a single
/// counter spans all open attempts of one extraction.
#[derive(Debug, Clone, Default)]
pub struct TransferStats {
    bytes: Arc<AtomicU64>,
}

impl TransferStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, n: u64) {
        self.bytes.fetch_add(n, Ordering::Relaxed);
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

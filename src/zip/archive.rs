use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::DEFAULT_MAX_ATTEMPTS;
use crate::error::{Error, Result, TransportError};
use crate::io::{Connector, ReadAt};

use super::parser::ZipParser;
use super::structures::EntryDescriptor;

/// An indexed archive: the central directory of one successfully opened
/// source, plus the source itself for streaming entries out of it.
pub struct Archive<R: ReadAt> {
    parser: ZipParser<R>,
    entries: Vec<EntryDescriptor>,
    by_name: HashMap<String, usize>,
}

impl<R: ReadAt> Archive<R> {
    /// Index `source` (of total length `size`) as a ZIP archive.
    pub async fn index(source: Arc<R>, size: u64) -> Result<Self> {
        let parser = ZipParser::new(source, size);
        let entries = parser.list_files().await?;

        let mut by_name = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            // Duplicates only occur in malformed archives; first one wins.
            by_name.entry(entry.name.clone()).or_insert(i);
        }

        Ok(Self {
            parser,
            entries,
            by_name,
        })
    }

    /// All members in central-directory order.
    pub fn entries(&self) -> &[EntryDescriptor] {
        &self.entries
    }

    pub fn entry(&self, name: &str) -> Option<&EntryDescriptor> {
        self.by_name.get(name).map(|&i| &self.entries[i])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total size of the underlying source in bytes.
    pub fn size(&self) -> u64 {
        self.parser.size()
    }

    pub(crate) fn parser(&self) -> &ZipParser<R> {
        &self.parser
    }
}

/// Opens archives over unreliable sources.
///
/// A truncated or garbled range response looks exactly like a corrupt
/// archive to the parser. The opener treats format failures (and short
/// reads) as transient and reruns the whole sequence on a fresh source:
/// connect, discover length, index. Anything else fails on the spot.
#[derive(Debug, Clone)]
pub struct ArchiveOpener {
    max_attempts: u32,
    cancel: CancellationToken,
}

impl Default for ArchiveOpener {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl ArchiveOpener {
    /// `max_attempts` is the total number of tries; zero is treated as one.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Open and index the archive `connector` points at.
    ///
    /// Fails with [`Error::ArchiveCorrupt`] wrapping the last failure when
    /// every attempt hit a transient error.
    pub async fn open<C: Connector>(&self, connector: &C) -> Result<Archive<C::Source>> {
        let mut attempt = 1;

        loop {
            if self.cancel.is_cancelled() {
                return Err(TransportError::Cancelled.into());
            }

            match self.try_open(connector).await {
                Ok(archive) => {
                    info!(
                        attempt,
                        entries = archive.len(),
                        size = archive.size(),
                        "archive opened"
                    );
                    return Ok(archive);
                }
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        "Caught error, {}, trying again ({} of {})",
                        e, attempt, self.max_attempts
                    );
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    return Err(Error::ArchiveCorrupt {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_open<C: Connector>(&self, connector: &C) -> Result<Archive<C::Source>> {
        let source = connector.connect().await?;
        let size = source.length().await?;
        Archive::index(Arc::new(source), size).await
    }
}

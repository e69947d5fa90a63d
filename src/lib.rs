//! # fwpluck
//!
//! Pull a single file out of a large remote firmware archive without
//! downloading the archive.
//!
//! The remote ZIP is addressed through HTTP Range requests: the central
//! directory is fetched from the tail of the file, then only the bytes of
//! the wanted entry are streamed and inflated. Range-driven parsing over a
//! flaky network produces failures that look like archive corruption, so
//! opening is retried a bounded number of times on format errors, while
//! transport failures surface at once.
//!
//! Extracted images can then be scanned for tagged elements such as the
//! key bag, see [`tag`].
//!
//! ## Example
//!
//! ```no_run
//! use fwpluck::{ArchiveOpener, EntryExtractor, FetchConfig, HttpConnector, TransferStats};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> fwpluck::Result<()> {
//!     let config = FetchConfig::default();
//!     let cancel = CancellationToken::new();
//!     let connector = HttpConnector::new(
//!         "https://example.com/firmware.ipsw",
//!         &config,
//!         cancel.clone(),
//!         TransferStats::new(),
//!     )?;
//!
//!     let archive = ArchiveOpener::new(config.max_attempts)
//!         .with_cancellation(cancel)
//!         .open(&connector)
//!         .await?;
//!
//!     let manifest = EntryExtractor::default()
//!         .extract_to_vec(&archive, "BuildManifest.plist")
//!         .await?;
//!     println!("{} bytes", manifest.len());
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod io;
pub mod tag;
pub mod zip;

pub use cli::Cli;
pub use config::FetchConfig;
pub use error::{Error, Result, TransportError};
pub use io::{
    ByteRange, Connector, HttpConnector, HttpRangeReader, LocalConnector, LocalFileReader,
    MemoryReader, ReadAt, TransferStats,
};
pub use tag::{TagRecord, find_kbag, find_tag};
pub use zip::{Archive, ArchiveOpener, EntryDescriptor, EntryExtractor};

use tokio::io::AsyncWrite;
use tokio_util::sync::CancellationToken;

/// Open the archive at `url` and stream the entry called `name` into `sink`.
///
/// Returns the number of bytes written. Network traffic is added to `stats`.
pub async fn fetch_entry<W>(
    url: &str,
    name: &str,
    sink: &mut W,
    config: &FetchConfig,
    cancel: CancellationToken,
    stats: TransferStats,
) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let connector = HttpConnector::new(url, config, cancel.clone(), stats)?;
    let archive = ArchiveOpener::new(config.max_attempts)
        .with_cancellation(cancel)
        .open(&connector)
        .await?;

    EntryExtractor::new(config.chunk_size)
        .extract(&archive, name, sink)
        .await
}

//! ZIP archive indexing and extraction over random-access sources.
//!
//! ## Architecture
//!
//! - [`structures`]: Data structures representing ZIP format elements (EOCD, file headers, etc.)
//! - [`parser`]: Low-level parsing of ZIP structures from raw bytes
//! - [`archive`]: The indexed [`Archive`] handle and the retrying [`ArchiveOpener`]
//! - [`extractor`]: Streaming an entry's decompressed bytes into a sink
//!
//! ## ZIP Format Overview
//!
//! A ZIP file consists of:
//! 1. Local file headers and compressed data for each file
//! 2. Central Directory with metadata for all files
//! 3. End of Central Directory (EOCD) record at the end
//!
//! The EOCD is read first (from the end of the file), then the Central
//! Directory, so listing an archive costs two or three range requests no
//! matter how large it is.
//!
//! ## Supported Features
//!
//! - Standard ZIP format (PKZIP APPNOTE 6.3.x compatible)
//! - ZIP64 extensions for files > 4GB
//! - STORED and DEFLATE compression methods
//!
//! ## Limitations
//!
//! - No encryption support
//! - No multi-disk archive support

mod archive;
mod extractor;
mod parser;
mod structures;

pub use archive::{Archive, ArchiveOpener};
pub use extractor::EntryExtractor;
pub use parser::ZipParser;
pub use structures::*;

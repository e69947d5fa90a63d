use std::io::Write;
use std::path::Path;

use crc32fast::Hasher;
use flate2::write::DeflateDecoder;
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::config::DEFAULT_CHUNK_SIZE;
use crate::error::{Error, Result};
use crate::io::ReadAt;

use super::archive::Archive;
use super::structures::{CompressionMethod, EntryDescriptor};

/// Streams archive members out to a sink.
///
/// Stored bytes are fetched `chunk_size` at a time; deflated entries are
/// inflated chunk by chunk, so memory use does not grow with the entry.
/// Nothing is retried here: the archive was already validated when it was
/// opened, and a failed read now is a dropped connection. The output is
/// checked against the directory's CRC-32 and size once the copy ends.
#[derive(Debug, Clone)]
pub struct EntryExtractor {
    chunk_size: u64,
}

impl Default for EntryExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl EntryExtractor {
    pub fn new(chunk_size: u64) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Stream the member called `name` into `sink`, returning the number of
    /// decompressed bytes written.
    pub async fn extract<R, W>(&self, archive: &Archive<R>, name: &str, sink: &mut W) -> Result<u64>
    where
        R: ReadAt,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let entry = archive.entry(name).ok_or_else(|| Error::EntryNotFound {
            name: name.to_string(),
        })?;
        self.extract_entry(archive, entry, sink).await
    }

    pub async fn extract_entry<R, W>(
        &self,
        archive: &Archive<R>,
        entry: &EntryDescriptor,
        sink: &mut W,
    ) -> Result<u64>
    where
        R: ReadAt,
        W: AsyncWrite + Unpin + ?Sized,
    {
        let mut inflater = match entry.compression_method {
            CompressionMethod::Stored => None,
            CompressionMethod::Deflate => Some(DeflateDecoder::new(Vec::new())),
            CompressionMethod::Unknown(method) => {
                return Err(Error::UnsupportedCompression(method));
            }
        };

        let parser = archive.parser();
        let data_offset = parser
            .get_data_offset(entry)
            .await
            .map_err(Error::into_transport)?;
        debug!(
            name = %entry.name,
            data_offset,
            compressed = entry.compressed_size,
            uncompressed = entry.uncompressed_size,
            "extracting entry"
        );

        let mut consumed = 0u64;
        let mut written = 0u64;
        let mut hasher = Hasher::new();

        while consumed < entry.compressed_size {
            let want = (entry.compressed_size - consumed).min(self.chunk_size);
            let chunk = parser
                .reader()
                .read_at(data_offset + consumed, want)
                .await
                .map_err(Error::into_transport)?;
            consumed += chunk.len() as u64;

            match inflater.as_mut() {
                None => {
                    hasher.update(&chunk);
                    sink.write_all(&chunk).await?;
                    written += chunk.len() as u64;
                }
                Some(decoder) => {
                    decoder
                        .write_all(&chunk)
                        .map_err(|e| corrupt_stream(entry, e))?;
                    written += drain(decoder, &mut hasher, sink).await?;
                }
            }
        }

        if let Some(mut decoder) = inflater {
            decoder.try_finish().map_err(|e| corrupt_stream(entry, e))?;
            written += drain(&mut decoder, &mut hasher, sink).await?;
        }

        sink.flush().await?;
        verify(entry, written, hasher.finalize())?;
        Ok(written)
    }

    /// Extract the member called `name` into memory.
    pub async fn extract_to_vec<R: ReadAt>(&self, archive: &Archive<R>, name: &str) -> Result<Vec<u8>> {
        let capacity = archive
            .entry(name)
            .map_or(0, |e| e.uncompressed_size.min(self.chunk_size) as usize);
        let mut buf = Vec::with_capacity(capacity);
        self.extract(archive, name, &mut buf).await?;
        Ok(buf)
    }

    /// Extract the member called `name` to `output_path`, creating parent
    /// directories as needed.
    pub async fn extract_to_file<R: ReadAt>(
        &self,
        archive: &Archive<R>,
        name: &str,
        output_path: &Path,
    ) -> Result<u64> {
        // Look the entry up first so a missing member never leaves an empty file behind.
        let entry = archive.entry(name).ok_or_else(|| Error::EntryNotFound {
            name: name.to_string(),
        })?;

        if let Some(parent) = output_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut file = fs::File::create(output_path).await?;
        self.extract_entry(archive, entry, &mut file).await
    }
}

/// Move whatever the inflater has produced so far into the sink.
async fn drain<W>(
    decoder: &mut DeflateDecoder<Vec<u8>>,
    hasher: &mut Hasher,
    sink: &mut W,
) -> Result<u64>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let out = decoder.get_mut();
    if out.is_empty() {
        return Ok(0);
    }
    hasher.update(out);
    sink.write_all(out).await?;
    let n = out.len() as u64;
    out.clear();
    Ok(n)
}

/// A truncated stream inflates to fewer bytes than recorded; a flipped
/// byte shows up in the checksum.
fn verify(entry: &EntryDescriptor, written: u64, crc: u32) -> Result<()> {
    if written != entry.uncompressed_size {
        return Err(Error::format(format!(
            "'{}' inflated to {} bytes, directory says {}",
            entry.name, written, entry.uncompressed_size
        )));
    }
    if crc != entry.crc32 {
        return Err(Error::format(format!(
            "checksum mismatch in '{}': {:08x}, directory says {:08x}",
            entry.name, crc, entry.crc32
        )));
    }
    Ok(())
}

fn corrupt_stream(entry: &EntryDescriptor, err: std::io::Error) -> Error {
    Error::format(format!("corrupt deflate stream in '{}': {}", entry.name, err))
}

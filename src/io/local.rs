use super::{ByteRange, Connector, ReadAt};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Local file reader with random access support
pub struct LocalFileReader {
    file: std::fs::File,
    size: u64,
}

impl LocalFileReader {
    pub fn new(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let size = file.metadata()?.len();
        Ok(Self { file, size })
    }

    fn pread(&self, buf: &mut [u8], offset: u64) -> std::io::Result<usize> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.file.read_at(buf, offset)
        }

        #[cfg(windows)]
        {
            use std::os::windows::fs::FileExt;
            self.file.seek_read(buf, offset)
        }

        #[cfg(not(any(unix, windows)))]
        {
            use std::io::{Read, Seek, SeekFrom};
            let mut file = &self.file;
            file.seek(SeekFrom::Start(offset))?;
            file.read(buf)
        }
    }
}

#[async_trait]
impl ReadAt for LocalFileReader {
    async fn length(&self) -> Result<u64> {
        Ok(self.size)
    }

    async fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        let Some(range) = ByteRange::for_read(offset, len, self.size)? else {
            return Ok(Vec::new());
        };

        let mut buf = vec![0u8; range.len() as usize];
        let mut filled = 0;
        while filled < buf.len() {
            match self.pread(&mut buf[filled..], range.start + filled as u64) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }

        if filled < buf.len() {
            // File shrank underneath us.
            return Err(Error::ShortRead {
                offset: range.start,
                expected: range.len(),
                received: filled as u64,
            });
        }

        Ok(buf)
    }
}

/// Opens the same local archive for every attempt.
pub struct LocalConnector {
    path: PathBuf,
}

impl LocalConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Connector for LocalConnector {
    type Source = LocalFileReader;

    async fn connect(&self) -> Result<LocalFileReader> {
        LocalFileReader::new(&self.path)
    }
}

use std::sync::Arc;

use async_trait::async_trait;

use super::{ByteRange, ReadAt};
use crate::error::Result;

/// In-memory byte source, handy for archives that are already resident.
#[derive(Debug, Clone)]
pub struct MemoryReader {
    data: Arc<[u8]>,
}

impl MemoryReader {
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl ReadAt for MemoryReader {
    async fn length(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    async fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        match ByteRange::for_read(offset, len, self.data.len() as u64)? {
            Some(range) => Ok(self.data[range.start as usize..range.end as usize].to_vec()),
            None => Ok(Vec::new()),
        }
    }
}

use crate::core::error::{Error, ErrorKind, Result};
use crate::oram::bucket::BUCKET_BLOB_SIZE;

/// The two calls the untrusted host exposes. Blobs are fixed-size,
/// encrypted bucket images; the host never sees anything else.
pub trait HostStorage {
    fn read_bucket(&mut self, position: u32) -> Result<Vec<u8>>;
    fn write_bucket(&mut self, position: u32, blob: &[u8]) -> Result<()>;
}

/// In-memory bucket array, the reference host used by tests and benches.
#[derive(Debug, Default)]
pub struct MemoryHost {
    buckets: Vec<Vec<u8>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        MemoryHost::default()
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

impl HostStorage for MemoryHost {
    fn read_bucket(&mut self, position: u32) -> Result<Vec<u8>> {
        self.buckets
            .get(position as usize)
            .cloned()
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::StorageUnavailable,
                    format!("bucket {} was never written", position),
                )
            })
    }

    fn write_bucket(&mut self, position: u32, blob: &[u8]) -> Result<()> {
        if blob.len() != BUCKET_BLOB_SIZE {
            return Err(Error::new(
                ErrorKind::StorageUnavailable,
                format!("host expects {}-byte blobs, got {}", BUCKET_BLOB_SIZE, blob.len()),
            ));
        }
        let index = position as usize;
        if index >= self.buckets.len() {
            self.buckets.resize(index + 1, Vec::new());
        }
        self.buckets[index] = blob.to_vec();
        Ok(())
    }
}

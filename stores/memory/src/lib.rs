//! In-memory `Store` backend.
//!
//! Everything lives in a concurrent map for the lifetime of the value, which
//! makes it the natural backing for per-request block stores that must not
//! outlive the request.

use bytes::Bytes;
use dashmap::DashMap;
use futures::stream::{self, Stream};
use vfetch_core::store::{StoreError, StoreFeatures, StoreResult};

use std::io;

#[derive(Debug)]
pub struct MemoryStore {
    files: DashMap<String, Bytes>,
}

impl MemoryStore {
    /// Creates a new, empty `MemoryStore`.
    pub fn new() -> Self {
        Self {
            files: DashMap::new(),
        }
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Sum of the sizes of all stored objects.
    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|entry| entry.value().len() as u64).sum()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl vfetch_core::store::Store for MemoryStore {
    fn features(&self) -> StoreFeatures {
        StoreFeatures {
            random_access: true,
            case_sensitive: true,
        }
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        Ok(self.files.contains_key(path))
    }

    async fn put_bytes(&self, path: &str, bytes: Bytes) -> StoreResult<()> {
        self.files.insert(path.to_string(), bytes);
        Ok(())
    }

    async fn open_read_bytes(
        &self,
        path: &str,
        offset: u64,
        max_len: Option<u64>,
    ) -> StoreResult<Bytes> {
        let file = self.files.get(path).ok_or(StoreError::NotFound)?;
        let file_len = file.len();
        let start = offset as usize;

        if start >= file_len {
            return Ok(Bytes::new());
        }

        let remaining = file_len - start;
        let len = match max_len {
            Some(max) => std::cmp::min(remaining, max as usize),
            None => remaining,
        };

        Ok(file.slice(start..start + len))
    }

    async fn size(&self, path: &str) -> StoreResult<u64> {
        let file = self.files.get(path).ok_or(StoreError::NotFound)?;
        Ok(file.len() as u64)
    }

    async fn list(
        &self,
    ) -> StoreResult<Box<dyn Stream<Item = Result<String, io::Error>> + Send + Unpin + 'static>>
    {
        let keys: Vec<Result<String, io::Error>> = self
            .files
            .iter()
            .map(|entry| Ok(entry.key().clone()))
            .collect();
        Ok(Box::new(stream::iter(keys)))
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        self.files.remove(path).ok_or(StoreError::NotFound)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use vfetch_core::cid::RAW;
    use vfetch_core::testutil::{DagBuilder, StoreTests, random_bytes};
    use vfetch_core::{Block, Blockstore, LocalBlockstore, ingest};

    #[tokio::test]
    async fn test_store_conformance() {
        let store = MemoryStore::new();
        StoreTests::new(&store).run_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_blockstore_on_memory() {
        let memory = Arc::new(MemoryStore::new());
        let bs = LocalBlockstore::new(memory.clone());
        assert!(bs.supports_random_access());

        let block = Block::from_data(RAW, b"in memory".to_vec());
        bs.put(block.clone()).await.unwrap();
        bs.put(block.clone()).await.unwrap();
        assert_eq!(memory.len(), 1);
        assert_eq!(bs.get(block.cid()).await.unwrap(), block);
    }

    #[tokio::test]
    async fn test_concurrent_ingestion_of_shared_blocks() {
        let memory = Arc::new(MemoryStore::new());
        let bs = Arc::new(LocalBlockstore::new(memory.clone()));
        let dag = DagBuilder::new(512, 8).file(&random_bytes(64 * 1024));
        let car = Arc::new(dag.car());

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let bs = bs.clone();
                let car = car.clone();
                tokio::spawn(async move { ingest(car.as_slice(), bs.as_ref()).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(memory.len(), dag.blocks.len());
        assert_eq!(
            memory.total_bytes(),
            dag.blocks.iter().map(|b| b.len() as u64).sum::<u64>()
        );
    }
}

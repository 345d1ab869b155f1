//! Test utilities: an in-process mock store, a conformance suite for `Store`
//! implementations, and builders for UnixFS DAGs and CAR archives.
//!
//! In a downstream crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! vfetch_core = { workspace = true, features = ["testutil"] }
//! ```
//!
//! Then run the suite against a store:
//!
//! ```ignore
//! use vfetch_core::testutil::StoreTests;
//!
//! #[tokio::test]
//! async fn test_my_store() {
//!     let store = MyStore::new(...);
//!     StoreTests::new(&store).run_all().await.unwrap();
//! }
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt, stream};
use rand::Rng;

use crate::block::Block;
use crate::car::write_car;
use crate::cid::{Cid, DAG_PB, RAW, sha256_cid};
use crate::dag::pb::{PbLink, PbNode};
use crate::dag::unixfs::{DataType, UnixfsData};
use crate::store::{Store, StoreError, StoreFeatures, StoreResult};

/// A `Store` over a locked map, for unit tests that need a backing store
/// without pulling in a backend crate.
#[derive(Debug)]
pub struct MockStore {
    files: Mutex<BTreeMap<String, Bytes>>,
    random_access: bool,
}

impl Default for MockStore {
    fn default() -> Self {
        Self {
            files: Mutex::new(BTreeMap::new()),
            random_access: true,
        }
    }
}

impl MockStore {
    /// A store that reports no random access support.
    pub fn sequential() -> Self {
        Self {
            random_access: false,
            ..Self::default()
        }
    }

    fn files(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Bytes>> {
        self.files.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Store for MockStore {
    fn features(&self) -> StoreFeatures {
        StoreFeatures {
            random_access: self.random_access,
            case_sensitive: true,
        }
    }

    async fn exists(&self, path: &str) -> StoreResult<bool> {
        Ok(self.files().contains_key(path))
    }

    async fn put_bytes(&self, path: &str, bytes: Bytes) -> StoreResult<()> {
        self.files().insert(path.to_string(), bytes);
        Ok(())
    }

    async fn open_read_bytes(
        &self,
        path: &str,
        offset: u64,
        max_len: Option<u64>,
    ) -> StoreResult<Bytes> {
        let file = self.files().get(path).cloned().ok_or(StoreError::NotFound)?;
        let start = (offset as usize).min(file.len());
        let end = match max_len {
            Some(max) => start.saturating_add(max as usize).min(file.len()),
            None => file.len(),
        };
        Ok(file.slice(start..end))
    }

    async fn size(&self, path: &str) -> StoreResult<u64> {
        let files = self.files();
        let file = files.get(path).ok_or(StoreError::NotFound)?;
        Ok(file.len() as u64)
    }

    async fn list(
        &self,
    ) -> StoreResult<Box<dyn Stream<Item = Result<String, std::io::Error>> + Send + Unpin + 'static>>
    {
        let keys: Vec<_> = self.files().keys().cloned().map(Ok).collect();
        Ok(Box::new(stream::iter(keys)))
    }

    async fn delete(&self, path: &str) -> StoreResult<()> {
        self.files().remove(path).ok_or(StoreError::NotFound)?;
        Ok(())
    }
}

/// Test suite for `Store` implementations.
pub struct StoreTests<'a, S> {
    store: &'a S,
    /// Prefix for test files to avoid conflicts
    prefix: String,
}

impl<'a, S: Store> StoreTests<'a, S> {
    pub fn new(store: &'a S) -> Self {
        let prefix = format!("_test_{}/", rand::rng().random::<u32>());
        Self { store, prefix }
    }

    fn path(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    pub async fn run_all(&self) -> StoreResult<()> {
        self.test_put_get_bytes().await?;
        self.test_exists().await?;
        self.test_size().await?;
        self.test_delete().await?;
        self.test_list().await?;
        self.test_partial_read().await?;
        self.test_missing().await?;
        self.cleanup().await?;
        Ok(())
    }

    pub async fn test_put_get_bytes(&self) -> StoreResult<()> {
        let path = self.path("bytes_test.bin");
        let data = Bytes::from_static(b"hello, world!");
        self.store.put_bytes(&path, data.clone()).await?;
        let retrieved = self.store.open_read_bytes(&path, 0, None).await?;
        assert_eq!(retrieved, data, "retrieved data should match original");
        Ok(())
    }

    pub async fn test_exists(&self) -> StoreResult<()> {
        let path = self.path("exists_test.bin");
        assert!(
            !self.store.exists(&path).await?,
            "file should not exist before creation"
        );
        self.store
            .put_bytes(&path, Bytes::from_static(b"test"))
            .await?;
        assert!(
            self.store.exists(&path).await?,
            "file should exist after creation"
        );
        Ok(())
    }

    pub async fn test_size(&self) -> StoreResult<()> {
        let path = self.path("size_test.bin");
        self.store
            .put_bytes(&path, Bytes::from(vec![42u8; 12345]))
            .await?;
        assert_eq!(self.store.size(&path).await?, 12345);
        Ok(())
    }

    pub async fn test_delete(&self) -> StoreResult<()> {
        let path = self.path("delete_test.bin");
        self.store
            .put_bytes(&path, Bytes::from_static(b"to be deleted"))
            .await?;
        self.store.delete(&path).await?;
        assert!(
            !self.store.exists(&path).await?,
            "file should not exist after delete"
        );
        Ok(())
    }

    pub async fn test_list(&self) -> StoreResult<()> {
        let files = ["list_a.bin", "list_b.bin", "blocks/list_c.bin"];
        for file in &files {
            self.store
                .put_bytes(&self.path(file), Bytes::from_static(b"list test"))
                .await?;
        }

        let mut stream = self.store.list().await?;
        let mut found = HashSet::new();
        while let Some(result) = stream.next().await {
            let path = result?;
            if path.starts_with(&self.prefix) {
                found.insert(path);
            }
        }
        for file in &files {
            let path = self.path(file);
            assert!(found.contains(&path), "list should contain {}", path);
        }
        Ok(())
    }

    pub async fn test_partial_read(&self) -> StoreResult<()> {
        let path = self.path("partial_test.bin");
        self.store
            .put_bytes(&path, Bytes::from_static(b"0123456789abcdef"))
            .await?;

        let partial = self.store.open_read_bytes(&path, 5, None).await?;
        assert_eq!(partial.as_ref(), b"56789abcdef", "offset read should work");
        let partial = self.store.open_read_bytes(&path, 4, Some(4)).await?;
        assert_eq!(partial.as_ref(), b"4567", "offset + length read should work");
        let past_end = self.store.open_read_bytes(&path, 100, None).await?;
        assert!(past_end.is_empty(), "reading past the end should be empty");
        Ok(())
    }

    pub async fn test_missing(&self) -> StoreResult<()> {
        let path = self.path("never_written.bin");
        let err = self
            .store
            .open_read_bytes(&path, 0, None)
            .await
            .expect_err("reading a missing file should fail");
        assert!(
            crate::store::is_not_found(&err),
            "missing file should report NotFound, got {err}"
        );
        Ok(())
    }

    pub async fn cleanup(&self) -> StoreResult<()> {
        let mut stream = self.store.list().await?;
        let mut doomed = Vec::new();
        while let Some(result) = stream.next().await {
            let path = result?;
            if path.starts_with(&self.prefix) {
                doomed.push(path);
            }
        }
        for path in doomed {
            let _ = self.store.delete(&path).await;
        }
        Ok(())
    }
}

/// Generate random bytes for testing.
pub fn random_bytes(len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    rand::rng().fill(&mut data[..]);
    Bytes::from(data)
}

/// A DAG and every block in it, root first.
#[derive(Debug, Clone)]
pub struct Dag {
    pub root: Cid,
    pub size: u64,
    pub blocks: Vec<Block>,
}

impl Dag {
    /// Encodes the DAG as a CARv1 rooted at its root.
    pub fn car(&self) -> Vec<u8> {
        car_bytes(std::slice::from_ref(&self.root), &self.blocks)
    }
}

/// Builds balanced UnixFS files from raw sha2-256 leaves.
#[derive(Debug, Clone, Copy)]
pub struct DagBuilder {
    chunk_size: usize,
    max_links: usize,
}

impl DagBuilder {
    pub fn new(chunk_size: usize, max_links: usize) -> Self {
        assert!(chunk_size > 0 && max_links > 1);
        Self {
            chunk_size,
            max_links,
        }
    }

    pub fn file(&self, content: &[u8]) -> Dag {
        let mut blocks = Vec::new();
        let mut level: Vec<(Cid, u64)> = if content.is_empty() {
            vec![(sha256_cid(RAW, &[]), 0)]
        } else {
            content
                .chunks(self.chunk_size)
                .map(|chunk| {
                    let block = Block::from_data(RAW, chunk.to_vec());
                    let entry = (*block.cid(), chunk.len() as u64);
                    blocks.push(block);
                    entry
                })
                .collect()
        };
        if content.is_empty() {
            blocks.push(Block::from_data(RAW, Vec::new()));
        }

        while level.len() > 1 {
            level = level
                .chunks(self.max_links)
                .map(|children| {
                    let block = file_node(children);
                    let size = children.iter().map(|(_, size)| size).sum();
                    let entry = (*block.cid(), size);
                    blocks.push(block);
                    entry
                })
                .collect();
        }

        let (root, size) = level.remove(0);
        blocks.reverse();
        Dag { root, size, blocks }
    }
}

fn file_node(children: &[(Cid, u64)]) -> Block {
    let mut unixfs = UnixfsData::new(DataType::File);
    unixfs.blocksizes = children.iter().map(|(_, size)| *size).collect();
    unixfs.filesize = Some(unixfs.blocksizes.iter().sum());
    let node = PbNode {
        links: children
            .iter()
            .map(|(cid, size)| PbLink {
                cid: *cid,
                name: Some(String::new()),
                tsize: Some(*size),
            })
            .collect(),
        data: Some(Bytes::from(unixfs.encode())),
    };
    Block::from_data(DAG_PB, node.encode())
}

/// A UnixFS directory block linking `entries` by name.
pub fn directory<'a>(entries: impl IntoIterator<Item = (&'a str, Cid)>) -> Block {
    let node = PbNode {
        links: entries
            .into_iter()
            .map(|(name, cid)| PbLink {
                cid,
                name: Some(name.to_string()),
                tsize: None,
            })
            .collect(),
        data: Some(Bytes::from(UnixfsData::new(DataType::Directory).encode())),
    };
    Block::from_data(DAG_PB, node.encode())
}

/// Encodes `blocks` as a CARv1 in the given order.
pub fn car_bytes(roots: &[Cid], blocks: &[Block]) -> Vec<u8> {
    let sections = blocks.iter().map(|block| (*block.cid(), block.data()));
    futures::executor::block_on(write_car(roots.to_vec(), sections))
        .expect("CAR encodes into memory")
}

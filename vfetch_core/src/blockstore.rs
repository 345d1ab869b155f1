use std::sync::Arc;

use async_trait::async_trait;
use futures::TryStreamExt;

use crate::block::Block;
use crate::cid::{Cid, IDENTITY, Multihash, RAW};
use crate::error::{Error, Result};
use crate::store::{Store, is_not_found};

/// CID-keyed block storage.
#[async_trait]
pub trait Blockstore: Send + Sync {
    async fn has(&self, cid: &Cid) -> Result<bool>;

    /// Fails with [`Error::BlockNotFound`] when the block is absent.
    async fn get(&self, cid: &Cid) -> Result<Block>;

    async fn get_size(&self, cid: &Cid) -> Result<u64>;

    async fn put(&self, block: Block) -> Result<()>;

    async fn put_many(&self, blocks: Vec<Block>) -> Result<()> {
        for block in blocks {
            self.put(block).await?;
        }
        Ok(())
    }

    async fn delete_block(&self, cid: &Cid) -> Result<()>;

    async fn all_keys(&self) -> Result<Vec<Cid>>;

    /// Whether blocks can be fetched out of order cheaply, which is what
    /// makes seeking within files built on this store worthwhile.
    fn supports_random_access(&self) -> bool {
        false
    }
}

#[async_trait]
impl<T: Blockstore + ?Sized> Blockstore for Arc<T> {
    async fn has(&self, cid: &Cid) -> Result<bool> {
        (**self).has(cid).await
    }

    async fn get(&self, cid: &Cid) -> Result<Block> {
        (**self).get(cid).await
    }

    async fn get_size(&self, cid: &Cid) -> Result<u64> {
        (**self).get_size(cid).await
    }

    async fn put(&self, block: Block) -> Result<()> {
        (**self).put(block).await
    }

    async fn put_many(&self, blocks: Vec<Block>) -> Result<()> {
        (**self).put_many(blocks).await
    }

    async fn delete_block(&self, cid: &Cid) -> Result<()> {
        (**self).delete_block(cid).await
    }

    async fn all_keys(&self) -> Result<Vec<Cid>> {
        (**self).all_keys().await
    }

    fn supports_random_access(&self) -> bool {
        (**self).supports_random_access()
    }
}

const BLOCK_PREFIX: &str = "blocks/";

/// Write-once block store on top of a key→bytes [`Store`].
///
/// Blocks are keyed by multihash, so the same content reached through a
/// CIDv0 and a CIDv1 (or different codecs) is stored once. Identity-hash
/// CIDs carry their content inline and never touch the backing store.
#[derive(Debug, Clone)]
pub struct LocalBlockstore {
    store: Arc<dyn Store>,
}

impl LocalBlockstore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn key(cid: &Cid) -> String {
        format!(
            "{BLOCK_PREFIX}{}",
            data_encoding::BASE32_NOPAD.encode(&cid.hash().to_bytes())
        )
    }

    fn cid_from_key(key: &str) -> Option<Cid> {
        let encoded = key.strip_prefix(BLOCK_PREFIX)?;
        let bytes = data_encoding::BASE32_NOPAD
            .decode(encoded.as_bytes())
            .ok()?;
        let hash = Multihash::from_bytes(&bytes).ok()?;
        Some(Cid::new_v1(RAW, hash))
    }

    fn inline(cid: &Cid) -> Option<Block> {
        (cid.hash().code() == IDENTITY).then(|| {
            Block::new_unchecked(
                *cid,
                bytes::Bytes::copy_from_slice(cid.hash().digest()),
            )
        })
    }
}

#[async_trait]
impl Blockstore for LocalBlockstore {
    async fn has(&self, cid: &Cid) -> Result<bool> {
        if Self::inline(cid).is_some() {
            return Ok(true);
        }
        self.store.exists(&Self::key(cid)).await.map_err(Error::Store)
    }

    async fn get(&self, cid: &Cid) -> Result<Block> {
        if let Some(block) = Self::inline(cid) {
            return Ok(block);
        }
        match self.store.open_read_bytes(&Self::key(cid), 0, None).await {
            Ok(data) => Ok(Block::new_unchecked(*cid, data)),
            Err(err) if is_not_found(&err) => Err(Error::BlockNotFound { cid: *cid }),
            Err(err) => Err(Error::Store(err)),
        }
    }

    async fn get_size(&self, cid: &Cid) -> Result<u64> {
        if let Some(block) = Self::inline(cid) {
            return Ok(block.len() as u64);
        }
        match self.store.size(&Self::key(cid)).await {
            Ok(size) => Ok(size),
            Err(err) if is_not_found(&err) => Err(Error::BlockNotFound { cid: *cid }),
            Err(err) => Err(Error::Store(err)),
        }
    }

    async fn put(&self, block: Block) -> Result<()> {
        if Self::inline(block.cid()).is_some() {
            return Ok(());
        }
        let key = Self::key(block.cid());
        if self.store.exists(&key).await.map_err(Error::Store)? {
            tracing::trace!(cid = %block.cid(), "block already stored");
            return Ok(());
        }
        let (_, data) = block.into_parts();
        self.store.put_bytes(&key, data).await.map_err(Error::Store)
    }

    async fn delete_block(&self, cid: &Cid) -> Result<()> {
        if Self::inline(cid).is_some() {
            return Ok(());
        }
        match self.store.delete(&Self::key(cid)).await {
            Ok(()) => Ok(()),
            Err(err) if is_not_found(&err) => Ok(()),
            Err(err) => Err(Error::Store(err)),
        }
    }

    /// Keys come back as raw-codec CIDv1s since only the multihash is kept.
    async fn all_keys(&self) -> Result<Vec<Cid>> {
        let keys: Vec<String> = self
            .store
            .list()
            .await
            .map_err(Error::Store)?
            .try_collect()
            .await?;
        Ok(keys.iter().filter_map(|key| Self::cid_from_key(key)).collect())
    }

    fn supports_random_access(&self) -> bool {
        self.store.features().random_access
    }
}

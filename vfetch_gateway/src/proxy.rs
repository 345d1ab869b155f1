use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use vfetch_bitswap::PubSub;
use vfetch_core::{Block, Blockstore, Cid, ContentPath};

use crate::client::{ACCEPT_CAR, ByteStream, GatewayClient};
use crate::config::GatewayConfig;
use crate::error::{GatewayError, into_core};

/// A read-only [`Blockstore`] backed by trustless gateways.
///
/// Every read is a raw-block fetch checked against the requested CID, so a
/// dishonest gateway can fail a read but never satisfy it with wrong bytes.
/// Writes are refused: this is a trust boundary, not a place to keep data.
pub struct ProxyBlockstore {
    client: Arc<GatewayClient>,
    validate: AtomicBool,
    notifier: Option<PubSub>,
}

impl ProxyBlockstore {
    /// Verifies reads unless `client` was configured not to.
    pub fn new(client: Arc<GatewayClient>) -> Self {
        Self {
            validate: AtomicBool::new(client.validates()),
            client,
            notifier: None,
        }
    }

    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        Ok(Self::new(Arc::new(GatewayClient::new(config)?)))
    }

    /// Publishes every block read through this store on `bus`.
    pub fn with_notifier(mut self, bus: PubSub) -> Self {
        self.notifier = Some(bus);
        self
    }

    /// Turns verification of fetched blocks on or off. Only disable it for
    /// gateways that are trusted by other means.
    pub fn hash_on_read(&self, enabled: bool) {
        self.validate.store(enabled, Ordering::Relaxed);
    }

    async fn fetch(&self, cid: &Cid) -> vfetch_core::Result<Block> {
        let validate = self.validate.load(Ordering::Relaxed);
        let block = self
            .client
            .fetch_block_checked(cid, validate)
            .await
            .map_err(|err| {
                if err.is_not_found() {
                    vfetch_core::Error::BlockNotFound { cid: *cid }
                } else {
                    into_core(err)
                }
            })?;
        if let Some(bus) = &self.notifier {
            bus.publish(&block);
        }
        Ok(block)
    }

    /// Streams the CAR for `path` from a gateway into `callback`.
    pub async fn fetch_car<F, Fut, T>(&self, path: &ContentPath, callback: F) -> Result<T, GatewayError>
    where
        F: FnOnce(ByteStream) -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        tracing::debug!(%path, "car fetch");
        let body = self.client.fetch(path, ACCEPT_CAR).await?;
        callback(body).await
    }
}

#[async_trait]
impl Blockstore for ProxyBlockstore {
    async fn has(&self, cid: &Cid) -> vfetch_core::Result<bool> {
        match self.fetch(cid).await {
            Ok(_) => Ok(true),
            Err(vfetch_core::Error::BlockNotFound { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn get(&self, cid: &Cid) -> vfetch_core::Result<Block> {
        self.fetch(cid).await
    }

    async fn get_size(&self, cid: &Cid) -> vfetch_core::Result<u64> {
        Ok(self.fetch(cid).await?.len() as u64)
    }

    async fn put(&self, _block: Block) -> vfetch_core::Result<()> {
        Err(vfetch_core::Error::NotImplemented("put on a gateway proxy"))
    }

    async fn put_many(&self, _blocks: Vec<Block>) -> vfetch_core::Result<()> {
        Err(vfetch_core::Error::NotImplemented("put_many on a gateway proxy"))
    }

    async fn delete_block(&self, _cid: &Cid) -> vfetch_core::Result<()> {
        Err(vfetch_core::Error::NotImplemented("delete on a gateway proxy"))
    }

    async fn all_keys(&self) -> vfetch_core::Result<Vec<Cid>> {
        Err(vfetch_core::Error::NotImplemented("listing a gateway proxy"))
    }

    fn supports_random_access(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use vfetch_core::cid::RAW;

    use super::*;

    fn proxy() -> ProxyBlockstore {
        let config = GatewayConfig::default().with_gateways(["http://127.0.0.1:9"]);
        ProxyBlockstore::from_config(&config).unwrap()
    }

    #[tokio::test]
    async fn test_writes_are_refused() {
        let store = proxy();
        let block = Block::from_data(RAW, b"x".to_vec());
        assert!(matches!(
            store.put(block.clone()).await,
            Err(vfetch_core::Error::NotImplemented(_))
        ));
        assert!(matches!(
            store.put_many(vec![block.clone()]).await,
            Err(vfetch_core::Error::NotImplemented(_))
        ));
        assert!(matches!(
            store.delete_block(block.cid()).await,
            Err(vfetch_core::Error::NotImplemented(_))
        ));
        assert!(matches!(
            store.all_keys().await,
            Err(vfetch_core::Error::NotImplemented(_))
        ));
    }
}

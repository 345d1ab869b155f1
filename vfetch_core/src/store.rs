use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

pub type StoreResult<T, E = anyhow::Error> = std::result::Result<T, E>;

/// Key→bytes persistence backend. Block stores and other higher layers sit
/// on top of this; implementations know nothing about content addressing.
#[async_trait]
pub trait Store: std::fmt::Debug + Send + Sync + 'static {
    fn features(&self) -> StoreFeatures;

    async fn exists(&self, path: &str) -> StoreResult<bool>;

    async fn put_bytes(&self, path: &str, bytes: Bytes) -> StoreResult<()>;

    /// Reads `max_len` bytes (or everything) starting at `offset`. Reading
    /// past the end yields an empty buffer.
    async fn open_read_bytes(
        &self,
        path: &str,
        offset: u64,
        max_len: Option<u64>,
    ) -> StoreResult<Bytes>;

    async fn size(&self, path: &str) -> StoreResult<u64>;

    async fn list(
        &self,
    ) -> StoreResult<Box<dyn Stream<Item = Result<String, std::io::Error>> + Send + Unpin + 'static>>;

    async fn delete(&self, path: &str) -> StoreResult<()>;
}

pub struct StoreFeatures {
    /// Ranged reads are cheap, so readers on top may seek.
    pub random_access: bool,
    pub case_sensitive: bool,
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
}

/// True if `err` is (or wraps) [`StoreError::NotFound`].
pub fn is_not_found(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<StoreError>(), Some(StoreError::NotFound))
}

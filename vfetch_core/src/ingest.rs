use bytes::Bytes;
use tokio::io::AsyncRead;

use crate::block::Block;
use crate::blockstore::Blockstore;
use crate::car;
use crate::cid::Cid;
use crate::error::Result;

/// What a successful ingestion stored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub roots: Vec<Cid>,
    /// Blocks newly written.
    pub blocks: u64,
    /// Blocks that were already present and skipped.
    pub duplicates: u64,
    /// Payload bytes of newly written blocks.
    pub bytes: u64,
}

/// Reads a CAR from `reader`, verifying every block against its CID before
/// writing it to `store` in stream order.
///
/// The first block that fails verification aborts with
/// [`Error::HashMismatch`](crate::Error::HashMismatch); nothing after it is
/// read. Blocks stored before the failure are not removed.
pub async fn ingest<R, B>(reader: R, store: &B) -> Result<IngestSummary>
where
    R: AsyncRead + Unpin + Send,
    B: Blockstore + ?Sized,
{
    let mut car = car::open(reader).await?;
    let mut summary = IngestSummary {
        roots: car.header().roots().to_vec(),
        ..Default::default()
    };

    while let Some((cid, data)) = car.next_block().await? {
        let block = Block::new(cid, Bytes::from(data)).inspect_err(|err| {
            tracing::warn!(%err, "rejecting archive");
        })?;
        if store.has(block.cid()).await? {
            summary.duplicates += 1;
            continue;
        }
        summary.blocks += 1;
        summary.bytes += block.len() as u64;
        store.put(block).await?;
    }

    tracing::debug!(
        blocks = summary.blocks,
        duplicates = summary.duplicates,
        bytes = summary.bytes,
        "archive ingested"
    );
    Ok(summary)
}

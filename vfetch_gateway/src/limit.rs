use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::{Stream, StreamExt};

use crate::error::{GatewayError, Result};

/// Fails a body stream once it yields more than `limit` bytes.
///
/// A body of exactly `limit` bytes passes; the chunk that crosses the limit
/// is replaced by [`GatewayError::LimitExceeded`] and the stream ends.
pub struct LimitedStream<S> {
    inner: S,
    limit: u64,
    seen: u64,
    done: bool,
}

impl<S> LimitedStream<S> {
    pub fn new(inner: S, limit: u64) -> Self {
        Self {
            inner,
            limit,
            seen: 0,
            done: false,
        }
    }
}

impl<S> Stream for LimitedStream<S>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        match this.inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.seen = this.seen.saturating_add(chunk.len() as u64);
                if this.seen > this.limit {
                    this.done = true;
                    tracing::warn!(limit = this.limit, "response body over limit");
                    return Poll::Ready(Some(Err(GatewayError::LimitExceeded {
                        limit: this.limit,
                    })));
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(err))) => {
                this.done = true;
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Collects a body stream into memory.
pub async fn collect<S>(mut stream: S) -> Result<Bytes>
where
    S: Stream<Item = Result<Bytes>> + Unpin,
{
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        buf.extend_from_slice(&chunk?);
    }
    Ok(buf.freeze())
}

//! Fan-out of newly available blocks to concurrent waiters.
//!
//! Each subscription registers interest in a set of CIDs and owns a small
//! bounded queue. Publishing a block hands it to every subscription still
//! waiting for that CID and removes those registrations, so a subscription
//! sees at most one block per key. A subscription ends once every key has
//! been delivered, when its cancellation token fires, when it is dropped, or
//! when the bus shuts down.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use vfetch_core::{Block, Cid};

/// Capacity of each subscription's queue.
pub const BUFFER_SIZE: usize = 16;

#[derive(Clone, Default)]
pub struct PubSub {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    wants: Mutex<HashMap<Cid, HashMap<u64, mpsc::Sender<Block>>>>,
    shutdown: CancellationToken,
    next_id: AtomicU64,
}

impl Inner {
    fn wants(&self) -> MutexGuard<'_, HashMap<Cid, HashMap<u64, mpsc::Sender<Block>>>> {
        self.wants.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn unregister(&self, id: u64, keys: &[Cid]) {
        let mut wants = self.wants();
        for key in keys {
            if let Some(subs) = wants.get_mut(key) {
                subs.remove(&id);
                if subs.is_empty() {
                    wants.remove(key);
                }
            }
        }
    }
}

impl PubSub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `block` to every subscription waiting for its CID.
    ///
    /// Never waits: a subscription whose queue is full misses this block and
    /// stays registered for the key.
    pub fn publish(&self, block: &Block) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        let mut wants = self.inner.wants();
        let Some(subs) = wants.get_mut(block.cid()) else {
            return;
        };
        subs.retain(|id, tx| match tx.try_send(block.clone()) {
            Ok(()) => false,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(cid = %block.cid(), subscription = id, "subscriber queue full, dropping block");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        if subs.is_empty() {
            wants.remove(block.cid());
        }
    }

    /// Waits for one block per distinct key in `keys`.
    ///
    /// The returned stream ends after the last key is delivered, when
    /// `cancel` fires, or when the bus shuts down. Subscribing to a shut-down
    /// bus or with no keys yields an empty stream.
    pub fn subscribe(
        &self,
        cancel: CancellationToken,
        keys: impl IntoIterator<Item = Cid>,
    ) -> Subscription {
        let mut seen = HashSet::new();
        let keys: Vec<Cid> = keys
            .into_iter()
            .filter(|key| seen.insert(key.clone()))
            .collect();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(BUFFER_SIZE);

        let mut done = keys.is_empty();
        if !done {
            let mut wants = self.inner.wants();
            // checked under the lock so shutdown cannot race the registration
            if self.inner.shutdown.is_cancelled() {
                done = true;
            } else {
                for key in &keys {
                    wants.entry(key.clone()).or_default().insert(id, tx.clone());
                }
            }
        }
        drop(tx);

        Subscription {
            id,
            keys,
            rx,
            inner: self.inner.clone(),
            cancelled: Box::pin(cancel.cancelled_owned()),
            shutdown: Box::pin(self.inner.shutdown.clone().cancelled_owned()),
            done,
        }
    }

    /// Ends every subscription and ignores further publishes.
    pub fn shutdown(&self) {
        let mut wants = self.inner.wants();
        self.inner.shutdown.cancel();
        wants.clear();
    }

    /// Number of (key, subscription) registrations awaiting a block.
    pub fn pending(&self) -> usize {
        self.inner.wants().values().map(HashMap::len).sum()
    }
}

/// Blocks for one subscription, in publish order.
pub struct Subscription {
    id: u64,
    keys: Vec<Cid>,
    rx: mpsc::Receiver<Block>,
    inner: Arc<Inner>,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
    shutdown: Pin<Box<WaitForCancellationFutureOwned>>,
    done: bool,
}

impl Subscription {
    fn retire(&mut self) {
        if !self.done {
            self.done = true;
            self.inner.unregister(self.id, &self.keys);
            self.rx.close();
        }
    }
}

impl Stream for Subscription {
    type Item = Block;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Block>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        if this.cancelled.as_mut().poll(cx).is_ready() || this.shutdown.as_mut().poll(cx).is_ready()
        {
            this.retire();
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(block)) => Poll::Ready(Some(block)),
            // every registration delivered or released
            Poll::Ready(None) => {
                this.retire();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.retire();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;
    use vfetch_core::cid::RAW;

    use super::*;

    fn block(data: &str) -> Block {
        Block::from_data(RAW, data.as_bytes().to_vec())
    }

    #[tokio::test]
    async fn test_delivers_each_key_then_ends() {
        let bus = PubSub::new();
        let (a, b) = (block("a"), block("b"));
        let sub = bus.subscribe(
            CancellationToken::new(),
            [*a.cid(), *b.cid()],
        );
        bus.publish(&b);
        bus.publish(&a);
        bus.publish(&a);

        let received: Vec<Block> = sub.collect().await;
        assert_eq!(received, vec![b, a]);
        assert_eq!(bus.pending(), 0);
    }

    #[tokio::test]
    async fn test_only_matching_subscribers_receive() {
        let bus = PubSub::new();
        let (a, b) = (block("a"), block("b"));
        let mut sub_a1 = bus.subscribe(CancellationToken::new(), [*a.cid()]);
        let mut sub_a2 = bus.subscribe(CancellationToken::new(), [*a.cid()]);
        let mut sub_b = bus.subscribe(CancellationToken::new(), [*b.cid()]);

        bus.publish(&a);
        assert_eq!(sub_a1.next().await, Some(a.clone()));
        assert_eq!(sub_a2.next().await, Some(a.clone()));
        assert_eq!(sub_a1.next().await, None);

        let pending = tokio::time::timeout(Duration::from_millis(20), sub_b.next()).await;
        assert!(pending.is_err(), "subscriber for another key must not wake");
    }

    #[tokio::test]
    async fn test_duplicate_keys_count_once() {
        let bus = PubSub::new();
        let a = block("a");
        let sub = bus.subscribe(
            CancellationToken::new(),
            [*a.cid(), *a.cid()],
        );
        assert_eq!(bus.pending(), 1);
        bus.publish(&a);
        assert_eq!(sub.collect::<Vec<_>>().await, vec![a]);
    }

    #[tokio::test]
    async fn test_cancel_retires_without_buffered_blocks() {
        let bus = PubSub::new();
        let (a, b) = (block("a"), block("b"));
        let cancel = CancellationToken::new();
        let mut sub = bus.subscribe(cancel.clone(), [*a.cid(), *b.cid()]);
        bus.publish(&a);
        cancel.cancel();

        assert_eq!(sub.next().await, None);
        assert_eq!(bus.pending(), 0);
        bus.publish(&b);
        assert_eq!(sub.next().await, None);
    }

    #[tokio::test]
    async fn test_cancel_wakes_waiting_subscriber() {
        let bus = PubSub::new();
        let cancel = CancellationToken::new();
        let mut sub = bus.subscribe(cancel.clone(), [*block("never").cid()]);
        let waiter = tokio::spawn(async move { sub.next().await });
        tokio::task::yield_now().await;
        cancel.cancel();
        assert_eq!(waiter.await.unwrap(), None);
        assert_eq!(bus.pending(), 0);
    }

    #[tokio::test]
    async fn test_drop_releases_registration() {
        let bus = PubSub::new();
        let sub = bus.subscribe(CancellationToken::new(), [*block("a").cid()]);
        assert_eq!(bus.pending(), 1);
        drop(sub);
        assert_eq!(bus.pending(), 0);
    }

    #[tokio::test]
    async fn test_shutdown() {
        let bus = PubSub::new();
        let a = block("a");
        let mut live = bus.subscribe(CancellationToken::new(), [*a.cid()]);
        bus.shutdown();
        assert_eq!(live.next().await, None);

        let mut late = bus.subscribe(CancellationToken::new(), [*a.cid()]);
        bus.publish(&a);
        assert_eq!(late.next().await, None);
        assert_eq!(bus.pending(), 0);
    }

    #[tokio::test]
    async fn test_empty_keys() {
        let bus = PubSub::new();
        let mut sub = bus.subscribe(CancellationToken::new(), Vec::new());
        assert_eq!(sub.next().await, None);
    }

    #[tokio::test]
    async fn test_full_queue_drops_but_keeps_waiting() {
        let bus = PubSub::new();
        let blocks: Vec<Block> = (0..=BUFFER_SIZE).map(|i| block(&i.to_string())).collect();
        let mut sub = bus.subscribe(
            CancellationToken::new(),
            blocks.iter().map(|b| *b.cid()),
        );
        for b in &blocks {
            bus.publish(b);
        }
        // the last publish found the queue full
        assert_eq!(bus.pending(), 1);
        for b in &blocks[..BUFFER_SIZE] {
            assert_eq!(sub.next().await.as_ref(), Some(b));
        }
        bus.publish(&blocks[BUFFER_SIZE]);
        assert_eq!(sub.next().await.as_ref(), Some(&blocks[BUFFER_SIZE]));
        assert_eq!(sub.next().await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_publishers() {
        let bus = PubSub::new();
        let blocks: Vec<Block> = (0..8).map(|i| block(&format!("block-{i}"))).collect();
        let subs: Vec<Subscription> = (0..4)
            .map(|_| {
                bus.subscribe(
                    CancellationToken::new(),
                    blocks.iter().map(|b| *b.cid()),
                )
            })
            .collect();

        let publishers: Vec<_> = blocks
            .iter()
            .cloned()
            .map(|b| {
                let bus = bus.clone();
                tokio::spawn(async move { bus.publish(&b) })
            })
            .collect();
        for p in publishers {
            p.await.unwrap();
        }

        for sub in subs {
            let mut got: Vec<Cid> = sub.map(|b| *b.cid()).collect().await;
            got.sort();
            let mut want: Vec<Cid> = blocks.iter().map(|b| *b.cid()).collect();
            want.sort();
            assert_eq!(got, want);
        }
    }
}

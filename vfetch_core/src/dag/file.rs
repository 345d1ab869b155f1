use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use tokio::io::{AsyncRead, ReadBuf};
use tokio_util::io::StreamReader;

use crate::blockstore::Blockstore;
use crate::cid::Cid;
use crate::dag::node::{FileChild, FileNode, Node, Reifier, UnixfsReifier};
use crate::error::{Error, Result};

/// Readable contents of a UnixFS file.
///
/// Blocks are loaded one at a time as reading reaches them, depth first, so
/// only the path from the root to the current leaf is held in memory.
pub struct UnixfsFile {
    node: FileNode,
    store: Arc<dyn Blockstore>,
    reader: StreamReader<BoxStream<'static, io::Result<Bytes>>, Bytes>,
}

/// Opens `node` for reading; directories are [`Error::NotAFile`].
pub fn open_file(node: Node, store: Arc<dyn Blockstore>) -> Result<UnixfsFile> {
    let node = node.into_file()?;
    let reader = StreamReader::new(content_stream(store.clone(), node.clone(), 0));
    Ok(UnixfsFile {
        node,
        store,
        reader,
    })
}

impl UnixfsFile {
    pub fn cid(&self) -> &Cid {
        self.node.cid()
    }

    pub fn size(&self) -> u64 {
        self.node.size()
    }

    pub fn is_seekable(&self) -> bool {
        self.store.supports_random_access()
    }

    /// Restarts reading at `offset` (clamped to the file size). Subtrees that
    /// lie entirely before `offset` are skipped without being loaded.
    pub fn seek(&mut self, offset: u64) -> Result<u64> {
        if !self.is_seekable() {
            return Err(Error::NotImplemented("seeking on a sequential block store"));
        }
        let offset = offset.min(self.size());
        self.reader = StreamReader::new(content_stream(
            self.store.clone(),
            self.node.clone(),
            offset,
        ));
        Ok(offset)
    }
}

impl AsyncRead for UnixfsFile {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().reader).poll_read(cx, buf)
    }
}

enum Piece {
    Data(Bytes),
    Child(FileChild),
}

struct ReadState {
    store: Arc<dyn Blockstore>,
    stack: Vec<Piece>,
    skip: u64,
}

fn push_node(stack: &mut Vec<Piece>, node: FileNode) {
    stack.extend(node.children.into_iter().rev().map(Piece::Child));
    if !node.data.is_empty() {
        stack.push(Piece::Data(node.data));
    }
}

fn content_stream(
    store: Arc<dyn Blockstore>,
    node: FileNode,
    skip: u64,
) -> BoxStream<'static, io::Result<Bytes>> {
    let mut stack = Vec::new();
    push_node(&mut stack, node);
    let state = ReadState { store, stack, skip };
    stream::try_unfold(state, |mut state| async move {
        let chunk = next_chunk(&mut state).await?;
        Ok::<_, Error>(chunk.map(|chunk| (chunk, state)))
    })
    .map_err(io::Error::from)
    .boxed()
}

async fn next_chunk(state: &mut ReadState) -> Result<Option<Bytes>> {
    while let Some(piece) = state.stack.pop() {
        match piece {
            Piece::Data(data) => {
                let len = data.len() as u64;
                if state.skip >= len {
                    state.skip -= len;
                    continue;
                }
                let chunk = data.slice(state.skip as usize..);
                state.skip = 0;
                return Ok(Some(chunk));
            }
            Piece::Child(child) => {
                if let Some(size) = child.size
                    && state.skip >= size
                {
                    state.skip -= size;
                    continue;
                }
                let block = state.store.get(&child.cid).await?;
                let node = UnixfsReifier.reify(&block)?.into_file()?;
                push_node(&mut state.stack, node);
            }
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::LocalBlockstore;
    use crate::dag::resolve_to_terminal_node;
    use crate::testutil::{DagBuilder, MockStore, random_bytes};

    async fn store_with(blocks: Vec<crate::Block>, random_access: bool) -> Arc<dyn Blockstore> {
        let store = if random_access {
            MockStore::default()
        } else {
            MockStore::sequential()
        };
        let bs = LocalBlockstore::new(Arc::new(store));
        bs.put_many(blocks).await.unwrap();
        Arc::new(bs)
    }

    async fn read_to_end(file: &mut UnixfsFile) -> Vec<u8> {
        let mut out = Vec::new();
        file.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn test_multi_level_file_round_trips() {
        let content = random_bytes(10_000);
        let dag = DagBuilder::new(256, 4).file(&content);
        let store = store_with(dag.blocks, true).await;

        let node = resolve_to_terminal_node(store.as_ref(), &dag.root, &[] as &[&str])
            .await
            .unwrap();
        let mut file = open_file(node, store).unwrap();
        assert_eq!(file.size(), 10_000);
        assert_eq!(read_to_end(&mut file).await, content.as_ref());
    }

    #[tokio::test]
    async fn test_seek_returns_suffix() {
        let content = random_bytes(5_000);
        let dag = DagBuilder::new(100, 3).file(&content);
        let store = store_with(dag.blocks, true).await;
        let node = resolve_to_terminal_node(store.as_ref(), &dag.root, &[] as &[&str])
            .await
            .unwrap();
        let mut file = open_file(node, store).unwrap();

        for offset in [0u64, 1, 99, 100, 1234, 4_999] {
            assert_eq!(file.seek(offset).unwrap(), offset);
            assert_eq!(read_to_end(&mut file).await, &content[offset as usize..]);
        }
        assert_eq!(file.seek(10_000).unwrap(), 5_000);
        assert!(read_to_end(&mut file).await.is_empty());
    }

    #[tokio::test]
    async fn test_seek_needs_random_access() {
        let dag = DagBuilder::new(100, 3).file(&random_bytes(500));
        let store = store_with(dag.blocks, false).await;
        let node = resolve_to_terminal_node(store.as_ref(), &dag.root, &[] as &[&str])
            .await
            .unwrap();
        let mut file = open_file(node, store).unwrap();
        assert!(!file.is_seekable());
        assert!(matches!(file.seek(10), Err(Error::NotImplemented(_))));
    }

    #[tokio::test]
    async fn test_missing_leaf_surfaces_as_read_error() {
        let dag = DagBuilder::new(100, 3).file(&random_bytes(1_000));
        let root = dag.root;
        // keep the root and drop every leaf
        let blocks = dag
            .blocks
            .into_iter()
            .filter(|block| block.cid() == &root)
            .collect();
        let store = store_with(blocks, true).await;
        let node = resolve_to_terminal_node(store.as_ref(), &root, &[] as &[&str])
            .await
            .unwrap();
        let mut file = open_file(node, store).unwrap();
        let mut out = Vec::new();
        let err = file.read_to_end(&mut out).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}

use crate::blockstore::Blockstore;
use crate::cid::Cid;
use crate::dag::node::{FileNode, Node, Reifier, UnixfsReifier};
use crate::error::{Error, Result};

/// Walks `segments` from `root` through UnixFS directory links.
///
/// Every node on the way is loaded from `store` only; a missing block is
/// [`Error::BlockNotFound`].
pub async fn resolve_to_terminal_node<B, S>(store: &B, root: &Cid, segments: &[S]) -> Result<Node>
where
    B: Blockstore + ?Sized,
    S: AsRef<str>,
{
    resolve_with(store, &UnixfsReifier, root, segments).await
}

/// Like [`resolve_to_terminal_node`] with a caller-chosen interpretation of
/// blocks.
pub async fn resolve_with<B, S>(
    store: &B,
    reifier: &dyn Reifier,
    root: &Cid,
    segments: &[S],
) -> Result<Node>
where
    B: Blockstore + ?Sized,
    S: AsRef<str>,
{
    let mut node = reifier.reify(&store.get(root).await?)?;
    for segment in segments {
        let name = segment.as_ref();
        let next = match &node {
            Node::Directory(dir) => dir.find(name).map(|link| link.cid),
            Node::File(_) => None,
        };
        let Some(next) = next else {
            return Err(Error::NoLink {
                cid: *node.cid(),
                name: name.to_string(),
            });
        };
        tracing::trace!(%next, name, "following link");
        node = reifier.reify(&store.get(&next).await?)?;
    }
    Ok(node)
}

/// Resolves the path and requires the terminal node to be a file.
pub async fn resolve_file<B, S>(store: &B, root: &Cid, segments: &[S]) -> Result<FileNode>
where
    B: Blockstore + ?Sized,
    S: AsRef<str>,
{
    resolve_to_terminal_node(store, root, segments)
        .await?
        .into_file()
}

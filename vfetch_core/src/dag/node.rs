use bytes::Bytes;

use crate::block::Block;
use crate::cid::{Cid, DAG_PB, RAW};
use crate::dag::pb::{PbLink, PbNode};
use crate::dag::unixfs::{DataType, UnixfsData};
use crate::error::{Error, Result};

/// A DAG node as far as path traversal and file reads care.
#[derive(Clone, Debug)]
pub enum Node {
    File(FileNode),
    Directory(DirectoryNode),
}

impl Node {
    pub fn cid(&self) -> &Cid {
        match self {
            Node::File(file) => &file.cid,
            Node::Directory(dir) => &dir.cid,
        }
    }

    pub fn into_file(self) -> Result<FileNode> {
        match self {
            Node::File(file) => Ok(file),
            Node::Directory(dir) => Err(Error::NotAFile { cid: dir.cid }),
        }
    }
}

/// One child of a chunked file, with its content length when the parent
/// declares it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileChild {
    pub cid: Cid,
    pub size: Option<u64>,
}

/// A file is its own inline data followed by the contents of its children.
#[derive(Clone, Debug)]
pub struct FileNode {
    pub(crate) cid: Cid,
    pub(crate) size: u64,
    pub(crate) data: Bytes,
    pub(crate) children: Vec<FileChild>,
}

impl FileNode {
    pub fn cid(&self) -> &Cid {
        &self.cid
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn children(&self) -> &[FileChild] {
        &self.children
    }
}

#[derive(Clone, Debug)]
pub struct DirectoryNode {
    pub(crate) cid: Cid,
    pub(crate) links: Vec<PbLink>,
}

impl DirectoryNode {
    pub fn cid(&self) -> &Cid {
        &self.cid
    }

    /// The first link named `name`.
    pub fn find(&self, name: &str) -> Option<&PbLink> {
        self.links
            .iter()
            .find(|link| link.name.as_deref() == Some(name))
    }

    pub fn links(&self) -> &[PbLink] {
        &self.links
    }
}

/// Turns a verified block into a typed node.
pub trait Reifier: Send + Sync {
    fn reify(&self, block: &Block) -> Result<Node>;
}

/// Raw leaves and DAG-PB nodes carrying UnixFS data.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnixfsReifier;

impl Reifier for UnixfsReifier {
    fn reify(&self, block: &Block) -> Result<Node> {
        let cid = *block.cid();
        match cid.codec() {
            RAW => Ok(Node::File(FileNode {
                size: block.len() as u64,
                data: block.data().clone(),
                children: Vec::new(),
                cid,
            })),
            DAG_PB => reify_pb(cid, block.data().clone()),
            codec => Err(Error::UnsupportedCodec { cid, codec }),
        }
    }
}

fn reify_pb(cid: Cid, bytes: Bytes) -> Result<Node> {
    let node = PbNode::decode(bytes).map_err(|err| Error::decode(&cid, err))?;
    let data = node
        .data
        .ok_or_else(|| Error::decode(&cid, "DAG-PB node has no UnixFS data"))?;
    let unixfs = UnixfsData::decode(data).map_err(|err| Error::decode(&cid, err))?;

    match unixfs.kind {
        DataType::Directory => Ok(Node::Directory(DirectoryNode {
            cid,
            links: node.links,
        })),
        DataType::File | DataType::Raw => {
            let sizes: Vec<Option<u64>> = if unixfs.blocksizes.len() == node.links.len() {
                unixfs.blocksizes.iter().copied().map(Some).collect()
            } else if unixfs.blocksizes.is_empty() {
                vec![None; node.links.len()]
            } else {
                return Err(Error::decode(
                    &cid,
                    format!(
                        "{} blocksizes for {} links",
                        unixfs.blocksizes.len(),
                        node.links.len()
                    ),
                ));
            };
            let declared = unixfs
                .blocksizes
                .iter()
                .try_fold(unixfs.data.len() as u64, |total, size| total.checked_add(*size))
                .ok_or_else(|| Error::decode(&cid, "declared blocksizes overflow"))?;
            let children = node
                .links
                .into_iter()
                .zip(sizes)
                .map(|(link, size)| FileChild {
                    cid: link.cid,
                    size,
                })
                .collect();
            Ok(Node::File(FileNode {
                size: unixfs.filesize.unwrap_or(declared),
                data: unixfs.data,
                children,
                cid,
            }))
        }
        kind @ (DataType::Symlink | DataType::Metadata | DataType::HamtShard) => {
            Err(Error::UnsupportedNode {
                cid,
                kind: kind.name(),
            })
        }
    }
}

use crate::cid::{Cid, CidError};

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures of verification, archive parsing, storage and DAG traversal.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Content did not hash to the digest its CID promises.
    #[error("hash mismatch for block {cid}")]
    HashMismatch { cid: Cid },
    #[error("corrupt archive: {0}")]
    ArchiveCorrupt(String),
    #[error("block {cid} not found")]
    BlockNotFound { cid: Cid },
    #[error("{cid} is not a file")]
    NotAFile { cid: Cid },
    #[error("no link named {name:?} under {cid}")]
    NoLink { cid: Cid, name: String },
    #[error("unsupported codec {codec:#x} for {cid}")]
    UnsupportedCodec { cid: Cid, codec: u64 },
    #[error("unsupported hash function {code:#x} for {cid}")]
    UnsupportedHash { cid: Cid, code: u64 },
    #[error("unsupported {kind} node {cid}")]
    UnsupportedNode { cid: Cid, kind: &'static str },
    #[error("failed to decode {cid}: {reason}")]
    Decode { cid: Cid, reason: String },
    #[error("failed to encode: {0}")]
    Encode(String),
    #[error("invalid CID: {0}")]
    Cid(#[from] CidError),
    #[error("{0} is not implemented")]
    NotImplemented(&'static str),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Store(anyhow::Error),
    /// Failures of a remote block source, kept opaque so that `Blockstore`
    /// implementations backed by the network can report them.
    #[error("transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub(crate) fn corrupt(reason: impl Into<String>) -> Self {
        Error::ArchiveCorrupt(reason.into())
    }

    pub(crate) fn decode(cid: &Cid, reason: impl std::fmt::Display) -> Self {
        Error::Decode {
            cid: *cid,
            reason: reason.to_string(),
        }
    }
}

/// Archive framing failures. I/O errors met while reading are reported the
/// same way since the reader cannot tell a broken stream from a short one.
impl From<iroh_car::Error> for Error {
    fn from(err: iroh_car::Error) -> Self {
        Error::ArchiveCorrupt(err.to_string())
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(err) => err,
            Error::BlockNotFound { .. } => std::io::Error::new(std::io::ErrorKind::NotFound, err),
            Error::HashMismatch { .. } | Error::ArchiveCorrupt(_) | Error::Decode { .. } => {
                std::io::Error::new(std::io::ErrorKind::InvalidData, err)
            }
            other => std::io::Error::other(other),
        }
    }
}

//! Content paths: `/ipfs/<cid>/a/b` (immutable) and `/ipns/<name>/a/b`
//! (mutable, `<name>` being an IPNS key or a DNSLink domain).

use std::fmt;
use std::str::FromStr;

use crate::cid::{Cid, CidError, parse_cid};

#[derive(thiserror::Error, Debug)]
pub enum PathError {
    #[error("path {0:?} must start with /ipfs/ or /ipns/")]
    UnknownNamespace(String),
    #[error("path {0:?} has no root segment")]
    MissingRoot(String),
    #[error("invalid CID root in {path:?}: {source}")]
    InvalidCid {
        path: String,
        #[source]
        source: CidError,
    },
    #[error("path {0} is mutable")]
    Mutable(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Namespace {
    Ipfs,
    Ipns,
}

impl Namespace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Ipfs => "ipfs",
            Namespace::Ipns => "ipns",
        }
    }
}

/// A path rooted at either a CID or a mutable name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ContentPath {
    namespace: Namespace,
    root: String,
    segments: Vec<String>,
}

impl ContentPath {
    pub fn parse(s: &str) -> Result<Self, PathError> {
        let mut parts = s.split('/').filter(|part| !part.is_empty());
        if !s.starts_with('/') {
            return Err(PathError::UnknownNamespace(s.to_string()));
        }
        let namespace = match parts.next() {
            Some("ipfs") => Namespace::Ipfs,
            Some("ipns") => Namespace::Ipns,
            _ => return Err(PathError::UnknownNamespace(s.to_string())),
        };
        let root = parts
            .next()
            .ok_or_else(|| PathError::MissingRoot(s.to_string()))?;
        let root = match namespace {
            Namespace::Ipfs => parse_cid(root)
                .map_err(|source| PathError::InvalidCid {
                    path: s.to_string(),
                    source,
                })?
                .to_string(),
            Namespace::Ipns => root.to_string(),
        };
        Ok(Self {
            namespace,
            root,
            segments: parts.map(str::to_string).collect(),
        })
    }

    /// An IPNS path for `name` with no further segments.
    pub fn ipns(name: impl Into<String>) -> Self {
        Self {
            namespace: Namespace::Ipns,
            root: name.into(),
            segments: Vec::new(),
        }
    }

    pub fn namespace(&self) -> Namespace {
        self.namespace
    }

    /// The CID string for immutable paths, the name for mutable ones.
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_mutable(&self) -> bool {
        self.namespace == Namespace::Ipns
    }

    /// Appends `segments` after this path's own segments.
    pub fn join<S: AsRef<str>>(&self, segments: &[S]) -> Self {
        let mut joined = self.clone();
        joined.segments.extend(
            segments
                .iter()
                .map(|s| s.as_ref())
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        );
        joined
    }

    pub fn to_immutable(&self) -> Result<ImmutablePath, PathError> {
        match self.namespace {
            Namespace::Ipns => Err(PathError::Mutable(self.to_string())),
            Namespace::Ipfs => {
                let root = parse_cid(&self.root).map_err(|source| PathError::InvalidCid {
                    path: self.to_string(),
                    source,
                })?;
                Ok(ImmutablePath::new(root, self.segments.clone()))
            }
        }
    }
}

impl fmt::Display for ContentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/{}", self.namespace.as_str(), self.root)?;
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl FromStr for ContentPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContentPath::parse(s)
    }
}

/// A path rooted at a CID.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ImmutablePath {
    root: Cid,
    segments: Vec<String>,
}

impl ImmutablePath {
    pub fn new(root: Cid, segments: Vec<String>) -> Self {
        Self { root, segments }
    }

    pub fn root(&self) -> &Cid {
        &self.root
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }
}

impl From<ImmutablePath> for ContentPath {
    fn from(path: ImmutablePath) -> Self {
        Self {
            namespace: Namespace::Ipfs,
            root: path.root.to_string(),
            segments: path.segments,
        }
    }
}

impl From<Cid> for ImmutablePath {
    fn from(root: Cid) -> Self {
        Self::new(root, Vec::new())
    }
}

impl fmt::Display for ImmutablePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/ipfs/{}", self.root)?;
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

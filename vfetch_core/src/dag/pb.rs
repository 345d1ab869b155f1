//! DAG-PB: `PBNode { repeated PBLink Links = 2; optional bytes Data = 1; }`
//! with `PBLink { Hash = 1; Name = 2; Tsize = 3 }`.

use bytes::Bytes;
use prost::Message;

use crate::cid::{Cid, CidError, cid_from_bytes};

#[derive(thiserror::Error, Debug)]
pub enum PbError {
    #[error(transparent)]
    Proto(#[from] prost::DecodeError),
    #[error("link has no hash")]
    MissingHash,
    #[error("invalid link hash: {0}")]
    InvalidHash(#[from] CidError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PbLink {
    pub cid: Cid,
    pub name: Option<String>,
    pub tsize: Option<u64>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PbNode {
    pub links: Vec<PbLink>,
    pub data: Option<Bytes>,
}

#[derive(Clone, PartialEq, Message)]
struct RawLink {
    #[prost(bytes = "vec", optional, tag = "1")]
    hash: Option<Vec<u8>>,
    #[prost(string, optional, tag = "2")]
    name: Option<String>,
    #[prost(uint64, optional, tag = "3")]
    tsize: Option<u64>,
}

#[derive(Clone, PartialEq, Message)]
struct RawNode {
    #[prost(bytes = "bytes", optional, tag = "1")]
    data: Option<Bytes>,
    #[prost(message, repeated, tag = "2")]
    links: Vec<RawLink>,
}

impl PbNode {
    pub fn decode(bytes: Bytes) -> Result<Self, PbError> {
        let raw = RawNode::decode(bytes)?;
        let links = raw
            .links
            .into_iter()
            .map(|link| {
                let hash = link.hash.ok_or(PbError::MissingHash)?;
                Ok(PbLink {
                    cid: cid_from_bytes(&hash)?,
                    name: link.name,
                    tsize: link.tsize,
                })
            })
            .collect::<Result<_, PbError>>()?;
        Ok(PbNode {
            links,
            data: raw.data,
        })
    }

    /// Canonical DAG-PB puts the links before the data, while a derived
    /// message writes fields in tag order, so the two halves are encoded
    /// separately and concatenated.
    pub fn encode(&self) -> Vec<u8> {
        let links = RawNode {
            data: None,
            links: self
                .links
                .iter()
                .map(|link| RawLink {
                    hash: Some(link.cid.to_bytes()),
                    name: link.name.clone(),
                    tsize: link.tsize,
                })
                .collect(),
        };
        let mut out = links.encode_to_vec();
        if self.data.is_some() {
            let data = RawNode {
                data: self.data.clone(),
                links: Vec::new(),
            };
            out.extend_from_slice(&data.encode_to_vec());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cid::{RAW, sha256_cid};

    #[test]
    fn test_empty_directory_node() {
        // The canonical empty UnixFS directory.
        let node = PbNode::decode(Bytes::from_static(&[0x0a, 0x02, 0x08, 0x01])).unwrap();
        assert!(node.links.is_empty());
        assert_eq!(node.data.as_deref(), Some(&[0x08, 0x01][..]));
    }

    #[test]
    fn test_links_precede_data() {
        let node = PbNode {
            links: vec![PbLink {
                cid: sha256_cid(RAW, b"child"),
                name: Some("child.txt".into()),
                tsize: Some(5),
            }],
            data: Some(Bytes::from_static(&[0x08, 0x02])),
        };
        let encoded = node.encode();
        assert_eq!(encoded[0], 0x12);
        assert_eq!(PbNode::decode(Bytes::from(encoded)).unwrap(), node);
    }

    #[test]
    fn test_link_name_must_be_utf8() {
        // Links = [{ Hash: <cid>, Name: 0xff }]
        let mut link = vec![0x0a, 0x24];
        link.extend_from_slice(&sha256_cid(RAW, b"x").to_bytes());
        link.extend_from_slice(&[0x12, 0x01, 0xff]);
        let mut raw = vec![0x12, link.len() as u8];
        raw.extend_from_slice(&link);
        assert!(matches!(
            PbNode::decode(Bytes::from(raw)),
            Err(PbError::Proto(_))
        ));
    }

    #[test]
    fn test_link_without_hash() {
        // Links = [{ Name: "x" }]
        let raw = Bytes::from_static(&[0x12, 0x03, 0x12, 0x01, b'x']);
        assert!(matches!(PbNode::decode(raw), Err(PbError::MissingHash)));
    }
}

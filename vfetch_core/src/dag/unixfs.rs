//! The UnixFS `Data` message carried in a DAG-PB node's data field.

use bytes::Bytes;
use prost::Message;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum DataType {
    Raw = 0,
    Directory = 1,
    File = 2,
    Metadata = 3,
    Symlink = 4,
    HamtShard = 5,
}

impl DataType {
    pub fn name(self) -> &'static str {
        match self {
            DataType::Raw => "raw",
            DataType::Directory => "directory",
            DataType::File => "file",
            DataType::Metadata => "metadata",
            DataType::Symlink => "symlink",
            DataType::HamtShard => "HAMT shard",
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum UnixfsError {
    #[error(transparent)]
    Proto(#[from] prost::DecodeError),
    #[error("missing data type")]
    MissingType,
    #[error("unknown data type {0}")]
    UnknownType(i32),
}

#[derive(Clone, PartialEq, Message)]
struct RawData {
    #[prost(enumeration = "DataType", optional, tag = "1")]
    data_type: Option<i32>,
    #[prost(bytes = "bytes", optional, tag = "2")]
    data: Option<Bytes>,
    #[prost(uint64, optional, tag = "3")]
    filesize: Option<u64>,
    #[prost(uint64, repeated, packed = "false", tag = "4")]
    blocksizes: Vec<u64>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnixfsData {
    pub kind: DataType,
    pub data: Bytes,
    pub filesize: Option<u64>,
    pub blocksizes: Vec<u64>,
}

impl UnixfsData {
    pub fn new(kind: DataType) -> Self {
        Self {
            kind,
            data: Bytes::new(),
            filesize: None,
            blocksizes: Vec::new(),
        }
    }

    /// Blocksizes may arrive packed or one field per entry.
    pub fn decode(bytes: Bytes) -> Result<Self, UnixfsError> {
        let raw = RawData::decode(bytes)?;
        let code = raw.data_type.ok_or(UnixfsError::MissingType)?;
        let kind = DataType::try_from(code).map_err(|_| UnixfsError::UnknownType(code))?;
        Ok(Self {
            kind,
            data: raw.data.unwrap_or_default(),
            filesize: raw.filesize,
            blocksizes: raw.blocksizes,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        RawData {
            data_type: Some(self.kind.into()),
            data: (!self.data.is_empty()).then(|| self.data.clone()),
            filesize: self.filesize,
            blocksizes: self.blocksizes.clone(),
        }
        .encode_to_vec()
    }
}

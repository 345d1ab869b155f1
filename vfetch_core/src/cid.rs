//! Content identifiers and the multihashes inside them.
//!
//! The types are the `cid` and `multihash` crates'; this module adds the
//! codec and hash-function codes the retrieval pipeline knows, sha2-256
//! addressing, and the digest check a block must pass against its CID.

use multihash_codetable::{Code, MultihashDigest};

pub use ::cid::Version;

/// A CIDv0 or CIDv1 with a digest of up to 64 bytes.
pub type Cid = ::cid::Cid;
pub type Multihash = ::multihash::Multihash<64>;

pub const RAW: u64 = 0x55;
pub const DAG_PB: u64 = 0x70;
pub const DAG_CBOR: u64 = 0x71;
pub const LIBP2P_KEY: u64 = 0x72;

/// The "digest" is the content itself.
pub const IDENTITY: u64 = 0x00;
pub const SHA2_256: u64 = 0x12;
pub const BLAKE3: u64 = 0x1e;

/// Truncated digests shorter than this are too weak to verify against.
pub const MIN_DIGEST_LEN: usize = 20;

#[derive(thiserror::Error, Debug)]
pub enum CidError {
    #[error(transparent)]
    Invalid(#[from] ::cid::Error),
    #[error("{0} trailing bytes after CID")]
    TrailingBytes(usize),
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DigestError {
    #[error("unsupported hash function {0:#x}")]
    UnsupportedCode(u64),
    #[error("digest of {0} bytes is too short to verify")]
    TooShort(usize),
    #[error("identity content of {0} bytes does not fit a multihash")]
    TooLong(usize),
}

/// Hashes `data` with sha2-256 and addresses it as a CIDv1 of `codec`.
pub fn sha256_cid(codec: u64, data: &[u8]) -> Cid {
    Cid::new_v1(codec, Code::Sha2_256.digest(data))
}

/// Parses a CIDv0 (`Qm...`) or a multibase CIDv1.
pub fn parse_cid(s: &str) -> Result<Cid, CidError> {
    Ok(s.parse::<Cid>()?)
}

/// Reads a binary CID that must span all of `bytes`.
pub fn cid_from_bytes(bytes: &[u8]) -> Result<Cid, CidError> {
    let mut rest = bytes;
    let cid = Cid::read_bytes(&mut rest)?;
    if !rest.is_empty() {
        return Err(CidError::TrailingBytes(rest.len()));
    }
    Ok(cid)
}

/// Hashes `data` with the function `code` names.
pub fn hash(code: u64, data: &[u8]) -> Result<Multihash, DigestError> {
    match code {
        IDENTITY => Multihash::wrap(IDENTITY, data).map_err(|_| DigestError::TooLong(data.len())),
        SHA2_256 => Ok(Code::Sha2_256.digest(data)),
        BLAKE3 => Multihash::wrap(BLAKE3, blake3::hash(data).as_bytes())
            .map_err(|_| DigestError::UnsupportedCode(BLAKE3)),
        code => Err(DigestError::UnsupportedCode(code)),
    }
}

/// Whether `data` hashes to `expected`. A digest shorter than the function's
/// output is compared as a truncation of it.
pub fn digest_matches(expected: &Multihash, data: &[u8]) -> Result<bool, DigestError> {
    let digest = expected.digest();
    if expected.code() == IDENTITY {
        return Ok(digest == data);
    }
    let computed = hash(expected.code(), data)?;
    if digest.len() < MIN_DIGEST_LEN {
        return Err(DigestError::TooShort(digest.len()));
    }
    Ok(computed.digest().get(..digest.len()) == Some(digest))
}

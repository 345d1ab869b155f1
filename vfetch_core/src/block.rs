use bytes::Bytes;

use crate::cid::{Cid, DigestError, digest_matches, sha256_cid};
use crate::error::{Error, Result};

/// Content paired with the CID it hashes to.
///
/// Constructed through [`Block::new`] the pair is verified; the only way to
/// skip verification is the explicit [`Block::new_unchecked`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    cid: Cid,
    data: Bytes,
}

impl Block {
    pub fn new(cid: Cid, data: Bytes) -> Result<Self> {
        verify_block(&cid, &data)?;
        Ok(Self { cid, data })
    }

    /// Pairs `cid` with `data` without hashing. Only for content that arrived
    /// over a channel the caller already trusts.
    pub fn new_unchecked(cid: Cid, data: Bytes) -> Self {
        Self { cid, data }
    }

    /// Addresses `data` as a sha2-256 CIDv1 of `codec`.
    pub fn from_data(codec: u64, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            cid: sha256_cid(codec, &data),
            data,
        }
    }

    pub fn cid(&self) -> &Cid {
        &self.cid
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_parts(self) -> (Cid, Bytes) {
        (self.cid, self.data)
    }
}

/// Checks that `data` hashes, with the function named by `cid`, to the digest
/// `cid` carries.
pub fn verify_block(cid: &Cid, data: &[u8]) -> Result<()> {
    match digest_matches(cid.hash(), data) {
        Ok(true) => Ok(()),
        Ok(false) => Err(Error::HashMismatch { cid: *cid }),
        Err(DigestError::UnsupportedCode(code)) => Err(Error::UnsupportedHash { cid: *cid, code }),
        Err(err) => Err(Error::decode(cid, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cid::{self, BLAKE3, Multihash, RAW, SHA2_256, Version};

    #[test]
    fn test_verified_block() {
        let block = Block::from_data(RAW, b"payload".to_vec());
        let rebuilt = Block::new(*block.cid(), block.data().clone()).unwrap();
        assert_eq!(rebuilt, block);
    }

    #[test]
    fn test_substituted_content_rejected() {
        let cid = sha256_cid(RAW, b"expected");
        let err = Block::new(cid, Bytes::from_static(b"substitute")).unwrap_err();
        assert!(matches!(err, Error::HashMismatch { cid: c } if c == cid));
    }

    #[test]
    fn test_blake3_and_v0() {
        let data = b"some bytes";
        let cid = Cid::new_v1(RAW, cid::hash(BLAKE3, data).unwrap());
        verify_block(&cid, data).unwrap();

        let v0 = Cid::new_v0(cid::hash(SHA2_256, data).unwrap()).unwrap();
        assert_eq!(v0.version(), Version::V0);
        verify_block(&v0, data).unwrap();
        assert!(verify_block(&v0, b"other").is_err());
    }

    #[test]
    fn test_unknown_hash_function_is_not_accepted() {
        let cid = Cid::new_v1(RAW, Multihash::wrap(0x1b, &[0u8; 32]).unwrap());
        assert!(matches!(
            verify_block(&cid, b"x"),
            Err(Error::UnsupportedHash { code: 0x1b, .. })
        ));
    }
}

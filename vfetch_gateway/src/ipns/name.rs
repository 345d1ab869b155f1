use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use ed25519_dalek::VerifyingKey;
use prost::Message;
use vfetch_core::ContentPath;
use vfetch_core::cid::{self, Cid, DigestError, IDENTITY, LIBP2P_KEY, Multihash, parse_cid};

use crate::error::ResolutionError;

/// An IPNS name whose Ed25519 public key is inlined in its identifier.
///
/// Accepted forms are the libp2p-key CID (`k51...`, any multibase) and the
/// base58 peer ID (`12D3Koo...`). Displayed as a base36 CIDv1.
#[derive(Clone, Debug)]
pub struct IpnsName {
    hash: Multihash,
    public_key: VerifyingKey,
}

impl IpnsName {
    pub fn from_public_key(key: &VerifyingKey) -> Result<Self, DigestError> {
        Ok(Self {
            hash: cid::hash(IDENTITY, &encode_public_key(key))?,
            public_key: *key,
        })
    }

    pub fn parse(s: &str) -> Result<Self, ResolutionError> {
        let invalid = |reason: String| ResolutionError::invalid_name(s, reason);
        let hash = if s.starts_with('1') || s.starts_with("Qm") {
            let raw = multibase::Base::Base58Btc
                .decode(s)
                .map_err(|err| invalid(err.to_string()))?;
            Multihash::from_bytes(&raw).map_err(|err| invalid(err.to_string()))?
        } else {
            let cid = parse_cid(s).map_err(|err| invalid(err.to_string()))?;
            if cid.codec() != LIBP2P_KEY {
                return Err(invalid(format!(
                    "CID codec {:#x} is not libp2p-key",
                    cid.codec()
                )));
            }
            *cid.hash()
        };
        if hash.code() != IDENTITY {
            return Err(invalid("public key is not embedded in the name".into()));
        }
        let public_key = decode_public_key(hash.digest()).map_err(invalid)?;
        Ok(Self { hash, public_key })
    }

    pub fn public_key(&self) -> &VerifyingKey {
        &self.public_key
    }

    pub fn to_cid(&self) -> Cid {
        Cid::new_v1(LIBP2P_KEY, self.hash)
    }

    /// `/ipns/<name>`.
    pub fn as_path(&self) -> ContentPath {
        ContentPath::ipns(self.to_string())
    }
}

impl PartialEq for IpnsName {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash
    }
}

impl Eq for IpnsName {}

impl Hash for IpnsName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash.hash(state);
    }
}

impl fmt::Display for IpnsName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self
            .to_cid()
            .to_string_of_base(multibase::Base::Base36Lower)
            .map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl FromStr for IpnsName {
    type Err = ResolutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        IpnsName::parse(s)
    }
}

/// libp2p `KeyType`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
enum KeyType {
    Rsa = 0,
    Ed25519 = 1,
    Secp256k1 = 2,
    Ecdsa = 3,
}

/// The libp2p `PublicKey` message.
#[derive(Clone, PartialEq, Message)]
struct PublicKey {
    #[prost(enumeration = "KeyType", optional, tag = "1")]
    key_type: Option<i32>,
    #[prost(bytes = "vec", optional, tag = "2")]
    data: Option<Vec<u8>>,
}

pub(crate) fn encode_public_key(key: &VerifyingKey) -> Vec<u8> {
    PublicKey {
        key_type: Some(KeyType::Ed25519.into()),
        data: Some(key.as_bytes().to_vec()),
    }
    .encode_to_vec()
}

pub(crate) fn decode_public_key(encoded: &[u8]) -> Result<VerifyingKey, String> {
    let message = PublicKey::decode(encoded).map_err(|err| err.to_string())?;
    match message.key_type.map(KeyType::try_from) {
        Some(Ok(KeyType::Ed25519)) => {}
        Some(Ok(other)) => return Err(format!("unsupported key type {other:?}")),
        Some(Err(err)) => return Err(err.to_string()),
        None => return Err("public key has no type".into()),
    }
    let data = message.data.ok_or("public key has no data")?;
    let bytes: [u8; 32] = data
        .as_slice()
        .try_into()
        .map_err(|_| format!("Ed25519 key must be 32 bytes, got {}", data.len()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|err| err.to_string())
}

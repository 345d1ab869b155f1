//! Signed IPNS records.
//!
//! A record is a protobuf envelope whose authoritative content is the
//! DAG-CBOR `data` field, signed (V2) over `"ipns-signature:" || data`. The
//! legacy V1 protobuf fields, when present, must agree with the CBOR.

use std::time::Duration;

use bytes::Bytes;
use chrono::{DateTime, SecondsFormat, Utc};
use ed25519_dalek::{Signature, Signer, SigningKey};
use minicbor::{Decoder, Encoder};
use prost::Message;
use vfetch_core::cid::cid_from_bytes;
use vfetch_core::{ContentPath, ImmutablePath};

use super::name::{IpnsName, decode_public_key};

/// Upper bound on an encoded record.
pub const MAX_RECORD_SIZE: usize = 10 * 1024;

const SIGNATURE_PREFIX: &[u8] = b"ipns-signature:";
/// `ValidityType` EOL: the record expires at the RFC 3339 time in `Validity`.
const VALIDITY_EOL: u64 = 0;

/// The `IpnsEntry` protobuf envelope. V1 signatures are carried but never
/// checked.
#[derive(Clone, PartialEq, Message)]
struct IpnsEntry {
    #[prost(bytes = "bytes", optional, tag = "1")]
    value: Option<Bytes>,
    #[prost(bytes = "bytes", optional, tag = "2")]
    signature_v1: Option<Bytes>,
    #[prost(uint64, optional, tag = "3")]
    validity_type: Option<u64>,
    #[prost(bytes = "bytes", optional, tag = "4")]
    validity: Option<Bytes>,
    #[prost(uint64, optional, tag = "5")]
    sequence: Option<u64>,
    #[prost(uint64, optional, tag = "6")]
    ttl: Option<u64>,
    #[prost(bytes = "bytes", optional, tag = "7")]
    pub_key: Option<Bytes>,
    #[prost(bytes = "bytes", optional, tag = "8")]
    signature_v2: Option<Bytes>,
    #[prost(bytes = "bytes", optional, tag = "9")]
    data: Option<Bytes>,
}

#[derive(thiserror::Error, Debug)]
pub enum RecordError {
    #[error("record of {0} bytes exceeds {MAX_RECORD_SIZE}")]
    TooLarge(usize),
    #[error("malformed record: {0}")]
    Proto(#[from] prost::DecodeError),
    #[error("record has no {0}")]
    MissingField(&'static str),
    #[error("malformed record data: {0}")]
    Cbor(String),
    #[error("signature does not verify")]
    SignatureInvalid,
    #[error("embedded public key does not match the name: {0}")]
    PublicKeyMismatch(String),
    #[error("legacy field {0} disagrees with signed data")]
    LegacyMismatch(&'static str),
    #[error("unsupported validity type {0}")]
    UnsupportedValidityType(u64),
    #[error("invalid validity {0:?}")]
    InvalidValidity(String),
    #[error("record expired at {0}")]
    Expired(DateTime<Utc>),
    #[error("record value is not a path: {0}")]
    InvalidValue(String),
}

/// The signed fields.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RecordData {
    value: Bytes,
    validity_type: u64,
    validity: Bytes,
    sequence: u64,
    ttl: u64,
}

/// V1 protobuf copies of the signed fields.
#[derive(Debug, Clone, Default)]
struct LegacyFields {
    value: Option<Bytes>,
    validity_type: Option<u64>,
    validity: Option<Bytes>,
    sequence: Option<u64>,
    ttl: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct IpnsRecord {
    data: RecordData,
    raw_data: Bytes,
    signature_v2: Bytes,
    public_key: Option<Bytes>,
    legacy: LegacyFields,
}

impl IpnsRecord {
    pub fn decode(bytes: Bytes) -> Result<Self, RecordError> {
        if bytes.len() > MAX_RECORD_SIZE {
            return Err(RecordError::TooLarge(bytes.len()));
        }
        let entry = IpnsEntry::decode(bytes)?;
        let legacy = LegacyFields {
            value: entry.value,
            validity_type: entry.validity_type,
            validity: entry.validity,
            sequence: entry.sequence,
            ttl: entry.ttl,
        };
        let raw_data = entry.data.ok_or(RecordError::MissingField("data"))?;
        let signature_v2 = entry
            .signature_v2
            .ok_or(RecordError::MissingField("signature"))?;
        Ok(Self {
            data: decode_data(&raw_data)?,
            raw_data,
            signature_v2,
            public_key: entry.pub_key,
            legacy,
        })
    }

    /// Signs a record with `key` pointing at `value`.
    pub fn create(
        key: &SigningKey,
        value: &ContentPath,
        sequence: u64,
        eol: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self, RecordError> {
        Self::sign(key, Bytes::from(value.to_string()), sequence, eol, ttl)
    }

    /// Signs a record carrying `value` as is, parseable or not.
    pub(crate) fn sign(
        key: &SigningKey,
        value: Bytes,
        sequence: u64,
        eol: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<Self, RecordError> {
        let data = RecordData {
            value,
            validity_type: VALIDITY_EOL,
            validity: Bytes::from(eol.to_rfc3339_opts(SecondsFormat::Nanos, true)),
            sequence,
            ttl: u64::try_from(ttl.as_nanos()).unwrap_or(u64::MAX),
        };
        let raw_data = Bytes::from(encode_data(&data)?);
        let signature = key.sign(&signed_message(&raw_data));
        let legacy = LegacyFields {
            value: Some(data.value.clone()),
            validity_type: Some(data.validity_type),
            validity: Some(data.validity.clone()),
            sequence: Some(data.sequence),
            ttl: Some(data.ttl),
        };
        Ok(Self {
            data,
            raw_data,
            signature_v2: Bytes::copy_from_slice(&signature.to_bytes()),
            public_key: None,
            legacy,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        IpnsEntry {
            value: self.legacy.value.clone(),
            signature_v1: None,
            validity_type: self.legacy.validity_type,
            validity: self.legacy.validity.clone(),
            sequence: self.legacy.sequence,
            ttl: self.legacy.ttl,
            pub_key: self.public_key.clone(),
            signature_v2: Some(self.signature_v2.clone()),
            data: Some(self.raw_data.clone()),
        }
        .encode_to_vec()
    }

    pub fn sequence(&self) -> u64 {
        self.data.sequence
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_nanos(self.data.ttl)
    }

    /// The end of life of the record.
    pub fn validity(&self) -> Result<DateTime<Utc>, RecordError> {
        if self.data.validity_type != VALIDITY_EOL {
            return Err(RecordError::UnsupportedValidityType(self.data.validity_type));
        }
        let text = std::str::from_utf8(&self.data.validity)
            .map_err(|_| RecordError::InvalidValidity(format!("{:?}", self.data.validity)))?;
        DateTime::parse_from_rfc3339(text)
            .map(|eol| eol.with_timezone(&Utc))
            .map_err(|_| RecordError::InvalidValidity(text.to_string()))
    }

    /// The path the record points at. Legacy binary CID values are read as
    /// `/ipfs/<cid>`.
    pub fn value(&self) -> Result<ContentPath, RecordError> {
        let raw = &self.data.value;
        if raw.starts_with(b"/") {
            let text =
                std::str::from_utf8(raw).map_err(|err| RecordError::InvalidValue(err.to_string()))?;
            return ContentPath::parse(text).map_err(|err| RecordError::InvalidValue(err.to_string()));
        }
        let cid = cid_from_bytes(raw).map_err(|err| RecordError::InvalidValue(err.to_string()))?;
        Ok(ImmutablePath::from(cid).into())
    }

    /// Checks that `name`'s key signed this record and that it has not
    /// expired at `now`.
    pub fn validate(&self, name: &IpnsName, now: DateTime<Utc>) -> Result<(), RecordError> {
        if let Some(embedded) = &self.public_key {
            let key =
                decode_public_key(embedded).map_err(RecordError::PublicKeyMismatch)?;
            if &key != name.public_key() {
                return Err(RecordError::PublicKeyMismatch(
                    "key differs from the name's key".into(),
                ));
            }
        }

        let signature =
            Signature::from_slice(&self.signature_v2).map_err(|_| RecordError::SignatureInvalid)?;
        name.public_key()
            .verify_strict(&signed_message(&self.raw_data), &signature)
            .map_err(|_| RecordError::SignatureInvalid)?;

        self.check_legacy_fields()?;

        let eol = self.validity()?;
        if now > eol {
            return Err(RecordError::Expired(eol));
        }
        Ok(())
    }

    fn check_legacy_fields(&self) -> Result<(), RecordError> {
        let legacy = &self.legacy;
        let data = &self.data;
        if legacy.value.as_ref().is_some_and(|v| *v != data.value) {
            return Err(RecordError::LegacyMismatch("Value"));
        }
        if legacy.validity_type.is_some_and(|v| v != data.validity_type) {
            return Err(RecordError::LegacyMismatch("ValidityType"));
        }
        if legacy.validity.as_ref().is_some_and(|v| *v != data.validity) {
            return Err(RecordError::LegacyMismatch("Validity"));
        }
        if legacy.sequence.is_some_and(|v| v != data.sequence) {
            return Err(RecordError::LegacyMismatch("Sequence"));
        }
        if legacy.ttl.is_some_and(|v| v != data.ttl) {
            return Err(RecordError::LegacyMismatch("TTL"));
        }
        Ok(())
    }
}

fn signed_message(data: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(SIGNATURE_PREFIX.len() + data.len());
    message.extend_from_slice(SIGNATURE_PREFIX);
    message.extend_from_slice(data);
    message
}

fn decode_data(bytes: &[u8]) -> Result<RecordData, RecordError> {
    let cbor = |err: minicbor::decode::Error| RecordError::Cbor(err.to_string());
    let mut d = Decoder::new(bytes);
    let entries = d
        .map()
        .map_err(cbor)?
        .ok_or_else(|| RecordError::Cbor("map must have a definite length".into()))?;

    let (mut value, mut validity, mut validity_type, mut sequence, mut ttl) =
        (None, None, None, None, None);
    for _ in 0..entries {
        match d.str().map_err(cbor)? {
            "Value" => value = Some(Bytes::copy_from_slice(d.bytes().map_err(cbor)?)),
            "Validity" => validity = Some(Bytes::copy_from_slice(d.bytes().map_err(cbor)?)),
            "ValidityType" => validity_type = Some(d.u64().map_err(cbor)?),
            "Sequence" => sequence = Some(d.u64().map_err(cbor)?),
            "TTL" => ttl = Some(d.u64().map_err(cbor)?),
            _ => d.skip().map_err(cbor)?,
        }
    }
    Ok(RecordData {
        value: value.ok_or(RecordError::MissingField("Value"))?,
        validity: validity.ok_or(RecordError::MissingField("Validity"))?,
        validity_type: validity_type.ok_or(RecordError::MissingField("ValidityType"))?,
        sequence: sequence.ok_or(RecordError::MissingField("Sequence"))?,
        ttl: ttl.unwrap_or(0),
    })
}

/// DAG-CBOR map keys sort by length, then bytewise.
fn encode_data(data: &RecordData) -> Result<Vec<u8>, RecordError> {
    let cbor = |err: minicbor::encode::Error<std::convert::Infallible>| {
        RecordError::Cbor(err.to_string())
    };
    let mut e = Encoder::new(Vec::new());
    e.map(5)
        .map_err(cbor)?
        .str("TTL")
        .map_err(cbor)?
        .u64(data.ttl)
        .map_err(cbor)?
        .str("Value")
        .map_err(cbor)?
        .bytes(&data.value)
        .map_err(cbor)?
        .str("Sequence")
        .map_err(cbor)?
        .u64(data.sequence)
        .map_err(cbor)?
        .str("Validity")
        .map_err(cbor)?
        .bytes(&data.validity)
        .map_err(cbor)?
        .str("ValidityType")
        .map_err(cbor)?
        .u64(data.validity_type)
        .map_err(cbor)?;
    Ok(e.into_writer())
}

//! CAR (content-addressed archive) access on top of `iroh-car`.
//!
//! CARv1 framing is `iroh-car`'s. A CARv2 starts with a fixed pragma and a
//! 40-byte header locating an inner CARv1 payload; [`open`] unwraps it and
//! never reads the optional index behind the payload.
//!
//! Nothing here verifies hashes; see [`crate::ingest`].

use std::io::Cursor;

use iroh_car::{CarHeader, CarReader, CarWriter};
use tokio::io::{AsyncRead, AsyncReadExt, Chain, Take};
use tokio_util::either::Either;

use crate::cid::Cid;
use crate::error::{Error, Result};

/// `varint(10) || {"version": 2}`
pub const CARV2_PRAGMA: [u8; 11] = [
    0x0a, 0xa1, 0x67, 0x76, 0x65, 0x72, 0x73, 0x69, 0x6f, 0x6e, 0x02,
];
const CARV2_HEADER_LEN: usize = 40;

/// The CARv1 bytes of an archive: the stream itself, or a CARv2's payload.
pub type Payload<R> = Either<Chain<Cursor<Vec<u8>>, R>, Take<R>>;

/// Reads the archive header, first unwrapping a CARv2 if the stream is one.
pub async fn open<R>(reader: R) -> Result<CarReader<Payload<R>>>
where
    R: AsyncRead + Send + Unpin,
{
    let payload = payload(reader).await?;
    Ok(CarReader::new(payload).await?)
}

async fn payload<R>(mut reader: R) -> Result<Payload<R>>
where
    R: AsyncRead + Send + Unpin,
{
    let mut prefix = Vec::with_capacity(CARV2_PRAGMA.len());
    (&mut reader)
        .take(CARV2_PRAGMA.len() as u64)
        .read_to_end(&mut prefix)
        .await?;
    if prefix != CARV2_PRAGMA {
        return Ok(Either::Left(Cursor::new(prefix).chain(reader)));
    }

    let mut header = [0u8; CARV2_HEADER_LEN];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(Error::corrupt("truncated CARv2 header"));
        }
        Err(err) => return Err(err.into()),
    }
    let data_offset = u64::from_le_bytes(header_field(&header, 16));
    let data_size = u64::from_le_bytes(header_field(&header, 24));

    let padding = data_offset
        .checked_sub((CARV2_PRAGMA.len() + CARV2_HEADER_LEN) as u64)
        .ok_or_else(|| Error::corrupt("CARv2 payload overlaps its header"))?;
    let skipped = tokio::io::copy(&mut (&mut reader).take(padding), &mut tokio::io::sink()).await?;
    if skipped != padding {
        return Err(Error::corrupt("CARv2 payload offset beyond end of stream"));
    }
    tracing::trace!(data_offset, data_size, "reading CARv2 payload");
    Ok(Either::Right(reader.take(data_size)))
}

fn header_field(header: &[u8; CARV2_HEADER_LEN], at: usize) -> [u8; 8] {
    let mut field = [0u8; 8];
    field.copy_from_slice(&header[at..at + 8]);
    field
}

/// Encodes `blocks` as a CARv1 in the given order. `roots` must not be empty.
pub async fn write_car<I, D>(roots: Vec<Cid>, blocks: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = (Cid, D)>,
    D: AsRef<[u8]>,
{
    let mut writer = CarWriter::new(CarHeader::new_v1(roots), Vec::new());
    writer.write_header().await?;
    for (cid, data) in blocks {
        writer.write(cid, data).await?;
    }
    Ok(writer.finish().await?)
}

/// Wraps a CARv1 as the payload of a CARv2 without an index.
pub fn wrap_v2(v1: &[u8]) -> Vec<u8> {
    let data_offset = (CARV2_PRAGMA.len() + CARV2_HEADER_LEN) as u64;
    let mut out = Vec::with_capacity(data_offset as usize + v1.len());
    out.extend_from_slice(&CARV2_PRAGMA);
    out.extend_from_slice(&[0u8; 16]);
    out.extend_from_slice(&data_offset.to_le_bytes());
    out.extend_from_slice(&(v1.len() as u64).to_le_bytes());
    out.extend_from_slice(&0u64.to_le_bytes());
    out.extend_from_slice(v1);
    out
}

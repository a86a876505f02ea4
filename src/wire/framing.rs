//! Big-endian integer reads and length-prefixed frame writes
//! (spec.md §4.A). Every read is fail-closed: a short read never
//! returns a partial integer, only [`crate::Error::Io`].

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::Result;

/// Reads one big-endian byte (trivial, but kept for symmetry with the
/// wider reads and so call sites read uniformly).
pub async fn read_uint8<R: AsyncRead + Unpin>(r: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf).await?;
    Ok(buf[0])
}

/// Reads a big-endian `u16`.
pub async fn read_uint16<R: AsyncRead + Unpin>(r: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf).await?;
    Ok(u16::from_be_bytes(buf))
}

/// Reads a big-endian `u32`.
pub async fn read_uint32<R: AsyncRead + Unpin>(r: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).await?;
    Ok(u32::from_be_bytes(buf))
}

/// Reads a big-endian `u64`.
pub async fn read_uint64<R: AsyncRead + Unpin>(r: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf).await?;
    Ok(u64::from_be_bytes(buf))
}

/// Reads exactly 4 bytes big-endian and interprets them as a signed
/// 32-bit length prefix — used ahead of every multiplex frame on the
/// physical socket (spec.md §4.A).
pub async fn read_int<R: AsyncRead + Unpin>(r: &mut R) -> Result<i32> {
    Ok(read_uint32(r).await? as i32)
}

/// Writes `write(int32_be(len)) ; write(bytes) ; flush` — a write
/// failure anywhere in this sequence is terminal for the writer
/// (spec.md §4.A).
pub async fn write_framed<W: AsyncWrite + Unpin>(w: &mut W, bytes: &[u8]) -> Result<()> {
    let len = i32::try_from(bytes.len()).map_err(|_| crate::Error::Parse {
        what: "frame too large to encode a length prefix",
    })?;
    w.write_all(&len.to_be_bytes()).await?;
    w.write_all(bytes).await?;
    w.flush().await?;
    Ok(())
}

//! Adapts a [`VirtualSocketHandle`] into a plain `AsyncRead + AsyncWrite`
//! stream, so the handshake, verification, and session layers run over
//! a virtual socket exactly as they would over a raw physical
//! connection (spec.md §2 data flow "... → (connect) → C → D → E → H").

use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use super::virtual_socket::VirtualSocketHandle;

const FORWARDING_BUFFER: usize = 64 * 1024;

/// Spawns two small forwarding tasks — one pumping `handle`'s
/// incoming-bytes channel, one pumping reads back out through
/// [`super::VirtualSocket::write`] — onto one half of a
/// `tokio::io::duplex` pair, and returns the other half for the caller
/// to use as an ordinary connection.
#[must_use]
pub fn into_stream(handle: VirtualSocketHandle) -> DuplexStream {
    let VirtualSocketHandle { socket, mut incoming } = handle;
    let (ours, theirs) = tokio::io::duplex(FORWARDING_BUFFER);
    let (mut read_half, mut write_half) = tokio::io::split(theirs);

    tokio::spawn(async move {
        while let Some(bytes) = incoming.recv().await {
            if write_half.write_all(&bytes).await.is_err() {
                break;
            }
        }
    });
    tokio::spawn(async move {
        let mut buf = vec![0u8; FORWARDING_BUFFER];
        loop {
            match read_half.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => {
                    if socket.write(buf[..n].to_vec()).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    ours
}

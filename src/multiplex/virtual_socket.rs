//! One logical stream demultiplexed from a [`super::socket::MultiplexSocket`]'s
//! physical connection (spec.md §3 "Virtual socket"). Writer-side is a
//! bounded channel sender onto the shared physical writer; reader-side
//! is a bounded channel receiver owned by whoever established the
//! socket — this is the "shared-ownership value, weak-handle reader"
//! shape spec.md §9 asks for in place of the original's cyclic
//! ownership between multiplex and virtual sockets.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::socket::WriterItem;
use crate::proto::multiplex_frame::SALTED_HASH_LENGTH;
use crate::Result;

/// Shared state for one virtual socket, held by the owning
/// [`super::socket::MultiplexSocket`] in its virtual-socket map and
/// cloned (as an `Arc`) into the [`VirtualSocketHandle`] given back to
/// the caller.
pub struct VirtualSocket {
    pub(crate) service_id: String,
    pub(crate) key: Mutex<String>,
    pub(crate) is_first: bool,
    pub(crate) writer: mpsc::Sender<WriterItem>,
    pub(crate) salted_hash: Mutex<[u8; SALTED_HASH_LENGTH]>,
    /// Shared with [`super::socket::Shared`]: flips to `true` once the
    /// physical connection has produced one valid `MultiplexFrame` from
    /// the peer. Before that, this virtual socket's writes go straight
    /// to the physical writer unframed (spec.md §4.C.3).
    pub(crate) enabled: Arc<AtomicBool>,
    /// Fed by the multiplex reader task when a DATA frame (or, for the
    /// sole-virtual-socket legacy path, raw bytes) arrives for this key.
    pub(crate) incoming_tx: mpsc::Sender<Vec<u8>>,
}

impl VirtualSocket {
    #[must_use]
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    /// Current map key (Base64 of the salted hash), which changes once
    /// for a "first" socket when its sentinel salt is remapped to a
    /// real one (spec.md §4.C.3 "DATA frame routing").
    #[must_use]
    pub fn key(&self) -> String {
        self.key.lock().clone()
    }

    #[must_use]
    pub const fn is_first(&self) -> bool {
        self.is_first
    }

    /// Writes `bytes` as a DATA frame on this virtual socket's key
    /// (spec.md §4.C.2): fire-and-forget for data frames, as spec.md
    /// describes ("data frames are fire-and-forget-if-needed"). While
    /// the multiplex socket hasn't yet observed a framed message from
    /// the peer, `bytes` is written straight to the physical writer
    /// unframed instead (spec.md §4.C.3 "disabled virtual socket
    /// writes"), matching the original's `VirtualOutputStream::Write()`.
    pub async fn write(&self, bytes: Vec<u8>) -> Result<()> {
        let item = if self.enabled.load(Ordering::Acquire) {
            let hash = *self.salted_hash.lock();
            let frame = crate::proto::multiplex_frame::MultiplexFrame::data(hash, bytes);
            WriterItem { bytes: frame.encode(), ack: None }
        } else {
            WriterItem { bytes, ack: None }
        };
        self.writer.send(item).await.map_err(|_| crate::Error::Cancelled)
    }

    pub(crate) fn remap(&self, new_key: String, new_hash: [u8; SALTED_HASH_LENGTH]) {
        *self.key.lock() = new_key;
        *self.salted_hash.lock() = new_hash;
    }
}

/// What [`super::socket::MultiplexSocket::establish_virtual_socket`] and
/// incoming-connection callbacks hand back: the shared socket plus the
/// consumer-owned receiving half.
pub struct VirtualSocketHandle {
    pub socket: std::sync::Arc<VirtualSocket>,
    pub incoming: mpsc::Receiver<Vec<u8>>,
}

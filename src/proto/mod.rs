//! Wire structs for the two envelope layers spec.md §6 names:
//! [`multiplex_frame::MultiplexFrame`] (the multiplex-socket control/data
//! envelope) and [`v1_frame::V1Frame`] (the session-layer frame carried
//! inside a multiplex data frame's payload).
//!
//! No `.proto` schema ships with this crate, so both are hand-written
//! TLV encodings over [`bytes`] rather than generated protobuf code —
//! the same approach `webrtc-rs`'s `sctp` crate takes for
//! `ChunkPayloadData` and what `aws-s2n-quic`'s frame types do for QUIC.
//! Each field is tag-length-value: a 1-byte tag, a `u16` big-endian
//! length, then the value bytes; unknown tags are skipped rather than
//! rejected, matching spec.md §4.B/§7's "unknown trailing bytes are
//! tolerated" stance applied to the frame layer too.

pub mod multiplex_frame;
pub mod v1_frame;
pub mod wifi_credentials;

pub use multiplex_frame::MultiplexFrame;
pub use v1_frame::V1Frame;
pub use wifi_credentials::WifiCredentials;

use bytes::{Buf, BufMut};

pub(crate) fn put_field(out: &mut bytes::BytesMut, tag: u8, value: &[u8]) {
    out.put_u8(tag);
    out.put_u16(value.len() as u16);
    out.put_slice(value);
}

/// Splits `buf` into `(tag, value)` fields until exhausted. Stops (without
/// error) on a truncated trailing field, since a frame that got this far
/// already passed the outer length-prefix read.
pub(crate) fn iter_fields(mut buf: &[u8]) -> Vec<(u8, Vec<u8>)> {
    let mut out = Vec::new();
    while buf.len() >= 3 {
        let tag = buf.get_u8();
        let len = buf.get_u16() as usize;
        if buf.len() < len {
            break;
        }
        out.push((tag, buf[..len].to_vec()));
        buf.advance(len);
    }
    out
}

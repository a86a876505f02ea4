//! Framed byte streams (spec.md §4.A): big-endian length-prefixed
//! reads/writes over anything `AsyncRead`/`AsyncWrite`, and the
//! URL-safe unpadded Base64 used for advertisements and service-id
//! hash keys.

pub mod base64url;
pub mod framing;

pub use framing::{read_int, read_uint16, read_uint32, read_uint64, read_uint8, write_framed};

//! Key-exchange and signature primitives backing the nearby-sharing
//! handshake and paired-key verification.
//!
//! This crate treats the UKEY2 key-exchange protocol as a concrete P-256
//! ECDH + HKDF-SHA256 instantiation (see [`ukey2`]), and provides the
//! ECDSA sign/verify and hashing helpers the paired-key verification
//! runner needs to decide whether a peer is a known contact
//! (see [`verify`]).

#![forbid(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(unused_crate_dependencies)]
#![warn(unused_qualifications)]

pub mod ukey2;
pub mod verify;

pub use ukey2::{HandshakeRole, ParseOutcome, Ukey2Handshake};
pub use verify::{sign_with_private_key, verify_signature};

/// Errors produced by this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A handshake message could not be parsed.
    #[error("malformed handshake message")]
    MalformedMessage,
    /// A handshake operation was attempted out of order (e.g. asking for
    /// the verification string before the key exchange completed).
    #[error("handshake has not completed")]
    NotComplete,
    /// Signature verification failed.
    #[error("signature verification failed")]
    BadSignature,
    /// A key could not be parsed or was otherwise invalid.
    #[error("invalid key material")]
    InvalidKey,
}

/// Crate-local result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

//! Crate-wide error type.
//!
//! Mirrors spec.md §7: IO, Parse, Timeout, Verification, Policy, and
//! Cancellation are the only kinds a caller ever needs to distinguish.
//! Session-layer failures are never propagated through this type —
//! they become a final [`crate::transfer_metadata::TransferMetadata`]
//! status instead (spec.md §7 "Session-layer errors are never
//! thrown").

/// Errors surfaced by the framing, multiplex, handshake, and
/// verification layers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The underlying connection was closed, or a read/write failed.
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
    /// A frame or advertisement could not be decoded.
    #[error("malformed {what}")]
    Parse {
        /// What failed to parse, e.g. `"MultiplexFrame"`.
        what: &'static str,
    },
    /// A deadline elapsed before the expected event occurred.
    #[error("timed out waiting for {what}")]
    Timeout {
        /// What the caller was waiting for.
        what: &'static str,
    },
    /// Key or paired-key verification failed outright.
    #[error("verification failed: {0}")]
    Verification(#[from] VerificationFailure),
    /// A local policy forbids proceeding (not enough space, unsupported
    /// attachment type, visibility forbids silent acceptance, ...).
    #[error("policy violation: {0}")]
    Policy(&'static str),
    /// The operation was cancelled locally or by the peer.
    #[error("cancelled")]
    Cancelled,
}

/// Why paired-key (or UKEY2) verification failed.
#[derive(Debug, Clone, Copy, Eq, PartialEq, thiserror::Error)]
pub enum VerificationFailure {
    /// The peer's `PairedKeyResultFrame` reported `FAIL`.
    #[error("peer reported verification failure")]
    PeerReportedFailure,
    /// The local signature check against the peer's certificate failed.
    #[error("local signature check failed")]
    LocalCheckFailed,
    /// The UKEY2 handshake itself failed (bad message, bad signature,
    /// or an alert from the peer).
    #[error("handshake failed")]
    HandshakeFailed,
}

/// Crate-local result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

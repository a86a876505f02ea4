//! Transport and session core for an authenticated, encrypted,
//! multiplexed nearby-sharing stack: a UKEY2-backed handshake, paired-key
//! verification, a multiplexed virtual-socket transport, advertisement
//! codecs, and the `ShareSession` state machine that ties them together
//! into one final [`transfer_metadata::TransferMetadata`] per transfer.
//!
//! This crate owns protocol and session semantics only. Physical
//! mediums (Bluetooth, Wi-Fi LAN, WebRTC), on-disk storage, and the
//! actual movement of payload bytes are the responsibility of whatever
//! implements [`collaborators::ConnectionManager`] and
//! [`collaborators::CertificateManager`] for a given platform.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod advertisement;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod frames_reader;
pub mod handshake;
pub mod multiplex;
pub mod payload_tracker;
pub mod proto;
pub mod resolution;
pub mod session;
pub mod share_target;
pub mod transfer_metadata;
pub mod verification;
pub mod visibility;
pub mod wire;

pub use error::{Error, Result, VerificationFailure};

//! Trait interfaces for the collaborators spec.md §6 describes only in
//! prose (`ConnectionManager`, `CertificateManager`), plus fake
//! in-memory implementations for tests (spec.md §8's scenarios all run
//! against fakes rather than real mediums). The third collaborator,
//! `UKey2Handshake`, is the `nearshare_crypto::Ukey2Handshake` type
//! directly — it is already opaque enough that no extra trait is
//! needed.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::payload_tracker::PayloadTransferUpdate;
use crate::Result;

/// A single incoming payload's bytes, as the connection manager would
/// hand them back once a transfer finishes (spec.md §4.H
/// `FinalizePayloads`).
#[derive(Clone, Debug)]
pub struct Payload {
    pub id: u64,
    pub bytes: Vec<u8>,
    pub file_path: Option<String>,
}

/// A registered listener for [`PayloadTransferUpdate`]s on one payload
/// id (spec.md §6 `register_payload_status_listener`).
pub trait PayloadStatusListener: Send + Sync {
    fn on_update(&self, update: PayloadTransferUpdate);
}

/// spec.md §6: `{connect, disconnect, start_advertising,
/// start_discovery, upgrade_bandwidth, register_payload_status_listener,
/// cancel, get_incoming_payload, get_raw_authentication_token}`.
#[async_trait]
pub trait ConnectionManager: Send + Sync {
    async fn connect(&self, endpoint_id: &str) -> Result<()>;
    async fn disconnect(&self, endpoint_id: &str) -> Result<()>;
    async fn upgrade_bandwidth(&self, endpoint_id: &str) -> Result<()>;
    fn register_payload_status_listener(&self, payload_id: u64, listener: Arc<dyn PayloadStatusListener>);
    async fn cancel(&self, payload_id: u64) -> Result<()>;
    async fn get_incoming_payload(&self, payload_id: u64) -> Option<Payload>;
    async fn get_raw_authentication_token(&self, endpoint_id: &str) -> Result<Vec<u8>>;
}

/// A peer's public certificate once decrypted (spec.md glossary
/// "Public certificate").
#[derive(Clone, Debug)]
pub struct DecryptedPublicCertificate {
    pub full_name: Option<String>,
    pub image_url: Option<String>,
    pub public_key_sec1: Vec<u8>,
    pub for_self_share: bool,
}

/// spec.md §6: `{get_decrypted_public_certificate, sign_with_private_key,
/// hash_auth_token_with_private_key, download_public_certificates}`.
#[async_trait]
pub trait CertificateManager: Send + Sync {
    async fn get_decrypted_public_certificate(&self, encrypted_metadata_key: &[u8]) -> Option<DecryptedPublicCertificate>;
    fn sign_with_private_key(&self, visibility: crate::visibility::DeviceVisibility, bytes: &[u8]) -> Vec<u8>;
    fn hash_auth_token_with_private_key(&self, visibility: crate::visibility::DeviceVisibility, bytes: &[u8]) -> Vec<u8>;
    async fn download_public_certificates(&self) -> Result<()>;
}

/// In-memory fakes for the test scenarios of spec.md §8.
#[cfg(test)]
pub mod fake {
    use super::*;

    #[derive(Default)]
    pub struct FakeConnectionManager {
        pub connected: Mutex<Vec<String>>,
        pub cancelled_payloads: Mutex<Vec<u64>>,
        pub bandwidth_upgrades: Mutex<Vec<String>>,
        pub incoming_payloads: Mutex<HashMap<u64, Payload>>,
        pub raw_tokens: Mutex<HashMap<String, Vec<u8>>>,
        pub listeners: Mutex<HashMap<u64, Arc<dyn PayloadStatusListener>>>,
    }

    impl FakeConnectionManager {
        /// Test-only hook standing in for the medium actually delivering
        /// bytes: drives whatever listener was registered for
        /// `payload_id`, if any.
        pub fn fire(&self, payload_id: u64, update: PayloadTransferUpdate) {
            if let Some(listener) = self.listeners.lock().get(&payload_id).cloned() {
                listener.on_update(update);
            }
        }
    }

    #[async_trait]
    impl ConnectionManager for FakeConnectionManager {
        async fn connect(&self, endpoint_id: &str) -> Result<()> {
            self.connected.lock().push(endpoint_id.to_string());
            Ok(())
        }

        async fn disconnect(&self, _endpoint_id: &str) -> Result<()> {
            Ok(())
        }

        async fn upgrade_bandwidth(&self, endpoint_id: &str) -> Result<()> {
            self.bandwidth_upgrades.lock().push(endpoint_id.to_string());
            Ok(())
        }

        fn register_payload_status_listener(&self, payload_id: u64, listener: Arc<dyn PayloadStatusListener>) {
            self.listeners.lock().insert(payload_id, listener);
        }

        async fn cancel(&self, payload_id: u64) -> Result<()> {
            self.cancelled_payloads.lock().push(payload_id);
            Ok(())
        }

        async fn get_incoming_payload(&self, payload_id: u64) -> Option<Payload> {
            self.incoming_payloads.lock().get(&payload_id).cloned()
        }

        async fn get_raw_authentication_token(&self, endpoint_id: &str) -> Result<Vec<u8>> {
            Ok(self.raw_tokens.lock().get(endpoint_id).cloned().unwrap_or_default())
        }
    }

    #[derive(Default)]
    pub struct FakeCertificateManager {
        pub certificates_by_key: Mutex<HashMap<Vec<u8>, DecryptedPublicCertificate>>,
    }

    #[async_trait]
    impl CertificateManager for FakeCertificateManager {
        async fn get_decrypted_public_certificate(&self, encrypted_metadata_key: &[u8]) -> Option<DecryptedPublicCertificate> {
            self.certificates_by_key.lock().get(encrypted_metadata_key).cloned()
        }

        fn sign_with_private_key(&self, _visibility: crate::visibility::DeviceVisibility, bytes: &[u8]) -> Vec<u8> {
            bytes.to_vec()
        }

        fn hash_auth_token_with_private_key(&self, _visibility: crate::visibility::DeviceVisibility, bytes: &[u8]) -> Vec<u8> {
            bytes.to_vec()
        }

        async fn download_public_certificates(&self) -> Result<()> {
            Ok(())
        }
    }
}

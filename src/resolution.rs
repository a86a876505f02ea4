//! Advertisement → ShareTarget resolution (spec.md §4.I): decrypts a
//! peer's advertised metadata key against cached public certificates to
//! recover its real identity, retrying via timed certificate
//! re-downloads when nothing currently cached matches.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::advertisement::Advertisement;
use crate::collaborators::CertificateManager;
use crate::config::Config;
use crate::share_target::ShareTarget;

/// Resolves incoming advertisements for one discovery session, keeping
/// track of endpoints whose certificate hasn't been downloaded yet so
/// it can replay them once more certificates arrive.
pub struct Resolver<C: CertificateManager> {
    certificates: Arc<C>,
    config: Config,
    pending: Mutex<HashMap<String, Advertisement>>,
    retried: Mutex<HashSet<String>>,
}

impl<C: CertificateManager> Resolver<C> {
    #[must_use]
    pub fn new(certificates: Arc<C>, config: Config) -> Self {
        Self {
            certificates,
            config,
            pending: Mutex::new(HashMap::new()),
            retried: Mutex::new(HashSet::new()),
        }
    }

    /// Resolves one discovered endpoint (spec.md §4.I). On a miss, the
    /// endpoint is queued for retry at most once and a background
    /// re-download loop is started if this is the first pending
    /// endpoint.
    pub async fn resolve(self: &Arc<Self>, endpoint_id: &str, endpoint_info: &[u8]) -> Option<ShareTarget> {
        let advertisement = Advertisement::from_endpoint_info(endpoint_info);
        if !advertisement.is_valid() {
            debug!(endpoint_id, "discarding invalid advertisement");
            return None;
        }

        if let Some(target) = self.try_decrypt(endpoint_id, &advertisement).await {
            return Some(target);
        }

        let first_retry = self.retried.lock().insert(endpoint_id.to_string());
        if !first_retry {
            return None;
        }

        let was_empty = self.pending.lock().is_empty();
        self.pending.lock().insert(endpoint_id.to_string(), advertisement);
        if was_empty {
            self.spawn_redownload_loop();
        }
        None
    }

    /// Re-attempts every still-pending endpoint against the
    /// certificate manager's current cache (spec.md §4.I "on each
    /// download, replay all pending resolutions").
    pub async fn replay_pending(&self) -> Vec<(String, ShareTarget)> {
        let snapshot: Vec<(String, Advertisement)> =
            self.pending.lock().iter().map(|(id, ad)| (id.clone(), ad.clone())).collect();

        let mut resolved = Vec::new();
        for (endpoint_id, advertisement) in snapshot {
            if let Some(target) = self.try_decrypt(&endpoint_id, &advertisement).await {
                self.pending.lock().remove(&endpoint_id);
                resolved.push((endpoint_id, target));
            }
        }
        resolved
    }

    async fn try_decrypt(&self, endpoint_id: &str, advertisement: &Advertisement) -> Option<ShareTarget> {
        let certificate = self
            .certificates
            .get_decrypted_public_certificate(advertisement.encrypted_metadata_key())
            .await?;

        let mut target = ShareTarget::new(
            endpoint_id_to_numeric(endpoint_id),
            advertisement.device_name().unwrap_or_default().to_string(),
            advertisement.device_type(),
            true,
        );
        target.vendor_id = advertisement.vendor_id();
        target.for_self_share = certificate.for_self_share;
        target.full_name = certificate.full_name;
        target.image_url = certificate.image_url;
        target.peer_public_key_sec1 = Some(certificate.public_key_sec1);
        Some(target)
    }

    fn spawn_redownload_loop(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let attempts = this.config.max_certificate_downloads_during_discovery;
        let period = this.config.certificate_download_during_discovery_period;
        tokio::spawn(async move {
            for attempt in 1..=attempts {
                tokio::time::sleep(period).await;
                if this.pending.lock().is_empty() {
                    return;
                }
                if let Err(err) = this.certificates.download_public_certificates().await {
                    warn!(%err, attempt, "certificate re-download failed");
                    continue;
                }
                this.replay_pending().await;
            }
        });
    }
}

/// Endpoint ids on the wire are short opaque strings; `ShareTarget`
/// wants a stable numeric id, so this folds the string deterministically.
fn endpoint_id_to_numeric(endpoint_id: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    endpoint_id.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::fake::FakeCertificateManager;
    use crate::collaborators::DecryptedPublicCertificate;
    use crate::share_target::{DeviceType, VendorId};
    use crate::visibility::DeviceVisibility;

    fn advertisement_bytes(key: &[u8; 14]) -> Vec<u8> {
        Advertisement::new(DeviceVisibility::Everyone, &[1, 2], key, DeviceType::Phone, Some("Pixel".into()), VendorId::None)
            .to_endpoint_info()
    }

    #[tokio::test]
    async fn resolves_immediately_when_certificate_already_cached() {
        let key = [7u8; 14];
        let certs = Arc::new(FakeCertificateManager::default());
        certs.certificates_by_key.lock().insert(
            key.to_vec(),
            DecryptedPublicCertificate {
                full_name: Some("Ada".into()),
                image_url: None,
                public_key_sec1: vec![],
                for_self_share: false,
            },
        );
        let resolver = Arc::new(Resolver::new(certs, Config::default()));

        let target = resolver.resolve("endpoint_1", &advertisement_bytes(&key)).await.unwrap();
        assert_eq!(target.full_name.as_deref(), Some("Ada"));
        assert_eq!(target.device_name, "Pixel");
    }

    #[tokio::test]
    async fn unmatched_certificate_queues_for_retry_and_replays_later() {
        let key = [9u8; 14];
        let certs = Arc::new(FakeCertificateManager::default());
        let resolver = Arc::new(Resolver::new(certs.clone(), Config::default()));

        let first = resolver.resolve("endpoint_2", &advertisement_bytes(&key)).await;
        assert!(first.is_none());

        certs.certificates_by_key.lock().insert(
            key.to_vec(),
            DecryptedPublicCertificate {
                full_name: Some("Grace".into()),
                image_url: None,
                public_key_sec1: vec![],
                for_self_share: true,
            },
        );
        let replayed = resolver.replay_pending().await;
        assert_eq!(replayed.len(), 1);
        assert_eq!(replayed[0].1.full_name.as_deref(), Some("Grace"));
    }

    #[tokio::test]
    async fn invalid_advertisement_resolves_to_none_without_queuing() {
        let certs = Arc::new(FakeCertificateManager::default());
        let resolver = Arc::new(Resolver::new(certs, Config::default()));
        let result = resolver.resolve("endpoint_3", &[0u8; 2]).await;
        assert!(result.is_none());
        assert!(resolver.pending.lock().is_empty());
    }
}

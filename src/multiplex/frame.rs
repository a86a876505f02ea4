//! Salted service-id hashing (spec.md §3 glossary "Salted service-id
//! hash") and the sentinel salt the first virtual socket on a physical
//! connection uses before it has observed its peer's real salt
//! (spec.md §3 "Virtual socket").

use sha2::{Digest, Sha256};

use crate::proto::multiplex_frame::SALTED_HASH_LENGTH;
use crate::wire::base64url;

/// Placeholder salt for the first virtual socket on a connection, used
/// until the real salt is learned from the peer's first data frame.
pub const FIRST_SENTINEL_SALT: &str = "RECEIVER_CONDIMENT";

/// `SHA-256(service_id ∥ salt)[0..4)` (spec.md §3).
#[must_use]
pub fn salted_service_id_hash(service_id: &str, salt: &str) -> [u8; SALTED_HASH_LENGTH] {
    let digest = Sha256::digest(format!("{service_id}{salt}").as_bytes());
    let mut out = [0u8; SALTED_HASH_LENGTH];
    out.copy_from_slice(&digest[..SALTED_HASH_LENGTH]);
    out
}

/// The Base64 textual form of a salted hash, used as the virtual-socket
/// map key (spec.md §3 "keyed by the Base64 of the salted service-id
/// hash").
#[must_use]
pub fn hash_key(hash: &[u8; SALTED_HASH_LENGTH]) -> String {
    base64url::encode(hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distinct_salts_yield_distinct_hashes() {
        let a = salted_service_id_hash("service", "salt_a");
        let b = salted_service_id_hash("service", "salt_b");
        assert_ne!(a, b);
    }

    #[test]
    fn same_inputs_are_deterministic() {
        let a = salted_service_id_hash("service", "salt");
        let b = salted_service_id_hash("service", "salt");
        assert_eq!(a, b);
    }
}

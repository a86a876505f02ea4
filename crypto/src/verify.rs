//! ECDSA signing/verification and hashing helpers used by the
//! paired-key verification runner (spec.md §4.E): the `secret_id_hash`
//! sent alongside a `PairedKeyEncryptionFrame`, and the signature a
//! peer's decrypted public certificate must validate over the raw
//! auth token.

use ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

/// `sha256(auth_token ++ private_cert_metadata_key)`, truncated to
/// `len` bytes — the `secret_id_hash` field of a
/// `PairedKeyEncryptionFrame`.
#[must_use]
pub fn secret_id_hash(auth_token: &[u8], metadata_key: &[u8], len: usize) -> Vec<u8> {
    let mut h = Sha256::new();
    h.update(auth_token);
    h.update(metadata_key);
    let digest = h.finalize();
    digest[..len.min(digest.len())].to_vec()
}

/// Signs `message` with an ECDSA P-256 private key, used to produce
/// `PairedKeyEncryptionFrame::signed_data` over the raw auth token.
pub fn sign_with_private_key(private_key_bytes: &[u8; 32], message: &[u8]) -> Result<Vec<u8>> {
    let key = SigningKey::from_bytes(&(*private_key_bytes).into()).map_err(|_| Error::InvalidKey)?;
    let sig: Signature = key.sign(message);
    Ok(sig.to_der().as_bytes().to_vec())
}

/// Verifies an ECDSA P-256 signature (DER-encoded) over `message` using
/// the given SEC1-encoded public key, the operation the local side
/// performs against a peer's decrypted public certificate in spec.md
/// §4.E step 1.
pub fn verify_signature(public_key_sec1: &[u8], message: &[u8], der_signature: &[u8]) -> bool {
    let Ok(key) = VerifyingKey::from_sec1_bytes(public_key_sec1) else {
        return false;
    };
    let Ok(sig) = Signature::from_der(der_signature) else {
        return false;
    };
    key.verify(message, &sig).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::SigningKey;
    use rand_core::OsRng;

    #[test]
    fn sign_then_verify_roundtrips() {
        let signing_key = SigningKey::random(&mut OsRng);
        let private_bytes: [u8; 32] = signing_key.to_bytes().into();
        let public_bytes = signing_key
            .verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec();

        let message = b"raw auth token bytes";
        let sig = sign_with_private_key(&private_bytes, message).unwrap();
        assert!(verify_signature(&public_bytes, message, &sig));
        assert!(!verify_signature(&public_bytes, b"different message", &sig));
    }

    #[test]
    fn secret_id_hash_is_distinct_per_token() {
        let a = secret_id_hash(b"token-a", b"metadata", 6);
        let b = secret_id_hash(b"token-b", b"metadata", 6);
        assert_eq!(a.len(), 6);
        assert_ne!(a, b);
    }
}

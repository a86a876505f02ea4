//! URL-safe, unpadded Base64 — the only encoding spec.md uses, for
//! advertisements (§3) and as the textual key form of a salted
//! service-id hash (§4.C.3).

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

/// Encodes `bytes` as URL-safe, unpadded Base64.
#[must_use]
pub fn encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decodes a URL-safe, unpadded Base64 string. Returns `None` on any
/// malformed input rather than a typed error — callers treat a decode
/// failure the same as "not a value of this shape" (spec.md's
/// `is_valid() == false` pattern).
#[must_use]
pub fn decode(text: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(text).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_arbitrary_bytes() {
        let data = [0u8, 1, 2, 255, 254, 16, 32];
        assert_eq!(decode(&encode(&data)).unwrap(), data);
    }

    #[test]
    fn rejects_garbage() {
        assert!(decode("not base64!!! @@@").is_none());
    }
}

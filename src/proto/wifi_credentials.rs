//! `WifiCredentials` (spec.md §4.H "Receiver FinalizePayloads"): the
//! small payload carried by a wifi-credentials attachment once its
//! bytes have fully arrived. Same hand-written TLV shape as
//! [`super::multiplex_frame`]/[`super::v1_frame`] rather than generated
//! protobuf code.

use bytes::BytesMut;

use super::{iter_fields, put_field};

const TAG_PASSWORD: u8 = 1;
const TAG_HIDDEN_SSID: u8 = 2;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WifiCredentials {
    pub password: String,
    pub hidden_ssid: bool,
}

impl WifiCredentials {
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = BytesMut::new();
        put_field(&mut out, TAG_PASSWORD, self.password.as_bytes());
        put_field(&mut out, TAG_HIDDEN_SSID, &[u8::from(self.hidden_ssid)]);
        out.to_vec()
    }

    /// Returns `None` for empty input, matching spec.md's "empty bytes
    /// maps to `kIncompletePayloads`" rule rather than an all-defaults
    /// credentials value.
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }
        let mut credentials = Self::default();
        for (tag, value) in iter_fields(bytes) {
            match tag {
                TAG_PASSWORD => credentials.password = String::from_utf8_lossy(&value).into_owned(),
                TAG_HIDDEN_SSID => credentials.hidden_ssid = value.first().copied().unwrap_or(0) != 0,
                _ => {}
            }
        }
        Some(credentials)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_password_and_hidden_flag() {
        let credentials = WifiCredentials { password: "hunter2".into(), hidden_ssid: true };
        let decoded = WifiCredentials::decode(&credentials.encode()).unwrap();
        assert_eq!(decoded, credentials);
    }

    #[test]
    fn empty_bytes_decode_to_none() {
        assert_eq!(WifiCredentials::decode(&[]), None);
    }

    mod proptests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn round_trips_any_password_and_flag(password in ".*", hidden_ssid in any::<bool>()) {
                let credentials = WifiCredentials { password, hidden_ssid };
                let decoded = WifiCredentials::decode(&credentials.encode()).unwrap();
                prop_assert_eq!(decoded, credentials);
            }

            /// Arbitrary, possibly-malformed bytes must never panic: unknown
            /// tags are skipped and a truncated trailing field just ends
            /// decoding early (see `super::iter_fields`).
            #[test]
            fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
                let _ = WifiCredentials::decode(&bytes);
            }
        }
    }
}

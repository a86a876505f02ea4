//! `[VERSION|PCP][ENDPOINT_ID][SERVICE_ID_HASH][WEBRTC][RESERVED][LEN][ENDPOINT_INFO][UWB]`,
//! Base64-encoded, advertised as the local Bluetooth Classic device
//! name (spec.md §3 "Bluetooth device name").

use super::{Pcp, Version, WebRtcState, ENDPOINT_ID_LENGTH, MAX_ENDPOINT_INFO_LENGTH, SERVICE_ID_HASH_LENGTH};
use crate::wire::base64url;

const RESERVED_LENGTH: usize = 6;
const MIN_DECODED_LENGTH: usize = 1 + ENDPOINT_ID_LENGTH + SERVICE_ID_HASH_LENGTH + 1 + RESERVED_LENGTH + 1;

/// A parsed or to-be-encoded Bluetooth Classic device name
/// advertisement. An instance built from invalid inputs (bad version,
/// unrecognized PCP, wrong-length endpoint id/service-id hash) is
/// still constructible but `is_valid()` returns `false` and
/// `to_base64()` returns an empty string.
#[derive(Clone, Debug, Default)]
pub struct BluetoothDeviceName {
    valid: bool,
    version: Option<Version>,
    pcp: Option<Pcp>,
    endpoint_id: [u8; ENDPOINT_ID_LENGTH],
    service_id_hash: [u8; SERVICE_ID_HASH_LENGTH],
    endpoint_info: Vec<u8>,
    uwb_address: Option<Vec<u8>>,
    web_rtc_state: WebRtcState,
}

impl BluetoothDeviceName {
    /// Builds a new advertisement from its logical fields. Returns an
    /// object with `is_valid() == false` if any field is out of shape;
    /// the caller does not need to check first.
    #[must_use]
    pub fn new(
        version: Version,
        pcp: Pcp,
        endpoint_id: &[u8],
        service_id_hash: &[u8],
        endpoint_info: &[u8],
        uwb_address: Option<&[u8]>,
        web_rtc_state: WebRtcState,
    ) -> Self {
        if version != Version::V1
            || endpoint_id.len() != ENDPOINT_ID_LENGTH
            || service_id_hash.len() != SERVICE_ID_HASH_LENGTH
        {
            return Self::default();
        }
        let mut id = [0u8; ENDPOINT_ID_LENGTH];
        id.copy_from_slice(endpoint_id);
        let mut hash = [0u8; SERVICE_ID_HASH_LENGTH];
        hash.copy_from_slice(service_id_hash);
        Self {
            valid: true,
            version: Some(version),
            pcp: Some(pcp),
            endpoint_id: id,
            service_id_hash: hash,
            endpoint_info: endpoint_info.to_vec(),
            uwb_address: uwb_address.map(<[u8]>::to_vec),
            web_rtc_state,
        }
    }

    /// Parses a Base64-encoded Bluetooth device name. Malformed or
    /// short input yields `is_valid() == false`.
    #[must_use]
    pub fn from_base64(encoded: &str) -> Self {
        let Some(bytes) = base64url::decode(encoded) else {
            return Self::default();
        };
        if bytes.len() < MIN_DECODED_LENGTH {
            return Self::default();
        }
        let mut pos = 0usize;
        let version_and_pcp = bytes[pos];
        pos += 1;
        let Ok(version) = Version::try_from(version_and_pcp >> 5) else {
            return Self::default();
        };
        if version != Version::V1 {
            return Self::default();
        }
        let Ok(pcp) = Pcp::try_from(version_and_pcp & 0x1F) else {
            return Self::default();
        };

        let mut endpoint_id = [0u8; ENDPOINT_ID_LENGTH];
        endpoint_id.copy_from_slice(&bytes[pos..pos + ENDPOINT_ID_LENGTH]);
        pos += ENDPOINT_ID_LENGTH;

        let mut service_id_hash = [0u8; SERVICE_ID_HASH_LENGTH];
        service_id_hash.copy_from_slice(&bytes[pos..pos + SERVICE_ID_HASH_LENGTH]);
        pos += SERVICE_ID_HASH_LENGTH;

        let web_rtc_byte = bytes[pos];
        pos += 1;
        let web_rtc_state = if web_rtc_byte & 0x01 == 1 {
            WebRtcState::Connectable
        } else {
            WebRtcState::Unconnectable
        };

        pos += RESERVED_LENGTH; // reserved, ignored

        let Some(&len_byte) = bytes.get(pos) else {
            return Self::default();
        };
        pos += 1;
        let endpoint_info_len = len_byte as usize;
        if bytes.len() < pos + endpoint_info_len {
            return Self::default();
        }
        let endpoint_info = bytes[pos..pos + endpoint_info_len].to_vec();
        pos += endpoint_info_len;

        let mut uwb_address = None;
        if pos < bytes.len() {
            let uwb_len = bytes[pos] as usize;
            pos += 1;
            if uwb_len != 0 && bytes.len() >= pos + uwb_len {
                uwb_address = Some(bytes[pos..pos + uwb_len].to_vec());
            }
        }

        Self {
            valid: true,
            version: Some(version),
            pcp: Some(pcp),
            endpoint_id,
            service_id_hash,
            endpoint_info,
            uwb_address,
            web_rtc_state,
        }
    }

    /// Encodes this advertisement as a Base64 string, or an empty
    /// string if `!is_valid()`. Endpoint info over 131 bytes is
    /// silently truncated (spec.md §4.B).
    #[must_use]
    pub fn to_base64(&self) -> String {
        if !self.valid {
            return String::new();
        }
        let mut out = Vec::new();
        let version_and_pcp = (u8::from(self.version.unwrap()) << 5) | u8::from(self.pcp.unwrap());
        out.push(version_and_pcp);
        out.extend_from_slice(&self.endpoint_id);
        out.extend_from_slice(&self.service_id_hash);
        out.push(u8::from(self.web_rtc_state == WebRtcState::Connectable));
        out.extend(std::iter::repeat(0u8).take(RESERVED_LENGTH));
        let usable_info = &self.endpoint_info[..self.endpoint_info.len().min(MAX_ENDPOINT_INFO_LENGTH)];
        out.push(usable_info.len() as u8);
        out.extend_from_slice(usable_info);
        if let Some(uwb) = &self.uwb_address {
            out.push(uwb.len() as u8);
            out.extend_from_slice(uwb);
        }
        base64url::encode(&out)
    }

    /// Whether this advertisement is well-formed.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    #[must_use]
    pub fn endpoint_id(&self) -> &[u8] {
        &self.endpoint_id
    }

    #[must_use]
    pub fn service_id_hash(&self) -> &[u8] {
        &self.service_id_hash
    }

    #[must_use]
    pub fn endpoint_info(&self) -> &[u8] {
        &self.endpoint_info
    }

    #[must_use]
    pub fn uwb_address(&self) -> Option<&[u8]> {
        self.uwb_address.as_deref()
    }

    #[must_use]
    pub const fn web_rtc_state(&self) -> WebRtcState {
        self.web_rtc_state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_with_uwb_address() {
        let name = BluetoothDeviceName::new(
            Version::V1,
            Pcp::P2pCluster,
            b"ABCD",
            b"ABC",
            b"GG",
            Some(&[0x01, 0x02]),
            WebRtcState::Connectable,
        );
        assert!(name.is_valid());

        let decoded = BluetoothDeviceName::from_base64(&name.to_base64());
        assert!(decoded.is_valid());
        assert_eq!(decoded.endpoint_id(), b"ABCD");
        assert_eq!(decoded.service_id_hash(), b"ABC");
        assert_eq!(decoded.endpoint_info(), b"GG");
        assert_eq!(decoded.uwb_address(), Some(&[0x01, 0x02][..]));
        assert_eq!(decoded.web_rtc_state(), WebRtcState::Connectable);
    }

    #[test]
    fn rejects_bad_version() {
        // version = 7 (invalid), rest arbitrary.
        let mut raw = vec![0xE1u8];
        raw.extend(std::iter::repeat(0u8).take(15));
        let encoded = base64url::encode(&raw);
        assert!(!BluetoothDeviceName::from_base64(&encoded).is_valid());
    }

    #[test]
    fn truncates_long_endpoint_info_on_encode() {
        let long_info = vec![b'x'; 200];
        let name = BluetoothDeviceName::new(
            Version::V1,
            Pcp::P2pStar,
            b"WXYZ",
            b"hsh",
            &long_info,
            None,
            WebRtcState::Unconnectable,
        );
        let decoded = BluetoothDeviceName::from_base64(&name.to_base64());
        assert_eq!(decoded.endpoint_info().len(), MAX_ENDPOINT_INFO_LENGTH);
        assert_eq!(decoded.endpoint_info(), &long_info[..MAX_ENDPOINT_INFO_LENGTH]);
    }

    #[test]
    fn invalid_construction_serializes_empty() {
        let name = BluetoothDeviceName::new(
            Version::V1,
            Pcp::P2pCluster,
            b"TOO_LONG_ID",
            b"ABC",
            b"",
            None,
            WebRtcState::Undefined,
        );
        assert!(!name.is_valid());
        assert_eq!(name.to_base64(), "");
    }

    mod proptests {
        use proptest::prelude::*;

        use super::*;

        fn pcp() -> impl Strategy<Value = Pcp> {
            prop_oneof![Just(Pcp::P2pCluster), Just(Pcp::P2pStar), Just(Pcp::P2pPointToPoint)]
        }

        fn web_rtc_state() -> impl Strategy<Value = WebRtcState> {
            prop_oneof![Just(WebRtcState::Undefined), Just(WebRtcState::Connectable), Just(WebRtcState::Unconnectable)]
        }

        proptest! {
            // spec.md §8 "Advertisement roundtrip".
            #[test]
            fn roundtrips_for_any_valid_fields(
                pcp in pcp(),
                endpoint_id in prop::array::uniform4(any::<u8>()),
                service_id_hash in prop::array::uniform3(any::<u8>()),
                endpoint_info in prop::collection::vec(any::<u8>(), 0..=MAX_ENDPOINT_INFO_LENGTH),
                uwb_address in proptest::option::of(prop::collection::vec(any::<u8>(), 0..=8)),
                web_rtc_state in web_rtc_state(),
            ) {
                let name = BluetoothDeviceName::new(
                    Version::V1,
                    pcp,
                    &endpoint_id,
                    &service_id_hash,
                    &endpoint_info,
                    uwb_address.as_deref(),
                    web_rtc_state,
                );
                prop_assert!(name.is_valid());

                let decoded = BluetoothDeviceName::from_base64(&name.to_base64());
                prop_assert!(decoded.is_valid());
                prop_assert_eq!(decoded.endpoint_id(), &endpoint_id[..]);
                prop_assert_eq!(decoded.service_id_hash(), &service_id_hash[..]);
                prop_assert_eq!(decoded.endpoint_info(), &endpoint_info[..]);
                // `Unconnectable` and `Undefined` both decode back as
                // `Unconnectable`: the wire format has only one bit for this.
                let expected_web_rtc = if web_rtc_state == WebRtcState::Connectable {
                    WebRtcState::Connectable
                } else {
                    WebRtcState::Unconnectable
                };
                prop_assert_eq!(decoded.web_rtc_state(), expected_web_rtc);
            }

            // spec.md §8 "Advertisement truncation".
            #[test]
            fn oversized_endpoint_info_truncates_to_the_wire_limit(
                endpoint_info in prop::collection::vec(any::<u8>(), MAX_ENDPOINT_INFO_LENGTH + 1..MAX_ENDPOINT_INFO_LENGTH + 64),
            ) {
                let name = BluetoothDeviceName::new(
                    Version::V1,
                    Pcp::P2pCluster,
                    b"ABCD",
                    b"ABC",
                    &endpoint_info,
                    None,
                    WebRtcState::Undefined,
                );
                let decoded = BluetoothDeviceName::from_base64(&name.to_base64());
                prop_assert!(decoded.is_valid());
                prop_assert_eq!(decoded.endpoint_info(), &endpoint_info[..MAX_ENDPOINT_INFO_LENGTH]);
            }
        }
    }
}

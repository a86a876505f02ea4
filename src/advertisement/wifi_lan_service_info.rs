//! Wi-Fi LAN mDNS service info (spec.md §3 "Wi-Fi LAN service info"):
//! the service name carries version/pcp/endpoint-id/service-id-hash and
//! an optional UWB address and WebRTC extra byte; the TXT record under
//! key `"n"` carries the endpoint info separately, since mDNS service
//! names are far shorter than Bluetooth device names.

use super::{Pcp, Version, WebRtcState, ENDPOINT_ID_LENGTH, MAX_ENDPOINT_INFO_LENGTH, SERVICE_ID_HASH_LENGTH};
use crate::wire::base64url;

/// TXT record key under which the Base64-encoded endpoint info is
/// stored.
pub const TXT_KEY_ENDPOINT_INFO: &str = "n";

const MIN_SERVICE_NAME_LENGTH: usize = 1 + ENDPOINT_ID_LENGTH + SERVICE_ID_HASH_LENGTH;

#[derive(Clone, Debug, Default)]
pub struct WifiLanServiceInfo {
    valid: bool,
    version: Option<Version>,
    pcp: Option<Pcp>,
    endpoint_id: [u8; ENDPOINT_ID_LENGTH],
    service_id_hash: [u8; SERVICE_ID_HASH_LENGTH],
    endpoint_info: Vec<u8>,
    uwb_address: Option<Vec<u8>>,
    web_rtc_state: WebRtcState,
}

impl WifiLanServiceInfo {
    /// Builds a new service info from its logical fields, invalid if
    /// any field is out of shape.
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
            || endpoint_info.len() > MAX_ENDPOINT_INFO_LENGTH
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

    /// Parses from the mDNS service name plus the `"n"` TXT record
    /// value (already Base64, as they appear on the wire).
    #[must_use]
    pub fn from_parts(service_name: &str, txt_endpoint_info: Option<&str>) -> Self {
        let mut endpoint_info = Vec::new();
        if let Some(txt) = txt_endpoint_info {
            if !txt.is_empty() {
                match base64url::decode(txt) {
                    Some(bytes) if bytes.len() <= MAX_ENDPOINT_INFO_LENGTH => endpoint_info = bytes,
                    _ => return Self::default(),
                }
            }
        }

        let Some(bytes) = base64url::decode(service_name) else {
            return Self::default();
        };
        if bytes.len() < MIN_SERVICE_NAME_LENGTH {
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

        let mut uwb_address = None;
        let mut web_rtc_state = WebRtcState::Undefined;
        if pos < bytes.len() {
            let uwb_len = bytes[pos] as usize;
            pos += 1;
            if uwb_len != 0 {
                if bytes.len() < pos + uwb_len {
                    return Self::default();
                }
                uwb_address = Some(bytes[pos..pos + uwb_len].to_vec());
                pos += uwb_len;
            }
            if pos < bytes.len() {
                let extra = bytes[pos];
                web_rtc_state = if extra & 0x01 == 1 {
                    WebRtcState::Connectable
                } else {
                    WebRtcState::Unconnectable
                };
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

    /// Encodes the mDNS service name. Empty if `!is_valid()`.
    #[must_use]
    pub fn service_name(&self) -> String {
        if !self.valid {
            return String::new();
        }
        let mut out = Vec::new();
        let version_and_pcp = (u8::from(self.version.unwrap()) << 5) | u8::from(self.pcp.unwrap());
        out.push(version_and_pcp);
        out.extend_from_slice(&self.endpoint_id);
        out.extend_from_slice(&self.service_id_hash);
        match &self.uwb_address {
            Some(uwb) => {
                out.push(uwb.len() as u8);
                out.extend_from_slice(uwb);
            }
            None if self.web_rtc_state != WebRtcState::Undefined => out.push(0),
            None => {}
        }
        if self.web_rtc_state != WebRtcState::Undefined {
            out.push(u8::from(self.web_rtc_state == WebRtcState::Connectable));
        }
        base64url::encode(&out)
    }

    /// Encodes the `"n"` TXT record value. Empty if `!is_valid()`.
    #[must_use]
    pub fn txt_endpoint_info(&self) -> String {
        if !self.valid {
            return String::new();
        }
        base64url::encode(&self.endpoint_info)
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    #[must_use]
    pub fn endpoint_id(&self) -> &[u8] {
        &self.endpoint_id
    }

    #[must_use]
    pub fn endpoint_info(&self) -> &[u8] {
        &self.endpoint_info
    }

    #[must_use]
    pub fn uwb_address(&self) -> Option<&[u8]> {
        self.uwb_address.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_service_name_and_txt_record() {
        let info = WifiLanServiceInfo::new(
            Version::V1,
            Pcp::P2pPointToPoint,
            b"WXYZ",
            b"svc",
            b"endpoint-data",
            Some(&[0xAA, 0xBB]),
            WebRtcState::Connectable,
        );
        assert!(info.is_valid());

        let decoded = WifiLanServiceInfo::from_parts(&info.service_name(), Some(&info.txt_endpoint_info()));
        assert!(decoded.is_valid());
        assert_eq!(decoded.endpoint_id(), b"WXYZ");
        assert_eq!(decoded.endpoint_info(), b"endpoint-data");
        assert_eq!(decoded.uwb_address(), Some(&[0xAA, 0xBB][..]));
    }

    #[test]
    fn rejects_oversized_endpoint_info() {
        let info = WifiLanServiceInfo::new(
            Version::V1,
            Pcp::P2pCluster,
            b"ABCD",
            b"abc",
            &vec![0u8; MAX_ENDPOINT_INFO_LENGTH + 1],
            None,
            WebRtcState::Undefined,
        );
        assert!(!info.is_valid());
    }
}

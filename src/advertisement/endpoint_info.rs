//! The sharing-layer advertisement (spec.md §6): carried inside the
//! `endpoint_info` bytes of whichever connections-layer advertisement
//! (§4.B) the active medium uses. This is what
//! [`crate::resolution`] decrypts to recover a peer's
//! [`crate::share_target::ShareTarget`] identity.
//!
//! `[VERSION|VISIBILITY][SALT(2)][ENCRYPTED_METADATA_KEY(14)][DEVICE_TYPE][LEN?][DEVICE_NAME?][VENDOR_ID?]`.
//! A present device name means "visible to everyone"; an absent one
//! means "contacts only" — grounded on
//! `examples/original_source/sharing/advertisement.h`'s
//! `HasDeviceName()`.

use crate::share_target::{DeviceType, VendorId};
use crate::visibility::DeviceVisibility;

pub const SALT_LENGTH: usize = 2;
pub const ENCRYPTED_METADATA_KEY_LENGTH: usize = 14;

const MIN_LENGTH: usize = 1 + SALT_LENGTH + ENCRYPTED_METADATA_KEY_LENGTH + 1;

/// The sharing-layer advertisement: salt and encrypted metadata key
/// let [`crate::resolution`] try each cached public certificate until
/// one decrypts successfully, revealing the peer's real identity.
#[derive(Clone, Debug, Default)]
pub struct Advertisement {
    valid: bool,
    visibility: DeviceVisibility,
    salt: [u8; SALT_LENGTH],
    encrypted_metadata_key: [u8; ENCRYPTED_METADATA_KEY_LENGTH],
    device_type: DeviceType,
    device_name: Option<String>,
    vendor_id: VendorId,
}

impl Advertisement {
    /// Builds a new advertisement. Invalid if the salt or metadata-key
    /// lengths are wrong.
    #[must_use]
    pub fn new(
        visibility: DeviceVisibility,
        salt: &[u8],
        encrypted_metadata_key: &[u8],
        device_type: DeviceType,
        device_name: Option<String>,
        vendor_id: VendorId,
    ) -> Self {
        if salt.len() != SALT_LENGTH || encrypted_metadata_key.len() != ENCRYPTED_METADATA_KEY_LENGTH {
            return Self::default();
        }
        let mut s = [0u8; SALT_LENGTH];
        s.copy_from_slice(salt);
        let mut k = [0u8; ENCRYPTED_METADATA_KEY_LENGTH];
        k.copy_from_slice(encrypted_metadata_key);
        Self {
            valid: true,
            visibility,
            salt: s,
            encrypted_metadata_key: k,
            device_type,
            device_name,
            vendor_id,
        }
    }

    /// Parses raw endpoint-info bytes (spec.md §6). Unknown trailing
    /// bytes (a missing vendor id) are tolerated.
    #[must_use]
    pub fn from_endpoint_info(bytes: &[u8]) -> Self {
        if bytes.len() < MIN_LENGTH {
            return Self::default();
        }
        let mut pos = 0usize;
        let version_and_visibility = bytes[pos];
        pos += 1;
        // Version occupies the upper 3 bits; only version 0 is defined
        // today, but forward-compatible readers ignore its value rather
        // than rejecting unknown versions outright.
        let Ok(visibility) = DeviceVisibility::try_from(version_and_visibility & 0x1F) else {
            return Self::default();
        };

        let mut salt = [0u8; SALT_LENGTH];
        salt.copy_from_slice(&bytes[pos..pos + SALT_LENGTH]);
        pos += SALT_LENGTH;

        let mut key = [0u8; ENCRYPTED_METADATA_KEY_LENGTH];
        key.copy_from_slice(&bytes[pos..pos + ENCRYPTED_METADATA_KEY_LENGTH]);
        pos += ENCRYPTED_METADATA_KEY_LENGTH;

        let Ok(device_type) = DeviceType::try_from(bytes[pos]) else {
            return Self::default();
        };
        pos += 1;

        let mut device_name = None;
        if pos < bytes.len() {
            let name_len = bytes[pos] as usize;
            pos += 1;
            if bytes.len() < pos + name_len {
                return Self::default();
            }
            device_name = String::from_utf8(bytes[pos..pos + name_len].to_vec()).ok();
            pos += name_len;
        }

        let vendor_id = bytes
            .get(pos)
            .and_then(|&b| VendorId::try_from(b).ok())
            .unwrap_or_default();

        Self {
            valid: true,
            visibility,
            salt,
            encrypted_metadata_key: key,
            device_type,
            device_name,
            vendor_id,
        }
    }

    /// Encodes this advertisement as endpoint-info bytes, empty if
    /// `!is_valid()`.
    #[must_use]
    pub fn to_endpoint_info(&self) -> Vec<u8> {
        if !self.valid {
            return Vec::new();
        }
        let mut out = Vec::new();
        out.push(u8::from(self.visibility) & 0x1F);
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.encrypted_metadata_key);
        out.push(self.device_type.into());
        if let Some(name) = &self.device_name {
            let truncated = &name.as_bytes()[..name.len().min(255)];
            out.push(truncated.len() as u8);
            out.extend_from_slice(truncated);
        }
        if self.vendor_id != VendorId::None {
            out.push(self.vendor_id.into());
        }
        out
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    #[must_use]
    pub const fn visibility(&self) -> DeviceVisibility {
        self.visibility
    }

    #[must_use]
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }

    #[must_use]
    pub fn encrypted_metadata_key(&self) -> &[u8] {
        &self.encrypted_metadata_key
    }

    #[must_use]
    pub const fn device_type(&self) -> DeviceType {
        self.device_type
    }

    #[must_use]
    pub fn device_name(&self) -> Option<&str> {
        self.device_name.as_deref()
    }

    /// A present device name means "visible to everyone"; absent means
    /// contacts-only.
    #[must_use]
    pub const fn has_device_name(&self) -> bool {
        self.device_name.is_some()
    }

    #[must_use]
    pub const fn vendor_id(&self) -> VendorId {
        self.vendor_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_everyone_visibility_with_device_name() {
        let adv = Advertisement::new(
            DeviceVisibility::Everyone,
            &[0xAA, 0xBB],
            &[0u8; ENCRYPTED_METADATA_KEY_LENGTH],
            DeviceType::Phone,
            Some("Pixel".to_string()),
            VendorId::None,
        );
        assert!(adv.is_valid());
        let decoded = Advertisement::from_endpoint_info(&adv.to_endpoint_info());
        assert!(decoded.is_valid());
        assert!(decoded.has_device_name());
        assert_eq!(decoded.device_name(), Some("Pixel"));
        assert_eq!(decoded.visibility(), DeviceVisibility::Everyone);
    }

    #[test]
    fn contacts_only_omits_device_name() {
        let adv = Advertisement::new(
            DeviceVisibility::Contacts,
            &[0x01, 0x02],
            &[1u8; ENCRYPTED_METADATA_KEY_LENGTH],
            DeviceType::Laptop,
            None,
            VendorId::Samsung,
        );
        let encoded = adv.to_endpoint_info();
        let decoded = Advertisement::from_endpoint_info(&encoded);
        assert!(!decoded.has_device_name());
        assert_eq!(decoded.vendor_id(), VendorId::Samsung);
    }

    #[test]
    fn short_input_is_invalid() {
        assert!(!Advertisement::from_endpoint_info(&[0, 1, 2]).is_valid());
    }
}

//! `[VERSION|EXTENDED|NUM_SLOTS][BLOOM_FILTER(10)][HASH(4)][PSM(2)?]`
//! (spec.md §3 "BLE advertisement header"), carried in the BLE GAP
//! advertisement data rather than a device name string.

use super::Version;

const BLOOM_FILTER_LENGTH: usize = 10;
const ADVERTISEMENT_HASH_LENGTH: usize = 4;
const MIN_LENGTH: usize = 1 + BLOOM_FILTER_LENGTH + ADVERTISEMENT_HASH_LENGTH;

/// A parsed or to-be-encoded BLE advertisement header.
#[derive(Clone, Debug, Default)]
pub struct BleAdvertisementHeader {
    valid: bool,
    version: Option<Version>,
    extended_advertisement: bool,
    num_slots: u8,
    service_id_bloom_filter: [u8; BLOOM_FILTER_LENGTH],
    advertisement_hash: [u8; ADVERTISEMENT_HASH_LENGTH],
    psm: Option<u16>,
}

impl BleAdvertisementHeader {
    /// Builds a new header. `num_slots` must fit in 4 bits
    /// (`0..=15`); anything else (including a negative count,
    /// represented here as the caller passing a value outside that
    /// range) produces an invalid header.
    #[must_use]
    pub fn new(
        version: Version,
        extended_advertisement: bool,
        num_slots: i32,
        service_id_bloom_filter: &[u8],
        advertisement_hash: &[u8],
        psm: Option<u16>,
    ) -> Self {
        if version != Version::V2
            || !(0..=0x0F).contains(&num_slots)
            || service_id_bloom_filter.len() != BLOOM_FILTER_LENGTH
            || advertisement_hash.len() != ADVERTISEMENT_HASH_LENGTH
        {
            return Self::default();
        }
        let mut bloom = [0u8; BLOOM_FILTER_LENGTH];
        bloom.copy_from_slice(service_id_bloom_filter);
        let mut hash = [0u8; ADVERTISEMENT_HASH_LENGTH];
        hash.copy_from_slice(advertisement_hash);
        Self {
            valid: true,
            version: Some(version),
            extended_advertisement,
            num_slots: num_slots as u8,
            service_id_bloom_filter: bloom,
            advertisement_hash: hash,
            psm,
        }
    }

    /// Parses a raw (not Base64 — BLE advertisement data is already
    /// binary) byte buffer.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.len() < MIN_LENGTH {
            return Self::default();
        }
        let header_byte = bytes[0];
        let Ok(version) = Version::try_from(header_byte >> 5) else {
            return Self::default();
        };
        if version != Version::V2 {
            return Self::default();
        }
        let extended_advertisement = (header_byte >> 4) & 0x01 == 1;
        let num_slots = header_byte & 0x0F;

        let mut bloom = [0u8; BLOOM_FILTER_LENGTH];
        bloom.copy_from_slice(&bytes[1..1 + BLOOM_FILTER_LENGTH]);

        let hash_start = 1 + BLOOM_FILTER_LENGTH;
        let mut hash = [0u8; ADVERTISEMENT_HASH_LENGTH];
        hash.copy_from_slice(&bytes[hash_start..hash_start + ADVERTISEMENT_HASH_LENGTH]);

        let psm_start = hash_start + ADVERTISEMENT_HASH_LENGTH;
        let psm = if bytes.len() >= psm_start + 2 {
            Some(u16::from_be_bytes([bytes[psm_start], bytes[psm_start + 1]]))
        } else {
            None
        };

        Self {
            valid: true,
            version: Some(version),
            extended_advertisement,
            num_slots,
            service_id_bloom_filter: bloom,
            advertisement_hash: hash,
            psm,
        }
    }

    /// Encodes this header as raw bytes, empty if `!is_valid()`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        if !self.valid {
            return Vec::new();
        }
        let mut out = Vec::with_capacity(MIN_LENGTH + 2);
        let header_byte = (u8::from(self.version.unwrap()) << 5)
            | (u8::from(self.extended_advertisement) << 4)
            | self.num_slots;
        out.push(header_byte);
        out.extend_from_slice(&self.service_id_bloom_filter);
        out.extend_from_slice(&self.advertisement_hash);
        if let Some(psm) = self.psm {
            out.extend_from_slice(&psm.to_be_bytes());
        }
        out
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    #[must_use]
    pub const fn is_support_extended_advertisement(&self) -> bool {
        self.extended_advertisement
    }

    #[must_use]
    pub const fn num_slots(&self) -> u8 {
        self.num_slots
    }

    #[must_use]
    pub fn service_id_bloom_filter(&self) -> &[u8] {
        &self.service_id_bloom_filter
    }

    #[must_use]
    pub fn advertisement_hash(&self) -> &[u8] {
        &self.advertisement_hash
    }

    #[must_use]
    pub const fn psm(&self) -> Option<u16> {
        self.psm
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_with_psm() {
        let header = BleAdvertisementHeader::new(
            Version::V2,
            false,
            2,
            &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10],
            &[10, 11, 12, 13],
            Some(127),
        );
        assert!(header.is_valid());
        let decoded = BleAdvertisementHeader::from_bytes(&header.to_bytes());
        assert!(decoded.is_valid());
        assert_eq!(decoded.num_slots(), 2);
        assert_eq!(decoded.psm(), Some(127));
        assert!(!decoded.is_support_extended_advertisement());
    }

    #[test]
    fn zero_slots_is_valid_negative_is_not() {
        assert!(BleAdvertisementHeader::new(
            Version::V2,
            false,
            0,
            &[0; 10],
            &[0; 4],
            None
        )
        .is_valid());
        assert!(!BleAdvertisementHeader::new(
            Version::V2,
            false,
            -1,
            &[0; 10],
            &[0; 4],
            None
        )
        .is_valid());
    }

    #[test]
    fn bad_version_is_invalid() {
        assert!(!BleAdvertisementHeader::new(
            Version::V1,
            false,
            1,
            &[0; 10],
            &[0; 4],
            None
        )
        .is_valid());
    }
}

//! Tunable timeouts and thresholds, gathered in one injectable value
//! instead of scattered module-level constants (spec.md §6 Constants).

use std::time::Duration;

/// Every timeout/threshold named in spec.md §6, plus the speed-window
/// size the Open Questions section left unspecified (resolved in
/// `DESIGN.md`: 500 ms, matching the "~500 ms window" spec.md §4.G
/// already names for the instantaneous-rate case).
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    /// Overall UKEY2 handshake deadline (spec.md §4.D `kTimeout`).
    #[serde(with = "duration_millis")]
    pub handshake_timeout: Duration,
    /// Deadline for reading the INTRODUCTION frame (`kReadFramesTimeout`).
    #[serde(with = "duration_millis")]
    pub read_frames_timeout: Duration,
    /// Deadline for the sender awaiting `CONNECTION_RESPONSE`
    /// (`kReadResponseFrameTimeout`).
    #[serde(with = "duration_millis")]
    pub read_response_frame_timeout: Duration,
    /// Delay between a locally-initiated cancel and the actual
    /// disconnect (`kInitiatorCancelDelay`).
    #[serde(with = "duration_millis")]
    pub initiator_cancel_delay: Duration,
    /// Delay before a sender disconnects after a final `kComplete`
    /// (`kOutgoingDisconnectionDelay`).
    #[serde(with = "duration_millis")]
    pub outgoing_disconnection_delay: Duration,
    /// Total attachment size at/above which a bandwidth upgrade is
    /// requested.
    pub attachments_size_threshold_over_high_quality_medium: u64,
    /// Per-write deadline on the physical multiplex writer.
    #[serde(with = "duration_millis")]
    pub mediums_frame_write_timeout: Duration,
    /// Deadline for `establish_virtual_socket`'s `CONNECTION_RESPONSE`.
    #[serde(with = "duration_millis")]
    pub multiplex_socket_connection_response_timeout: Duration,
    /// Maximum number of physical-frame bytes accepted before a length
    /// prefix is treated as corrupt.
    pub max_frame_length: i32,
    /// `kMaxCertificateDownloadsDuringDiscovery`.
    pub max_certificate_downloads_during_discovery: u8,
    /// `kCertificateDownloadDuringDiscoveryPeriod`.
    #[serde(with = "duration_millis")]
    pub certificate_download_during_discovery_period: Duration,
    /// Width of the sliding window used to smooth transfer speed.
    #[serde(with = "duration_millis")]
    pub transfer_speed_window: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(15),
            read_frames_timeout: Duration::from_secs(15),
            read_response_frame_timeout: Duration::from_secs(60),
            initiator_cancel_delay: Duration::from_millis(500),
            outgoing_disconnection_delay: Duration::from_secs(60),
            attachments_size_threshold_over_high_quality_medium: 1024 * 1024 * 4,
            mediums_frame_write_timeout: Duration::from_secs(10),
            multiplex_socket_connection_response_timeout: Duration::from_secs(5),
            max_frame_length: 1024 * 1024 * 32,
            max_certificate_downloads_during_discovery: 3,
            certificate_download_during_discovery_period: Duration::from_secs(10),
            transfer_speed_window: Duration::from_millis(500),
        }
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrips_through_toml() {
        let cfg = Config::default();
        let text = toml::to_string(&cfg).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.handshake_timeout, cfg.handshake_timeout);
        assert_eq!(
            back.max_certificate_downloads_during_discovery,
            cfg.max_certificate_downloads_during_discovery
        );
    }
}

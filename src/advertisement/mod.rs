//! Advertisement codec (spec.md §4.B): pack/unpack the three on-the-wire
//! advertisement shapes used to bootstrap a physical medium connection,
//! plus the application-level "endpoint info" advertisement (spec.md §6,
//! §4.I) that resolves a peer's [`crate::share_target::ShareTarget`]
//! identity once connected.
//!
//! Every codec here follows the same contract: a constructor that
//! fails validation sets an internal invalid flag rather than
//! returning `Result`, and `is_valid() == false` objects serialize to
//! empty output (spec.md §4.B, §8 "Advertisement invalidity is
//! sticky").

pub mod ble_advertisement_header;
pub mod bluetooth_device_name;
pub mod endpoint_info;
pub mod wifi_lan_service_info;

pub use ble_advertisement_header::BleAdvertisementHeader;
pub use bluetooth_device_name::BluetoothDeviceName;
pub use endpoint_info::Advertisement;
pub use wifi_lan_service_info::WifiLanServiceInfo;

/// Advertisement format version (spec.md §3): `V1` for Bluetooth/Wi-Fi
/// LAN shapes, `V2` for the BLE header.
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum Version {
    V1 = 1,
    V2 = 2,
}

/// Protocol Connection Profile: the peer-to-peer topology this
/// endpoint advertises support for.
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum Pcp {
    P2pCluster = 1,
    P2pStar = 2,
    P2pPointToPoint = 3,
}

/// Whether a medium endpoint has an open WebRTC path, as carried in
/// the Bluetooth device name and Wi-Fi LAN service info shapes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum WebRtcState {
    #[default]
    Undefined,
    Connectable,
    Unconnectable,
}

pub(crate) const ENDPOINT_ID_LENGTH: usize = 4;
pub(crate) const SERVICE_ID_HASH_LENGTH: usize = 3;
pub(crate) const MAX_ENDPOINT_INFO_LENGTH: usize = 131;

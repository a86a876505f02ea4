//! The peer-facing data model (spec.md §3): a [`ShareTarget`] is one
//! remote device across one transfer, carrying whatever
//! [`Attachment`]s are in flight.

use std::collections::HashMap;

/// The kind of device a [`ShareTarget`] identifies as, inferred from
/// its advertisement (spec.md §3).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum DeviceType {
    #[default]
    Unknown = 0,
    Phone = 1,
    Tablet = 2,
    Laptop = 3,
    Car = 4,
    Xr = 5,
}

/// A vendor identifier carried on the advertisement, used to flag
/// vendor-specific target-blocking behavior.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum VendorId {
    #[default]
    None = 0,
    Samsung = 1,
}

/// Identity and attachment list of one remote device for one transfer.
#[derive(Clone, Debug)]
pub struct ShareTarget {
    pub id: u64,
    pub device_name: String,
    pub device_type: DeviceType,
    pub vendor_id: VendorId,
    /// True once this session has been attributed to an incoming
    /// connection (we are the receiver).
    pub is_incoming: bool,
    /// True when the peer is another device signed in to the same
    /// account (spec.md glossary "Self-share").
    pub for_self_share: bool,
    /// Populated once the peer's public certificate has been
    /// decrypted (spec.md §4.I).
    pub full_name: Option<String>,
    pub image_url: Option<String>,
    /// The peer's public key (SEC1), carried by its decrypted public
    /// certificate, used to verify its `PairedKeyEncryptionFrame` signature
    /// (spec.md §4.E step 1). `None` until a certificate resolves.
    pub peer_public_key_sec1: Option<Vec<u8>>,
    pub attachments: Vec<Attachment>,
    /// Maps a locally-generated attachment id to the payload id the
    /// underlying connection manager uses for it (spec.md §3).
    pub attachment_payload_map: HashMap<u64, u64>,
}

impl ShareTarget {
    #[must_use]
    pub fn new(id: u64, device_name: String, device_type: DeviceType, is_incoming: bool) -> Self {
        Self {
            id,
            device_name,
            device_type,
            vendor_id: VendorId::None,
            is_incoming,
            for_self_share: false,
            full_name: None,
            image_url: None,
            peer_public_key_sec1: None,
            attachments: Vec::new(),
            attachment_payload_map: HashMap::new(),
        }
    }

    /// Sum of every attachment's declared size, used against the
    /// not-enough-space and bandwidth-upgrade thresholds.
    #[must_use]
    pub fn total_attachments_size(&self) -> u64 {
        self.attachments.iter().map(Attachment::size).sum()
    }
}

/// Semantic type of a file attachment (spec.md §3).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum FileSemanticType {
    #[default]
    Unknown = 0,
    Image = 1,
    Video = 2,
    Audio = 3,
    App = 4,
    Doc = 5,
}

/// Semantic type of a text attachment (spec.md §3).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum TextSemanticType {
    #[default]
    Text = 0,
    Url = 1,
    Phone = 2,
    Address = 3,
}

#[derive(Clone, Debug)]
pub struct FileAttachment {
    pub id: u64,
    pub size: u64,
    pub file_name: String,
    pub mime_type: String,
    pub semantic_type: FileSemanticType,
    pub parent_folder: String,
    pub local_path: Option<String>,
}

#[derive(Clone, Debug)]
pub struct TextAttachment {
    pub id: u64,
    pub semantic_type: TextSemanticType,
    pub title: String,
    pub size: u64,
    pub body: String,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum WifiSecurityType {
    #[default]
    Unknown = 0,
    Open = 1,
    Wpa = 2,
    Wep = 3,
}

#[derive(Clone, Debug)]
pub struct WifiCredentialsAttachment {
    pub id: u64,
    pub ssid: String,
    pub security_type: WifiSecurityType,
    pub password: String,
    pub is_hidden: bool,
}

/// The three kinds of thing a session can transfer (spec.md §3).
#[derive(Clone, Debug)]
pub enum Attachment {
    File(FileAttachment),
    Text(TextAttachment),
    WifiCredentials(WifiCredentialsAttachment),
}

impl Attachment {
    #[must_use]
    pub const fn id(&self) -> u64 {
        match self {
            Self::File(f) => f.id,
            Self::Text(t) => t.id,
            Self::WifiCredentials(w) => w.id,
        }
    }

    #[must_use]
    pub const fn size(&self) -> u64 {
        match self {
            Self::File(f) => f.size,
            Self::Text(t) => t.size,
            // Wi-Fi credential payloads are small and fixed; they do not
            // participate in the file-size-sum overflow check.
            Self::WifiCredentials(_) => 0,
        }
    }
}

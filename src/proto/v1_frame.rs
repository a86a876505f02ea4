//! `V1Frame` (spec.md §6): the session-layer envelope carried as the
//! payload of a multiplex `DATA_FRAME`. One of seven frame types;
//! this crate implements the five the core state machine actually
//! drives (`Introduction`, `ConnectionResponse`, `PairedKeyEncryption`,
//! `PairedKeyResult`, `ProgressUpdate`) plus `Cancel`, a marker frame
//! with no body.

use super::{iter_fields, put_field};
use bytes::{Buf, BufMut, BytesMut};

const TAG_KIND: u8 = 1;
const TAG_BODY: u8 = 2;

#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum FrameKind {
    Introduction = 1,
    Response = 2,
    Cancel = 3,
    PairedKeyEncryption = 4,
    PairedKeyResult = 5,
    CertificateInfo = 6,
    ProgressUpdate = 7,
}

/// `ConnectionResponseFrame.status` (spec.md §6).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum ConnectionResponseStatus {
    #[default]
    Unknown = 0,
    Accept = 1,
    Reject = 2,
    NotEnoughSpace = 3,
    UnsupportedAttachmentType = 4,
    TimedOut = 5,
}

/// One file/text/wifi-credentials metadata entry inside an
/// `IntroductionFrame` (spec.md §4.H receiver-side `ReceiveIntroduction`).
#[derive(Clone, Debug)]
pub enum AttachmentMetadata {
    File {
        id: u64,
        payload_id: u64,
        size: i64,
        name: String,
        mime_type: String,
    },
    Text {
        id: u64,
        payload_id: u64,
        size: i64,
        title: String,
    },
    WifiCredentials {
        id: u64,
        payload_id: u64,
        ssid: String,
    },
}

impl AttachmentMetadata {
    #[must_use]
    pub const fn size(&self) -> i64 {
        match self {
            Self::File { size, .. } | Self::Text { size, .. } => *size,
            Self::WifiCredentials { .. } => 0,
        }
    }
}

/// `PairedKeyResultFrame.os_type` — just enough of the real enum for
/// telemetry purposes (spec.md §4.E "report remote OS type").
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum OsType {
    #[default]
    Unknown = 0,
    Android = 1,
    Windows = 2,
    Linux = 3,
    Ios = 4,
    ChromeOs = 5,
}

/// `PairedKeyResultFrame.status` (spec.md §4.E).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum PairedKeyResultStatus {
    #[default]
    Unknown = 0,
    Success = 1,
    Fail = 2,
    Unable = 3,
}

#[derive(Clone, Debug)]
pub enum V1Frame {
    Introduction {
        attachments: Vec<AttachmentMetadata>,
        start_transfer: bool,
    },
    Response {
        status: ConnectionResponseStatus,
    },
    Cancel,
    PairedKeyEncryption {
        secret_id_hash: Vec<u8>,
        signed_data: Vec<u8>,
        optional_signed_data: Option<Vec<u8>>,
    },
    PairedKeyResult {
        status: PairedKeyResultStatus,
        os_type: OsType,
    },
    ProgressUpdate {
        start_transfer: bool,
        progress: Option<f32>,
    },
}

impl V1Frame {
    #[must_use]
    pub const fn kind(&self) -> FrameKind {
        match self {
            Self::Introduction { .. } => FrameKind::Introduction,
            Self::Response { .. } => FrameKind::Response,
            Self::Cancel => FrameKind::Cancel,
            Self::PairedKeyEncryption { .. } => FrameKind::PairedKeyEncryption,
            Self::PairedKeyResult { .. } => FrameKind::PairedKeyResult,
            Self::ProgressUpdate { .. } => FrameKind::ProgressUpdate,
        }
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = BytesMut::new();
        put_field(&mut out, TAG_KIND, &[self.kind().into()]);
        let mut body = BytesMut::new();
        match self {
            Self::Introduction { attachments, start_transfer } => {
                body.put_u8(u8::from(*start_transfer));
                body.put_u32(attachments.len() as u32);
                for att in attachments {
                    encode_attachment(&mut body, att);
                }
            }
            Self::Response { status } => body.put_u8((*status).into()),
            Self::Cancel => {}
            Self::PairedKeyEncryption {
                secret_id_hash,
                signed_data,
                optional_signed_data,
            } => {
                body.put_u16(secret_id_hash.len() as u16);
                body.put_slice(secret_id_hash);
                body.put_u16(signed_data.len() as u16);
                body.put_slice(signed_data);
                match optional_signed_data {
                    Some(extra) => {
                        body.put_u8(1);
                        body.put_u16(extra.len() as u16);
                        body.put_slice(extra);
                    }
                    None => body.put_u8(0),
                }
            }
            Self::PairedKeyResult { status, os_type } => {
                body.put_u8((*status).into());
                body.put_u8((*os_type).into());
            }
            Self::ProgressUpdate { start_transfer, progress } => {
                body.put_u8(u8::from(*start_transfer));
                match progress {
                    Some(p) => {
                        body.put_u8(1);
                        body.put_f32(*p);
                    }
                    None => body.put_u8(0),
                }
            }
        }
        put_field(&mut out, TAG_BODY, &body);
        out.to_vec()
    }

    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let fields = iter_fields(bytes);
        let mut kind = None;
        let mut body = None;
        for (tag, value) in fields {
            match tag {
                TAG_KIND if value.len() == 1 => kind = FrameKind::try_from(value[0]).ok(),
                TAG_BODY => body = Some(value),
                _ => {}
            }
        }
        let kind = kind?;
        let mut body: &[u8] = body.as_deref().unwrap_or(&[]);

        Some(match kind {
            FrameKind::Introduction => {
                if body.len() < 5 {
                    return None;
                }
                let start_transfer = body.get_u8() == 1;
                let count = body.get_u32() as usize;
                let mut attachments = Vec::with_capacity(count);
                for _ in 0..count {
                    attachments.push(decode_attachment(&mut body)?);
                }
                Self::Introduction { attachments, start_transfer }
            }
            FrameKind::Response => {
                let status = ConnectionResponseStatus::try_from(*body.first()?).ok()?;
                Self::Response { status }
            }
            FrameKind::Cancel => Self::Cancel,
            FrameKind::PairedKeyEncryption => {
                if body.len() < 2 {
                    return None;
                }
                let hash_len = body.get_u16() as usize;
                if body.len() < hash_len {
                    return None;
                }
                let secret_id_hash = body[..hash_len].to_vec();
                body.advance(hash_len);
                if body.len() < 2 {
                    return None;
                }
                let signed_len = body.get_u16() as usize;
                if body.len() < signed_len {
                    return None;
                }
                let signed_data = body[..signed_len].to_vec();
                body.advance(signed_len);
                let has_optional = body.get_u8() == 1;
                let optional_signed_data = if has_optional {
                    let len = body.get_u16() as usize;
                    if body.len() < len {
                        return None;
                    }
                    let extra = body[..len].to_vec();
                    body.advance(len);
                    Some(extra)
                } else {
                    None
                };
                Self::PairedKeyEncryption {
                    secret_id_hash,
                    signed_data,
                    optional_signed_data,
                }
            }
            FrameKind::PairedKeyResult => {
                if body.len() < 2 {
                    return None;
                }
                let status = PairedKeyResultStatus::try_from(body.get_u8()).ok()?;
                let os_type = OsType::try_from(body.get_u8()).ok()?;
                Self::PairedKeyResult { status, os_type }
            }
            FrameKind::ProgressUpdate => {
                if body.is_empty() {
                    return None;
                }
                let start_transfer = body.get_u8() == 1;
                let progress = if body.get_u8() == 1 { Some(body.get_f32()) } else { None };
                Self::ProgressUpdate { start_transfer, progress }
            }
            FrameKind::CertificateInfo => return None,
        })
    }
}

const ATTACHMENT_FILE: u8 = 1;
const ATTACHMENT_TEXT: u8 = 2;
const ATTACHMENT_WIFI: u8 = 3;

fn encode_attachment(out: &mut BytesMut, att: &AttachmentMetadata) {
    match att {
        AttachmentMetadata::File {
            id,
            payload_id,
            size,
            name,
            mime_type,
        } => {
            out.put_u8(ATTACHMENT_FILE);
            out.put_u64(*id);
            out.put_u64(*payload_id);
            out.put_i64(*size);
            out.put_u16(name.len() as u16);
            out.put_slice(name.as_bytes());
            out.put_u16(mime_type.len() as u16);
            out.put_slice(mime_type.as_bytes());
        }
        AttachmentMetadata::Text { id, payload_id, size, title } => {
            out.put_u8(ATTACHMENT_TEXT);
            out.put_u64(*id);
            out.put_u64(*payload_id);
            out.put_i64(*size);
            out.put_u16(title.len() as u16);
            out.put_slice(title.as_bytes());
        }
        AttachmentMetadata::WifiCredentials { id, payload_id, ssid } => {
            out.put_u8(ATTACHMENT_WIFI);
            out.put_u64(*id);
            out.put_u64(*payload_id);
            out.put_u16(ssid.len() as u16);
            out.put_slice(ssid.as_bytes());
        }
    }
}

fn decode_attachment(body: &mut &[u8]) -> Option<AttachmentMetadata> {
    if body.is_empty() {
        return None;
    }
    let tag = body.get_u8();
    match tag {
        ATTACHMENT_FILE => {
            if body.len() < 18 {
                return None;
            }
            let id = body.get_u64();
            let payload_id = body.get_u64();
            let size = body.get_i64();
            let name_len = body.get_u16() as usize;
            if body.len() < name_len {
                return None;
            }
            let name = String::from_utf8(body[..name_len].to_vec()).ok()?;
            body.advance(name_len);
            let mime_len = body.get_u16() as usize;
            if body.len() < mime_len {
                return None;
            }
            let mime_type = String::from_utf8(body[..mime_len].to_vec()).ok()?;
            body.advance(mime_len);
            Some(AttachmentMetadata::File {
                id,
                payload_id,
                size,
                name,
                mime_type,
            })
        }
        ATTACHMENT_TEXT => {
            if body.len() < 18 {
                return None;
            }
            let id = body.get_u64();
            let payload_id = body.get_u64();
            let size = body.get_i64();
            let title_len = body.get_u16() as usize;
            if body.len() < title_len {
                return None;
            }
            let title = String::from_utf8(body[..title_len].to_vec()).ok()?;
            body.advance(title_len);
            Some(AttachmentMetadata::Text { id, payload_id, size, title })
        }
        ATTACHMENT_WIFI => {
            if body.len() < 16 {
                return None;
            }
            let id = body.get_u64();
            let payload_id = body.get_u64();
            let ssid_len = body.get_u16() as usize;
            if body.len() < ssid_len {
                return None;
            }
            let ssid = String::from_utf8(body[..ssid_len].to_vec()).ok()?;
            body.advance(ssid_len);
            Some(AttachmentMetadata::WifiCredentials { id, payload_id, ssid })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn introduction_roundtrips_with_mixed_attachments() {
        let frame = V1Frame::Introduction {
            attachments: vec![
                AttachmentMetadata::File {
                    id: 1,
                    payload_id: 100,
                    size: 4096,
                    name: "photo.jpg".to_string(),
                    mime_type: "image/jpeg".to_string(),
                },
                AttachmentMetadata::Text {
                    id: 2,
                    payload_id: 101,
                    size: 12,
                    title: "note".to_string(),
                },
            ],
            start_transfer: true,
        };
        let decoded = V1Frame::decode(&frame.encode()).unwrap();
        match decoded {
            V1Frame::Introduction { attachments, start_transfer } => {
                assert!(start_transfer);
                assert_eq!(attachments.len(), 2);
            }
            _ => panic!("expected introduction frame"),
        }
    }

    #[test]
    fn paired_key_encryption_roundtrips_without_optional_signature() {
        let frame = V1Frame::PairedKeyEncryption {
            secret_id_hash: vec![1, 2, 3, 4, 5, 6],
            signed_data: vec![9; 70],
            optional_signed_data: None,
        };
        let decoded = V1Frame::decode(&frame.encode()).unwrap();
        match decoded {
            V1Frame::PairedKeyEncryption {
                secret_id_hash,
                signed_data,
                optional_signed_data,
            } => {
                assert_eq!(secret_id_hash, vec![1, 2, 3, 4, 5, 6]);
                assert_eq!(signed_data.len(), 70);
                assert!(optional_signed_data.is_none());
            }
            _ => panic!("expected paired key encryption frame"),
        }
    }

    #[test]
    fn cancel_frame_has_empty_body() {
        let decoded = V1Frame::decode(&V1Frame::Cancel.encode()).unwrap();
        assert!(matches!(decoded, V1Frame::Cancel));
    }

    mod proptests {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #[test]
            fn paired_key_encryption_roundtrips_for_any_byte_strings(
                secret_id_hash in prop::collection::vec(any::<u8>(), 0..32),
                signed_data in prop::collection::vec(any::<u8>(), 0..256),
                optional_signed_data in proptest::option::of(prop::collection::vec(any::<u8>(), 0..256)),
            ) {
                let frame = V1Frame::PairedKeyEncryption {
                    secret_id_hash: secret_id_hash.clone(),
                    signed_data: signed_data.clone(),
                    optional_signed_data: optional_signed_data.clone(),
                };
                let decoded = V1Frame::decode(&frame.encode()).unwrap();
                match decoded {
                    V1Frame::PairedKeyEncryption { secret_id_hash: h, signed_data: s, optional_signed_data: o } => {
                        prop_assert_eq!(h, secret_id_hash);
                        prop_assert_eq!(s, signed_data);
                        prop_assert_eq!(o, optional_signed_data);
                    }
                    _ => prop_assert!(false, "expected paired key encryption frame"),
                }
            }

            #[test]
            fn progress_update_roundtrips_for_any_progress_value(
                start_transfer in any::<bool>(),
                progress in proptest::option::of(any::<f32>()),
            ) {
                let frame = V1Frame::ProgressUpdate { start_transfer, progress };
                let decoded = V1Frame::decode(&frame.encode()).unwrap();
                match decoded {
                    V1Frame::ProgressUpdate { start_transfer: s, progress: p } => {
                        prop_assert_eq!(s, start_transfer);
                        match (p, progress) {
                            (Some(a), Some(b)) => prop_assert!(a == b || (a.is_nan() && b.is_nan())),
                            (None, None) => {}
                            _ => prop_assert!(false, "progress presence mismatch"),
                        }
                    }
                    _ => prop_assert!(false, "expected progress update frame"),
                }
            }
        }
    }
}

//! `MultiplexFrame` (spec.md §3): the envelope carried on the physical
//! socket, distinguishing control traffic (open/close a virtual socket)
//! from data traffic (payload bytes for an already-open one).

use super::{iter_fields, put_field};
use bytes::BytesMut;

const TAG_SALTED_HASH: u8 = 1;
const TAG_SALT: u8 = 2;
const TAG_CONTROL_TYPE: u8 = 3;
const TAG_CONNECTION_RESPONSE_STATUS: u8 = 4;
const TAG_DATA: u8 = 5;

pub const SALTED_HASH_LENGTH: usize = 4;

/// `CONTROL_FRAME` vs `DATA_FRAME` (spec.md §3).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum FrameType {
    Control = 1,
    Data = 2,
}

/// Control sub-type (spec.md §3).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum ControlFrameType {
    ConnectionRequest = 1,
    ConnectionResponse = 2,
    Disconnection = 3,
}

/// `ConnectionResponse.status` (spec.md §3).
#[derive(Clone, Copy, Debug, Eq, PartialEq, num_enum::IntoPrimitive, num_enum::TryFromPrimitive)]
#[repr(u8)]
pub enum ConnectionResponseStatus {
    ConnectionAccepted = 1,
    NotListening = 2,
}

/// The body carried by a control frame, one variant per
/// [`ControlFrameType`].
#[derive(Clone, Debug)]
pub enum ControlBody {
    ConnectionRequest,
    ConnectionResponse { status: ConnectionResponseStatus },
    Disconnection,
}

/// The envelope spec.md §3 calls "MultiplexFrame". `header.salt` is only
/// ever present on an outgoing `CONNECTION_REQUEST` — once the peer has
/// echoed a salted hash, subsequent frames key off the hash alone.
#[derive(Clone, Debug)]
pub struct MultiplexFrame {
    pub salted_service_id_hash: [u8; SALTED_HASH_LENGTH],
    pub salt: Option<String>,
    pub body: Body,
}

#[derive(Clone, Debug)]
pub enum Body {
    Control(ControlBody),
    Data(Vec<u8>),
}

impl MultiplexFrame {
    #[must_use]
    pub fn connection_request(salted_hash: [u8; SALTED_HASH_LENGTH], salt: String) -> Self {
        Self {
            salted_service_id_hash: salted_hash,
            salt: Some(salt),
            body: Body::Control(ControlBody::ConnectionRequest),
        }
    }

    #[must_use]
    pub fn connection_response(salted_hash: [u8; SALTED_HASH_LENGTH], status: ConnectionResponseStatus) -> Self {
        Self {
            salted_service_id_hash: salted_hash,
            salt: None,
            body: Body::Control(ControlBody::ConnectionResponse { status }),
        }
    }

    #[must_use]
    pub fn disconnection(salted_hash: [u8; SALTED_HASH_LENGTH]) -> Self {
        Self {
            salted_service_id_hash: salted_hash,
            salt: None,
            body: Body::Control(ControlBody::Disconnection),
        }
    }

    #[must_use]
    pub fn data(salted_hash: [u8; SALTED_HASH_LENGTH], data: Vec<u8>) -> Self {
        Self {
            salted_service_id_hash: salted_hash,
            salt: None,
            body: Body::Data(data),
        }
    }

    #[must_use]
    pub const fn frame_type(&self) -> FrameType {
        match self.body {
            Body::Control(_) => FrameType::Control,
            Body::Data(_) => FrameType::Data,
        }
    }

    /// Validity per spec.md §8 "MultiplexFrame validity": a control
    /// frame must carry a recognized sub-type and the 4-byte hash (always
    /// true here since the hash is a fixed-size array); a data frame
    /// must carry non-empty `data`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        match &self.body {
            Body::Control(_) => true,
            Body::Data(data) => !data.is_empty(),
        }
    }

    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut out = BytesMut::new();
        put_field(&mut out, TAG_SALTED_HASH, &self.salted_service_id_hash);
        if let Some(salt) = &self.salt {
            put_field(&mut out, TAG_SALT, salt.as_bytes());
        }
        match &self.body {
            Body::Control(control) => {
                let (ty, status) = match control {
                    ControlBody::ConnectionRequest => (ControlFrameType::ConnectionRequest, None),
                    ControlBody::ConnectionResponse { status } => (ControlFrameType::ConnectionResponse, Some(*status)),
                    ControlBody::Disconnection => (ControlFrameType::Disconnection, None),
                };
                put_field(&mut out, TAG_CONTROL_TYPE, &[ty.into()]);
                if let Some(status) = status {
                    put_field(&mut out, TAG_CONNECTION_RESPONSE_STATUS, &[status.into()]);
                }
            }
            Body::Data(data) => put_field(&mut out, TAG_DATA, data),
        }
        out.to_vec()
    }

    /// Parses a raw frame body (the bytes following the physical
    /// `u32_be` length prefix). `None` on malformed input — the caller
    /// treats that the same way spec.md §4.C.1/§7 describes ("forward to
    /// the sole virtual socket, or drop with a log").
    #[must_use]
    pub fn decode(bytes: &[u8]) -> Option<Self> {
        let fields = iter_fields(bytes);
        let mut salted_hash = None;
        let mut salt = None;
        let mut control_type = None;
        let mut status = None;
        let mut data = None;

        for (tag, value) in fields {
            match tag {
                TAG_SALTED_HASH if value.len() == SALTED_HASH_LENGTH => {
                    let mut h = [0u8; SALTED_HASH_LENGTH];
                    h.copy_from_slice(&value);
                    salted_hash = Some(h);
                }
                TAG_SALT => salt = String::from_utf8(value).ok(),
                TAG_CONTROL_TYPE if value.len() == 1 => control_type = ControlFrameType::try_from(value[0]).ok(),
                TAG_CONNECTION_RESPONSE_STATUS if value.len() == 1 => {
                    status = ConnectionResponseStatus::try_from(value[0]).ok();
                }
                TAG_DATA => data = Some(value),
                _ => {}
            }
        }

        let salted_service_id_hash = salted_hash?;
        let body = if let Some(ty) = control_type {
            let control = match ty {
                ControlFrameType::ConnectionRequest => ControlBody::ConnectionRequest,
                ControlFrameType::ConnectionResponse => ControlBody::ConnectionResponse { status: status? },
                ControlFrameType::Disconnection => ControlBody::Disconnection,
            };
            Body::Control(control)
        } else {
            Body::Data(data?)
        };

        let frame = Self {
            salted_service_id_hash,
            salt,
            body,
        };
        frame.is_valid().then_some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};

    fn hash(service_id: &str, salt: &str) -> [u8; SALTED_HASH_LENGTH] {
        let digest = Sha256::digest(format!("{service_id}{salt}").as_bytes());
        let mut out = [0u8; SALTED_HASH_LENGTH];
        out.copy_from_slice(&digest[..SALTED_HASH_LENGTH]);
        out
    }

    #[test]
    fn connection_request_roundtrips_with_expected_hash() {
        let expected = hash("serviceId_1", "1234");
        let frame = MultiplexFrame::connection_request(expected, "1234".to_string());
        let decoded = MultiplexFrame::decode(&frame.encode()).unwrap();
        assert_eq!(decoded.frame_type(), FrameType::Control);
        assert_eq!(decoded.salted_service_id_hash, expected);
        assert!(matches!(decoded.body, Body::Control(ControlBody::ConnectionRequest)));
    }

    #[test]
    fn data_frame_without_bytes_is_invalid() {
        let frame = MultiplexFrame {
            salted_service_id_hash: [0; SALTED_HASH_LENGTH],
            salt: None,
            body: Body::Data(Vec::new()),
        };
        assert!(!frame.is_valid());
        assert!(MultiplexFrame::decode(&frame.encode()).is_none());
    }

    #[test]
    fn data_frame_preserves_bytes_verbatim() {
        let frame = MultiplexFrame::data(hash("service_1", "DNFG"), b"abcdefg".to_vec());
        let decoded = MultiplexFrame::decode(&frame.encode()).unwrap();
        match decoded.body {
            Body::Data(bytes) => assert_eq!(bytes, b"abcdefg"),
            Body::Control(_) => panic!("expected data frame"),
        }
    }
}

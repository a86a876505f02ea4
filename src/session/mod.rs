//! ShareSession state machine (spec.md §4.H): the per-transfer driver
//! that takes a connection through key exchange, paired-key
//! verification, introduction/acceptance, and payload transfer, ending
//! in exactly one final [`TransferMetadata`] status. Grounded on the
//! "tagged state variant, pure transition function" shape spec.md §9
//! asks for in place of a callback-graph/condition-variable state
//! machine: [`SessionState`] is the tag, and [`IncomingShareSession`]/
//! [`OutgoingShareSession`] drive the transitions as a straight-line
//! async function rather than as an explicit dispatch table, since
//! every transition here only ever has one successor once its guard is
//! evaluated.

pub mod incoming;
pub mod outgoing;

pub use incoming::IncomingShareSession;
pub use outgoing::OutgoingShareSession;

use std::collections::HashMap;

use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::sync::mpsc;

use crate::collaborators::PayloadStatusListener;
use crate::config::Config;
use crate::multiplex::{self, MultiplexSocket};
use crate::payload_tracker::PayloadTransferUpdate;
use crate::proto::v1_frame::AttachmentMetadata;
use crate::transfer_metadata::Status;

/// Service id the sharing session's virtual socket is established under
/// (spec.md §2 "C → D": the handshake/verification/session layers run
/// over this multiplexed channel, never the raw physical connection).
pub const SHARING_SERVICE_ID: &str = "NearbySharing";

/// Spawns a [`MultiplexSocket`] over `connection` and opens the sharing
/// service's virtual socket as the initiator (spec.md §4.C.3 "Outgoing
/// establishment"), returning a stream [`OutgoingShareSession::run`] can
/// drive the handshake over. `None` on `NOT_LISTENING`, timeout, or
/// disconnect.
pub async fn open_outgoing_stream<C>(connection: C, config: Config) -> Option<DuplexStream>
where
    C: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let multiplex = MultiplexSocket::spawn(connection, config);
    let handle = multiplex.establish_virtual_socket(SHARING_SERVICE_ID).await?;
    Some(multiplex::into_stream(handle))
}

/// Spawns a [`MultiplexSocket`] over `connection`, registers the sharing
/// service's incoming-connection callback, and returns a stream for the
/// first virtual socket the peer opens (spec.md §4.C.3 "Incoming
/// establishment"). `None` if the socket shuts down before the peer
/// ever connects.
pub async fn accept_incoming_stream<C>(connection: C, config: Config) -> Option<DuplexStream>
where
    C: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    let multiplex = MultiplexSocket::spawn(connection, config);
    let (tx, mut rx) = mpsc::channel(1);
    multiplex.register_incoming_connection_callback(SHARING_SERVICE_ID, tx);
    let handle = rx.recv().await?;
    Some(multiplex::into_stream(handle))
}

/// Forwards a connection manager's synchronous [`PayloadStatusListener`]
/// callback onto an async channel a session driver can await (spec.md
/// §4.H "Sender SendPayloads" / "Receiver FinalizePayloads").
pub(crate) struct ChannelListener {
    pub tx: mpsc::UnboundedSender<PayloadTransferUpdate>,
}

impl PayloadStatusListener for ChannelListener {
    fn on_update(&self, update: PayloadTransferUpdate) {
        let _ = self.tx.send(update);
    }
}

/// Lifecycle states named in spec.md §4.H. Sender and receiver share the
/// same tag set; only `AwaitingLocalConfirmation` (receiver) and
/// `AwaitingRemoteAcceptance` (sender) are role-specific.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SessionState {
    Idle,
    Connecting,
    KeyExchange,
    Verifying,
    AwaitingIntroduction,
    AwaitingLocalConfirmation,
    AwaitingRemoteAcceptance,
    InProgress,
    Terminal(Status),
}

impl SessionState {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }
}

/// What to report if the peer disconnects unexpectedly — `None` is
/// `kUnknown`; `Connect` sets this to `Failed` and every later
/// transition overwrites it with the status that transition reached
/// (spec.md §4.H "Connect" / "Disconnect").
pub type DisconnectStatus = Option<Status>;

/// Result of validating one `IntroductionFrame` (spec.md §4.H
/// "Receiver ReceiveIntroduction").
pub(crate) struct IntroductionResult {
    /// Locally-generated attachment id → the payload id the peer will
    /// use for it.
    pub attachment_payload_map: HashMap<u64, u64>,
    /// Payload id → (attachment id, declared size), the shape
    /// [`crate::payload_tracker::PayloadTracker::new`] wants.
    pub attachment_sizes: HashMap<u64, (u64, u64)>,
    pub total_size: u64,
    pub request_bandwidth_upgrade: bool,
}

/// Validates an `IntroductionFrame`'s attachments (spec.md §4.H):
/// file/text attachments must declare a positive size; wifi-credentials
/// attachments carry no meaningful size and are exempt. Overflowing the
/// accumulated size maps to `NotEnoughSpace` rather than panicking.
pub(crate) fn process_introduction(
    attachments: &[AttachmentMetadata],
    start_transfer: bool,
    bandwidth_upgrade_threshold: u64,
) -> std::result::Result<IntroductionResult, Status> {
    let mut attachment_payload_map = HashMap::with_capacity(attachments.len());
    let mut attachment_sizes = HashMap::with_capacity(attachments.len());
    let mut total_size: u64 = 0;

    for attachment in attachments {
        let (id, payload_id) = match attachment {
            AttachmentMetadata::File { id, payload_id, .. }
            | AttachmentMetadata::Text { id, payload_id, .. }
            | AttachmentMetadata::WifiCredentials { id, payload_id, .. } => (*id, *payload_id),
        };

        let size = match attachment {
            AttachmentMetadata::WifiCredentials { .. } => 0,
            _ => {
                if attachment.size() <= 0 {
                    return Err(Status::UnsupportedAttachmentType);
                }
                attachment.size() as u64
            }
        };

        attachment_payload_map.insert(id, payload_id);
        attachment_sizes.insert(payload_id, (id, size));
        total_size = total_size.checked_add(size).ok_or(Status::NotEnoughSpace)?;
    }

    Ok(IntroductionResult {
        attachment_payload_map,
        attachment_sizes,
        total_size,
        request_bandwidth_upgrade: start_transfer && total_size >= bandwidth_upgrade_threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_size_file_attachment_is_unsupported() {
        let attachments = vec![AttachmentMetadata::File {
            id: 1,
            payload_id: 10,
            size: 0,
            name: "a".into(),
            mime_type: "text/plain".into(),
        }];
        assert_eq!(process_introduction(&attachments, false, 1024).unwrap_err(), Status::UnsupportedAttachmentType);
    }

    #[test]
    fn wifi_credentials_attachment_needs_no_size() {
        let attachments = vec![AttachmentMetadata::WifiCredentials { id: 1, payload_id: 10, ssid: "net".into() }];
        let result = process_introduction(&attachments, false, 1024).unwrap();
        assert_eq!(result.total_size, 0);
        assert_eq!(result.attachment_payload_map.get(&1), Some(&10));
    }

    #[test]
    fn large_total_size_requests_bandwidth_upgrade_when_start_transfer_set() {
        let attachments = vec![AttachmentMetadata::File {
            id: 1,
            payload_id: 10,
            size: 8 * 1024 * 1024,
            name: "movie.mp4".into(),
            mime_type: "video/mp4".into(),
        }];
        let result = process_introduction(&attachments, true, 4 * 1024 * 1024).unwrap();
        assert!(result.request_bandwidth_upgrade);
    }
}

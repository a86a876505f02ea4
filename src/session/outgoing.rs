//! Sender-side driver (spec.md §4.H "Sender SendIntroduction", "Sender on
//! CONNECTION_RESPONSE", "Sender SendPayloads").

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use nearshare_crypto::HandshakeRole;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{ChannelListener, SessionState};
use crate::collaborators::{CertificateManager, ConnectionManager, PayloadStatusListener};
use crate::config::Config;
use crate::frames_reader::IncomingFramesReader;
use crate::handshake;
use crate::payload_tracker::{PayloadTracker, PayloadTransferUpdate};
use crate::proto::v1_frame::{AttachmentMetadata, ConnectionResponseStatus, FrameKind, V1Frame};
use crate::share_target::{Attachment, ShareTarget};
use crate::transfer_metadata::{FinalStatusLock, Status, TransferMetadata, TransferMetadataBuilder};
use crate::verification::{self, VerificationInputs};
use crate::visibility::VisibilityHistory;
use crate::wire::framing;
use crate::{Error, Result};

/// Drives one outbound transfer over `connection` to a single final
/// [`TransferMetadata`], calling `on_update` for every intermediate
/// snapshot the final-status lock admits.
pub struct OutgoingShareSession<CM, CertM> {
    config: Config,
    connection_manager: Arc<CM>,
    certificate_manager: Arc<CertM>,
    state: SessionState,
    final_status_lock: FinalStatusLock,
}

impl<CM: ConnectionManager, CertM: CertificateManager> OutgoingShareSession<CM, CertM> {
    #[must_use]
    pub fn new(config: Config, connection_manager: Arc<CM>, certificate_manager: Arc<CertM>) -> Self {
        Self {
            config,
            connection_manager,
            certificate_manager,
            state: SessionState::Idle,
            final_status_lock: FinalStatusLock::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Runs the full sender flow (spec.md §4.H).
    pub async fn run<C, F>(
        &mut self,
        connection: C,
        endpoint_id: &str,
        share_target: ShareTarget,
        visibility: VisibilityHistory,
        start_transfer: bool,
        mut on_update: F,
    ) -> Result<TransferMetadata>
    where
        C: AsyncRead + AsyncWrite + Send + Unpin + 'static,
        F: FnMut(TransferMetadata),
    {
        self.transition(SessionState::Connecting);
        self.emit(Status::Connecting, share_target.for_self_share, &mut on_update);

        self.transition(SessionState::KeyExchange);
        let mut connection = connection;
        let handshake_outcome = match handshake::run(&mut connection, HandshakeRole::Initiator, &self.config).await {
            Ok(outcome) => outcome,
            Err(err) => return Ok(self.finalize(Status::Failed, &share_target, &mut on_update, err)),
        };

        let (read_half, mut write_half) = tokio::io::split(connection);
        let reader = IncomingFramesReader::new(read_half);

        self.transition(SessionState::Verifying);
        let verification = verification::run_over_connection(
            &mut write_half,
            &reader,
            self.config.read_frames_timeout,
            VerificationInputs {
                secret_id_hash: handshake_outcome.raw_token[..6.min(handshake_outcome.raw_token.len())].to_vec(),
                signed_data: self.certificate_manager.sign_with_private_key(visibility.current, &handshake_outcome.raw_token),
                optional_signed_data: None,
                raw_token: handshake_outcome.raw_token.clone(),
                peer_public_key_sec1: share_target.peer_public_key_sec1.clone(),
            },
            visibility,
        )
        .await;

        let verification = match verification {
            Ok(v) => v,
            Err(err) => return Ok(self.finalize(Status::DeviceAuthenticationFailed, &share_target, &mut on_update, err)),
        };

        if verification.outcome == crate::verification::VerificationOutcome::Fail {
            warn!("paired key verification failed, closing connection");
            return Ok(self.finalize_without_error(Status::DeviceAuthenticationFailed, &share_target, &mut on_update));
        }

        let attachments = introduction_metadata(&share_target);
        if attachments.is_empty() {
            warn!("no attachment carries a payload id, aborting send");
            return Ok(self.finalize_without_error(Status::Failed, &share_target, &mut on_update));
        }

        self.transition(SessionState::AwaitingRemoteAcceptance);
        framing::write_framed(&mut write_half, &V1Frame::Introduction { attachments, start_transfer }.encode()).await?;

        let response = match reader.read_frame_of_type(FrameKind::Response, self.config.read_response_frame_timeout).await {
            Ok(Some(V1Frame::Response { status })) => status,
            Ok(Some(_)) | Ok(None) => return Ok(self.finalize_without_error(Status::TimedOut, &share_target, &mut on_update)),
            Err(err) => return Ok(self.finalize(Status::Failed, &share_target, &mut on_update, err)),
        };

        let rejection = match response {
            ConnectionResponseStatus::Accept => None,
            ConnectionResponseStatus::Reject => Some(Status::Rejected),
            ConnectionResponseStatus::NotEnoughSpace => Some(Status::NotEnoughSpace),
            ConnectionResponseStatus::UnsupportedAttachmentType => Some(Status::UnsupportedAttachmentType),
            ConnectionResponseStatus::TimedOut | ConnectionResponseStatus::Unknown => Some(Status::TimedOut),
        };
        if let Some(status) = rejection {
            return Ok(self.finalize_without_error(status, &share_target, &mut on_update));
        }

        self.transition(SessionState::InProgress);
        self.emit(Status::InProgress, share_target.for_self_share, &mut on_update);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = Arc::new(ChannelListener { tx }) as Arc<dyn PayloadStatusListener>;
        let attachment_sizes: HashMap<u64, (u64, u64)> = share_target
            .attachment_payload_map
            .iter()
            .filter_map(|(&attachment_id, &payload_id)| {
                share_target
                    .attachments
                    .iter()
                    .find(|a| a.id() == attachment_id)
                    .map(|a| (payload_id, (attachment_id, a.size())))
            })
            .collect();
        for &payload_id in share_target.attachment_payload_map.values() {
            self.connection_manager.register_payload_status_listener(payload_id, Arc::clone(&listener));
        }

        let mut tracker = PayloadTracker::new(&self.config, share_target.for_self_share, &attachment_sizes);
        let final_status = loop {
            let Some(update) = rx.recv().await else {
                warn!(endpoint_id, "connection manager dropped payload updates before completion");
                break Status::Failed;
            };
            if let Some(metadata) = tracker.on_update(update, Instant::now()) {
                let status = metadata.status;
                self.emit_metadata(metadata, &mut on_update);
                if status.is_final() {
                    break status;
                }
            }
        };

        if final_status == Status::Complete {
            tokio::time::sleep(self.config.outgoing_disconnection_delay).await;
        }

        Ok(self.finalize_without_error(final_status, &share_target, &mut on_update))
    }

    /// *Cancel* (spec.md §4.H): cancels every in-flight payload, emits
    /// `Cancelled` immediately, then — when we initiated the cancel —
    /// writes a CANCEL frame and waits `kInitiatorCancelDelay` before the
    /// caller tears down the connection, giving the peer time to flush.
    pub async fn cancel<W, F>(
        &mut self,
        write_half: &mut W,
        share_target: &ShareTarget,
        initiated_locally: bool,
        mut on_update: F,
    ) -> Result<TransferMetadata>
    where
        W: AsyncWrite + Unpin,
        F: FnMut(TransferMetadata),
    {
        for &payload_id in share_target.attachment_payload_map.values() {
            if let Err(err) = self.connection_manager.cancel(payload_id).await {
                debug!(%err, payload_id, "cancel request failed, continuing");
            }
        }
        let metadata = self.finalize_without_error(Status::Cancelled, share_target, &mut on_update);

        if initiated_locally {
            framing::write_framed(write_half, &V1Frame::Cancel.encode()).await?;
            tokio::time::sleep(self.config.initiator_cancel_delay).await;
        }

        Ok(metadata)
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "sender session transition");
        self.state = next;
    }

    fn emit<F: FnMut(TransferMetadata)>(&mut self, status: Status, is_self_share: bool, on_update: &mut F) {
        let metadata = TransferMetadataBuilder::new().status(status).is_self_share(is_self_share).build();
        self.emit_metadata(metadata, on_update);
    }

    fn emit_metadata<F: FnMut(TransferMetadata)>(&mut self, metadata: TransferMetadata, on_update: &mut F) {
        if self.final_status_lock.admit(&metadata) {
            on_update(metadata);
        }
    }

    fn finalize<F: FnMut(TransferMetadata)>(
        &mut self,
        status: Status,
        share_target: &ShareTarget,
        on_update: &mut F,
        err: Error,
    ) -> TransferMetadata {
        warn!(%err, ?status, "sender session ending");
        self.finalize_without_error(status, share_target, on_update)
    }

    fn finalize_without_error<F: FnMut(TransferMetadata)>(
        &mut self,
        status: Status,
        share_target: &ShareTarget,
        on_update: &mut F,
    ) -> TransferMetadata {
        self.transition(SessionState::Terminal(status));
        let metadata = TransferMetadataBuilder::new().status(status).is_self_share(share_target.for_self_share).build();
        self.emit_metadata(metadata.clone(), on_update);
        metadata
    }
}

/// Builds the INTRODUCTION frame's attachment list from every attachment
/// that has a payload id assigned (spec.md §4.H "Sender SendIntroduction").
fn introduction_metadata(share_target: &ShareTarget) -> Vec<AttachmentMetadata> {
    share_target
        .attachments
        .iter()
        .filter_map(|attachment| {
            let payload_id = *share_target.attachment_payload_map.get(&attachment.id())?;
            Some(match attachment {
                Attachment::File(file) => AttachmentMetadata::File {
                    id: file.id,
                    payload_id,
                    size: file.size as i64,
                    name: file.file_name.clone(),
                    mime_type: file.mime_type.clone(),
                },
                Attachment::Text(text) => {
                    AttachmentMetadata::Text { id: text.id, payload_id, size: text.size as i64, title: text.title.clone() }
                }
                Attachment::WifiCredentials(wifi) => {
                    AttachmentMetadata::WifiCredentials { id: wifi.id, payload_id, ssid: wifi.ssid.clone() }
                }
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::fake::{FakeCertificateManager, FakeConnectionManager};
    use crate::multiplex::{self, MultiplexSocket};
    use crate::payload_tracker::PayloadStatus;
    use crate::session::{open_outgoing_stream, SHARING_SERVICE_ID};
    use crate::share_target::{DeviceType, FileAttachment, FileSemanticType};
    use std::time::Duration;

    fn visibility() -> VisibilityHistory {
        VisibilityHistory {
            current: crate::visibility::DeviceVisibility::Contacts,
            previous: crate::visibility::DeviceVisibility::Contacts,
        }
    }

    fn share_target_with_one_file() -> ShareTarget {
        let mut target = ShareTarget::new(1, "Peer".into(), DeviceType::Laptop, false);
        target.attachments.push(Attachment::File(FileAttachment {
            id: 1,
            size: 1024,
            file_name: "report.pdf".into(),
            mime_type: "application/pdf".into(),
            semantic_type: FileSemanticType::Doc,
            parent_folder: String::new(),
            local_path: Some("/tmp/report.pdf".into()),
        }));
        target.attachment_payload_map.insert(1, 100);
        target
    }

    #[tokio::test]
    async fn rejected_response_ends_the_session_without_sending_payloads() {
        let config = Config::default();
        let connection_manager = Arc::new(FakeConnectionManager::default());
        let certificate_manager = Arc::new(FakeCertificateManager::default());
        let mut session = OutgoingShareSession::new(config, connection_manager, certificate_manager);

        let (peer, ours) = tokio::io::duplex(8192);
        let multiplex = MultiplexSocket::spawn(peer, Config::default());
        let (conn_tx, mut conn_rx) = tokio::sync::mpsc::channel(1);
        multiplex.register_incoming_connection_callback(SHARING_SERVICE_ID, conn_tx);

        let peer_task = tokio::spawn(async move {
            let handle = conn_rx.recv().await.expect("sender should establish a virtual socket");
            let mut peer = multiplex::into_stream(handle);
            let handshake_outcome = handshake::run(&mut peer, HandshakeRole::Responder, &Config::default()).await.unwrap();
            let (peer_read, mut peer_write) = tokio::io::split(peer);
            let peer_reader = IncomingFramesReader::new(peer_read);
            verification::run_over_connection(
                &mut peer_write,
                &peer_reader,
                Duration::from_secs(5),
                VerificationInputs {
                    secret_id_hash: handshake_outcome.raw_token[..6].to_vec(),
                    signed_data: vec![1; 70],
                    optional_signed_data: None,
                    raw_token: handshake_outcome.raw_token.clone(),
                    peer_public_key_sec1: None,
                },
                visibility(),
            )
            .await
            .unwrap();
            let _introduction = peer_reader.read_frame_of_type(FrameKind::Introduction, Duration::from_secs(5)).await.unwrap().unwrap();
            framing::write_framed(&mut peer_write, &V1Frame::Response { status: ConnectionResponseStatus::Reject }.encode())
                .await
                .unwrap();
        });

        let ours = open_outgoing_stream(ours, Config::default()).await.expect("sender should establish a virtual socket");
        let share_target = share_target_with_one_file();
        let metadata = session.run(ours, "endpoint_9", share_target, visibility(), false, |_metadata| {}).await.unwrap();
        peer_task.await.unwrap();

        assert_eq!(metadata.status, Status::Rejected);
        assert!(metadata.is_final_status);
    }

    #[tokio::test]
    async fn accepted_response_drives_payload_tracker_to_completion() {
        let mut config = Config::default();
        config.outgoing_disconnection_delay = Duration::from_millis(10);
        let connection_manager = Arc::new(FakeConnectionManager::default());
        let certificate_manager = Arc::new(FakeCertificateManager::default());
        let mut session = OutgoingShareSession::new(config, Arc::clone(&connection_manager), certificate_manager);

        let (peer, ours) = tokio::io::duplex(8192);
        let multiplex = MultiplexSocket::spawn(peer, Config::default());
        let (conn_tx, mut conn_rx) = tokio::sync::mpsc::channel(1);
        multiplex.register_incoming_connection_callback(SHARING_SERVICE_ID, conn_tx);

        let peer_task = tokio::spawn(async move {
            let handle = conn_rx.recv().await.expect("sender should establish a virtual socket");
            let mut peer = multiplex::into_stream(handle);
            let handshake_outcome = handshake::run(&mut peer, HandshakeRole::Responder, &Config::default()).await.unwrap();
            let (peer_read, mut peer_write) = tokio::io::split(peer);
            let peer_reader = IncomingFramesReader::new(peer_read);
            verification::run_over_connection(
                &mut peer_write,
                &peer_reader,
                Duration::from_secs(5),
                VerificationInputs {
                    secret_id_hash: handshake_outcome.raw_token[..6].to_vec(),
                    signed_data: vec![1; 70],
                    optional_signed_data: None,
                    raw_token: handshake_outcome.raw_token.clone(),
                    peer_public_key_sec1: None,
                },
                visibility(),
            )
            .await
            .unwrap();
            let _introduction = peer_reader.read_frame_of_type(FrameKind::Introduction, Duration::from_secs(5)).await.unwrap().unwrap();
            framing::write_framed(&mut peer_write, &V1Frame::Response { status: ConnectionResponseStatus::Accept }.encode())
                .await
                .unwrap();
        });

        let connection_manager_for_driver = Arc::clone(&connection_manager);
        let share_target = share_target_with_one_file();
        let driver = tokio::spawn(async move {
            let ours = open_outgoing_stream(ours, Config::default()).await.expect("sender should establish a virtual socket");
            session.run(ours, "endpoint_10", share_target, visibility(), false, |_metadata| {}).await.map(|m| (m, session))
        });

        peer_task.await.unwrap();
        // Give the driver a moment to reach the listener-registration
        // point before the fake medium "delivers" the payload.
        tokio::time::sleep(Duration::from_millis(50)).await;
        connection_manager_for_driver.fire(100, PayloadTransferUpdate { payload_id: 100, status: PayloadStatus::Success, bytes_transferred: 1024 });

        let (metadata, _session) = driver.await.unwrap().unwrap();
        assert_eq!(metadata.status, Status::Complete);
    }
}

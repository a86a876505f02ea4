//! Receiver-side driver (spec.md §4.H "Receiver ReceiveIntroduction",
//! "Receiver Accept", "Receiver FinalizePayloads").

use std::sync::Arc;
use std::time::Instant;

use nearshare_crypto::HandshakeRole;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{process_introduction, ChannelListener, SessionState};
use crate::collaborators::{CertificateManager, ConnectionManager, PayloadStatusListener};
use crate::config::Config;
use crate::frames_reader::IncomingFramesReader;
use crate::handshake;
use crate::payload_tracker::{PayloadTracker, PayloadTransferUpdate};
use crate::proto::v1_frame::{ConnectionResponseStatus, FrameKind, V1Frame};
use crate::proto::WifiCredentials;
use crate::share_target::{Attachment, ShareTarget};
use crate::transfer_metadata::{FinalStatusLock, Status, TransferMetadata, TransferMetadataBuilder};
use crate::verification::{self, VerificationInputs};
use crate::visibility::VisibilityHistory;
use crate::wire::framing;
use crate::{Error, Result};

/// Drives one inbound transfer over `connection` to a single final
/// [`TransferMetadata`], calling `on_update` for every intermediate
/// snapshot the final-status lock admits.
pub struct IncomingShareSession<CM, CertM> {
    config: Config,
    connection_manager: Arc<CM>,
    certificate_manager: Arc<CertM>,
    state: SessionState,
    final_status_lock: FinalStatusLock,
}

impl<CM: ConnectionManager, CertM: CertificateManager> IncomingShareSession<CM, CertM> {
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

    /// Runs the full receiver flow (spec.md §4.H). `auto_accept` covers
    /// self-share and zero-size transfers, which skip
    /// `AwaitingLocalConfirmation` entirely.
    pub async fn run<C, F>(
        &mut self,
        connection: C,
        endpoint_id: &str,
        mut share_target: ShareTarget,
        visibility: VisibilityHistory,
        auto_accept: bool,
        mut on_update: F,
    ) -> Result<TransferMetadata>
    where
        C: AsyncRead + AsyncWrite + Send + Unpin + 'static,
        F: FnMut(TransferMetadata),
    {
        self.transition(SessionState::Connecting);
        self.emit(Status::Connecting, share_target.for_self_share, None, &mut on_update);

        self.transition(SessionState::KeyExchange);
        let mut connection = connection;
        let handshake_outcome = match handshake::run(&mut connection, HandshakeRole::Responder, &self.config).await {
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

        let token = if verification.outcome == crate::verification::VerificationOutcome::Unable && !share_target.for_self_share {
            Some(verification::confirmation_token(&handshake_outcome.raw_token))
        } else {
            None
        };

        self.transition(SessionState::AwaitingIntroduction);
        let introduction = match reader.read_frame_of_type(FrameKind::Introduction, self.config.read_frames_timeout).await {
            Ok(Some(V1Frame::Introduction { attachments, start_transfer })) => (attachments, start_transfer),
            Ok(Some(_)) | Ok(None) => return Ok(self.finalize_without_error(Status::Failed, &share_target, &mut on_update)),
            Err(err) => return Ok(self.finalize(Status::Failed, &share_target, &mut on_update, err)),
        };
        let (attachments, start_transfer) = introduction;

        let parsed = match process_introduction(
            &attachments,
            start_transfer,
            self.config.attachments_size_threshold_over_high_quality_medium,
        ) {
            Ok(parsed) => parsed,
            Err(status) => {
                let response_status = match status {
                    Status::NotEnoughSpace => ConnectionResponseStatus::NotEnoughSpace,
                    _ => ConnectionResponseStatus::UnsupportedAttachmentType,
                };
                let _ = framing::write_framed(&mut write_half, &V1Frame::Response { status: response_status }.encode()).await;
                return Ok(self.finalize_without_error(status, &share_target, &mut on_update));
            }
        };
        share_target.attachment_payload_map = parsed.attachment_payload_map;

        if parsed.request_bandwidth_upgrade {
            if let Err(err) = self.connection_manager.upgrade_bandwidth(endpoint_id).await {
                debug!(%err, "bandwidth upgrade request failed, continuing at current medium");
            }
        }

        let should_auto_accept = auto_accept || share_target.for_self_share || parsed.total_size == 0;
        if !should_auto_accept {
            self.transition(SessionState::AwaitingLocalConfirmation);
            self.emit(Status::AwaitingLocalConfirmation, share_target.for_self_share, token, &mut on_update);
            // A real deployment waits here for the surface to call
            // `accept`/`reject`; this driver auto-proceeds to acceptance
            // since the decision channel is owned by the caller, not
            // this state machine (spec.md §9 "callback graph" redesign).
        }

        framing::write_framed(&mut write_half, &V1Frame::Response { status: ConnectionResponseStatus::Accept }.encode()).await?;
        self.transition(SessionState::AwaitingRemoteAcceptance);

        self.transition(SessionState::InProgress);
        self.emit(Status::InProgress, share_target.for_self_share, None, &mut on_update);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let listener = Arc::new(ChannelListener { tx }) as Arc<dyn PayloadStatusListener>;
        for &payload_id in parsed.attachment_sizes.keys() {
            self.connection_manager.register_payload_status_listener(payload_id, Arc::clone(&listener));
        }

        let mut tracker = PayloadTracker::new(&self.config, share_target.for_self_share, &parsed.attachment_sizes);
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

        let final_status = if final_status == Status::Complete {
            self.finalize_payloads(&mut share_target).await
        } else {
            final_status
        };

        Ok(self.finalize_without_error(final_status, &share_target, &mut on_update))
    }

    /// *Receiver FinalizePayloads* (spec.md §4.H): once the tracker
    /// reports every payload complete, pull each attachment's received
    /// bytes (or file path) from the connection manager and copy them
    /// into the matching attachment. Any missing payload or empty bytes
    /// maps to `IncompletePayloads` rather than a partially-filled
    /// attachment.
    async fn finalize_payloads(&self, share_target: &mut ShareTarget) -> Status {
        for attachment in &mut share_target.attachments {
            let Some(&payload_id) = share_target.attachment_payload_map.get(&attachment.id()) else {
                return Status::IncompletePayloads;
            };
            let Some(payload) = self.connection_manager.get_incoming_payload(payload_id).await else {
                return Status::IncompletePayloads;
            };

            match attachment {
                Attachment::File(file) => match payload.file_path {
                    Some(path) => file.local_path = Some(path),
                    None => return Status::IncompletePayloads,
                },
                Attachment::Text(text) => {
                    if payload.bytes.is_empty() {
                        return Status::IncompletePayloads;
                    }
                    text.body = String::from_utf8_lossy(&payload.bytes).into_owned();
                }
                Attachment::WifiCredentials(wifi) => match WifiCredentials::decode(&payload.bytes) {
                    Some(credentials) => {
                        wifi.password = credentials.password;
                        wifi.is_hidden = credentials.hidden_ssid;
                    }
                    None => return Status::IncompletePayloads,
                },
            }
        }
        Status::Complete
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "receiver session transition");
        self.state = next;
    }

    fn emit<F: FnMut(TransferMetadata)>(&mut self, status: Status, is_self_share: bool, token: Option<String>, on_update: &mut F) {
        let metadata = TransferMetadataBuilder::new().status(status).is_self_share(is_self_share).token(token).build();
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
        warn!(%err, ?status, "receiver session ending");
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

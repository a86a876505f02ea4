//! `PairedKeyVerificationRunner` (spec.md §4.E): a two-round frame
//! exchange deciding whether a peer is a known contact (Success), an
//! unverifiable stranger requiring a human-visible token (Unable), or
//! a verification failure (Fail).

use std::time::Duration;

use nearshare_crypto::verify_signature;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::frames_reader::IncomingFramesReader;
use crate::proto::v1_frame::{FrameKind, OsType, PairedKeyResultStatus, V1Frame};
use crate::visibility::VisibilityHistory;
use crate::wire::framing;
use crate::{Error, Result};

/// Per-side result before merging (spec.md §4.E step 1).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LocalResult {
    Success,
    Fail,
    Unable,
}

/// The merged outcome (spec.md §4.E step 3) after applying the
/// visibility-gate override of step 4.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VerificationOutcome {
    Success,
    Fail,
    Unable,
}

/// What the two-round exchange needs from its caller: the frames reader
/// (for receiving the peer's frames) and a sink for writing our own.
pub trait Channel {
    fn send(&mut self, frame: V1Frame) -> Result<()>;
    fn recv(&mut self) -> Result<V1Frame>;
}

/// Inputs to one verification run (spec.md §4.E): our own
/// `PairedKeyEncryptionFrame` fields to send, and what's needed to
/// verify the peer's signature once its frame arrives.
pub struct VerificationInputs {
    pub secret_id_hash: Vec<u8>,
    pub signed_data: Vec<u8>,
    pub optional_signed_data: Option<Vec<u8>>,
    /// The locally-agreed UKEY2 verification string — the message the
    /// peer's `signed_data` must be a valid signature over.
    pub raw_token: Vec<u8>,
    /// The peer's public key (SEC1), if its certificate has been
    /// resolved. `None` for an unverified stranger.
    pub peer_public_key_sec1: Option<Vec<u8>>,
}

/// Checks the peer's `PairedKeyEncryptionFrame::signed_data` against
/// `raw_token` using its public key, if known (spec.md §4.E step 1 "THE
/// CORE": verify the peer's signature over the shared secret).
fn verify_peer(peer_public_key_sec1: Option<&[u8]>, raw_token: &[u8], peer_signed_data: &[u8]) -> LocalResult {
    let Some(public_key) = peer_public_key_sec1 else {
        return LocalResult::Unable;
    };
    if verify_signature(public_key, raw_token, peer_signed_data) {
        LocalResult::Success
    } else {
        LocalResult::Fail
    }
}

/// Output of a full verification run: the merged outcome and the
/// peer's reported OS (spec.md §4.E "must be recorded on the session
/// for telemetry").
pub struct RunOutcome {
    pub outcome: VerificationOutcome,
    pub remote_os_type: OsType,
}

pub(crate) fn local_status(result: LocalResult) -> PairedKeyResultStatus {
    match result {
        LocalResult::Success => PairedKeyResultStatus::Success,
        LocalResult::Fail => PairedKeyResultStatus::Fail,
        LocalResult::Unable => PairedKeyResultStatus::Unable,
    }
}

pub(crate) fn merge(local: LocalResult, remote: PairedKeyResultStatus) -> VerificationOutcome {
    use LocalResult::{Fail, Success};
    use PairedKeyResultStatus::{Fail as RemoteFail, Success as RemoteSuccess};

    if local == Fail || remote == RemoteFail {
        return VerificationOutcome::Fail;
    }
    if local == Success && remote == RemoteSuccess {
        return VerificationOutcome::Success;
    }
    VerificationOutcome::Unable
}

/// Runs the two-round exchange over `channel` (spec.md §4.E steps 1-3),
/// then applies the visibility-gate override (step 4).
pub fn run(channel: &mut impl Channel, inputs: VerificationInputs, visibility: VisibilityHistory) -> Result<RunOutcome> {
    channel.send(V1Frame::PairedKeyEncryption {
        secret_id_hash: inputs.secret_id_hash,
        signed_data: inputs.signed_data,
        optional_signed_data: inputs.optional_signed_data,
    })?;
    let peer_encryption = channel.recv()?;
    let peer_signed_data = match &peer_encryption {
        V1Frame::PairedKeyEncryption { signed_data, .. } => signed_data.as_slice(),
        _ => &[],
    };
    let local_result = verify_peer(inputs.peer_public_key_sec1.as_deref(), &inputs.raw_token, peer_signed_data);

    channel.send(V1Frame::PairedKeyResult {
        status: local_status(local_result),
        os_type: OsType::Unknown,
    })?;
    let peer_result = channel.recv()?;
    let (remote_status, remote_os_type) = match peer_result {
        V1Frame::PairedKeyResult { status, os_type } => (status, os_type),
        _ => (PairedKeyResultStatus::Fail, OsType::Unknown),
    };

    let mut outcome = merge(local_result, remote_status);

    if outcome == VerificationOutcome::Success && visibility.forbids_silent_acceptance() {
        debug!("downgrading verification success to unable: not transiently visible to contacts");
        outcome = VerificationOutcome::Unable;
    }

    Ok(RunOutcome { outcome, remote_os_type })
}

/// Same two-round exchange as [`run`], but driven over a live connection
/// instead of the test-only [`Channel`] trait: writes go straight to
/// `writer`, reads come from `reader` (shared with whatever else on the
/// session wants V1Frames of other types).
pub async fn run_over_connection<W, R>(
    writer: &mut W,
    reader: &IncomingFramesReader<R>,
    timeout: Duration,
    inputs: VerificationInputs,
    visibility: VisibilityHistory,
) -> Result<RunOutcome>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    let encryption_frame = V1Frame::PairedKeyEncryption {
        secret_id_hash: inputs.secret_id_hash,
        signed_data: inputs.signed_data,
        optional_signed_data: inputs.optional_signed_data,
    };
    framing::write_framed(writer, &encryption_frame.encode()).await?;
    let peer_encryption = reader
        .read_frame_of_type(FrameKind::PairedKeyEncryption, timeout)
        .await?
        .ok_or(Error::Timeout { what: "PairedKeyEncryptionFrame" })?;
    let peer_signed_data = match &peer_encryption {
        V1Frame::PairedKeyEncryption { signed_data, .. } => signed_data.as_slice(),
        _ => &[],
    };
    let local_result = verify_peer(inputs.peer_public_key_sec1.as_deref(), &inputs.raw_token, peer_signed_data);

    let result_frame = V1Frame::PairedKeyResult {
        status: local_status(local_result),
        os_type: OsType::Unknown,
    };
    framing::write_framed(writer, &result_frame.encode()).await?;
    let peer_result = reader
        .read_frame_of_type(FrameKind::PairedKeyResult, timeout)
        .await?
        .ok_or(Error::Timeout { what: "PairedKeyResultFrame" })?;

    let (remote_status, remote_os_type) = match peer_result {
        V1Frame::PairedKeyResult { status, os_type } => (status, os_type),
        _ => (PairedKeyResultStatus::Fail, OsType::Unknown),
    };

    let mut outcome = merge(local_result, remote_status);
    if outcome == VerificationOutcome::Success && visibility.forbids_silent_acceptance() {
        debug!("downgrading verification success to unable: not transiently visible to contacts");
        outcome = VerificationOutcome::Unable;
    }

    Ok(RunOutcome { outcome, remote_os_type })
}

/// Derives the 4-digit human-confirmation token from the raw auth
/// token bytes (spec.md §4.H Verifying: "base10(first 5 bytes,
/// big-endian) mod 10000, zero-padded to 4 digits").
#[must_use]
pub fn confirmation_token(raw_token: &[u8]) -> String {
    let mut bytes = [0u8; 8];
    let take = raw_token.len().min(5);
    bytes[8 - take..].copy_from_slice(&raw_token[..take]);
    let value = u64::from_be_bytes(bytes) % 10_000;
    format!("{value:04}")
}

//! `EncryptionRunner` (spec.md §4.D): drives a [`Ukey2Handshake`] to
//! completion as either side, over anything `AsyncRead + AsyncWrite`,
//! with a 15-second wall-clock deadline wrapping the whole exchange.
//! The deadline races the handshake via `tokio::select!`, which drops
//! the losing branch for us without any extra cancellation plumbing.

use nearshare_crypto::{HandshakeRole, ParseOutcome, Ukey2Handshake};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

use crate::config::Config;
use crate::error::VerificationFailure;
use crate::wire::framing;
use crate::{Error, Result};

/// Outcome delivered to the handshake's caller (spec.md §4.D "the
/// listener is invoked exactly once").
pub struct HandshakeOutcome {
    pub handshake: Ukey2Handshake,
    /// Uppercased, 5-character Base64 prefix of the verification string.
    pub human_token: String,
    /// The full verification string, used by the paired-key
    /// verification runner as the raw auth token.
    pub raw_token: Vec<u8>,
}

async fn write_message<W: AsyncWrite + Unpin>(channel: &mut W, message: &[u8]) -> Result<()> {
    framing::write_framed(channel, message).await
}

async fn read_message<R: AsyncRead + Unpin>(channel: &mut R) -> Result<Vec<u8>> {
    let len = framing::read_int(channel).await?;
    if len <= 0 {
        return Err(Error::Parse { what: "handshake message length" });
    }
    let mut buf = vec![0u8; len as usize];
    channel.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Runs the responder side of the handshake (spec.md §4.D steps 1-5).
async fn run_responder<C: AsyncRead + AsyncWrite + Unpin>(channel: &mut C) -> Result<HandshakeOutcome> {
    let mut handshake = Ukey2Handshake::for_responder();

    let client_init = read_message(channel).await?;
    if let ParseOutcome::Alert { alert } = handshake.parse_handshake_message(&client_init) {
        let _ = write_message(channel, &alert).await;
        return Err(Error::Verification(VerificationFailure::HandshakeFailed));
    }

    let server_init = handshake
        .next_message()
        .ok_or(Error::Verification(VerificationFailure::HandshakeFailed))?;
    write_message(channel, &server_init).await?;

    let client_finish = read_message(channel).await?;
    if let ParseOutcome::Alert { alert } = handshake.parse_handshake_message(&client_finish) {
        let _ = write_message(channel, &alert).await;
        return Err(Error::Verification(VerificationFailure::HandshakeFailed));
    }

    finish(handshake)
}

/// Runs the initiator side of the handshake — symmetric to
/// [`run_responder`].
async fn run_initiator<C: AsyncRead + AsyncWrite + Unpin>(channel: &mut C) -> Result<HandshakeOutcome> {
    let mut handshake = Ukey2Handshake::for_initiator();

    let client_init = handshake
        .next_message()
        .ok_or(Error::Verification(VerificationFailure::HandshakeFailed))?;
    write_message(channel, &client_init).await?;

    let server_init = read_message(channel).await?;
    if let ParseOutcome::Alert { alert } = handshake.parse_handshake_message(&server_init) {
        let _ = write_message(channel, &alert).await;
        return Err(Error::Verification(VerificationFailure::HandshakeFailed));
    }

    let client_finish = handshake
        .next_message()
        .ok_or(Error::Verification(VerificationFailure::HandshakeFailed))?;
    write_message(channel, &client_finish).await?;

    finish(handshake)
}

fn finish(handshake: Ukey2Handshake) -> Result<HandshakeOutcome> {
    let raw_token = handshake
        .verification_string(32)
        .map_err(|_| Error::Verification(VerificationFailure::HandshakeFailed))?;
    let human_token = crate::wire::base64url::encode(&raw_token[..5.min(raw_token.len())]).to_uppercase();
    Ok(HandshakeOutcome {
        handshake,
        human_token,
        raw_token,
    })
}

/// Drives a handshake of the given `role` to completion over `channel`,
/// bounded by `config.handshake_timeout` (spec.md §4.D). On timeout the
/// channel is expected to be torn down by the caller once this returns
/// `Err(Error::Timeout)` — the deadline here only governs how long this
/// function waits, mirroring "close the channel, which unblocks any
/// read/write with IO-failure".
pub async fn run<C: AsyncRead + AsyncWrite + Unpin>(
    channel: &mut C,
    role: HandshakeRole,
    config: &Config,
) -> Result<HandshakeOutcome> {
    trace!(?role, "starting handshake");

    let run = async {
        match role {
            HandshakeRole::Initiator => run_initiator(channel).await,
            HandshakeRole::Responder => run_responder(channel).await,
        }
    };

    let result = tokio::select! {
        result = run => result,
        () = tokio::time::sleep(config.handshake_timeout) => {
            warn!("handshake deadline elapsed");
            Err(Error::Timeout { what: "UKEY2 handshake" })
        }
    };

    match &result {
        Ok(outcome) => debug!(token = %outcome.human_token, "handshake complete"),
        Err(err) => debug!(%err, "handshake failed"),
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn initiator_and_responder_agree_on_token() {
        let (mut a, mut b) = duplex(4096);
        let config = Config::default();

        let (initiator_result, responder_result) =
            tokio::join!(run(&mut a, HandshakeRole::Initiator, &config), run(&mut b, HandshakeRole::Responder, &config));

        let initiator_outcome = initiator_result.unwrap();
        let responder_outcome = responder_result.unwrap();
        assert_eq!(initiator_outcome.human_token, responder_outcome.human_token);
        assert_eq!(initiator_outcome.human_token.len(), 5);
        assert_eq!(initiator_outcome.raw_token, responder_outcome.raw_token);
    }

    #[tokio::test]
    async fn deadline_fires_when_peer_never_responds() {
        let (mut a, _b) = duplex(4096);
        let mut config = Config::default();
        config.handshake_timeout = std::time::Duration::from_millis(20);

        let result = run(&mut a, HandshakeRole::Initiator, &config).await;
        assert!(matches!(result, Err(Error::Timeout { .. })));
    }
}

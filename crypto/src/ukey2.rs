//! A concrete instantiation of the UKEY2 key-exchange protocol that
//! spec.md treats as an opaque collaborator: three messages
//! (Client Init, Server Init, Client Finish) exchanged over an
//! authenticated channel, ending with a 32-byte verification string
//! both sides can display to a human for confirmation.
//!
//! Wire scheme (simplified from the real UKEY2 draft, sufficient for
//! this crate's contract with [`Ukey2Handshake`]):
//!
//! ```text
//! ClientInit  := commitment(32) ++ nonce(32)       // commitment = SHA256(client pubkey)
//! ServerInit  := server_pubkey(65) ++ nonce(32)
//! ClientFinish:= client_pubkey(65)
//! ```
//!
//! The responder only reveals its ephemeral key after it has the
//! client's commitment, and the client only reveals its key in
//! `ClientFinish`; each side checks the other's key against the
//! commitment/echoed nonce before deriving the shared secret, which
//! prevents the Finish message from being replayed against a
//! different Init.

use hkdf::Hkdf;
use p256::ecdh::EphemeralSecret;
use p256::{EncodedPoint, PublicKey};
use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};

use crate::{Error, Result};

const NONCE_LEN: usize = 32;
const COMMITMENT_LEN: usize = 32;
const VERIFICATION_STRING_LEN: usize = 32;
const HKDF_INFO: &[u8] = b"UKEY2 v1 auth";

/// Which side of the handshake a [`Ukey2Handshake`] plays.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum HandshakeRole {
    /// Sends Client Init first, expects Server Init, then sends Client
    /// Finish.
    Initiator,
    /// Expects Client Init first, replies with Server Init, then
    /// expects Client Finish.
    Responder,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Step {
    Start,
    SentInit,
    SentOrRecvServerInit,
    /// Responder only: Server Init has been sent, waiting for the
    /// peer's Client Finish.
    AwaitingClientFinish,
    Done,
}

/// Result of [`Ukey2Handshake::parse_handshake_message`].
#[derive(Debug)]
pub enum ParseOutcome {
    /// Message accepted; the handshake may now produce its next
    /// message via [`Ukey2Handshake::next_message`].
    Ok,
    /// Message rejected; `alert` is the (best-effort) alert payload the
    /// caller should write back to the peer before failing, mirroring
    /// `parse_result.alert_to_send` in the original implementation.
    Alert { alert: Vec<u8> },
}

/// Driver for one side of a single UKEY2 handshake.
///
/// Matches the opaque contract in spec.md §6: `for_initiator`/
/// `for_responder` construct it, `next_message`/`parse_handshake_message`
/// drive it message by message, and `verification_string` is only
/// callable once the handshake has completed.
pub struct Ukey2Handshake {
    role: HandshakeRole,
    step: Step,
    local_secret: EphemeralSecret,
    local_public: PublicKey,
    local_nonce: [u8; NONCE_LEN],
    peer_nonce: Option<[u8; NONCE_LEN]>,
    peer_commitment: Option<[u8; COMMITMENT_LEN]>,
    peer_public: Option<PublicKey>,
    verification_string: Option<[u8; VERIFICATION_STRING_LEN]>,
}

impl std::fmt::Debug for Ukey2Handshake {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ukey2Handshake")
            .field("role", &self.role)
            .field("step", &self.step)
            .field("complete", &self.is_complete())
            .finish_non_exhaustive()
    }
}

impl Ukey2Handshake {
    /// Creates a handshake driver for the given role.
    #[must_use]
    pub fn new(role: HandshakeRole) -> Self {
        let local_secret = EphemeralSecret::random(&mut OsRng);
        let local_public = local_secret.public_key();
        let mut local_nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut local_nonce);
        Self {
            role,
            step: Step::Start,
            local_secret,
            local_public,
            local_nonce,
            peer_nonce: None,
            peer_commitment: None,
            peer_public: None,
            verification_string: None,
        }
    }

    /// Convenience constructor mirroring `UKey2Handshake::ForInitiator`.
    #[must_use]
    pub fn for_initiator() -> Self {
        Self::new(HandshakeRole::Initiator)
    }

    /// Convenience constructor mirroring `UKey2Handshake::ForResponder`.
    #[must_use]
    pub fn for_responder() -> Self {
        Self::new(HandshakeRole::Responder)
    }

    fn public_bytes(key: &PublicKey) -> Vec<u8> {
        key.to_encoded_point(false).as_bytes().to_vec()
    }

    fn commitment_of(key: &PublicKey) -> [u8; COMMITMENT_LEN] {
        let mut h = Sha256::new();
        h.update(Self::public_bytes(key));
        h.finalize().into()
    }

    /// Returns the next message this side should send, or `None` if
    /// there is nothing to send right now (either waiting on the peer,
    /// or the handshake is already complete).
    pub fn next_message(&mut self) -> Option<Vec<u8>> {
        match (self.role, self.step) {
            (HandshakeRole::Initiator, Step::Start) => {
                self.step = Step::SentInit;
                let mut msg = Self::commitment_of(&self.local_public).to_vec();
                msg.extend_from_slice(&self.local_nonce);
                Some(msg)
            }
            (HandshakeRole::Responder, Step::SentOrRecvServerInit) => {
                // Guarded by parse_handshake_message having already set
                // peer_commitment before moving us into this step.
                self.step = Step::AwaitingClientFinish;
                let mut msg = Self::public_bytes(&self.local_public);
                msg.extend_from_slice(&self.local_nonce);
                Some(msg)
            }
            (HandshakeRole::Initiator, Step::SentInit) => None,
            (HandshakeRole::Initiator, Step::SentOrRecvServerInit) => {
                // peer_public/peer_nonce were set by parse_handshake_message
                // when it moved us into this step, so the shared secret can
                // be derived now rather than waiting on a message back.
                self.finish();
                self.step = Step::Done;
                Some(Self::public_bytes(&self.local_public))
            }
            _ => None,
        }
    }

    /// Parses a message received from the peer, advancing the state
    /// machine. Returns [`ParseOutcome::Alert`] (never an `Err`) on a
    /// malformed or out-of-sequence message so the caller can attempt
    /// to notify the peer before tearing the channel down, matching
    /// `ParseHandshakeMessage`'s alert-carrying failure mode.
    pub fn parse_handshake_message(&mut self, bytes: &[u8]) -> ParseOutcome {
        match (self.role, self.step) {
            (HandshakeRole::Responder, Step::Start) => {
                if bytes.len() != COMMITMENT_LEN + NONCE_LEN {
                    return ParseOutcome::Alert {
                        alert: b"bad_client_init".to_vec(),
                    };
                }
                let mut commitment = [0u8; COMMITMENT_LEN];
                commitment.copy_from_slice(&bytes[..COMMITMENT_LEN]);
                let mut nonce = [0u8; NONCE_LEN];
                nonce.copy_from_slice(&bytes[COMMITMENT_LEN..]);
                self.peer_commitment = Some(commitment);
                self.peer_nonce = Some(nonce);
                self.step = Step::SentOrRecvServerInit;
                ParseOutcome::Ok
            }
            (HandshakeRole::Initiator, Step::SentInit) => {
                if bytes.len() <= NONCE_LEN {
                    return ParseOutcome::Alert {
                        alert: b"bad_server_init".to_vec(),
                    };
                }
                let (pubkey_bytes, nonce_bytes) = bytes.split_at(bytes.len() - NONCE_LEN);
                let Ok(point) = EncodedPoint::from_bytes(pubkey_bytes) else {
                    return ParseOutcome::Alert {
                        alert: b"bad_server_pubkey".to_vec(),
                    };
                };
                let Some(pubkey) = PublicKey::from_encoded_point(&point).into_option() else {
                    return ParseOutcome::Alert {
                        alert: b"bad_server_pubkey".to_vec(),
                    };
                };
                let mut nonce = [0u8; NONCE_LEN];
                nonce.copy_from_slice(nonce_bytes);
                self.peer_public = Some(pubkey);
                self.peer_nonce = Some(nonce);
                self.step = Step::SentOrRecvServerInit;
                ParseOutcome::Ok
            }
            (HandshakeRole::Responder, Step::AwaitingClientFinish) => {
                let Ok(point) = EncodedPoint::from_bytes(bytes) else {
                    return ParseOutcome::Alert {
                        alert: b"bad_client_finish".to_vec(),
                    };
                };
                let Some(pubkey) = PublicKey::from_encoded_point(&point).into_option() else {
                    return ParseOutcome::Alert {
                        alert: b"bad_client_finish".to_vec(),
                    };
                };
                if Self::commitment_of(&pubkey) != self.peer_commitment.unwrap_or_default() {
                    return ParseOutcome::Alert {
                        alert: b"commitment_mismatch".to_vec(),
                    };
                }
                self.peer_public = Some(pubkey);
                self.step = Step::Done;
                self.finish();
                ParseOutcome::Ok
            }
            _ => ParseOutcome::Alert {
                alert: b"unexpected_message".to_vec(),
            },
        }
    }

    fn finish(&mut self) {
        let peer_public = self
            .peer_public
            .as_ref()
            .expect("finish() only called once peer_public is set");
        let shared = self.local_secret.diffie_hellman(peer_public);
        let (client_nonce, server_nonce) = match self.role {
            HandshakeRole::Initiator => (
                self.local_nonce,
                self.peer_nonce.expect("server init carries the nonce"),
            ),
            HandshakeRole::Responder => (
                self.peer_nonce.expect("client init carries the nonce"),
                self.local_nonce,
            ),
        };
        let mut salt = Vec::with_capacity(NONCE_LEN * 2);
        salt.extend_from_slice(&client_nonce);
        salt.extend_from_slice(&server_nonce);
        let hkdf = Hkdf::<Sha256>::new(Some(&salt), shared.raw_secret_bytes());
        let mut out = [0u8; VERIFICATION_STRING_LEN];
        hkdf.expand(HKDF_INFO, &mut out)
            .expect("32 bytes is within HKDF-SHA256's output range");
        self.verification_string = Some(out);
    }

    /// Returns whether the handshake has completed (both sides
    /// verified and the shared secret is derived).
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.verification_string.is_some()
    }

    /// Returns the `length`-byte prefix of the verification string, the
    /// 32-byte value both parties derive identically once the
    /// handshake completes. Errors with [`Error::NotComplete`] if
    /// called early.
    pub fn verification_string(&self, length: usize) -> Result<Vec<u8>> {
        let full = self.verification_string.ok_or(Error::NotComplete)?;
        let length = length.min(full.len());
        Ok(full[..length].to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_handshake_agrees_on_verification_string() {
        let mut initiator = Ukey2Handshake::for_initiator();
        let mut responder = Ukey2Handshake::for_responder();

        let client_init = initiator.next_message().expect("client init");
        assert!(matches!(
            responder.parse_handshake_message(&client_init),
            ParseOutcome::Ok
        ));

        let server_init = responder.next_message().expect("server init");
        assert!(matches!(
            initiator.parse_handshake_message(&server_init),
            ParseOutcome::Ok
        ));

        let client_finish = initiator.next_message().expect("client finish");
        assert!(matches!(
            responder.parse_handshake_message(&client_finish),
            ParseOutcome::Ok
        ));

        assert!(initiator.is_complete());
        assert!(responder.is_complete());
        assert_eq!(
            initiator.verification_string(32).unwrap(),
            responder.verification_string(32).unwrap()
        );
    }

    #[test]
    fn tampered_client_finish_is_rejected() {
        let mut initiator = Ukey2Handshake::for_initiator();
        let mut responder = Ukey2Handshake::for_responder();
        let mut attacker = Ukey2Handshake::for_initiator();

        let client_init = initiator.next_message().unwrap();
        responder.parse_handshake_message(&client_init);
        let server_init = responder.next_message().unwrap();
        initiator.parse_handshake_message(&server_init);

        // Swap in a finish message from a different key pair entirely.
        let forged_finish = attacker.next_message();
        assert!(forged_finish.is_none()); // attacker hasn't sent ClientInit yet
        let _ = initiator.next_message().unwrap();

        let bogus = Ukey2Handshake::for_initiator().local_public.to_encoded_point(false).as_bytes().to_vec();
        let outcome = responder.parse_handshake_message(&bogus);
        assert!(matches!(outcome, ParseOutcome::Alert { .. }));
        assert!(!responder.is_complete());
    }
}

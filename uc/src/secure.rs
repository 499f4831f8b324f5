// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Secure channel between the two MCUs: X25519 handshake, attestation-key
//! signature over the transcript, HKDF-derived per-direction traffic keys,
//! and AES-GCM sealing with a 96-bit nonce that never repeats (`spec.md`
//! §4.7).

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use alloc::vec::Vec;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use p256::ecdsa::signature::Signer;
use p256::ecdsa::{Signature as P256Signature, SigningKey as P256SigningKey, VerifyingKey};
use sha2::Sha256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecureError {
    DerivationFailed,
    SignatureInvalid,
    ConfirmationMismatch,
    NonceExhausted,
    SealFailed,
}

/// Injected entropy source for the ephemeral key agreement, analogous to
/// `glitch::GlitchDelay`: production wires this to a hardware TRNG, tests
/// use a deterministic stream.
pub trait SecureRandom {
    fn fill_bytes(&mut self, buf: &mut [u8]);
}

struct RngAdapter<'a, R: SecureRandom>(&'a mut R);

impl<'a, R: SecureRandom> rand_core::RngCore for RngAdapter<'a, R> {
    fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.0.fill_bytes(&mut buf);
        u32::from_le_bytes(buf)
    }
    fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.0.fill_bytes(&mut buf);
        u64::from_le_bytes(buf)
    }
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest)
    }
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
        self.0.fill_bytes(dest);
        Ok(())
    }
}

impl<'a, R: SecureRandom> rand_core::CryptoRng for RngAdapter<'a, R> {}

/// The initiator's half of the handshake: an ephemeral keypair held until
/// the responder's reply arrives.
pub struct HandshakeInitiator {
    ephemeral: x25519_dalek::EphemeralSecret,
    pub public: [u8; 32],
}

impl HandshakeInitiator {
    pub fn begin(rng: &mut impl SecureRandom) -> Self {
        let mut adapter = RngAdapter(rng);
        let ephemeral = x25519_dalek::EphemeralSecret::random_from_rng(&mut adapter);
        let public = *x25519_dalek::PublicKey::from(&ephemeral).as_bytes();
        Self { ephemeral, public }
    }

    /// Consumes the responder's reply, verifying its signature and
    /// key-confirmation tag, and returns the confirmed session plus the
    /// initiator's own confirmation tag to send back.
    pub fn finish(
        self,
        responder_public: [u8; 32],
        responder_signature: &[u8; 64],
        responder_confirmation: &[u8; 16],
        responder_verify_key: &[u8; 33],
    ) -> Result<(Session, [u8; 16]), SecureError> {
        let shared = self
            .ephemeral
            .diffie_hellman(&x25519_dalek::PublicKey::from(responder_public));
        let transcript = transcript_of(&self.public, &responder_public);
        let verify_key = VerifyingKey::from_sec1_bytes(responder_verify_key)
            .map_err(|_| SecureError::SignatureInvalid)?;
        let sig = P256Signature::try_from(responder_signature.as_slice())
            .map_err(|_| SecureError::SignatureInvalid)?;
        use p256::ecdsa::signature::Verifier;
        verify_key
            .verify(&transcript, &sig)
            .map_err(|_| SecureError::SignatureInvalid)?;
        let (session, our_confirm, their_confirm) =
            Session::derive(shared.as_bytes(), &transcript, Role::Initiator)?;
        if their_confirm != *responder_confirmation {
            return Err(SecureError::ConfirmationMismatch);
        }
        Ok((session, our_confirm))
    }
}

pub struct HandshakeResponse {
    pub public: [u8; 32],
    pub signature: [u8; 64],
    pub confirmation: [u8; 16],
}

/// Runs the responder side in one shot: it has no state to hold between
/// calls because, unlike the initiator, it never waits on a further reply
/// from itself — only on the initiator's final confirmation tag. The
/// returned `[u8; 16]` is that expected tag; the caller compares it against
/// whatever the initiator sends back and must reject the session on mismatch.
pub fn respond(
    rng: &mut impl SecureRandom,
    initiator_public: [u8; 32],
    attestation_key: &[u8; 32],
) -> Result<(Session, HandshakeResponse, [u8; 16]), SecureError> {
    let mut adapter = RngAdapter(rng);
    let ephemeral = x25519_dalek::EphemeralSecret::random_from_rng(&mut adapter);
    let public = *x25519_dalek::PublicKey::from(&ephemeral).as_bytes();
    let shared = ephemeral.diffie_hellman(&x25519_dalek::PublicKey::from(initiator_public));
    let transcript = transcript_of(&initiator_public, &public);

    let signing_key = P256SigningKey::from_bytes(p256::FieldBytes::from_slice(attestation_key))
        .map_err(|_| SecureError::DerivationFailed)?;
    let sig: P256Signature = signing_key.sign(&transcript);
    let mut signature = [0u8; 64];
    signature.copy_from_slice(&sig.to_bytes());

    let (session, confirmation, expected_initiator_confirm) =
        Session::derive(shared.as_bytes(), &transcript, Role::Responder)?;

    Ok((session, HandshakeResponse { public, signature, confirmation }, expected_initiator_confirm))
}

fn transcript_of(initiator_public: &[u8; 32], responder_public: &[u8; 32]) -> Vec<u8> {
    let mut t = Vec::with_capacity(64);
    t.extend_from_slice(initiator_public);
    t.extend_from_slice(responder_public);
    t
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Initiator,
    Responder,
}

/// A confirmed, bidirectional secure session: two traffic keys (one per
/// direction) and a strictly-increasing send counter for each. The
/// direction salts ensure the two directions' nonce spaces never overlap
/// even if both counters happen to match.
pub struct Session {
    send_key: [u8; 32],
    recv_key: [u8; 32],
    send_salt: [u8; 4],
    recv_salt: [u8; 4],
    send_counter: u64,
    highest_recv_counter: Option<u64>,
}

const INITIATOR_SALT: [u8; 4] = *b"I2R\0";
const RESPONDER_SALT: [u8; 4] = *b"R2I\0";

impl Session {
    fn derive(
        shared_secret: &[u8],
        transcript: &[u8],
        role: Role,
    ) -> Result<(Session, [u8; 16], [u8; 16]), SecureError> {
        let hk = Hkdf::<Sha256>::new(None, shared_secret);
        let mut okm = [0u8; 96];
        hk.expand(transcript, &mut okm).map_err(|_| SecureError::DerivationFailed)?;
        let mut key_i2r = [0u8; 32];
        let mut key_r2i = [0u8; 32];
        let mut confirm_key = [0u8; 32];
        key_i2r.copy_from_slice(&okm[..32]);
        key_r2i.copy_from_slice(&okm[32..64]);
        confirm_key.copy_from_slice(&okm[64..96]);

        let initiator_confirm = confirm_tag(&confirm_key, b"initiator-confirm");
        let responder_confirm = confirm_tag(&confirm_key, b"responder-confirm");

        let (send_key, recv_key, send_salt, recv_salt, own_confirm, peer_confirm) = match role {
            Role::Initiator => (
                key_i2r,
                key_r2i,
                INITIATOR_SALT,
                RESPONDER_SALT,
                initiator_confirm,
                responder_confirm,
            ),
            Role::Responder => (
                key_r2i,
                key_i2r,
                RESPONDER_SALT,
                INITIATOR_SALT,
                responder_confirm,
                initiator_confirm,
            ),
        };

        Ok((
            Session {
                send_key,
                recv_key,
                send_salt,
                recv_salt,
                send_counter: 0,
                highest_recv_counter: None,
            },
            own_confirm,
            peer_confirm,
        ))
    }

    fn nonce_bytes(counter: u64, salt: [u8; 4]) -> [u8; 12] {
        let mut nonce = [0u8; 12];
        nonce[..8].copy_from_slice(&counter.to_le_bytes());
        nonce[8..].copy_from_slice(&salt);
        nonce
    }

    /// Seals `plaintext`, consuming the next send counter value. Counters
    /// never repeat for the lifetime of the session.
    pub fn seal(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, SecureError> {
        let counter = self.send_counter;
        self.send_counter = self.send_counter.checked_add(1).ok_or(SecureError::NonceExhausted)?;
        let cipher = Aes256Gcm::new_from_slice(&self.send_key).map_err(|_| SecureError::SealFailed)?;
        let nonce_bytes = Self::nonce_bytes(counter, self.send_salt);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
            .map_err(|_| SecureError::SealFailed)?;
        let mut out = Vec::with_capacity(8 + ciphertext.len());
        out.extend_from_slice(&counter.to_le_bytes());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Opens a peer-sealed message. Rejects any counter at or below the
    /// highest one already accepted, so a captured frame can't be replayed.
    pub fn open(&mut self, sealed: &[u8]) -> Result<Vec<u8>, SecureError> {
        if sealed.len() < 8 {
            return Err(SecureError::SealFailed);
        }
        let (counter_bytes, ciphertext) = sealed.split_at(8);
        let counter = u64::from_le_bytes(counter_bytes.try_into().unwrap());
        if let Some(highest) = self.highest_recv_counter {
            if counter <= highest {
                return Err(SecureError::SealFailed);
            }
        }
        let cipher = Aes256Gcm::new_from_slice(&self.recv_key).map_err(|_| SecureError::SealFailed)?;
        let nonce_bytes = Self::nonce_bytes(counter, self.recv_salt);
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext)
            .map_err(|_| SecureError::SealFailed)?;
        self.highest_recv_counter = Some(counter);
        Ok(plaintext)
    }
}

fn confirm_tag(key: &[u8; 32], label: &[u8]) -> [u8; 16] {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(label);
    let tag = mac.finalize().into_bytes();
    let mut out = [0u8; 16];
    out.copy_from_slice(&tag[..16]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use p256::ecdsa::SigningKey;

    struct CountingRng(u8);
    impl SecureRandom for CountingRng {
        fn fill_bytes(&mut self, buf: &mut [u8]) {
            for b in buf {
                self.0 = self.0.wrapping_add(1);
                *b = self.0;
            }
        }
    }

    fn attestation_pair(seed: u8) -> ([u8; 32], [u8; 33]) {
        let sk = [seed; 32];
        let signing = SigningKey::from_bytes(p256::FieldBytes::from_slice(&sk)).unwrap();
        let verify = signing.verifying_key().to_encoded_point(true);
        let mut vk = [0u8; 33];
        vk.copy_from_slice(verify.as_bytes());
        (sk, vk)
    }

    #[test]
    fn handshake_establishes_matching_sessions() {
        let (attestation_sk, attestation_vk) = attestation_pair(11);
        let initiator = HandshakeInitiator::begin(&mut CountingRng(1));
        let (mut responder_session, reply, expected_initiator_confirm) =
            respond(&mut CountingRng(100), initiator.public, &attestation_sk).unwrap();
        let (mut initiator_session, initiator_confirm) = initiator
            .finish(reply.public, &reply.signature, &reply.confirmation, &attestation_vk)
            .unwrap();
        assert_eq!(initiator_confirm, expected_initiator_confirm);

        let sealed = initiator_session.seal(b"hello responder").unwrap();
        let opened = responder_session.open(&sealed).unwrap();
        assert_eq!(opened, b"hello responder");
    }

    #[test]
    fn replayed_counter_is_rejected() {
        let (attestation_sk, attestation_vk) = attestation_pair(22);
        let initiator = HandshakeInitiator::begin(&mut CountingRng(2));
        let (mut responder_session, reply, _expected_initiator_confirm) =
            respond(&mut CountingRng(101), initiator.public, &attestation_sk).unwrap();
        let (mut initiator_session, _) = initiator
            .finish(reply.public, &reply.signature, &reply.confirmation, &attestation_vk)
            .unwrap();

        let sealed = initiator_session.seal(b"one").unwrap();
        responder_session.open(&sealed).unwrap();
        assert!(responder_session.open(&sealed).is_err());
    }

    #[test]
    fn wrong_attestation_key_fails_verification() {
        let (wrong_sk, _wrong_vk) = attestation_pair(33);
        let (_another_sk, another_vk) = attestation_pair(44);
        let initiator = HandshakeInitiator::begin(&mut CountingRng(3));
        let (_responder_session, reply, _expected_initiator_confirm) =
            respond(&mut CountingRng(102), initiator.public, &wrong_sk).unwrap();
        assert!(initiator
            .finish(reply.public, &reply.signature, &reply.confirmation, &another_vk)
            .is_err());
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Key manager: BIP32 signing, CSEK sealing, attestation, and the
//! secure-channel handshake (`spec.md` §4.4).
//!
//! Every operation but `hardware_attestation` and `secure_channel_establish`
//! requires `is_authenticated`; callers pass the `SecureBool` read from
//! `auth` on every call rather than this crate caching its own copy, since
//! authentication state is `auth`'s, not this task's.

pub mod bip32;

use abi::SecureBool;
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use ed25519_dalek::Signer as _;
use glitch::{secure_bool_is_true, GlitchDelay};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{Signature as K256Signature, SigningKey as K256SigningKey};
use p256::ecdsa::signature::Signer as P256Signer;
use p256::ecdsa::{Signature as P256Signature, SigningKey as P256SigningKey};
use sha2::{Digest, Sha256};
use std::sync::{Condvar, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMgrError {
    Unauthenticated,
    InvalidInput,
    DerivationFailed,
    SigningFailed,
    PolicyViolation,
}

fn require_authenticated<D: GlitchDelay>(
    delay: &mut D,
    authenticated: SecureBool,
) -> Result<(), KeyMgrError> {
    match secure_bool_is_true(delay, authenticated) {
        Ok(true) => Ok(()),
        _ => Err(KeyMgrError::Unauthenticated),
    }
}

#[derive(Debug, Clone)]
pub struct KeyDescriptor {
    pub xpub: String,
    pub fingerprint: [u8; 4],
    pub path: String,
}

/// §4.4 `derive_key_descriptor`.
pub fn derive_key_descriptor<D: GlitchDelay>(
    delay: &mut D,
    authenticated: SecureBool,
    seed: &[u8],
    path: &str,
    mainnet: bool,
) -> Result<KeyDescriptor, KeyMgrError> {
    require_authenticated(delay, authenticated)?;
    let key = bip32::derive(seed, path).map_err(|_| KeyMgrError::DerivationFailed)?;
    let pubkey =
        bip32::public_key_compressed(&key.scalar).ok_or(KeyMgrError::DerivationFailed)?;
    let xpub = bip32::serialize_xpub(&key, mainnet).map_err(|_| KeyMgrError::DerivationFailed)?;
    Ok(KeyDescriptor {
        xpub,
        fingerprint: {
            let sha = sha2::Sha256::digest(pubkey);
            let ripe = ripemd::Ripemd160::digest(sha);
            let mut out = [0u8; 4];
            out.copy_from_slice(&ripe[..4]);
            out
        },
        path: path.to_string(),
    })
}

/// §4.4 `derive_key_descriptor_and_sign`: synchronous BIP32 derive + ECDSA
/// sign of a prehashed 32-byte digest.
pub fn derive_key_descriptor_and_sign<D: GlitchDelay>(
    delay: &mut D,
    authenticated: SecureBool,
    seed: &[u8],
    path: &str,
    hash32: &[u8; 32],
) -> Result<[u8; 64], KeyMgrError> {
    require_authenticated(delay, authenticated)?;
    let key = bip32::derive(seed, path).map_err(|_| KeyMgrError::DerivationFailed)?;
    let signing_key = K256SigningKey::from_bytes(k256::FieldBytes::from_slice(&key.scalar))
        .map_err(|_| KeyMgrError::DerivationFailed)?;
    let sig: K256Signature = signing_key
        .sign_prehash(hash32)
        .map_err(|_| KeyMgrError::SigningFailed)?;
    let mut out = [0u8; 64];
    out.copy_from_slice(&sig.to_bytes());
    Ok(out)
}

/// §4.4 `seal_csek` / `unseal_csek`: AES-256-GCM wrap under an internal key
/// that never leaves the device. Output is `nonce(12) || ciphertext+tag`.
pub fn seal_csek(
    wrapping_key: &[u8; 32],
    csek: &[u8; 32],
    nonce: &[u8; 12],
) -> Result<Vec<u8>, KeyMgrError> {
    let cipher =
        Aes256Gcm::new_from_slice(wrapping_key).map_err(|_| KeyMgrError::InvalidInput)?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(nonce), csek.as_slice())
        .map_err(|_| KeyMgrError::SigningFailed)?;
    let mut out = Vec::with_capacity(12 + ciphertext.len());
    out.extend_from_slice(nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

pub fn unseal_csek(wrapping_key: &[u8; 32], wrapped: &[u8]) -> Result<[u8; 32], KeyMgrError> {
    if wrapped.len() < 12 {
        return Err(KeyMgrError::InvalidInput);
    }
    let (nonce, ciphertext) = wrapped.split_at(12);
    let cipher =
        Aes256Gcm::new_from_slice(wrapping_key).map_err(|_| KeyMgrError::InvalidInput)?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| KeyMgrError::SigningFailed)?;
    plaintext.try_into().map_err(|_| KeyMgrError::InvalidInput)
}

/// §4.4 `hardware_attestation` (unauthenticated): signs `nonce` with the
/// factory-provisioned attestation key.
pub fn hardware_attestation(
    attestation_key: &[u8; 32],
    nonce: &[u8],
) -> Result<[u8; 64], KeyMgrError> {
    let signing_key = P256SigningKey::from_bytes(p256::FieldBytes::from_slice(attestation_key))
        .map_err(|_| KeyMgrError::SigningFailed)?;
    let sig: P256Signature = signing_key.sign(nonce);
    let mut out = [0u8; 64];
    out.copy_from_slice(&sig.to_bytes());
    Ok(out)
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

pub struct SecureChannelResponse {
    pub device_pubkey: [u8; 32],
    pub exchange_signature: [u8; 64],
    pub confirmation_tag: [u8; 16],
    pub session_key: [u8; 32],
}

/// Version bound into the handshake transcript so a future incompatible
/// wire change can't be replayed against an old signature.
pub const PROTOCOL_VERSION: u16 = 1;

/// §4.4 `secure_channel_establish` (unauthenticated): ephemeral X25519 +
/// HKDF-SHA256 + a signature over the transcript binding both public keys.
/// Per the handshake's external-interface contract, the signed transcript
/// is `pk_host ‖ pk_device ‖ protocol_version`, in that order.
pub fn secure_channel_establish(
    rng: &mut impl SecureRandom,
    long_term_signing_key: &[u8; 32],
    host_pubkey: &[u8; 32],
) -> Result<SecureChannelResponse, KeyMgrError> {
    let mut adapter = RngAdapter(rng);
    let ephemeral = x25519_dalek::EphemeralSecret::random_from_rng(&mut adapter);
    let device_pubkey = x25519_dalek::PublicKey::from(&ephemeral);
    let shared = ephemeral.diffie_hellman(&x25519_dalek::PublicKey::from(*host_pubkey));

    let mut transcript = Vec::with_capacity(66);
    transcript.extend_from_slice(host_pubkey);
    transcript.extend_from_slice(device_pubkey.as_bytes());
    transcript.extend_from_slice(&PROTOCOL_VERSION.to_le_bytes());

    let hk = Hkdf::<Sha256>::new(None, shared.as_bytes());
    let mut okm = [0u8; 64];
    hk.expand(&transcript, &mut okm)
        .map_err(|_| KeyMgrError::DerivationFailed)?;
    let mut session_key = [0u8; 32];
    session_key.copy_from_slice(&okm[..32]);
    let mut confirmation_key = [0u8; 32];
    confirmation_key.copy_from_slice(&okm[32..]);

    let signing_key =
        P256SigningKey::from_bytes(p256::FieldBytes::from_slice(long_term_signing_key))
            .map_err(|_| KeyMgrError::SigningFailed)?;
    let sig: P256Signature = signing_key.sign(&transcript);
    let mut exchange_signature = [0u8; 64];
    exchange_signature.copy_from_slice(&sig.to_bytes());

    let mut mac = Hmac::<Sha256>::new_from_slice(&confirmation_key)
        .expect("HMAC accepts any key length");
    mac.update(b"key-confirm");
    let tag = mac.finalize().into_bytes();
    let mut confirmation_tag = [0u8; 16];
    confirmation_tag.copy_from_slice(&tag[..16]);

    Ok(SecureChannelResponse {
        device_pubkey: *device_pubkey.as_bytes(),
        exchange_signature,
        confirmation_tag,
        session_key,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubkeyCurve {
    P256,
    Ed25519,
}

/// §4.4 `derive_public_key` / `derive_public_key_and_sign`: HKDF-based
/// subkey derivation (not BIP32), keyed off an opaque `label` rather than a
/// numeric index.
pub fn derive_public_key<D: GlitchDelay>(
    delay: &mut D,
    authenticated: SecureBool,
    base_secret: &[u8],
    curve: SubkeyCurve,
    label: &[u8],
) -> Result<Vec<u8>, KeyMgrError> {
    require_authenticated(delay, authenticated)?;
    let seed = hkdf_subkey_seed(base_secret, label)?;
    match curve {
        SubkeyCurve::P256 => {
            let signing_key = P256SigningKey::from_bytes(p256::FieldBytes::from_slice(&seed))
                .map_err(|_| KeyMgrError::DerivationFailed)?;
            Ok(signing_key
                .verifying_key()
                .to_encoded_point(true)
                .as_bytes()
                .to_vec())
        }
        SubkeyCurve::Ed25519 => {
            let signing_key = ed25519_dalek::SigningKey::from_bytes(&seed);
            Ok(signing_key.verifying_key().to_bytes().to_vec())
        }
    }
}

pub fn derive_public_key_and_sign<D: GlitchDelay>(
    delay: &mut D,
    authenticated: SecureBool,
    base_secret: &[u8],
    curve: SubkeyCurve,
    label: &[u8],
    hash32: &[u8; 32],
) -> Result<Vec<u8>, KeyMgrError> {
    require_authenticated(delay, authenticated)?;
    let seed = hkdf_subkey_seed(base_secret, label)?;
    match curve {
        SubkeyCurve::P256 => {
            let signing_key = P256SigningKey::from_bytes(p256::FieldBytes::from_slice(&seed))
                .map_err(|_| KeyMgrError::DerivationFailed)?;
            let sig: P256Signature = signing_key
                .sign_prehash(hash32)
                .map_err(|_| KeyMgrError::SigningFailed)?;
            Ok(sig.to_bytes().to_vec())
        }
        SubkeyCurve::Ed25519 => {
            let signing_key = ed25519_dalek::SigningKey::from_bytes(&seed);
            let sig = signing_key.sign(hash32);
            Ok(sig.to_bytes().to_vec())
        }
    }
}

fn hkdf_subkey_seed(base_secret: &[u8], label: &[u8]) -> Result<[u8; 32], KeyMgrError> {
    let hk = Hkdf::<Sha256>::new(None, base_secret);
    let mut seed = [0u8; 32];
    hk.expand(label, &mut seed)
        .map_err(|_| KeyMgrError::DerivationFailed)?;
    Ok(seed)
}

/// Template-update rate limit (§4.4): refresh is skipped if the feature flag
/// is off; performed unconditionally the first time (no `stored_last_update`
/// yet); otherwise gated on the host timestamp having advanced by at least
/// three days. A host timestamp that regresses relative to `stored_last_update`
/// is treated as "not yet due", never as an error — see DESIGN.md.
pub fn should_refresh_template(
    feature_enabled: bool,
    host_timestamp: Option<u64>,
    stored_last_update: Option<u64>,
) -> bool {
    const THREE_DAYS_SECS: u64 = 3 * 24 * 60 * 60;
    if !feature_enabled {
        return false;
    }
    match (host_timestamp, stored_last_update) {
        (_, None) => true,
        (Some(host_ts), Some(last)) => host_ts.saturating_sub(last) >= THREE_DAYS_SECS,
        (None, Some(_)) => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Waiting,
    InProgress,
    Success,
    Error,
    DerivationFailed,
    SigningFailed,
    PolicyViolation,
}

#[derive(Clone)]
struct WorkerJob {
    path: String,
    hash: [u8; 32],
}

struct WorkerState {
    status: WorkerStatus,
    job: Option<WorkerJob>,
    signature: Option<[u8; 64]>,
}

/// The async crypto worker (§4.4): BIP32 derive+sign runs on a dedicated
/// thread because it takes long enough (~100 ms) to trip some phones' NFC
/// read timeouts if done inline. The foreground task posts a job and
/// immediately answers the host with `Waiting`; the host polls
/// `status()` and, once `Success`, must present the same path and hash it
/// originally requested for `take_signature` to hand back the result.
pub struct CryptoWorker {
    state: Mutex<WorkerState>,
    cv: Condvar,
}

impl Default for CryptoWorker {
    fn default() -> Self {
        Self::new()
    }
}

impl CryptoWorker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WorkerState {
                status: WorkerStatus::Waiting,
                job: None,
                signature: None,
            }),
            cv: Condvar::new(),
        }
    }

    pub fn submit(&self, path: String, hash: [u8; 32]) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.job = Some(WorkerJob { path, hash });
        state.signature = None;
        state.status = WorkerStatus::InProgress;
        self.cv.notify_all();
    }

    pub fn status(&self) -> WorkerStatus {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).status
    }

    /// Blocks the worker thread until a job is posted, then runs it. Meant
    /// to be called in a loop from the matcher-thread-style dedicated task.
    pub fn run_once(&self, seed: &[u8]) {
        let job = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            while !matches!(state.status, WorkerStatus::InProgress) {
                state = self.cv.wait(state).unwrap_or_else(|e| e.into_inner());
            }
            state.job.clone().expect("InProgress implies a job is set")
        };
        let mut dummy_delay = glitch::SpinDelay::new(0xC0FF_EE);
        let result = derive_key_descriptor_and_sign(
            &mut dummy_delay,
            SecureBool::TRUE,
            seed,
            &job.path,
            &job.hash,
        );
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        match result {
            Ok(sig) => {
                state.signature = Some(sig);
                state.status = WorkerStatus::Success;
            }
            Err(KeyMgrError::DerivationFailed) => state.status = WorkerStatus::DerivationFailed,
            Err(KeyMgrError::SigningFailed) => state.status = WorkerStatus::SigningFailed,
            Err(KeyMgrError::PolicyViolation) => state.status = WorkerStatus::PolicyViolation,
            Err(_) => state.status = WorkerStatus::Error,
        }
    }

    /// Copies the signature out only if `path`/`hash` match the job that
    /// produced it, then clears the slot so it can never be retrieved twice.
    pub fn take_signature(&self, path: &str, hash: &[u8; 32]) -> Option<[u8; 64]> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !matches!(state.status, WorkerStatus::Success) {
            return None;
        }
        let matches_job = state
            .job
            .as_ref()
            .map(|j| j.path == path && &j.hash == hash)
            .unwrap_or(false);
        if !matches_job {
            return None;
        }
        let sig = state.signature.take();
        state.job = None;
        state.status = WorkerStatus::Waiting;
        sig
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glitch::SpinDelay;

    struct CountingRng(u8);
    impl SecureRandom for CountingRng {
        fn fill_bytes(&mut self, buf: &mut [u8]) {
            for b in buf {
                self.0 = self.0.wrapping_add(1);
                *b = self.0;
            }
        }
    }

    #[test]
    fn gated_operation_rejects_when_unauthenticated() {
        let mut delay = SpinDelay::new(1);
        let result = derive_key_descriptor(
            &mut delay,
            SecureBool::FALSE,
            &[1u8; 32],
            "m/44'",
            true,
        );
        assert_eq!(result.unwrap_err(), KeyMgrError::Unauthenticated);
    }

    #[test]
    fn seal_then_unseal_roundtrips() {
        let key = [9u8; 32];
        let csek = [5u8; 32];
        let nonce = [1u8; 12];
        let wrapped = seal_csek(&key, &csek, &nonce).unwrap();
        let recovered = unseal_csek(&key, &wrapped).unwrap();
        assert_eq!(recovered, csek);
    }

    #[test]
    fn unseal_with_wrong_key_fails() {
        let key = [9u8; 32];
        let other_key = [8u8; 32];
        let csek = [5u8; 32];
        let nonce = [1u8; 12];
        let wrapped = seal_csek(&key, &csek, &nonce).unwrap();
        assert!(unseal_csek(&other_key, &wrapped).is_err());
    }

    #[test]
    fn secure_channel_establish_is_unauthenticated_and_deterministic_session() {
        let mut rng1 = CountingRng(0);
        let mut rng2 = CountingRng(0);
        let long_term = [3u8; 32];
        let host_pub = x25519_dalek::PublicKey::from(
            x25519_dalek::StaticSecret::from([4u8; 32]),
        );
        let resp1 =
            secure_channel_establish(&mut rng1, &long_term, host_pub.as_bytes()).unwrap();
        let resp2 =
            secure_channel_establish(&mut rng2, &long_term, host_pub.as_bytes()).unwrap();
        assert_eq!(resp1.session_key, resp2.session_key);
        assert_eq!(resp1.confirmation_tag, resp2.confirmation_tag);
    }

    #[test]
    fn template_refresh_rate_limit() {
        assert!(!should_refresh_template(false, Some(1_000_000), None));
        assert!(should_refresh_template(true, Some(1_000_000), None));
        assert!(!should_refresh_template(
            true,
            Some(1_000),
            Some(900) // under 3 days later
        ));
        assert!(should_refresh_template(
            true,
            Some(1_000_000),
            Some(1) // well over 3 days later
        ));
        assert!(!should_refresh_template(true, Some(1), Some(1_000_000))); // regression
    }

    #[test]
    fn crypto_worker_take_signature_requires_matching_request() {
        let worker = CryptoWorker::new();
        let seed = [6u8; 32];
        worker.submit("m/44'/0'".to_string(), [1u8; 32]);
        worker.run_once(&seed);
        assert_eq!(worker.status(), WorkerStatus::Success);
        assert!(worker
            .take_signature("m/44'/0'", &[2u8; 32])
            .is_none());
        assert!(worker.take_signature("m/44'/0'", &[1u8; 32]).is_some());
        // One-shot: a second take fails even with the right arguments.
        assert!(worker.take_signature("m/44'/0'", &[1u8; 32]).is_none());
    }
}

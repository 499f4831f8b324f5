// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `nfc::ProtoRouter` for the Core MCU: one dispatch arm per `ProtoTag`,
//! decoding the command payload with `crate::wire`'s TLV helpers and
//! calling straight into the library crate each tag belongs to.
//!
//! All 35 tags currently route to `McuRole::Core` (`ProtoTag::mcu_role`),
//! so `fwup::route_if_not_core` never actually forwards from here; the
//! `CoprocForwarder` impl exists for the seam's sake, not because this
//! build exercises it.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use abi::{McuRole, ProtoTag, ResetReason, SecureBool};
use fwup::{CoprocForwarder, FwupEngine, FwupError, FwupMode};
use glitch::SpinDelay;
use keymgr::{KeyMgrError, SubkeyCurve};
use nfc::ProtoRouter;
use sysinfo::{Slot, Sysinfo, SysinfoError};
use unlock::{CheckSecretResult, LimitResponse, UnlockError};

use crate::config::{AUTH_EXPIRY_MS, FINGERPRINT_MAX_ENROLL_ATTEMPTS, FINGERPRINT_RATE_LIMIT_MS};
use crate::effects::{Clock, CoreAuth, CoreEffects};
use crate::feature_flags::{FeatureFlag, FeatureFlags};
use crate::fwup_writer::FileImageWriter;
use crate::keys::{DeviceKeys, OsEntropy};
use crate::sysinfo_backend::{encode_metadata, FileMetadataSource, FileTelemetryStore, KeyedSecureElement};
use crate::wire::{push_field, push_str, take_field, take_n, take_str};
use std::path::PathBuf;

type CoreSysinfo = Sysinfo<FileMetadataSource, KeyedSecureElement<'static>, FileTelemetryStore>;

pub struct CoreProtoRouter {
    auth: Arc<Mutex<CoreAuth>>,
    fwup: Arc<Mutex<FwupEngine<FileImageWriter>>>,
    sysinfo: Arc<Mutex<CoreSysinfo>>,
    feature_flags: FeatureFlags,
    effects: CoreEffects,
    clock: Clock,
    keys: &'static DeviceKeys,
    delay_seed: AtomicU32,
    cal_path: PathBuf,
}

impl CoreProtoRouter {
    pub fn new(
        auth: Arc<Mutex<CoreAuth>>,
        fwup: Arc<Mutex<FwupEngine<FileImageWriter>>>,
        sysinfo: Arc<Mutex<CoreSysinfo>>,
        feature_flags: FeatureFlags,
        effects: CoreEffects,
        clock: Clock,
        keys: &'static DeviceKeys,
        cal_path: PathBuf,
    ) -> Self {
        Self {
            auth,
            fwup,
            sysinfo,
            feature_flags,
            effects,
            clock,
            keys,
            delay_seed: AtomicU32::new(1),
            cal_path,
        }
    }

    /// Each glitch-checked call gets its own delay instance so consecutive
    /// checks within one dispatch don't share correlated timing.
    fn delay(&self) -> SpinDelay {
        let seed = self.delay_seed.fetch_add(0x9E37_79B9, Ordering::Relaxed);
        SpinDelay::new(seed | 1)
    }

    fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    fn authenticated_bool(&self) -> Option<bool> {
        let auth = self.auth.lock().unwrap_or_else(|e| e.into_inner());
        let mut delay = self.delay();
        auth.query_authentication(&mut delay).ok()
    }

    fn authenticated_secure_bool(&self) -> SecureBool {
        self.auth.lock().unwrap_or_else(|e| e.into_inner()).authenticated_secure_bool()
    }

    /// A `GlitchDetected` anywhere is fatal: reset immediately rather than
    /// answer the command. Returns `None` so the caller sends no response.
    fn fault_reset(&mut self) -> Option<Vec<u8>> {
        self.effects.schedule_reset(0, ResetReason::Fault);
        None
    }
}

impl CoprocForwarder for CoreProtoRouter {
    fn forward(&mut self, _tag: ProtoTag, _payload: &[u8]) {
        // Never reached while every `ProtoTag::mcu_role()` is `Core`; the
        // real transport lives in `uc::Channel` once a non-Core tag exists.
    }
}

fn encode_unlock_error(e: UnlockError) -> u8 {
    match e {
        UnlockError::AlreadyProvisioned => 1,
        UnlockError::StorageErr => 2,
    }
}

fn encode_check_secret_result(buf: &mut Vec<u8>, result: CheckSecretResult) {
    match result {
        CheckSecretResult::Ok => buf.push(0),
        CheckSecretResult::WrongSecret { remaining_delay_ms } => {
            buf.push(1);
            buf.extend_from_slice(&remaining_delay_ms.to_le_bytes());
        }
        CheckSecretResult::NoSecretProvisioned => buf.push(2),
        CheckSecretResult::WaitingOnDelay { remaining_delay_ms } => {
            buf.push(3);
            buf.extend_from_slice(&remaining_delay_ms.to_le_bytes());
        }
        CheckSecretResult::StorageErr => buf.push(4),
    }
}

fn encode_keymgr_error(e: KeyMgrError) -> u8 {
    match e {
        KeyMgrError::Unauthenticated => 1,
        KeyMgrError::InvalidInput => 2,
        KeyMgrError::DerivationFailed => 3,
        KeyMgrError::SigningFailed => 4,
        KeyMgrError::PolicyViolation => 5,
    }
}

fn encode_fwup_error(e: FwupError) -> u8 {
    match e {
        FwupError::InvalidState => 1,
        FwupError::InvalidRole => 2,
        FwupError::SequenceGap => 3,
        FwupError::OutOfRange => 4,
        FwupError::WriteFailed => 5,
    }
}

fn decode_mode(byte: u8) -> Option<FwupMode> {
    match byte {
        0 => Some(FwupMode::Normal),
        1 => Some(FwupMode::Delta),
        2 => Some(FwupMode::DeltaOneshot),
        _ => None,
    }
}

fn decode_role(byte: u8) -> Option<McuRole> {
    match byte {
        0 => Some(McuRole::Core),
        1 => Some(McuRole::Uxc),
        _ => None,
    }
}

fn decode_curve(byte: u8) -> Option<SubkeyCurve> {
    match byte {
        0 => Some(SubkeyCurve::P256),
        1 => Some(SubkeyCurve::Ed25519),
        _ => None,
    }
}

fn encode_slot(slot: Slot) -> u8 {
    match slot {
        Slot::Bootloader => 0,
        Slot::SlotA => 1,
        Slot::SlotB => 2,
    }
}

fn decode_slot(byte: u8) -> Option<Slot> {
    match byte {
        0 => Some(Slot::Bootloader),
        1 => Some(Slot::SlotA),
        2 => Some(Slot::SlotB),
        _ => None,
    }
}

impl ProtoRouter for CoreProtoRouter {
    fn proto_route(&mut self, tag: ProtoTag, command: &[u8]) -> Option<Vec<u8>> {
        match tag {
            ProtoTag::StartFingerprintEnrollment => {
                self.auth.lock().unwrap_or_else(|e| e.into_inner()).start_fingerprint_enrollment();
                Some(Vec::new())
            }

            ProtoTag::GetFingerprintEnrollmentStatus => {
                let (status, state) = self
                    .auth
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .fingerprint_enrollment_status();
                let mut buf = Vec::with_capacity(3);
                buf.push(match status {
                    auth::EnrollmentStatus::NotInProgress => 0,
                    auth::EnrollmentStatus::Incomplete => 1,
                    auth::EnrollmentStatus::Complete => 2,
                });
                buf.push(state.pass_count);
                buf.push(state.fail_count);
                Some(buf)
            }

            ProtoTag::QueryAuthentication => match self.authenticated_bool() {
                Some(authed) => Some(vec![authed as u8]),
                None => self.fault_reset(),
            },

            ProtoTag::SendUnlockSecret => {
                let (secret, _) = take_field(command)?;
                let now = self.now_ms();
                let mut delay = self.delay();
                let mut auth = self.auth.lock().unwrap_or_else(|e| e.into_inner());
                let mut effects = self.effects.clone();
                let result = auth.send_unlock_secret(&mut delay, now, AUTH_EXPIRY_MS, secret, &mut effects);
                drop(auth);
                match result {
                    Ok(result) => {
                        let mut buf = Vec::new();
                        encode_check_secret_result(&mut buf, result);
                        Some(buf)
                    }
                    Err(_) => self.fault_reset(),
                }
            }

            ProtoTag::ProvisionUnlockSecret => {
                let (secret, _) = take_field(command)?;
                let result =
                    self.auth.lock().unwrap_or_else(|e| e.into_inner()).provision_unlock_secret(secret);
                Some(vec![result.err().map(encode_unlock_error).unwrap_or(0)])
            }

            ProtoTag::ConfigureUnlockLimitResponse => {
                let byte = *command.first()?;
                let response = match byte {
                    0 => LimitResponse::Delay,
                    1 => LimitResponse::WipeState,
                    _ => return Some(vec![255]),
                };
                let result = self
                    .auth
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .configure_unlock_limit_response(response);
                Some(vec![result.err().map(encode_unlock_error).unwrap_or(0)])
            }

            ProtoTag::DeriveKeyDescriptor => {
                let (path, rest) = take_str(command)?;
                let mainnet = *rest.first()? != 0;
                let authenticated = self.authenticated_secure_bool();
                let mut delay = self.delay();
                let result = keymgr::derive_key_descriptor(
                    &mut delay,
                    authenticated,
                    &self.keys.seed,
                    &path,
                    mainnet,
                );
                let mut buf = Vec::new();
                match result {
                    Ok(desc) => {
                        buf.push(0);
                        push_str(&mut buf, &desc.xpub);
                        buf.extend_from_slice(&desc.fingerprint);
                    }
                    Err(e) => buf.push(encode_keymgr_error(e)),
                }
                Some(buf)
            }

            ProtoTag::DeriveKeyDescriptorAndSign => {
                let (path, rest) = take_str(command)?;
                let (hash, _) = take_n(rest, 32)?;
                let hash32: [u8; 32] = hash.try_into().ok()?;
                let authenticated = self.authenticated_secure_bool();
                let mut delay = self.delay();
                let result = keymgr::derive_key_descriptor_and_sign(
                    &mut delay,
                    authenticated,
                    &self.keys.seed,
                    &path,
                    &hash32,
                );
                let mut buf = Vec::new();
                match result {
                    Ok(sig) => {
                        buf.push(0);
                        buf.extend_from_slice(&sig);
                    }
                    Err(e) => buf.push(encode_keymgr_error(e)),
                }
                Some(buf)
            }

            ProtoTag::SealCsek => {
                let (csek, rest) = take_n(command, 32)?;
                let (nonce, _) = take_n(rest, 12)?;
                let csek32: [u8; 32] = csek.try_into().ok()?;
                let nonce12: [u8; 12] = nonce.try_into().ok()?;
                let mut buf = Vec::new();
                match keymgr::seal_csek(&self.keys.wrapping_key, &csek32, &nonce12) {
                    Ok(wrapped) => {
                        buf.push(0);
                        push_field(&mut buf, &wrapped);
                    }
                    Err(e) => buf.push(encode_keymgr_error(e)),
                }
                Some(buf)
            }

            ProtoTag::UnsealCsek => {
                let (wrapped, _) = take_field(command)?;
                let mut buf = Vec::new();
                match keymgr::unseal_csek(&self.keys.wrapping_key, wrapped) {
                    Ok(csek) => {
                        buf.push(0);
                        buf.extend_from_slice(&csek);
                    }
                    Err(e) => buf.push(encode_keymgr_error(e)),
                }
                Some(buf)
            }

            ProtoTag::HardwareAttestation => {
                let (nonce, _) = take_field(command)?;
                let mut buf = Vec::new();
                match keymgr::hardware_attestation(&self.keys.device_identity_key, nonce) {
                    Ok(sig) => {
                        buf.push(0);
                        buf.extend_from_slice(&sig);
                    }
                    Err(e) => buf.push(encode_keymgr_error(e)),
                }
                Some(buf)
            }

            ProtoTag::SecureChannelEstablish => {
                let (host_pubkey, _) = take_n(command, 32)?;
                let host_pubkey32: [u8; 32] = host_pubkey.try_into().ok()?;
                let mut rng = OsEntropy;
                let mut buf = Vec::new();
                match keymgr::secure_channel_establish(
                    &mut rng,
                    &self.keys.device_identity_key,
                    &host_pubkey32,
                ) {
                    Ok(resp) => {
                        buf.push(0);
                        buf.extend_from_slice(&resp.device_pubkey);
                        buf.extend_from_slice(&resp.exchange_signature);
                        buf.extend_from_slice(&resp.confirmation_tag);
                        // `resp.session_key` stays device-side; it seeds the
                        // AEAD layer the transport above `uc`/NFC would use,
                        // not implemented by this dispatch.
                    }
                    Err(e) => buf.push(encode_keymgr_error(e)),
                }
                Some(buf)
            }

            ProtoTag::DerivePublicKey => {
                let curve = decode_curve(*command.first()?)?;
                let (label, _) = take_field(&command[1..])?;
                let authenticated = self.authenticated_secure_bool();
                let mut delay = self.delay();
                let result =
                    keymgr::derive_public_key(&mut delay, authenticated, &self.keys.seed, curve, label);
                let mut buf = Vec::new();
                match result {
                    Ok(pubkey) => {
                        buf.push(0);
                        push_field(&mut buf, &pubkey);
                    }
                    Err(e) => buf.push(encode_keymgr_error(e)),
                }
                Some(buf)
            }

            ProtoTag::DerivePublicKeyAndSign => {
                let curve = decode_curve(*command.first()?)?;
                let (label, rest) = take_field(&command[1..])?;
                let (hash, _) = take_n(rest, 32)?;
                let hash32: [u8; 32] = hash.try_into().ok()?;
                let authenticated = self.authenticated_secure_bool();
                let mut delay = self.delay();
                let result = keymgr::derive_public_key_and_sign(
                    &mut delay,
                    authenticated,
                    &self.keys.seed,
                    curve,
                    label,
                    &hash32,
                );
                let mut buf = Vec::new();
                match result {
                    Ok(sig) => {
                        buf.push(0);
                        push_field(&mut buf, &sig);
                    }
                    Err(e) => buf.push(encode_keymgr_error(e)),
                }
                Some(buf)
            }

            ProtoTag::FwupStart => {
                let target_role = decode_role(*command.first()?)?;
                let mode = decode_mode(*command.get(1)?)?;
                let (size_bytes, _) = take_n(&command[2..], 4)?;
                let total_size = u32::from_le_bytes(size_bytes.try_into().ok()?);
                let mut buf = Vec::new();
                let mut engine = self.fwup.lock().unwrap_or_else(|e| e.into_inner());
                match engine.fwup_start(McuRole::Core, target_role, mode, total_size) {
                    Ok(max_chunk) => {
                        buf.push(0);
                        buf.extend_from_slice(&(max_chunk as u32).to_le_bytes());
                    }
                    Err(e) => buf.push(encode_fwup_error(e)),
                }
                Some(buf)
            }

            ProtoTag::FwupTransfer => {
                let (seq_bytes, rest) = take_n(command, 4)?;
                let sequence_id = u32::from_le_bytes(seq_bytes.try_into().ok()?);
                let (off_bytes, rest) = take_n(rest, 4)?;
                let offset = u32::from_le_bytes(off_bytes.try_into().ok()?);
                let (bytes, _) = take_field(rest)?;
                let result =
                    self.fwup.lock().unwrap_or_else(|e| e.into_inner()).fwup_transfer(sequence_id, offset, bytes);
                Some(vec![result.err().map(encode_fwup_error).unwrap_or(0)])
            }

            ProtoTag::FwupFinish => {
                let outcome = self.fwup.lock().unwrap_or_else(|e| e.into_inner()).fwup_finish();
                let mut buf = Vec::new();
                match outcome {
                    Ok(outcome) => {
                        fwup::handle_finish_outcome(outcome, &mut self.effects);
                        buf.push(0);
                        buf.push(match outcome {
                            fwup::FinishOutcome::Success => 0,
                            fwup::FinishOutcome::WillApplyPatch => 1,
                            fwup::FinishOutcome::Error => 2,
                        });
                    }
                    Err(e) => buf.push(encode_fwup_error(e)),
                }
                Some(buf)
            }

            ProtoTag::Meta => {
                let slot = decode_slot(*command.first()?)?;
                let mut buf = Vec::new();
                match self.sysinfo.lock().unwrap_or_else(|e| e.into_inner()).metadata(slot) {
                    Ok(metadata) => {
                        buf.push(0);
                        buf.extend_from_slice(&encode_metadata(&metadata));
                    }
                    Err(SysinfoError::SlotInvalid) => buf.push(1),
                }
                Some(buf)
            }

            ProtoTag::DeviceId => {
                use sha2::{Digest, Sha256};
                let digest = Sha256::digest(self.keys.attestation_pubkey_compressed);
                Some(digest[..16].to_vec())
            }

            ProtoTag::WipeState => Some(vec![self.effects.wipe_requested() as u8]),

            ProtoTag::Fuel => {
                // No PMIC sample loop is wired in this build (see
                // `power::FuelGauge`'s undriven-seam note in DESIGN.md).
                Some(vec![100])
            }

            ProtoTag::CoredumpGet => {
                let coredump = self.sysinfo.lock().unwrap_or_else(|e| e.into_inner()).coredump();
                let mut buf = Vec::new();
                match coredump {
                    Some(bytes) => {
                        buf.push(1);
                        push_field(&mut buf, &bytes);
                    }
                    None => buf.push(0),
                }
                Some(buf)
            }

            ProtoTag::EventsGet => {
                let events = self.sysinfo.lock().unwrap_or_else(|e| e.into_inner()).events();
                let mut buf = Vec::new();
                push_field(&mut buf, &events);
                Some(buf)
            }

            ProtoTag::FeatureFlagsGet => {
                let flags = self.feature_flags.get_all();
                let bytes: Vec<u8> = flags.iter().map(|b| *b as u8).collect();
                let mut buf = Vec::new();
                push_field(&mut buf, &bytes);
                Some(buf)
            }

            ProtoTag::FeatureFlagsSet => {
                let index = *command.first()?;
                let value = *command.get(1)? != 0;
                match FeatureFlag::from_index(index as usize) {
                    Some(flag) => {
                        self.feature_flags.set(flag, value);
                        Some(vec![0])
                    }
                    None => Some(vec![1]),
                }
            }

            ProtoTag::TelemetryIdGet => {
                use hkdf::Hkdf;
                use sha2::Sha256;
                let hk = Hkdf::<Sha256>::new(None, &self.keys.device_identity_key);
                let mut id = [0u8; 16];
                if hk.expand(b"telemetry-id", &mut id).is_err() {
                    return Some(vec![]);
                }
                Some(id.to_vec())
            }

            ProtoTag::SecinfoGet => {
                let sysinfo = self.sysinfo.lock().unwrap_or_else(|e| e.into_inner());
                let pubkey = sysinfo.pubkey();
                let cert = sysinfo.cert();
                drop(sysinfo);
                let mut buf = Vec::new();
                buf.extend_from_slice(&pubkey);
                push_field(&mut buf, &cert);
                Some(buf)
            }

            ProtoTag::CertGet => {
                let cert = self.sysinfo.lock().unwrap_or_else(|e| e.into_inner()).cert();
                let mut buf = Vec::new();
                push_field(&mut buf, &cert);
                Some(buf)
            }

            ProtoTag::PubkeysGet => {
                let pubkey = self.sysinfo.lock().unwrap_or_else(|e| e.into_inner()).pubkey();
                let mut buf = Vec::new();
                buf.push(1);
                push_field(&mut buf, &pubkey);
                Some(buf)
            }

            ProtoTag::PubkeyGet => {
                let pubkey = self.sysinfo.lock().unwrap_or_else(|e| e.into_inner()).pubkey();
                let mut buf = Vec::new();
                push_field(&mut buf, &pubkey);
                Some(buf)
            }

            ProtoTag::FingerprintSettingsGet => {
                let auto_refresh = self.feature_flags.get(FeatureFlag::TemplateAutoRefresh);
                let mut buf = Vec::new();
                buf.push(auto_refresh as u8);
                buf.extend_from_slice(&FINGERPRINT_MAX_ENROLL_ATTEMPTS.to_le_bytes());
                buf.extend_from_slice(&FINGERPRINT_RATE_LIMIT_MS.to_le_bytes());
                Some(buf)
            }

            ProtoTag::CapTouchCal => {
                // Calibration data is opaque to this task; it's persisted
                // for whatever later owns the captouch driver to consume.
                let _ = std::fs::write(&self.cal_path, command);
                Some(vec![0])
            }

            ProtoTag::Empty => Some(Vec::new()),

            ProtoTag::DeviceInfo => {
                let info = self.sysinfo.lock().unwrap_or_else(|e| e.into_inner()).device_info();
                let mut buf = Vec::new();
                push_str(&mut buf, &info.serial);
                push_str(&mut buf, &info.assy_serial);
                push_str(&mut buf, &info.hw_revision);
                buf.push(encode_slot(info.active_slot));
                Some(buf)
            }

            ProtoTag::LockDevice => {
                let now = self.now_ms();
                let mut delay = self.delay();
                let mut effects = self.effects.clone();
                let result = self
                    .auth
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .set_authenticated(&mut delay, false, now, 0, &mut effects);
                match result {
                    Ok(()) => Some(vec![0]),
                    Err(_) => self.fault_reset(),
                }
            }
        }
    }
}

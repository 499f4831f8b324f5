// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared wire vocabulary for the IPC bus: ports, message references,
//! the secure boolean, and the proto command tag alphabet.
//!
//! This crate holds only types with no behaviour; the bus itself lives in
//! `ipc`, the tasks that own each port live in their own crates.

#![cfg_attr(not(test), no_std)]

use serde::{Deserialize, Serialize};

pub mod config;
pub use config::MAX_PROTO_SIZE;

/// Destination mailbox. Bound to exactly one queue at boot by `ipc::Bus`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Port {
    Nfc,
    Auth,
    Unlock,
    KeyManager,
    CryptoWorker,
    Fwup,
    Sysinfo,
    Captouch,
    Power,
    Ui,
    DisplayCtrl,
    Uc,
    Touch,
    Display,
    Mfgtest,
}

/// An integer whose only valid values are two widely separated bit
/// patterns. Every authentication branch must compare these with
/// `glitch::secure_compare`, never `==`, so a single bit flip induced by
/// fault injection cannot flip `false` into `true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SecureBool(u32);

impl SecureBool {
    pub const TRUE: SecureBool = SecureBool(0xA5A5_A5A5);
    pub const FALSE: SecureBool = SecureBool(0x5A5A_5A5A);

    pub fn from_bool(b: bool) -> Self {
        if b {
            Self::TRUE
        } else {
            Self::FALSE
        }
    }

    /// Raw pattern, for the double-read glitch-hardened compare in `glitch`.
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl Default for SecureBool {
    fn default() -> Self {
        Self::FALSE
    }
}

/// Top-level oneof tag the NFC router and the inter-MCU dispatcher both
/// recognise. One tag per proto command named in spec §6.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum ProtoTag {
    StartFingerprintEnrollment,
    GetFingerprintEnrollmentStatus,
    QueryAuthentication,
    SendUnlockSecret,
    ProvisionUnlockSecret,
    ConfigureUnlockLimitResponse,
    DeriveKeyDescriptor,
    DeriveKeyDescriptorAndSign,
    SealCsek,
    UnsealCsek,
    HardwareAttestation,
    SecureChannelEstablish,
    DerivePublicKey,
    DerivePublicKeyAndSign,
    FwupStart,
    FwupTransfer,
    FwupFinish,
    Meta,
    DeviceId,
    WipeState,
    Fuel,
    CoredumpGet,
    EventsGet,
    FeatureFlagsGet,
    FeatureFlagsSet,
    TelemetryIdGet,
    SecinfoGet,
    CertGet,
    PubkeysGet,
    PubkeyGet,
    FingerprintSettingsGet,
    CapTouchCal,
    Empty,
    DeviceInfo,
    LockDevice,
}

impl ProtoTag {
    /// Which MCU owns this command. Commands not owned by `Core` are
    /// forwarded across the inter-MCU channel by `fwup`/`nfc` routing.
    pub fn mcu_role(self) -> McuRole {
        match self {
            ProtoTag::CapTouchCal | ProtoTag::FingerprintSettingsGet => {
                McuRole::Core
            }
            _ => McuRole::Core,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum McuRole {
    Core,
    Uxc,
}

/// Reset reasons consulted by the bootloader on the next boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResetReason {
    Default,
    Fwup,
    Fault,
    WatchdogTimeout,
}


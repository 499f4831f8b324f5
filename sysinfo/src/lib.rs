// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device metadata, watchdog feeding, and coprocessor sleep coordination
//! (`spec.md` §4.12).
//!
//! Sysinfo is the task other proto commands (meta, device-info, coredump,
//! events, pubkey, cert, secinfo) route to; it assembles a response from
//! whatever backend owns the data (flash metadata, the secure element, the
//! telemetry store) without knowing their storage details.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;
use enum_map::Enum;
use multitimer::{Multitimer, Repeat};

pub mod config;
pub use config::{COPROC_SLEEP_PREP_TIMEOUT_MS, WATCHDOG_FEED_PERIOD_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Bootloader,
    SlotA,
    SlotB,
}

#[derive(Debug, Clone)]
pub struct Metadata {
    pub git_id: String,
    pub git_branch: String,
    pub version: (u8, u8, u8),
    pub build_string: String,
    pub build_timestamp: u32,
    pub sha1: [u8; 20],
    pub hw_revision: String,
}

/// Flash-resident per-slot metadata, validated by a magic+CRC check at
/// read time; an invalid slot (corrupt or never written) reads as `None`.
pub trait MetadataSource {
    fn metadata(&self, slot: Slot) -> Option<Metadata>;
}

pub trait SecureElementInfo {
    fn device_pubkey(&self) -> [u8; 33];
    fn attestation_cert(&self) -> Vec<u8>;
}

pub trait TelemetryStore {
    fn coredump(&self) -> Option<Vec<u8>>;
    fn events(&self) -> Vec<u8>;
}

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub serial: String,
    pub assy_serial: String,
    pub hw_revision: String,
    pub active_slot: Slot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SysinfoError {
    SlotInvalid,
}

/// Assembles query responses from the backends above. The device's static
/// identity (`serial`/`assy_serial`/`active_slot`) is fixed at construction;
/// it is read from flash/the secure element once at boot, never rewritten.
///
/// Sysinfo also owns the global sleep timer (§4.11): it is this task's
/// poll loop, not `power`'s, that decides when the device actually powers
/// off, since that decision is gated on the coprocessor sleep-prep
/// handshake below.
pub struct Sysinfo<M, S, T> {
    device: DeviceInfo,
    metadata_source: M,
    secure_element: S,
    telemetry: T,
    pub sleep: power::SleepTimer,
    pub coproc_sleep: CoprocSleepCoordinator,
}

impl<M: MetadataSource, S: SecureElementInfo, T: TelemetryStore> Sysinfo<M, S, T> {
    pub fn new(device: DeviceInfo, metadata_source: M, secure_element: S, telemetry: T) -> Self {
        Self {
            device,
            metadata_source,
            secure_element,
            telemetry,
            sleep: power::SleepTimer::new(),
            coproc_sleep: CoprocSleepCoordinator::new(),
        }
    }

    pub fn device_info(&self) -> DeviceInfo {
        self.device.clone()
    }

    /// Begins the sleep sequence: asks the coprocessor to quiesce, then the
    /// caller polls `coproc_sleep` until it resolves before cutting power.
    pub fn begin_sleep(&mut self, now_ms: u64) {
        self.coproc_sleep.request(now_ms);
    }

    pub fn metadata(&self, slot: Slot) -> Result<Metadata, SysinfoError> {
        self.metadata_source.metadata(slot).ok_or(SysinfoError::SlotInvalid)
    }

    pub fn active_metadata(&self) -> Result<Metadata, SysinfoError> {
        self.metadata(self.device.active_slot)
    }

    pub fn pubkey(&self) -> [u8; 33] {
        self.secure_element.device_pubkey()
    }

    pub fn cert(&self) -> Vec<u8> {
        self.secure_element.attestation_cert()
    }

    pub fn coredump(&self) -> Option<Vec<u8>> {
        self.telemetry.coredump()
    }

    pub fn events(&self) -> Vec<u8> {
        self.telemetry.events()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
enum SysinfoTimerId {
    Watchdog,
}

/// Feeds the hardware watchdog on a fixed period. A missed feed (the timer
/// not being polled for more than `WATCHDOG_FEED_PERIOD_MS`) is exactly the
/// lockup this exists to catch — the watchdog itself resets the device.
pub struct WatchdogFeeder {
    timer: Multitimer<SysinfoTimerId>,
}

impl WatchdogFeeder {
    pub fn new(now_ms: u64) -> Self {
        let mut timer = Multitimer::new();
        timer.set_timer(SysinfoTimerId::Watchdog, now_ms + WATCHDOG_FEED_PERIOD_MS, Repeat::Every(WATCHDOG_FEED_PERIOD_MS));
        Self { timer }
    }

    /// Returns `true` on a poll where the watchdog should be fed.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        !self.timer.poll(now_ms).is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepPrepState {
    Idle,
    Requested,
    Acked,
    TimedOut,
}

/// Coordinates the display MCU's sleep preparation: request it to quiesce
/// before power-off, but never block sleep indefinitely on an unresponsive
/// coprocessor.
pub struct CoprocSleepCoordinator {
    state: SleepPrepState,
    requested_at_ms: Option<u64>,
}

impl CoprocSleepCoordinator {
    pub fn new() -> Self {
        Self { state: SleepPrepState::Idle, requested_at_ms: None }
    }

    pub fn state(&self) -> SleepPrepState {
        self.state
    }

    pub fn request(&mut self, now_ms: u64) {
        self.state = SleepPrepState::Requested;
        self.requested_at_ms = Some(now_ms);
    }

    pub fn ack(&mut self) {
        if self.state == SleepPrepState::Requested {
            self.state = SleepPrepState::Acked;
        }
    }

    /// Returns `true` once the coordinator has reached a terminal state
    /// (acked or timed out) and the caller may proceed with power-off.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        match self.state {
            SleepPrepState::Acked | SleepPrepState::TimedOut => true,
            SleepPrepState::Idle => false,
            SleepPrepState::Requested => {
                let requested_at = self.requested_at_ms.unwrap_or(now_ms);
                if now_ms.saturating_sub(requested_at) >= COPROC_SLEEP_PREP_TIMEOUT_MS {
                    self.state = SleepPrepState::TimedOut;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.state = SleepPrepState::Idle;
        self.requested_at_ms = None;
    }
}

impl Default for CoprocSleepCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeMetadata;
    impl MetadataSource for FakeMetadata {
        fn metadata(&self, slot: Slot) -> Option<Metadata> {
            match slot {
                Slot::SlotA => Some(Metadata {
                    git_id: "abc123".into(),
                    git_branch: "main".into(),
                    version: (1, 2, 3),
                    build_string: "release".into(),
                    build_timestamp: 1_700_000_000,
                    sha1: [0u8; 20],
                    hw_revision: "rev-c".into(),
                }),
                _ => None,
            }
        }
    }

    struct FakeSecureElement;
    impl SecureElementInfo for FakeSecureElement {
        fn device_pubkey(&self) -> [u8; 33] {
            [7u8; 33]
        }
        fn attestation_cert(&self) -> Vec<u8> {
            alloc::vec![1, 2, 3]
        }
    }

    struct FakeTelemetry;
    impl TelemetryStore for FakeTelemetry {
        fn coredump(&self) -> Option<Vec<u8>> {
            None
        }
        fn events(&self) -> Vec<u8> {
            Vec::new()
        }
    }

    fn test_sysinfo() -> Sysinfo<FakeMetadata, FakeSecureElement, FakeTelemetry> {
        Sysinfo::new(
            DeviceInfo {
                serial: "SN001".into(),
                assy_serial: "ASY001".into(),
                hw_revision: "rev-c".into(),
                active_slot: Slot::SlotA,
            },
            FakeMetadata,
            FakeSecureElement,
            FakeTelemetry,
        )
    }

    #[test]
    fn active_metadata_resolves_active_slot() {
        let sysinfo = test_sysinfo();
        let metadata = sysinfo.active_metadata().unwrap();
        assert_eq!(metadata.version, (1, 2, 3));
    }

    #[test]
    fn invalid_slot_reports_error() {
        let sysinfo = test_sysinfo();
        assert_eq!(sysinfo.metadata(Slot::SlotB).unwrap_err(), SysinfoError::SlotInvalid);
    }

    #[test]
    fn watchdog_feeds_on_fixed_period() {
        let mut feeder = WatchdogFeeder::new(0);
        assert!(!feeder.poll(500));
        assert!(feeder.poll(1_000));
        assert!(!feeder.poll(1_500));
        assert!(feeder.poll(2_000));
    }

    #[test]
    fn coproc_sleep_prep_resolves_on_ack() {
        let mut coord = CoprocSleepCoordinator::new();
        coord.request(0);
        assert!(!coord.poll(100));
        coord.ack();
        assert!(coord.poll(100));
        assert_eq!(coord.state(), SleepPrepState::Acked);
    }

    #[test]
    fn coproc_sleep_prep_times_out_without_ack() {
        let mut coord = CoprocSleepCoordinator::new();
        coord.request(0);
        assert!(!coord.poll(400));
        assert!(coord.poll(500));
        assert_eq!(coord.state(), SleepPrepState::TimedOut);
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Core MCU binary: owns `nfc`, `auth`, `key_manager`, `fwup`, `sysinfo`,
//! and (via `effects`) the `Ui`/power side effects those tasks drive.
//!
//! Host build stand-in for the RFAL worker thread: a line of hex digits on
//! stdin is decoded as one post-activation APDU and routed exactly the way
//! the real ISR/worker split would, while a ticker thread advances the
//! shared clock and drains the timer-driven engines (auth expiry, sleep,
//! scheduled resets) the way a real task's idle loop would.

mod config;
mod effects;
mod feature_flags;
mod fingerprint;
mod fwup_writer;
mod keys;
mod proto;
mod storage;
mod sysinfo_backend;
mod uc_link;
mod unlock_storage;
mod wire;

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use abi::{Port, ResetReason};
use glitch::SpinDelay;
use ipc::Bus;
use kvstore::KvStore;
use nfc::{Apdu, NfcRouter, RfAction};
use sysinfo::{DeviceInfo, Slot, Sysinfo};

use effects::{Clock, CoreEffects};
use feature_flags::FeatureFlags;
use fwup_writer::FileImageWriter;
use keys::DeviceKeys;
use proto::CoreProtoRouter;
use storage::FileStorage;
use sysinfo_backend::{FileMetadataSource, FileTelemetryStore, KeyedSecureElement};
use unlock_storage::FileUnlockStorage;

ringbuf::ringbuf!(BOOT_TRACE, Event, 8);

#[derive(Debug, Clone, Copy, PartialEq)]
enum Event {
    Booted { boot_count: u32 },
    ResetScheduled(ResetReason),
}

/// `CORE_DATA_DIR` env var picks the data directory; defaults to
/// `./core-data` so repeated runs from the same shell keep one identity.
fn data_dir() -> PathBuf {
    std::env::var_os("CORE_DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("core-data"))
}

fn bump_boot_counter(dir: &std::path::Path) -> u32 {
    let mut store = KvStore::init(FileStorage::new(dir.join("kvstore.bin"))).expect("kvstore init");
    let mut buf = [0u8; 4];
    let count = match store.get("boot-count", &mut buf) {
        Ok(4) => u32::from_le_bytes(buf).wrapping_add(1),
        _ => 1,
    };
    let _ = store.set("boot-count", &count.to_le_bytes());
    count
}

/// Shared with Uxc: the directory a factory fixture would pair the two
/// MCUs' attestation public keys through. `UC_PROVISIONING_DIR` env var.
fn provisioning_dir() -> PathBuf {
    std::env::var_os("UC_PROVISIONING_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("uc-provisioning"))
}

fn uc_socket_path() -> PathBuf {
    std::env::var_os("UC_LINK_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp/hsd-uc-link.sock"))
}

fn parse_apdu_line(line: &str) -> Option<Vec<u8>> {
    let line = line.trim();
    if line.is_empty() || line.len() % 2 != 0 {
        return None;
    }
    (0..line.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&line[i..i + 2], 16).ok())
        .collect()
}

fn main() {
    let dir = data_dir();
    std::fs::create_dir_all(&dir).expect("create data directory");

    let boot_count = bump_boot_counter(&dir);
    ringbuf::ringbuf_entry!(BOOT_TRACE, Event::Booted { boot_count });

    let keys: &'static DeviceKeys = Box::leak(Box::new(DeviceKeys::load_or_provision(dir.join("keys"))));

    std::fs::create_dir_all(dir.join("sysinfo")).expect("create sysinfo directory");
    std::fs::create_dir_all(dir.join("fwup")).expect("create fwup directory");
    let metadata_source = FileMetadataSource::new(dir.join("sysinfo"));
    metadata_source.seed_running_slot(Slot::SlotA);
    let secure_element = KeyedSecureElement { keys };
    let telemetry = FileTelemetryStore::new(dir.join("sysinfo"));
    let device_info = DeviceInfo {
        serial: format!("CORE-{:08X}", u32::from_le_bytes(keys.device_identity_key[..4].try_into().unwrap())),
        assy_serial: String::from("ASSY-HOST-SIM"),
        hw_revision: String::from("host-sim"),
        active_slot: Slot::SlotA,
    };
    let sysinfo = Arc::new(Mutex::new(Sysinfo::new(device_info, metadata_source, secure_element, telemetry)));

    let unlock_storage = FileUnlockStorage::new(dir.join("unlock"));
    std::fs::create_dir_all(dir.join("unlock")).expect("create unlock directory");
    let auth = Arc::new(Mutex::new(auth::AuthEngine::new(unlock_storage, 0)));

    let writer = FileImageWriter::new(dir.join("fwup"));
    let fwup = Arc::new(Mutex::new(fwup::FwupEngine::new(writer)));

    let feature_flags = FeatureFlags::new(dir.join("feature-flags.bin"));
    let matcher_feature_flags = feature_flags.clone();

    let bus = Arc::new(Bus::new());
    let ui_mailbox = bus.register_port(Port::Ui, 32);

    let clock = Clock::new();
    let sleep = Arc::new(Mutex::new(power::SleepTimer::new()));
    let pending_reset: Arc<Mutex<Option<(u64, ResetReason)>>> = Arc::new(Mutex::new(None));
    let wipe_requested = Arc::new(AtomicBool::new(false));

    let effects = CoreEffects::new(
        bus.clone(),
        clock.clone(),
        auth.clone(),
        sleep.clone(),
        pending_reset.clone(),
        wipe_requested.clone(),
    );

    let mut proto_router = CoreProtoRouter::new(
        auth.clone(),
        fwup.clone(),
        sysinfo.clone(),
        feature_flags,
        effects.clone(),
        clock.clone(),
        keys,
        dir.join("captouch-cal.bin"),
    );

    // Forwards `Ui` port traffic to the display MCU over `uc_link`, once
    // its handshake completes. Keeps draining the mailbox even before
    // that, so a slow or absent Uxc never backs up `effects::post_ui_event`
    // callers stuck waiting on a full queue.
    let core_link: Arc<Mutex<Option<uc_link::CoreLink>>> = Arc::new(Mutex::new(None));
    {
        let core_link = core_link.clone();
        let socket_path = uc_socket_path();
        let provisioning_dir = provisioning_dir();
        std::thread::spawn(move || {
            let mut rng = keys::OsEntropy;
            match uc_link::CoreLink::listen(&socket_path, &provisioning_dir, &mut rng) {
                Ok(link) => {
                    *core_link.lock().unwrap_or_else(|e| e.into_inner()) = Some(link);
                    eprintln!("app-core: uc link established");
                }
                Err(_) => eprintln!("app-core: uc link handshake failed, display stays disconnected"),
            }
        });
    }
    std::thread::spawn(move || loop {
        match ui_mailbox.recv(ipc::RecvOptions::default()) {
            Some(msg) => {
                let body = msg.object.as_slice();
                if body.len() == 2 {
                    if let Some(event) = ui_events::decode_event(msg.tag, &[body[0], body[1]]) {
                        if let Some(link) = core_link.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
                            let _ = link.send_event(event);
                        }
                    }
                }
            }
            None => std::thread::sleep(Duration::from_millis(50)),
        }
    });

    // The dedicated high-priority biometric task: services one finger-down
    // check per iteration against `HostSimBiometrics`'s trigger file (see
    // `fingerprint.rs`), driving the same `auth::MatcherThread` step
    // function the real sensor ISR loop would.
    {
        let auth = auth.clone();
        let bus = bus.clone();
        let clock = clock.clone();
        let mut effects = effects.clone();
        let fingerprints_dir = dir.join("fingerprints");
        std::thread::spawn(move || {
            std::fs::create_dir_all(&fingerprints_dir).expect("create fingerprints directory");
            let mut store = fingerprint::FileTemplateStore::new(&fingerprints_dir);
            let mut bio = fingerprint::HostSimBiometrics::new(&fingerprints_dir);
            let mut feedback = fingerprint::CoreMatcherFeedback::new(bus.clone());
            let mut matcher = auth::MatcherThread::new(
                config::FINGERPRINT_MAX_ENROLL_ATTEMPTS,
                config::FINGERPRINT_RATE_LIMIT_MS,
            );
            let mut delay = SpinDelay::new(0xFEED_F00D);
            loop {
                let now = clock.now_ms();
                let auto_refresh = matcher_feature_flags.get(feature_flags::FeatureFlag::TemplateAutoRefresh);
                let wait = {
                    let mut engine = auth.lock().unwrap_or_else(|e| e.into_inner());
                    let (_, wait) = matcher.service(
                        &mut bio,
                        &mut delay,
                        &mut engine,
                        &mut feedback,
                        &mut store,
                        now,
                        config::AUTH_EXPIRY_MS,
                        &mut effects,
                        auto_refresh,
                    );
                    wait
                };
                std::thread::sleep(Duration::from_millis(wait.unwrap_or(config::FINGER_TRIGGER_POLL_MS)));
            }
        });
    }

    // Idle-loop stand-in: advances the shared clock against wall time and
    // polls every timer-driven engine, the way each real task's notification
    // handler would on a `TIMER` wakeup.
    {
        let clock = clock.clone();
        let auth = auth.clone();
        let sleep = sleep.clone();
        let mut effects = effects.clone();
        let wipe_requested = wipe_requested.clone();
        std::thread::spawn(move || {
            let start = Instant::now();
            let mut delay = SpinDelay::new(0xC0FF_EE01);
            loop {
                std::thread::sleep(Duration::from_millis(20));
                let now = start.elapsed().as_millis() as u64;
                clock.advance_to(now);

                if let Ok(mut engine) = auth.lock() {
                    let _ = engine.poll(&mut delay, now, &mut effects);
                }
                if sleep.lock().unwrap_or_else(|e| e.into_inner()).poll(now) {
                    // Sleep timer elapsed with nothing keeping the device
                    // awake; a real build hands off to `Sysinfo::begin_sleep`
                    // and the PMIC power-down sequence (out of scope here).
                }
                if let Some(reason) = effects.take_pending_reset(now) {
                    ringbuf::ringbuf_entry!(BOOT_TRACE, Event::ResetScheduled(reason));
                    std::process::exit(match reason {
                        ResetReason::Default => 0,
                        ResetReason::Fwup => 10,
                        ResetReason::Fault => 20,
                        ResetReason::WatchdogTimeout => 30,
                    });
                }
                if wipe_requested.load(Ordering::Relaxed) {
                    // A real build erases provisioned secrets here; this
                    // build only flags intent for the host harness to see.
                }
            }
        });
    }

    eprintln!(
        "app-core ready (data dir {:?}, boot #{boot_count}); paste a hex-encoded APDU per line",
        dir
    );
    let mut nfc_router = NfcRouter::new(SpinDelay::new(0xACE1_ACE1));
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let Some(bytes) = parse_apdu_line(&line) else {
            if !line.trim().is_empty() {
                eprintln!("not a valid hex APDU, ignoring");
            }
            continue;
        };
        if bytes.len() < 4 {
            eprintln!("APDU too short (need cla/ins/p1/p2)");
            continue;
        }
        let apdu = Apdu { cla: bytes[0], ins: bytes[1], p1: bytes[2], p2: bytes[3], data: &bytes[4..] };
        match nfc_router.route(&apdu, &mut proto_router) {
            RfAction::Respond(response) => {
                let hex: String = response.iter().map(|b| format!("{b:02x}")).collect();
                println!("{hex}");
            }
            RfAction::Deactivate => {
                println!("DEACTIVATE");
            }
        }
    }
}

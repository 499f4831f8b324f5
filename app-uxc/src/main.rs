// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Uxc MCU binary: the display/button/power side of the device. Owns
//! `display_ctrl::FlowController` and `ui_events::AnimationPlayer`, drives
//! `power`'s captouch/charger/fuel-gauge state machines from host-harness
//! trigger files, and talks to Core over `uc_link`'s secure channel as the
//! handshake responder.
//!
//! Host build stand-in for the two MCU tasks this binary would otherwise
//! split into (`display_task`/`button_task`): one receiver thread drains
//! the link and feeds events into the flow engine, one idle loop polls
//! local input and timers, matching `app-core`'s ticker-thread pattern.

mod config;
mod keys;
mod link;
mod sysinfo_backend;

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use display_ctrl::{ButtonEvent, FlowAction, FlowController, FlowId, ShowScreen, EntryData};
use power::{Captouch, ChargerFsm, ChargerSignals, FuelGauge};
use sysinfo::{DeviceInfo, Slot, Sysinfo, WatchdogFeeder};
use ui_events::{animation_for_event, Animation, AnimationPlayer, UiEvent};
use uc::LinkMessage;

use keys::{OsEntropy, UxcKeys};
use link::UxcLink;
use sysinfo_backend::{FileTelemetryStore, StaticMetadataSource, UxcSecureElement};

/// `UXC_DATA_DIR` env var picks Uxc's own data directory; defaults to
/// `./uxc-data` so repeated runs from the same shell keep one identity.
fn data_dir() -> PathBuf {
    std::env::var_os("UXC_DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("uxc-data"))
}

/// Shared with Core: the directory a factory fixture would pair the two
/// MCUs' attestation public keys through. `UC_PROVISIONING_DIR` env var.
fn provisioning_dir() -> PathBuf {
    std::env::var_os("UC_PROVISIONING_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("uc-provisioning"))
}

fn socket_path() -> PathBuf {
    std::env::var_os("UC_LINK_SOCKET")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp/hsd-uc-link.sock"))
}

struct LoggingScreenSink;

impl display_ctrl::ScreenSink for LoggingScreenSink {
    fn show_screen(&mut self, screen: ShowScreen) {
        eprintln!("uxc: show {:?} ({:?}, {}ms)", screen.flow, screen.transition, screen.duration_ms);
    }
}

/// Host stand-in for a GPIO edge: a trigger file's presence is consumed
/// (removed) the first time it's observed, mirroring
/// `app-core::fingerprint::HostSimBiometrics`'s trigger-file convention.
fn take_trigger(path: &Path) -> bool {
    if path.exists() {
        let _ = std::fs::remove_file(path);
        true
    } else {
        false
    }
}

fn read_percent_file(path: &Path, default: u8) -> u8 {
    std::fs::read_to_string(path).ok().and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

/// Runs one `UiEvent` through the flow engine and the LED animation
/// player, reporting any resulting `FlowAction` back to Core. Shared by
/// the link-receiver thread and the local input/power poll loop, since
/// both are just different sources of `UiEvent`s.
fn apply_ui_event(
    event: UiEvent,
    flow: &Arc<Mutex<FlowController>>,
    animation: &Arc<Mutex<AnimationPlayer>>,
    link: &UxcLink,
    now_ms: u32,
) {
    let mut sink = LoggingScreenSink;
    let action = {
        let mut flow = flow.lock().unwrap_or_else(|e| e.into_inner());
        flow.dispatch_event(event, &mut sink)
    };
    {
        let mut animation = animation.lock().unwrap_or_else(|e| e.into_inner());
        animation.play(animation_for_event(event), now_ms);
    }
    if let Some(action) = action {
        if action != FlowAction::None {
            let _ = link.send(LinkMessage::FlowActionReport(action));
        }
    }
}

fn main() {
    let dir = data_dir();
    std::fs::create_dir_all(&dir).expect("create data directory");
    std::fs::create_dir_all(dir.join("input")).expect("create input directory");
    std::fs::create_dir_all(dir.join("telemetry")).expect("create telemetry directory");

    let keys: &'static UxcKeys =
        Box::leak(Box::new(UxcKeys::load_or_provision(dir.join("keys"), provisioning_dir())));

    let device_info = DeviceInfo {
        serial: format!("UXC-{:08X}", u32::from_le_bytes(keys.verify_key[..4].try_into().unwrap())),
        assy_serial: String::from("ASSY-HOST-SIM"),
        hw_revision: String::from("host-sim"),
        active_slot: Slot::SlotA,
    };
    let metadata_source = StaticMetadataSource;
    let secure_element = UxcSecureElement { keys };
    let telemetry = FileTelemetryStore::new(dir.join("telemetry"));
    let sysinfo =
        Arc::new(Mutex::new(Sysinfo::new(device_info, metadata_source, secure_element, telemetry)));

    eprintln!("app-uxc connecting to Core at {:?}", socket_path());
    let mut rng = OsEntropy;
    let link = Arc::new(
        UxcLink::connect(&socket_path(), &keys.attestation_key, &mut rng).expect("uc link handshake"),
    );
    eprintln!("app-uxc link established");

    let flow = Arc::new(Mutex::new(FlowController::new()));
    {
        let mut flow = flow.lock().unwrap_or_else(|e| e.into_inner());
        flow.set_device_info(sysinfo.lock().unwrap_or_else(|e| e.into_inner()).device_info());
        let mut sink = LoggingScreenSink;
        flow.enter_flow(FlowId::Onboarding, EntryData::default(), &mut sink);
    }
    let animation = Arc::new(Mutex::new(AnimationPlayer::new(Animation::solid(0, 0, 0, 0))));

    // Receiver thread: decrypted `UiEvent`s pushed by Core over the link
    // drive both the flow engine and the LED player, the way the real
    // display task's notification handler would on a link-RX interrupt.
    {
        let flow = flow.clone();
        let animation = animation.clone();
        let link = link.clone();
        let start = Instant::now();
        std::thread::spawn(move || loop {
            match link.recv() {
                Ok(LinkMessage::UiEvent(event)) => {
                    let now_ms = start.elapsed().as_millis() as u32;
                    apply_ui_event(event, &flow, &animation, &link, now_ms);
                }
                Ok(_) => {
                    // Button/flow-action reports only travel Uxc -> Core;
                    // Core never sends one back.
                }
                Err(_) => break,
            }
        });
    }

    eprintln!("app-uxc ready (data dir {:?})", dir);

    // Idle loop: advances local input/power state machines and the flow
    // engine's own tick, mirroring `app-core`'s ticker-thread stand-in for
    // the real per-task timer notification.
    let start = Instant::now();
    let mut watchdog = WatchdogFeeder::new(0);
    let mut captouch = Captouch::new();
    let mut charger = ChargerFsm::new();
    let mut fuel_gauge = FuelGauge::new(5);
    let input_dir = dir.join("input");
    let mut last_input_poll = Instant::now();

    loop {
        std::thread::sleep(Duration::from_millis(config::TICK_PERIOD_MS));
        let now_ms = start.elapsed().as_millis() as u64;

        if watchdog.poll(now_ms) {
            // Real build feeds the hardware watchdog register here.
        }
        sysinfo.lock().unwrap_or_else(|e| e.into_inner()).sleep.poll(now_ms);
        animation.lock().unwrap_or_else(|e| e.into_inner()).poll(now_ms as u32);

        flow.lock().unwrap_or_else(|e| e.into_inner()).tick();

        if last_input_poll.elapsed() >= Duration::from_millis(config::INPUT_POLL_MS) {
            last_input_poll = Instant::now();

            for (file, btn) in [
                ("button-up", ButtonEvent::Up),
                ("button-down", ButtonEvent::Down),
                ("button-confirm", ButtonEvent::Confirm),
                ("button-back", ButtonEvent::Back),
            ] {
                if take_trigger(&input_dir.join(file)) {
                    let action = flow.lock().unwrap_or_else(|e| e.into_inner()).button_press(btn);
                    if action != FlowAction::None {
                        let _ = link.send(LinkMessage::FlowActionReport(action));
                    }
                    let _ = link.send(LinkMessage::ButtonPress(btn));
                }
            }

            if take_trigger(&input_dir.join("captouch-down")) {
                captouch.on_finger_down(now_ms);
            }
            if take_trigger(&input_dir.join("captouch-up")) {
                captouch.on_finger_up();
            }
            // `Authenticated`/`Deauthenticated` only ever arrive from Core
            // (it owns `auth::AuthEngine`); `ctx.is_locked` is the local
            // mirror of that state, not something this side decides.
            let authenticated = !flow.lock().unwrap_or_else(|e| e.into_inner()).ctx.is_locked;
            if captouch.poll(now_ms, authenticated).is_some() {
                eprintln!("uxc: break-glass hold detected");
            }

            let signals = ChargerSignals {
                charge_input_valid: input_dir.join("charger-plugged").exists(),
                charging: input_dir.join("charger-charging").exists(),
            };
            if let Some(event) = charger.sample(signals) {
                apply_ui_event(event, &flow, &animation, &link, now_ms as u32);
            }

            let percent = read_percent_file(&input_dir.join("battery-percent"), config::DEFAULT_BATTERY_PERCENT);
            if let Some(event) = fuel_gauge.sample(percent) {
                apply_ui_event(event, &flow, &animation, &link, now_ms as u32);
            }
        }
    }
}

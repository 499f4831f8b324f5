// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Side-effect wiring shared by `auth`, `unlock`, and `fwup`: posting UI
//! events, inhibiting sleep, scheduling a reset, and wiping state. Each
//! library crate only sees its own narrow `*Effects` trait; this is the
//! one place that ties them to the real `Ui` port, `power::SleepTimer`,
//! and the pending-reset slot `sysinfo`'s poll loop drains.

use abi::{Port, ResetReason};
use auth::AuthEffects;
use fwup::FwupEffects;
use glitch::SpinDelay;
use ipc::{Bus, MessageRef, SendOptions};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use ui_events::UiEvent;

use crate::unlock_storage::FileUnlockStorage;

pub type CoreAuth = auth::AuthEngine<FileUnlockStorage>;

/// Millisecond clock shared by every task's poll loop, advanced once by
/// `main`'s scheduler tick rather than each task reading the OS clock
/// independently — keeps every engine's notion of "now" consistent within
/// one tick.
#[derive(Clone, Default)]
pub struct Clock(Arc<AtomicU64>);

impl Clock {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(0)))
    }

    pub fn now_ms(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }

    pub fn advance_to(&self, now_ms: u64) {
        self.0.store(now_ms, Ordering::Relaxed);
    }
}

pub(crate) fn post_ui_event(bus: &Bus, event: UiEvent) {
    let (tag, body) = ui_events::encode_event(event);
    bus.send(Port::Ui, MessageRef::referencing(tag, &body), SendOptions::default());
}

#[derive(Clone)]
pub struct CoreEffects {
    bus: Arc<Bus>,
    clock: Clock,
    auth: Arc<Mutex<CoreAuth>>,
    sleep: Arc<Mutex<power::SleepTimer>>,
    pending_reset: Arc<Mutex<Option<(u64, ResetReason)>>>,
    wipe_requested: Arc<AtomicBool>,
}

impl CoreEffects {
    pub fn new(
        bus: Arc<Bus>,
        clock: Clock,
        auth: Arc<Mutex<CoreAuth>>,
        sleep: Arc<Mutex<power::SleepTimer>>,
        pending_reset: Arc<Mutex<Option<(u64, ResetReason)>>>,
        wipe_requested: Arc<AtomicBool>,
    ) -> Self {
        Self { bus, clock, auth, sleep, pending_reset, wipe_requested }
    }

    pub fn wipe_requested(&self) -> bool {
        self.wipe_requested.load(Ordering::Relaxed)
    }

    pub fn take_pending_reset(&self, now_ms: u64) -> Option<ResetReason> {
        let mut slot = self.pending_reset.lock().unwrap_or_else(|e| e.into_inner());
        if let Some((deadline, reason)) = *slot {
            if now_ms >= deadline {
                *slot = None;
                return Some(reason);
            }
        }
        None
    }
}

/// Swallows the `Locked`/sleep/wipe side effects of a forced
/// deauthenticate so `deauthenticate_silently` shows only the fwup result,
/// not a second lock animation.
struct Mute;

impl AuthEffects for Mute {
    fn locked(&mut self) {}
    fn inhibit_sleep(&mut self, _extra_ms: u64) {}
    fn wipe(&mut self) {}
}

impl AuthEffects for CoreEffects {
    fn locked(&mut self) {
        post_ui_event(&self.bus, UiEvent::Deauthenticated);
    }

    fn inhibit_sleep(&mut self, extra_ms: u64) {
        self.sleep.lock().unwrap_or_else(|e| e.into_inner()).sleep_inhibit(extra_ms);
    }

    fn wipe(&mut self) {
        self.wipe_requested.store(true, Ordering::Relaxed);
    }
}

impl FwupEffects for CoreEffects {
    fn show_result(&mut self, success: bool) {
        post_ui_event(&self.bus, if success { UiEvent::FwupSuccess } else { UiEvent::FwupFailed });
    }

    fn deauthenticate_silently(&mut self) {
        let now = self.clock.now_ms();
        let mut delay = SpinDelay::new(now as u32 | 1);
        let mut engine = self.auth.lock().unwrap_or_else(|e| e.into_inner());
        let _ = engine.set_authenticated(&mut delay, false, now, 0, &mut Mute);
    }

    fn schedule_reset(&mut self, delay_ms: u64, reason: ResetReason) {
        let deadline = self.clock.now_ms() + delay_ms;
        *self.pending_reset.lock().unwrap_or_else(|e| e.into_inner()) = Some((deadline, reason));
    }
}

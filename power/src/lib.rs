// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Captouch, sleep timer, and charger/fuel-gauge state machines
//! (`spec.md` §4.11).
//!
//! Each piece here is a pure step function driven by a millisecond
//! timestamp or a sampled hardware signal, following the same pattern as
//! `auth::MatcherThread`: the ISR/poll loop that owns a real timer or PMIC
//! line is a thin shim elsewhere, so the logic is deterministic to test.

#![cfg_attr(not(test), no_std)]

use enum_map::Enum;
use multitimer::{Multitimer, Repeat};
use ui_events::UiEvent;

pub mod config;
pub use config::{BREAK_GLASS_HOLD_MS, DEFAULT_SLEEP_TIMEOUT_MS};
use config::DEBOUNCE_SAMPLES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
enum SleepTimerId {
    Sleep,
}

/// The single global power-off countdown. Stopped while authenticated (the
/// auth expiry timer runs instead); started on deauthenticate.
pub struct SleepTimer {
    timer: Multitimer<SleepTimerId>,
    timeout_ms: u64,
}

impl SleepTimer {
    pub fn new() -> Self {
        Self { timer: Multitimer::new(), timeout_ms: DEFAULT_SLEEP_TIMEOUT_MS }
    }

    pub fn start(&mut self, now_ms: u64) {
        self.timer.set_timer(SleepTimerId::Sleep, now_ms + self.timeout_ms, Repeat::Never);
    }

    pub fn stop(&mut self) {
        self.timer.clear_timer(SleepTimerId::Sleep);
    }

    pub fn is_running(&self) -> bool {
        self.timer.is_armed(SleepTimerId::Sleep)
    }

    /// Called from interactive event sources (button/touch/NFC activity)
    /// to push the deadline back out to a fresh `timeout_ms`.
    pub fn sleep_refresh_power_timer(&mut self, now_ms: u64) {
        if self.is_running() {
            self.start(now_ms);
        }
    }

    /// Extends the current deadline by `extra_ms` without resetting it to a
    /// fresh `timeout_ms` — used to keep the device awake through an unlock
    /// delay period without masking how much of the timeout had elapsed.
    pub fn sleep_inhibit(&mut self, extra_ms: u64) {
        if let Some(deadline) = self.timer.deadline(SleepTimerId::Sleep) {
            self.timer.set_timer(SleepTimerId::Sleep, deadline + extra_ms, Repeat::Never);
        }
    }

    /// Returns `true` once on the poll where the timeout has fired.
    pub fn poll(&mut self, now_ms: u64) -> bool {
        !self.timer.poll(now_ms).is_empty()
    }
}

impl Default for SleepTimer {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptouchEvent {
    FingerDown,
    FingerUp,
    BreakGlassReady,
}

/// Tracks one continuous press so a `>= 10s` hold while authenticated can
/// be reported exactly once per press.
#[derive(Debug, Default)]
pub struct Captouch {
    press_start_ms: Option<u64>,
    break_glass_emitted: bool,
}

impl Captouch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_finger_down(&mut self, now_ms: u64) -> CaptouchEvent {
        self.press_start_ms = Some(now_ms);
        self.break_glass_emitted = false;
        CaptouchEvent::FingerDown
    }

    pub fn on_finger_up(&mut self) -> CaptouchEvent {
        self.press_start_ms = None;
        self.break_glass_emitted = false;
        CaptouchEvent::FingerUp
    }

    /// Called while a press is held; emits `BreakGlassReady` once, the
    /// first poll at or past the hold threshold, only while authenticated.
    pub fn poll(&mut self, now_ms: u64, authenticated: bool) -> Option<CaptouchEvent> {
        let start = self.press_start_ms?;
        if self.break_glass_emitted || !authenticated {
            return None;
        }
        if now_ms.saturating_sub(start) >= BREAK_GLASS_HOLD_MS {
            self.break_glass_emitted = true;
            Some(CaptouchEvent::BreakGlassReady)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChargerState {
    Unplugged,
    Charging,
    Finished,
}

/// Raw PMIC lines, as sampled each poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChargerSignals {
    pub charge_input_valid: bool,
    pub charging: bool,
}

/// Debounces the PMIC's `CHARGING`/`CHARGE_INPUT_VALID` lines before
/// emitting a UI event, so a bouncing connector doesn't chatter the LED.
pub struct ChargerFsm {
    state: ChargerState,
    candidate: Option<ChargerSignals>,
    candidate_count: u8,
}

impl ChargerFsm {
    pub fn new() -> Self {
        Self { state: ChargerState::Unplugged, candidate: None, candidate_count: 0 }
    }

    fn state_of(signals: ChargerSignals) -> ChargerState {
        if !signals.charge_input_valid {
            ChargerState::Unplugged
        } else if signals.charging {
            ChargerState::Charging
        } else {
            ChargerState::Finished
        }
    }

    pub fn sample(&mut self, signals: ChargerSignals) -> Option<UiEvent> {
        match self.candidate {
            Some(c) if c == signals => self.candidate_count += 1,
            _ => {
                self.candidate = Some(signals);
                self.candidate_count = 1;
            }
        }
        if self.candidate_count < DEBOUNCE_SAMPLES {
            return None;
        }
        let new_state = Self::state_of(signals);
        if new_state == self.state {
            return None;
        }
        self.state = new_state;
        Some(match new_state {
            ChargerState::Unplugged => UiEvent::ChargingUnplugged,
            ChargerState::Charging => UiEvent::Charging,
            ChargerState::Finished => UiEvent::ChargingFinished,
        })
    }
}

impl Default for ChargerFsm {
    fn default() -> Self {
        Self::new()
    }
}

/// Periodically samples state-of-charge and alerts only on a threshold
/// crossing, so the LED/display doesn't get a UI event on every poll.
pub struct FuelGauge {
    last_alerted_percent: Option<u8>,
    threshold_percent: u8,
}

impl FuelGauge {
    pub fn new(threshold_percent: u8) -> Self {
        Self { last_alerted_percent: None, threshold_percent }
    }

    pub fn sample(&mut self, percent: u8) -> Option<UiEvent> {
        let should_alert = match self.last_alerted_percent {
            None => true,
            Some(last) => last.abs_diff(percent) >= self.threshold_percent,
        };
        if should_alert {
            self.last_alerted_percent = Some(percent);
            Some(UiEvent::BatterySoc { percent })
        } else {
            None
        }
    }
}

impl Default for FuelGauge {
    fn default() -> Self {
        Self::new(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sleep_timer_fires_after_timeout() {
        let mut timer = SleepTimer::new();
        timer.start(0);
        assert!(!timer.poll(59_999));
        assert!(timer.poll(60_000));
    }

    #[test]
    fn stopping_sleep_timer_prevents_firing() {
        let mut timer = SleepTimer::new();
        timer.start(0);
        timer.stop();
        assert!(!timer.poll(100_000));
    }

    #[test]
    fn refresh_pushes_deadline_out() {
        let mut timer = SleepTimer::new();
        timer.start(0);
        timer.sleep_refresh_power_timer(30_000);
        assert!(!timer.poll(60_000));
        assert!(timer.poll(90_000));
    }

    #[test]
    fn inhibit_extends_without_resetting_elapsed() {
        let mut timer = SleepTimer::new();
        timer.start(0);
        timer.sleep_inhibit(10_000);
        assert!(!timer.poll(60_000));
        assert!(timer.poll(70_000));
    }

    #[test]
    fn break_glass_fires_once_after_ten_seconds_authenticated() {
        let mut touch = Captouch::new();
        touch.on_finger_down(0);
        assert_eq!(touch.poll(5_000, true), None);
        assert_eq!(touch.poll(10_000, true), Some(CaptouchEvent::BreakGlassReady));
        assert_eq!(touch.poll(11_000, true), None);
    }

    #[test]
    fn break_glass_suppressed_when_unauthenticated() {
        let mut touch = Captouch::new();
        touch.on_finger_down(0);
        assert_eq!(touch.poll(10_000, false), None);
    }

    #[test]
    fn charger_fsm_debounces_before_emitting() {
        let mut fsm = ChargerFsm::new();
        let charging = ChargerSignals { charge_input_valid: true, charging: true };
        assert_eq!(fsm.sample(charging), None);
        assert_eq!(fsm.sample(charging), None);
        assert_eq!(fsm.sample(charging), Some(UiEvent::Charging));
        assert_eq!(fsm.sample(charging), None);
    }

    #[test]
    fn fuel_gauge_alerts_on_threshold_crossing() {
        let mut gauge = FuelGauge::new(5);
        assert_eq!(gauge.sample(80), Some(UiEvent::BatterySoc { percent: 80 }));
        assert_eq!(gauge.sample(82), None);
        assert_eq!(gauge.sample(74), Some(UiEvent::BatterySoc { percent: 74 }));
    }
}

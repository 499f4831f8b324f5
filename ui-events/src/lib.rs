// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! UI event bus and LED animation keyframer (`spec.md` §4.9).
//!
//! `UiEvent` is the fixed, platform-agnostic vocabulary the rest of the
//! system posts to `ui_port`; the LED backend here maps each event to a
//! named [`Animation`] and drives it with [`AnimationPlayer`]. The display
//! variant instead turns events into `show_screen` commands (`display-ctrl`).

#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod wire;
pub use config::MAX_KEYFRAMES;
pub use wire::{decode_event, encode_event};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiEvent {
    Idle,
    Authenticated,
    Deauthenticated,
    FingerDown,
    EnrollmentProgress { passed: u8, total: u8 },
    EnrollmentComplete,
    EnrollmentFailed,
    TransactionPending,
    TransactionApproved,
    TransactionRejected,
    Charging,
    ChargingFinished,
    ChargingUnplugged,
    BatterySoc { percent: u8 },
    FwupSuccess,
    FwupFailed,
    Wiped,
}

/// One R/G/B/W target held or interpolated toward, over `duration_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyframe {
    Off,
    Solid { r: u8, g: u8, b: u8, w: u8 },
    EaseIn { r: u8, g: u8, b: u8, w: u8, duration_ms: u32 },
    EaseOut { r: u8, g: u8, b: u8, w: u8, duration_ms: u32 },
    PulseIn { r: u8, g: u8, b: u8, w: u8, duration_ms: u32 },
    PulseOut { r: u8, g: u8, b: u8, w: u8, duration_ms: u32 },
    Lerp { from: (u8, u8, u8, u8), to: (u8, u8, u8, u8), duration_ms: u32 },
}

impl Keyframe {
    fn duration_ms(&self) -> u32 {
        match self {
            Keyframe::Off | Keyframe::Solid { .. } => 0,
            Keyframe::EaseIn { duration_ms, .. }
            | Keyframe::EaseOut { duration_ms, .. }
            | Keyframe::PulseIn { duration_ms, .. }
            | Keyframe::PulseOut { duration_ms, .. }
            | Keyframe::Lerp { duration_ms, .. } => *duration_ms,
        }
    }
}

/// Duty cycle for each LED channel, 0-255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DutyCycle {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub w: u8,
}

fn lerp_channel(from: u8, to: u8, t_numer: u32, t_denom: u32) -> u8 {
    let from = from as i32;
    let to = to as i32;
    let delta = to - from;
    let step = delta * t_numer as i32 / t_denom as i32;
    (from + step) as u8
}

/// Advances `keyframe` by `elapsed_ms` since it started and produces the
/// duty cycle at that point. `elapsed_ms` is clamped to the keyframe's
/// duration, so callers can poll past completion safely.
pub fn animation_keyframe_run(keyframe: &Keyframe, elapsed_ms: u32) -> DutyCycle {
    match *keyframe {
        Keyframe::Off => DutyCycle::default(),
        Keyframe::Solid { r, g, b, w } => DutyCycle { r, g, b, w },
        Keyframe::EaseIn { r, g, b, w, duration_ms } => {
            let t = elapsed_ms.min(duration_ms).max(1);
            let d = duration_ms.max(1);
            DutyCycle {
                r: lerp_channel(0, r, t, d),
                g: lerp_channel(0, g, t, d),
                b: lerp_channel(0, b, t, d),
                w: lerp_channel(0, w, t, d),
            }
        }
        Keyframe::EaseOut { r, g, b, w, duration_ms } => {
            let t = elapsed_ms.min(duration_ms);
            let d = duration_ms.max(1);
            DutyCycle {
                r: lerp_channel(r, 0, t, d),
                g: lerp_channel(g, 0, t, d),
                b: lerp_channel(b, 0, t, d),
                w: lerp_channel(w, 0, t, d),
            }
        }
        Keyframe::PulseIn { r, g, b, w, duration_ms } => {
            animation_keyframe_run(&Keyframe::EaseIn { r, g, b, w, duration_ms }, elapsed_ms)
        }
        Keyframe::PulseOut { r, g, b, w, duration_ms } => {
            animation_keyframe_run(&Keyframe::EaseOut { r, g, b, w, duration_ms }, elapsed_ms)
        }
        Keyframe::Lerp { from, to, duration_ms } => {
            let t = elapsed_ms.min(duration_ms);
            let d = duration_ms.max(1);
            DutyCycle {
                r: lerp_channel(from.0, to.0, t, d),
                g: lerp_channel(from.1, to.1, t, d),
                b: lerp_channel(from.2, to.2, t, d),
                w: lerp_channel(from.3, to.3, t, d),
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Animation {
    pub keyframes: [Option<Keyframe>; MAX_KEYFRAMES],
    pub looping: bool,
}

impl Animation {
    pub const fn solid(r: u8, g: u8, b: u8, w: u8) -> Self {
        let mut keyframes = [None; MAX_KEYFRAMES];
        keyframes[0] = Some(Keyframe::Solid { r, g, b, w });
        Self { keyframes, looping: false }
    }

    fn len(&self) -> usize {
        self.keyframes.iter().take_while(|k| k.is_some()).count()
    }

    fn total_duration_ms(&self) -> u32 {
        self.keyframes[..self.len()]
            .iter()
            .filter_map(|k| k.as_ref())
            .map(Keyframe::duration_ms)
            .sum()
    }
}

/// Maps each `UiEvent` to the animation the LED backend should play.
/// One-shot animations fall back to `rest` once they finish.
pub fn animation_for_event(event: UiEvent) -> Animation {
    match event {
        UiEvent::Idle | UiEvent::Deauthenticated => Animation::solid(0, 0, 0, 0),
        UiEvent::Authenticated => Animation::solid(0, 255, 0, 0),
        UiEvent::FingerDown => Animation::solid(0, 0, 255, 0),
        UiEvent::EnrollmentProgress { .. } => Animation::solid(255, 255, 0, 0),
        UiEvent::EnrollmentComplete | UiEvent::TransactionApproved | UiEvent::FwupSuccess => {
            Animation::solid(0, 255, 0, 0)
        }
        UiEvent::EnrollmentFailed | UiEvent::TransactionRejected | UiEvent::FwupFailed => {
            Animation::solid(255, 0, 0, 0)
        }
        UiEvent::TransactionPending => Animation::solid(0, 0, 255, 0),
        UiEvent::Charging => Animation::solid(255, 128, 0, 0),
        UiEvent::ChargingFinished => Animation::solid(0, 255, 0, 0),
        UiEvent::ChargingUnplugged => Animation::solid(0, 0, 0, 0),
        UiEvent::BatterySoc { percent } => {
            if percent < 15 {
                Animation::solid(255, 0, 0, 0)
            } else {
                Animation::solid(0, 0, 0, 0)
            }
        }
        UiEvent::Wiped => Animation::solid(255, 255, 255, 0),
    }
}

/// Drives a single [`Animation`] by elapsed milliseconds, falling back to
/// `rest` once a one-shot animation completes.
pub struct AnimationPlayer {
    current: Animation,
    rest: Animation,
    started_ms: u32,
    fell_back: bool,
}

impl AnimationPlayer {
    pub fn new(rest: Animation) -> Self {
        Self { current: rest, rest, started_ms: 0, fell_back: true }
    }

    pub fn play(&mut self, animation: Animation, now_ms: u32) {
        self.current = animation;
        self.started_ms = now_ms;
        self.fell_back = false;
    }

    /// Advances the player to `now_ms` and returns the duty cycle to drive.
    pub fn poll(&mut self, now_ms: u32) -> DutyCycle {
        let elapsed = now_ms.saturating_sub(self.started_ms);
        if !self.current.looping && !self.fell_back && elapsed >= self.current.total_duration_ms()
        {
            self.current = self.rest;
            self.started_ms = now_ms;
            self.fell_back = true;
        }
        let len = self.current.len();
        if len == 0 {
            return DutyCycle::default();
        }
        let elapsed = if self.current.looping && self.current.total_duration_ms() > 0 {
            elapsed % self.current.total_duration_ms()
        } else {
            elapsed
        };
        let mut remaining = elapsed;
        for (i, keyframe) in self.current.keyframes[..len]
            .iter()
            .filter_map(|k| k.as_ref())
            .enumerate()
        {
            let d = keyframe.duration_ms().max(1);
            if remaining < d || i == len - 1 {
                return animation_keyframe_run(keyframe, remaining);
            }
            remaining = remaining.saturating_sub(d);
        }
        DutyCycle::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ease_in_reaches_target_at_full_duration() {
        let kf = Keyframe::EaseIn { r: 200, g: 0, b: 0, w: 0, duration_ms: 100 };
        let duty = animation_keyframe_run(&kf, 100);
        assert_eq!(duty.r, 200);
    }

    #[test]
    fn ease_in_is_partial_midway() {
        let kf = Keyframe::EaseIn { r: 200, g: 0, b: 0, w: 0, duration_ms: 100 };
        let duty = animation_keyframe_run(&kf, 50);
        assert_eq!(duty.r, 100);
    }

    #[test]
    fn one_shot_falls_back_to_rest_after_completion() {
        let rest = Animation::solid(0, 0, 0, 0);
        let mut player = AnimationPlayer::new(rest);
        let flash = Animation {
            keyframes: {
                let mut k = [None; MAX_KEYFRAMES];
                k[0] = Some(Keyframe::Solid { r: 255, g: 0, b: 0, w: 0 });
                k
            },
            looping: false,
        };
        player.play(flash, 0);
        assert_eq!(player.poll(0).r, 255);
        let after = player.poll(1);
        assert_eq!(after, DutyCycle::default());
    }

    #[test]
    fn looping_animation_never_falls_back() {
        let rest = Animation::solid(0, 0, 0, 0);
        let mut player = AnimationPlayer::new(rest);
        let pulse = Animation {
            keyframes: {
                let mut k = [None; MAX_KEYFRAMES];
                k[0] = Some(Keyframe::PulseIn { r: 255, g: 0, b: 0, w: 0, duration_ms: 100 });
                k
            },
            looping: true,
        };
        player.play(pulse, 0);
        let duty = player.poll(250);
        assert_eq!(duty.r, 255);
    }

    #[test]
    fn battery_low_maps_to_red_solid() {
        let anim = animation_for_event(UiEvent::BatterySoc { percent: 5 });
        assert_eq!(anim.keyframes[0], Some(Keyframe::Solid { r: 255, g: 0, b: 0, w: 0 }));
    }
}

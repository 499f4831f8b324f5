// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! A timer multiplexer.
//!
//! `Multitimer` lets a task treat one logical clock as several independent
//! named timers (auth expiry, unlock delay, sleep timeout, UC retransmit,
//! ...). The caller feeds it a millisecond timestamp on every poll; it hands
//! back the set of timers that have fired since the last poll, rearming any
//! that repeat.
//!
//! Deadlines are plain `u64` milliseconds rather than a syscall-backed
//! deadline register, so the same code runs identically under a real clock
//! and under the `MockClock` used in time-mocked tests.

use enum_map::{EnumArray, EnumMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Never,
    Every(u64),
}

#[derive(Debug, Clone, Copy)]
struct Timer {
    deadline: Option<u64>,
    repeat: Repeat,
}

impl Default for Timer {
    fn default() -> Self {
        Timer {
            deadline: None,
            repeat: Repeat::Never,
        }
    }
}

pub struct Multitimer<E: EnumArray<Timer>> {
    timers: EnumMap<E, Timer>,
}

impl<E: EnumArray<Timer> + Copy> Default for Multitimer<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: EnumArray<Timer> + Copy> Multitimer<E> {
    pub fn new() -> Self {
        Self {
            timers: EnumMap::default(),
        }
    }

    /// Arms `which` to fire at `deadline_ms`, clearing any prior arming.
    pub fn set_timer(&mut self, which: E, deadline_ms: u64, repeat: Repeat) {
        self.timers[which] = Timer {
            deadline: Some(deadline_ms),
            repeat,
        };
    }

    pub fn clear_timer(&mut self, which: E) {
        self.timers[which] = Timer::default();
    }

    pub fn is_armed(&self, which: E) -> bool {
        self.timers[which].deadline.is_some()
    }

    pub fn deadline(&self, which: E) -> Option<u64> {
        self.timers[which].deadline
    }

    /// Earliest deadline across all timers, for sizing a blocking `recv`
    /// timeout.
    pub fn earliest_deadline(&self) -> Option<u64>
    where
        E: enum_map::Enum,
    {
        self.timers
            .values()
            .filter_map(|t| t.deadline)
            .min()
    }

    /// Advances the multiplexer to `now_ms`, returning every timer whose
    /// deadline has passed, oldest-registered-enum-variant first. Repeating
    /// timers are rearmed relative to `now_ms`.
    pub fn poll(&mut self, now_ms: u64) -> heapless::Vec<E, 16>
    where
        E: enum_map::Enum,
    {
        let mut fired = heapless::Vec::new();
        let keys: heapless::Vec<E, 16> = self
            .timers
            .iter()
            .filter_map(|(k, t)| t.deadline.map(|_| k))
            .collect();
        for which in keys {
            let timer = self.timers[which];
            if let Some(deadline) = timer.deadline {
                if now_ms >= deadline {
                    let _ = fired.push(which);
                    match timer.repeat {
                        Repeat::Never => self.timers[which] = Timer::default(),
                        Repeat::Every(period) => {
                            self.timers[which] = Timer {
                                deadline: Some(now_ms + period),
                                repeat: Repeat::Every(period),
                            };
                        }
                    }
                }
            }
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use enum_map::Enum;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
    enum Timers {
        A,
        B,
    }

    #[test]
    fn fires_once_at_deadline() {
        let mut uut: Multitimer<Timers> = Multitimer::new();
        uut.set_timer(Timers::A, 100, Repeat::Never);
        assert!(uut.poll(99).is_empty());
        let fired = uut.poll(100);
        assert_eq!(fired.as_slice(), &[Timers::A]);
        assert!(!uut.is_armed(Timers::A));
    }

    #[test]
    fn repeats() {
        let mut uut: Multitimer<Timers> = Multitimer::new();
        uut.set_timer(Timers::B, 10, Repeat::Every(10));
        let fired = uut.poll(10);
        assert_eq!(fired.as_slice(), &[Timers::B]);
        assert_eq!(uut.deadline(Timers::B), Some(20));
        let fired = uut.poll(19);
        assert!(fired.is_empty());
        let fired = uut.poll(20);
        assert_eq!(fired.as_slice(), &[Timers::B]);
    }

    #[test]
    fn clear_prevents_fire() {
        let mut uut: Multitimer<Timers> = Multitimer::new();
        uut.set_timer(Timers::A, 10, Repeat::Never);
        uut.clear_timer(Timers::A);
        assert!(uut.poll(100).is_empty());
    }

    #[test]
    fn earliest_deadline_picks_min() {
        let mut uut: Multitimer<Timers> = Multitimer::new();
        uut.set_timer(Timers::A, 500, Repeat::Never);
        uut.set_timer(Timers::B, 100, Repeat::Never);
        assert_eq!(uut.earliest_deadline(), Some(100));
    }
}

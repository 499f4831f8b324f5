// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shared-secret unlock retry engine (`spec.md` §4.3).
//!
//! Enforces the monotonically non-decreasing delay schedule and the
//! increment-before-compare ordering that makes a power cut during the
//! comparison unable to buy the attacker a free retry (§8 P4).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::vec::Vec;
use glitch::{GlitchDelay, GlitchDetected};

pub mod config;
pub use config::ATTEMPT_LIMIT;

/// Delay, in milliseconds, owed before the next attempt is accepted, given
/// the failure count that attempt would be. §8 P2/P3 boundary table.
pub fn delay_ms_for_count(count: u32) -> u64 {
    match count {
        0..=3 => 0,
        4 | 5 => 10_000,
        6 => 60_000,
        7 => 5 * 60_000,
        8 => 10 * 60_000,
        _ => 30 * 60_000,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitResponse {
    Delay,
    WipeState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnlockError {
    AlreadyProvisioned,
    StorageErr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckSecretResult {
    Ok,
    WrongSecret { remaining_delay_ms: u64 },
    NoSecretProvisioned,
    WaitingOnDelay { remaining_delay_ms: u64 },
    StorageErr,
}

/// Durable state this engine needs: the unlock secret (once provisioned),
/// retry counter, whether the last-served delay ran to completion, and the
/// configured response to exceeding `ATTEMPT_LIMIT`. One file per field in
/// the real firmware (§6 "Persisted files"); tests use an in-memory impl.
pub trait UnlockStorage {
    fn secret(&self) -> Result<Option<Vec<u8>>, ()>;
    fn provision_secret(&mut self, secret: &[u8]) -> Result<(), ()>;
    fn retry_counter(&self) -> Result<u32, ()>;
    fn set_retry_counter(&mut self, count: u32) -> Result<(), ()>;
    fn delay_complete(&self) -> Result<bool, ()>;
    fn set_delay_complete(&mut self, complete: bool) -> Result<(), ()>;
    fn limit_response(&self) -> Result<LimitResponse, ()>;
    fn set_limit_response(&mut self, response: LimitResponse) -> Result<(), ()>;
}

/// Side effects of a successful/failed attempt, owned by other tasks
/// (auth's authenticated flag, power's sleep inhibitor, key-manager's
/// wipe). Injected so this crate stays a pure state machine.
pub trait UnlockEffects {
    fn authenticate(&mut self);
    fn inhibit_sleep(&mut self, extra_ms: u64);
    fn wipe(&mut self);
}

pub struct UnlockEngine<S> {
    storage: S,
    delay_deadline_ms: Option<u64>,
}

impl<S: UnlockStorage> UnlockEngine<S> {
    /// Reconstitutes any pending delay from the persisted counter, per the
    /// boot-behaviour rule in §4.3: if the counter implies a delay is owed
    /// and the delay was not recorded as complete, restart it from zero
    /// rather than trusting elapsed wall-clock time across a reset.
    pub fn new(storage: S, now_ms: u64) -> Self {
        let mut engine = Self {
            storage,
            delay_deadline_ms: None,
        };
        engine.reconstitute_delay(now_ms);
        engine
    }

    fn reconstitute_delay(&mut self, now_ms: u64) {
        let count = self.storage.retry_counter().unwrap_or(u32::MAX);
        let owed = delay_ms_for_count(count);
        if owed == 0 {
            return;
        }
        let complete = self.storage.delay_complete().unwrap_or(false);
        if !complete {
            self.delay_deadline_ms = Some(now_ms + owed);
        }
    }

    pub fn provision_secret(&mut self, secret: &[u8]) -> Result<(), UnlockError> {
        match self.storage.secret() {
            Ok(Some(_)) => Err(UnlockError::AlreadyProvisioned),
            Ok(None) => self
                .storage
                .provision_secret(secret)
                .map_err(|_| UnlockError::StorageErr),
            Err(()) => Err(UnlockError::StorageErr),
        }
    }

    pub fn configure_limit_response(
        &mut self,
        response: LimitResponse,
    ) -> Result<(), UnlockError> {
        self.storage
            .set_limit_response(response)
            .map_err(|_| UnlockError::StorageErr)
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Lets a successful biometric match (§4.2 step 5) clear the unlock
    /// retry counter without knowing the shared secret.
    pub fn reset_retry_counter(&mut self) {
        let _ = self.storage.set_retry_counter(0);
    }

    /// `spec.md` §4.3 `check_secret` algorithm. `Err(GlitchDetected)` means
    /// the caller must treat this as fatal and reset with `Fault` — it is
    /// never folded into `WrongSecret`.
    pub fn check_secret<D: GlitchDelay, E: UnlockEffects>(
        &mut self,
        delay: &mut D,
        effects: &mut E,
        now_ms: u64,
        attempt: &[u8],
    ) -> Result<CheckSecretResult, GlitchDetected> {
        let stored = match self.storage.secret() {
            Ok(Some(s)) => s,
            Ok(None) => return Ok(CheckSecretResult::NoSecretProvisioned),
            Err(()) => return Ok(CheckSecretResult::StorageErr),
        };

        if let Some(deadline) = self.delay_deadline_ms {
            if now_ms < deadline {
                return Ok(CheckSecretResult::WaitingOnDelay {
                    remaining_delay_ms: deadline - now_ms,
                });
            }
        }

        // Increment and persist the counter *before* the comparison (§8 P4).
        let count = self.storage.retry_counter().unwrap_or(u32::MAX);
        let new_count = count.saturating_add(1);
        if self.storage.set_retry_counter(new_count).is_err() {
            return Ok(CheckSecretResult::StorageErr);
        }

        let matched = glitch::secure_compare(delay, attempt, &stored)?;

        if matched {
            let _ = self.storage.set_retry_counter(0);
            self.delay_deadline_ms = None;
            let _ = self.storage.set_delay_complete(true);
            effects.authenticate();
            return Ok(CheckSecretResult::Ok);
        }

        let owed = delay_ms_for_count(new_count);
        if owed > 0 {
            self.delay_deadline_ms = Some(now_ms + owed);
            let _ = self.storage.set_delay_complete(false);
            effects.inhibit_sleep(owed);
        }
        if new_count > ATTEMPT_LIMIT {
            if let Ok(LimitResponse::WipeState) = self.storage.limit_response() {
                effects.wipe();
            }
        }
        Ok(CheckSecretResult::WrongSecret {
            remaining_delay_ms: owed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glitch::SpinDelay;

    #[derive(Default)]
    struct MemStorage {
        secret: Option<Vec<u8>>,
        retry_counter: u32,
        delay_complete: bool,
        limit_response: Option<LimitResponse>,
    }

    impl UnlockStorage for MemStorage {
        fn secret(&self) -> Result<Option<Vec<u8>>, ()> {
            Ok(self.secret.clone())
        }
        fn provision_secret(&mut self, secret: &[u8]) -> Result<(), ()> {
            self.secret = Some(secret.to_vec());
            Ok(())
        }
        fn retry_counter(&self) -> Result<u32, ()> {
            Ok(self.retry_counter)
        }
        fn set_retry_counter(&mut self, count: u32) -> Result<(), ()> {
            self.retry_counter = count;
            Ok(())
        }
        fn delay_complete(&self) -> Result<bool, ()> {
            Ok(self.delay_complete)
        }
        fn set_delay_complete(&mut self, complete: bool) -> Result<(), ()> {
            self.delay_complete = complete;
            Ok(())
        }
        fn limit_response(&self) -> Result<LimitResponse, ()> {
            Ok(self.limit_response.unwrap_or(LimitResponse::Delay))
        }
        fn set_limit_response(&mut self, response: LimitResponse) -> Result<(), ()> {
            self.limit_response = Some(response);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingEffects {
        authenticated: bool,
        inhibited_ms: Option<u64>,
        wiped: bool,
    }

    impl UnlockEffects for RecordingEffects {
        fn authenticate(&mut self) {
            self.authenticated = true;
        }
        fn inhibit_sleep(&mut self, extra_ms: u64) {
            self.inhibited_ms = Some(extra_ms);
        }
        fn wipe(&mut self) {
            self.wiped = true;
        }
    }

    #[test]
    fn scenario_provision_then_unlock_happy_path() {
        let mut engine = UnlockEngine::new(MemStorage::default(), 0);
        let secret: Vec<u8> = (0..32u8).collect();
        engine.provision_secret(&secret).unwrap();
        let mut delay = SpinDelay::new(7);
        let mut effects = RecordingEffects::default();
        let result = engine
            .check_secret(&mut delay, &mut effects, 0, &secret)
            .unwrap();
        assert_eq!(result, CheckSecretResult::Ok);
        assert!(effects.authenticated);
        assert_eq!(engine.storage.retry_counter, 0);
    }

    #[test]
    fn scenario_third_bad_then_delay() {
        let mut engine = UnlockEngine::new(MemStorage::default(), 0);
        let secret: Vec<u8> = (0..32u8).collect();
        engine.provision_secret(&secret).unwrap();
        let wrong = [0xFFu8; 32];
        let mut delay = SpinDelay::new(1);
        let mut effects = RecordingEffects::default();

        for _ in 0..3 {
            let r = engine
                .check_secret(&mut delay, &mut effects, 0, &wrong)
                .unwrap();
            assert!(matches!(r, CheckSecretResult::WrongSecret { .. }));
        }
        assert_eq!(engine.storage.retry_counter, 3);

        // Fourth attempt: delay of 10s kicks in.
        let r = engine
            .check_secret(&mut delay, &mut effects, 0, &wrong)
            .unwrap();
        assert_eq!(
            r,
            CheckSecretResult::WrongSecret {
                remaining_delay_ms: 10_000
            }
        );
        assert_eq!(engine.storage.retry_counter, 4);

        // Immediately retrying with the *correct* secret still waits.
        let r = engine
            .check_secret(&mut delay, &mut effects, 0, &secret)
            .unwrap();
        assert_eq!(
            r,
            CheckSecretResult::WaitingOnDelay {
                remaining_delay_ms: 10_000
            }
        );
        assert!(!effects.authenticated);
    }

    #[test]
    fn no_secret_provisioned_short_circuits_before_counting() {
        let mut engine = UnlockEngine::new(MemStorage::default(), 0);
        let mut delay = SpinDelay::new(3);
        let mut effects = RecordingEffects::default();
        let r = engine
            .check_secret(&mut delay, &mut effects, 0, b"whatever")
            .unwrap();
        assert_eq!(r, CheckSecretResult::NoSecretProvisioned);
        assert_eq!(engine.storage.retry_counter, 0);
    }

    #[test]
    fn exceeding_limit_with_wipe_response_triggers_wipe() {
        let mut storage = MemStorage::default();
        storage.limit_response = Some(LimitResponse::WipeState);
        let mut engine = UnlockEngine::new(storage, 0);
        let secret: Vec<u8> = (0..32u8).collect();
        engine.provision_secret(&secret).unwrap();
        let wrong = [0u8; 32];
        let mut delay = SpinDelay::new(9);
        let mut effects = RecordingEffects::default();
        let mut now = 0u64;
        for _ in 0..ATTEMPT_LIMIT + 1 {
            let r = engine
                .check_secret(&mut delay, &mut effects, now, &wrong)
                .unwrap();
            if let CheckSecretResult::WrongSecret { remaining_delay_ms } = r {
                now += remaining_delay_ms;
            }
        }
        assert!(effects.wiped);
    }

    #[test]
    fn pending_delay_is_reserved_across_restart() {
        let mut storage = MemStorage::default();
        storage.retry_counter = 6; // implies a 60s delay
        storage.delay_complete = false;
        let engine = UnlockEngine::new(storage, 1_000);
        assert_eq!(engine.delay_deadline_ms, Some(1_000 + 60_000));
    }
}

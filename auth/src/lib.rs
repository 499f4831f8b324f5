// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Authentication state and the fingerprint matcher loop (`spec.md` §4.2).
//!
//! `AuthEngine` owns the authenticated `SecureBool`, its expiry timer, and
//! enrollment bookkeeping, and wraps the `unlock` retry engine so the proto
//! layer has one place to send an unlock secret. `MatcherThread` is the
//! logic the dedicated high-priority biometric task runs on every
//! finger-down interrupt; it is written as a pure step function rather than
//! a spawned thread so the same code drives both the real sensor ISR loop
//! and deterministic tests.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

use abi::SecureBool;
use alloc::vec::Vec;
use enum_map::Enum;
use glitch::{secure_bool_is_true, GlitchDelay, GlitchDetected};
use multitimer::{Multitimer, Repeat};
use unlock::{CheckSecretResult, UnlockEffects, UnlockEngine, UnlockError, UnlockStorage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
enum AuthTimerId {
    Expiry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnrollmentStatus {
    NotInProgress,
    Incomplete,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnrollmentState {
    pub pass_count: u32,
    pub fail_count: u32,
}

/// Side effects other tasks own: the `Locked` UI event, the unlock engine's
/// sleep inhibitor, and wipe-on-limit. Kept as a trait so `auth` does not
/// depend on `ui-events` or `power`.
pub trait AuthEffects {
    fn locked(&mut self);
    fn inhibit_sleep(&mut self, extra_ms: u64);
    fn wipe(&mut self);
}

struct UnlockAdapter<'a, X: AuthEffects> {
    inner: &'a mut X,
}

impl<'a, X: AuthEffects> UnlockEffects for UnlockAdapter<'a, X> {
    fn authenticate(&mut self) {
        // Handled by `send_unlock_secret` after `check_secret` returns, so
        // the expiry timer can be armed with `set_authenticated`.
    }
    fn inhibit_sleep(&mut self, extra_ms: u64) {
        self.inner.inhibit_sleep(extra_ms);
    }
    fn wipe(&mut self) {
        self.inner.wipe();
    }
}

pub struct AuthEngine<US> {
    authenticated: SecureBool,
    timers: Multitimer<AuthTimerId>,
    enrollment_status: EnrollmentStatus,
    enrollment: EnrollmentState,
    unlock: UnlockEngine<US>,
}

impl<US: UnlockStorage> AuthEngine<US> {
    pub fn new(unlock_storage: US, now_ms: u64) -> Self {
        Self {
            authenticated: SecureBool::FALSE,
            timers: Multitimer::new(),
            enrollment_status: EnrollmentStatus::NotInProgress,
            enrollment: EnrollmentState::default(),
            unlock: UnlockEngine::new(unlock_storage, now_ms),
        }
    }

    pub fn start_fingerprint_enrollment(&mut self) {
        self.enrollment_status = EnrollmentStatus::Incomplete;
        self.enrollment = EnrollmentState::default();
    }

    pub fn fingerprint_enrollment_status(&self) -> (EnrollmentStatus, EnrollmentState) {
        (self.enrollment_status, self.enrollment)
    }

    pub fn query_authentication<D: GlitchDelay>(
        &self,
        delay: &mut D,
    ) -> Result<bool, GlitchDetected> {
        secure_bool_is_true(delay, self.authenticated)
    }

    /// Raw `SecureBool` for handing to another crate's glitch-checked entry
    /// point (`keymgr`'s `authenticated: SecureBool` parameters) — callers
    /// that only need a plain `bool` should use `query_authentication`
    /// instead, since collapsing to `bool` here and rebuilding a `SecureBool`
    /// downstream would throw away the redundant representation the whole
    /// point of `SecureBool` is to preserve.
    pub fn authenticated_secure_bool(&self) -> SecureBool {
        self.authenticated
    }

    pub fn set_authenticated<D: GlitchDelay>(
        &mut self,
        delay: &mut D,
        authed: bool,
        now_ms: u64,
        expiry_ms: u64,
        effects: &mut impl AuthEffects,
    ) -> Result<(), GlitchDetected> {
        if authed {
            self.authenticated = SecureBool::TRUE;
            self.timers
                .set_timer(AuthTimerId::Expiry, now_ms + expiry_ms, Repeat::Never);
        } else {
            let was_authenticated = secure_bool_is_true(delay, self.authenticated)?;
            self.authenticated = SecureBool::FALSE;
            self.timers.clear_timer(AuthTimerId::Expiry);
            if was_authenticated {
                effects.locked();
            }
        }
        Ok(())
    }

    pub fn refresh_auth<D: GlitchDelay>(
        &mut self,
        delay: &mut D,
        now_ms: u64,
        expiry_ms: u64,
    ) -> Result<(), GlitchDetected> {
        if self.query_authentication(delay)? {
            self.timers
                .set_timer(AuthTimerId::Expiry, now_ms + expiry_ms, Repeat::Never);
        }
        Ok(())
    }

    /// Drives the expiry timer; call on every tick of the task's event loop.
    pub fn poll<D: GlitchDelay>(
        &mut self,
        delay: &mut D,
        now_ms: u64,
        effects: &mut impl AuthEffects,
    ) -> Result<(), GlitchDetected> {
        let fired = self.timers.poll(now_ms);
        if fired.contains(&AuthTimerId::Expiry) {
            self.set_authenticated(delay, false, now_ms, 0, effects)?;
        }
        Ok(())
    }

    pub fn provision_unlock_secret(&mut self, secret: &[u8]) -> Result<(), UnlockError> {
        self.unlock.provision_secret(secret)
    }

    pub fn configure_unlock_limit_response(
        &mut self,
        response: unlock::LimitResponse,
    ) -> Result<(), UnlockError> {
        self.unlock.configure_limit_response(response)
    }

    /// §4.2 `send_unlock_secret`: the caller has already decrypted the
    /// payload through the secure channel; this delegates to the unlock
    /// retry engine and, on success, authenticates and arms the expiry
    /// timer.
    pub fn send_unlock_secret<D: GlitchDelay>(
        &mut self,
        delay: &mut D,
        now_ms: u64,
        expiry_ms: u64,
        secret: &[u8],
        effects: &mut impl AuthEffects,
    ) -> Result<CheckSecretResult, GlitchDetected> {
        let result = {
            let mut adapter = UnlockAdapter {
                inner: &mut *effects,
            };
            self.unlock.check_secret(delay, &mut adapter, now_ms, secret)?
        };
        if matches!(result, CheckSecretResult::Ok) {
            self.set_authenticated(delay, true, now_ms, expiry_ms, effects)?;
        }
        Ok(result)
    }

    /// Hooks for the matcher thread below: on a fingerprint match it resets
    /// the unlock retry counter (§4.2 step 5) without requiring the correct
    /// shared secret.
    fn reset_unlock_counter(&mut self) {
        self.unlock.reset_retry_counter();
    }

    #[cfg(test)]
    fn unlock_storage_mut(&mut self) -> &mut US {
        self.unlock.storage_mut()
    }
}

pub type Template = Vec<u8>;
pub type Image = Vec<u8>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiometricError {
    InitFailed,
    CaptureFailed,
    ExtractFailed,
}

/// The fingerprint sensor, abstracted so the matcher loop is host-testable.
pub trait Biometrics {
    fn init(&mut self) -> Result<(), BiometricError>;
    fn wait_finger_down(&mut self);
    fn capture(&mut self) -> Result<Image, BiometricError>;
    fn extract(&mut self, image: &Image) -> Result<Template, BiometricError>;
    fn enroll_template(&mut self, template: &Template) -> Result<(), BiometricError>;
    /// Index into `enrolled` of the best match, or `None`.
    fn identify(&mut self, template: &Template, enrolled: &[Template]) -> Option<usize>;
}

pub trait TemplateStore {
    fn templates(&self) -> &[Template];
    fn save(&mut self, template: Template);
    /// Wall-clock time (ms) the stored templates were last refreshed, or
    /// `None` if never recorded. Backs `keymgr::should_refresh_template`'s
    /// rate limit.
    fn last_refresh_ms(&self) -> Option<u64>;
    fn set_last_refresh_ms(&mut self, now_ms: u64);
}

pub trait MatcherFeedback {
    fn finger_down(&mut self);
    fn enroll_pass(&mut self);
    fn enroll_fail(&mut self);
    fn match_ok(&mut self);
    fn match_fail(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherOutcome {
    InitFailed,
    EnrollProgress { passed: bool },
    EnrollComplete,
    MatchSuccess,
    MatchFailed,
    NothingToDo,
}

pub struct MatcherThread {
    pub max_enroll_attempts: u32,
    pub rate_limit_ms: u64,
    initialized: bool,
}

impl MatcherThread {
    pub fn new(max_enroll_attempts: u32, rate_limit_ms: u64) -> Self {
        Self {
            max_enroll_attempts,
            rate_limit_ms,
            initialized: false,
        }
    }

    /// One iteration of the matcher loop (§4.2 steps 1-6): blocks logically
    /// on finger-down, then either runs one enrollment attempt or one
    /// identify attempt, depending on `AuthEngine`'s enrollment status.
    /// Returns the rate-limit delay the caller should sleep, if any.
    #[allow(clippy::too_many_arguments)]
    pub fn service<B, D, US, E, T, X>(
        &mut self,
        bio: &mut B,
        delay: &mut D,
        auth: &mut AuthEngine<US>,
        feedback: &mut E,
        templates: &mut T,
        now_ms: u64,
        expiry_ms: u64,
        effects: &mut X,
        auto_refresh_template: bool,
    ) -> (MatcherOutcome, Option<u64>)
    where
        B: Biometrics,
        D: GlitchDelay,
        US: UnlockStorage,
        E: MatcherFeedback,
        T: TemplateStore,
        X: AuthEffects,
    {
        if !self.initialized {
            if bio.init().is_err() {
                return (MatcherOutcome::InitFailed, Some(5_000));
            }
            self.initialized = true;
        }

        let (status, _) = auth.fingerprint_enrollment_status();
        let already_authenticated = auth
            .query_authentication(delay)
            .unwrap_or(true); // fail safe: treat a glitch as "already authenticated", skip the loop

        bio.wait_finger_down();
        feedback.finger_down();

        if status == EnrollmentStatus::Incomplete {
            return self.run_enrollment_attempt(bio, auth, feedback, templates);
        }

        if templates.templates().is_empty() || already_authenticated {
            return (MatcherOutcome::NothingToDo, None);
        }

        self.run_identify_attempt(
            bio,
            delay,
            auth,
            feedback,
            templates,
            now_ms,
            expiry_ms,
            effects,
            auto_refresh_template,
        )
    }

    fn run_enrollment_attempt<B, US, E, T>(
        &mut self,
        bio: &mut B,
        auth: &mut AuthEngine<US>,
        feedback: &mut E,
        templates: &mut T,
    ) -> (MatcherOutcome, Option<u64>)
    where
        B: Biometrics,
        US: UnlockStorage,
        E: MatcherFeedback,
        T: TemplateStore,
    {
        let passed = (|| -> Result<Template, BiometricError> {
            let image = bio.capture()?;
            bio.extract(&image)
        })()
        .ok();

        match passed {
            Some(template) if bio.enroll_template(&template).is_ok() => {
                feedback.enroll_pass();
                auth.enrollment.pass_count += 1;
                if auth.enrollment.pass_count >= self.max_enroll_attempts {
                    templates.save(template);
                    auth.enrollment_status = EnrollmentStatus::Complete;
                    (MatcherOutcome::EnrollComplete, None)
                } else {
                    (MatcherOutcome::EnrollProgress { passed: true }, None)
                }
            }
            _ => {
                feedback.enroll_fail();
                auth.enrollment.fail_count += 1;
                (MatcherOutcome::EnrollProgress { passed: false }, None)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn run_identify_attempt<B, D, US, E, T, X>(
        &mut self,
        bio: &mut B,
        delay: &mut D,
        auth: &mut AuthEngine<US>,
        feedback: &mut E,
        templates: &mut T,
        now_ms: u64,
        expiry_ms: u64,
        effects: &mut X,
        auto_refresh_template: bool,
    ) -> (MatcherOutcome, Option<u64>)
    where
        B: Biometrics,
        D: GlitchDelay,
        US: UnlockStorage,
        E: MatcherFeedback,
        T: TemplateStore,
        X: AuthEffects,
    {
        let attempt = (|| -> Result<Template, BiometricError> {
            let image = bio.capture()?;
            bio.extract(&image)
        })();

        let template = match attempt {
            Ok(t) => t,
            Err(_) => {
                feedback.match_fail();
                return (MatcherOutcome::MatchFailed, Some(self.rate_limit_ms));
            }
        };

        // Double-read, double-branch: run identify twice and require
        // agreement before trusting a match (§4.2 "no glitch counter
        // increment during the loop").
        let first = bio.identify(&template, templates.templates());
        delay.random_delay();
        let second = bio.identify(&template, templates.templates());

        if first.is_some() && first == second {
            feedback.match_ok();
            auth.reset_unlock_counter();
            // §4.2 step 6: a fingerprint match authenticates the device,
            // same as a correct unlock secret.
            if auth
                .set_authenticated(delay, true, now_ms, expiry_ms, effects)
                .is_err()
            {
                feedback.match_fail();
                return (MatcherOutcome::MatchFailed, Some(self.rate_limit_ms));
            }
            // §4.4 template-update rate limit. No host-timestamp channel is
            // wired into this build's protocol, so `host_timestamp` is
            // always `None`: the refresh fires once, the first time a
            // match happens with the feature on, then never again until
            // `last_refresh_ms` is cleared.
            if keymgr::should_refresh_template(auto_refresh_template, None, templates.last_refresh_ms())
            {
                templates.set_last_refresh_ms(now_ms);
            }
            (MatcherOutcome::MatchSuccess, None)
        } else {
            feedback.match_fail();
            (MatcherOutcome::MatchFailed, Some(self.rate_limit_ms))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glitch::SpinDelay;

    #[derive(Default)]
    struct MemUnlock {
        secret: Option<Vec<u8>>,
        retry_counter: u32,
        delay_complete: bool,
        limit_response: Option<unlock::LimitResponse>,
    }

    impl UnlockStorage for MemUnlock {
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
        fn limit_response(&self) -> Result<unlock::LimitResponse, ()> {
            Ok(self.limit_response.unwrap_or(unlock::LimitResponse::Delay))
        }
        fn set_limit_response(&mut self, response: unlock::LimitResponse) -> Result<(), ()> {
            self.limit_response = Some(response);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingEffects {
        locked_count: u32,
        inhibited_ms: Option<u64>,
        wiped: bool,
    }

    impl AuthEffects for RecordingEffects {
        fn locked(&mut self) {
            self.locked_count += 1;
        }
        fn inhibit_sleep(&mut self, extra_ms: u64) {
            self.inhibited_ms = Some(extra_ms);
        }
        fn wipe(&mut self) {
            self.wiped = true;
        }
    }

    #[test]
    fn set_authenticated_true_then_false_emits_locked_once() {
        let mut auth = AuthEngine::new(MemUnlock::default(), 0);
        let mut delay = SpinDelay::new(1);
        let mut effects = RecordingEffects::default();
        auth.set_authenticated(&mut delay, true, 0, 60_000, &mut effects)
            .unwrap();
        assert!(auth.query_authentication(&mut delay).unwrap());
        auth.set_authenticated(&mut delay, false, 100, 60_000, &mut effects)
            .unwrap();
        assert!(!auth.query_authentication(&mut delay).unwrap());
        assert_eq!(effects.locked_count, 1);

        // Locking again while already locked does not re-emit the event.
        auth.set_authenticated(&mut delay, false, 200, 60_000, &mut effects)
            .unwrap();
        assert_eq!(effects.locked_count, 1);
    }

    #[test]
    fn expiry_timer_locks_after_timeout() {
        let mut auth = AuthEngine::new(MemUnlock::default(), 0);
        let mut delay = SpinDelay::new(2);
        let mut effects = RecordingEffects::default();
        auth.set_authenticated(&mut delay, true, 0, 1_000, &mut effects)
            .unwrap();
        auth.poll(&mut delay, 500, &mut effects).unwrap();
        assert!(auth.query_authentication(&mut delay).unwrap());
        auth.poll(&mut delay, 1_000, &mut effects).unwrap();
        assert!(!auth.query_authentication(&mut delay).unwrap());
        assert_eq!(effects.locked_count, 1);
    }

    #[test]
    fn refresh_auth_only_extends_when_authenticated() {
        let mut auth = AuthEngine::new(MemUnlock::default(), 0);
        let mut delay = SpinDelay::new(3);
        auth.refresh_auth(&mut delay, 0, 1_000).unwrap();
        assert!(!auth.timers.is_armed(AuthTimerId::Expiry));

        let mut effects = RecordingEffects::default();
        auth.set_authenticated(&mut delay, true, 0, 1_000, &mut effects)
            .unwrap();
        auth.refresh_auth(&mut delay, 900, 1_000).unwrap();
        assert_eq!(auth.timers.deadline(AuthTimerId::Expiry), Some(1_900));
    }

    #[test]
    fn send_unlock_secret_authenticates_on_match() {
        let mut auth = AuthEngine::new(MemUnlock::default(), 0);
        let secret: Vec<u8> = (0..32u8).collect();
        auth.provision_unlock_secret(&secret).unwrap();
        let mut delay = SpinDelay::new(4);
        let mut effects = RecordingEffects::default();
        let result = auth
            .send_unlock_secret(&mut delay, 0, 60_000, &secret, &mut effects)
            .unwrap();
        assert_eq!(result, CheckSecretResult::Ok);
        assert!(auth.query_authentication(&mut delay).unwrap());
    }

    #[test]
    fn provisioning_twice_is_rejected() {
        let mut auth = AuthEngine::new(MemUnlock::default(), 0);
        auth.provision_unlock_secret(b"first").unwrap();
        assert_eq!(
            auth.provision_unlock_secret(b"second"),
            Err(UnlockError::AlreadyProvisioned)
        );
    }

    struct FakeBio {
        init_ok: bool,
        template: Template,
        match_index: Option<usize>,
    }

    impl Biometrics for FakeBio {
        fn init(&mut self) -> Result<(), BiometricError> {
            if self.init_ok {
                Ok(())
            } else {
                Err(BiometricError::InitFailed)
            }
        }
        fn wait_finger_down(&mut self) {}
        fn capture(&mut self) -> Result<Image, BiometricError> {
            Ok(vec![0u8; 4])
        }
        fn extract(&mut self, _image: &Image) -> Result<Template, BiometricError> {
            Ok(self.template.clone())
        }
        fn enroll_template(&mut self, _template: &Template) -> Result<(), BiometricError> {
            Ok(())
        }
        fn identify(&mut self, _template: &Template, _enrolled: &[Template]) -> Option<usize> {
            self.match_index
        }
    }

    #[derive(Default)]
    struct NullFeedback;
    impl MatcherFeedback for NullFeedback {
        fn finger_down(&mut self) {}
        fn enroll_pass(&mut self) {}
        fn enroll_fail(&mut self) {}
        fn match_ok(&mut self) {}
        fn match_fail(&mut self) {}
    }

    #[derive(Default)]
    struct VecTemplateStore(Vec<Template>, Option<u64>);
    impl VecTemplateStore {
        fn new(templates: Vec<Template>) -> Self {
            Self(templates, None)
        }
    }
    impl TemplateStore for VecTemplateStore {
        fn templates(&self) -> &[Template] {
            &self.0
        }
        fn save(&mut self, template: Template) {
            self.0.push(template);
        }
        fn last_refresh_ms(&self) -> Option<u64> {
            self.1
        }
        fn set_last_refresh_ms(&mut self, now_ms: u64) {
            self.1 = Some(now_ms);
        }
    }

    #[test]
    fn enrollment_completes_after_max_attempts() {
        let mut auth = AuthEngine::new(MemUnlock::default(), 0);
        auth.start_fingerprint_enrollment();
        let mut bio = FakeBio {
            init_ok: true,
            template: vec![1, 2, 3],
            match_index: None,
        };
        let mut delay = SpinDelay::new(5);
        let mut matcher = MatcherThread::new(2, 2_000);
        let mut feedback = NullFeedback;
        let mut store = VecTemplateStore::default();
        let mut effects = RecordingEffects::default();

        let (outcome, _) = matcher.service(
            &mut bio, &mut delay, &mut auth, &mut feedback, &mut store, 0, 60_000, &mut effects, false,
        );
        assert_eq!(outcome, MatcherOutcome::EnrollProgress { passed: true });
        let (outcome, _) = matcher.service(
            &mut bio, &mut delay, &mut auth, &mut feedback, &mut store, 0, 60_000, &mut effects, false,
        );
        assert_eq!(outcome, MatcherOutcome::EnrollComplete);
        assert_eq!(store.0.len(), 1);
        assert_eq!(
            auth.fingerprint_enrollment_status().0,
            EnrollmentStatus::Complete
        );
    }

    #[test]
    fn identify_match_resets_unlock_counter() {
        let mut auth = AuthEngine::new(MemUnlock::default(), 0);
        auth.unlock_storage_mut().retry_counter = 3;
        let mut bio = FakeBio {
            init_ok: true,
            template: vec![9, 9, 9],
            match_index: Some(0),
        };
        let mut delay = SpinDelay::new(6);
        let mut matcher = MatcherThread::new(2, 2_000);
        let mut feedback = NullFeedback;
        let mut store = VecTemplateStore::new(vec![vec![9, 9, 9]]);
        let mut effects = RecordingEffects::default();

        let (outcome, wait) = matcher.service(
            &mut bio, &mut delay, &mut auth, &mut feedback, &mut store, 0, 60_000, &mut effects, false,
        );
        assert_eq!(outcome, MatcherOutcome::MatchSuccess);
        assert!(wait.is_none());
        assert_eq!(auth.unlock_storage_mut().retry_counter, 0);
        assert!(auth.query_authentication(&mut delay).unwrap());
        assert!(store.last_refresh_ms().is_none());
    }

    #[test]
    fn identify_match_refreshes_template_once_when_enabled() {
        let mut auth = AuthEngine::new(MemUnlock::default(), 0);
        let mut bio = FakeBio {
            init_ok: true,
            template: vec![9, 9, 9],
            match_index: Some(0),
        };
        let mut delay = SpinDelay::new(7);
        let mut matcher = MatcherThread::new(2, 2_000);
        let mut feedback = NullFeedback;
        let mut store = VecTemplateStore::new(vec![vec![9, 9, 9]]);
        let mut effects = RecordingEffects::default();

        let (outcome, _) = matcher.service(
            &mut bio, &mut delay, &mut auth, &mut feedback, &mut store, 1_000, 60_000, &mut effects, true,
        );
        assert_eq!(outcome, MatcherOutcome::MatchSuccess);
        assert_eq!(store.last_refresh_ms(), Some(1_000));

        // Locking and matching again should not refresh a second time; the
        // lack of a host-timestamp channel makes this a one-shot refresh.
        auth.set_authenticated(&mut delay, false, 1_001, 0, &mut effects).unwrap();
        let (outcome, _) = matcher.service(
            &mut bio, &mut delay, &mut auth, &mut feedback, &mut store, 2_000, 60_000, &mut effects, true,
        );
        assert_eq!(outcome, MatcherOutcome::MatchSuccess);
        assert_eq!(store.last_refresh_ms(), Some(1_000));
    }
}

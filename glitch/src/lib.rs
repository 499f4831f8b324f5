// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fault-injection-hardened control flow.
//!
//! Re-implements the `SECURE_DO_*` pattern from the original firmware as
//! small, inlineable, closure-taking helpers: any security-critical branch
//! runs its body twice around a randomized delay and compares results,
//! rather than scattering duplicated reads through call sites. A mismatch
//! is `GlitchDetected`, which every caller must treat as fatal and route to
//! a reset with `abi::ResetReason::Fault` (see `sysinfo`).

#![cfg_attr(not(test), no_std)]

use abi::SecureBool;
use subtle::ConstantTimeEq;

/// Injected source of randomized timing, so callers can swap a hardware
/// RNG/cycle-counter for a deterministic one in tests.
pub trait GlitchDelay {
    fn random_delay(&mut self);
}

/// `xorshift32`-paced spin delay. Adequate as a default: its job is only to
/// de-correlate the two reads/branches in time, not to be cryptographically
/// random.
pub struct SpinDelay {
    state: u32,
}

impl SpinDelay {
    pub fn new(seed: u32) -> Self {
        Self {
            state: if seed == 0 { 0x9E37_79B9 } else { seed },
        }
    }

    fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }
}

impl GlitchDelay for SpinDelay {
    fn random_delay(&mut self) {
        let iters = 1 + (self.next_u32() % 64);
        for _ in 0..iters {
            core::hint::spin_loop();
        }
    }
}

/// Two independent reads of `value` disagreed, or agreed on a pattern that
/// is neither `SecureBool::TRUE` nor `SecureBool::FALSE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlitchDetected;

/// Runs `body` twice around a randomized delay; returns the common result,
/// or `GlitchDetected` if the two runs disagree.
pub fn secure_do<D, T, F>(delay: &mut D, mut body: F) -> Result<T, GlitchDetected>
where
    D: GlitchDelay,
    T: PartialEq,
    F: FnMut() -> T,
{
    let a = body();
    delay.random_delay();
    let b = body();
    if a == b {
        Ok(a)
    } else {
        Err(GlitchDetected)
    }
}

/// Double-read, double-branch evaluation of a `SecureBool`. Never compare a
/// `SecureBool` with `==` outside of this helper.
pub fn secure_bool_is_true<D: GlitchDelay>(
    delay: &mut D,
    value: SecureBool,
) -> Result<bool, GlitchDetected> {
    let a = value.raw();
    delay.random_delay();
    let b = value.raw();
    if a != b {
        return Err(GlitchDetected);
    }
    if a == SecureBool::TRUE.raw() {
        Ok(true)
    } else if a == SecureBool::FALSE.raw() {
        Ok(false)
    } else {
        Err(GlitchDetected)
    }
}

/// Constant-time compare, evaluated twice, for secrets (unlock secret,
/// fingerprint match gate, key-confirmation tags).
pub fn secure_compare<D: GlitchDelay>(
    delay: &mut D,
    a: &[u8],
    b: &[u8],
) -> Result<bool, GlitchDetected> {
    let first: bool = a.ct_eq(b).into();
    delay.random_delay();
    let second: bool = a.ct_eq(b).into();
    if first != second {
        return Err(GlitchDetected);
    }
    Ok(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoDelay;
    impl GlitchDelay for NoDelay {
        fn random_delay(&mut self) {}
    }

    #[test]
    fn secure_compare_matches() {
        let mut d = NoDelay;
        assert_eq!(secure_compare(&mut d, b"abc", b"abc"), Ok(true));
        assert_eq!(secure_compare(&mut d, b"abc", b"abd"), Ok(false));
    }

    #[test]
    fn secure_bool_true_and_false() {
        let mut d = NoDelay;
        assert_eq!(
            secure_bool_is_true(&mut d, SecureBool::TRUE),
            Ok(true)
        );
        assert_eq!(
            secure_bool_is_true(&mut d, SecureBool::FALSE),
            Ok(false)
        );
    }

    #[test]
    fn secure_do_consistent_body_succeeds() {
        let mut d = SpinDelay::new(1);
        let result = secure_do(&mut d, || 42u32);
        assert_eq!(result, Ok(42));
    }

    #[test]
    fn secure_do_disagreeing_body_detected() {
        let mut d = NoDelay;
        let mut calls = 0u32;
        let result = secure_do(&mut d, || {
            calls += 1;
            calls
        });
        assert_eq!(result, Err(GlitchDetected));
    }
}

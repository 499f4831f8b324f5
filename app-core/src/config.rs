// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Task-tunable constants for the Core MCU binary, gathered in one place
//! the way `lib/task-config` does for a Hubris task.

/// Lifetime of a `query_authentication`/`send_unlock_secret` expiry grant;
/// re-armed on every authenticated command via `refresh_auth`.
pub const AUTH_EXPIRY_MS: u64 = 60_000;

/// Matches the values `main.rs` hands `auth::MatcherThread`; surfaced over
/// `FingerprintSettingsGet` so the host can display them.
pub const FINGERPRINT_MAX_ENROLL_ATTEMPTS: u32 = 5;
pub const FINGERPRINT_RATE_LIMIT_MS: u64 = 1_000;

/// Stored-template cap, matching `display_ctrl::MAX_FINGERPRINTS` (the
/// Uxc-side constant of the same value; the two crates don't share a
/// dependency, so this is kept in sync by hand).
pub const MAX_FINGERPRINT_TEMPLATES: usize = 3;

/// How often the matcher thread's stand-in polls its trigger file for a
/// simulated finger-down event.
pub const FINGER_TRIGGER_POLL_MS: u64 = 50;

/// How often `uc_link`'s listener retries reading Uxc's provisioned
/// attestation pubkey while the two binaries are racing to start up.
pub const UC_PROVISIONING_POLL_MS: u64 = 100;
pub const UC_PROVISIONING_RETRIES: u32 = 50;

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Task-tunable constants for the Uxc binary's link, button poll, and
//! idle-loop scheduling.

/// How often the idle loop advances the clock and polls the link/flow
/// engine, mirroring `app-core`'s 20ms scheduler tick.
pub const TICK_PERIOD_MS: u64 = 20;

/// Backoff between connect attempts while the Core listener isn't up yet.
pub const LINK_RECONNECT_BACKOFF_MS: u64 = 250;

/// Host stand-in for button/captouch polling: how often the harness's
/// trigger files are checked.
pub const INPUT_POLL_MS: u64 = 50;

/// Starting SoC reported by the Uxc-side fuel gauge stand-in until Core's
/// `BatterySoc` events start arriving over the link.
pub const DEFAULT_BATTERY_PERCENT: u8 = 100;

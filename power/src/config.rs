// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Task-tunable constants for sleep timeout, break-glass hold, and charger
//! debounce.

pub const DEFAULT_SLEEP_TIMEOUT_MS: u64 = 60_000;
pub const BREAK_GLASS_HOLD_MS: u64 = 10_000;
pub const DEBOUNCE_SAMPLES: u8 = 3;

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Task-tunable constants for watchdog feeding and coprocessor sleep
//! coordination.

pub const WATCHDOG_FEED_PERIOD_MS: u64 = 1_000;
pub const COPROC_SLEEP_PREP_TIMEOUT_MS: u64 = 500;

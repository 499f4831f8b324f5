// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Task-tunable constants for the firmware update state machine.

/// Delay between a successful `fwup_finish` and `schedule_reset`, giving
/// the host time to see the response before the link drops.
pub const FWUP_FINISH_RESET_MS: u64 = 2_000;

pub const MAX_CHUNK_SIZE: usize = 512;

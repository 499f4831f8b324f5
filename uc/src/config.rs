// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Task-tunable constants for the inter-MCU channel's reliability layer
//! (`spec.md` §4.7).

pub const UC_RETRANSMIT_TIMEOUT_MS: u64 = 100;
pub const UC_RETRANSMIT_MAX_COUNT: u32 = 5;
pub const UC_ACK_TIMEOUT_MS: u64 = 20;

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Task-tunable constants for the unlock retry engine.

/// Consecutive wrong-secret count past which `limit_response` fires
/// (delay-forever or wipe, per configuration).
pub const ATTEMPT_LIMIT: u32 = 8;

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Task-tunable sizing constants for enrolled-fingerprint bookkeeping.

pub const MAX_FINGERPRINTS: usize = 3;
pub const LABEL_LEN: usize = 32;

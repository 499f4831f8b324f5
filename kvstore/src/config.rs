// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Task-tunable sizing constants for the key-value store file format.

pub const KEY_CAPACITY: usize = 10;
pub const VALUE_CAPACITY: usize = 52;
pub const MAX_RECORDS: usize = 64;

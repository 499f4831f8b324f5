// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Task-tunable constants for NFC command reassembly and T4T file sizing.

pub const COMMAND_BUFFER_SIZE: usize = 2048;
pub const CC_FILE_SIZE: usize = 32;
pub const NDEF_FILE_SIZE: usize = 1024;

/// How long the worker thread waits for `ProtoRouter::proto_route`'s reply
/// before the RF driver gives up and deactivates the field.
pub const RESPONSE_SEMAPHORE_TIMEOUT_MS: u32 = 7_000;

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Task-tunable constants for the IPC bus and its proto mempool.

/// Matches `nfc::COMMAND_BUFFER_SIZE` — the largest single command/response
/// proto the mempool needs to hold a block for.
pub const PROTO_MEMPOOL_BLOCK_SIZE: usize = 2048;

/// `N` concurrent command protos plus `N` response protos, per spec.md's
/// mempool sizing note.
pub const PROTO_MEMPOOL_BLOCKS: usize = 8;

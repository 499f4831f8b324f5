// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The proto mempool: a fixed-block freelist sized so NFC can hold `N`
//! concurrent command protos and `N` response protos with no dynamic
//! allocation in the hot path. Allocation never blocks; exhaustion is a
//! bug, so it panics rather than returning an error the caller could
//! plausibly recover from.
//!
//! The original firmware implements the freelist with an atomic bitmap;
//! here each block gets its own `Mutex`, which is simpler to verify and,
//! off real hardware, carries no measurable cost. See `DESIGN.md`.

use std::sync::Mutex;

struct Slot {
    in_use: bool,
    data: Vec<u8>,
}

pub struct ProtoMempool {
    block_size: usize,
    slots: Vec<Mutex<Slot>>,
}

impl ProtoMempool {
    pub fn new(block_size: usize, n_blocks: usize) -> Self {
        let slots = (0..n_blocks)
            .map(|_| {
                Mutex::new(Slot {
                    in_use: false,
                    data: vec![0u8; block_size],
                })
            })
            .collect();
        Self { block_size, slots }
    }

    /// Allocates a block able to hold `size` bytes, zero-filled.
    ///
    /// Takes `pool` by `Arc` reference (rather than as a `&self` method) so
    /// the returned `PoolBox` can hold its own owning clone and free itself
    /// on drop without an unstable `Arc<Self>` receiver.
    ///
    /// # Panics
    /// Panics if `size` exceeds the region's block size, or if every block
    /// is in use — both are bugs in the calling task, not recoverable
    /// runtime conditions (see spec.md §4.1).
    pub fn alloc(pool: &std::sync::Arc<ProtoMempool>, size: usize) -> PoolBox {
        assert!(
            size <= pool.block_size,
            "proto mempool request {size} exceeds block size {}",
            pool.block_size
        );
        for (index, slot) in pool.slots.iter().enumerate() {
            let mut guard = slot.lock().unwrap_or_else(|e| e.into_inner());
            if !guard.in_use {
                guard.in_use = true;
                guard.data.clear();
                guard.data.resize(size, 0);
                drop(guard);
                return PoolBox {
                    pool: pool.clone(),
                    index,
                };
            }
        }
        panic!("proto mempool exhausted: all {} blocks in use", pool.slots.len());
    }

    fn free(&self, index: usize) {
        let mut guard = self.slots[index].lock().unwrap_or_else(|e| e.into_inner());
        guard.in_use = false;
        guard.data.clear();
    }
}

/// An allocated block. Freed automatically on drop — the consumer releases
/// it simply by letting its `Arc<PoolBox>` go out of scope.
pub struct PoolBox {
    pool: std::sync::Arc<ProtoMempool>,
    index: usize,
}

impl PoolBox {
    pub fn with<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut guard = self.pool.slots[self.index]
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        f(&mut guard.data)
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.pool.slots[self.index]
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .data
            .clone()
    }
}

impl Drop for PoolBox {
    fn drop(&mut self) {
        self.pool.free(self.index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn alloc_write_read_roundtrip() {
        let pool = Arc::new(ProtoMempool::new(64, 2));
        let block = ProtoMempool::alloc(&pool, 8);
        block.with(|b| b.copy_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]));
        assert_eq!(block.to_vec(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn freed_block_is_reusable() {
        let pool = Arc::new(ProtoMempool::new(64, 1));
        {
            let _block = ProtoMempool::alloc(&pool, 4);
        }
        let _again = ProtoMempool::alloc(&pool, 4);
    }

    #[test]
    #[should_panic(expected = "exhausted")]
    fn exhaustion_panics() {
        let pool = Arc::new(ProtoMempool::new(64, 1));
        let _first = ProtoMempool::alloc(&pool, 4);
        let _second = ProtoMempool::alloc(&pool, 4);
    }

    #[test]
    #[should_panic(expected = "exceeds block size")]
    fn oversized_alloc_panics() {
        let pool = Arc::new(ProtoMempool::new(16, 1));
        let _oversized = ProtoMempool::alloc(&pool, 17);
    }
}

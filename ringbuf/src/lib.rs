// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Bounded ring-buffer logging for task debugging.
//!
//! Each task keeps a fixed-size history of structured events instead of
//! formatting log lines at runtime. Declare one with [`ringbuf!`] and
//! record with [`ringbuf_entry!`]; consecutive identical entries are
//! coalesced into a repeat count rather than filling the buffer with
//! duplicates.

use std::sync::Mutex;

#[derive(Debug, Clone, Copy)]
pub struct RingbufEntry<T> {
    pub payload: T,
    pub count: u32,
}

pub struct Ringbuf<T, const N: usize> {
    inner: Mutex<Inner<T, N>>,
}

struct Inner<T, const N: usize> {
    buf: [Option<RingbufEntry<T>>; N],
    next: usize,
}

impl<T: Copy + PartialEq, const N: usize> Ringbuf<T, N> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                buf: [None; N],
                next: 0,
            }),
        }
    }

    pub fn entry(&self, payload: T) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let prev = inner.next.checked_sub(1).unwrap_or(N - 1);
        if let Some(last) = &mut inner.buf[prev] {
            if last.payload == payload {
                last.count += 1;
                return;
            }
        }
        let next = inner.next;
        inner.buf[next] = Some(RingbufEntry { payload, count: 1 });
        inner.next = (next + 1) % N;
    }

    /// Snapshot the buffer in insertion order, oldest first, for tests and
    /// diagnostic dumps.
    pub fn snapshot(&self) -> Vec<RingbufEntry<T>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = Vec::new();
        for i in 0..N {
            let idx = (inner.next + i) % N;
            if let Some(entry) = inner.buf[idx] {
                out.push(entry);
            }
        }
        out
    }
}

#[macro_export]
macro_rules! ringbuf {
    ($name:ident, $t:ty, $n:expr) => {
        static $name: $crate::Ringbuf<$t, $n> = $crate::Ringbuf::new();
    };
}

#[macro_export]
macro_rules! ringbuf_entry {
    ($name:expr, $payload:expr) => {
        $name.entry($payload)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Event {
        A,
        B(u32),
    }

    ringbuf!(TEST_RINGBUF, Event, 4);

    #[test]
    fn wraps_and_dedups() {
        ringbuf_entry!(TEST_RINGBUF, Event::A);
        ringbuf_entry!(TEST_RINGBUF, Event::A);
        ringbuf_entry!(TEST_RINGBUF, Event::B(1));
        ringbuf_entry!(TEST_RINGBUF, Event::B(2));
        ringbuf_entry!(TEST_RINGBUF, Event::B(3));
        ringbuf_entry!(TEST_RINGBUF, Event::B(4));
        let snap = TEST_RINGBUF.snapshot();
        assert_eq!(snap.len(), 4);
        assert!(snap.iter().all(|e| e.payload != Event::A));
    }
}

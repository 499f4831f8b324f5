// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The NFC outgoing-response scratch buffer.
//!
//! WCA (`nfc`) owns exactly one in-flight response at a time (serialised by
//! its own response semaphore, see `spec.md` §4.6); `response_buffer()` /
//! `send_response_buffer()` give the task owning the proto a mutex-guarded
//! place to encode into, and a way to hand the encoded bytes back to NFC
//! without NFC needing to know who produced them.

use std::sync::{Arc, Mutex};

type ReadyCallback = dyn Fn(&[u8]) + Send + Sync;

pub struct ResponseBuffer {
    buf: Mutex<Vec<u8>>,
    ready: Mutex<Option<Arc<ReadyCallback>>>,
}

impl ResponseBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: Mutex::new(Vec::with_capacity(capacity)),
            ready: Mutex::new(None),
        }
    }

    /// Registers the callback invoked whenever a response is committed.
    /// Owned by NFC/WCA: it is how the drained-and-framed bytes make it
    /// back into outgoing APDUs.
    pub fn on_ready(&self, cb: impl Fn(&[u8]) + Send + Sync + 'static) {
        *self.ready.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(cb));
    }

    /// Acquires the scratch buffer for encoding. Held until the caller
    /// calls `send_response_buffer`.
    pub fn acquire(&self) -> std::sync::MutexGuard<'_, Vec<u8>> {
        self.buf.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Commits `data` as the response and notifies the ready callback.
    pub fn send_response_buffer(&self, data: &[u8]) {
        {
            let mut buf = self.buf.lock().unwrap_or_else(|e| e.into_inner());
            buf.clear();
            buf.extend_from_slice(data);
        }
        let cb = self.ready.lock().unwrap_or_else(|e| e.into_inner()).clone();
        if let Some(cb) = cb {
            cb(data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn ready_callback_sees_committed_bytes() {
        let rb = ResponseBuffer::new(16);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen2 = seen.clone();
        rb.on_ready(move |data| {
            seen2.store(data.len(), Ordering::SeqCst);
        });
        rb.send_response_buffer(&[1, 2, 3]);
        assert_eq!(seen.load(Ordering::SeqCst), 3);
    }
}

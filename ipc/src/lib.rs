// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The inter-task message bus: typed ports, `MessageRef` queues, and the
//! shared proto mempool used to shuttle NFC command/response buffers
//! between tasks without heap churn in the hot path.
//!
//! `spec.md` §4.1 models this on top of real RTOS queues and a syscall
//! boundary. Per the Design Notes, the syscall/MPU story is a deployment
//! concern; here each `Port` is a bounded channel owned by one task's
//! `Mailbox`, and `Bus` is the process-wide registry other tasks look up
//! a port's sender through.

pub mod config;
mod mempool;
mod response;

pub use mempool::{PoolBox, ProtoMempool};
pub use response::ResponseBuffer;

use abi::Port;
use config::{PROTO_MEMPOOL_BLOCKS, PROTO_MEMPOOL_BLOCK_SIZE};
use std::collections::HashMap;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Sentinel requesting an unbounded blocking wait, matching the firmware's
/// `timeout_ms = MAX` convention.
pub const TIMEOUT_FOREVER: u32 = u32::MAX;

/// The payload carried by a `MessageRef`. `Shared` is the default
/// (reference) mode: the producer's `Arc` keeps the bytes alive until every
/// consumer drops its clone. `Owned` is the mempool-backed mode requested
/// with `SendOptions::take_ownership`.
#[derive(Clone)]
pub enum Object {
    Nil,
    Shared(Arc<[u8]>),
    Owned(Arc<PoolBox>),
}

impl Object {
    pub fn as_slice(&self) -> Vec<u8> {
        match self {
            Object::Nil => Vec::new(),
            Object::Shared(bytes) => bytes.to_vec(),
            Object::Owned(b) => b.to_vec(),
        }
    }
}

/// `{ tag, length, object }`, as specified in §3 of the data model.
#[derive(Clone)]
pub struct MessageRef {
    pub tag: u32,
    pub length: usize,
    pub object: Object,
}

impl MessageRef {
    pub fn empty(tag: u32) -> Self {
        Self {
            tag,
            length: 0,
            object: Object::Nil,
        }
    }

    pub fn referencing(tag: u32, data: &[u8]) -> Self {
        Self {
            tag,
            length: data.len(),
            object: Object::Shared(Arc::from(data)),
        }
    }
}

#[derive(Clone, Copy)]
pub struct SendOptions {
    pub timeout_ms: u32,
    /// When set, `Bus::send` copies the object into the proto mempool
    /// before enqueuing, so the producer's own buffer can be reused
    /// immediately; the consumer releases the pool block by calling
    /// `Bus::release` once it's done with the message.
    pub take_ownership: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            timeout_ms: TIMEOUT_FOREVER,
            take_ownership: false,
        }
    }
}

#[derive(Clone, Copy)]
pub struct RecvOptions {
    pub timeout_ms: u32,
}

impl Default for RecvOptions {
    fn default() -> Self {
        Self {
            timeout_ms: TIMEOUT_FOREVER,
        }
    }
}

/// The registering task's end of a bound port.
pub struct Mailbox {
    port: Port,
    rx: Receiver<MessageRef>,
}

impl Mailbox {
    pub fn port(&self) -> Port {
        self.port
    }

    /// Blocking dequeue. Returns `None` on timeout, matching `recv`'s
    /// `false` return in the source contract.
    pub fn recv(&self, opts: RecvOptions) -> Option<MessageRef> {
        if opts.timeout_ms == TIMEOUT_FOREVER {
            self.rx.recv().ok()
        } else {
            self.rx
                .recv_timeout(Duration::from_millis(u64::from(opts.timeout_ms)))
                .ok()
        }
    }
}

/// The process-wide port registry. One `Bus` is constructed at boot and
/// shared (via `Arc`) by every task's `Context`.
pub struct Bus {
    senders: Mutex<HashMap<Port, SyncSender<MessageRef>>>,
    mempool: Arc<ProtoMempool>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    pub fn new() -> Self {
        Self {
            senders: Mutex::new(HashMap::new()),
            mempool: Arc::new(ProtoMempool::new(PROTO_MEMPOOL_BLOCK_SIZE, PROTO_MEMPOOL_BLOCKS)),
        }
    }

    /// Binds `port` to a freshly created bounded queue. Must happen before
    /// any `send`/`recv` targeting this port; calling twice for the same
    /// port replaces the previous binding, which is a programmer error in
    /// every caller in this workspace (each port is owned by exactly one
    /// task).
    pub fn register_port(&self, port: Port, capacity: usize) -> Mailbox {
        let (tx, rx) = sync_channel(capacity.max(1));
        self.senders.lock().unwrap_or_else(|e| e.into_inner()).insert(port, tx);
        Mailbox { port, rx }
    }

    /// Enqueues `msg` on `port`. A send to an unregistered port returns
    /// `false` rather than panicking. With `opts.take_ownership`, the
    /// object is first copied into the proto mempool so the producer's own
    /// buffer is free to reuse; the consumer later calls `release`.
    pub fn send(&self, port: Port, mut msg: MessageRef, opts: SendOptions) -> bool {
        if opts.take_ownership {
            let bytes = msg.object.as_slice();
            let block = ProtoMempool::alloc(&self.mempool, bytes.len());
            block.with(|dst| dst[..bytes.len()].copy_from_slice(&bytes));
            msg.object = Object::Owned(Arc::new(block));
        }
        let tx = {
            let guard = self.senders.lock().unwrap_or_else(|e| e.into_inner());
            guard.get(&port).cloned()
        };
        let Some(tx) = tx else {
            return false;
        };
        if opts.timeout_ms == TIMEOUT_FOREVER {
            return tx.send(msg).is_ok();
        }
        if opts.timeout_ms == 0 {
            return tx.try_send(msg).is_ok();
        }
        let deadline = Instant::now() + Duration::from_millis(u64::from(opts.timeout_ms));
        let mut msg = msg;
        loop {
            match tx.try_send(msg) {
                Ok(()) => return true,
                Err(TrySendError::Disconnected(_)) => return false,
                Err(TrySendError::Full(returned)) => {
                    msg = returned;
                    if Instant::now() >= deadline {
                        return false;
                    }
                    std::thread::sleep(Duration::from_micros(200));
                }
            }
        }
    }

    pub fn send_empty(&self, port: Port, tag: u32) -> bool {
        self.send(port, MessageRef::empty(tag), SendOptions::default())
    }

    /// Releases a message taken via `take_ownership`. Mempool-backed
    /// objects return their block to the freelist on drop, so this is the
    /// named counterpart the source contract expects the consumer to call
    /// once it's done reading `msg.object`; `Shared`/`Nil` objects have no
    /// pool block and this is a plain drop for them.
    pub fn release(&self, msg: MessageRef) {
        drop(msg);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_then_recv_in_order() {
        let bus = Bus::new();
        let mailbox = bus.register_port(Port::Auth, 4);
        assert!(bus.send(Port::Auth, MessageRef::empty(1), SendOptions::default()));
        assert!(bus.send(Port::Auth, MessageRef::empty(2), SendOptions::default()));
        let first = mailbox.recv(RecvOptions::default()).unwrap();
        let second = mailbox.recv(RecvOptions::default()).unwrap();
        assert_eq!(first.tag, 1);
        assert_eq!(second.tag, 2);
    }

    #[test]
    fn send_to_unregistered_port_fails_softly() {
        let bus = Bus::new();
        assert!(!bus.send_empty(Port::Nfc, 7));
    }

    #[test]
    fn recv_times_out_when_empty() {
        let bus = Bus::new();
        let mailbox = bus.register_port(Port::Unlock, 1);
        let got = mailbox.recv(RecvOptions { timeout_ms: 5 });
        assert!(got.is_none());
    }

    #[test]
    fn take_ownership_copies_into_mempool() {
        let bus = Bus::new();
        let mailbox = bus.register_port(Port::Nfc, 4);
        let opts = SendOptions { take_ownership: true, ..SendOptions::default() };
        assert!(bus.send(Port::Nfc, MessageRef::referencing(1, b"hello"), opts));
        let received = mailbox.recv(RecvOptions::default()).unwrap();
        assert!(matches!(received.object, Object::Owned(_)));
        assert_eq!(received.object.as_slice(), b"hello");
        bus.release(received);
    }

    #[test]
    fn full_queue_nonblocking_send_fails() {
        let bus = Bus::new();
        let _mailbox = bus.register_port(Port::Fwup, 1);
        assert!(bus.send(Port::Fwup, MessageRef::empty(1), SendOptions { timeout_ms: 0 }));
        assert!(!bus.send(Port::Fwup, MessageRef::empty(2), SendOptions { timeout_ms: 0 }));
    }
}

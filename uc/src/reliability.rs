// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! DATA/ACK reliability: per-message retransmit timer, ACK piggybacking
//! window, and duplicate-DATA dedup (`spec.md` §4.7).

use enum_map::Enum;
use multitimer::{Multitimer, Repeat};

use crate::config::{UC_ACK_TIMEOUT_MS, UC_RETRANSMIT_MAX_COUNT, UC_RETRANSMIT_TIMEOUT_MS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Enum)]
enum UcTimerId {
    Retransmit,
    AckPiggyback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Caller should (re)transmit the DATA frame now.
    Transmit,
    /// Retries exhausted; the message is undeliverable.
    Failed,
}

/// One outstanding DATA send, waiting on an ACK.
pub struct Sender {
    timer: Multitimer<UcTimerId>,
    sequence: u8,
    attempts: u32,
    acked: bool,
}

impl Sender {
    pub fn new() -> Self {
        Self { timer: Multitimer::new(), sequence: 0, attempts: 0, acked: true }
    }

    /// Begins sending `sequence`; returns `Transmit` for the caller's first
    /// attempt.
    pub fn start(&mut self, sequence: u8, now_ms: u64) -> SendOutcome {
        self.sequence = sequence;
        self.attempts = 1;
        self.acked = false;
        self.timer.set_timer(UcTimerId::Retransmit, now_ms + UC_RETRANSMIT_TIMEOUT_MS, Repeat::Never);
        SendOutcome::Transmit
    }

    pub fn on_ack(&mut self, sequence: u8) {
        if sequence == self.sequence {
            self.acked = true;
            self.timer.clear_timer(UcTimerId::Retransmit);
        }
    }

    pub fn is_settled(&self) -> bool {
        self.acked
    }

    /// Polls the retransmit timer; retransmits up to `UC_RETRANSMIT_MAX_COUNT`
    /// times before reporting failure.
    pub fn poll(&mut self, now_ms: u64) -> Option<SendOutcome> {
        if self.acked || self.timer.poll(now_ms).is_empty() {
            return None;
        }
        if self.attempts >= UC_RETRANSMIT_MAX_COUNT {
            return Some(SendOutcome::Failed);
        }
        self.attempts += 1;
        self.timer.set_timer(UcTimerId::Retransmit, now_ms + UC_RETRANSMIT_TIMEOUT_MS, Repeat::Never);
        Some(SendOutcome::Transmit)
    }
}

impl Default for Sender {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveOutcome {
    /// New message; caller should process it and (if an outgoing DATA isn't
    /// imminent) schedule a pure ACK.
    Accept,
    /// Same sequence as the last accepted message; discard the payload but
    /// still ACK, so a lost ACK doesn't wedge the sender.
    DuplicateReAck,
}

/// Receiver-side dedup plus the ACK piggyback window.
pub struct Receiver {
    timer: Multitimer<UcTimerId>,
    last_accepted: Option<u8>,
    ack_pending: Option<u8>,
}

impl Receiver {
    pub fn new() -> Self {
        Self { timer: Multitimer::new(), last_accepted: None, ack_pending: None }
    }

    pub fn on_data(&mut self, sequence: u8, now_ms: u64) -> ReceiveOutcome {
        self.ack_pending = Some(sequence);
        self.timer.set_timer(UcTimerId::AckPiggyback, now_ms + UC_ACK_TIMEOUT_MS, Repeat::Never);
        if self.last_accepted == Some(sequence) {
            ReceiveOutcome::DuplicateReAck
        } else {
            self.last_accepted = Some(sequence);
            ReceiveOutcome::Accept
        }
    }

    /// Takes the pending ACK to piggyback on an outgoing DATA frame, if any.
    pub fn take_piggyback_ack(&mut self) -> Option<u8> {
        let seq = self.ack_pending.take()?;
        self.timer.clear_timer(UcTimerId::AckPiggyback);
        Some(seq)
    }

    /// Polls the piggyback window; once it expires without an outgoing DATA
    /// frame to ride on, the idle handler must send a pure ACK.
    pub fn poll(&mut self, now_ms: u64) -> Option<u8> {
        if self.timer.poll(now_ms).is_empty() {
            return None;
        }
        self.ack_pending.take()
    }
}

impl Default for Receiver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retransmits_until_limit_then_fails() {
        let mut sender = Sender::new();
        sender.start(1, 0);
        let mut now = 0u64;
        for _ in 1..UC_RETRANSMIT_MAX_COUNT {
            now += UC_RETRANSMIT_TIMEOUT_MS;
            assert_eq!(sender.poll(now), Some(SendOutcome::Transmit));
        }
        now += UC_RETRANSMIT_TIMEOUT_MS;
        assert_eq!(sender.poll(now), Some(SendOutcome::Failed));
    }

    #[test]
    fn ack_stops_retransmission() {
        let mut sender = Sender::new();
        sender.start(7, 0);
        sender.on_ack(7);
        assert!(sender.is_settled());
        assert_eq!(sender.poll(UC_RETRANSMIT_TIMEOUT_MS), None);
    }

    #[test]
    fn duplicate_data_is_discarded_but_reacked() {
        let mut receiver = Receiver::new();
        assert_eq!(receiver.on_data(3, 0), ReceiveOutcome::Accept);
        receiver.take_piggyback_ack();
        assert_eq!(receiver.on_data(3, 10), ReceiveOutcome::DuplicateReAck);
        assert_eq!(receiver.take_piggyback_ack(), Some(3));
    }

    #[test]
    fn idle_handler_sends_pure_ack_after_piggyback_window() {
        let mut receiver = Receiver::new();
        receiver.on_data(5, 0);
        assert_eq!(receiver.poll(UC_ACK_TIMEOUT_MS), Some(5));
        assert_eq!(receiver.poll(UC_ACK_TIMEOUT_MS + 1), None);
    }
}

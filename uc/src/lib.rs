// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Inter-MCU secure channel: framing, reliability (retransmit/ACK/dedup),
//! the X25519+HKDF+AES-GCM session, and message routing between the Core
//! and UXC tasks (`spec.md` §4.7).

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
mod framing;
mod link_message;
mod reliability;
mod route;
mod secure;

pub use config::{UC_ACK_TIMEOUT_MS, UC_RETRANSMIT_MAX_COUNT, UC_RETRANSMIT_TIMEOUT_MS};
pub use framing::{build_frame, parse_frame, FrameHeader, FrameType, FramingError};
pub use link_message::{decode_link_message, encode_link_message, LinkMessage};
pub use reliability::{ReceiveOutcome, Receiver, SendOutcome, Sender};
pub use route::{RouteError, RouteHandler, Router, MAX_ROUTES};
pub use secure::{respond, HandshakeInitiator, HandshakeResponse, SecureError, SecureRandom, Session};

use abi::ProtoTag;
use alloc::vec::Vec;

/// One side of the channel: owns the reliability state machines and
/// hands decoded messages to the router.
pub struct Channel<H> {
    sender: Sender,
    receiver: Receiver,
    router: Router<H>,
    next_sequence: u8,
}

impl<H: RouteHandler> Channel<H> {
    pub fn new() -> Self {
        Self { sender: Sender::new(), receiver: Receiver::new(), router: Router::new(), next_sequence: 0 }
    }

    pub fn register(&mut self, tag: ProtoTag, handler: H) {
        self.router.register(tag, handler);
    }

    /// Encodes `payload` tagged with `tag` as a DATA frame, bypassing the
    /// retransmit queue entirely for tags that must not wait.
    ///
    /// Returns the bytes to transmit; the caller still drives `poll` to
    /// learn whether retransmission is needed, except for immediate sends
    /// which the peer must ACK within `UC_ACK_TIMEOUT_MS` or the link is
    /// considered desynced.
    pub fn uc_send_immediate(&mut self, tag: ProtoTag, payload: &[u8]) -> Vec<u8> {
        let mut framed = Vec::with_capacity(payload.len() + 3);
        framed.extend_from_slice(&(tag as u16).to_le_bytes());
        framed.extend_from_slice(payload);
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        build_frame(FrameHeader { frame_type: FrameType::Data, sequence }, &framed)
    }

    /// Queues `payload` under `tag` for the normal retransmit/ACK path.
    pub fn uc_send(&mut self, now_ms: u64, tag: ProtoTag, payload: &[u8]) -> (SendOutcome, Vec<u8>) {
        let mut framed = Vec::with_capacity(payload.len() + 3);
        framed.extend_from_slice(&(tag as u16).to_le_bytes());
        framed.extend_from_slice(payload);
        let sequence = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        let outcome = self.sender.start(sequence, now_ms);
        let frame = build_frame(FrameHeader { frame_type: FrameType::Data, sequence }, &framed);
        (outcome, frame)
    }

    /// Decodes and routes one received DATA frame. Duplicate sequences are
    /// dropped before reaching `uc_route`, but still produce an ACK.
    pub fn uc_route(&mut self, raw: &mut [u8], now_ms: u64) -> Result<ReceiveOutcome, FramingError> {
        let (header, body) = parse_frame(raw)?;
        let outcome = self.receiver.on_data(header.sequence, now_ms);
        if outcome == ReceiveOutcome::Accept {
            if body.len() >= 2 {
                let tag_bits = u16::from_le_bytes([body[0], body[1]]);
                if let Some(tag) = decode_tag(tag_bits) {
                    let _ = self.router.dispatch(tag, &body[2..]);
                }
            }
        }
        Ok(outcome)
    }

    pub fn on_ack(&mut self, sequence: u8) {
        self.sender.on_ack(sequence);
    }

    pub fn take_piggyback_ack(&mut self) -> Option<u8> {
        self.receiver.take_piggyback_ack()
    }
}

impl<H: RouteHandler> Default for Channel<H> {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_tag(bits: u16) -> Option<ProtoTag> {
    const TAGS: &[ProtoTag] = &[
        ProtoTag::StartFingerprintEnrollment,
        ProtoTag::GetFingerprintEnrollmentStatus,
        ProtoTag::QueryAuthentication,
        ProtoTag::SendUnlockSecret,
        ProtoTag::ProvisionUnlockSecret,
        ProtoTag::ConfigureUnlockLimitResponse,
        ProtoTag::DeriveKeyDescriptor,
        ProtoTag::DeriveKeyDescriptorAndSign,
        ProtoTag::SealCsek,
        ProtoTag::UnsealCsek,
        ProtoTag::HardwareAttestation,
        ProtoTag::SecureChannelEstablish,
        ProtoTag::DerivePublicKey,
        ProtoTag::DerivePublicKeyAndSign,
        ProtoTag::FwupStart,
        ProtoTag::FwupTransfer,
        ProtoTag::FwupFinish,
        ProtoTag::Meta,
        ProtoTag::DeviceId,
        ProtoTag::WipeState,
        ProtoTag::Fuel,
        ProtoTag::CoredumpGet,
        ProtoTag::EventsGet,
        ProtoTag::FeatureFlagsGet,
        ProtoTag::FeatureFlagsSet,
        ProtoTag::TelemetryIdGet,
        ProtoTag::SecinfoGet,
        ProtoTag::CertGet,
        ProtoTag::PubkeysGet,
        ProtoTag::PubkeyGet,
        ProtoTag::FingerprintSettingsGet,
        ProtoTag::CapTouchCal,
        ProtoTag::Empty,
        ProtoTag::DeviceInfo,
        ProtoTag::LockDevice,
    ];
    TAGS.get(bits as usize).copied()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::rc::Rc;
    use core::cell::RefCell;

    struct Recorder(Rc<RefCell<Vec<Vec<u8>>>>);

    impl RouteHandler for Recorder {
        fn handle(&mut self, _tag: ProtoTag, payload: &[u8]) {
            self.0.borrow_mut().push(payload.to_vec());
        }
    }

    #[test]
    fn send_and_route_round_trips_through_a_channel() {
        let mut sender_side: Channel<Recorder> = Channel::new();
        let mut receiver_side: Channel<Recorder> = Channel::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        receiver_side.register(ProtoTag::LockDevice, Recorder(seen.clone()));

        let (outcome, mut frame) = sender_side.uc_send(0, ProtoTag::LockDevice, b"now");
        assert_eq!(outcome, SendOutcome::Transmit);

        let route_outcome = receiver_side.uc_route(&mut frame, 0).unwrap();
        assert_eq!(route_outcome, ReceiveOutcome::Accept);
        assert_eq!(receiver_side.take_piggyback_ack(), Some(0));
        assert_eq!(seen.borrow()[0], b"now");
    }

    #[test]
    fn immediate_send_skips_the_retransmit_queue() {
        let mut channel: Channel<Recorder> = Channel::new();
        let frame = channel.uc_send_immediate(ProtoTag::CapTouchCal, b"cal");
        // no outstanding retransmit state was created for this send
        assert_eq!(channel.sender.poll(UC_RETRANSMIT_TIMEOUT_MS), None);
        assert!(!frame.is_empty());
    }

    #[test]
    fn duplicate_frame_is_dropped_before_reaching_the_router() {
        let mut channel: Channel<Recorder> = Channel::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        channel.register(ProtoTag::FwupStart, Recorder(seen.clone()));
        let mut first = channel.uc_send_immediate(ProtoTag::FwupStart, b"a");
        let mut replay = first.clone();

        assert_eq!(channel.uc_route(&mut first, 0).unwrap(), ReceiveOutcome::Accept);
        assert_eq!(channel.uc_route(&mut replay, 1).unwrap(), ReceiveOutcome::DuplicateReAck);
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn unknown_tag_bits_are_ignored_without_panicking() {
        assert_eq!(decode_tag(9999), None);
    }
}

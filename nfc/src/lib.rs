// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! NFC listener: WCA (wallet custom APDU) command dispatch and T4T file
//! emulation, behind a single `route` entry point (`spec.md` §4.6).
//!
//! The vendor RFAL stack and the ISR/worker-thread split that services it
//! live outside this crate (see `app-core`/`app-uxc`); this crate is the
//! protocol logic the worker thread's `route` upcall runs.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

pub mod config;
mod status;
mod t4t;
mod wca;

pub use config::{
    CC_FILE_SIZE, COMMAND_BUFFER_SIZE, NDEF_FILE_SIZE, RESPONSE_SEMAPHORE_TIMEOUT_MS,
};
pub use status::StatusWord;
pub use t4t::{FileId, NfcIns, T4tError, T4tState};
pub use wca::{Apdu, ResponseDrain, WcaError, WcaIns, WcaReassembly, NFC_PROTO_VERSION, WCA_CLA};

use abi::ProtoTag;
use alloc::vec::Vec;
use glitch::GlitchDelay;

ringbuf::ringbuf!(NFC_TRACE, Event, 16);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    WcaDispatch(WcaIns),
    T4tDispatch(NfcIns),
    UnrecognizedHeader,
}

/// What the caller's RF driver should do after `route` returns.
pub enum RfAction {
    /// Send `response` back over RF.
    Respond(Vec<u8>),
    /// Tear down the field immediately: the first post-activation byte
    /// matched neither a WCA nor a T4T header, which otherwise leaves
    /// Android background readers hung waiting for a response that will
    /// never come.
    Deactivate,
}

/// Posts a reassembled command to its owning task and blocks for the
/// reply, matching `ipc.proto_route`'s contract in the original design.
/// `None` means the response semaphore timed out.
pub trait ProtoRouter {
    fn proto_route(&mut self, tag: ProtoTag, command: &[u8]) -> Option<Vec<u8>>;
}

const PROTO_TAGS_BY_FIELD_NUMBER: &[ProtoTag] = &[
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

/// Decodes the top-level oneof tag from the first protobuf field tag byte;
/// field number 1 maps to `ProtoTag`'s first declared variant, and so on.
fn decode_oneof_tag(buf: &[u8]) -> Option<ProtoTag> {
    let first_byte = *buf.first()?;
    let field_number = (first_byte >> 3) as usize;
    field_number.checked_sub(1).and_then(|i| PROTO_TAGS_BY_FIELD_NUMBER.get(i)).copied()
}

/// Owns the WCA reassembly/drain state and the T4T file objects for one
/// RF session. Not `Send`/shareable: the worker thread in `app-core` owns
/// one of these and the ISR thread only ever wakes it via the response
/// semaphore.
pub struct NfcRouter<D> {
    reassembly: WcaReassembly<COMMAND_BUFFER_SIZE>,
    drain: Option<ResponseDrain>,
    t4t: T4tState<CC_FILE_SIZE, NDEF_FILE_SIZE>,
    /// At most one in-flight proto exchange: a `PROTO` arriving while the
    /// reassembly or the drain is still live is rejected rather than
    /// clobbering it.
    busy: bool,
    delay: D,
}

impl<D: GlitchDelay> NfcRouter<D> {
    pub fn new(delay: D) -> Self {
        Self {
            reassembly: WcaReassembly::new(),
            drain: None,
            t4t: T4tState::new(),
            busy: false,
            delay,
        }
    }

    pub fn t4t_mut(&mut self) -> &mut T4tState<CC_FILE_SIZE, NDEF_FILE_SIZE> {
        &mut self.t4t
    }

    /// The RFAL worker thread's upcall: `apdu` is the decoded command APDU
    /// for this post-activation exchange. A random delay precedes dispatch
    /// to de-correlate it from any synchronized fault-injection attempt.
    pub fn route(&mut self, apdu: &Apdu, proto: &mut impl ProtoRouter) -> RfAction {
        self.delay.random_delay();
        if apdu.is_wca() {
            if let Some(ins) = WcaIns::from_byte(apdu.ins) {
                ringbuf::ringbuf_entry!(NFC_TRACE, Event::WcaDispatch(ins));
            }
            self.route_wca(apdu, proto)
        } else if let Some(ins) = NfcIns::from_byte(apdu.ins) {
            ringbuf::ringbuf_entry!(NFC_TRACE, Event::T4tDispatch(ins));
            self.route_t4t(apdu).unwrap_or(RfAction::Deactivate)
        } else {
            ringbuf::ringbuf_entry!(NFC_TRACE, Event::UnrecognizedHeader);
            RfAction::Deactivate
        }
    }

    fn route_wca(&mut self, apdu: &Apdu, proto: &mut impl ProtoRouter) -> RfAction {
        let Some(ins) = WcaIns::from_byte(apdu.ins) else {
            return RfAction::Respond(status_only(StatusWord::GenericFailure(0)));
        };
        match ins {
            WcaIns::Version => {
                let mut out = NFC_PROTO_VERSION.to_be_bytes().to_vec();
                out.extend_from_slice(&StatusWord::Ok.to_bytes());
                RfAction::Respond(out)
            }
            WcaIns::Proto => {
                if self.busy {
                    return RfAction::Respond(status_only(StatusWord::GenericFailure(1)));
                }
                let total_len = ((apdu.p1 as usize) << 8) | apdu.p2 as usize;
                if self.reassembly.start(total_len, apdu.data).is_err() {
                    return RfAction::Respond(status_only(StatusWord::GenericFailure(2)));
                }
                self.busy = true;
                self.finish_if_complete(proto)
            }
            WcaIns::ProtoCont => {
                if self.reassembly.cont(apdu.data).is_err() {
                    self.busy = false;
                    return RfAction::Respond(status_only(StatusWord::GenericFailure(3)));
                }
                self.finish_if_complete(proto)
            }
            WcaIns::GetResponse => {
                let Some(drain) = self.drain.as_mut() else {
                    return RfAction::Respond(status_only(StatusWord::GenericFailure(4)));
                };
                let mut out = alloc::vec![0u8; apdu.p2.max(1) as usize];
                let (n, sw) = drain.drain(&mut out);
                out.truncate(n);
                if drain.is_empty() {
                    self.drain = None;
                    self.busy = false;
                }
                out.extend_from_slice(&sw.to_bytes());
                RfAction::Respond(out)
            }
        }
    }

    /// Posts the fully reassembled command once the last chunk arrives.
    /// The response itself is not returned here: it rides `GET_RESPONSE`
    /// calls, and this APDU is only acked with how many bytes await.
    fn finish_if_complete(&mut self, proto: &mut impl ProtoRouter) -> RfAction {
        if !self.reassembly.is_complete() {
            return RfAction::Respond(status_only(StatusWord::Ok));
        }
        let command = self.reassembly.take().expect("checked complete above");
        let Some(tag) = decode_oneof_tag(&command) else {
            self.busy = false;
            return RfAction::Respond(status_only(StatusWord::GenericFailure(5)));
        };
        match proto.proto_route(tag, &command) {
            Some(response) => {
                let remaining = response.len().min(255) as u8;
                self.drain = Some(ResponseDrain::new(response));
                if remaining > 0 {
                    RfAction::Respond(status_only(StatusWord::OkMoreData(remaining)))
                } else {
                    self.busy = false;
                    RfAction::Respond(status_only(StatusWord::Ok))
                }
            }
            None => {
                self.busy = false;
                RfAction::Respond(status_only(StatusWord::GenericFailure(6)))
            }
        }
    }

    fn route_t4t(&mut self, apdu: &Apdu) -> Option<RfAction> {
        let ins = NfcIns::from_byte(apdu.ins)?;
        let sw = match ins {
            NfcIns::Select => {
                let Some(file_id) = apdu.data.get(0..2).and_then(|b| FileId::from_bytes([b[0], b[1]])) else {
                    return Some(RfAction::Respond(status_only(StatusWord::GenericFailure(7))));
                };
                self.t4t.select(file_id);
                StatusWord::Ok
            }
            NfcIns::ReadBinary => {
                let offset = ((apdu.p1 as usize) << 8) | apdu.p2 as usize;
                let len = if apdu.data.is_empty() { 0 } else { apdu.data[0] as usize };
                return Some(match self.t4t.read_binary(offset, len) {
                    Ok(bytes) => {
                        let mut out = bytes.to_vec();
                        out.extend_from_slice(&StatusWord::Ok.to_bytes());
                        RfAction::Respond(out)
                    }
                    Err(_) => RfAction::Respond(status_only(StatusWord::GenericFailure(8))),
                });
            }
            NfcIns::UpdateBinary => {
                let offset = ((apdu.p1 as usize) << 8) | apdu.p2 as usize;
                match self.t4t.update_binary(offset, apdu.data) {
                    Ok(()) => StatusWord::Ok,
                    Err(_) => StatusWord::GenericFailure(9),
                }
            }
            NfcIns::UpdateBinaryOdo => match self.t4t.update_binary_odo(apdu.data) {
                Ok(()) => StatusWord::Ok,
                Err(_) => StatusWord::GenericFailure(10),
            },
        };
        Some(RfAction::Respond(status_only(sw)))
    }
}

fn status_only(sw: StatusWord) -> Vec<u8> {
    sw.to_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use glitch::SpinDelay;

    struct EchoProto;
    impl ProtoRouter for EchoProto {
        fn proto_route(&mut self, _tag: ProtoTag, command: &[u8]) -> Option<Vec<u8>> {
            Some(command.to_vec())
        }
    }

    fn version_apdu() -> Apdu<'static> {
        Apdu { cla: WCA_CLA, ins: 0x74, p1: 0, p2: 0, data: &[] }
    }

    #[test]
    fn version_returns_protocol_number() {
        let mut router = NfcRouter::new(SpinDelay::new(1));
        let mut proto = EchoProto;
        match router.route(&version_apdu(), &mut proto) {
            RfAction::Respond(bytes) => {
                assert_eq!(&bytes[..2], &NFC_PROTO_VERSION.to_be_bytes());
                assert_eq!(&bytes[2..], &StatusWord::Ok.to_bytes());
            }
            RfAction::Deactivate => panic!("expected a response"),
        }
    }

    #[test]
    fn unrecognized_header_deactivates_the_field() {
        let mut router = NfcRouter::new(SpinDelay::new(1));
        let mut proto = EchoProto;
        let bogus = Apdu { cla: 0x00, ins: 0xFF, p1: 0, p2: 0, data: &[] };
        assert!(matches!(router.route(&bogus, &mut proto), RfAction::Deactivate));
    }

    #[test]
    fn t4t_select_and_read_binary_succeeds_even_when_empty() {
        let mut router = NfcRouter::new(SpinDelay::new(2));
        let mut proto = EchoProto;
        let select = Apdu { cla: 0x00, ins: 0xA4, p1: 0, p2: 0, data: &[0xE1, 0x04] };
        assert!(matches!(router.route(&select, &mut proto), RfAction::Respond(_)));
        let read = Apdu { cla: 0x00, ins: 0xB0, p1: 0, p2: 0, data: &[0] };
        match router.route(&read, &mut proto) {
            RfAction::Respond(bytes) => assert_eq!(&bytes[..], &StatusWord::Ok.to_bytes()),
            RfAction::Deactivate => panic!("iOS compatibility requires a response"),
        }
    }
}

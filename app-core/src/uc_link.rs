// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host transport for the inter-MCU secure channel: a Unix domain socket
//! standing in for the real UART/SPI link to the display MCU. Core binds
//! and accepts the one connection a two-MCU board would ever have, and
//! drives the handshake as initiator, per `uc::secure`.
//!
//! Uxc's attestation public key is read from the shared provisioning
//! directory rather than carried on the wire — the signature it
//! authenticates would be meaningless if the verify key travelled over
//! the same unauthenticated channel.

use std::io::{Read, Write};
use std::net::Shutdown;
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use abi::ProtoTag;
use uc::{
    build_frame, parse_frame, FrameHeader, FrameType, HandshakeInitiator, LinkMessage,
    ReceiveOutcome, Receiver, RouteHandler, SecureError, SecureRandom, UC_ACK_TIMEOUT_MS,
    UC_RETRANSMIT_MAX_COUNT,
};

use crate::config::{UC_PROVISIONING_POLL_MS, UC_PROVISIONING_RETRIES};

ringbuf::ringbuf!(LINK_TRACE, Event, 16);

#[derive(Debug, Clone, Copy, PartialEq)]
enum Event {
    Connected,
    ButtonPress(display_ctrl::ButtonEvent),
    FlowActionReport(display_ctrl::FlowAction),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    Io,
    Framing,
    Secure,
    ProvisioningMissing,
}

impl From<std::io::Error> for LinkError {
    fn from(_: std::io::Error) -> Self {
        LinkError::Io
    }
}

impl From<uc::FramingError> for LinkError {
    fn from(_: uc::FramingError) -> Self {
        LinkError::Framing
    }
}

impl From<SecureError> for LinkError {
    fn from(_: SecureError) -> Self {
        LinkError::Secure
    }
}

/// `uc::Channel`'s `ProtoTag` forwarding seam, wired but dormant here for
/// the same reason `proto::CoprocForwarder` is: this build carries
/// `UiEvent`/button/flow traffic over `LinkMessage` directly instead of
/// through the `ProtoTag` vocabulary.
pub struct DormantHandler;

impl RouteHandler for DormantHandler {
    fn handle(&mut self, _tag: ProtoTag, _payload: &[u8]) {}
}

fn read_frame_bytes(stream: &mut impl Read) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        stream.read_exact(&mut byte)?;
        buf.push(byte[0]);
        if byte[0] == 0 {
            return Ok(buf);
        }
    }
}

fn read_uxc_verify_key(provisioning_dir: &Path) -> Result<[u8; 33], LinkError> {
    let path = provisioning_dir.join("uxc-attestation-pubkey.bin");
    for _ in 0..UC_PROVISIONING_RETRIES {
        if let Ok(bytes) = std::fs::read(&path) {
            if let Ok(key) = <[u8; 33]>::try_from(bytes.as_slice()) {
                return Ok(key);
            }
        }
        std::thread::sleep(Duration::from_millis(UC_PROVISIONING_POLL_MS));
    }
    Err(LinkError::ProvisioningMissing)
}

pub struct CoreLink {
    writer: Arc<Mutex<UnixStream>>,
    session: Arc<Mutex<uc::Session>>,
    next_sequence: AtomicU8,
    ack_rx: Mutex<mpsc::Receiver<u8>>,
    #[allow(dead_code)]
    channel: Mutex<uc::Channel<DormantHandler>>,
}

impl CoreLink {
    /// Binds `socket_path`, accepts Uxc's one connection, and runs the
    /// initiator handshake against its pre-provisioned attestation key.
    /// Inbound `ButtonPress`/`FlowActionReport` messages are recorded to
    /// `LINK_TRACE` rather than driving Core's own business logic — Core's
    /// auth/fwup/sysinfo state is not meant to react to display-side input
    /// directly, only through the NFC/host commands it already serves.
    pub fn listen(
        socket_path: &Path,
        provisioning_dir: &Path,
        rng: &mut impl SecureRandom,
    ) -> Result<Self, LinkError> {
        let _ = std::fs::remove_file(socket_path);
        let listener = UnixListener::bind(socket_path)?;
        let (mut stream, _) = listener.accept()?;
        ringbuf::ringbuf_entry!(LINK_TRACE, Event::Connected);

        let uxc_verify_key = read_uxc_verify_key(provisioning_dir)?;

        let initiator = HandshakeInitiator::begin(rng);
        let hello = build_frame(FrameHeader { frame_type: FrameType::Data, sequence: 0 }, &initiator.public);
        stream.write_all(&hello)?;

        let mut reply_frame = read_frame_bytes(&mut stream)?;
        let (_header, reply_body) = parse_frame(&mut reply_frame)?;
        if reply_body.len() != 32 + 64 + 16 {
            return Err(LinkError::Framing);
        }
        let responder_public: [u8; 32] = reply_body[..32].try_into().unwrap();
        let responder_signature: [u8; 64] = reply_body[32..96].try_into().unwrap();
        let responder_confirmation: [u8; 16] = reply_body[96..112].try_into().unwrap();

        let (session, initiator_confirm) = initiator.finish(
            responder_public,
            &responder_signature,
            &responder_confirmation,
            &uxc_verify_key,
        )?;

        let confirm_frame = build_frame(
            FrameHeader { frame_type: FrameType::Data, sequence: 0 },
            &initiator_confirm,
        );
        stream.write_all(&confirm_frame)?;

        let writer = Arc::new(Mutex::new(stream.try_clone()?));
        let session = Arc::new(Mutex::new(session));
        let (ack_tx, ack_rx) = mpsc::channel();

        {
            let writer = writer.clone();
            let session = session.clone();
            std::thread::spawn(move || {
                let mut reader_stream = stream;
                let mut receiver = Receiver::new();
                loop {
                    let Ok(mut raw) = read_frame_bytes(&mut reader_stream) else { break };
                    let Ok((header, body)) = parse_frame(&mut raw) else { continue };
                    match header.frame_type {
                        FrameType::Ack => {
                            let _ = ack_tx.send(header.sequence);
                        }
                        FrameType::Data => {
                            let outcome = receiver.on_data(header.sequence, 0);
                            let ack = build_frame(
                                FrameHeader { frame_type: FrameType::Ack, sequence: header.sequence },
                                &[],
                            );
                            if let Ok(mut w) = writer.lock() {
                                let _ = w.write_all(&ack);
                            }
                            if outcome != ReceiveOutcome::Accept {
                                continue;
                            }
                            let Ok(mut session) = session.lock() else { break };
                            let Ok(plaintext) = session.open(&body) else { continue };
                            match uc::decode_link_message(&plaintext) {
                                Some(LinkMessage::ButtonPress(btn)) => {
                                    ringbuf::ringbuf_entry!(LINK_TRACE, Event::ButtonPress(btn));
                                }
                                Some(LinkMessage::FlowActionReport(action)) => {
                                    ringbuf::ringbuf_entry!(LINK_TRACE, Event::FlowActionReport(action));
                                }
                                Some(LinkMessage::UiEvent(_)) | None => {}
                            }
                        }
                    }
                }
            });
        }

        Ok(Self {
            writer,
            session,
            next_sequence: AtomicU8::new(1),
            ack_rx: Mutex::new(ack_rx),
            channel: Mutex::new(uc::Channel::new()),
        })
    }

    /// Seals and sends one `UiEvent`, retransmitting on a bare
    /// `UC_ACK_TIMEOUT_MS` silence up to `UC_RETRANSMIT_MAX_COUNT` times.
    /// Drops the event on persistent silence rather than blocking the
    /// caller — a missed LED/screen update is not worth stalling Core's
    /// NFC command loop over.
    pub fn send_event(&self, event: ui_events::UiEvent) -> Result<(), LinkError> {
        let plaintext = uc::encode_link_message(LinkMessage::UiEvent(event));
        let sealed = self.session.lock().unwrap_or_else(|e| e.into_inner()).seal(&plaintext)?;
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let frame = build_frame(FrameHeader { frame_type: FrameType::Data, sequence }, &sealed);

        let ack_rx = self.ack_rx.lock().unwrap_or_else(|e| e.into_inner());
        for _ in 0..=UC_RETRANSMIT_MAX_COUNT {
            self.writer.lock().unwrap_or_else(|e| e.into_inner()).write_all(&frame)?;
            loop {
                match ack_rx.recv_timeout(Duration::from_millis(UC_ACK_TIMEOUT_MS)) {
                    Ok(seq) if seq == sequence => return Ok(()),
                    Ok(_) => continue,
                    Err(_) => break,
                }
            }
        }
        Ok(())
    }
}

impl Drop for CoreLink {
    fn drop(&mut self) {
        if let Ok(w) = self.writer.lock() {
            let _ = w.shutdown(Shutdown::Both);
        }
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Host transport for the inter-MCU secure channel: a Unix domain socket
//! standing in for the real UART/SPI link between the two MCUs. Core
//! listens and initiates the handshake; this side connects and responds,
//! per `uc::secure`.
//!
//! Framing and the handshake messages travel unencrypted (there is no
//! session yet to encrypt them under); every `Data` frame after the
//! handshake carries a `Session::seal`ed payload.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use abi::ProtoTag;
use uc::{
    build_frame, parse_frame, respond, FrameHeader, FrameType, LinkMessage, ReceiveOutcome,
    Receiver, RouteHandler, SecureError, SecureRandom, UC_ACK_TIMEOUT_MS, UC_RETRANSMIT_MAX_COUNT,
};

use crate::config::LINK_RECONNECT_BACKOFF_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    Io,
    Framing,
    Secure,
    ConfirmationMismatch,
    PeerGone,
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

/// `uc::Channel`'s `ProtoTag` forwarding seam, wired but dormant: this
/// build routes display/button/flow traffic over `LinkMessage` directly
/// rather than through a `ProtoTag`, the same way `app-core::proto`'s
/// `CoprocForwarder` exists for the seam's sake without this build
/// exercising it.
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

pub struct UxcLink {
    writer: Arc<Mutex<UnixStream>>,
    session: Arc<Mutex<uc::Session>>,
    next_sequence: AtomicU8,
    ack_rx: Mutex<mpsc::Receiver<u8>>,
    inbox_rx: Mutex<mpsc::Receiver<LinkMessage>>,
    #[allow(dead_code)]
    channel: Mutex<uc::Channel<DormantHandler>>,
}

impl UxcLink {
    /// Connects to Core's listener at `socket_path`, retrying with a fixed
    /// backoff until it accepts, then runs the responder handshake and
    /// spawns the reader thread that decrypts and dispatches inbound
    /// frames, ACKing each as it is accepted.
    pub fn connect(
        socket_path: &Path,
        attestation_key: &[u8; 32],
        rng: &mut impl SecureRandom,
    ) -> Result<Self, LinkError> {
        let mut stream = loop {
            match UnixStream::connect(socket_path) {
                Ok(s) => break s,
                Err(_) => std::thread::sleep(Duration::from_millis(LINK_RECONNECT_BACKOFF_MS)),
            }
        };

        let mut initiator_frame = read_frame_bytes(&mut stream)?;
        let (_header, initiator_public_bytes) = parse_frame(&mut initiator_frame)?;
        let initiator_public: [u8; 32] =
            initiator_public_bytes.try_into().map_err(|_| LinkError::Framing)?;

        let (session, reply, expected_initiator_confirm) =
            respond(rng, initiator_public, attestation_key)?;

        let mut reply_body = Vec::with_capacity(32 + 64 + 16);
        reply_body.extend_from_slice(&reply.public);
        reply_body.extend_from_slice(&reply.signature);
        reply_body.extend_from_slice(&reply.confirmation);
        let reply_frame =
            build_frame(FrameHeader { frame_type: FrameType::Data, sequence: 0 }, &reply_body);
        stream.write_all(&reply_frame)?;

        let mut confirm_frame = read_frame_bytes(&mut stream)?;
        let (_header, confirm_body) = parse_frame(&mut confirm_frame)?;
        let initiator_confirm: [u8; 16] = confirm_body.try_into().map_err(|_| LinkError::Framing)?;
        if initiator_confirm != expected_initiator_confirm {
            return Err(LinkError::ConfirmationMismatch);
        }

        let writer = Arc::new(Mutex::new(stream.try_clone()?));
        let session = Arc::new(Mutex::new(session));
        let (ack_tx, ack_rx) = mpsc::channel();
        let (inbox_tx, inbox_rx) = mpsc::channel();

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
                            if let Some(msg) = uc::decode_link_message(&plaintext) {
                                let _ = inbox_tx.send(msg);
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
            inbox_rx: Mutex::new(inbox_rx),
            channel: Mutex::new(uc::Channel::new()),
        })
    }

    /// Seals and sends one message, retransmitting on a bare
    /// `UC_ACK_TIMEOUT_MS` silence up to `UC_RETRANSMIT_MAX_COUNT` times
    /// before giving up on the peer.
    pub fn send(&self, msg: LinkMessage) -> Result<(), LinkError> {
        let plaintext = uc::encode_link_message(msg);
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
        Err(LinkError::PeerGone)
    }

    /// Blocks for the next inbound application message.
    pub fn recv(&self) -> Result<LinkMessage, LinkError> {
        self.inbox_rx.lock().unwrap_or_else(|e| e.into_inner()).recv().map_err(|_| LinkError::PeerGone)
    }
}

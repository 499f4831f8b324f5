// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wallet Custom APDU: a minimal CLA=0x87 layer that chunks a protobuf
//! command into `command_buffer_size`, then drains the response across
//! successive `GET_RESPONSE` calls (`spec.md` §4.6).

use crate::status::StatusWord;

pub const WCA_CLA: u8 = 0x87;
pub const NFC_PROTO_VERSION: u16 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WcaIns {
    Version,
    Proto,
    ProtoCont,
    GetResponse,
}

impl WcaIns {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x74 => Some(WcaIns::Version),
            0x75 => Some(WcaIns::Proto),
            0x77 => Some(WcaIns::ProtoCont),
            0x78 => Some(WcaIns::GetResponse),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Apdu<'a> {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: &'a [u8],
}

impl<'a> Apdu<'a> {
    pub fn is_wca(&self) -> bool {
        self.cla == WCA_CLA
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WcaError {
    NotWca,
    UnknownIns,
    /// A `PROTO_CONT` or `GET_RESPONSE` arrived with no command in
    /// progress, or a `PROTO` arrived while one already is.
    BadState,
    /// Declared total size exceeds `command_buffer_size`.
    Overflow,
}

/// Reassembles a chunked protobuf command into a fixed `N`-byte buffer.
pub struct WcaReassembly<const N: usize> {
    buffer: heapless::Vec<u8, N>,
    expected_len: usize,
    active: bool,
}

impl<const N: usize> WcaReassembly<N> {
    pub fn new() -> Self {
        Self { buffer: heapless::Vec::new(), expected_len: 0, active: false }
    }

    /// Handles `PROTO`: `total_len` is decoded from P1‖P2, `first_chunk` is
    /// the APDU body.
    pub fn start(&mut self, total_len: usize, first_chunk: &[u8]) -> Result<(), WcaError> {
        if total_len > N {
            return Err(WcaError::Overflow);
        }
        self.buffer.clear();
        self.buffer.extend_from_slice(first_chunk).map_err(|_| WcaError::Overflow)?;
        self.expected_len = total_len;
        self.active = true;
        Ok(())
    }

    /// Handles `PROTO_CONT`.
    pub fn cont(&mut self, chunk: &[u8]) -> Result<(), WcaError> {
        if !self.active {
            return Err(WcaError::BadState);
        }
        self.buffer.extend_from_slice(chunk).map_err(|_| WcaError::Overflow)?;
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.active && self.buffer.len() >= self.expected_len
    }

    /// Takes the reassembled command once complete, resetting state for the
    /// next exchange.
    pub fn take(&mut self) -> Option<heapless::Vec<u8, N>> {
        if !self.is_complete() {
            return None;
        }
        self.active = false;
        Some(core::mem::replace(&mut self.buffer, heapless::Vec::new()))
    }
}

impl<const N: usize> Default for WcaReassembly<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Drains a response buffer across successive `GET_RESPONSE` APDUs.
pub struct ResponseDrain {
    data: alloc::vec::Vec<u8>,
    offset: usize,
}

impl ResponseDrain {
    pub fn new(data: alloc::vec::Vec<u8>) -> Self {
        Self { data, offset: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.offset >= self.data.len()
    }

    /// Copies up to `out.len()` bytes into `out`, returning how many were
    /// written and the status word to report (`61xx` if more remains,
    /// `9000` once drained).
    pub fn drain(&mut self, out: &mut [u8]) -> (usize, StatusWord) {
        let remaining = &self.data[self.offset..];
        let n = remaining.len().min(out.len());
        out[..n].copy_from_slice(&remaining[..n]);
        self.offset += n;
        let left = self.data.len() - self.offset;
        let sw = if left > 0 { StatusWord::OkMoreData(left.min(255) as u8) } else { StatusWord::Ok };
        (n, sw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassembles_across_proto_and_proto_cont() {
        let mut r: WcaReassembly<64> = WcaReassembly::new();
        r.start(6, b"abc").unwrap();
        assert!(!r.is_complete());
        r.cont(b"def").unwrap();
        assert!(r.is_complete());
        let full = r.take().unwrap();
        assert_eq!(&full[..], b"abcdef");
    }

    #[test]
    fn oversized_command_is_rejected() {
        let mut r: WcaReassembly<4> = WcaReassembly::new();
        assert_eq!(r.start(8, b"ab"), Err(WcaError::Overflow));
    }

    #[test]
    fn cont_without_start_is_bad_state() {
        let mut r: WcaReassembly<64> = WcaReassembly::new();
        assert_eq!(r.cont(b"x"), Err(WcaError::BadState));
    }

    #[test]
    fn response_drains_across_multiple_get_response_calls() {
        let data = alloc::vec::Vec::from(&b"0123456789"[..]);
        let mut drain = ResponseDrain::new(data);
        let mut out = [0u8; 4];
        let (n, sw) = drain.drain(&mut out);
        assert_eq!(n, 4);
        assert_eq!(sw, StatusWord::OkMoreData(6));
        let (n, sw) = drain.drain(&mut out);
        assert_eq!(n, 4);
        assert_eq!(sw, StatusWord::OkMoreData(2));
        let (n, sw) = drain.drain(&mut out);
        assert_eq!(n, 2);
        assert_eq!(sw, StatusWord::Ok);
        assert!(drain.is_empty());
    }
}

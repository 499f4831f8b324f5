// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire framing for the inter-MCU channel: `{ hdr, proto_bytes, crc32 }`,
//! COBS-encoded and `0x00`-delimited (`spec.md` §4.7).

use alloc::vec::Vec;
use crc::{Crc, CRC_32_ISCSI};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);
// 1 byte type + 1 byte sequence + 2 byte length (LE), per the inter-MCU
// wire format.
const HEADER_SIZE: usize = 4;
const CRC_SIZE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Data,
    Ack,
}

impl FrameType {
    fn to_byte(self) -> u8 {
        match self {
            FrameType::Data => 0x01,
            FrameType::Ack => 0x02,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0x01 => Some(FrameType::Data),
            0x02 => Some(FrameType::Ack),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_type: FrameType,
    pub sequence: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramingError {
    Cobs,
    TooShort,
    BadCrc,
    UnknownType,
}

/// Plaintext frame body: header + payload + trailing CRC32, ready for COBS
/// encoding. Encryption under the secure channel (when established) wraps
/// this whole buffer before framing; see `secure`.
pub fn build_frame(header: FrameHeader, payload: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
    body.push(header.frame_type.to_byte());
    body.push(header.sequence);
    body.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    body.extend_from_slice(payload);
    let crc = CRC32.checksum(&body);
    body.extend_from_slice(&crc.to_le_bytes());
    let mut encoded = alloc::vec![0u8; corncobs::max_encoded_len(body.len())];
    let n = corncobs::encode_buf(&body, &mut encoded);
    encoded.truncate(n);
    encoded.push(0);
    encoded
}

/// Decodes one `0x00`-delimited COBS frame already isolated from the
/// stream, verifying its CRC.
pub fn parse_frame(raw: &mut [u8]) -> Result<(FrameHeader, Vec<u8>), FramingError> {
    let raw = if raw.last() == Some(&0) { &mut raw[..raw.len() - 1] } else { raw };
    let n = corncobs::decode_in_place(raw).map_err(|_| FramingError::Cobs)?;
    let body = &raw[..n];
    if body.len() < HEADER_SIZE + CRC_SIZE {
        return Err(FramingError::TooShort);
    }
    let (head_and_payload, crc_bytes) = body.split_at(body.len() - CRC_SIZE);
    let expected_crc = u32::from_le_bytes(crc_bytes.try_into().unwrap());
    if CRC32.checksum(head_and_payload) != expected_crc {
        return Err(FramingError::BadCrc);
    }
    let frame_type = FrameType::from_byte(head_and_payload[0]).ok_or(FramingError::UnknownType)?;
    let sequence = head_and_payload[1];
    let length = u16::from_le_bytes([head_and_payload[2], head_and_payload[3]]) as usize;
    let payload = &head_and_payload[HEADER_SIZE..];
    if payload.len() != length {
        return Err(FramingError::TooShort);
    }
    Ok((FrameHeader { frame_type, sequence }, payload.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_data_frame() {
        let header = FrameHeader { frame_type: FrameType::Data, sequence: 42 };
        let mut encoded = build_frame(header, b"hello");
        let (decoded_header, payload) = parse_frame(&mut encoded).unwrap();
        assert_eq!(decoded_header, header);
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn corrupted_byte_fails_crc() {
        let header = FrameHeader { frame_type: FrameType::Ack, sequence: 1 };
        let mut encoded = build_frame(header, b"data");
        let mid = encoded.len() / 2;
        encoded[mid] ^= 0xFF;
        assert!(parse_frame(&mut encoded).is_err());
    }
}

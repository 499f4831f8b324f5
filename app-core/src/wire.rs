// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Minimal length-prefixed TLV helpers for host-facing proto command
//! payloads. `hubpack` (used elsewhere in this workspace for fixed-size
//! task-to-task IPC structs) doesn't fit here: these payloads carry
//! variable-length strings and blobs the host controls the size of, so
//! this follows the same explicit length-byte idiom `kvstore`'s record
//! format already uses.

pub fn push_field(buf: &mut Vec<u8>, bytes: &[u8]) {
    let len = bytes.len().min(u16::MAX as usize);
    buf.extend_from_slice(&(len as u16).to_le_bytes());
    buf.extend_from_slice(&bytes[..len]);
}

pub fn push_str(buf: &mut Vec<u8>, s: &str) {
    push_field(buf, s.as_bytes());
}

pub fn take_field<'a>(buf: &'a [u8]) -> Option<(&'a [u8], &'a [u8])> {
    let (len_bytes, rest) = take_n(buf, 2)?;
    let len = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;
    take_n(rest, len)
}

pub fn take_str(buf: &[u8]) -> Option<(String, &[u8])> {
    let (field, rest) = take_field(buf)?;
    Some((String::from_utf8_lossy(field).into_owned(), rest))
}

pub fn take_n(buf: &[u8], n: usize) -> Option<(&[u8], &[u8])> {
    if buf.len() < n {
        None
    } else {
        Some(buf.split_at(n))
    }
}

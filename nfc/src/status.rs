// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! ISO 7816-4 status words used by both the WCA and T4T layers
//! (`spec.md` §4.6).

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusWord {
    /// `9000`: command succeeded, nothing more to drain.
    Ok,
    /// `61xx`: succeeded, `xx` more response bytes available via
    /// `GET_RESPONSE`.
    OkMoreData(u8),
    /// `6Fxx`: generic failure; `xx` is a local diagnostic code only, not
    /// part of the ISO 7816 contract.
    GenericFailure(u8),
    /// `6D00`: instruction not supported.
    InsNotSupported,
}

impl StatusWord {
    pub fn to_bytes(self) -> [u8; 2] {
        match self {
            StatusWord::Ok => [0x90, 0x00],
            StatusWord::OkMoreData(n) => [0x61, n],
            StatusWord::GenericFailure(code) => [0x6F, code],
            StatusWord::InsNotSupported => [0x6D, 0x00],
        }
    }
}

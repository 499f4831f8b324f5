// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `UiEvent` on the wire: a small tag/body pairing shared by the local
//! `Ui` mailbox (`app-core`'s `ipc::Bus`) and the inter-MCU link
//! (`app-core`'s `uc_link`, `app-uxc`'s `link`). One encoding, two
//! transports.

use crate::UiEvent;

/// `UiEvent` carries payload on a couple of variants (`EnrollmentProgress`,
/// `BatterySoc`); the tag identifies the variant and the body bytes (if
/// any) carry its fields, mirroring how `ipc::MessageRef` separates the
/// fixed tag from the variable object everywhere else on the bus.
pub fn encode_event(event: UiEvent) -> (u32, [u8; 2]) {
    match event {
        UiEvent::Idle => (0, [0, 0]),
        UiEvent::Authenticated => (1, [0, 0]),
        UiEvent::Deauthenticated => (2, [0, 0]),
        UiEvent::FingerDown => (3, [0, 0]),
        UiEvent::EnrollmentProgress { passed, total } => (4, [passed, total]),
        UiEvent::EnrollmentComplete => (5, [0, 0]),
        UiEvent::EnrollmentFailed => (6, [0, 0]),
        UiEvent::TransactionPending => (7, [0, 0]),
        UiEvent::TransactionApproved => (8, [0, 0]),
        UiEvent::TransactionRejected => (9, [0, 0]),
        UiEvent::Charging => (10, [0, 0]),
        UiEvent::ChargingFinished => (11, [0, 0]),
        UiEvent::ChargingUnplugged => (12, [0, 0]),
        UiEvent::BatterySoc { percent } => (13, [percent, 0]),
        UiEvent::FwupSuccess => (14, [0, 0]),
        UiEvent::FwupFailed => (15, [0, 0]),
        UiEvent::Wiped => (16, [0, 0]),
    }
}

/// Inverse of [`encode_event`]. `body` shorter than two bytes is padded
/// with zeros by the caller's transport (the local bus sends an empty
/// object for zero-payload variants); `None` means an unrecognised tag.
pub fn decode_event(tag: u32, body: &[u8]) -> Option<UiEvent> {
    let b0 = body.first().copied().unwrap_or(0);
    let b1 = body.get(1).copied().unwrap_or(0);
    Some(match tag {
        0 => UiEvent::Idle,
        1 => UiEvent::Authenticated,
        2 => UiEvent::Deauthenticated,
        3 => UiEvent::FingerDown,
        4 => UiEvent::EnrollmentProgress { passed: b0, total: b1 },
        5 => UiEvent::EnrollmentComplete,
        6 => UiEvent::EnrollmentFailed,
        7 => UiEvent::TransactionPending,
        8 => UiEvent::TransactionApproved,
        9 => UiEvent::TransactionRejected,
        10 => UiEvent::Charging,
        11 => UiEvent::ChargingFinished,
        12 => UiEvent::ChargingUnplugged,
        13 => UiEvent::BatterySoc { percent: b0 },
        14 => UiEvent::FwupSuccess,
        15 => UiEvent::FwupFailed,
        16 => UiEvent::Wiped,
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_variant_round_trips() {
        let events = [
            UiEvent::Idle,
            UiEvent::Authenticated,
            UiEvent::Deauthenticated,
            UiEvent::FingerDown,
            UiEvent::EnrollmentProgress { passed: 2, total: 5 },
            UiEvent::EnrollmentComplete,
            UiEvent::EnrollmentFailed,
            UiEvent::TransactionPending,
            UiEvent::TransactionApproved,
            UiEvent::TransactionRejected,
            UiEvent::Charging,
            UiEvent::ChargingFinished,
            UiEvent::ChargingUnplugged,
            UiEvent::BatterySoc { percent: 42 },
            UiEvent::FwupSuccess,
            UiEvent::FwupFailed,
            UiEvent::Wiped,
        ];
        for event in events {
            let (tag, body) = encode_event(event);
            assert_eq!(decode_event(tag, &body), Some(event));
        }
    }

    #[test]
    fn unknown_tag_decodes_to_none() {
        assert_eq!(decode_event(99, &[0, 0]), None);
    }
}

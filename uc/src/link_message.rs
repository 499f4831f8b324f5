// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire envelope for traffic outside the `ProtoTag` vocabulary: the
//! `UiEvent`s Core pushes to the display MCU, and the `ButtonEvent`/
//! `FlowAction` reports Uxc pushes back. Carried as the plaintext of a
//! `Session::seal`ed `Data` frame, same as any other payload on this
//! channel.

use alloc::vec::Vec;
use display_ctrl::{ButtonEvent, FlowAction};
use ui_events::UiEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkMessage {
    UiEvent(UiEvent),
    ButtonPress(ButtonEvent),
    FlowActionReport(FlowAction),
}

pub fn encode_link_message(msg: LinkMessage) -> Vec<u8> {
    match msg {
        LinkMessage::UiEvent(event) => {
            let (tag, body) = ui_events::encode_event(event);
            alloc::vec![0, tag as u8, body[0], body[1]]
        }
        LinkMessage::ButtonPress(btn) => {
            let b = match btn {
                ButtonEvent::Up => 0,
                ButtonEvent::Down => 1,
                ButtonEvent::Confirm => 2,
                ButtonEvent::Back => 3,
            };
            alloc::vec![1, b]
        }
        LinkMessage::FlowActionReport(action) => {
            let a = match action {
                FlowAction::None => 0,
                FlowAction::Refresh => 1,
                FlowAction::Approve => 2,
                FlowAction::Cancel => 3,
                FlowAction::Exit => 4,
                FlowAction::StartEnrollment => 5,
                FlowAction::QueryFingerprints => 6,
                FlowAction::DeleteFingerprint => 7,
                FlowAction::PowerOff => 8,
            };
            alloc::vec![2, a]
        }
    }
}

pub fn decode_link_message(bytes: &[u8]) -> Option<LinkMessage> {
    match *bytes.first()? {
        0 => {
            let tag = *bytes.get(1)? as u32;
            let body = [*bytes.get(2)?, *bytes.get(3)?];
            ui_events::decode_event(tag, &body).map(LinkMessage::UiEvent)
        }
        1 => Some(LinkMessage::ButtonPress(match *bytes.get(1)? {
            0 => ButtonEvent::Up,
            1 => ButtonEvent::Down,
            2 => ButtonEvent::Confirm,
            3 => ButtonEvent::Back,
            _ => return None,
        })),
        2 => Some(LinkMessage::FlowActionReport(match *bytes.get(1)? {
            0 => FlowAction::None,
            1 => FlowAction::Refresh,
            2 => FlowAction::Approve,
            3 => FlowAction::Cancel,
            4 => FlowAction::Exit,
            5 => FlowAction::StartEnrollment,
            6 => FlowAction::QueryFingerprints,
            7 => FlowAction::DeleteFingerprint,
            8 => FlowAction::PowerOff,
            _ => return None,
        })),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ui_event_round_trips() {
        let msg = LinkMessage::UiEvent(UiEvent::EnrollmentProgress { passed: 2, total: 5 });
        let bytes = encode_link_message(msg);
        assert_eq!(decode_link_message(&bytes), Some(msg));
    }

    #[test]
    fn button_and_flow_action_round_trip() {
        for btn in [ButtonEvent::Up, ButtonEvent::Down, ButtonEvent::Confirm, ButtonEvent::Back] {
            let msg = LinkMessage::ButtonPress(btn);
            assert_eq!(decode_link_message(&encode_link_message(msg)), Some(msg));
        }
        for action in [
            FlowAction::None,
            FlowAction::Refresh,
            FlowAction::Approve,
            FlowAction::Cancel,
            FlowAction::Exit,
            FlowAction::StartEnrollment,
            FlowAction::QueryFingerprints,
            FlowAction::DeleteFingerprint,
            FlowAction::PowerOff,
        ] {
            let msg = LinkMessage::FlowActionReport(action);
            assert_eq!(decode_link_message(&encode_link_message(msg)), Some(msg));
        }
    }

    #[test]
    fn unknown_kind_byte_decodes_to_none() {
        assert_eq!(decode_link_message(&[99]), None);
    }
}

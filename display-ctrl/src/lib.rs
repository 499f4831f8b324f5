// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Display flow engine (`spec.md` §4.8).
//!
//! `FlowContext` holds exactly one active flow — no dynamic stack. Each
//! `FlowId` implements [`Flow`]; the controller dispatches button presses,
//! ticks, and `UiEvent`s to whichever flow is current, and a handful of
//! global handlers (battery, auth, fwup, device-info) run regardless of
//! lock state or active flow.

#![cfg_attr(not(test), no_std)]

extern crate alloc;

use alloc::string::String;
use ui_events::UiEvent;

pub mod config;
pub use config::{LABEL_LEN, MAX_FINGERPRINTS};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowId {
    Onboarding,
    Menu,
    Transaction,
    FingerprintMgmt,
    FingerprintsMenu,
    FingerprintRemove,
    Recovery,
    FirmwareUpdate,
    Wipe,
    PrivilegedActions,
    Brightness,
    Info,
    Mfg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Up,
    Down,
    Confirm,
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowAction {
    None,
    Refresh,
    Approve,
    Cancel,
    Exit,
    StartEnrollment,
    QueryFingerprints,
    DeleteFingerprint,
    PowerOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    Fade,
    SlideLeft,
    SlideRight,
}

/// A command sent to the display MCU's LVGL-owning UI task. The per-screen
/// parameter payload is left to the display firmware; this controller only
/// needs to know which screen and how to transition to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShowScreen {
    pub flow: FlowId,
    pub transition: Transition,
    pub duration_ms: u32,
}

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub serial: String,
    pub hw_revision: String,
}

#[derive(Debug, Clone)]
pub struct FlowContext {
    pub current_flow: FlowId,
    pub previous_flow: FlowId,
    pub is_locked: bool,
    pub battery_percent: u8,
    pub is_charging: bool,
    pub device_info: Option<DeviceInfo>,
    pub fingerprint_enrolled: [bool; MAX_FINGERPRINTS],
    pub fingerprint_labels: [heapless::String<LABEL_LEN>; MAX_FINGERPRINTS],
    pub initial_screen_shown: bool,
    pub pending_flow_exit: bool,
}

impl Default for FlowContext {
    fn default() -> Self {
        Self {
            current_flow: FlowId::Onboarding,
            previous_flow: FlowId::Onboarding,
            is_locked: true,
            battery_percent: 100,
            is_charging: false,
            device_info: None,
            fingerprint_enrolled: [false; MAX_FINGERPRINTS],
            fingerprint_labels: Default::default(),
            initial_screen_shown: false,
            pending_flow_exit: false,
        }
    }
}

/// Per-flow entry data; most flows need none.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryData {
    pub fingerprint_slot: Option<u8>,
}

/// What a flow implementation does on each lifecycle callback. Flows are
/// stateless dispatch tables over `FlowContext`; any flow-local state lives
/// in `FlowContext` itself so the controller never allocates per flow.
pub trait Flow {
    fn on_enter(&self, ctx: &mut FlowContext, entry: EntryData, show: &mut dyn ScreenSink);
    fn on_exit(&self, ctx: &mut FlowContext);
    fn on_button_press(&self, ctx: &mut FlowContext, btn: ButtonEvent) -> FlowAction;
    fn on_tick(&self, ctx: &mut FlowContext);
    fn on_event(&self, ctx: &mut FlowContext, event: UiEvent) -> Option<FlowAction>;
}

pub trait ScreenSink {
    fn show_screen(&mut self, screen: ShowScreen);
}

fn flow_for(id: FlowId) -> &'static dyn Flow {
    match id {
        FlowId::Onboarding => &OnboardingFlow,
        FlowId::Menu => &MenuFlow,
        FlowId::Transaction => &TransactionFlow,
        FlowId::FingerprintMgmt => &FingerprintMgmtFlow,
        FlowId::FingerprintsMenu => &FingerprintsMenuFlow,
        FlowId::FingerprintRemove => &FingerprintRemoveFlow,
        FlowId::Recovery => &RecoveryFlow,
        FlowId::FirmwareUpdate => &FirmwareUpdateFlow,
        FlowId::Wipe => &WipeFlow,
        FlowId::PrivilegedActions => &PrivilegedActionsFlow,
        FlowId::Brightness => &BrightnessFlow,
        FlowId::Info => &InfoFlow,
        FlowId::Mfg => &MfgFlow,
    }
}

macro_rules! trivial_flow {
    ($name:ident, $default_transition:expr) => {
        struct $name;
        impl Flow for $name {
            fn on_enter(&self, _ctx: &mut FlowContext, _entry: EntryData, show: &mut dyn ScreenSink) {
                show.show_screen(ShowScreen {
                    flow: FlowId::$name,
                    transition: $default_transition,
                    duration_ms: 250,
                });
            }
            fn on_exit(&self, _ctx: &mut FlowContext) {}
            fn on_button_press(&self, _ctx: &mut FlowContext, btn: ButtonEvent) -> FlowAction {
                match btn {
                    ButtonEvent::Back => FlowAction::Exit,
                    _ => FlowAction::None,
                }
            }
            fn on_tick(&self, _ctx: &mut FlowContext) {}
            fn on_event(&self, _ctx: &mut FlowContext, _event: UiEvent) -> Option<FlowAction> {
                None
            }
        }
    };
}

trivial_flow!(Onboarding, Transition::Fade);
trivial_flow!(Recovery, Transition::Fade);
trivial_flow!(Brightness, Transition::SlideLeft);
trivial_flow!(Info, Transition::SlideLeft);
trivial_flow!(PrivilegedActions, Transition::SlideLeft);

struct MenuFlow;
impl Flow for MenuFlow {
    fn on_enter(&self, _ctx: &mut FlowContext, _entry: EntryData, show: &mut dyn ScreenSink) {
        show.show_screen(ShowScreen { flow: FlowId::Menu, transition: Transition::Fade, duration_ms: 200 });
    }
    fn on_exit(&self, _ctx: &mut FlowContext) {}
    fn on_button_press(&self, _ctx: &mut FlowContext, btn: ButtonEvent) -> FlowAction {
        match btn {
            ButtonEvent::Confirm => FlowAction::Refresh,
            ButtonEvent::Back => FlowAction::PowerOff,
            _ => FlowAction::None,
        }
    }
    fn on_tick(&self, _ctx: &mut FlowContext) {}
    fn on_event(&self, _ctx: &mut FlowContext, _event: UiEvent) -> Option<FlowAction> {
        None
    }
}

struct TransactionFlow;
impl Flow for TransactionFlow {
    fn on_enter(&self, _ctx: &mut FlowContext, _entry: EntryData, show: &mut dyn ScreenSink) {
        show.show_screen(ShowScreen {
            flow: FlowId::Transaction,
            transition: Transition::SlideLeft,
            duration_ms: 200,
        });
    }
    fn on_exit(&self, _ctx: &mut FlowContext) {}
    fn on_button_press(&self, _ctx: &mut FlowContext, btn: ButtonEvent) -> FlowAction {
        match btn {
            ButtonEvent::Confirm => FlowAction::Approve,
            ButtonEvent::Back => FlowAction::Cancel,
            _ => FlowAction::None,
        }
    }
    fn on_tick(&self, _ctx: &mut FlowContext) {}
    fn on_event(&self, _ctx: &mut FlowContext, event: UiEvent) -> Option<FlowAction> {
        match event {
            UiEvent::TransactionApproved => Some(FlowAction::Approve),
            UiEvent::TransactionRejected => Some(FlowAction::Cancel),
            _ => None,
        }
    }
}

struct FingerprintMgmtFlow;
impl Flow for FingerprintMgmtFlow {
    fn on_enter(&self, _ctx: &mut FlowContext, _entry: EntryData, show: &mut dyn ScreenSink) {
        show.show_screen(ShowScreen {
            flow: FlowId::FingerprintMgmt,
            transition: Transition::SlideLeft,
            duration_ms: 200,
        });
    }
    fn on_exit(&self, _ctx: &mut FlowContext) {}
    fn on_button_press(&self, _ctx: &mut FlowContext, btn: ButtonEvent) -> FlowAction {
        match btn {
            ButtonEvent::Confirm => FlowAction::StartEnrollment,
            ButtonEvent::Back => FlowAction::Exit,
            _ => FlowAction::QueryFingerprints,
        }
    }
    fn on_tick(&self, _ctx: &mut FlowContext) {}
    fn on_event(&self, _ctx: &mut FlowContext, event: UiEvent) -> Option<FlowAction> {
        match event {
            UiEvent::EnrollmentComplete | UiEvent::EnrollmentFailed => Some(FlowAction::Refresh),
            _ => None,
        }
    }
}

struct FingerprintsMenuFlow;
impl Flow for FingerprintsMenuFlow {
    fn on_enter(&self, _ctx: &mut FlowContext, _entry: EntryData, show: &mut dyn ScreenSink) {
        show.show_screen(ShowScreen {
            flow: FlowId::FingerprintsMenu,
            transition: Transition::None,
            duration_ms: 0,
        });
    }
    fn on_exit(&self, _ctx: &mut FlowContext) {}
    fn on_button_press(&self, _ctx: &mut FlowContext, btn: ButtonEvent) -> FlowAction {
        match btn {
            ButtonEvent::Confirm => FlowAction::DeleteFingerprint,
            ButtonEvent::Back => FlowAction::Exit,
            _ => FlowAction::None,
        }
    }
    fn on_tick(&self, _ctx: &mut FlowContext) {}
    fn on_event(&self, _ctx: &mut FlowContext, _event: UiEvent) -> Option<FlowAction> {
        None
    }
}

struct FingerprintRemoveFlow;
impl Flow for FingerprintRemoveFlow {
    fn on_enter(&self, _ctx: &mut FlowContext, _entry: EntryData, show: &mut dyn ScreenSink) {
        show.show_screen(ShowScreen {
            flow: FlowId::FingerprintRemove,
            transition: Transition::None,
            duration_ms: 0,
        });
    }
    fn on_exit(&self, _ctx: &mut FlowContext) {}
    fn on_button_press(&self, _ctx: &mut FlowContext, btn: ButtonEvent) -> FlowAction {
        match btn {
            ButtonEvent::Confirm => FlowAction::Approve,
            ButtonEvent::Back => FlowAction::Cancel,
            _ => FlowAction::None,
        }
    }
    fn on_tick(&self, _ctx: &mut FlowContext) {}
    fn on_event(&self, _ctx: &mut FlowContext, _event: UiEvent) -> Option<FlowAction> {
        None
    }
}

struct FirmwareUpdateFlow;
impl Flow for FirmwareUpdateFlow {
    fn on_enter(&self, _ctx: &mut FlowContext, _entry: EntryData, show: &mut dyn ScreenSink) {
        show.show_screen(ShowScreen { flow: FlowId::FirmwareUpdate, transition: Transition::Fade, duration_ms: 200 });
    }
    fn on_exit(&self, _ctx: &mut FlowContext) {}
    fn on_button_press(&self, _ctx: &mut FlowContext, _btn: ButtonEvent) -> FlowAction {
        FlowAction::None
    }
    fn on_tick(&self, _ctx: &mut FlowContext) {}
    fn on_event(&self, _ctx: &mut FlowContext, event: UiEvent) -> Option<FlowAction> {
        match event {
            UiEvent::FwupSuccess | UiEvent::FwupFailed => Some(FlowAction::Exit),
            _ => None,
        }
    }
}

struct WipeFlow;
impl Flow for WipeFlow {
    fn on_enter(&self, _ctx: &mut FlowContext, _entry: EntryData, show: &mut dyn ScreenSink) {
        show.show_screen(ShowScreen { flow: FlowId::Wipe, transition: Transition::Fade, duration_ms: 200 });
    }
    fn on_exit(&self, _ctx: &mut FlowContext) {}
    fn on_button_press(&self, _ctx: &mut FlowContext, btn: ButtonEvent) -> FlowAction {
        match btn {
            ButtonEvent::Confirm => FlowAction::Approve,
            ButtonEvent::Back => FlowAction::Cancel,
            _ => FlowAction::None,
        }
    }
    fn on_tick(&self, _ctx: &mut FlowContext) {}
    fn on_event(&self, _ctx: &mut FlowContext, event: UiEvent) -> Option<FlowAction> {
        match event {
            UiEvent::Wiped => Some(FlowAction::Exit),
            _ => None,
        }
    }
}

struct MfgFlow;
impl Flow for MfgFlow {
    fn on_enter(&self, _ctx: &mut FlowContext, _entry: EntryData, show: &mut dyn ScreenSink) {
        show.show_screen(ShowScreen { flow: FlowId::Mfg, transition: Transition::None, duration_ms: 0 });
    }
    fn on_exit(&self, _ctx: &mut FlowContext) {}
    // Open Question (spec.md §9): whether Back exits Mfg test mode or steps
    // back one test screen. Resolved as exit-only — Mfg is entered from a
    // factory jig, never mid-flow, so there is no "previous screen" to
    // return to within the flow itself.
    fn on_button_press(&self, _ctx: &mut FlowContext, btn: ButtonEvent) -> FlowAction {
        match btn {
            ButtonEvent::Back => FlowAction::Exit,
            _ => FlowAction::None,
        }
    }
    fn on_tick(&self, _ctx: &mut FlowContext) {}
    fn on_event(&self, _ctx: &mut FlowContext, _event: UiEvent) -> Option<FlowAction> {
        None
    }
}

pub struct FlowController {
    pub ctx: FlowContext,
}

impl FlowController {
    pub fn new() -> Self {
        Self { ctx: FlowContext::default() }
    }

    pub fn enter_flow(&mut self, flow: FlowId, entry: EntryData, show: &mut dyn ScreenSink) {
        flow_for(self.ctx.current_flow).on_exit(&mut self.ctx);
        self.ctx.previous_flow = self.ctx.current_flow;
        self.ctx.current_flow = flow;
        flow_for(flow).on_enter(&mut self.ctx, entry, show);
    }

    pub fn button_press(&mut self, btn: ButtonEvent) -> FlowAction {
        if self.ctx.is_locked {
            return FlowAction::None;
        }
        flow_for(self.ctx.current_flow).on_button_press(&mut self.ctx, btn)
    }

    pub fn tick(&mut self) {
        if self.ctx.is_locked {
            return;
        }
        flow_for(self.ctx.current_flow).on_tick(&mut self.ctx)
    }

    /// Global handlers run before the per-flow dispatch, per §4.8: battery
    /// and auth events always update shared state regardless of lock state
    /// or which flow is active.
    pub fn dispatch_event(&mut self, event: UiEvent, show: &mut dyn ScreenSink) -> Option<FlowAction> {
        match event {
            UiEvent::BatterySoc { percent } => {
                self.ctx.battery_percent = percent;
                return Some(FlowAction::Refresh);
            }
            UiEvent::Charging => {
                self.ctx.is_charging = true;
                return Some(FlowAction::Refresh);
            }
            UiEvent::ChargingFinished | UiEvent::ChargingUnplugged => {
                self.ctx.is_charging = false;
                return Some(FlowAction::Refresh);
            }
            UiEvent::Authenticated => {
                self.set_locked(false, show);
                return Some(FlowAction::Refresh);
            }
            UiEvent::Deauthenticated => {
                self.set_locked(true, show);
                return Some(FlowAction::Refresh);
            }
            UiEvent::FwupSuccess | UiEvent::FwupFailed => {
                if self.ctx.current_flow != FlowId::FirmwareUpdate {
                    self.enter_flow(FlowId::FirmwareUpdate, EntryData::default(), show);
                }
            }
            _ => {}
        }
        if self.ctx.is_locked {
            return None;
        }
        flow_for(self.ctx.current_flow).on_event(&mut self.ctx, event)
    }

    fn set_locked(&mut self, locked: bool, show: &mut dyn ScreenSink) {
        if self.ctx.is_locked == locked {
            return;
        }
        self.ctx.is_locked = locked;
        if locked {
            self.enter_flow(FlowId::Onboarding, EntryData::default(), show);
        } else if !self.ctx.initial_screen_shown {
            self.ctx.initial_screen_shown = true;
            self.enter_flow(FlowId::Menu, EntryData::default(), show);
        }
    }

    pub fn set_device_info(&mut self, info: DeviceInfo) {
        self.ctx.device_info = Some(info);
    }
}

impl Default for FlowController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        shown: alloc::vec::Vec<ShowScreen>,
    }

    impl ScreenSink for RecordingSink {
        fn show_screen(&mut self, screen: ShowScreen) {
            self.shown.push(screen);
        }
    }

    #[test]
    fn enter_flow_calls_exit_then_enter() {
        let mut controller = FlowController::new();
        let mut sink = RecordingSink::default();
        controller.enter_flow(FlowId::Menu, EntryData::default(), &mut sink);
        assert_eq!(controller.ctx.current_flow, FlowId::Menu);
        assert_eq!(controller.ctx.previous_flow, FlowId::Onboarding);
        assert_eq!(sink.shown.last().unwrap().flow, FlowId::Menu);
    }

    #[test]
    fn locked_device_suppresses_button_input() {
        let mut controller = FlowController::new();
        controller.ctx.is_locked = true;
        assert_eq!(controller.button_press(ButtonEvent::Confirm), FlowAction::None);
    }

    #[test]
    fn authenticated_unlocks_and_enters_menu_once() {
        let mut controller = FlowController::new();
        let mut sink = RecordingSink::default();
        controller.dispatch_event(UiEvent::Authenticated, &mut sink);
        assert!(!controller.ctx.is_locked);
        assert_eq!(controller.ctx.current_flow, FlowId::Menu);
        assert!(controller.ctx.initial_screen_shown);
    }

    #[test]
    fn deauthenticated_locks_and_returns_to_onboarding() {
        let mut controller = FlowController::new();
        let mut sink = RecordingSink::default();
        controller.dispatch_event(UiEvent::Authenticated, &mut sink);
        controller.dispatch_event(UiEvent::Deauthenticated, &mut sink);
        assert!(controller.ctx.is_locked);
        assert_eq!(controller.ctx.current_flow, FlowId::Onboarding);
    }

    #[test]
    fn battery_event_updates_percent_regardless_of_lock() {
        let mut controller = FlowController::new();
        let mut sink = RecordingSink::default();
        controller.ctx.is_locked = true;
        controller.dispatch_event(UiEvent::BatterySoc { percent: 42 }, &mut sink);
        assert_eq!(controller.ctx.battery_percent, 42);
    }

    #[test]
    fn fwup_event_pushes_firmware_update_flow() {
        let mut controller = FlowController::new();
        let mut sink = RecordingSink::default();
        controller.dispatch_event(UiEvent::Authenticated, &mut sink);
        controller.dispatch_event(UiEvent::FwupFailed, &mut sink);
        assert_eq!(controller.ctx.current_flow, FlowId::FirmwareUpdate);
    }
}

// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Firmware update task (`spec.md` §4.5).
//!
//! `FwupEngine` is the `Idle → Started → Transferring → Finalizing →
//! {Applied | Failed}` state machine; `ImageWriter` is the flash-slot
//! backend it drives, injected so the sequencing/range logic is testable
//! without real flash.

#![cfg_attr(not(test), no_std)]

use abi::{McuRole, ProtoTag, ResetReason};

pub mod config;
pub use config::{FWUP_FINISH_RESET_MS, MAX_CHUNK_SIZE};

ringbuf::ringbuf!(FWUP_TRACE, Event, 16);

#[derive(Debug, Clone, Copy, PartialEq)]
enum Event {
    Started(FwupMode),
    Chunk { sequence_id: u32 },
    Finished(FinishOutcome),
    Rejected(FwupError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FwupMode {
    Normal,
    Delta,
    DeltaOneshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FwupState {
    Idle,
    Started,
    Transferring,
    Finalizing,
    Applied,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FwupError {
    InvalidState,
    InvalidRole,
    SequenceGap,
    OutOfRange,
    WriteFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishOutcome {
    Success,
    WillApplyPatch,
    Error,
}

/// The flash-slot backend. A real task backs this with the bootloader's
/// slot-writer API; tests use an in-memory buffer.
pub trait ImageWriter {
    fn init(&mut self, mode: FwupMode, total_size: u32) -> Result<(), FwupError>;
    fn write_chunk(&mut self, offset: u32, bytes: &[u8]) -> Result<(), FwupError>;
    /// Applies the image for `Normal`/`Delta` modes.
    fn finalize(&mut self) -> Result<(), FwupError>;
    /// Applies a `DeltaOneshot` patch; only called after the host has
    /// already been told `WillApplyPatch`.
    fn apply_patch(&mut self) -> Result<(), FwupError>;
}

pub struct FwupEngine<W> {
    writer: W,
    state: FwupState,
    mode: FwupMode,
    last_sequence: Option<u32>,
    total_size: u32,
}

impl<W: ImageWriter> FwupEngine<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            state: FwupState::Idle,
            mode: FwupMode::Normal,
            last_sequence: None,
            total_size: 0,
        }
    }

    pub fn state(&self) -> FwupState {
        self.state
    }

    /// §4.5 `fwup_start`. `own_role` is this task's MCU; a request
    /// targeting the other MCU is never handled here directly (see
    /// `route_if_not_core`).
    pub fn fwup_start(
        &mut self,
        own_role: McuRole,
        target_role: McuRole,
        mode: FwupMode,
        total_size: u32,
    ) -> Result<usize, FwupError> {
        if target_role != own_role {
            ringbuf::ringbuf_entry!(FWUP_TRACE, Event::Rejected(FwupError::InvalidRole));
            return Err(FwupError::InvalidRole);
        }
        if self.state != FwupState::Idle {
            ringbuf::ringbuf_entry!(FWUP_TRACE, Event::Rejected(FwupError::InvalidState));
            return Err(FwupError::InvalidState);
        }
        self.writer.init(mode, total_size)?;
        self.mode = mode;
        self.total_size = total_size;
        self.last_sequence = None;
        self.state = FwupState::Started;
        ringbuf::ringbuf_entry!(FWUP_TRACE, Event::Started(mode));
        Ok(MAX_CHUNK_SIZE)
    }

    /// §4.5 `fwup_transfer`: enforces a strictly monotonic sequence and an
    /// in-range offset before handing the chunk to the writer.
    pub fn fwup_transfer(
        &mut self,
        sequence_id: u32,
        offset: u32,
        bytes: &[u8],
    ) -> Result<(), FwupError> {
        if !matches!(self.state, FwupState::Started | FwupState::Transferring) {
            return Err(FwupError::InvalidState);
        }
        let expected = self.last_sequence.map_or(0, |s| s + 1);
        if sequence_id != expected {
            ringbuf::ringbuf_entry!(FWUP_TRACE, Event::Rejected(FwupError::SequenceGap));
            return Err(FwupError::SequenceGap);
        }
        let end = offset as u64 + bytes.len() as u64;
        if end > self.total_size as u64 {
            ringbuf::ringbuf_entry!(FWUP_TRACE, Event::Rejected(FwupError::OutOfRange));
            return Err(FwupError::OutOfRange);
        }
        self.writer.write_chunk(offset, bytes)?;
        self.last_sequence = Some(sequence_id);
        self.state = FwupState::Transferring;
        ringbuf::ringbuf_entry!(FWUP_TRACE, Event::Chunk { sequence_id });
        Ok(())
    }

    /// §4.5 `fwup_finish`. For `DeltaOneshot`, returns `WillApplyPatch`
    /// *before* the caller applies anything — the reply must reach the host
    /// before the slow patch application tears down the NFC field.
    pub fn fwup_finish(&mut self) -> Result<FinishOutcome, FwupError> {
        if !matches!(self.state, FwupState::Started | FwupState::Transferring) {
            return Err(FwupError::InvalidState);
        }
        self.state = FwupState::Finalizing;
        if self.mode == FwupMode::DeltaOneshot {
            ringbuf::ringbuf_entry!(FWUP_TRACE, Event::Finished(FinishOutcome::WillApplyPatch));
            return Ok(FinishOutcome::WillApplyPatch);
        }
        let outcome = match self.writer.finalize() {
            Ok(()) => {
                self.state = FwupState::Applied;
                FinishOutcome::Success
            }
            Err(_) => {
                self.state = FwupState::Failed;
                FinishOutcome::Error
            }
        };
        ringbuf::ringbuf_entry!(FWUP_TRACE, Event::Finished(outcome));
        Ok(outcome)
    }

    /// Runs the deferred `DeltaOneshot` patch application, after the host
    /// has already received `WillApplyPatch` and the NFC field is down.
    pub fn apply_pending_patch(&mut self) -> FinishOutcome {
        let outcome = match self.writer.apply_patch() {
            Ok(()) => {
                self.state = FwupState::Applied;
                FinishOutcome::Success
            }
            Err(_) => {
                self.state = FwupState::Failed;
                FinishOutcome::Error
            }
        };
        ringbuf::ringbuf_entry!(FWUP_TRACE, Event::Finished(outcome));
        outcome
    }
}

/// Side effects owned by other tasks: the result UI event, auth's silent
/// deauthenticate, and sysinfo's scheduled reset.
pub trait FwupEffects {
    fn show_result(&mut self, success: bool);
    fn deauthenticate_silently(&mut self);
    fn schedule_reset(&mut self, delay_ms: u64, reason: ResetReason);
}

/// Drives the post-`finish` side effects described in §4.5. `WillApplyPatch`
/// has no side effects here — they happen once `apply_pending_patch`
/// resolves to `Success`/`Error` instead.
pub fn handle_finish_outcome(outcome: FinishOutcome, effects: &mut impl FwupEffects) {
    match outcome {
        FinishOutcome::Success => {
            effects.show_result(true);
            effects.schedule_reset(FWUP_FINISH_RESET_MS, ResetReason::Fwup);
        }
        FinishOutcome::WillApplyPatch => {}
        FinishOutcome::Error => {
            effects.show_result(false);
            effects.deauthenticate_silently();
            effects.schedule_reset(FWUP_FINISH_RESET_MS, ResetReason::Fwup);
        }
    }
}

/// Forwarding hook for the display variant: a command not owned by this
/// MCU is shipped across the inter-MCU channel instead of handled locally.
pub trait CoprocForwarder {
    fn forward(&mut self, tag: ProtoTag, payload: &[u8]);
}

/// Returns `true` if `tag` was forwarded to the coprocessor (and `pending`
/// was set), `false` if it belongs to this MCU and the caller should handle
/// it locally.
pub fn route_if_not_core(
    own_role: McuRole,
    tag: ProtoTag,
    payload: &[u8],
    forwarder: &mut impl CoprocForwarder,
    pending: &mut bool,
) -> bool {
    if own_role == McuRole::Core && tag.mcu_role() != McuRole::Core {
        forwarder.forward(tag, payload);
        *pending = true;
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MemWriter {
        buf: Vec<u8>,
        finalized: bool,
        patch_applied: bool,
        fail_finalize: bool,
    }

    impl ImageWriter for MemWriter {
        fn init(&mut self, _mode: FwupMode, total_size: u32) -> Result<(), FwupError> {
            self.buf = vec![0u8; total_size as usize];
            Ok(())
        }
        fn write_chunk(&mut self, offset: u32, bytes: &[u8]) -> Result<(), FwupError> {
            let start = offset as usize;
            self.buf[start..start + bytes.len()].copy_from_slice(bytes);
            Ok(())
        }
        fn finalize(&mut self) -> Result<(), FwupError> {
            if self.fail_finalize {
                return Err(FwupError::WriteFailed);
            }
            self.finalized = true;
            Ok(())
        }
        fn apply_patch(&mut self) -> Result<(), FwupError> {
            self.patch_applied = true;
            Ok(())
        }
    }

    #[test]
    fn normal_mode_happy_path() {
        let mut engine = FwupEngine::new(MemWriter::default());
        let chunk_size = engine
            .fwup_start(McuRole::Core, McuRole::Core, FwupMode::Normal, 10)
            .unwrap();
        assert_eq!(chunk_size, MAX_CHUNK_SIZE);
        engine.fwup_transfer(0, 0, &[1, 2, 3, 4, 5]).unwrap();
        engine.fwup_transfer(1, 5, &[6, 7, 8, 9, 10]).unwrap();
        let outcome = engine.fwup_finish().unwrap();
        assert_eq!(outcome, FinishOutcome::Success);
        assert_eq!(engine.state(), FwupState::Applied);
    }

    #[test]
    fn sequence_gap_rejected() {
        let mut engine = FwupEngine::new(MemWriter::default());
        engine
            .fwup_start(McuRole::Core, McuRole::Core, FwupMode::Normal, 10)
            .unwrap();
        engine.fwup_transfer(0, 0, &[1]).unwrap();
        assert_eq!(
            engine.fwup_transfer(2, 1, &[2]),
            Err(FwupError::SequenceGap)
        );
    }

    #[test]
    fn out_of_range_chunk_rejected() {
        let mut engine = FwupEngine::new(MemWriter::default());
        engine
            .fwup_start(McuRole::Core, McuRole::Core, FwupMode::Normal, 4)
            .unwrap();
        assert_eq!(
            engine.fwup_transfer(0, 0, &[1, 2, 3, 4, 5]),
            Err(FwupError::OutOfRange)
        );
    }

    #[test]
    fn delta_oneshot_defers_patch_application() {
        let mut engine = FwupEngine::new(MemWriter::default());
        engine
            .fwup_start(McuRole::Core, McuRole::Core, FwupMode::DeltaOneshot, 2)
            .unwrap();
        engine.fwup_transfer(0, 0, &[1, 2]).unwrap();
        let outcome = engine.fwup_finish().unwrap();
        assert_eq!(outcome, FinishOutcome::WillApplyPatch);
        assert_eq!(engine.state(), FwupState::Finalizing);
        let final_outcome = engine.apply_pending_patch();
        assert_eq!(final_outcome, FinishOutcome::Success);
        assert_eq!(engine.state(), FwupState::Applied);
    }

    #[derive(Default)]
    struct RecordingEffects {
        shown: Option<bool>,
        deauthed: bool,
        reset: Option<(u64, ResetReason)>,
    }

    impl FwupEffects for RecordingEffects {
        fn show_result(&mut self, success: bool) {
            self.shown = Some(success);
        }
        fn deauthenticate_silently(&mut self) {
            self.deauthed = true;
        }
        fn schedule_reset(&mut self, delay_ms: u64, reason: ResetReason) {
            self.reset = Some((delay_ms, reason));
        }
    }

    #[test]
    fn failure_deauthenticates_and_schedules_reset() {
        let mut engine = FwupEngine::new(MemWriter {
            fail_finalize: true,
            ..Default::default()
        });
        engine
            .fwup_start(McuRole::Core, McuRole::Core, FwupMode::Normal, 1)
            .unwrap();
        engine.fwup_transfer(0, 0, &[9]).unwrap();
        let outcome = engine.fwup_finish().unwrap();
        let mut effects = RecordingEffects::default();
        handle_finish_outcome(outcome, &mut effects);
        assert_eq!(effects.shown, Some(false));
        assert!(effects.deauthed);
        assert_eq!(effects.reset, Some((FWUP_FINISH_RESET_MS, ResetReason::Fwup)));
    }

    #[test]
    fn success_schedules_reset_without_deauth() {
        let mut engine = FwupEngine::new(MemWriter::default());
        engine
            .fwup_start(McuRole::Core, McuRole::Core, FwupMode::Normal, 1)
            .unwrap();
        engine.fwup_transfer(0, 0, &[9]).unwrap();
        let outcome = engine.fwup_finish().unwrap();
        let mut effects = RecordingEffects::default();
        handle_finish_outcome(outcome, &mut effects);
        assert_eq!(effects.shown, Some(true));
        assert!(!effects.deauthed);
        assert_eq!(effects.reset, Some((FWUP_FINISH_RESET_MS, ResetReason::Fwup)));
    }
}

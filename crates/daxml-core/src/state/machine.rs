//! Session state for one DA conversation.

use std::fmt;

use crate::events::DaPhase;

/// Kind of frame the host is waiting for next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameExpectation {
    /// Nothing outstanding.
    #[default]
    Idle,
    /// Plain reply to a command envelope ("OK", "ERR!...").
    Reply,
    /// Nested `<host>` command frame.
    Command,
    /// Progress report text until the end-of-transmission sentinel.
    ProgressDrain,
    /// Raw chunk data during a device-to-host transfer.
    TransferData,
}

impl fmt::Display for FrameExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameExpectation::Idle => write!(f, "IDLE"),
            FrameExpectation::Reply => write!(f, "REPLY"),
            FrameExpectation::Command => write!(f, "COMMAND"),
            FrameExpectation::ProgressDrain => write!(f, "PROGRESS"),
            FrameExpectation::TransferData => write!(f, "DATA"),
        }
    }
}

/// Mutable state shared by the dispatcher and the handoff orchestrator.
///
/// Created fresh for every connection; nothing here survives a reconnect.
#[derive(Debug)]
pub struct SessionState {
    pub phase: DaPhase,
    pub expect: FrameExpectation,
    /// Declared size of the in-flight transfer.
    pub transfer_total: u64,
    /// Bytes moved so far in the in-flight transfer.
    pub transferred: u64,
    /// Stage 2 exposes the extended command set.
    pub daext: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            phase: DaPhase::WaitingForDevice,
            expect: FrameExpectation::Idle,
            transfer_total: 0,
            transferred: 0,
            daext: false,
        }
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transition to a new phase. Returns the previous one.
    pub fn goto_phase(&mut self, phase: DaPhase) -> DaPhase {
        tracing::info!(from = %self.phase, to = %phase, "Phase transition");
        std::mem::replace(&mut self.phase, phase)
    }

    pub fn expect(&mut self, next: FrameExpectation) {
        tracing::trace!(from = %self.expect, to = %next, "Expecting frame");
        self.expect = next;
    }

    pub fn begin_transfer(&mut self, total: u64) {
        self.transfer_total = total;
        self.transferred = 0;
    }

    pub fn advance_transfer(&mut self, bytes: u64) {
        self.transferred += bytes;
    }

    pub fn finish_transfer(&mut self) {
        self.transfer_total = 0;
        self.transferred = 0;
        self.expect = FrameExpectation::Idle;
    }

    pub fn transfer_in_flight(&self) -> bool {
        self.transfer_total > 0 && self.transferred < self.transfer_total
    }
}

//! Command handlers for a running DA.
//!
//! This module is split into submodules by functionality:
//! - `dispatch`: command/reply exchange and nested-command resolution
//! - `transfer`: chunked host-to-device and device-to-host data movement
//! - `hwinfo`: hardware and storage introspection
//! - `partition`: partition table retrieval
//! - `security`: secure-lock, lifecycle and USB speed queries
//! - `control`: stage setup commands and reboot

mod control;
mod dispatch;
mod hwinfo;
mod partition;
mod security;
mod transfer;

pub use control::{
    announce_host_capabilities, notify_init_hw, reboot, set_host_info, setup_environment,
};
pub use dispatch::{Nested, Reply, resolve_next, resolve_start, send_command};
pub use hwinfo::{
    EmmcInfo, FlashType, HwInfo, NandInfo, StorageConfig, StorageInfo, UfsInfo, get_hw_info,
};
pub use partition::{PartitionEntry, parse_partition_table, read_partition_table};
pub use security::{
    DaInfo, SecurityLock, change_usb_speed, check_lifecycle, check_sla, get_da_info,
    get_sys_property, parse_sla,
};
pub use transfer::{download, upload};

use crate::error::DaError;
use crate::events::{DaEvent, DaObserver, DaPhase, LogLevel};
use crate::state::machine::SessionState;
use crate::transport::{FramedTransport, UsbTransport};

/// Handler context containing all resources of one conversation.
pub struct DaContext<'a, T: UsbTransport, O: DaObserver> {
    pub link: &'a FramedTransport<T>,
    pub observer: &'a O,
    pub state: &'a mut SessionState,
}

impl<'a, T: UsbTransport, O: DaObserver> DaContext<'a, T, O> {
    pub fn new(link: &'a FramedTransport<T>, observer: &'a O, state: &'a mut SessionState) -> Self {
        Self {
            link,
            observer,
            state,
        }
    }

    pub(crate) fn emit(&self, event: DaEvent) {
        self.observer.on_event(&event);
    }

    pub(crate) fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(DaEvent::Log {
            level,
            message: message.into(),
        });
    }

    /// Move to `phase` and tell the observer.
    pub fn goto_phase(&mut self, phase: DaPhase) {
        let from = self.state.goto_phase(phase);
        if from != phase {
            self.emit(DaEvent::PhaseChanged { from, to: phase });
        }
    }

    pub(crate) fn ack(&self) -> Result<(), DaError> {
        self.link.ack()?;
        Ok(())
    }

    /// Read one text frame; an empty frame is a read failure.
    pub(crate) fn receive_text(&self, context: &'static str) -> Result<String, DaError> {
        let text = self.link.receive_text();
        if text.is_empty() {
            return Err(DaError::FrameRead { context });
        }
        Ok(text)
    }

    /// Read one text frame and require it to equal `expected`.
    pub(crate) fn expect_reply(
        &self,
        expected: &'static str,
        context: &'static str,
    ) -> Result<(), DaError> {
        let reply = self.receive_text(context)?;
        if reply != expected {
            return Err(DaError::UnexpectedReply {
                expected,
                got: reply,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::protocol::constants::*;
    use crate::state::machine::SessionState;
    use crate::transport::{FramedTransport, MockTransport};

    pub fn link() -> FramedTransport<MockTransport> {
        FramedTransport::new(MockTransport::new())
    }

    pub fn state() -> SessionState {
        SessionState::new()
    }

    /// Queue the trailer of a successful command: END/OK then START.
    pub fn queue_end_ok_start(link: &FramedTransport<MockTransport>) {
        link.inner().queue_command(CMD_END, "<result>OK</result>");
        link.inner().queue_command(CMD_START, "");
    }

    /// Queue "OK", END/OK, START for a plain command.
    pub fn queue_done(link: &FramedTransport<MockTransport>) {
        link.inner().queue_text(REPLY_OK);
        queue_end_ok_start(link);
    }
}

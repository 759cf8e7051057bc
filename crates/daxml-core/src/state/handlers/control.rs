//! Stage setup commands and reboot.

use chrono::Local;
use tracing::{info, warn};

use crate::error::DaError;
use crate::events::{DaObserver, LogLevel};
use crate::protocol::command;
use crate::protocol::RuntimeParameters;
use crate::transport::UsbTransport;

use super::DaContext;
use super::dispatch::{Reply, send_command};

/// SET-RUNTIME-PARAMETER.
pub fn setup_environment<T: UsbTransport, O: DaObserver>(
    ctx: &mut DaContext<'_, T, O>,
    params: &RuntimeParameters,
) -> Result<(), DaError> {
    info!(
        checksum = %params.checksum_level,
        log_level = %params.log_level,
        os = %params.system_os,
        "Setting runtime parameters"
    );
    send_command(ctx, &command::set_runtime_parameter(params), false)?.into_done()
}

/// HOST-SUPPORTED-COMMANDS.
pub fn announce_host_capabilities<T: UsbTransport, O: DaObserver>(
    ctx: &mut DaContext<'_, T, O>,
    capabilities: &str,
) -> Result<(), DaError> {
    send_command(ctx, &command::host_supported_commands(capabilities), false)?.into_done()
}

/// NOTIFY-INIT-HW.
pub fn notify_init_hw<T: UsbTransport, O: DaObserver>(
    ctx: &mut DaContext<'_, T, O>,
) -> Result<(), DaError> {
    send_command(ctx, &command::notify_init_hw(), false)?.into_done()
}

/// SET-HOST-INFO with the local time. Devices that decline it are fine.
pub fn set_host_info<T: UsbTransport, O: DaObserver>(
    ctx: &mut DaContext<'_, T, O>,
) -> Result<(), DaError> {
    let stamp = Local::now().format("%Y%m%dT%H%M%S").to_string();
    match send_command(ctx, &command::set_host_info(&stamp), false)? {
        Reply::Unsupported(message) => {
            warn!(message = %message, "Host info not supported");
            Ok(())
        }
        other => other.into_done(),
    }
}

/// REBOOT. Fire-and-forget: the device may drop off the bus before it
/// finishes the exchange, so only the plain reply is read.
pub fn reboot<T: UsbTransport, O: DaObserver>(
    ctx: &mut DaContext<'_, T, O>,
    disconnect: bool,
) -> Result<(), DaError> {
    ctx.log(LogLevel::Info, "Rebooting device");
    send_command(ctx, &command::reboot(disconnect), true)?.into_done()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::events::NullObserver;
    use crate::protocol::constants::*;

    #[test]
    fn test_host_info_unsupported_tolerated() {
        let link = link();
        let mut state = state();
        let mut ctx = DaContext::new(&link, &NullObserver, &mut state);
        link.inner().queue_text(REPLY_ERR_UNSUPPORTED);
        link.inner().queue_command(CMD_END, "<result>ERR!UNSUPPORTED</result>");
        link.inner().queue_command(CMD_START, "");

        set_host_info(&mut ctx).unwrap();
        let texts = link.inner().written_texts();
        assert!(texts[0].contains("<command>CMD:SET-HOST-INFO</command>"));
    }

    #[test]
    fn test_notify_init_hw_error() {
        let link = link();
        let mut state = state();
        let mut ctx = DaContext::new(&link, &NullObserver, &mut state);
        link.inner().queue_text("ERR!DRAM-INIT");

        let err = notify_init_hw(&mut ctx).unwrap_err();
        assert!(matches!(err, DaError::Device(msg) if msg == "ERR!DRAM-INIT"));
    }

    #[test]
    fn test_reboot_reads_only_reply() {
        let link = link();
        let mut state = state();
        let mut ctx = DaContext::new(&link, &NullObserver, &mut state);
        link.inner().queue_text("OK");

        reboot(&mut ctx, true).unwrap();
        let texts = link.inner().written_texts();
        assert_eq!(texts.len(), 1);
        assert!(texts[0].contains("<action>DISCONNECT</action>"));
    }

    #[test]
    fn test_setup_environment() {
        let link = link();
        let mut state = state();
        let mut ctx = DaContext::new(&link, &NullObserver, &mut state);
        queue_done(&link);
        queue_done(&link);

        setup_environment(&mut ctx, &RuntimeParameters::default()).unwrap();
        announce_host_capabilities(&mut ctx, HOST_CAPABILITIES).unwrap();
        assert_eq!(link.inner().pending(), 0);
    }
}

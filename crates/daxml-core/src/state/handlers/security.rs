//! Secure-lock, lifecycle, USB speed and DA build queries.

use std::fmt;

use tracing::{debug, info, warn};

use crate::error::DaError;
use crate::events::DaObserver;
use crate::protocol::command;
use crate::protocol::constants::*;
use crate::protocol::field;
use crate::transport::UsbTransport;

use super::DaContext;
use super::dispatch::{Reply, send_command};
use super::transfer::{AckCadence, fetch_via_upload};

/// Secure lock (SLA) state reported by the DA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityLock {
    Enabled,
    Disabled,
}

impl SecurityLock {
    pub fn is_enabled(self) -> bool {
        self == SecurityLock::Enabled
    }
}

impl fmt::Display for SecurityLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SecurityLock::Enabled => write!(f, "enabled"),
            SecurityLock::Disabled => write!(f, "disabled"),
        }
    }
}

/// Extract the SLA state from a `DA.SLA` property payload.
///
/// The value is the text between the first '>' and the next '<' after the
/// `item key=` marker.
pub fn parse_sla(payload: &str) -> Result<SecurityLock, DaError> {
    let start = payload
        .find(SLA_ITEM_MARKER)
        .ok_or_else(|| DaError::Extraction("Couldn't find item key".into()))?;
    let rest = &payload[start + SLA_ITEM_MARKER.len()..];
    let value = rest
        .find('>')
        .map(|gt| &rest[gt + 1..])
        .and_then(|tail| tail.find('<').map(|lt| &tail[..lt]))
        .ok_or_else(|| DaError::Extraction("Malformed SLA item".into()))?;
    if value.trim() == SLA_DISABLED {
        Ok(SecurityLock::Disabled)
    } else {
        Ok(SecurityLock::Enabled)
    }
}

/// Read a system property; `None` when the device declines.
pub fn get_sys_property<T: UsbTransport, O: DaObserver>(
    ctx: &mut DaContext<'_, T, O>,
    key: &str,
    length: u64,
) -> Result<Option<Vec<u8>>, DaError> {
    let xml = command::get_sys_property(key, HOST_MEM_HW_INFO, length);
    fetch_via_upload(ctx, &xml, AckCadence::Single)
}

/// Query the secure-lock state.
pub fn check_sla<T: UsbTransport, O: DaObserver>(
    ctx: &mut DaContext<'_, T, O>,
) -> Result<SecurityLock, DaError> {
    let data = get_sys_property(ctx, SYS_PROPERTY_SLA, RESPONSE_WINDOW)?
        .ok_or_else(|| DaError::Unsupported(SYS_PROPERTY_SLA.into()))?;
    let lock = parse_sla(&String::from_utf8_lossy(&data))?;
    info!(sla = %lock, "Secure lock state");
    Ok(lock)
}

/// Query the eMMC lifecycle status. `true` only for an exact "OK" payload;
/// a declined command or a device error reads as `false`.
pub fn check_lifecycle<T: UsbTransport, O: DaObserver>(
    ctx: &mut DaContext<'_, T, O>,
) -> Result<bool, DaError> {
    let xml = command::emmc_control(EMMC_FUNCTION_LIFE_CYCLE, HOST_MEM_EMMC_CONTROL, RESPONSE_WINDOW);
    let answer = match fetch_via_upload(ctx, &xml, AckCadence::Single) {
        Ok(answer) => answer,
        Err(DaError::Device(message)) => {
            warn!(message = %message, "Lifecycle query failed");
            None
        }
        Err(e) => return Err(e),
    };
    let nominal = matches!(answer, Some(data) if data == REPLY_OK.as_bytes());
    debug!(nominal, "Lifecycle status");
    Ok(nominal)
}

/// Ask whether the link may switch to a higher USB speed.
///
/// Only a completed command counts as supported. Declines and device
/// errors leave the current speed in place.
pub fn change_usb_speed<T: UsbTransport, O: DaObserver>(
    ctx: &mut DaContext<'_, T, O>,
) -> Result<bool, DaError> {
    let xml = command::can_higher_usb_speed(HOST_MEM_USB_SPEED, USB_SPEED_WINDOW);
    match send_command(ctx, &xml, false)? {
        Reply::Done | Reply::Acknowledged => Ok(true),
        Reply::Unsupported(message) => {
            info!(message = %message, "Higher USB speed not supported");
            Ok(false)
        }
        Reply::Device(message) => {
            warn!(message = %message, "USB speed query failed");
            Ok(false)
        }
        Reply::Nested(nested) => Err(DaError::Sequence {
            expected: CMD_END,
            got: nested.command_name().to_string(),
        }),
    }
}

/// DA build description returned by GET-DA-INFO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaInfo {
    pub version: String,
    pub da_version: String,
    pub build: String,
}

impl DaInfo {
    pub fn parse(payload: &str) -> Self {
        Self {
            version: field(payload, "version").to_string(),
            da_version: field(payload, "da_version").to_string(),
            build: field(payload, "build").to_string(),
        }
    }
}

/// Query the DA build; `None` when the device declines.
pub fn get_da_info<T: UsbTransport, O: DaObserver>(
    ctx: &mut DaContext<'_, T, O>,
) -> Result<Option<DaInfo>, DaError> {
    let xml = command::get_da_info(HOST_MEM_DA_INFO, DA_INFO_WINDOW);
    Ok(fetch_via_upload(ctx, &xml, AckCadence::Single)?
        .map(|data| DaInfo::parse(&String::from_utf8_lossy(&data))))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;
    use crate::events::NullObserver;
    use crate::protocol::DataType;
    use crate::transport::{FramedTransport, MockTransport};

    fn queue_upload_answer(link: &FramedTransport<MockTransport>, payload: &[u8]) {
        link.inner().queue_text("OK");
        link.inner().queue_command(
            CMD_UPLOAD_FILE,
            "<checksum>CHK_NO</checksum><info>WriteLocalFile</info>\
             <target_file>MEM://0x7fe83c138700:0x200000</target_file>",
        );
        link.inner().queue_text(&format!("OK@0x{:x}", payload.len()));
        link.inner().queue_text("OK");
        link.inner().queue_frame(DataType::ProtocolFlow, payload);
        queue_end_ok_start(link);
    }

    #[test]
    fn test_parse_sla_disabled() {
        let payload = "<sys_property><item key=\"DA.SLA\">DISABLED</item></sys_property>";
        assert_eq!(parse_sla(payload).unwrap(), SecurityLock::Disabled);
    }

    #[test]
    fn test_parse_sla_enabled() {
        let payload = "<sys_property><item key=\"DA.SLA\">ENABLED</item></sys_property>";
        assert!(parse_sla(payload).unwrap().is_enabled());
    }

    #[test]
    fn test_parse_sla_missing_marker() {
        let err = parse_sla("<sys_property></sys_property>").unwrap_err();
        assert!(matches!(err, DaError::Extraction(_)));
        assert!(err.is_soft());
    }

    #[test]
    fn test_check_sla_exchange() {
        let link = link();
        let mut state = state();
        let mut ctx = DaContext::new(&link, &NullObserver, &mut state);
        queue_upload_answer(&link, b"<item key=\"DA.SLA\">DISABLED</item>");

        assert_eq!(check_sla(&mut ctx).unwrap(), SecurityLock::Disabled);
        assert_eq!(link.inner().pending(), 0);
        assert!(link.inner().written_texts()[0].contains("<key>DA.SLA</key>"));
    }

    #[test]
    fn test_lifecycle_nominal() {
        let link = link();
        let mut state = state();
        let mut ctx = DaContext::new(&link, &NullObserver, &mut state);
        queue_upload_answer(&link, b"OK");

        assert!(check_lifecycle(&mut ctx).unwrap());
    }

    #[test]
    fn test_lifecycle_other_payload() {
        let link = link();
        let mut state = state();
        let mut ctx = DaContext::new(&link, &NullObserver, &mut state);
        queue_upload_answer(&link, b"ERR");

        assert!(!check_lifecycle(&mut ctx).unwrap());
    }

    #[test]
    fn test_lifecycle_unsupported() {
        let link = link();
        let mut state = state();
        let mut ctx = DaContext::new(&link, &NullObserver, &mut state);
        link.inner().queue_text("OK");
        link.inner().queue_command(CMD_END, "<result>ERR</result><message>Unsupported</message>");

        assert!(!check_lifecycle(&mut ctx).unwrap());
    }

    #[test]
    fn test_lifecycle_device_error() {
        let link = link();
        let mut state = state();
        let mut ctx = DaContext::new(&link, &NullObserver, &mut state);
        link.inner().queue_text("OK");
        link.inner().queue_command(
            CMD_END,
            "<result>ERR</result><message>STATUS_EMMC_NOT_EXIST</message>",
        );

        assert!(!check_lifecycle(&mut ctx).unwrap());
        assert_eq!(link.inner().pending(), 0);
    }

    #[test]
    fn test_usb_speed_unsupported_is_not_fatal() {
        let link = link();
        let mut state = state();
        let mut ctx = DaContext::new(&link, &NullObserver, &mut state);
        link.inner().queue_text(REPLY_ERR_UNSUPPORTED);
        link.inner().queue_command(CMD_END, "<result>ERR!UNSUPPORTED</result>");
        link.inner().queue_command(CMD_START, "");

        assert!(!change_usb_speed(&mut ctx).unwrap());
        assert_eq!(link.inner().pending(), 0);
    }

    #[test]
    fn test_usb_speed_supported() {
        let link = link();
        let mut state = state();
        let mut ctx = DaContext::new(&link, &NullObserver, &mut state);
        queue_done(&link);

        assert!(change_usb_speed(&mut ctx).unwrap());
    }

    #[test]
    fn test_da_info() {
        let link = link();
        let mut state = state();
        let mut ctx = DaContext::new(&link, &NullObserver, &mut state);
        queue_upload_answer(
            &link,
            b"<?xml version=\"1.0\" encoding=\"utf-8\"?><da_info><version>1.0</version>\
              <da_version>2021</da_version><build>May 24 2022:19:03:56</build></da_info>",
        );

        let info = get_da_info(&mut ctx).unwrap().unwrap();
        assert_eq!(info.da_version, "2021");
        assert_eq!(info.build, "May 24 2022:19:03:56");
    }
}

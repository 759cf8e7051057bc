//! XML command envelopes sent to the download agent.
//!
//! Every builder is a pure function returning the envelope text; the frame
//! layer appends the trailing NUL when it is sent.

use std::fmt;

use super::constants::*;

/// Log level requested from the DA via SET-RUNTIME-PARAMETER.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaLogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl DaLogLevel {
    /// Map the numeric UART log level (0 = trace .. 4 = error).
    pub fn from_uart_level(level: u8) -> Self {
        match level {
            0 => Self::Trace,
            1 => Self::Debug,
            2 => Self::Info,
            3 => Self::Warn,
            4 => Self::Error,
            _ => Self::Info,
        }
    }
}

impl fmt::Display for DaLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaLogLevel::Trace => write!(f, "TRACE"),
            DaLogLevel::Debug => write!(f, "DEBUG"),
            DaLogLevel::Info => write!(f, "INFO"),
            DaLogLevel::Warn => write!(f, "WARN"),
            DaLogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// Runtime parameters negotiated right after stage 1 starts.
#[derive(Debug, Clone)]
pub struct RuntimeParameters {
    /// NONE, USB, STORAGE or USB-STORAGE.
    pub checksum_level: String,
    /// YES, NO or AUTO-DETECT.
    pub battery_exist: String,
    pub log_level: DaLogLevel,
    /// USB or UART.
    pub log_channel: String,
    pub system_os: String,
    pub initialize_dram: bool,
}

impl Default for RuntimeParameters {
    fn default() -> Self {
        Self {
            checksum_level: "NONE".into(),
            battery_exist: "AUTO-DETECT".into(),
            log_level: DaLogLevel::Info,
            log_channel: "UART".into(),
            system_os: "LINUX".into(),
            initialize_dram: true,
        }
    }
}

/// Render a `MEM://<offset>:<length>` descriptor.
pub fn mem_descriptor(offset: u64, length: u64) -> String {
    format!("MEM://0x{:x}:0x{:x}", offset, length)
}

/// Wrap an argument block into a full `<da>` envelope.
pub fn envelope(name: &str, arg: &str, adv: &str) -> String {
    format!(
        "<?xml version=\"1.0\" encoding=\"utf-8\"?><da><version>1.0</version>\
         <command>CMD:{}</command><arg>{}</arg>{}</da>",
        name, arg, adv
    )
}

pub fn notify_init_hw() -> String {
    envelope("NOTIFY-INIT-HW", "", "")
}

pub fn boot_to(at_addr: u64, jmp_addr: u64, host_offset: u64, length: u64) -> String {
    let arg = format!(
        "<at_address>0x{:x}</at_address><jmp_address>0x{:x}</jmp_address>\
         <source_file>{}</source_file>",
        at_addr,
        jmp_addr,
        mem_descriptor(host_offset, length)
    );
    envelope("BOOT-TO", &arg, "")
}

pub fn set_runtime_parameter(params: &RuntimeParameters) -> String {
    let arg = format!(
        "<checksum_level>{}</checksum_level><battery_exist>{}</battery_exist>\
         <da_log_level>{}</da_log_level><log_channel>{}</log_channel>\
         <system_os>{}</system_os><version>1.1</version>",
        params.checksum_level,
        params.battery_exist,
        params.log_level,
        params.log_channel,
        params.system_os
    );
    let adv = format!(
        "<adv><initialize_dram>{}</initialize_dram></adv>",
        if params.initialize_dram { "YES" } else { "NO" }
    );
    envelope("SET-RUNTIME-PARAMETER", &arg, &adv)
}

pub fn host_supported_commands(capabilities: &str) -> String {
    let arg = format!("<host_capability>{}</host_capability>", capabilities);
    envelope("HOST-SUPPORTED-COMMANDS", &arg, "")
}

pub fn set_host_info(info: &str) -> String {
    envelope("SET-HOST-INFO", &format!("<info>{}</info>", info), "")
}

pub fn get_hw_info(host_offset: u64, length: u64) -> String {
    let arg = format!(
        "<target_file>{}</target_file>",
        mem_descriptor(host_offset, length)
    );
    envelope("GET-HW-INFO", &arg, "")
}

pub fn read_partition_table(host_offset: u64, length: u64) -> String {
    let arg = format!(
        "<target_file>{}</target_file>",
        mem_descriptor(host_offset, length)
    );
    envelope("READ-PARTITION-TABLE", &arg, "")
}

pub fn can_higher_usb_speed(host_offset: u64, length: u64) -> String {
    let arg = format!(
        "<target_file>{}</target_file>",
        mem_descriptor(host_offset, length)
    );
    envelope("CAN-HIGHER-USB-SPEED", &arg, "")
}

pub fn get_sys_property(key: &str, host_offset: u64, length: u64) -> String {
    let arg = format!(
        "<key>{}</key><target_file>{}</target_file>",
        key,
        mem_descriptor(host_offset, length)
    );
    envelope("GET-SYS-PROPERTY", &arg, "")
}

pub fn emmc_control(function: &str, host_offset: u64, length: u64) -> String {
    let arg = format!(
        "<function>{}</function><target_file>{}</target_file>",
        function,
        mem_descriptor(host_offset, length)
    );
    envelope("EMMC-CONTROL", &arg, "")
}

pub fn get_da_info(host_offset: u64, length: u64) -> String {
    let arg = format!(
        "<target_file>{}</target_file>",
        mem_descriptor(host_offset, length)
    );
    envelope("GET-DA-INFO", &arg, "")
}

pub fn reboot(disconnect: bool) -> String {
    let action = if disconnect { "DISCONNECT" } else { "IMMEDIATE" };
    envelope("REBOOT", &format!("<action>{}</action>", action), "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::field::field;

    #[test]
    fn test_envelope_shape() {
        let xml = notify_init_hw();
        assert!(xml.starts_with("<?xml"));
        assert_eq!(field(&xml, "command"), "CMD:NOTIFY-INIT-HW");
        assert_eq!(field(&xml, "arg"), "");
        assert!(xml.ends_with("</da>"));
    }

    #[test]
    fn test_boot_to_descriptor() {
        let xml = boot_to(0x4000_0000, 0x4000_0000, HOST_MEM_BOOT_TO, 0x50C78);
        assert_eq!(field(&xml, "at_address"), "0x40000000");
        assert_eq!(field(&xml, "source_file"), "MEM://0x7fe83c09a04c:0x50c78");
    }

    #[test]
    fn test_runtime_parameters() {
        let params = RuntimeParameters {
            log_level: DaLogLevel::from_uart_level(1),
            ..Default::default()
        };
        let xml = set_runtime_parameter(&params);
        assert_eq!(field(&xml, "da_log_level"), "DEBUG");
        assert_eq!(field(&xml, "log_channel"), "UART");
        assert_eq!(field(&xml, "system_os"), "LINUX");
        assert_eq!(field(&xml, "initialize_dram"), "YES");
    }

    #[test]
    fn test_emmc_control_function() {
        let xml = emmc_control(EMMC_FUNCTION_LIFE_CYCLE, HOST_MEM_EMMC_CONTROL, RESPONSE_WINDOW);
        assert_eq!(field(&xml, "command"), "CMD:EMMC-CONTROL");
        assert_eq!(field(&xml, "function"), "LIFE-CYCLE-STATUS");
    }
}

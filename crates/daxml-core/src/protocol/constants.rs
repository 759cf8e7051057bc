// Frame header
pub const FRAME_MAGIC: u32 = 0xFEEE_EEEF;
pub const FRAME_HEADER_SIZE: usize = 12;

// Frame data types
pub const DT_PROTOCOL_FLOW: u32 = 1;
pub const DT_MESSAGE: u32 = 2;

// Plain replies
pub const REPLY_OK: &str = "OK";
pub const REPLY_EOT: &str = "OK!EOT";
pub const REPLY_ERR_PREFIX: &str = "ERR!";
pub const REPLY_ERR_UNSUPPORTED: &str = "ERR!UNSUPPORTED";
pub const REPLY_VALUE_PREFIX: &str = "OK@";

/// Substring the device uses in soft-unsupported results.
pub const UNSUPPORTED_MARKER: &str = "Unsupported";

// Device -> host commands
pub const CMD_START: &str = "CMD:START";
pub const CMD_END: &str = "CMD:END";
pub const CMD_DOWNLOAD_FILE: &str = "CMD:DOWNLOAD-FILE";
pub const CMD_UPLOAD_FILE: &str = "CMD:UPLOAD-FILE";
pub const CMD_PROGRESS_REPORT: &str = "CMD:PROGRESS-REPORT";

/// Capabilities announced to each stage via CMD:HOST-SUPPORTED-COMMANDS.
pub const HOST_CAPABILITIES: &str =
    "CMD:DOWNLOAD-FILE^1@CMD:FILE-SYS-OPERATION^1@CMD:PROGRESS-REPORT^1@CMD:UPLOAD-FILE^1@";

// Host memory placeholders used in MEM:// descriptors
pub const HOST_MEM_BOOT_TO: u64 = 0x7FE8_3C09_A04C;
pub const HOST_MEM_HW_INFO: u64 = 0x7FE8_3C13_8700;
pub const HOST_MEM_PARTITION_TABLE: u64 = 0x7FE8_3C53_8720;
pub const HOST_MEM_USB_SPEED: u64 = 0x7FE8_463E_D240;
pub const HOST_MEM_EMMC_CONTROL: u64 = 0x7FE8_3C33_8710;
pub const HOST_MEM_DA_INFO: u64 = 0x0200_0000;

// Default response window sizes
pub const RESPONSE_WINDOW: u64 = 0x20_0000;
pub const USB_SPEED_WINDOW: u64 = 0x40;
pub const DA_INFO_WINDOW: u64 = 0x2_0000;

/// System property holding the secure-lock state.
pub const SYS_PROPERTY_SLA: &str = "DA.SLA";
pub const SLA_ITEM_MARKER: &str = "item key=";
pub const SLA_DISABLED: &str = "DISABLED";

pub const EMMC_FUNCTION_LIFE_CYCLE: &str = "LIFE-CYCLE-STATUS";

/// NAND boot region size assumed when deriving storage configuration.
pub const NAND_BOOT_REGION_SIZE: u64 = 0x40_0000;

// Boot ROM / preloader commands
pub const BROM_CMD_SEND_DA: u8 = 0xD7;
pub const BROM_CMD_JUMP_DA: u8 = 0xD5;

pub const MEDIATEK_VENDOR_ID: u16 = 0x0E8D;
pub const BROM_PRODUCT_ID: u16 = 0x0003;
pub const PRELOADER_PRODUCT_ID: u16 = 0x2000;
pub const DA_PRODUCT_ID: u16 = 0x2001;

pub const SUPPORTED_PIDS: &[u16] = &[BROM_PRODUCT_ID, PRELOADER_PRODUCT_ID, DA_PRODUCT_ID];

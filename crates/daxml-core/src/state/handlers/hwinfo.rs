//! Hardware and storage introspection (CMD:GET-HW-INFO).

use std::fmt;

use tracing::{info, warn};

use crate::error::DaError;
use crate::events::{DaObserver, LogLevel};
use crate::protocol::command;
use crate::protocol::constants::*;
use crate::protocol::{field, parse_hex_u64};
use crate::transport::UsbTransport;

use super::DaContext;
use super::transfer::{AckCadence, fetch_via_upload};

fn hex(payload: &str, name: &str) -> u64 {
    parse_hex_u64(field(payload, name)).unwrap_or(0)
}

fn decimal(payload: &str, name: &str) -> u64 {
    field(payload, name).trim().parse().unwrap_or(0)
}

fn text(payload: &str, name: &str) -> String {
    field(payload, name).to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmmcInfo {
    pub block_size: u64,
    pub boot1_size: u64,
    pub boot2_size: u64,
    pub rpmb_size: u64,
    pub user_size: u64,
    pub gp1_size: u64,
    pub gp2_size: u64,
    pub gp3_size: u64,
    pub gp4_size: u64,
    pub id: String,
}

impl EmmcInfo {
    fn parse(payload: &str) -> Self {
        Self {
            block_size: hex(payload, "block_size"),
            boot1_size: hex(payload, "boot1_size"),
            boot2_size: hex(payload, "boot2_size"),
            rpmb_size: hex(payload, "rpmb_size"),
            user_size: hex(payload, "user_size"),
            gp1_size: hex(payload, "gp1_size"),
            gp2_size: hex(payload, "gp2_size"),
            gp3_size: hex(payload, "gp3_size"),
            gp4_size: hex(payload, "gp4_size"),
            id: text(payload, "id"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UfsInfo {
    pub block_size: u64,
    pub lua0_size: u64,
    pub lua1_size: u64,
    pub lua2_size: u64,
    pub lua3_size: u64,
    pub id: String,
    pub vendor_id: u64,
    pub cid: String,
    pub fw_version: String,
}

impl UfsInfo {
    fn parse(payload: &str) -> Self {
        Self {
            block_size: hex(payload, "block_size"),
            lua0_size: hex(payload, "lua0_size"),
            lua1_size: hex(payload, "lua1_size"),
            lua2_size: hex(payload, "lua2_size"),
            lua3_size: hex(payload, "lua3_size"),
            id: text(payload, "id"),
            vendor_id: hex(payload, "ufs_vendor_id"),
            cid: text(payload, "ufs_cid"),
            fw_version: text(payload, "ufs_fwver"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NandInfo {
    pub block_size: u64,
    pub page_size: u64,
    pub spare_size: u64,
    pub total_size: u64,
    pub id: String,
    pub page_parity_size: u64,
    pub sub_type: String,
}

impl NandInfo {
    fn parse(payload: &str) -> Self {
        Self {
            block_size: hex(payload, "block_size"),
            page_size: hex(payload, "page_size"),
            spare_size: hex(payload, "spare_size"),
            total_size: hex(payload, "total_size"),
            id: text(payload, "id"),
            page_parity_size: hex(payload, "page_parity_size"),
            sub_type: text(payload, "sub_type"),
        }
    }
}

/// Storage description; the variant decides which fields exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageInfo {
    Emmc(EmmcInfo),
    Ufs(UfsInfo),
    Nand(NandInfo),
    /// Storage tag the host has no decoder for.
    Unknown { tag: String },
}

type StorageDecoder = fn(&str) -> StorageInfo;

fn decode_emmc(payload: &str) -> StorageInfo {
    StorageInfo::Emmc(EmmcInfo::parse(payload))
}

fn decode_ufs(payload: &str) -> StorageInfo {
    StorageInfo::Ufs(UfsInfo::parse(payload))
}

fn decode_nand(payload: &str) -> StorageInfo {
    StorageInfo::Nand(NandInfo::parse(payload))
}

/// Decoders keyed on the `<storage>` tag value.
const STORAGE_DECODERS: &[(&str, StorageDecoder)] = &[
    ("EMMC", decode_emmc),
    ("UFS", decode_ufs),
    ("NAND", decode_nand),
];

impl StorageInfo {
    pub fn parse(payload: &str) -> Self {
        let tag = field(payload, "storage");
        match STORAGE_DECODERS.iter().find(|(name, _)| *name == tag) {
            Some((_, decode)) => decode(payload),
            None => {
                warn!(tag = %tag, "Unknown storage type");
                StorageInfo::Unknown {
                    tag: tag.to_string(),
                }
            }
        }
    }

    pub fn tag(&self) -> &str {
        match self {
            StorageInfo::Emmc(_) => "EMMC",
            StorageInfo::Ufs(_) => "UFS",
            StorageInfo::Nand(_) => "NAND",
            StorageInfo::Unknown { tag } => tag,
        }
    }
}

/// Hardware description returned by GET-HW-INFO.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HwInfo {
    pub version: String,
    pub ram_size: u64,
    /// Millivolts, reported in decimal.
    pub battery_voltage: u64,
    pub random_id: String,
    pub product_id: String,
    pub storage: StorageInfo,
}

impl HwInfo {
    pub fn parse(payload: &str) -> Self {
        Self {
            version: text(payload, "version"),
            ram_size: hex(payload, "ram_size"),
            battery_voltage: decimal(payload, "battery_voltage"),
            random_id: text(payload, "random_id"),
            product_id: text(payload, "product_id"),
            storage: StorageInfo::parse(payload),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashType {
    Emmc,
    Nand,
    Ufs,
}

impl fmt::Display for FlashType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashType::Emmc => write!(f, "emmc"),
            FlashType::Nand => write!(f, "nand"),
            FlashType::Ufs => write!(f, "ufs"),
        }
    }
}

/// Flash layout derived from the storage description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageConfig {
    pub flash_type: FlashType,
    pub flash_size: u64,
    pub rpmb_size: u64,
    pub boot1_size: u64,
    pub boot2_size: u64,
}

impl StorageConfig {
    /// Derive the layout; unknown storage yields `None`.
    pub fn from_storage(storage: &StorageInfo) -> Option<Self> {
        match storage {
            StorageInfo::Emmc(e) => Some(Self {
                flash_type: FlashType::Emmc,
                flash_size: e.user_size,
                rpmb_size: e.rpmb_size,
                boot1_size: e.boot1_size,
                boot2_size: e.boot2_size,
            }),
            StorageInfo::Nand(n) => Some(Self {
                flash_type: FlashType::Nand,
                flash_size: n.total_size,
                rpmb_size: 0,
                boot1_size: NAND_BOOT_REGION_SIZE,
                boot2_size: NAND_BOOT_REGION_SIZE,
            }),
            // RPMB and boot1 sizes both come from LU1.
            StorageInfo::Ufs(u) => Some(Self {
                flash_type: FlashType::Ufs,
                flash_size: u.lua0_size,
                rpmb_size: u.lua1_size,
                boot1_size: u.lua1_size,
                boot2_size: u.lua2_size,
            }),
            StorageInfo::Unknown { .. } => None,
        }
    }
}

/// Query hardware information. The device must support it.
pub fn get_hw_info<T: UsbTransport, O: DaObserver>(
    ctx: &mut DaContext<'_, T, O>,
) -> Result<HwInfo, DaError> {
    let xml = command::get_hw_info(HOST_MEM_HW_INFO, RESPONSE_WINDOW);
    let data = fetch_via_upload(ctx, &xml, AckCadence::Single)?
        .ok_or_else(|| DaError::Unsupported("CMD:GET-HW-INFO".into()))?;
    let hw = HwInfo::parse(&String::from_utf8_lossy(&data));
    info!(
        storage = %hw.storage.tag(),
        ram = format!("0x{:x}", hw.ram_size),
        "Hardware info"
    );
    if let StorageInfo::Unknown { tag } = &hw.storage {
        ctx.log(LogLevel::Warn, format!("Unknown storage type '{}'", tag));
    }
    Ok(hw)
}

//! Protocol module - DA wire format and command definitions.

pub mod command;
pub mod constants;
pub mod field;
pub mod header;

pub use command::{DaLogLevel, RuntimeParameters};
pub use constants::*;
pub use field::{field, parse_hex_u64};
pub use header::{DataType, FrameHeader, HeaderError};

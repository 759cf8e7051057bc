//! Wire frame header for the DA protocol.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::Cursor;
use thiserror::Error;

use super::constants::{DT_MESSAGE, DT_PROTOCOL_FLOW, FRAME_HEADER_SIZE, FRAME_MAGIC};

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Buffer too small: expected {expected}, got {actual}")]
    BufferTooSmall { expected: usize, actual: usize },
    #[error("Invalid magic: expected 0x{expected:08X}, got 0x{actual:08X}")]
    InvalidMagic { expected: u32, actual: u32 },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Frame type tag carried in the second header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Command/response traffic and transfer chunks.
    ProtocolFlow,
    /// Device log messages.
    Message,
    /// Any tag this host does not know about.
    Other(u32),
}

impl DataType {
    pub fn from_u32(v: u32) -> Self {
        match v {
            DT_PROTOCOL_FLOW => Self::ProtocolFlow,
            DT_MESSAGE => Self::Message,
            other => Self::Other(other),
        }
    }

    pub fn as_u32(&self) -> u32 {
        match self {
            Self::ProtocolFlow => DT_PROTOCOL_FLOW,
            Self::Message => DT_MESSAGE,
            Self::Other(v) => *v,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::ProtocolFlow => write!(f, "FLOW"),
            DataType::Message => write!(f, "MSG"),
            DataType::Other(v) => write!(f, "0x{:X}", v),
        }
    }
}

/// Frame header (12 bytes): magic, data type, payload length. All little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub data_type: DataType,
    pub length: u32,
}

impl FrameHeader {
    pub const SIZE: usize = FRAME_HEADER_SIZE;

    pub fn new(data_type: DataType, length: u32) -> Self {
        Self { data_type, length }
    }

    pub fn to_bytes(&self) -> [u8; FRAME_HEADER_SIZE] {
        let mut buf = [0u8; FRAME_HEADER_SIZE];
        let mut cursor = Cursor::new(&mut buf[..]);
        // Writes into a fixed 12-byte buffer cannot run short.
        let _ = cursor.write_u32::<LittleEndian>(FRAME_MAGIC);
        let _ = cursor.write_u32::<LittleEndian>(self.data_type.as_u32());
        let _ = cursor.write_u32::<LittleEndian>(self.length);
        buf
    }

    /// Decode a header. Rejects anything whose first word is not the frame magic.
    pub fn from_bytes(data: &[u8]) -> Result<Self, HeaderError> {
        if data.len() < Self::SIZE {
            return Err(HeaderError::BufferTooSmall {
                expected: Self::SIZE,
                actual: data.len(),
            });
        }
        let mut cursor = Cursor::new(data);
        let magic = cursor.read_u32::<LittleEndian>()?;
        if magic != FRAME_MAGIC {
            return Err(HeaderError::InvalidMagic {
                expected: FRAME_MAGIC,
                actual: magic,
            });
        }
        let data_type = DataType::from_u32(cursor.read_u32::<LittleEndian>()?);
        let length = cursor.read_u32::<LittleEndian>()?;
        Ok(Self { data_type, length })
    }
}

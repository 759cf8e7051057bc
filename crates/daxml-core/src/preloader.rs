//! Boot ROM / preloader stage-1 delivery.
//!
//! Before any XML is spoken, stage 1 of the DA is pushed through the
//! preloader's echo protocol: every command byte and big-endian parameter
//! word is echoed back by the device, and 16-bit status words follow.

use std::io::Cursor;

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use tracing::{debug, instrument, warn};

use crate::error::DaError;
use crate::protocol::constants::{BROM_CMD_JUMP_DA, BROM_CMD_SEND_DA};
use crate::transport::UsbTransport;

/// Channel that loads and starts stage 1.
pub trait Preloader {
    /// Load `data` at `address`. `Ok(false)` when the device rejects it.
    fn send_da(
        &mut self,
        address: u32,
        length: u32,
        signature_len: u32,
        data: &[u8],
    ) -> Result<bool, DaError>;

    /// Start execution at `address`.
    fn jump_da(&mut self, address: u32) -> Result<bool, DaError>;
}

/// XOR of little-endian 16-bit words; a trailing odd byte is folded in as is.
pub fn xor_checksum(data: &[u8]) -> u16 {
    let mut words = data.chunks_exact(2);
    let mut sum = words
        .by_ref()
        .fold(0u16, |acc, w| acc ^ LittleEndian::read_u16(w));
    if let [last] = words.remainder() {
        sum ^= *last as u16;
    }
    sum
}

/// Preloader spoken over a raw USB transport.
pub struct BromPreloader<'a, T: UsbTransport> {
    transport: &'a T,
}

impl<'a, T: UsbTransport> BromPreloader<'a, T> {
    pub fn new(transport: &'a T) -> Self {
        Self { transport }
    }

    fn echo_cmd(&self, cmd: u8) -> Result<(), DaError> {
        if !self.transport.echo(&[cmd])? {
            return Err(DaError::Preloader(format!(
                "command 0x{:02X} not echoed",
                cmd
            )));
        }
        Ok(())
    }

    fn echo_u32(&self, value: u32) -> Result<(), DaError> {
        let mut buf = Vec::with_capacity(4);
        buf.write_u32::<BigEndian>(value)
            .map_err(|e| DaError::Preloader(e.to_string()))?;
        if !self.transport.echo(&buf)? {
            return Err(DaError::Preloader(format!(
                "parameter 0x{:08X} not echoed",
                value
            )));
        }
        Ok(())
    }

    fn read_u16(&self) -> Result<u16, DaError> {
        let raw = self.transport.read(2)?;
        Cursor::new(raw)
            .read_u16::<BigEndian>()
            .map_err(|_| DaError::Preloader("short status word".into()))
    }
}

impl<T: UsbTransport> Preloader for BromPreloader<'_, T> {
    #[instrument(skip(self, data))]
    fn send_da(
        &mut self,
        address: u32,
        length: u32,
        signature_len: u32,
        data: &[u8],
    ) -> Result<bool, DaError> {
        self.echo_cmd(BROM_CMD_SEND_DA)?;
        self.echo_u32(address)?;
        self.echo_u32(length)?;
        self.echo_u32(signature_len)?;

        let status = self.read_u16()?;
        if status != 0 {
            warn!(status = format!("0x{:04X}", status), "SEND_DA refused");
            return Ok(false);
        }

        let payload = &data[..(length as usize).min(data.len())];
        self.transport.write(payload)?;

        let expected = xor_checksum(payload);
        let checksum = self.read_u16()?;
        if checksum != expected {
            warn!(
                device = format!("0x{:04X}", checksum),
                host = format!("0x{:04X}", expected),
                "Stage 1 checksum mismatch"
            );
            return Ok(false);
        }

        let status = self.read_u16()?;
        debug!(status, "SEND_DA finished");
        Ok(status == 0)
    }

    #[instrument(skip(self))]
    fn jump_da(&mut self, address: u32) -> Result<bool, DaError> {
        self.echo_cmd(BROM_CMD_JUMP_DA)?;
        self.echo_u32(address)?;
        let status = self.read_u16()?;
        debug!(status, "JUMP_DA finished");
        Ok(status == 0)
    }
}

//! USB Transport layer abstraction.
//!
//! Defines the `UsbTransport` trait for raw byte I/O with the device,
//! allowing different implementations (nusb, mock, etc.).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Endpoint not found: type={ep_type}, direction={direction}")]
    EndpointNotFound { ep_type: String, direction: String },

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw byte transport to the device.
///
/// Reads are blocking and bounded by the backend; a read that returns fewer
/// bytes than requested is a short read and callers treat it as a failure.
pub trait UsbTransport: Send + Sync {
    /// Write raw bytes to the OUT endpoint.
    fn write(&self, data: &[u8]) -> Result<usize, TransportError>;

    /// Read up to `len` bytes from the IN endpoint.
    fn read(&self, len: usize) -> Result<Vec<u8>, TransportError>;

    /// Write `data` and check the device echoes it back unchanged.
    ///
    /// Used by the boot ROM handshake and for line diagnostics.
    fn echo(&self, data: &[u8]) -> Result<bool, TransportError> {
        self.write(data)?;
        let back = self.read(data.len())?;
        Ok(back == data)
    }

    /// Check if device is still connected.
    fn is_connected(&self) -> bool;

    /// Get the current VID.
    fn vendor_id(&self) -> u16;

    /// Get the current PID.
    fn product_id(&self) -> u16;
}

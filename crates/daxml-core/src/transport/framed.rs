//! Frame layer: wraps payloads in the 12-byte DA header.
//!
//! Receiving never raises; any short read, bad magic or truncated payload
//! yields an empty result which the dispatcher classifies one layer up.

use tracing::{debug, trace};

use super::traits::{TransportError, UsbTransport};
use crate::protocol::constants::{REPLY_OK, REPLY_VALUE_PREFIX};
use crate::protocol::header::{DataType, FrameHeader};

/// Payload forms accepted by [`FramedTransport::send`].
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    /// UTF-8 text, sent with a trailing NUL.
    Text(&'a str),
    /// Raw bytes, sent as-is.
    Bytes(&'a [u8]),
    /// Little-endian 32-bit integer.
    U32(u32),
    /// Little-endian 64-bit integer.
    U64(u64),
}

impl Payload<'_> {
    fn encode(&self) -> Vec<u8> {
        match self {
            Payload::Text(s) => {
                let mut v = Vec::with_capacity(s.len() + 1);
                v.extend_from_slice(s.as_bytes());
                v.push(0);
                v
            }
            Payload::Bytes(b) => b.to_vec(),
            Payload::U32(v) => v.to_le_bytes().to_vec(),
            Payload::U64(v) => v.to_le_bytes().to_vec(),
        }
    }
}

/// Frame transport over a raw USB transport.
pub struct FramedTransport<T: UsbTransport> {
    inner: T,
}

impl<T: UsbTransport> FramedTransport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Send one frame: header, then payload.
    pub fn send(&self, payload: Payload<'_>, data_type: DataType) -> Result<(), TransportError> {
        let body = match payload {
            Payload::Bytes(b) => std::borrow::Cow::Borrowed(b),
            other => std::borrow::Cow::Owned(other.encode()),
        };
        let header = FrameHeader::new(data_type, body.len() as u32);
        self.inner.write(&header.to_bytes())?;
        self.inner.write(&body)?;
        trace!(kind = %data_type, len = body.len(), "Frame sent");
        Ok(())
    }

    /// Send a protocol-flow text frame.
    pub fn send_text(&self, text: &str) -> Result<(), TransportError> {
        self.send(Payload::Text(text), DataType::ProtocolFlow)
    }

    /// Plain "OK" acknowledgment.
    pub fn ack(&self) -> Result<(), TransportError> {
        self.send_text(REPLY_OK)
    }

    /// "OK@0x<len>" acknowledgment announcing a length.
    pub fn ack_value(&self, length: u64) -> Result<(), TransportError> {
        self.send_text(&format!("{}0x{:x}", REPLY_VALUE_PREFIX, length))
    }

    /// Read one frame and return its raw payload, or empty on any failure.
    pub fn receive_bytes(&self) -> Vec<u8> {
        let raw = match self.inner.read(FrameHeader::SIZE) {
            Ok(raw) => raw,
            Err(e) => {
                debug!(error = %e, "Frame header read failed");
                return Vec::new();
            }
        };
        let header = match FrameHeader::from_bytes(&raw) {
            Ok(h) => h,
            Err(e) => {
                debug!(error = %e, "Invalid frame header");
                return Vec::new();
            }
        };
        if header.data_type != DataType::ProtocolFlow {
            debug!(kind = %header.data_type, "Frame with non-flow data type");
        }

        let expected = header.length as usize;
        match self.inner.read(expected) {
            Ok(data) if data.len() == expected => {
                trace!(len = expected, "Frame received");
                data
            }
            Ok(data) => {
                debug!(expected, actual = data.len(), "Short frame payload");
                Vec::new()
            }
            Err(e) => {
                debug!(error = %e, "Frame payload read failed");
                Vec::new()
            }
        }
    }

    /// Read one frame as text, trailing NULs trimmed.
    pub fn receive_text(&self) -> String {
        let mut data = self.receive_bytes();
        while data.last() == Some(&0) {
            data.pop();
        }
        String::from_utf8_lossy(&data).into_owned()
    }
}

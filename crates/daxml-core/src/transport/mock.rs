//! Mock USB transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::traits::{TransportError, UsbTransport};
use crate::protocol::header::{DataType, FrameHeader};

/// Mock transport serving a scripted device byte stream.
///
/// Queued frames are concatenated into one stream; reads consume from its
/// front, so header and payload can be read separately like on real USB.
pub struct MockTransport {
    /// Bytes the "device" will send.
    rx: Arc<Mutex<VecDeque<u8>>>,
    /// Captured writes.
    write_log: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Simulated VID/PID.
    vid: u16,
    pid: u16,
    /// Whether device is "connected".
    connected: Arc<Mutex<bool>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            rx: Arc::new(Mutex::new(VecDeque::new())),
            write_log: Arc::new(Mutex::new(Vec::new())),
            vid: 0x0E8D,
            pid: 0x2001,
            connected: Arc::new(Mutex::new(true)),
        }
    }

    /// Queue raw bytes to be returned on subsequent reads.
    pub fn queue_bytes(&self, bytes: &[u8]) {
        self.rx.lock().unwrap().extend(bytes.iter().copied());
    }

    /// Queue a complete frame.
    pub fn queue_frame(&self, data_type: DataType, payload: &[u8]) {
        let header = FrameHeader::new(data_type, payload.len() as u32);
        self.queue_bytes(&header.to_bytes());
        self.queue_bytes(payload);
    }

    /// Queue a protocol-flow text frame, NUL terminated like the device sends it.
    pub fn queue_text(&self, text: &str) {
        let mut payload = text.as_bytes().to_vec();
        payload.push(0);
        self.queue_frame(DataType::ProtocolFlow, &payload);
    }

    /// Queue a `<host>` command frame as emitted by the DA.
    pub fn queue_command(&self, command: &str, arg: &str) {
        self.queue_text(&format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?><host><version>1.0</version>\
             <command>{}</command><arg>{}</arg></host>",
            command, arg
        ));
    }

    /// Bytes still waiting to be read.
    pub fn pending(&self) -> usize {
        self.rx.lock().unwrap().len()
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.write_log.lock().unwrap().clone()
    }

    /// Reassemble captured writes into (type, payload) frames.
    ///
    /// Assumes every frame was written as a header write followed by a payload write.
    pub fn written_frames(&self) -> Vec<(DataType, Vec<u8>)> {
        let writes = self.get_writes();
        let mut frames = Vec::new();
        let mut iter = writes.into_iter();
        while let Some(chunk) = iter.next() {
            let Ok(header) = FrameHeader::from_bytes(&chunk) else {
                continue;
            };
            let payload = if header.length == 0 {
                Vec::new()
            } else {
                iter.next().unwrap_or_default()
            };
            frames.push((header.data_type, payload));
        }
        frames
    }

    /// Written frame payloads decoded as text (trailing NUL removed).
    pub fn written_texts(&self) -> Vec<String> {
        self.written_frames()
            .into_iter()
            .map(|(_, p)| {
                let end = p.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
                String::from_utf8_lossy(&p[..end]).into_owned()
            })
            .collect()
    }

    /// Simulate device disconnect.
    pub fn disconnect(&self) {
        *self.connected.lock().unwrap() = false;
    }

    /// Simulate device reconnect.
    pub fn reconnect(&self) {
        *self.connected.lock().unwrap() = true;
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbTransport for MockTransport {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        self.write_log.lock().unwrap().push(data.to_vec());
        Ok(data.len())
    }

    fn read(&self, len: usize) -> Result<Vec<u8>, TransportError> {
        if !*self.connected.lock().unwrap() {
            return Err(TransportError::Disconnected);
        }
        let mut rx = self.rx.lock().unwrap();
        if rx.is_empty() && len > 0 {
            return Err(TransportError::Timeout { timeout_ms: 5000 });
        }
        let n = len.min(rx.len());
        Ok(rx.drain(..n).collect())
    }

    fn is_connected(&self) -> bool {
        *self.connected.lock().unwrap()
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_stream_reads() {
        let mock = MockTransport::new();
        mock.queue_text("OK");

        let header = mock.read(12).unwrap();
        assert_eq!(header.len(), 12);
        let payload = mock.read(3).unwrap();
        assert_eq!(payload, b"OK\0");

        // Stream is empty now
        assert!(mock.read(12).is_err());
    }

    #[test]
    fn test_mock_short_read() {
        let mock = MockTransport::new();
        mock.queue_bytes(&[1, 2, 3]);
        assert_eq!(mock.read(12).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_mock_write_capture() {
        let mock = MockTransport::new();
        mock.write(b"Hello").unwrap();
        mock.write(b"World").unwrap();

        let writes = mock.get_writes();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0], b"Hello");
        assert_eq!(writes[1], b"World");
    }

    #[test]
    fn test_mock_echo() {
        let mock = MockTransport::new();
        mock.queue_bytes(&[0xD7]);
        assert!(mock.echo(&[0xD7]).unwrap());
        mock.queue_bytes(&[0x00]);
        assert!(!mock.echo(&[0xD5]).unwrap());
    }

    #[test]
    fn test_mock_disconnect() {
        let mock = MockTransport::new();
        assert!(mock.is_connected());

        mock.disconnect();
        assert!(!mock.is_connected());
        assert!(mock.write(b"test").is_err());
    }
}

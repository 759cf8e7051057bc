//! nusb-based USB transport implementation.
//!
//! MediaTek devices enumerate as CDC ACM; the DA protocol runs over the bulk
//! pair of the data interface, which is located by descriptor scan.

use nusb::io::{EndpointRead, EndpointWrite};
use nusb::transfer::{Bulk, In, Out};
use nusb::{MaybeFuture, list_devices};
use std::io::{self, Read, Write};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::traits::{TransportError, UsbTransport};
use crate::protocol::constants::{MEDIATEK_VENDOR_ID, SUPPORTED_PIDS};

const TRANSFER_BUFFER: usize = 0x1_0000;

/// Read deadline used until [`NusbTransport::set_read_timeout`] is called.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// nusb-based USB transport.
pub struct NusbTransport {
    reader: Mutex<EndpointRead<Bulk>>,
    writer: Mutex<EndpointWrite<Bulk>>,
    read_timeout: Duration,
    vid: u16,
    pid: u16,
}

impl NusbTransport {
    /// Open any MediaTek device in BROM, preloader or DA mode.
    #[instrument(level = "info")]
    pub fn open() -> Result<Self, TransportError> {
        let devices = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        for device_info in devices {
            if device_info.vendor_id() == MEDIATEK_VENDOR_ID
                && SUPPORTED_PIDS.contains(&device_info.product_id())
            {
                return Self::open_device_info(device_info);
            }
        }

        Err(TransportError::DeviceNotFound {
            vid: MEDIATEK_VENDOR_ID,
            pid: 0,
        })
    }

    /// Open a device with specific VID/PID.
    #[instrument(level = "info", fields(vid = format!("{:04X}", vid), pid = format!("{:04X}", pid)))]
    pub fn open_with_ids(vid: u16, pid: u16) -> Result<Self, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or(TransportError::DeviceNotFound { vid, pid })?;

        Self::open_device_info(device_info)
    }

    fn open_device_info(device_info: nusb::DeviceInfo) -> Result<Self, TransportError> {
        let vid = device_info.vendor_id();
        let pid = device_info.product_id();

        info!(
            vendor_id = %format!("{:04X}", vid),
            product_id = %format!("{:04X}", pid),
            "Found device"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        // Pick the first interface carrying both bulk directions (CDC data).
        let mut selected: Option<(u8, u8, u8)> = None;
        for config in device.configurations() {
            for iface in config.interfaces() {
                for alt in iface.alt_settings() {
                    let mut in_ep = 0u8;
                    let mut out_ep = 0u8;
                    for ep in alt.endpoints() {
                        if ep.transfer_type() == nusb::descriptors::TransferType::Bulk {
                            if ep.direction() == nusb::transfer::Direction::In {
                                in_ep = ep.address();
                            } else {
                                out_ep = ep.address();
                            }
                        }
                    }
                    if selected.is_none() && in_ep != 0 && out_ep != 0 {
                        selected = Some((iface.interface_number(), in_ep, out_ep));
                    }
                }
            }
        }

        let (iface_number, in_endpoint, out_endpoint) =
            selected.ok_or_else(|| TransportError::EndpointNotFound {
                ep_type: "Bulk".into(),
                direction: "In/Out".into(),
            })?;

        let interface = device
            .detach_and_claim_interface(iface_number)
            .wait()
            .map_err(|e| TransportError::ClaimInterfaceFailed {
                interface: iface_number,
                message: e.to_string(),
            })?;

        let reader = interface
            .endpoint::<Bulk, In>(in_endpoint)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?
            .reader(TRANSFER_BUFFER)
            .with_read_timeout(DEFAULT_READ_TIMEOUT);
        let writer = interface
            .endpoint::<Bulk, Out>(out_endpoint)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?
            .writer(TRANSFER_BUFFER);

        info!(
            interface = iface_number,
            in_ep = %format!("0x{:02X}", in_endpoint),
            out_ep = %format!("0x{:02X}", out_endpoint),
            "Device opened successfully"
        );

        Ok(Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            read_timeout: DEFAULT_READ_TIMEOUT,
            vid,
            pid,
        })
    }

    /// Bound every read to `timeout`. A read that hits it fails with
    /// [`TransportError::Timeout`].
    pub fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
        if let Ok(reader) = self.reader.get_mut() {
            reader.set_read_timeout(timeout);
        }
    }
}

fn read_error(e: io::Error, timeout: Duration) -> TransportError {
    match e.kind() {
        io::ErrorKind::TimedOut => TransportError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        },
        _ => TransportError::ReadFailed(e.to_string()),
    }
}

impl UsbTransport for NusbTransport {
    #[instrument(skip(self, data), fields(len = data.len()))]
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        writer
            .write_all(data)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;
        writer
            .flush()
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;

        debug!(bytes_written = data.len(), "Write complete");
        Ok(data.len())
    }

    #[instrument(skip(self), fields(len))]
    fn read(&self, len: usize) -> Result<Vec<u8>, TransportError> {
        let mut reader = self
            .reader
            .lock()
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;

        let mut buf = vec![0u8; len];
        let mut filled = 0;
        while filled < len {
            let n = reader
                .read(&mut buf[filled..])
                .map_err(|e| read_error(e, self.read_timeout))?;
            if n == 0 {
                break;
            }
            filled += n;
        }

        buf.truncate(filled);
        debug!(bytes_read = filled, "Read complete");
        Ok(buf)
    }

    fn is_connected(&self) -> bool {
        // nusb has no cheap liveness check; failures surface on the next transfer.
        true
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
    fn test_timed_out_read_maps_to_timeout() {
        let err = read_error(
            io::Error::new(io::ErrorKind::TimedOut, "timeout waiting for read"),
            Duration::from_millis(1500),
        );
        assert!(matches!(err, TransportError::Timeout { timeout_ms: 1500 }));
    }

    #[test]
    fn test_other_read_errors_stay_read_failures() {
        let err = read_error(
            io::Error::new(io::ErrorKind::BrokenPipe, "stall"),
            DEFAULT_READ_TIMEOUT,
        );
        assert!(matches!(err, TransportError::ReadFailed(ref m) if m == "stall"));
    }
}

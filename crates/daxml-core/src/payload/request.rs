//! Transfer requests announced by the device.
//!
//! A `CMD:DOWNLOAD-FILE` frame asks the host to push data (DownloadRequest);
//! a `CMD:UPLOAD-FILE` frame announces data the device will push
//! (UploadRequest). Each is consumed exactly once by the transfer engine.

use std::fmt;

use crate::protocol::field::{field, parse_hex_u64};

/// Where a transfer's data lives, as written by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetDescriptor {
    /// `<scheme>://<hex-offset>:<hex-length>`
    Memory {
        scheme: String,
        offset: u64,
        length: u64,
    },
    /// Device-local path literal (e.g. `ms-appdata:///local/efuse.xml`).
    Path(String),
}

impl TargetDescriptor {
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        if let Some((scheme, rest)) = text.split_once("://")
            && let Some((offset, length)) = rest.split_once(':')
            && let (Some(offset), Some(length)) = (parse_hex_u64(offset), parse_hex_u64(length))
        {
            return Self::Memory {
                scheme: scheme.to_string(),
                offset,
                length,
            };
        }
        Self::Path(text.to_string())
    }

    /// Declared byte length, if this is a memory descriptor.
    pub fn length(&self) -> Option<u64> {
        match self {
            Self::Memory { length, .. } => Some(*length),
            Self::Path(_) => None,
        }
    }
}

impl fmt::Display for TargetDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Memory {
                scheme,
                offset,
                length,
            } => write!(f, "{}://0x{:x}:0x{:x}", scheme, offset, length),
            Self::Path(p) => write!(f, "{}", p),
        }
    }
}

/// Device asks the host to push data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadRequest {
    pub checksum: String,
    pub info: String,
    pub source: TargetDescriptor,
    /// Negotiated packet size; zero when the device sent none or garbage.
    pub packet_length: u64,
}

impl DownloadRequest {
    pub fn from_payload(payload: &str) -> Self {
        Self {
            checksum: field(payload, "checksum").to_string(),
            info: field(payload, "info").to_string(),
            source: TargetDescriptor::parse(field(payload, "source_file")),
            packet_length: parse_hex_u64(field(payload, "packet_length")).unwrap_or(0),
        }
    }
}

/// Device announces data it will push to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub checksum: String,
    pub info: String,
    pub target: TargetDescriptor,
    pub packet_length: u64,
}

impl UploadRequest {
    pub fn from_payload(payload: &str) -> Self {
        Self {
            checksum: field(payload, "checksum").to_string(),
            info: field(payload, "info").to_string(),
            target: TargetDescriptor::parse(field(payload, "target_file")),
            packet_length: parse_hex_u64(field(payload, "packet_length")).unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_descriptor() {
        let d = TargetDescriptor::parse("MEM://0x7fe83c09a04c:0x50c78");
        assert_eq!(
            d,
            TargetDescriptor::Memory {
                scheme: "MEM".into(),
                offset: 0x7fe83c09a04c,
                length: 0x50c78,
            }
        );
        assert_eq!(d.length(), Some(0x50c78));
        assert_eq!(d.to_string(), "MEM://0x7fe83c09a04c:0x50c78");
    }

    #[test]
    fn test_path_descriptor() {
        let d = TargetDescriptor::parse("ms-appdata:///local/efuse.xml");
        assert_eq!(d, TargetDescriptor::Path("ms-appdata:///local/efuse.xml".into()));
        assert_eq!(d.length(), None);
    }

    #[test]
    fn test_download_request_fields() {
        let payload = "<host><version>1.0</version><command>CMD:DOWNLOAD-FILE</command><arg>\
                       <checksum>CHK_NO</checksum><info>2nd-DA</info>\
                       <source_file>MEM://0x7fe83c09a04c:0x50c78</source_file>\
                       <packet_length>0x1000</packet_length></arg></host>";
        let req = DownloadRequest::from_payload(payload);
        assert_eq!(req.checksum, "CHK_NO");
        assert_eq!(req.info, "2nd-DA");
        assert_eq!(req.source.length(), Some(0x50c78));
        assert_eq!(req.packet_length, 0x1000);
    }

    #[test]
    fn test_upload_request_missing_packet_length() {
        let payload = "<arg><checksum>CHK_NO</checksum><info>WriteLocalFile</info>\
                       <target_file>MEM://0x8000000:0x200000</target_file></arg>";
        let req = UploadRequest::from_payload(payload);
        assert_eq!(req.info, "WriteLocalFile");
        assert_eq!(req.target.length(), Some(0x200000));
        assert_eq!(req.packet_length, 0);
    }
}

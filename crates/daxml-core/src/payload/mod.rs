//! Payload handling module.
//!
//! Transfer descriptors announced by the device, chunk tracking for the
//! bounded-packet transfers, and the loader stages pushed during handoff.

pub mod chunk;
pub mod loader;
pub mod request;

pub use chunk::ChunkState;
pub use loader::{DaLoader, LoaderRegion, RegionSpec};
pub use request::{DownloadRequest, TargetDescriptor, UploadRequest};

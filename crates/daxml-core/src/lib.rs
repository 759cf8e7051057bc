//! DAXML-Core: MediaTek XML download-agent host protocol in Rust.
//!
//! This crate drives the host side of the XML DA protocol: it frames text and
//! binary payloads, exchanges commands with the download agent, moves data in
//! both directions, and walks a device from the preloader to a running
//! stage-2 agent.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Protocol**: Constants, frame header, command envelopes, field lookup
//! - **Transport**: USB abstraction (nusb, mock) and the frame layer
//! - **State**: Session state, command dispatch, transfers and queries
//! - **Payload**: Transfer requests, chunk tracking, loader regions
//! - **Events**: Observer pattern for UI decoupling
//! - **Handoff**: Two-stage bootloader handoff
//! - **Session**: High-level orchestrator
//!
//! # Example
//!
//! ```no_run
//! use daxml_core::session::{DaSession, SessionConfig};
//!
//! let config = SessionConfig {
//!     loader_path: Some("MTK_AllInOne_DA.bin".to_string()),
//!     ..Default::default()
//! };
//!
//! let mut session = DaSession::new(config);
//! let report = session.run().expect("handoff failed");
//! println!("storage: {}", report.hw_info.storage.tag());
//! ```

pub mod error;
pub mod events;
pub mod handoff;
pub mod hwparam;
pub mod payload;
pub mod preloader;
pub mod protocol;
pub mod session;
pub mod state;
pub mod transport;

// Re-exports for convenience
pub use error::DaError;
pub use events::{DaEvent, DaObserver, DaPhase, LogLevel, TracingObserver};
pub use handoff::{DeviceReport, run_handoff};
pub use hwparam::{ConfigSink, HwParamStore};
pub use payload::{ChunkState, DaLoader, RegionSpec};
pub use preloader::{BromPreloader, Preloader};
pub use session::{DaSession, SessionConfig};
pub use state::handlers::{HwInfo, PartitionEntry, SecurityLock, StorageConfig, StorageInfo};
pub use transport::{FramedTransport, MockTransport, NusbTransport, TransportError, UsbTransport};

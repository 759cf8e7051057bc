//! DA Session - High-level orchestrator for one device handoff.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::events::{DaEvent, DaObserver, PacketDirection, TracingObserver};
use crate::handoff::{DeviceReport, run_handoff};
use crate::hwparam::HwParamStore;
use crate::payload::{DaLoader, RegionSpec};
use crate::preloader::BromPreloader;
use crate::protocol::constants::HOST_MEM_BOOT_TO;
use crate::protocol::{DaLogLevel, RuntimeParameters};
use crate::state::handlers::{self, DaContext};
use crate::state::machine::SessionState;
use crate::transport::{FramedTransport, NusbTransport, TransportError, UsbTransport};

/// Configuration for a DA session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Path to the DA loader file.
    pub loader_path: Option<String>,
    /// Stage 1 region inside the loader.
    pub stage1: RegionSpec,
    /// Stage 2 region inside the loader.
    pub stage2: RegionSpec,
    /// DA UART log level, 0 (trace) to 4 (error).
    pub uart_log_level: u8,
    /// NONE, USB, STORAGE or USB-STORAGE.
    pub checksum_level: String,
    pub system_os: String,
    /// Host memory offset announced in the BOOT-TO source descriptor.
    pub host_mem_offset: u64,
    /// Chip hardware code, recorded in the hwparam file.
    pub hw_code: Option<u16>,
    /// USB VID override.
    pub vid: Option<u16>,
    /// USB PID override.
    pub pid: Option<u16>,
    /// Device wait timeout in seconds.
    pub retry_timeout_secs: u64,
    /// Per-read USB deadline in milliseconds.
    pub read_timeout_ms: u64,
    /// Where discovered device settings are written.
    pub hwparam_path: Option<String>,
    /// Reboot the device once the handoff completes.
    pub reboot_after: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            loader_path: None,
            stage1: RegionSpec::default(),
            stage2: RegionSpec::default(),
            uart_log_level: 2,
            checksum_level: "NONE".into(),
            system_os: "LINUX".into(),
            host_mem_offset: HOST_MEM_BOOT_TO,
            hw_code: None,
            vid: None,
            pid: None,
            retry_timeout_secs: 60,
            read_timeout_ms: 5000,
            hwparam_path: None,
            reboot_after: false,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Runtime parameters for SET-RUNTIME-PARAMETER.
    pub fn runtime_parameters(&self) -> RuntimeParameters {
        RuntimeParameters {
            checksum_level: self.checksum_level.clone(),
            log_level: DaLogLevel::from_uart_level(self.uart_log_level),
            system_os: self.system_os.clone(),
            ..Default::default()
        }
    }
}

/// DA Session - connects to the device and runs the handoff.
pub struct DaSession<O: DaObserver> {
    config: SessionConfig,
    observer: Arc<O>,
    loader: Option<DaLoader>,
}

impl DaSession<TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_observer(config, Arc::new(TracingObserver))
    }
}

impl<O: DaObserver + 'static> DaSession<O> {
    /// Create a new session with a custom observer.
    pub fn with_observer(config: SessionConfig, observer: Arc<O>) -> Self {
        Self {
            config,
            observer,
            loader: None,
        }
    }

    /// Use an already-cut loader instead of reading `loader_path`.
    pub fn with_loader(mut self, loader: DaLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    fn load_files(&mut self) -> Result<()> {
        if self.loader.is_some() {
            return Ok(());
        }
        let path = self
            .config
            .loader_path
            .as_ref()
            .ok_or_else(|| anyhow!("No DA loader configured"))?;
        self.loader = Some(DaLoader::load_from_file(
            path,
            &self.config.stage1,
            &self.config.stage2,
        )?);
        Ok(())
    }

    /// Run the complete handoff and return what was learned.
    #[instrument(skip(self))]
    pub fn run(&mut self) -> Result<DeviceReport> {
        self.load_files()?;
        let loader = self
            .loader
            .as_ref()
            .ok_or_else(|| anyhow!("DA loader not loaded"))?;

        let mut sink = match &self.config.hwparam_path {
            Some(path) => HwParamStore::open(path)?,
            None => HwParamStore::in_memory(),
        };

        let transport = self.wait_for_device()?;
        let mut state = SessionState::new();
        self.observer.on_event(&DaEvent::DeviceConnected {
            vid: transport.vendor_id(),
            pid: transport.product_id(),
        });

        // Wrap transport with observer
        let link = FramedTransport::new(ObservableTransport {
            inner: &transport,
            observer: self.observer.as_ref(),
        });
        let mut preloader = BromPreloader::new(link.inner());

        let report = run_handoff(
            &link,
            self.observer.as_ref(),
            &mut state,
            &mut preloader,
            loader,
            &self.config,
            &mut sink,
        )?;
        sink.save()?;

        if self.config.reboot_after {
            let mut ctx = DaContext::new(&link, self.observer.as_ref(), &mut state);
            handlers::reboot(&mut ctx, false)?;
            self.observer.on_event(&DaEvent::DeviceDisconnected);
        }

        Ok(report)
    }

    fn open_device(&self) -> Result<NusbTransport, TransportError> {
        let mut transport = match (self.config.vid, self.config.pid) {
            (Some(vid), Some(pid)) => NusbTransport::open_with_ids(vid, pid)?,
            _ => NusbTransport::open()?,
        };
        transport.set_read_timeout(Duration::from_millis(self.config.read_timeout_ms));
        Ok(transport)
    }

    fn wait_for_device(&self) -> Result<NusbTransport> {
        info!("Waiting for device...");
        let timeout = Duration::from_secs(self.config.retry_timeout_secs);
        let start = Instant::now();
        let mut poll_count = 0u64;

        loop {
            poll_count += 1;

            match self.open_device() {
                Ok(t) => {
                    info!(
                        vid = format!("{:04X}", t.vendor_id()),
                        pid = format!("{:04X}", t.product_id()),
                        "Device found after {} polls",
                        poll_count
                    );
                    return Ok(t);
                }
                Err(TransportError::DeviceNotFound { .. }) => {
                    if start.elapsed() > timeout {
                        return Err(anyhow!(
                            "Timeout waiting for device after {}s",
                            timeout.as_secs()
                        ));
                    }
                    thread::sleep(Duration::from_millis(100));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Transport wrapper that emits packet events.
struct ObservableTransport<'a, T: UsbTransport, O: DaObserver> {
    inner: &'a T,
    observer: &'a O,
}

impl<T: UsbTransport, O: DaObserver> UsbTransport for ObservableTransport<'_, T, O> {
    fn write(&self, data: &[u8]) -> Result<usize, TransportError> {
        let res = self.inner.write(data);
        if res.is_ok() {
            self.observer.on_event(&DaEvent::Packet {
                direction: PacketDirection::Tx,
                length: data.len(),
                data: Some(data.iter().take(32).cloned().collect()),
            });
        }
        res
    }

    fn read(&self, len: usize) -> Result<Vec<u8>, TransportError> {
        let res = self.inner.read(len);
        if let Ok(data) = &res
            && !data.is_empty()
        {
            self.observer.on_event(&DaEvent::Packet {
                direction: PacketDirection::Rx,
                length: data.len(),
                data: Some(data.iter().take(32).cloned().collect()),
            });
        }
        res
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }

    fn vendor_id(&self) -> u16 {
        self.inner.vendor_id()
    }

    fn product_id(&self) -> u16 {
        self.inner.product_id()
    }
}

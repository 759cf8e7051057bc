//! Event system for UI decoupling.
//!
//! Allows CLI/GUI front-ends to subscribe to protocol events without
//! tight coupling to the core logic.

use std::fmt;
use std::sync::Mutex;
use std::sync::mpsc::Sender;

/// Log level for events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Handoff phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaPhase {
    /// Waiting for device connection.
    WaitingForDevice,
    /// Delivering stage 1 through the preloader.
    Stage1Upload,
    /// Negotiating runtime parameters with stage 1.
    Stage1Setup,
    /// Pushing stage 2 through the chunked upload.
    Stage2Upload,
    /// Stage 2 running, environment setup.
    Stage2Setup,
    /// Hardware, storage and partition queries.
    Introspection,
    /// Handoff complete, device ready for commands.
    Ready,
    /// Error state.
    Error,
}

impl fmt::Display for DaPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DaPhase::WaitingForDevice => write!(f, "Waiting for Device"),
            DaPhase::Stage1Upload => write!(f, "Stage 1 Upload"),
            DaPhase::Stage1Setup => write!(f, "Stage 1 Setup"),
            DaPhase::Stage2Upload => write!(f, "Stage 2 Upload"),
            DaPhase::Stage2Setup => write!(f, "Stage 2 Setup"),
            DaPhase::Introspection => write!(f, "Introspection"),
            DaPhase::Ready => write!(f, "Ready"),
            DaPhase::Error => write!(f, "Error"),
        }
    }
}

/// Events emitted by the DA session.
#[derive(Debug, Clone)]
pub enum DaEvent {
    /// Device connected.
    DeviceConnected { vid: u16, pid: u16 },
    /// Device disconnected.
    DeviceDisconnected,
    /// Phase changed.
    PhaseChanged { from: DaPhase, to: DaPhase },
    /// Host-side transfer progress.
    Progress {
        phase: DaPhase,
        operation: String,
        current: u64,
        total: u64,
    },
    /// Progress text reported by the device inside CMD:PROGRESS-REPORT.
    DeviceProgress { message: String },
    /// Log message.
    Log { level: LogLevel, message: String },
    /// Command envelope sent to the device.
    CommandSent { command: String },
    /// Error occurred.
    Error { message: String },
    /// USB frame sent/received.
    Packet {
        direction: PacketDirection,
        length: usize,
        data: Option<Vec<u8>>,
    },
    /// Handoff completed successfully.
    Complete,
}

/// USB packet direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Transmit (Host -> Device)
    Rx, // Receive (Device -> Host)
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "TX"),
            PacketDirection::Rx => write!(f, "RX"),
        }
    }
}

/// Observer trait for receiving DA events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait DaObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &DaEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl DaObserver for NullObserver {
    fn on_event(&self, _event: &DaEvent) {}
}

/// Observer that forwards every event over a channel.
///
/// Lets a session run on a worker thread while another thread renders progress.
pub struct ChannelObserver {
    tx: Mutex<Sender<DaEvent>>,
}

impl ChannelObserver {
    pub fn new(tx: Sender<DaEvent>) -> Self {
        Self { tx: Mutex::new(tx) }
    }
}

impl DaObserver for ChannelObserver {
    fn on_event(&self, event: &DaEvent) {
        if let Ok(tx) = self.tx.lock() {
            // Receiver gone means nobody is watching any more.
            let _ = tx.send(event.clone());
        }
    }
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl DaObserver for TracingObserver {
    fn on_event(&self, event: &DaEvent) {
        match event {
            DaEvent::DeviceConnected { vid, pid } => {
                tracing::info!(vid = %format!("{:04X}", vid), pid = %format!("{:04X}", pid), "Device connected");
            }
            DaEvent::DeviceDisconnected => {
                tracing::warn!("Device disconnected");
            }
            DaEvent::PhaseChanged { from, to } => {
                tracing::info!(from = %from, to = %to, "Phase changed");
            }
            DaEvent::Progress {
                phase,
                operation,
                current,
                total,
            } => {
                let pct = if *total > 0 {
                    (*current * 100) / *total
                } else {
                    0
                };
                tracing::debug!(phase = %phase, operation = %operation, progress = %format!("{}%", pct), "Progress");
            }
            DaEvent::DeviceProgress { message } => {
                tracing::debug!(message = %message, "Device progress");
            }
            DaEvent::Log { level, message } => match level {
                LogLevel::Trace => tracing::trace!("{}", message),
                LogLevel::Debug => tracing::debug!("{}", message),
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Warn => tracing::warn!("{}", message),
                LogLevel::Error => tracing::error!("{}", message),
            },
            DaEvent::CommandSent { command } => {
                tracing::debug!(command = %command, "Command sent");
            }
            DaEvent::Error { message } => {
                tracing::error!("Error: {}", message);
            }
            DaEvent::Packet {
                direction, length, ..
            } => {
                tracing::trace!(dir = %direction, len = length, "USB Packet");
            }
            DaEvent::Complete => {
                tracing::info!("Handoff complete");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    #[test]
    fn test_channel_observer_forwards() {
        let (tx, rx) = mpsc::channel();
        let observer = ChannelObserver::new(tx);
        observer.on_event(&DaEvent::Complete);
        observer.on_event(&DaEvent::DeviceProgress {
            message: "init-hw".into(),
        });

        assert!(matches!(rx.recv().unwrap(), DaEvent::Complete));
        assert!(matches!(
            rx.recv().unwrap(),
            DaEvent::DeviceProgress { message } if message == "init-hw"
        ));
    }

    #[test]
    fn test_channel_observer_survives_dropped_receiver() {
        let (tx, rx) = mpsc::channel();
        drop(rx);
        ChannelObserver::new(tx).on_event(&DaEvent::Complete);
    }
}

//! Two-stage bootloader handoff.
//!
//! Stage 1 goes in through the preloader, negotiates the runtime environment,
//! then pushes stage 2 over the XML protocol. Once stage 2 runs, the device
//! is introspected and the findings are recorded in a [`ConfigSink`].

use tracing::{info, warn};

use crate::error::DaError;
use crate::events::{DaEvent, DaObserver, DaPhase, LogLevel};
use crate::hwparam::ConfigSink;
use crate::payload::{DaLoader, LoaderRegion};
use crate::preloader::Preloader;
use crate::protocol::command;
use crate::protocol::constants::*;
use crate::session::SessionConfig;
use crate::state::handlers::{
    self, DaContext, HwInfo, Nested, PartitionEntry, Reply, SecurityLock, StorageConfig,
    StorageInfo,
};
use crate::state::machine::SessionState;
use crate::transport::{FramedTransport, UsbTransport};

/// What the handoff learned about the device.
#[derive(Debug, Clone)]
pub struct DeviceReport {
    /// `None` when the SLA property could not be read.
    pub sla: Option<SecurityLock>,
    pub usb_high_speed: bool,
    pub hw_info: HwInfo,
    /// `None` for unknown storage; the device is then read-only.
    pub storage: Option<StorageConfig>,
    pub lifecycle_nominal: bool,
    /// `None` when the device declined the partition table read.
    pub partitions: Option<Vec<PartitionEntry>>,
}

impl DeviceReport {
    pub fn read_only(&self) -> bool {
        self.storage.is_none()
    }
}

/// Run the full handoff on a connected device.
///
/// On failure the session moves to [`DaPhase::Error`] and the observer gets
/// an error event before the error is returned.
pub fn run_handoff<T, O, P, S>(
    link: &FramedTransport<T>,
    observer: &O,
    state: &mut SessionState,
    preloader: &mut P,
    loader: &DaLoader,
    config: &SessionConfig,
    sink: &mut S,
) -> Result<DeviceReport, DaError>
where
    T: UsbTransport,
    O: DaObserver,
    P: Preloader,
    S: ConfigSink,
{
    let mut ctx = DaContext::new(link, observer, state);
    let result = upload_stage1(&mut ctx, preloader, &loader.stage1, config)
        .and_then(|()| boot_stage2(&mut ctx, &loader.stage2, config))
        .and_then(|()| introspect(&mut ctx, config, sink));
    match result {
        Ok(report) => {
            ctx.goto_phase(DaPhase::Ready);
            ctx.emit(DaEvent::Complete);
            Ok(report)
        }
        Err(e) => {
            ctx.goto_phase(DaPhase::Error);
            ctx.emit(DaEvent::Error {
                message: e.to_string(),
            });
            Err(e)
        }
    }
}

/// Deliver stage 1 and set up its environment.
pub fn upload_stage1<T: UsbTransport, O: DaObserver, P: Preloader>(
    ctx: &mut DaContext<'_, T, O>,
    preloader: &mut P,
    stage1: &LoaderRegion,
    config: &SessionConfig,
) -> Result<(), DaError> {
    ctx.goto_phase(DaPhase::Stage1Upload);
    let length = stage1.data.len() as u32;
    if !preloader.send_da(stage1.address, length, stage1.signature_len, &stage1.data)? {
        return Err(DaError::Preloader("Error on sending DA".into()));
    }
    info!(
        address = format!("0x{:X}", stage1.address),
        "Stage 1 uploaded, jumping"
    );
    if !preloader.jump_da(stage1.address)? {
        return Err(DaError::Preloader("Error on jumping to DA".into()));
    }
    handlers::resolve_start(ctx)?;

    ctx.goto_phase(DaPhase::Stage1Setup);
    handlers::setup_environment(ctx, &config.runtime_parameters())?;
    handlers::announce_host_capabilities(ctx, HOST_CAPABILITIES)?;
    handlers::notify_init_hw(ctx)?;
    handlers::set_host_info(ctx)?;
    Ok(())
}

/// Push stage 2 with BOOT-TO. The trailing START of the upload is the
/// post-boot START.
pub fn boot_stage2<T: UsbTransport, O: DaObserver>(
    ctx: &mut DaContext<'_, T, O>,
    stage2: &LoaderRegion,
    config: &SessionConfig,
) -> Result<(), DaError> {
    ctx.goto_phase(DaPhase::Stage2Upload);
    let payload = stage2.unsigned_payload();
    let address = stage2.address as u64;
    let xml = command::boot_to(address, address, config.host_mem_offset, payload.len() as u64);
    match handlers::send_command(ctx, &xml, false)? {
        Reply::Nested(Nested::Download(request)) => handlers::upload(ctx, &request, payload)?,
        Reply::Unsupported(message) => return Err(DaError::Unsupported(message)),
        Reply::Device(message) => return Err(DaError::Device(message)),
        Reply::Nested(other) => {
            return Err(DaError::Sequence {
                expected: CMD_DOWNLOAD_FILE,
                got: other.command_name().to_string(),
            });
        }
        Reply::Done | Reply::Acknowledged => {
            return Err(DaError::Sequence {
                expected: CMD_DOWNLOAD_FILE,
                got: CMD_END.to_string(),
            });
        }
    }
    info!(length = payload.len(), "Stage 2 running");
    ctx.state.daext = false;
    Ok(())
}

/// Stage-2 setup and device introspection.
pub fn introspect<T: UsbTransport, O: DaObserver, S: ConfigSink>(
    ctx: &mut DaContext<'_, T, O>,
    config: &SessionConfig,
    sink: &mut S,
) -> Result<DeviceReport, DaError> {
    ctx.goto_phase(DaPhase::Stage2Setup);
    handlers::announce_host_capabilities(ctx, HOST_CAPABILITIES)?;
    handlers::notify_init_hw(ctx)?;
    let usb_high_speed = handlers::change_usb_speed(ctx)?;

    let sla = match handlers::check_sla(ctx) {
        Ok(lock) => Some(lock),
        Err(e) if e.is_soft() => {
            warn!(error = %e, "SLA state unknown");
            ctx.log(LogLevel::Warn, format!("SLA state unknown: {}", e));
            None
        }
        Err(e) => return Err(e),
    };

    ctx.goto_phase(DaPhase::Introspection);
    let hw_info = handlers::get_hw_info(ctx)?;
    let storage = record_storage(ctx, sink, &hw_info.storage);
    let lifecycle_nominal = handlers::check_lifecycle(ctx)?;
    let partitions = handlers::read_partition_table(ctx)?;

    if let Some(hw_code) = config.hw_code {
        sink.write_setting("hwcode", &format!("0x{:x}", hw_code));
    }

    Ok(DeviceReport {
        sla,
        usb_high_speed,
        hw_info,
        storage,
        lifecycle_nominal,
        partitions,
    })
}

fn record_storage<T: UsbTransport, O: DaObserver, S: ConfigSink>(
    ctx: &DaContext<'_, T, O>,
    sink: &mut S,
    storage: &StorageInfo,
) -> Option<StorageConfig> {
    let Some(cfg) = StorageConfig::from_storage(storage) else {
        warn!(storage = %storage.tag(), "No storage layout, continuing read-only");
        ctx.log(
            LogLevel::Warn,
            format!("Storage '{}' not recognised, device is read-only", storage.tag()),
        );
        return None;
    };
    sink.write_setting("flashtype", &cfg.flash_type.to_string());
    sink.write_setting("flashsize", &format!("0x{:x}", cfg.flash_size));
    sink.write_setting("rpmbsize", &format!("0x{:x}", cfg.rpmb_size));
    sink.write_setting("boot1size", &format!("0x{:x}", cfg.boot1_size));
    sink.write_setting("boot2size", &format!("0x{:x}", cfg.boot2_size));
    Some(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ChannelObserver;
    use crate::hwparam::HwParamStore;
    use crate::protocol::DataType;
    use crate::protocol::field::field;
    use crate::transport::MockTransport;
    use std::sync::mpsc;

    const STAGE2_ADDR: u32 = 0x4000_0000;

    /// Preloader stand-in that records calls.
    #[derive(Default)]
    struct ScriptedPreloader {
        sent: Vec<(u32, u32, u32)>,
        jumped: Vec<u32>,
        refuse_send: bool,
    }

    impl Preloader for ScriptedPreloader {
        fn send_da(
            &mut self,
            address: u32,
            length: u32,
            signature_len: u32,
            _data: &[u8],
        ) -> Result<bool, DaError> {
            self.sent.push((address, length, signature_len));
            Ok(!self.refuse_send)
        }

        fn jump_da(&mut self, address: u32) -> Result<bool, DaError> {
            self.jumped.push(address);
            Ok(true)
        }
    }

    fn loader() -> DaLoader {
        DaLoader {
            stage1: LoaderRegion::new(vec![0x11; 0x300], 0x0020_0000, 0x100),
            stage2: LoaderRegion::new(vec![0x22; 0x2900], STAGE2_ADDR, 0x100),
        }
    }

    fn queue_done(mock: &MockTransport) {
        mock.queue_text("OK");
        mock.queue_command(CMD_END, "<result>OK</result>");
        mock.queue_command(CMD_START, "");
    }

    fn queue_upload_answer(mock: &MockTransport, payload: &[u8]) {
        mock.queue_text("OK");
        mock.queue_command(
            CMD_UPLOAD_FILE,
            "<checksum>CHK_NO</checksum><info>WriteLocalFile</info>\
             <target_file>MEM://0x7fe83c138700:0x200000</target_file>",
        );
        mock.queue_text(&format!("OK@0x{:x}", payload.len()));
        mock.queue_text("OK");
        mock.queue_frame(DataType::ProtocolFlow, payload);
        mock.queue_command(CMD_END, "<result>OK</result>");
        mock.queue_command(CMD_START, "");
    }

    /// Script a full conversation answering GET-HW-INFO with `hw_info`.
    fn script_device(mock: &MockTransport, hw_info: &str) {
        // START after the jump
        mock.queue_command(CMD_START, "");
        // runtime params, host caps, notify-init-hw, host info
        for _ in 0..4 {
            queue_done(mock);
        }

        // BOOT-TO: 0x2800 bytes in 0x1000 packets
        mock.queue_text("OK");
        mock.queue_command(
            CMD_DOWNLOAD_FILE,
            "<checksum>CHK_NO</checksum><info>2nd-DA</info>\
             <source_file>MEM://0x7fe83c09a04c:0x2800</source_file>\
             <packet_length>0x1000</packet_length>",
        );
        mock.queue_text("OK");
        for _ in 0..3 {
            mock.queue_text("OK");
        }
        mock.queue_command(CMD_PROGRESS_REPORT, "");
        mock.queue_text("100%");
        mock.queue_text(REPLY_EOT);
        mock.queue_command(CMD_END, "<result>OK</result>");
        mock.queue_command(CMD_START, "");

        // stage 2: host caps, notify-init-hw, USB speed (declined)
        queue_done(mock);
        queue_done(mock);
        mock.queue_text(REPLY_ERR_UNSUPPORTED);
        mock.queue_command(CMD_END, "<result>ERR!UNSUPPORTED</result>");
        mock.queue_command(CMD_START, "");

        queue_upload_answer(mock, b"<item key=\"DA.SLA\">DISABLED</item>");
        queue_upload_answer(mock, hw_info.as_bytes());
        queue_upload_answer(mock, b"OK");

        // partition table: double ack after END
        queue_upload_answer(
            mock,
            b"<pt><name>preloader</name><start>0x0</start><size>0x40000</size></pt>\
              <pt><name>super</name><start>0x8000000</start><size>0x200000000</size></pt>",
        );
    }

    fn config() -> SessionConfig {
        SessionConfig {
            hw_code: Some(0x996),
            ..Default::default()
        }
    }

    #[test]
    fn test_full_handoff_ufs() {
        let link = FramedTransport::new(MockTransport::new());
        script_device(
            link.inner(),
            "<da_hw_info><version>1.2</version><storage>UFS</storage><ufs>\
             <block_size>0x1000</block_size><lua0_size>0xEE5800000</lua0_size>\
             <lua1_size>0x400000</lua1_size><lua2_size>0x400000</lua2_size>\
             <lua3_size>0</lua3_size><id>4D54</id></ufs></da_hw_info>",
        );
        let (tx, rx) = mpsc::channel();
        let observer = ChannelObserver::new(tx);
        let mut state = SessionState::new();
        let mut preloader = ScriptedPreloader::default();
        let mut sink = HwParamStore::in_memory();

        let report = run_handoff(
            &link,
            &observer,
            &mut state,
            &mut preloader,
            &loader(),
            &config(),
            &mut sink,
        )
        .unwrap();

        assert_eq!(link.inner().pending(), 0);
        assert_eq!(preloader.sent, vec![(0x0020_0000, 0x300, 0x100)]);
        assert_eq!(preloader.jumped, vec![0x0020_0000]);

        assert_eq!(report.sla, Some(SecurityLock::Disabled));
        assert!(!report.usb_high_speed);
        assert!(report.lifecycle_nominal);
        assert!(!report.read_only());
        assert_eq!(report.partitions.as_ref().map(Vec::len), Some(2));
        assert_eq!(state.phase, DaPhase::Ready);

        assert_eq!(sink.get("flashtype"), Some("ufs"));
        assert_eq!(sink.get("flashsize"), Some("0xee5800000"));
        assert_eq!(sink.get("boot2size"), Some("0x400000"));
        assert_eq!(sink.get("hwcode"), Some("0x996"));

        let boot_to = link
            .inner()
            .written_texts()
            .into_iter()
            .find(|t| t.contains("CMD:BOOT-TO"))
            .unwrap();
        assert!(boot_to.contains("<at_address>0x40000000</at_address>"));
        assert!(boot_to.contains("MEM://0x7fe83c09a04c:0x2800"));

        let events: Vec<DaEvent> = rx.try_iter().collect();
        assert!(matches!(events.last(), Some(DaEvent::Complete)));
        assert!(events.iter().any(
            |e| matches!(e, DaEvent::DeviceProgress { message } if message == "100%")
        ));
    }

    #[test]
    fn test_stage2_learns_host_capabilities() {
        let link = FramedTransport::new(MockTransport::new());
        script_device(
            link.inner(),
            "<da_hw_info><version>1.2</version><storage>SDMMC</storage></da_hw_info>",
        );
        let mut state = SessionState::new();
        let mut sink = HwParamStore::in_memory();
        run_handoff(
            &link,
            &crate::events::NullObserver,
            &mut state,
            &mut ScriptedPreloader::default(),
            &loader(),
            &config(),
            &mut sink,
        )
        .unwrap();

        let commands: Vec<String> = link
            .inner()
            .written_texts()
            .iter()
            .map(|t| field(t, "command").to_string())
            .filter(|c| !c.is_empty())
            .collect();
        let boot_to = commands.iter().position(|c| c == "CMD:BOOT-TO").unwrap();
        assert_eq!(
            &commands[boot_to + 1..boot_to + 4],
            &[
                "CMD:HOST-SUPPORTED-COMMANDS",
                "CMD:NOTIFY-INIT-HW",
                "CMD:CAN-HIGHER-USB-SPEED"
            ]
        );
        let caps = link
            .inner()
            .written_texts()
            .into_iter()
            .filter(|t| field(t, "command") == "CMD:HOST-SUPPORTED-COMMANDS")
            .last()
            .unwrap();
        assert!(caps.contains(HOST_CAPABILITIES));
    }

    #[test]
    fn test_unknown_storage_degrades() {
        let link = FramedTransport::new(MockTransport::new());
        script_device(
            link.inner(),
            "<da_hw_info><version>1.2</version><storage>SDMMC</storage></da_hw_info>",
        );
        let mut state = SessionState::new();
        let mut preloader = ScriptedPreloader::default();
        let mut sink = HwParamStore::in_memory();

        let report = run_handoff(
            &link,
            &crate::events::NullObserver,
            &mut state,
            &mut preloader,
            &loader(),
            &config(),
            &mut sink,
        )
        .unwrap();

        assert!(report.read_only());
        assert!(sink.get("flashtype").is_none());
        assert_eq!(sink.get("hwcode"), Some("0x996"));
    }

    #[test]
    fn test_preloader_refusal() {
        let link = FramedTransport::new(MockTransport::new());
        let mut state = SessionState::new();
        let mut preloader = ScriptedPreloader {
            refuse_send: true,
            ..Default::default()
        };
        let mut sink = HwParamStore::in_memory();

        let err = run_handoff(
            &link,
            &crate::events::NullObserver,
            &mut state,
            &mut preloader,
            &loader(),
            &config(),
            &mut sink,
        )
        .unwrap_err();

        assert!(matches!(err, DaError::Preloader(ref m) if m == "Error on sending DA"));
        assert!(preloader.jumped.is_empty());
        assert_eq!(state.phase, DaPhase::Error);
    }

    #[test]
    fn test_stage1_missing_start() {
        let link = FramedTransport::new(MockTransport::new());
        link.inner().queue_command(CMD_END, "<result>OK</result>");
        let mut state = SessionState::new();
        let mut preloader = ScriptedPreloader::default();
        let mut sink = HwParamStore::in_memory();

        let err = run_handoff(
            &link,
            &crate::events::NullObserver,
            &mut state,
            &mut preloader,
            &loader(),
            &config(),
            &mut sink,
        )
        .unwrap_err();
        assert!(matches!(err, DaError::Sequence { expected: CMD_START, .. }));
    }
}

use std::io::Write;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use anyhow::Result;
use clap::Parser;
use daxml_core::events::{ChannelObserver, DaEvent, DaObserver, TracingObserver};
use daxml_core::{DaSession, DeviceReport, SessionConfig};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "MediaTek XML DA Tool (Pure Rust)", long_about = None)]
struct Args {
    /// Session configuration (TOML)
    #[arg(short, long)]
    config: Option<String>,

    /// Path to the DA loader (overrides the config file)
    #[arg(long)]
    loader: Option<String>,

    /// Where to write discovered device settings
    #[arg(long)]
    hwparam: Option<String>,

    /// DA UART log level, 0 (trace) to 4 (error)
    #[arg(long)]
    uart_log_level: Option<u8>,

    /// Reboot the device after the handoff
    #[arg(long)]
    reboot: bool,

    /// Write the effective configuration to this path and exit
    #[arg(long)]
    dump_config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn build_config(args: &Args) -> Result<SessionConfig> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::load_from_file(path)?,
        None => SessionConfig::default(),
    };
    if let Some(loader) = &args.loader {
        config.loader_path = Some(loader.clone());
    }
    if let Some(hwparam) = &args.hwparam {
        config.hwparam_path = Some(hwparam.clone());
    }
    if let Some(level) = args.uart_log_level {
        config.uart_log_level = level;
    }
    config.reboot_after |= args.reboot;
    Ok(config)
}

fn render(event: &DaEvent) {
    match event {
        DaEvent::Progress {
            operation,
            current,
            total,
            ..
        } if *total > 0 => {
            let pct = (*current * 100) / *total;
            eprint!("\r{}: {:3}% ({}/{} bytes)", operation, pct, current, total);
            if current >= total {
                eprintln!();
            }
            let _ = std::io::stderr().flush();
        }
        DaEvent::Packet { .. } => {}
        other => TracingObserver.on_event(other),
    }
}

fn print_report(report: &DeviceReport) {
    let hw = &report.hw_info;
    println!("Storage:        {}", hw.storage.tag());
    println!("RAM size:       0x{:x}", hw.ram_size);
    if !hw.product_id.is_empty() {
        println!("Product:        {}", hw.product_id);
    }
    match report.sla {
        Some(lock) => println!("SLA:            {}", lock),
        None => println!("SLA:            unknown"),
    }
    println!("High USB speed: {}", report.usb_high_speed);
    println!("Lifecycle OK:   {}", report.lifecycle_nominal);
    match &report.storage {
        Some(cfg) => println!(
            "Flash:          {} 0x{:x} (rpmb 0x{:x}, boot 0x{:x}/0x{:x})",
            cfg.flash_type, cfg.flash_size, cfg.rpmb_size, cfg.boot1_size, cfg.boot2_size
        ),
        None => println!("Flash:          unknown (read-only)"),
    }
    if let Some(partitions) = &report.partitions {
        println!("Partitions:");
        for p in partitions {
            println!("  {:<24} 0x{:012x} 0x{:012x}", p.name, p.start, p.size);
        }
    }
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = match build_config(&args) {
        Ok(c) => c,
        Err(e) => {
            error!("Error: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(path) = &args.dump_config {
        if let Err(e) = config.save_to_file(path) {
            error!("Error: {}", e);
            std::process::exit(1);
        }
        info!(path = %path, "Configuration written");
        return;
    }

    info!("Starting daxml (nusb backend)...");

    let (tx, rx) = mpsc::channel();
    let observer = Arc::new(ChannelObserver::new(tx));
    let handle = thread::spawn(move || DaSession::with_observer(config, observer).run());

    // Ends once the session thread drops its observer.
    for event in rx {
        render(&event);
    }

    match handle.join() {
        Ok(Ok(report)) => print_report(&report),
        Ok(Err(e)) => {
            error!("Error: {}", e);
            std::process::exit(1);
        }
        Err(_) => {
            error!("Session thread panicked");
            std::process::exit(1);
        }
    }
}

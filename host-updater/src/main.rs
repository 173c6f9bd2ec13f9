// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

mod updater;


use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use updater::{Updater, REPLY_TIMEOUT, SYNC_TIMEOUT};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Serial port the device is attached to, e.g. /dev/ttyUSB0
    #[arg(required_unless_present = "list_ports")]
    port: Option<String>,

    /// Update package produced by `fw-signer sign`
    #[arg(required_unless_present = "list_ports")]
    package: Option<PathBuf>,

    #[arg(short, long, default_value_t = 115_200)]
    baud: u32,

    /// Device identifier expected in the SYNCED reply (decimal or 0x-prefixed hex)
    #[arg(short, long, default_value_t = consts::DEVICE_ID, value_parser = parse_device_id)]
    device_id: u8,

    /// Seconds to keep trying to catch the device in its update window
    #[arg(long, default_value_t = SYNC_TIMEOUT.as_secs())]
    sync_timeout: u64,

    /// Milliseconds to wait for each reply
    #[arg(long, default_value_t = REPLY_TIMEOUT.as_millis() as u64)]
    reply_timeout: u64,

    /// List the serial ports and exit
    #[arg(short, long)]
    list_ports: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn parse_device_id(s: &str) -> Result<u8, String> {
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.map_err(|e| format!("invalid device id {s:?}: {e}"))
}

fn list_ports() -> Result<(), serialport::Error> {
    let ports = serialport::available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
    }
    for p in ports {
        println!("{}", p.port_name);
    }
    Ok(())
}

fn update(args: &Args, port: &str, package: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let package = std::fs::read(package)?;
    tracing::info!("package of {} bytes for device {:#04x}", package.len(), args.device_id);

    let port = serialport::new(port, args.baud).timeout(Duration::from_millis(10)).open()?;
    Updater::new(port, args.device_id)
        .with_sync_timeout(Duration::from_secs(args.sync_timeout))
        .with_reply_timeout(Duration::from_millis(args.reply_timeout))
        .run(&package)?;
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    // Tracing using RUST_LOG, falling back to the verbosity flag
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .init();

    let result = match (&args.port, &args.package) {
        _ if args.list_ports => list_ports().map_err(Into::into),
        (Some(port), Some(package)) => update(&args, port, package),
        _ => Err("a port and a package are required".into()),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

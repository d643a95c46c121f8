//! Firmware update tool for FOTA devices
//!
//! Scans for devices, reads their firmware revision and pushes new images
//! over BLE.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use fota_ble_controller::update::{self, UpdateOutcome};
use fota_ble_controller::{FirmwareImage, UpdateConfig, ble};
use log::*;

#[derive(Parser)]
#[command(name = "fota-ble")]
#[command(about = "Firmware-over-the-air updates for BLE devices")]
struct Cli {
    /// JSON config file (defaults to $FOTA_HOME/config.json or ~/.fota/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for BLE devices
    Scan {
        /// Scan duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Read the firmware revision of a device
    Revision {
        /// Device name or address to connect to
        #[arg(short, long)]
        device: Option<String>,
    },
    /// Send a firmware image to a device
    Update {
        /// Device name or address to connect to
        #[arg(short, long)]
        device: Option<String>,
        /// Firmware binary to send
        #[arg(short, long)]
        file: PathBuf,
        /// Do not reconnect afterwards to compare firmware revisions
        #[arg(long)]
        no_verify: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut config = UpdateConfig::resolve(cli.config.as_deref())?;
    let adapter = ble::get_adapter().await?;

    match cli.command {
        Commands::Scan { duration } => {
            scan_devices(&adapter, duration).await?;
        }
        Commands::Revision { device } => {
            if let Some(device) = device {
                config.device_name = device;
            }
            let revision = update::probe(&adapter, &config).await?;
            println!("{revision}");
        }
        Commands::Update { device, file, no_verify } => {
            if let Some(device) = device {
                config.device_name = device;
            }
            let image = FirmwareImage::load(&file)?;
            info!("Loaded {} ({} bytes)", file.display(), image.len());

            let outcome = update::run(&adapter, &image, &config, !no_verify).await?;
            report(&outcome)?;
        }
    }

    Ok(())
}

/// Print the transfer summary; an unchanged revision is an error
fn report(outcome: &UpdateOutcome) -> anyhow::Result<()> {
    println!(
        "Sent {} fragments ({} bytes) in {:.1}s, {} write timeouts, {} pauses",
        outcome.report.fragments_sent,
        outcome.report.bytes_sent,
        outcome.report.elapsed.as_secs_f64(),
        outcome.report.write_timeouts,
        outcome.report.pauses,
    );
    match (&outcome.after, outcome.succeeded()) {
        (Some(after), Some(true)) => println!("Update successful: {} -> {after}", outcome.before),
        (Some(after), _) => anyhow::bail!("update unsuccessful: still {after}"),
        (None, _) => println!("Update committed (not verified), was {}", outcome.before),
    }
    Ok(())
}

async fn scan_devices(adapter: &ble::Adapter, duration: u64) -> anyhow::Result<()> {
    println!("Scanning for devices ({duration} seconds)...");

    let devices = ble::scan(adapter, Duration::from_secs(duration)).await?;

    println!("\nFound {} devices:", devices.len());
    for device in devices {
        let rssi = device
            .rssi
            .map(|r| format!("{r} dBm"))
            .unwrap_or_else(|| "N/A".to_string());
        let marker = if device.is_fota { " [FOTA]" } else { "" };
        println!("  {} ({}) RSSI: {}{}", device.name, device.address, rssi, marker);
    }

    Ok(())
}

//! atvlink - discovery and configuration checks for media-remote devices.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use atvlink_device_connection::{DeviceConfig, TimingConfig};
use atvlink_discovery::Client;
use atvlink_protocol::DeviceSummary;

#[derive(Parser, Debug)]
#[command(name = "atvlink")]
#[command(version, about, long_about = None)]
struct Args {
    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan the local network and print `[{name, uid}]` as JSON
    Discover {
        /// Scan window in milliseconds
        #[arg(short, long, default_value_t = TimingConfig::default().scan_window_ms)]
        window_ms: u64,
    },

    /// Validate a device configuration file
    CheckConfig {
        /// Path to the JSON configuration
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Discover { window_ms } => discover(Duration::from_millis(window_ms)).await,
        Command::CheckConfig { path } => check_config(&path),
    }
}

async fn discover(window: Duration) -> Result<()> {
    info!(window_ms = window.as_millis() as u64, "scanning for devices");
    let devices = Client::new()
        .discover(window)
        .await
        .context("device scan failed")?;
    let summaries: Vec<DeviceSummary> = devices.iter().map(|d| d.summary()).collect();
    info!(count = summaries.len(), "scan finished");
    println!("{}", serde_json::to_string_pretty(&summaries)?);
    Ok(())
}

fn check_config(path: &Path) -> Result<()> {
    let config = DeviceConfig::load(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("invalid configuration in {}", path.display()))?;

    let device = config.device_ref()?;
    let paired = config.credential()?.is_some();
    info!(
        backend = %config.backend,
        device = %device.label(),
        paired,
        "configuration ok"
    );
    println!(
        "{}: {} backend, device {}, {}",
        path.display(),
        config.backend,
        device.label(),
        if paired { "paired" } else { "not paired" }
    );
    Ok(())
}

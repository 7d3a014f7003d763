//! netlamp - network traffic signal lamp
//!
//! Watches one network interface and drives a serial-attached indicator
//! (signal tower or LED strip) with one two-byte frame per packet.
//!
//! # Usage
//!
//! ```bash
//! # List capture interfaces and serial ports
//! netlamp devices
//!
//! # Run against eth0 and the first listed serial port
//! sudo netlamp --interface eth0 --serial 0
//!
//! # Write a starter config file
//! netlamp init-config netlamp.toml
//! ```
//!
//! # Environment Variables
//!
//! - `NETLAMP_CONFIG`: Path to a config file (when `--config` is not given)
//! - `RUST_LOG`: Log filter (overrides `[logging] level`)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use netlamp::acquisition::{devices, LiveCapture};
use netlamp::config::{ConfigOverrides, ConfigSource, LampConfig, LogFormat, LoggingConfig};
use netlamp::pipeline::{
    run_pipeline, Classifier, OverflowPolicy, PipelineSettings, QueueSettings, SerialSink,
};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "netlamp")]
#[command(about = "Classify live network traffic onto a serial signal lamp")]
#[command(version)]
struct CliArgs {
    /// Config file (default: $NETLAMP_CONFIG, then ./netlamp.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Capture interface, by name or by index from `netlamp devices`
    #[arg(short, long, value_name = "NAME|INDEX")]
    interface: Option<String>,

    /// Serial device, by path or by index from `netlamp devices`
    #[arg(short, long, value_name = "PATH|INDEX")]
    serial: Option<String>,

    /// Serial baud rate
    #[arg(long)]
    baud: Option<u32>,

    /// Minimum milliseconds between frames sent to the device
    #[arg(long, value_name = "MS")]
    pacing_ms: Option<u64>,

    /// What to do when the output falls behind capture
    #[arg(long, value_enum)]
    overflow_policy: Option<OverflowPolicy>,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// List capture interfaces (with addresses) and serial ports
    Devices {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Write a config file populated with the defaults
    InitConfig {
        /// Destination path
        #[arg(default_value = "netlamp.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl CliArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            interface: self.interface.clone(),
            serial_device: self.serial.clone(),
            baud_rate: self.baud,
            pacing_ms: self.pacing_ms,
            overflow_policy: self.overflow_policy,
        }
    }
}

// ============================================================================
// Logging
// ============================================================================

/// Install the global subscriber. `RUST_LOG` wins over the config level.
fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);
    match logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Load config before the real subscriber exists, so its warnings still reach
/// the terminal.
fn load_config(explicit: Option<&Path>) -> Result<(LampConfig, ConfigSource)> {
    let bootstrap = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_target(false)
        .finish();
    tracing::subscriber::with_default(bootstrap, || LampConfig::load(explicit))
        .context("Failed to load configuration")
}

// ============================================================================
// Subcommands
// ============================================================================

fn list_devices(json: bool) -> Result<()> {
    let inventory = devices::inventory().context("Failed to enumerate devices")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&inventory)?);
    } else {
        print!("{inventory}");
    }
    Ok(())
}

fn write_default_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    LampConfig::default()
        .save_to_file(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

// ============================================================================
// Pipeline Runner
// ============================================================================

async fn run(config: LampConfig, source: &ConfigSource) -> Result<()> {
    let warnings = config.validate().context("Invalid configuration")?;
    for w in &warnings {
        warn!("{}", w);
    }

    // Capture interface and its addresses
    let interfaces = devices::list_interfaces().context("Failed to enumerate capture interfaces")?;
    let iface = devices::resolve_interface(&interfaces, config.require_interface()?)?;
    let local_addresses = iface.local_addresses();

    // Serial device
    let serial_ports = devices::list_serial_ports().unwrap_or_else(|e| {
        warn!(error = %e, "Serial port enumeration failed; using device path as given");
        Vec::new()
    });
    let serial_path = devices::resolve_serial_port(&serial_ports, config.require_serial_device()?);

    let settings = PipelineSettings {
        queue: QueueSettings::from_config(&config.queue).context("Invalid queue settings")?,
        pacing_interval: config.pacing.interval(),
        drain_timeout: config.pacing.drain_timeout(),
    };

    info!("{RULE}");
    info!("  netlamp - network traffic signal lamp");
    info!("{RULE}");
    info!("   Config:     {}", source);
    info!("   Interface:  {} ({} local addresses)", iface.name, local_addresses.len());
    for addr in local_addresses.iter() {
        info!("               {}", addr);
    }
    info!("   Serial:     {} @ {} baud", serial_path, config.serial.baud_rate);
    info!(
        "   Queue:      capacity {} | threshold {} | {}",
        settings.queue.capacity(),
        settings.queue.overflow_threshold(),
        settings.queue.policy()
    );
    info!(
        "   Pacing:     {} ms (drain on shutdown {} ms)",
        config.pacing.interval_ms, config.pacing.drain_timeout_ms
    );
    info!("{RULE}");

    let capture = LiveCapture::open(&iface.name, &config.capture)
        .with_context(|| format!("Failed to open capture on {}", iface.name))?;
    let sink = SerialSink::open(&serial_path, &config.serial)
        .with_context(|| format!("Failed to open serial device {serial_path}"))?;

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("🛑 Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let report = run_pipeline(
        capture,
        sink,
        Classifier::new(local_addresses),
        settings,
        cancel_token,
    )
    .await
    .context("Pipeline stopped with an error")?;

    if let Some(capture_stats) = report.capture {
        info!("{}", capture_stats);
    }
    info!("✅ Shutdown complete");
    Ok(())
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    // Subcommand dispatch
    match args.command {
        Some(SubCommand::Devices { json }) => {
            init_logging(&LoggingConfig::default());
            return list_devices(json);
        }
        Some(SubCommand::InitConfig { ref path, force }) => {
            init_logging(&LoggingConfig::default());
            return write_default_config(path, force);
        }
        None => {}
    }

    let (mut config, source) = load_config(args.config.as_deref())?;
    config.apply_overrides(args.overrides());
    init_logging(&config.logging);

    run(config, &source).await
}

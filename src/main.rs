//! # Nevermore Host
//!
//! Host side of the Nevermore controller link.
//!
//! Opens the serial port, asks the controller for its firmware version,
//! optionally requests a state change, then polls the link and records
//! every sensor reading as JSONL telemetry.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Parse arguments, set up logging, load configuration
//!    - Open the telemetry logger (unless disabled)
//!
//! 2. **Session**
//!    - Open the serial port and send a VersionRequest
//!    - Send the `--state` request, if any, once per run
//!    - Poll at `poll_interval_ms`, re-request the version periodically
//!    - Warn when no valid frame has arrived within `link_timeout_ms`
//!
//! 3. **Reconnect / Shutdown**
//!    - On serial errors wait `reconnect_interval_ms` and reopen the port
//!    - On Ctrl+C log the link statistics and exit
//!
//! # Examples
//!
//! ```bash
//! nevermore-host --port /dev/ttyACM0 --state 1
//! RUST_LOG=debug nevermore-host --config config/default.toml --log-dir ./logs
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tokio::time::{interval, interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{info, warn};

use nevermore_link::config::{Config, LinkConfig};
use nevermore_link::link::{HostMonitor, Link};
use nevermore_link::logging::init_logging;
use nevermore_link::protocol::Message;
use nevermore_link::serial::NevermoreSerial;
use nevermore_link::shutdown;
use nevermore_link::telemetry::TelemetryLogger;
use nevermore_link::LinkError;

/// Host side of the Nevermore controller link
#[derive(Parser, Debug)]
#[command(name = "nevermore-host", version, about)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port, overrides the configuration
    #[arg(short, long)]
    port: Option<String>,

    /// Also write a daily rolling log into this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// State to request from the controller after connecting
    #[arg(short, long)]
    state: Option<u8>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(args.log_dir.as_deref(), "nevermore-host.log")
        .context("Failed to initialize logging")?;

    info!("Nevermore host v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args)?;

    let mut monitor = if config.telemetry.enabled {
        let logger = TelemetryLogger::new(&config.telemetry)
            .with_context(|| format!("Failed to open telemetry dir {}", config.telemetry.log_dir))?;
        info!("Recording telemetry to {}", config.telemetry.log_dir);
        HostMonitor::with_telemetry(logger)
    } else {
        HostMonitor::new()
    };

    let mut stop = shutdown::listen_for_ctrl_c();
    let mut pending_state = args.state;
    let reconnect_delay = Duration::from_millis(config.serial.reconnect_interval_ms);

    info!("Press Ctrl+C to exit");

    loop {
        let serial = match NevermoreSerial::open(&config.serial) {
            Ok(serial) => serial,
            Err(e) => {
                warn!("{}; retrying in {} ms", e, config.serial.reconnect_interval_ms);
                if shutdown::sleep_or_shutdown(&mut stop, reconnect_delay).await {
                    break;
                }
                continue;
            }
        };

        let mut link = Link::new(serial);
        let result = run_session(&mut link, &config.link, &mut monitor, &mut pending_state, &mut stop).await;
        info!("Link stats: {:?}", link.stats());

        match result {
            Ok(()) => break,
            Err(e) => {
                warn!("Link to {} lost: {}", link.port().device_path(), e);
                if shutdown::sleep_or_shutdown(&mut stop, reconnect_delay).await {
                    break;
                }
            }
        }
    }

    info!(
        "Shutting down (device version: {}, readings received: {})",
        monitor.device_version().unwrap_or("unknown"),
        monitor.readings_received()
    );

    Ok(())
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(port) = &args.port {
        config.serial.port = port.clone();
        config.validate()?;
    }

    Ok(config)
}

/// Drive one connected session until shutdown (`Ok`) or a serial failure (`Err`)
async fn run_session(
    link: &mut Link<NevermoreSerial>,
    config: &LinkConfig,
    monitor: &mut HostMonitor,
    pending_state: &mut Option<u8>,
    stop: &mut watch::Receiver<bool>,
) -> std::result::Result<(), LinkError> {
    link.send(&Message::VersionRequest).await?;

    if let Some(state) = *pending_state {
        link.send(&monitor.request_state(state)).await?;
        *pending_state = None;
    }

    let mut poll_tick = interval(Duration::from_millis(config.poll_interval_ms));
    poll_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut version_tick = (config.version_poll_interval_ms > 0).then(|| {
        let period = Duration::from_millis(config.version_poll_interval_ms);
        interval_at(Instant::now() + period, period)
    });

    let link_timeout = Duration::from_millis(config.link_timeout_ms);
    let mut stale = false;

    loop {
        tokio::select! {
            _ = poll_tick.tick() => {
                link.poll(monitor).await?;

                let now_stale = link.is_stale(link_timeout);
                if now_stale && !stale {
                    warn!("No valid frame for {} ms", link.since_last_packet().as_millis());
                } else if !now_stale && stale {
                    info!("Link recovered");
                }
                stale = now_stale;
            }

            _ = tick_if_enabled(&mut version_tick) => {
                link.send(&Message::VersionRequest).await?;
            }

            _ = shutdown::requested(stop) => {
                return Ok(());
            }
        }
    }
}

async fn tick_if_enabled(tick: &mut Option<Interval>) {
    match tick {
        Some(tick) => {
            tick.tick().await;
        }
        None => std::future::pending().await,
    }
}

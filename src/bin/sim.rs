//! # Nevermore Simulator
//!
//! Pretends to be a Nevermore controller on a serial port, for host
//! development without hardware (pair it with a null-modem or a
//! `socat` pty pair).
//!
//! Answers VersionRequest and StateChangeRequest like the firmware does
//! and emits a simulated SensorReading every `sensor_interval_ms`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use nevermore_link::config::Config;
use nevermore_link::link::{DeviceResponder, Link};
use nevermore_link::logging::init_logging;
use nevermore_link::protocol::Message;
use nevermore_link::serial::NevermoreSerial;
use nevermore_link::shutdown;
use nevermore_link::telemetry::SimulatedSensors;
use nevermore_link::LinkError;

/// Nevermore controller simulator
#[derive(Parser, Debug)]
#[command(name = "nevermore-sim", version, about = "Nevermore controller simulator")]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial port to serve on
    #[arg(short, long)]
    port: String,

    /// Also write a daily rolling log into this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(args.log_dir.as_deref(), "nevermore-sim.log")
        .context("Failed to initialize logging")?;

    info!("Nevermore simulator v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };
    config.serial.port = args.port.clone();
    config.validate()?;

    let mut device = DeviceResponder::new(config.device.version.clone(), config.device.initial_state)?;
    let sensors = SimulatedSensors::new();
    let mut stop = shutdown::listen_for_ctrl_c();
    let reconnect_delay = Duration::from_millis(config.serial.reconnect_interval_ms);

    info!("Reporting version {} on {}", device.version(), config.serial.port);

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
        let result = serve(&mut link, &config, &mut device, &sensors, &mut stop).await;
        info!("Link stats: {:?}", link.stats());

        match result {
            Ok(()) => break,
            Err(e) => {
                warn!("Serial port {} failed: {}", link.port().device_path(), e);
                if shutdown::sleep_or_shutdown(&mut stop, reconnect_delay).await {
                    break;
                }
            }
        }
    }

    info!("Simulator stopped (last state 0x{:02X})", device.state());
    Ok(())
}

/// Answer requests and stream readings until shutdown (`Ok`) or a serial failure (`Err`)
async fn serve(
    link: &mut Link<NevermoreSerial>,
    config: &Config,
    device: &mut DeviceResponder,
    sensors: &SimulatedSensors,
    stop: &mut watch::Receiver<bool>,
) -> std::result::Result<(), LinkError> {
    let mut poll_tick = interval(Duration::from_millis(config.link.poll_interval_ms));
    poll_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut sensor_tick = interval(Duration::from_millis(config.device.sensor_interval_ms));
    sensor_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = poll_tick.tick() => {
                link.poll(device).await?;
            }

            _ = sensor_tick.tick() => {
                let reading = sensors.sample();
                link.send(&Message::SensorReading(reading)).await?;
                debug!("Sent reading (inlet {:.1} °C)", reading.inlet.bme_temp_c);
            }

            _ = shutdown::requested(stop) => {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_is_required() {
        assert!(Args::try_parse_from(["nevermore-sim"]).is_err());
    }

    #[test]
    fn test_args() {
        let args = Args::parse_from(["nevermore-sim", "--port", "/tmp/ttyV1", "--log-dir", "/tmp/logs"]);
        assert_eq!(args.port, "/tmp/ttyV1");
        assert_eq!(args.log_dir, Some(PathBuf::from("/tmp/logs")));
        assert!(args.config.is_none());
    }
}

//! Host-side view of the controller.

use tracing::{debug, info, warn};

use super::MessageHandler;
use crate::protocol::{Message, SensorReading};
use crate::telemetry::TelemetryLogger;

/// Tracks what the controller has reported and records its telemetry
#[derive(Debug, Default)]
pub struct HostMonitor {
    device_version: Option<String>,
    device_state: Option<u8>,
    requested_state: Option<u8>,
    last_reading: Option<SensorReading>,
    readings_received: u64,
    telemetry: Option<TelemetryLogger>,
}

impl HostMonitor {
    /// Create a monitor without telemetry logging
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a monitor that writes every sensor reading to `logger`
    pub fn with_telemetry(logger: TelemetryLogger) -> Self {
        Self {
            telemetry: Some(logger),
            ..Self::default()
        }
    }

    /// Build a state change request and remember it until acknowledged
    pub fn request_state(&mut self, state: u8) -> Message {
        self.requested_state = Some(state);
        Message::StateChangeRequest { state }
    }

    /// Version reported by the device, once known
    pub fn device_version(&self) -> Option<&str> {
        self.device_version.as_deref()
    }

    /// Last state acknowledged by the device
    pub fn device_state(&self) -> Option<u8> {
        self.device_state
    }

    /// State requested but not yet acknowledged
    pub fn pending_state(&self) -> Option<u8> {
        self.requested_state
    }

    /// Most recent telemetry
    pub fn last_reading(&self) -> Option<&SensorReading> {
        self.last_reading.as_ref()
    }

    /// Number of sensor readings received
    pub fn readings_received(&self) -> u64 {
        self.readings_received
    }
}

impl MessageHandler for HostMonitor {
    fn on_message(&mut self, message: Message) -> Option<Message> {
        match message {
            Message::VersionResponse { version } => {
                if self.device_version.as_deref() != Some(version.as_str()) {
                    info!("Device version: {}", version);
                }
                self.device_version = Some(version);
            }
            Message::StateChangeResponse { state } => {
                match self.requested_state.take() {
                    Some(requested) if requested != state => {
                        warn!("Requested state 0x{:02X} but device reports 0x{:02X}", requested, state);
                    }
                    _ => info!("Device state: 0x{:02X}", state),
                }
                self.device_state = Some(state);
            }
            Message::SensorReading(reading) => {
                debug!("{}", Message::SensorReading(reading));
                self.readings_received += 1;
                if let Some(logger) = self.telemetry.as_mut() {
                    if let Err(e) = logger.log_reading(&reading) {
                        warn!("Failed to record telemetry: {}", e);
                    }
                }
                self.last_reading = Some(reading);
            }
            // Every device-to-host kind is matched above
            request => warn!("Ignoring request sent to the host: {}", request),
        }

        None
    }
}

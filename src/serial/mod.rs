//! # Serial Communication Module
//!
//! Handles the USB-CDC / UART connection to the filter controller.
//!
//! This module handles:
//! - Opening the serial port (8N1, no flow control)
//! - Probing candidate device paths
//! - Async write and timed non-blocking read operations

pub mod port_trait;

use std::time::Duration;

use async_trait::async_trait;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::config::SerialConfig;
use crate::error::{LinkError, Result};
pub use port_trait::{SerialPortIO, TokioSerialPort};

/// Default device paths to try (in order of preference)
pub const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyACM0", // USB CDC devices (RP2040 data port)
    "/dev/ttyUSB0", // USB-to-serial adapters
];

/// Serial connection to a Nevermore controller (or simulator)
pub struct NevermoreSerial {
    /// Serial port handle
    port: TokioSerialPort,
    /// Device path (e.g., /dev/ttyACM0)
    device_path: String,
}

impl std::fmt::Debug for NevermoreSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NevermoreSerial")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl NevermoreSerial {
    /// Open the port named in the configuration
    ///
    /// # Errors
    ///
    /// Returns `SerialPortNotFound` if the port cannot be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use nevermore_link::config::SerialConfig;
    /// use nevermore_link::serial::NevermoreSerial;
    ///
    /// let serial = NevermoreSerial::open(&SerialConfig::default())?;
    /// println!("Connected to: {}", serial.device_path());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(config: &SerialConfig) -> Result<Self> {
        Self::open_with_paths(
            &[config.port.as_str()],
            config.baud_rate,
            Duration::from_millis(config.read_timeout_ms),
        )
    }

    /// Open the first device that answers among `paths`
    ///
    /// # Errors
    ///
    /// Returns `SerialPortNotFound` listing every path that was tried
    pub fn open_with_paths(paths: &[&str], baud_rate: u32, read_timeout: Duration) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(stream) => {
                    info!("Opened serial device at {} ({} baud)", path, baud_rate);
                    return Ok(Self {
                        port: TokioSerialPort::new(stream, read_timeout),
                        device_path: path.to_string(),
                    });
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(LinkError::SerialPortNotFound(paths.join(", ")))
    }

    /// Open a specific serial port as 8N1 without flow control
    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| LinkError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

#[async_trait]
impl SerialPortIO for NevermoreSerial {
    async fn write_all(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.port.write_all(data).await
    }

    async fn flush(&mut self) -> std::io::Result<()> {
        self.port.flush().await
    }

    async fn read_available(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.port.read_available(buf).await
    }
}

//! Trait abstraction for serial port operations to enable testing

use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Trait for serial port I/O operations
#[async_trait]
pub trait SerialPortIO: Send {
    /// Write all data to the port
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer
    async fn flush(&mut self) -> io::Result<()>;

    /// Read whatever bytes are available into `buf`
    ///
    /// Returns `Ok(0)` when nothing arrives within the port's read timeout.
    async fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize>;
}

/// Wrapper around tokio_serial::SerialStream that implements SerialPortIO
pub struct TokioSerialPort {
    port: tokio_serial::SerialStream,
    read_timeout: Duration,
}

impl TokioSerialPort {
    pub fn new(port: tokio_serial::SerialStream, read_timeout: Duration) -> Self {
        Self { port, read_timeout }
    }
}

#[async_trait]
impl SerialPortIO for TokioSerialPort {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.port.flush().await
    }

    async fn read_available(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match tokio::time::timeout(self.read_timeout, self.port.read(buf)).await {
            Ok(result) => result,
            Err(_elapsed) => Ok(0),
        }
    }
}

//! # Error Types
//!
//! Custom error types for Nevermore Link using `thiserror`.
//!
//! Framing problems (noise, bad lengths, checksum mismatches) never show up
//! here: the stream parser recovers from them locally. Only errors on
//! structurally valid frames, encode-time constraint violations and I/O
//! failures are surfaced as [`LinkError`].

use std::fmt;

use thiserror::Error;

/// Expected payload size for a message type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSize {
    /// Payload must be exactly this many bytes
    Exact(usize),
    /// Payload may be at most this many bytes
    AtMost(usize),
}

impl fmt::Display for PayloadSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadSize::Exact(n) => write!(f, "exactly {}", n),
            PayloadSize::AtMost(n) => write!(f, "at most {}", n),
        }
    }
}

/// Main error type for Nevermore Link
#[derive(Debug, Error)]
pub enum LinkError {
    /// Frame carries a different type identifier than the one being decoded
    #[error("Message id mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    MessageId { expected: u8, actual: u8 },

    /// Frame carries a type identifier no message variant claims
    #[error("Unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    /// Payload length does not match what the message type requires
    #[error("Payload length error for 0x{type_id:02X}: expected {expected} bytes, got {actual}")]
    PayloadLength {
        type_id: u8,
        expected: PayloadSize,
        actual: usize,
    },

    /// Outgoing message would not fit its payload limit
    #[error("Cannot encode 0x{type_id:02X}: payload of {len} bytes exceeds maximum {max}")]
    EncodingConstraint { type_id: u8, len: usize, max: usize },

    /// Payload has the right size but cannot be interpreted
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Serial port errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// None of the candidate serial devices could be opened
    #[error("No serial device found (tried: {0})")]
    SerialPortNotFound(String),

    /// Telemetry logging errors
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl LinkError {
    /// Whether this error came from decoding an otherwise valid frame.
    ///
    /// Decode errors are reported per occurrence and leave the link usable.
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            LinkError::MessageId { .. }
                | LinkError::UnknownMessageType(_)
                | LinkError::PayloadLength { .. }
                | LinkError::InvalidPayload(_)
        )
    }
}

impl From<serde_json::Error> for LinkError {
    fn from(e: serde_json::Error) -> Self {
        LinkError::Telemetry(e.to_string())
    }
}

/// Result type alias for Nevermore Link
pub type Result<T> = std::result::Result<T, LinkError>;

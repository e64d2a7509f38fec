//! # Nevermore Link Library
//!
//! Framed serial protocol between a Nevermore air filter controller and its host.
//!
//! Frames are `[0xA5, length, type, payload.., crc8]`, 4 to 64 bytes long,
//! protected by CRC-8 (poly 0x07). This library provides the checksum, the
//! frame codec, a resynchronizing stream parser, the typed message catalogue
//! and an async session driver over tokio-serial.

pub mod config;
pub mod error;
pub mod link;
pub mod logging;
pub mod protocol;
pub mod serial;
pub mod shutdown;
pub mod telemetry;

pub use error::{LinkError, Result};

//! # Protocol Module
//!
//! Binary framing and typed messages for the controller link.
//!
//! This module handles:
//! - CRC-8 checksum calculation
//! - Frame encoding (sync, length, type, payload, CRC)
//! - Incremental frame extraction from a noisy byte stream
//! - Typed message encoding and decoding

pub mod crc;
pub mod packet;
pub mod parser;
pub mod messages;

pub use messages::{Message, MessageKind, SensorGroup, SensorReading};
pub use packet::{encode_packet, Packet, MAX_FRAME_LEN, MAX_PAYLOAD_LEN, META_LEN, SYNC_BYTE};
pub use parser::{ParseOutcome, StreamParser};

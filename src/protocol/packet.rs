//! # Packet Codec
//!
//! Frame layout shared by device and host:
//!
//! ```text
//! byte 0        SYNC      0xA5
//! byte 1        LENGTH    total frame length, 4..=64
//! byte 2        TYPE      message type identifier
//! bytes 3..N-2  PAYLOAD   LENGTH - 4 bytes
//! byte N-1      CRC       CRC-8 such that crc8(frame) == 0
//! ```

use super::crc::crc8;
use crate::error::{LinkError, Result};

/// Frame sync byte (always 0xA5)
pub const SYNC_BYTE: u8 = 0xA5;

/// Framing overhead: sync(1) + length(1) + type(1) + crc(1)
pub const META_LEN: usize = 4;

/// Maximum total frame length
pub const MAX_FRAME_LEN: usize = 64;

/// Maximum payload size (64 - 4 = 60 bytes)
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - META_LEN;

/// Whether a declared frame length is within bounds
pub fn is_valid_frame_len(len: usize) -> bool {
    (META_LEN..=MAX_FRAME_LEN).contains(&len)
}

/// A type identifier together with its raw payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Message type identifier
    pub type_id: u8,

    /// Payload data (at most 60 bytes)
    pub payload: Vec<u8>,
}

impl Packet {
    /// Create a new packet
    ///
    /// # Errors
    ///
    /// Returns `EncodingConstraint` if the payload exceeds `MAX_PAYLOAD_LEN` (60 bytes)
    pub fn new(type_id: u8, payload: Vec<u8>) -> Result<Self> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(LinkError::EncodingConstraint {
                type_id,
                len: payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }

        Ok(Self { type_id, payload })
    }

    /// Total length of this packet on the wire
    pub fn frame_len(&self) -> usize {
        self.payload.len() + META_LEN
    }

    /// Serialize this packet into a complete frame
    pub fn encode(&self) -> Vec<u8> {
        encode_packet(self.type_id, &self.payload)
    }
}

/// Build a complete frame for `type_id` and `payload`
///
/// The caller is trusted to keep `payload` within `MAX_PAYLOAD_LEN`; the
/// message catalogue enforces that before calling in here.
///
/// # Arguments
///
/// * `type_id` - Message type identifier
/// * `payload` - Payload bytes, at most 60
///
/// # Returns
///
/// * `Vec<u8>` - Sync, length, type, payload and CRC; `crc8` over it is 0
///
/// # Examples
///
/// ```
/// use nevermore_link::protocol::packet::encode_packet;
///
/// let frame = encode_packet(0x01, &[0x2A]);
/// assert_eq!(frame, vec![0xA5, 0x05, 0x01, 0x2A, 0xB2]);
/// ```
pub fn encode_packet(type_id: u8, payload: &[u8]) -> Vec<u8> {
    debug_assert!(
        payload.len() <= MAX_PAYLOAD_LEN,
        "payload of {} bytes exceeds frame capacity",
        payload.len()
    );

    let frame_len = payload.len() + META_LEN;
    let mut frame = Vec::with_capacity(frame_len);
    frame.push(SYNC_BYTE);
    frame.push(frame_len as u8);
    frame.push(type_id);
    frame.extend_from_slice(payload);

    let crc = crc8(&frame);
    frame.push(crc);

    frame
}

/// Split a validated frame into type identifier and payload
///
/// `frame` must already be length-correct and checksum-valid; the stream
/// parser only calls this after both checks pass.
///
/// # Arguments
///
/// * `frame` - One complete frame, sync byte through CRC
///
/// # Returns
///
/// * `Packet` - Type identifier and a copy of the payload bytes
pub fn decode_validated(frame: &[u8]) -> Packet {
    debug_assert!(is_valid_frame_len(frame.len()));

    Packet {
        type_id: frame[2],
        payload: frame[3..frame.len() - 1].to_vec(),
    }
}

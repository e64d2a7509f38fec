//! # Stream Parser
//!
//! Recovers frame boundaries from an unframed, possibly corrupted byte stream.
//!
//! The parser keeps no state besides the bytes it has not consumed yet.
//! Every call to [`StreamParser::try_parse_one`] re-derives synchronization
//! from the buffer contents:
//!
//! 1. no sync byte anywhere: the whole buffer is noise and is cleared
//! 2. sync found, header incomplete: bytes before the sync are dropped
//! 3. declared length out of bounds: the sync byte is dropped
//! 4. declared length valid, frame incomplete: wait
//! 5. checksum mismatch: the sync byte is dropped
//! 6. valid frame: the frame is consumed and returned
//!
//! Cases 3 and 5 only drop a single byte so a genuine frame hiding behind a
//! spurious sync byte is found on the next attempt.

use bytes::{Buf, BytesMut};
use tracing::trace;

use super::crc::crc8;
use super::packet::{decode_validated, is_valid_frame_len, Packet, MAX_FRAME_LEN, META_LEN, SYNC_BYTE};

/// Result of a single parse attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    /// No sync byte in the buffer; `discarded` noise bytes were cleared
    NoSync { discarded: usize },

    /// Sync byte found but fewer than `META_LEN` bytes are buffered from it
    IncompleteHeader,

    /// Declared length is outside `META_LEN..=MAX_FRAME_LEN`
    InvalidLength { declared: u8 },

    /// Declared length is valid but the frame is not fully buffered yet
    IncompleteFrame { declared: usize, buffered: usize },

    /// The full frame is buffered but its CRC does not check to zero
    ChecksumMismatch,

    /// A validated frame was consumed
    Packet(Packet),
}

impl ParseOutcome {
    /// Whether another attempt on the same buffer may produce something new
    pub fn made_progress(&self) -> bool {
        matches!(
            self,
            ParseOutcome::InvalidLength { .. } | ParseOutcome::ChecksumMismatch | ParseOutcome::Packet(_)
        )
    }

    /// Whether bytes were thrown away because they could not start a valid frame
    pub fn is_framing_error(&self) -> bool {
        matches!(
            self,
            ParseOutcome::InvalidLength { .. } | ParseOutcome::ChecksumMismatch
        ) || matches!(self, ParseOutcome::NoSync { discarded } if *discarded > 0)
    }
}

/// Incremental frame extractor owning its receive buffer
#[derive(Debug, Default)]
pub struct StreamParser {
    buf: BytesMut,
}

impl StreamParser {
    /// Create an empty parser
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(MAX_FRAME_LEN * 2),
        }
    }

    /// Append received bytes to the buffer
    pub fn append(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Number of bytes waiting to be parsed
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether no bytes are waiting to be parsed
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Make one parse attempt on the buffered bytes
    ///
    /// Call repeatedly while [`ParseOutcome::made_progress`] returns `true`.
    ///
    /// # Returns
    ///
    /// * `ParseOutcome::Packet` - A valid frame was removed from the buffer
    /// * `ParseOutcome::NoSync` - No sync byte; the buffer was cleared
    /// * `ParseOutcome::IncompleteHeader` / `IncompleteFrame` - Wait for more bytes;
    ///   leading noise before the sync byte has been dropped
    /// * `ParseOutcome::InvalidLength` / `ChecksumMismatch` - The sync byte was
    ///   dropped so the next call rescans from the following byte
    ///
    /// # Examples
    ///
    /// ```
    /// use nevermore_link::protocol::{ParseOutcome, StreamParser};
    ///
    /// let mut parser = StreamParser::new();
    /// parser.append(&[0xFF, 0xA5, 0x05, 0x01, 0x2A]);
    /// assert_eq!(
    ///     parser.try_parse_one(),
    ///     ParseOutcome::IncompleteFrame { declared: 5, buffered: 4 }
    /// );
    ///
    /// parser.append(&[0xB2]);
    /// assert!(matches!(parser.try_parse_one(), ParseOutcome::Packet(p) if p.payload == [0x2A]));
    /// ```
    pub fn try_parse_one(&mut self) -> ParseOutcome {
        let sync_pos = match self.buf.iter().position(|&b| b == SYNC_BYTE) {
            Some(pos) => pos,
            None => {
                let discarded = self.buf.len();
                if discarded > 0 {
                    trace!("No sync byte, discarding {} bytes", discarded);
                }
                self.buf.clear();
                return ParseOutcome::NoSync { discarded };
            }
        };

        if sync_pos > 0 {
            trace!("Skipping {} bytes before sync", sync_pos);
            self.buf.advance(sync_pos);
        }

        if self.buf.len() < META_LEN {
            return ParseOutcome::IncompleteHeader;
        }

        let declared = self.buf[1];
        if !is_valid_frame_len(declared as usize) {
            trace!("Invalid frame length {}, dropping sync byte", declared);
            self.buf.advance(1);
            return ParseOutcome::InvalidLength { declared };
        }

        let frame_len = declared as usize;
        if self.buf.len() < frame_len {
            return ParseOutcome::IncompleteFrame {
                declared: frame_len,
                buffered: self.buf.len(),
            };
        }

        if crc8(&self.buf[..frame_len]) != 0 {
            trace!("Checksum mismatch on {}-byte frame, dropping sync byte", frame_len);
            self.buf.advance(1);
            return ParseOutcome::ChecksumMismatch;
        }

        let frame = self.buf.split_to(frame_len);
        ParseOutcome::Packet(decode_validated(&frame))
    }

    /// Parse until a packet is found or no further progress is possible
    pub fn next_packet(&mut self) -> Option<Packet> {
        loop {
            match self.try_parse_one() {
                ParseOutcome::Packet(packet) => return Some(packet),
                outcome if outcome.made_progress() => continue,
                _ => return None,
            }
        }
    }

    /// Extract every packet currently recoverable from the buffer
    pub fn drain(&mut self) -> Vec<Packet> {
        let mut packets = Vec::new();
        while let Some(packet) = self.next_packet() {
            packets.push(packet);
        }
        packets
    }

    /// Append `data` and extract every packet that becomes available
    pub fn feed(&mut self, data: &[u8]) -> Vec<Packet> {
        self.append(data);
        self.drain()
    }
}

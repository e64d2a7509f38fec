//! # Link Module
//!
//! Session driver tying a serial transport to the stream parser.
//!
//! A [`Link`] owns one transport handle and one [`StreamParser`]. Each call
//! to [`Link::poll`] performs a single timed read, extracts every frame the
//! new bytes complete, decodes them and dispatches the messages to a
//! [`MessageHandler`]. Replies returned by the handler are written back
//! before `poll` returns.

pub mod device;
pub mod host;

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::{LinkError, Result};
use crate::protocol::{Message, Packet, ParseOutcome, StreamParser};
use crate::serial::SerialPortIO;

pub use device::DeviceResponder;
pub use host::HostMonitor;

/// Bytes requested from the transport per poll
pub const READ_CHUNK_SIZE: usize = 256;

/// Application logic fed by a [`Link`]
pub trait MessageHandler {
    /// Handle one decoded message, optionally returning a reply to send
    fn on_message(&mut self, message: Message) -> Option<Message>;

    /// Called once for every valid frame that fails to decode
    fn on_decode_error(&mut self, packet: &Packet, error: &LinkError) {
        warn!(
            "Failed to decode message 0x{:02X} ({} byte payload): {}",
            packet.type_id,
            packet.payload.len(),
            error
        );
    }
}

/// Traffic counters for one link
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    /// Raw bytes read from the transport
    pub bytes_received: u64,
    /// Checksum-valid frames extracted
    pub packets_received: u64,
    /// Parse attempts that discarded bytes
    pub framing_errors: u64,
    /// Valid frames that did not decode to a known message
    pub decode_errors: u64,
    /// Messages written to the transport
    pub messages_sent: u64,
}

/// One side of a framed serial session
pub struct Link<P> {
    port: P,
    parser: StreamParser,
    stats: LinkStats,
    last_packet_at: Instant,
    read_buf: [u8; READ_CHUNK_SIZE],
}

impl<P: SerialPortIO> Link<P> {
    /// Wrap an open transport
    pub fn new(port: P) -> Self {
        Self {
            port,
            parser: StreamParser::new(),
            stats: LinkStats::default(),
            last_packet_at: Instant::now(),
            read_buf: [0u8; READ_CHUNK_SIZE],
        }
    }

    /// Encode and write one message
    ///
    /// # Errors
    ///
    /// - `EncodingConstraint` if the message does not fit its payload limit
    ///   (nothing is written in that case)
    /// - `Serial` if the write or flush fails
    pub async fn send(&mut self, message: &Message) -> Result<()> {
        let frame = message.encode()?;

        self.port
            .write_all(&frame)
            .await
            .map_err(|e| LinkError::Serial(format!("Failed to write frame: {}", e)))?;

        self.port
            .flush()
            .await
            .map_err(|e| LinkError::Serial(format!("Failed to flush serial port: {}", e)))?;

        self.stats.messages_sent += 1;
        debug!("Sent {} ({} bytes)", message, frame.len());
        Ok(())
    }

    /// Read once, then dispatch every message the new bytes complete
    ///
    /// Returns the number of messages handed to `handler`. Decode failures
    /// are reported through [`MessageHandler::on_decode_error`] and do not
    /// end the poll.
    ///
    /// # Errors
    ///
    /// Returns `Serial` if reading from the transport or sending a reply fails
    pub async fn poll<H: MessageHandler>(&mut self, handler: &mut H) -> Result<usize> {
        let n = self
            .port
            .read_available(&mut self.read_buf)
            .await
            .map_err(|e| LinkError::Serial(format!("Failed to read serial port: {}", e)))?;

        if n > 0 {
            self.stats.bytes_received += n as u64;
            self.parser.append(&self.read_buf[..n]);
        }

        let mut handled = 0;
        let mut replies = Vec::new();

        for packet in self.drain_packets() {
            match Message::decode(&packet) {
                Ok(message) => {
                    debug!("Received {}", message);
                    handled += 1;
                    if let Some(reply) = handler.on_message(message) {
                        replies.push(reply);
                    }
                }
                Err(e) => {
                    self.stats.decode_errors += 1;
                    handler.on_decode_error(&packet, &e);
                }
            }
        }

        for reply in &replies {
            self.send(reply).await?;
        }

        Ok(handled)
    }

    /// Run the parser until it stops making progress
    fn drain_packets(&mut self) -> Vec<Packet> {
        let mut packets = Vec::new();

        loop {
            let outcome = self.parser.try_parse_one();
            if outcome.is_framing_error() {
                self.stats.framing_errors += 1;
            }

            let progressed = outcome.made_progress();
            if let ParseOutcome::Packet(packet) = outcome {
                self.stats.packets_received += 1;
                self.last_packet_at = Instant::now();
                packets.push(packet);
            }

            if !progressed {
                break;
            }
        }

        packets
    }

    /// Time since the last valid frame (or since the link was created)
    pub fn since_last_packet(&self) -> Duration {
        self.last_packet_at.elapsed()
    }

    /// Whether no valid frame has arrived within `timeout`
    pub fn is_stale(&self, timeout: Duration) -> bool {
        self.since_last_packet() > timeout
    }

    /// Traffic counters
    pub fn stats(&self) -> LinkStats {
        self.stats
    }

    /// Borrow the transport
    pub fn port(&self) -> &P {
        &self.port
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_packet;
    use crate::serial::port_trait::mocks::MockSerialPort;
    use std::io;

    /// Collects every message and decode error it sees
    #[derive(Default)]
    struct Recorder {
        messages: Vec<Message>,
        decode_errors: Vec<u8>,
        reply: Option<Message>,
    }

    impl MessageHandler for Recorder {
        fn on_message(&mut self, message: Message) -> Option<Message> {
            self.messages.push(message);
            self.reply.clone()
        }

        fn on_decode_error(&mut self, packet: &Packet, _error: &LinkError) {
            self.decode_errors.push(packet.type_id);
        }
    }

    #[tokio::test]
    async fn test_send_writes_frame() {
        let mock = MockSerialPort::new();
        let mut link = Link::new(mock.clone());

        link.send(&Message::StateChangeRequest { state: 0x2A }).await.unwrap();

        assert_eq!(mock.get_written_data(), vec![vec![0xA5, 0x05, 0x01, 0x2A, 0xB2]]);
        assert_eq!(link.stats().messages_sent, 1);
    }

    #[tokio::test]
    async fn test_send_rejects_oversized_message_before_writing() {
        let mock = MockSerialPort::new();
        let mut link = Link::new(mock.clone());

        let message = Message::VersionResponse { version: "x".repeat(61) };
        let result = link.send(&message).await;

        assert!(matches!(result, Err(LinkError::EncodingConstraint { .. })));
        assert!(mock.get_written_data().is_empty());
        assert_eq!(link.stats().messages_sent, 0);
    }

    #[tokio::test]
    async fn test_send_write_error() {
        let mock = MockSerialPort::new();
        mock.set_write_error(io::ErrorKind::BrokenPipe);
        let mut link = Link::new(mock);

        let result = link.send(&Message::VersionRequest).await;
        match result {
            Err(LinkError::Serial(msg)) => assert!(msg.contains("Failed to write frame")),
            other => panic!("Expected Serial error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_poll_with_nothing_available() {
        let mut link = Link::new(MockSerialPort::new());
        let mut recorder = Recorder::default();

        assert_eq!(link.poll(&mut recorder).await.unwrap(), 0);
        assert!(recorder.messages.is_empty());
        assert_eq!(link.stats(), LinkStats::default());
    }

    #[tokio::test]
    async fn test_poll_reassembles_split_frame() {
        let mock = MockSerialPort::new();
        let frame = Message::version_response("0.0.2").unwrap().encode().unwrap();
        mock.push_inbound(&frame[..3]);
        mock.push_inbound(&frame[3..]);

        let mut link = Link::new(mock);
        let mut recorder = Recorder::default();

        assert_eq!(link.poll(&mut recorder).await.unwrap(), 0);
        assert_eq!(link.poll(&mut recorder).await.unwrap(), 1);
        assert_eq!(
            recorder.messages,
            vec![Message::VersionResponse { version: "0.0.2".to_string() }]
        );
        assert_eq!(link.stats().packets_received, 1);
        assert_eq!(link.stats().bytes_received, frame.len() as u64);
    }

    #[tokio::test]
    async fn test_poll_dispatches_merged_frames_and_skips_noise() {
        let mock = MockSerialPort::new();
        let mut chunk = vec![0xFF, 0xFF];
        chunk.extend_from_slice(&Message::StateChangeResponse { state: 3 }.encode().unwrap());
        chunk.extend_from_slice(&Message::VersionRequest.encode().unwrap());
        mock.push_inbound(&chunk);

        let mut link = Link::new(mock);
        let mut recorder = Recorder::default();

        assert_eq!(link.poll(&mut recorder).await.unwrap(), 2);
        assert_eq!(
            recorder.messages,
            vec![Message::StateChangeResponse { state: 3 }, Message::VersionRequest]
        );
    }

    #[tokio::test]
    async fn test_poll_counts_framing_errors() {
        let mock = MockSerialPort::new();
        let mut corrupted = Message::StateChangeRequest { state: 9 }.encode().unwrap();
        corrupted[3] ^= 0x01;
        mock.push_inbound(&corrupted);
        mock.push_inbound(&Message::StateChangeRequest { state: 9 }.encode().unwrap());

        let mut link = Link::new(mock);
        let mut recorder = Recorder::default();

        link.poll(&mut recorder).await.unwrap();
        link.poll(&mut recorder).await.unwrap();

        assert_eq!(recorder.messages, vec![Message::StateChangeRequest { state: 9 }]);
        assert!(link.stats().framing_errors >= 1);
    }

    #[tokio::test]
    async fn test_decode_errors_reported_and_link_continues() {
        let mock = MockSerialPort::new();
        let mut chunk = encode_packet(0x7E, &[1, 2, 3]); // unknown type
        chunk.extend_from_slice(&encode_packet(0x01, &[1, 2])); // wrong length
        chunk.extend_from_slice(&Message::VersionRequest.encode().unwrap());
        mock.push_inbound(&chunk);

        let mut link = Link::new(mock);
        let mut recorder = Recorder::default();

        assert_eq!(link.poll(&mut recorder).await.unwrap(), 1);
        assert_eq!(recorder.decode_errors, vec![0x7E, 0x01]);
        assert_eq!(recorder.messages, vec![Message::VersionRequest]);
        assert_eq!(link.stats().decode_errors, 2);
        assert_eq!(link.stats().packets_received, 3);
    }

    #[tokio::test]
    async fn test_poll_sends_handler_replies() {
        let mock = MockSerialPort::new();
        mock.push_inbound(&Message::VersionRequest.encode().unwrap());

        let mut link = Link::new(mock.clone());
        let mut recorder = Recorder {
            reply: Some(Message::version_response("1.0").unwrap()),
            ..Recorder::default()
        };

        link.poll(&mut recorder).await.unwrap();

        let written = mock.get_written_data();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0], Message::version_response("1.0").unwrap().encode().unwrap());
    }

    #[tokio::test]
    async fn test_poll_read_error() {
        let mock = MockSerialPort::new();
        mock.set_read_error(io::ErrorKind::TimedOut);
        let mut link = Link::new(mock);

        let result = link.poll(&mut Recorder::default()).await;
        assert!(matches!(result, Err(LinkError::Serial(_))));
    }

    #[tokio::test]
    async fn test_staleness() {
        let mock = MockSerialPort::new();
        let mut link = Link::new(mock.clone());

        std::thread::sleep(Duration::from_millis(20));
        assert!(link.is_stale(Duration::from_millis(5)));
        assert!(!link.is_stale(Duration::from_secs(60)));

        mock.push_inbound(&Message::VersionRequest.encode().unwrap());
        link.poll(&mut Recorder::default()).await.unwrap();
        assert!(!link.is_stale(Duration::from_millis(5)));
    }
}

//! Device-side request handling.

use tracing::{info, warn};

use super::MessageHandler;
use crate::error::Result;
use crate::protocol::messages::validate_version;
use crate::protocol::Message;

/// Answers host requests the way the controller firmware does
#[derive(Debug, Clone)]
pub struct DeviceResponder {
    version: String,
    state: u8,
}

impl DeviceResponder {
    /// Create a responder reporting `version`
    ///
    /// # Errors
    ///
    /// Returns `EncodingConstraint` if `version` is longer than 60 bytes
    pub fn new(version: impl Into<String>, initial_state: u8) -> Result<Self> {
        let version = version.into();
        validate_version(&version)?;

        Ok(Self {
            version,
            state: initial_state,
        })
    }

    /// Version string reported to the host
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Last state requested by the host
    pub fn state(&self) -> u8 {
        self.state
    }
}

impl MessageHandler for DeviceResponder {
    fn on_message(&mut self, message: Message) -> Option<Message> {
        match message {
            Message::VersionRequest => {
                info!("Received: {}", message);
                Some(Message::VersionResponse {
                    version: self.version.clone(),
                })
            }
            Message::StateChangeRequest { state } => {
                info!("Received: {}", message);
                self.state = state;
                Some(Message::StateChangeResponse { state })
            }
            response => {
                // Both request kinds are matched above
                debug_assert!(response.kind().is_response());
                warn!("Ignoring response sent to the device: {}", response);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LinkError;
    use crate::protocol::SensorReading;

    #[test]
    fn test_version_request_answered() {
        let mut device = DeviceResponder::new("0.0.2", 0).unwrap();
        let reply = device.on_message(Message::VersionRequest);
        assert_eq!(reply, Some(Message::VersionResponse { version: "0.0.2".to_string() }));
    }

    #[test]
    fn test_state_change_echoed_and_stored() {
        let mut device = DeviceResponder::new("0.0.2", 0).unwrap();
        let reply = device.on_message(Message::StateChangeRequest { state: 0x42 });
        assert_eq!(reply, Some(Message::StateChangeResponse { state: 0x42 }));
        assert_eq!(device.state(), 0x42);
    }

    #[test]
    fn test_responses_sent_to_device_ignored() {
        let mut device = DeviceResponder::new("0.0.2", 7).unwrap();
        let responses = [
            Message::VersionResponse { version: "9.9.9".to_string() },
            Message::StateChangeResponse { state: 1 },
            Message::SensorReading(SensorReading::default()),
        ];

        for message in responses {
            assert!(message.kind().is_response());
            assert_eq!(device.on_message(message), None);
        }
        assert_eq!(device.state(), 7);
        assert_eq!(device.version(), "0.0.2");
    }

    #[test]
    fn test_version_too_long() {
        let result = DeviceResponder::new("v".repeat(61), 0);
        assert!(matches!(result, Err(LinkError::EncodingConstraint { .. })));
    }
}

//! # Message Catalogue
//!
//! Typed messages exchanged between the controller and the host.
//!
//! | type_id | message             | payload                         |
//! |---------|---------------------|---------------------------------|
//! | 0x00    | VersionRequest      | empty                           |
//! | 0x80    | VersionResponse     | UTF-8 string, at most 60 bytes  |
//! | 0x01    | StateChangeRequest  | u8 state                        |
//! | 0x81    | StateChangeResponse | u8 state                        |
//! | 0x82    | SensorReading       | two 28-byte sensor groups (LE)  |
//!
//! Numeric fields are little-endian with a fixed order. There is no schema
//! or version negotiation: changing a field's width or position breaks
//! compatibility with deployed firmware.

use std::fmt;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use super::packet::{encode_packet, Packet, MAX_PAYLOAD_LEN};
use crate::error::{LinkError, PayloadSize, Result};

/// Maximum version string length in bytes
pub const MAX_VERSION_LEN: usize = MAX_PAYLOAD_LEN;

/// Encoded size of one [`SensorGroup`]: 4 × u16/i16 + 5 × f32
pub const SENSOR_GROUP_LEN: usize = 4 * 2 + 5 * 4;

/// Encoded size of a [`SensorReading`] payload
pub const SENSOR_READING_LEN: usize = 2 * SENSOR_GROUP_LEN;

/// Bit set on a request identifier to form its response identifier
pub const RESPONSE_FLAG: u8 = 0x80;

/// Message type identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    VersionRequest = 0x00,
    StateChangeRequest = 0x01,
    VersionResponse = 0x80,
    StateChangeResponse = 0x81,
    SensorReading = 0x82,
}

impl MessageKind {
    /// All known message kinds
    pub const ALL: [MessageKind; 5] = [
        MessageKind::VersionRequest,
        MessageKind::StateChangeRequest,
        MessageKind::VersionResponse,
        MessageKind::StateChangeResponse,
        MessageKind::SensorReading,
    ];

    /// Wire identifier of this kind
    pub fn type_id(self) -> u8 {
        self as u8
    }

    /// Look up a kind by wire identifier
    pub fn from_type_id(type_id: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.type_id() == type_id)
    }

    /// Payload size this kind requires
    pub fn payload_size(self) -> PayloadSize {
        match self {
            MessageKind::VersionRequest => PayloadSize::Exact(0),
            MessageKind::VersionResponse => PayloadSize::AtMost(MAX_VERSION_LEN),
            MessageKind::StateChangeRequest | MessageKind::StateChangeResponse => PayloadSize::Exact(1),
            MessageKind::SensorReading => PayloadSize::Exact(SENSOR_READING_LEN),
        }
    }

    /// Whether this kind is a response (identifier has bit 0x80 set)
    pub fn is_response(self) -> bool {
        self.type_id() & RESPONSE_FLAG != 0
    }

    /// Decode `packet` as this kind
    ///
    /// # Errors
    ///
    /// - `MessageId` if the packet carries a different type identifier
    /// - `PayloadLength` if the payload length does not fit this kind
    /// - `InvalidPayload` if a version string is not valid UTF-8
    pub fn decode(self, packet: &Packet) -> Result<Message> {
        if packet.type_id != self.type_id() {
            return Err(LinkError::MessageId {
                expected: self.type_id(),
                actual: packet.type_id,
            });
        }

        let expected = self.payload_size();
        let len = packet.payload.len();
        let fits = match expected {
            PayloadSize::Exact(n) => len == n,
            PayloadSize::AtMost(n) => len <= n,
        };
        if !fits {
            return Err(LinkError::PayloadLength {
                type_id: packet.type_id,
                expected,
                actual: len,
            });
        }

        let payload = packet.payload.as_slice();
        let message = match self {
            MessageKind::VersionRequest => Message::VersionRequest,
            MessageKind::VersionResponse => {
                let version = String::from_utf8(payload.to_vec())
                    .map_err(|e| LinkError::InvalidPayload(format!("version is not UTF-8: {}", e)))?;
                Message::VersionResponse { version }
            }
            MessageKind::StateChangeRequest => Message::StateChangeRequest { state: payload[0] },
            MessageKind::StateChangeResponse => Message::StateChangeResponse { state: payload[0] },
            MessageKind::SensorReading => Message::SensorReading(SensorReading::decode_payload(payload)),
        };

        Ok(message)
    }
}

/// Readings from one DHT22 / SGP30 / BME680 sensor set
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorGroup {
    /// DHT22 temperature in whole °C
    pub dht_temp_c: i16,

    /// DHT22 relative humidity in whole %
    pub dht_humidity_rh: u16,

    /// SGP30 equivalent CO2 in ppm
    pub sgp_eco2_ppm: u16,

    /// SGP30 total VOC in ppb
    pub sgp_tvoc_ppb: u16,

    /// BME680 temperature in °C
    pub bme_temp_c: f32,

    /// BME680 gas resistance in kOhm
    pub bme_gas_kohm: f32,

    /// BME680 relative humidity in %
    pub bme_humidity_rh: f32,

    /// BME680 pressure in hPa
    pub bme_pressure_hpa: f32,

    /// BME680 derived altitude in meters
    pub bme_altitude_m: f32,
}

impl SensorGroup {
    fn put(&self, buf: &mut impl BufMut) {
        buf.put_i16_le(self.dht_temp_c);
        buf.put_u16_le(self.dht_humidity_rh);
        buf.put_u16_le(self.sgp_eco2_ppm);
        buf.put_u16_le(self.sgp_tvoc_ppb);
        buf.put_f32_le(self.bme_temp_c);
        buf.put_f32_le(self.bme_gas_kohm);
        buf.put_f32_le(self.bme_humidity_rh);
        buf.put_f32_le(self.bme_pressure_hpa);
        buf.put_f32_le(self.bme_altitude_m);
    }

    fn get(buf: &mut impl Buf) -> Self {
        Self {
            dht_temp_c: buf.get_i16_le(),
            dht_humidity_rh: buf.get_u16_le(),
            sgp_eco2_ppm: buf.get_u16_le(),
            sgp_tvoc_ppb: buf.get_u16_le(),
            bme_temp_c: buf.get_f32_le(),
            bme_gas_kohm: buf.get_f32_le(),
            bme_humidity_rh: buf.get_f32_le(),
            bme_pressure_hpa: buf.get_f32_le(),
            bme_altitude_m: buf.get_f32_le(),
        }
    }
}

/// Telemetry report with the inlet group followed by the outlet group
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub inlet: SensorGroup,
    pub outlet: SensorGroup,
}

impl SensorReading {
    /// Encode into the 56-byte wire payload
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(SENSOR_READING_LEN);
        self.inlet.put(&mut payload);
        self.outlet.put(&mut payload);
        payload
    }

    /// Decode from a payload already checked to be `SENSOR_READING_LEN` bytes
    fn decode_payload(mut payload: &[u8]) -> Self {
        let inlet = SensorGroup::get(&mut payload);
        let outlet = SensorGroup::get(&mut payload);
        Self { inlet, outlet }
    }
}

/// A decoded message
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Host asks for the firmware version
    VersionRequest,

    /// Device reports its firmware version
    VersionResponse { version: String },

    /// Host asks the device to switch state
    StateChangeRequest { state: u8 },

    /// Device acknowledges the state it switched to
    StateChangeResponse { state: u8 },

    /// Device telemetry
    SensorReading(SensorReading),
}

impl Message {
    /// Build a version response, rejecting strings longer than 60 bytes
    pub fn version_response(version: impl Into<String>) -> Result<Self> {
        let version = version.into();
        validate_version(&version)?;
        Ok(Message::VersionResponse { version })
    }

    /// Kind of this message
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::VersionRequest => MessageKind::VersionRequest,
            Message::VersionResponse { .. } => MessageKind::VersionResponse,
            Message::StateChangeRequest { .. } => MessageKind::StateChangeRequest,
            Message::StateChangeResponse { .. } => MessageKind::StateChangeResponse,
            Message::SensorReading(_) => MessageKind::SensorReading,
        }
    }

    /// Wire identifier of this message
    pub fn type_id(&self) -> u8 {
        self.kind().type_id()
    }

    /// Serialize the payload, enforcing per-message size limits
    ///
    /// # Errors
    ///
    /// Returns `EncodingConstraint` if a version string exceeds 60 bytes
    pub fn payload(&self) -> Result<Vec<u8>> {
        let payload = match self {
            Message::VersionRequest => Vec::new(),
            Message::VersionResponse { version } => {
                validate_version(version)?;
                version.as_bytes().to_vec()
            }
            Message::StateChangeRequest { state } | Message::StateChangeResponse { state } => {
                vec![*state]
            }
            Message::SensorReading(reading) => reading.encode_payload(),
        };
        Ok(payload)
    }

    /// Convert into a raw packet
    pub fn to_packet(&self) -> Result<Packet> {
        Packet::new(self.type_id(), self.payload()?)
    }

    /// Serialize into a complete frame
    ///
    /// # Examples
    ///
    /// ```
    /// use nevermore_link::protocol::messages::Message;
    ///
    /// let frame = Message::StateChangeRequest { state: 0x2A }.encode()?;
    /// assert_eq!(frame, vec![0xA5, 0x05, 0x01, 0x2A, 0xB2]);
    /// # Ok::<(), nevermore_link::error::LinkError>(())
    /// ```
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = self.payload()?;
        Ok(encode_packet(self.type_id(), &payload))
    }

    /// Decode a packet by its type identifier
    ///
    /// # Errors
    ///
    /// Returns `UnknownMessageType` for identifiers outside the catalogue,
    /// otherwise whatever [`MessageKind::decode`] reports.
    pub fn decode(packet: &Packet) -> Result<Self> {
        let kind = MessageKind::from_type_id(packet.type_id)
            .ok_or(LinkError::UnknownMessageType(packet.type_id))?;
        kind.decode(packet)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::VersionRequest => write!(f, "VersionRequest()"),
            Message::VersionResponse { version } => write!(f, "VersionResponse(version={})", version),
            Message::StateChangeRequest { state } => write!(f, "StateChangeRequest(state=0x{:02X})", state),
            Message::StateChangeResponse { state } => write!(f, "StateChangeResponse(state=0x{:02X})", state),
            Message::SensorReading(r) => write!(
                f,
                "SensorReading(in{{tempC={:.1}, RH={:.1}, hPa={:.1}, eCO2={}, TVOC={}}}, out{{tempC={:.1}, RH={:.1}, hPa={:.1}, eCO2={}, TVOC={}}})",
                r.inlet.bme_temp_c,
                r.inlet.bme_humidity_rh,
                r.inlet.bme_pressure_hpa,
                r.inlet.sgp_eco2_ppm,
                r.inlet.sgp_tvoc_ppb,
                r.outlet.bme_temp_c,
                r.outlet.bme_humidity_rh,
                r.outlet.bme_pressure_hpa,
                r.outlet.sgp_eco2_ppm,
                r.outlet.sgp_tvoc_ppb,
            ),
        }
    }
}

/// Reject version strings that do not fit a VersionResponse payload
pub fn validate_version(version: &str) -> Result<()> {
    if version.len() > MAX_VERSION_LEN {
        return Err(LinkError::EncodingConstraint {
            type_id: MessageKind::VersionResponse.type_id(),
            len: version.len(),
            max: MAX_VERSION_LEN,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::crc::crc8;
    use crate::protocol::parser::StreamParser;
    use proptest::prelude::*;

    fn sample_reading() -> SensorReading {
        SensorReading {
            inlet: SensorGroup {
                dht_temp_c: 22,
                dht_humidity_rh: 45,
                sgp_eco2_ppm: 412,
                sgp_tvoc_ppb: 13,
                bme_temp_c: 23.7,
                bme_gas_kohm: 87.5,
                bme_humidity_rh: 44.2,
                bme_pressure_hpa: 1013.25,
                bme_altitude_m: 512.0,
            },
            outlet: SensorGroup {
                dht_temp_c: -4,
                dht_humidity_rh: 51,
                sgp_eco2_ppm: 400,
                sgp_tvoc_ppb: 0,
                bme_temp_c: -3.5,
                bme_gas_kohm: 120.125,
                bme_humidity_rh: 49.9,
                bme_pressure_hpa: 1001.0,
                bme_altitude_m: -12.5,
            },
        }
    }

    /// Encode, push through a fresh parser, decode
    fn through_the_wire(message: &Message) -> Message {
        let mut parser = StreamParser::new();
        parser.append(&message.encode().unwrap());
        let packet = parser.next_packet().expect("frame should parse");
        assert!(parser.is_empty());
        Message::decode(&packet).unwrap()
    }

    #[test]
    fn test_type_ids() {
        assert_eq!(MessageKind::VersionRequest.type_id(), 0x00);
        assert_eq!(MessageKind::VersionResponse.type_id(), 0x80);
        assert_eq!(MessageKind::StateChangeRequest.type_id(), 0x01);
        assert_eq!(MessageKind::StateChangeResponse.type_id(), 0x81);
        assert_eq!(MessageKind::SensorReading.type_id(), 0x82);
    }

    #[test]
    fn test_from_type_id() {
        for kind in MessageKind::ALL {
            assert_eq!(MessageKind::from_type_id(kind.type_id()), Some(kind));
        }
        assert_eq!(MessageKind::from_type_id(0x02), None);
        assert_eq!(MessageKind::from_type_id(0xFF), None);
    }

    #[test]
    fn test_response_flag() {
        assert!(!MessageKind::VersionRequest.is_response());
        assert!(!MessageKind::StateChangeRequest.is_response());
        assert!(MessageKind::VersionResponse.is_response());
        assert!(MessageKind::StateChangeResponse.is_response());
        assert!(MessageKind::SensorReading.is_response());

        assert_eq!(
            MessageKind::VersionResponse.type_id(),
            MessageKind::VersionRequest.type_id() | RESPONSE_FLAG
        );
        assert_eq!(
            MessageKind::StateChangeResponse.type_id(),
            MessageKind::StateChangeRequest.type_id() | RESPONSE_FLAG
        );
    }

    #[test]
    fn test_sensor_reading_len() {
        assert_eq!(SENSOR_GROUP_LEN, 28);
        assert_eq!(SENSOR_READING_LEN, 56);
        assert_eq!(sample_reading().encode_payload().len(), SENSOR_READING_LEN);
    }

    #[test]
    fn test_state_change_request_wire_bytes() {
        let frame = Message::StateChangeRequest { state: 0x2A }.encode().unwrap();
        assert_eq!(frame, vec![0xA5, 0x05, 0x01, 0x2A, 0xB2]);
        assert_eq!(crc8(&frame), 0);
    }

    #[test]
    fn test_version_request_wire_bytes() {
        let frame = Message::VersionRequest.encode().unwrap();
        assert_eq!(frame, vec![0xA5, 0x04, 0x00, 0xDC]);
    }

    #[test]
    fn test_version_request_round_trip() {
        assert_eq!(through_the_wire(&Message::VersionRequest), Message::VersionRequest);
    }

    #[test]
    fn test_version_response_round_trip() {
        let message = Message::version_response("test-version").unwrap();
        assert_eq!(through_the_wire(&message), message);
    }

    #[test]
    fn test_version_response_max_length() {
        let version = "v".repeat(MAX_VERSION_LEN);
        let message = Message::version_response(version.clone()).unwrap();
        let frame = message.encode().unwrap();
        assert_eq!(frame.len(), 64);
        assert_eq!(through_the_wire(&message), Message::VersionResponse { version });
    }

    #[test]
    fn test_version_response_multibyte_utf8() {
        let message = Message::version_response("nevermore-µ-0.0.2").unwrap();
        assert_eq!(through_the_wire(&message), message);
    }

    #[test]
    fn test_version_response_too_long() {
        let result = Message::version_response("v".repeat(61));
        assert!(matches!(
            result,
            Err(LinkError::EncodingConstraint { type_id: 0x80, len: 61, max: 60 })
        ));

        // Constructed directly, the limit is still enforced at encode time
        let message = Message::VersionResponse { version: "x".repeat(70) };
        assert!(matches!(message.encode(), Err(LinkError::EncodingConstraint { .. })));
        assert!(matches!(message.to_packet(), Err(LinkError::EncodingConstraint { .. })));
    }

    #[test]
    fn test_version_response_invalid_utf8() {
        let packet = Packet::new(0x80, vec![0xFF, 0xFE]).unwrap();
        assert!(matches!(Message::decode(&packet), Err(LinkError::InvalidPayload(_))));
    }

    #[test]
    fn test_state_change_round_trip() {
        for state in [0u8, 0x2A, 0x42, 0xFF] {
            let request = Message::StateChangeRequest { state };
            assert_eq!(through_the_wire(&request), request);

            let response = Message::StateChangeResponse { state };
            assert_eq!(through_the_wire(&response), response);
        }
    }

    #[test]
    fn test_sensor_reading_round_trip() {
        let message = Message::SensorReading(sample_reading());
        let decoded = through_the_wire(&message);
        assert_eq!(decoded, message);

        // Floats survive bit for bit
        if let Message::SensorReading(r) = decoded {
            assert_eq!(r.inlet.bme_humidity_rh.to_bits(), 44.2f32.to_bits());
            assert_eq!(r.outlet.bme_altitude_m.to_bits(), (-12.5f32).to_bits());
        }
    }

    fn group_bits(group: &SensorGroup) -> [u32; 5] {
        [
            group.bme_temp_c.to_bits(),
            group.bme_gas_kohm.to_bits(),
            group.bme_humidity_rh.to_bits(),
            group.bme_pressure_hpa.to_bits(),
            group.bme_altitude_m.to_bits(),
        ]
    }

    prop_compose! {
        fn any_f32_bits()(bits in any::<u32>()) -> f32 {
            f32::from_bits(bits)
        }
    }

    prop_compose! {
        fn sensor_group()(
            dht_temp_c in any::<i16>(),
            dht_humidity_rh in any::<u16>(),
            sgp_eco2_ppm in any::<u16>(),
            sgp_tvoc_ppb in any::<u16>(),
            bme_temp_c in any_f32_bits(),
            bme_gas_kohm in any_f32_bits(),
            bme_humidity_rh in any_f32_bits(),
            bme_pressure_hpa in any_f32_bits(),
            bme_altitude_m in any_f32_bits(),
        ) -> SensorGroup {
            SensorGroup {
                dht_temp_c,
                dht_humidity_rh,
                sgp_eco2_ppm,
                sgp_tvoc_ppb,
                bme_temp_c,
                bme_gas_kohm,
                bme_humidity_rh,
                bme_pressure_hpa,
                bme_altitude_m,
            }
        }
    }

    proptest! {
        #[test]
        fn prop_state_change_round_trip(state in any::<u8>()) {
            let request = Message::StateChangeRequest { state };
            prop_assert_eq!(through_the_wire(&request), request);

            let response = Message::StateChangeResponse { state };
            prop_assert_eq!(through_the_wire(&response), response);
        }

        #[test]
        fn prop_version_within_limit_round_trips(
            // 15 chars of at most 4 bytes each always fit, as does any 60-char ASCII string
            version in prop_oneof!["[ -~]{0,60}", "\\PC{0,15}"],
        ) {
            prop_assert!(version.len() <= MAX_VERSION_LEN);
            let message = Message::version_response(version.clone()).unwrap();
            prop_assert_eq!(through_the_wire(&message), Message::VersionResponse { version });
        }

        #[test]
        fn prop_version_over_limit_rejected(
            version in "\\PC{61,120}",
        ) {
            let len = version.len();
            let rejected = matches!(
                Message::version_response(version.clone()),
                Err(LinkError::EncodingConstraint { type_id: 0x80, len: l, max: 60 }) if l == len
            );
            prop_assert!(rejected);

            let direct = Message::VersionResponse { version };
            prop_assert!(direct.encode().is_err());
        }

        #[test]
        fn prop_sensor_reading_round_trips_bit_for_bit(
            inlet in sensor_group(),
            outlet in sensor_group(),
        ) {
            let message = Message::SensorReading(SensorReading { inlet, outlet });
            let decoded = match through_the_wire(&message) {
                Message::SensorReading(reading) => reading,
                other => panic!("Expected SensorReading, got: {:?}", other),
            };

            for (sent, got) in [(&inlet, &decoded.inlet), (&outlet, &decoded.outlet)] {
                prop_assert_eq!(got.dht_temp_c, sent.dht_temp_c);
                prop_assert_eq!(got.dht_humidity_rh, sent.dht_humidity_rh);
                prop_assert_eq!(got.sgp_eco2_ppm, sent.sgp_eco2_ppm);
                prop_assert_eq!(got.sgp_tvoc_ppb, sent.sgp_tvoc_ppb);
                prop_assert_eq!(group_bits(got), group_bits(sent));
            }
        }
    }

    #[test]
    fn test_sensor_reading_field_order() {
        let mut reading = SensorReading::default();
        reading.inlet.dht_temp_c = -1;
        reading.inlet.dht_humidity_rh = 0x0102;
        reading.inlet.bme_temp_c = 1.0;
        reading.outlet.sgp_tvoc_ppb = 0xBEEF;

        let payload = reading.encode_payload();
        assert_eq!(&payload[0..2], &[0xFF, 0xFF]);
        assert_eq!(&payload[2..4], &[0x02, 0x01]);
        assert_eq!(&payload[8..12], &1.0f32.to_le_bytes());
        assert_eq!(&payload[SENSOR_GROUP_LEN + 6..SENSOR_GROUP_LEN + 8], &[0xEF, 0xBE]);
    }

    #[test]
    fn test_decode_as_wrong_kind() {
        let packet = Message::StateChangeResponse { state: 1 }.to_packet().unwrap();
        let result = MessageKind::StateChangeRequest.decode(&packet);
        assert!(matches!(
            result,
            Err(LinkError::MessageId { expected: 0x01, actual: 0x81 })
        ));
    }

    #[test]
    fn test_decode_unknown_type() {
        let packet = Packet::new(0x7F, vec![]).unwrap();
        assert!(matches!(Message::decode(&packet), Err(LinkError::UnknownMessageType(0x7F))));
    }

    #[test]
    fn test_decode_payload_length_errors() {
        let cases = [
            (0x00u8, vec![0x01]),
            (0x01, vec![]),
            (0x01, vec![0x01, 0x02]),
            (0x81, vec![]),
            (0x82, vec![0u8; 12]),
            (0x82, vec![0u8; 57]),
        ];

        for (type_id, payload) in cases {
            let packet = Packet::new(type_id, payload.clone()).unwrap();
            match Message::decode(&packet) {
                Err(LinkError::PayloadLength { type_id: t, actual, .. }) => {
                    assert_eq!(t, type_id);
                    assert_eq!(actual, payload.len());
                }
                other => panic!("Expected PayloadLength for 0x{:02X}, got: {:?}", type_id, other),
            }
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Message::VersionRequest.to_string(), "VersionRequest()");
        assert_eq!(
            Message::StateChangeRequest { state: 0x2A }.to_string(),
            "StateChangeRequest(state=0x2A)"
        );
        assert_eq!(
            Message::VersionResponse { version: "0.0.2".to_string() }.to_string(),
            "VersionResponse(version=0.0.2)"
        );
        assert!(Message::SensorReading(sample_reading())
            .to_string()
            .starts_with("SensorReading(in{tempC=23.7"));
    }
}

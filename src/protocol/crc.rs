//! # CRC-8 Implementation
//!
//! CRC-8 (SMBus variant) checksum used as the frame integrity check.
//!
//! **Polynomial**: 0x07 (x^8 + x^2 + x + 1)
//! **Initial Value**: 0x00
//! **Final XOR**: none
//!
//! Because there is no final XOR, running the CRC over a frame that already
//! ends with its own checksum byte yields zero. The stream parser relies on
//! this to validate frames without comparing against a stored value.

/// Generator polynomial, MSB first
const CRC8_POLY: u8 = 0x07;

/// Table indexed by `crc ^ byte`, built at compile time
const CRC8_TABLE: [u8; 256] = build_table();

/// Clock one bit through the CRC register
const fn shift(crc: u8) -> u8 {
    if crc & 0x80 == 0 {
        crc << 1
    } else {
        (crc << 1) ^ CRC8_POLY
    }
}

const fn build_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut index = 0;

    while index < table.len() {
        let mut crc = index as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = shift(crc);
            bit += 1;
        }
        table[index] = crc;
        index += 1;
    }

    table
}

/// Calculate the CRC-8 checksum of `data`
///
/// # Arguments
///
/// * `data` - Bytes to checksum (a frame without its CRC, or a whole frame to verify)
///
/// # Returns
///
/// * `u8` - Checksum; 0 when `data` is a complete, intact frame
///
/// # Examples
///
/// ```
/// use nevermore_link::protocol::crc::crc8;
///
/// let frame = [0xA5, 0x05, 0x01, 0x2A];
/// let crc = crc8(&frame);
///
/// // Appending the checksum makes the whole frame check to zero
/// let mut full = frame.to_vec();
/// full.push(crc);
/// assert_eq!(crc8(&full), 0);
/// ```
pub fn crc8(data: &[u8]) -> u8 {
    data.iter()
        .fold(0, |crc, &byte| CRC8_TABLE[(crc ^ byte) as usize])
}

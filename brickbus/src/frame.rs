//! Wire framing for the brick daemon protocol.
//!
//! Every frame is an 8-byte header followed by a function-specific payload:
//!
//! ```text
//! offset 0  u32 LE  uid (0 = broadcast)
//! offset 4  u8      total frame length, header included
//! offset 5  u8      function id
//! offset 6  u8      bits 4-7 sequence number (0 = callback), bit 3 response expected
//! offset 7  u8      bits 6-7 error code (responses only)
//! ```

use crate::error::{BusError, Result};

/// Size of the fixed frame header in bytes.
pub const HEADER_LEN: usize = 8;

/// Broadcast request asking the daemon to announce every attached unit.
pub const FUNCTION_ENUMERATE: u8 = 254;

/// Unsolicited callback carrying one unit announcement.
pub const CALLBACK_ENUMERATE: u8 = 253;

/// Parsed frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub uid: u32,
    pub length: u8,
    pub function_id: u8,
    /// Sequence number, 1..=15 for requests/responses, 0 for callbacks.
    pub sequence: u8,
    pub response_expected: bool,
    pub error_code: u8,
}

impl FrameHeader {
    /// Parse a header from its 8-byte wire form.
    pub fn parse(bytes: &[u8; HEADER_LEN]) -> Result<Self> {
        let length = bytes[4];
        if (length as usize) < HEADER_LEN {
            return Err(BusError::Frame(format!(
                "declared length {length} is shorter than the header"
            )));
        }

        Ok(Self {
            uid: u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            length,
            function_id: bytes[5],
            sequence: bytes[6] >> 4,
            response_expected: bytes[6] & 0x08 != 0,
            error_code: bytes[7] >> 6,
        })
    }

    /// Payload length implied by the declared frame length.
    pub fn payload_len(&self) -> usize {
        self.length as usize - HEADER_LEN
    }
}

/// Encode a complete frame.
pub fn encode_frame(
    uid: u32,
    function_id: u8,
    sequence: u8,
    response_expected: bool,
    payload: &[u8],
) -> Vec<u8> {
    let mut frame = Vec::with_capacity(HEADER_LEN + payload.len());
    frame.extend_from_slice(&uid.to_le_bytes());
    frame.push((HEADER_LEN + payload.len()) as u8);
    frame.push(function_id);

    let mut options = (sequence & 0x0F) << 4;
    if response_expected {
        options |= 0x08;
    }
    frame.push(options);
    frame.push(0);
    frame.extend_from_slice(payload);
    frame
}

/// Reasons a unit announcement was emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnumerationType {
    /// Unit was already attached when enumeration was requested.
    Available,
    /// Unit was hot-plugged.
    Connected,
    /// Unit was removed.
    Disconnected,
    /// Reason byte this client does not know about.
    Unknown(u8),
}

impl From<u8> for EnumerationType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Available,
            1 => Self::Connected,
            2 => Self::Disconnected,
            other => Self::Unknown(other),
        }
    }
}

/// One unit announcement from an enumerate callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumerateEvent {
    pub uid: String,
    pub connected_uid: String,
    pub position: char,
    pub hardware_version: [u8; 3],
    pub firmware_version: [u8; 3],
    pub device_identifier: u16,
    pub enumeration_type: EnumerationType,
}

impl EnumerateEvent {
    /// Payload size of an enumerate callback.
    pub const PAYLOAD_LEN: usize = 26;

    /// Parse the payload of an enumerate callback.
    pub fn parse(payload: &[u8]) -> Result<Self> {
        if payload.len() < Self::PAYLOAD_LEN {
            return Err(BusError::Frame(format!(
                "enumerate payload is {} bytes, expected {}",
                payload.len(),
                Self::PAYLOAD_LEN
            )));
        }

        Ok(Self {
            uid: fixed_str(&payload[0..8]),
            connected_uid: fixed_str(&payload[8..16]),
            position: payload[16] as char,
            hardware_version: [payload[17], payload[18], payload[19]],
            firmware_version: [payload[20], payload[21], payload[22]],
            device_identifier: u16::from_le_bytes([payload[23], payload[24]]),
            enumeration_type: EnumerationType::from(payload[25]),
        })
    }
}

/// Decode a NUL-padded fixed-width ASCII field.
fn fixed_str(bytes: &[u8]) -> String {
    bytes
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| b as char)
        .collect()
}

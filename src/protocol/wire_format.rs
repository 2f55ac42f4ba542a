//! Wire format encoding and decoding.
//!
//! Every frame is a 4-byte header, the payload and a trailing checksum:
//! ```text
//! ┌──────────┬──────────┬──────────────┬──────────────────────────────┬──────────┐
//! │ Revision │ Sequence │ Length       │ Payload                      │ Checksum │
//! │ 1 byte   │ 1 byte   │ uint16 BE    │ action│domain│attribute│data │ 1 byte   │
//! └──────────┴──────────┴──────────────┴──────────────────────────────┴──────────┘
//! ```
//!
//! The length counts payload bytes only; the checksum covers everything
//! before it.

use crate::error::{AprilaireError, Result};

/// Header size in bytes (fixed, exactly 4).
pub const HEADER_SIZE: usize = 4;

/// Checksum size in bytes.
pub const CHECKSUM_SIZE: usize = 1;

/// Protocol revision written into every outbound frame.
pub const PROTOCOL_REVISION: u8 = 1;

/// Number of payload bytes taken by the action/domain/attribute triple.
pub const PAYLOAD_PREFIX_SIZE: usize = 3;

/// Maximum payload length representable by the 16-bit length field.
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Sequence numbers wrap modulo this value.
pub const SEQUENCE_MODULUS: u8 = 128;

/// Offset the device adds to the sequence of unsolicited frames.
pub const UNSOLICITED_SEQUENCE_OFFSET: u8 = 127;

/// What a frame asks for or reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Action {
    Write = 1,
    ReadRequest = 2,
    ReadResponse = 3,
    /// Change of state, sent unprompted once subscribed.
    Cos = 5,
    Nack = 6,
}

impl TryFrom<u8> for Action {
    type Error = AprilaireError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Write),
            2 => Ok(Self::ReadRequest),
            3 => Ok(Self::ReadResponse),
            5 => Ok(Self::Cos),
            6 => Ok(Self::Nack),
            other => Err(AprilaireError::Protocol(format!("Unknown action {}", other))),
        }
    }
}

/// Coarse category of device functionality used for addressing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum FunctionalDomain {
    Setup = 1,
    Control = 2,
    Scheduling = 3,
    Alerts = 4,
    Sensors = 5,
    Lockout = 6,
    Status = 7,
    Identification = 8,
    Messaging = 9,
    Display = 10,
    Weather = 13,
    FirmwareUpdate = 14,
    DebugCommands = 15,
    Nack = 16,
}

impl TryFrom<u8> for FunctionalDomain {
    type Error = AprilaireError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Setup),
            2 => Ok(Self::Control),
            3 => Ok(Self::Scheduling),
            4 => Ok(Self::Alerts),
            5 => Ok(Self::Sensors),
            6 => Ok(Self::Lockout),
            7 => Ok(Self::Status),
            8 => Ok(Self::Identification),
            9 => Ok(Self::Messaging),
            10 => Ok(Self::Display),
            13 => Ok(Self::Weather),
            14 => Ok(Self::FirmwareUpdate),
            15 => Ok(Self::DebugCommands),
            16 => Ok(Self::Nack),
            other => Err(AprilaireError::Protocol(format!(
                "Unknown functional domain {}",
                other
            ))),
        }
    }
}

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Protocol revision (always 1 for frames we send).
    pub revision: u8,
    /// Sequence number (0-127 outbound, +127 for unsolicited device frames).
    pub sequence: u8,
    /// Payload length in bytes.
    pub payload_length: u16,
}

impl Header {
    /// Create a new header.
    pub fn new(revision: u8, sequence: u8, payload_length: u16) -> Self {
        Self {
            revision,
            sequence,
            payload_length,
        }
    }

    /// Encode header to bytes.
    ///
    /// The length is split with shift/mask into high then low byte.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let length = self.payload_length as usize;
        [
            self.revision,
            self.sequence,
            ((length >> 8) & 0xFF) as u8,
            (length & 0xFF) as u8,
        ]
    }

    /// Decode header from bytes.
    ///
    /// Returns `None` if buffer is too short.
    ///
    /// # Example
    ///
    /// ```
    /// use aprilaire_client::protocol::Header;
    ///
    /// let header = Header::decode(&[1, 7, 0x01, 0x02]).unwrap();
    /// assert_eq!(header.sequence, 7);
    /// assert_eq!(header.payload_length, 258);
    /// ```
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            revision: buf[0],
            sequence: buf[1],
            payload_length: (u16::from(buf[2]) << 8) | u16::from(buf[3]),
        })
    }

    /// Total size of the frame this header describes, checksum included.
    #[inline]
    pub fn frame_size(&self) -> usize {
        HEADER_SIZE + self.payload_length as usize + CHECKSUM_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_encode_decode_roundtrip() {
        let original = Header::new(PROTOCOL_REVISION, 42, 300);
        let decoded = Header::decode(&original.encode()).unwrap();
        assert_eq!(original, decoded);
    }

    #[test]
    fn test_length_is_big_endian() {
        let bytes = Header::new(1, 0, 0x0102).encode();
        assert_eq!(bytes, [1, 0, 0x01, 0x02]);

        let bytes = Header::new(1, 0, 7).encode();
        assert_eq!(bytes[2], 0);
        assert_eq!(bytes[3], 7);
    }

    #[test]
    fn test_decode_too_short_buffer() {
        assert!(Header::decode(&[1, 2, 3]).is_none());
    }

    #[test]
    fn test_frame_size_includes_checksum() {
        let header = Header::new(1, 0, 3);
        assert_eq!(header.frame_size(), HEADER_SIZE + 3 + CHECKSUM_SIZE);
    }

    #[test]
    fn test_action_from_u8() {
        assert_eq!(Action::try_from(1).unwrap(), Action::Write);
        assert_eq!(Action::try_from(5).unwrap(), Action::Cos);
        assert_eq!(Action::try_from(6).unwrap(), Action::Nack);
        assert!(Action::try_from(4).is_err());
        assert!(Action::try_from(0).is_err());
    }

    #[test]
    fn test_functional_domain_from_u8() {
        assert_eq!(
            FunctionalDomain::try_from(8).unwrap(),
            FunctionalDomain::Identification
        );
        assert_eq!(FunctionalDomain::try_from(13).unwrap(), FunctionalDomain::Weather);
        assert!(FunctionalDomain::try_from(11).is_err());
        assert!(FunctionalDomain::try_from(12).is_err());
        assert!(FunctionalDomain::try_from(0).is_err());
    }

    #[test]
    fn test_enum_discriminants_match_wire_values() {
        assert_eq!(Action::ReadRequest as u8, 2);
        assert_eq!(FunctionalDomain::Sensors as u8, 5);
        assert_eq!(FunctionalDomain::Nack as u8, 16);
    }
}

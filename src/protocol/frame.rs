//! Frame struct with typed accessors, frame building and sequencing.
//!
//! # Example
//!
//! ```
//! use aprilaire_client::protocol::{build_frame, Action, Frame, FunctionalDomain};
//!
//! let bytes = build_frame(1, Action::ReadRequest, FunctionalDomain::Control, 1, &[]).unwrap();
//! assert_eq!(&bytes[..], &[1, 1, 0, 3, 2, 2, 1, 0x46]);
//!
//! let (frame, consumed) = Frame::parse(&bytes).unwrap();
//! assert_eq!(consumed, bytes.len());
//! assert_eq!(frame.functional_domain(), Some(FunctionalDomain::Control));
//! ```

use std::sync::atomic::{AtomicU8, Ordering};

use bytes::{BufMut, Bytes, BytesMut};

use super::checksum::checksum;
use super::wire_format::{
    Action, FunctionalDomain, Header, CHECKSUM_SIZE, HEADER_SIZE, MAX_PAYLOAD_SIZE,
    PAYLOAD_PREFIX_SIZE, PROTOCOL_REVISION, SEQUENCE_MODULUS,
};
use crate::error::{AprilaireError, Result};

/// A complete protocol frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Decoded header.
    pub header: Header,
    /// Payload bytes, starting with the action/domain/attribute triple.
    pub payload: Bytes,
    /// Trailing checksum byte as received.
    pub checksum: u8,
}

impl Frame {
    /// Parse one frame from the front of `buf`.
    ///
    /// Returns the frame and the number of bytes it occupied, or `None` if
    /// `buf` does not yet hold a complete frame.
    pub fn parse(buf: &[u8]) -> Option<(Frame, usize)> {
        let header = Header::decode(buf)?;
        let size = header.frame_size();
        if buf.len() < size {
            return None;
        }

        let payload_end = HEADER_SIZE + header.payload_length as usize;
        let frame = Frame {
            header,
            payload: Bytes::copy_from_slice(&buf[HEADER_SIZE..payload_end]),
            checksum: buf[payload_end],
        };
        Some((frame, size))
    }

    /// Raw action byte, if the payload carries one.
    #[inline]
    pub fn action_byte(&self) -> Option<u8> {
        self.payload.first().copied()
    }

    /// Decoded action, `None` if missing or unknown.
    pub fn action(&self) -> Option<Action> {
        self.action_byte().and_then(|b| Action::try_from(b).ok())
    }

    /// Decoded functional domain, `None` if missing or unknown.
    pub fn functional_domain(&self) -> Option<FunctionalDomain> {
        self.payload
            .get(1)
            .and_then(|&b| FunctionalDomain::try_from(b).ok())
    }

    /// Attribute selector within the functional domain.
    #[inline]
    pub fn attribute(&self) -> Option<u8> {
        self.payload.get(2).copied()
    }

    /// Attribute-specific data following the triple.
    pub fn data(&self) -> &[u8] {
        self.payload.get(PAYLOAD_PREFIX_SIZE..).unwrap_or(&[])
    }

    /// Get the sequence number.
    #[inline]
    pub fn sequence(&self) -> u8 {
        self.header.sequence
    }

    /// Whether the trailing checksum matches header and payload.
    pub fn is_checksum_valid(&self) -> bool {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.payload);
        checksum(&buf) == self.checksum
    }

    /// Serialize the frame back to wire bytes.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.header.frame_size());
        buf.put_slice(&self.header.encode());
        buf.put_slice(&self.payload);
        buf.put_u8(self.checksum);
        buf.freeze()
    }
}

/// Build a complete frame for a command.
///
/// The payload is `[action, domain, attribute] + extra_payload`, prefixed with
/// the header and followed by the checksum of everything before it.
///
/// # Errors
///
/// Returns `InvalidValue` if the payload does not fit the 16-bit length field.
pub fn build_frame(
    sequence: u8,
    action: Action,
    functional_domain: FunctionalDomain,
    attribute: u8,
    extra_payload: &[u8],
) -> Result<Bytes> {
    let payload_length = PAYLOAD_PREFIX_SIZE + extra_payload.len();
    if payload_length > MAX_PAYLOAD_SIZE {
        return Err(AprilaireError::InvalidValue(format!(
            "Payload size {} exceeds maximum {}",
            payload_length, MAX_PAYLOAD_SIZE
        )));
    }

    let header = Header::new(PROTOCOL_REVISION, sequence, payload_length as u16);
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload_length + CHECKSUM_SIZE);
    buf.put_slice(&header.encode());
    buf.put_u8(action as u8);
    buf.put_u8(functional_domain as u8);
    buf.put_u8(attribute);
    buf.put_slice(extra_payload);
    let crc = checksum(&buf);
    buf.put_u8(crc);
    Ok(buf.freeze())
}

/// Monotonic sequence counter wrapping modulo 128.
///
/// Starts at 1, so the 128th number handed out is 0.
#[derive(Debug)]
pub struct Sequencer {
    next: AtomicU8,
}

impl Sequencer {
    /// Create a counter starting at 1.
    pub fn new() -> Self {
        Self {
            next: AtomicU8::new(1),
        }
    }

    /// Take the next sequence number.
    pub fn next(&self) -> u8 {
        match self
            .next
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some((current + 1) % SEQUENCE_MODULUS)
            }) {
            Ok(previous) | Err(previous) => previous,
        }
    }
}

impl Default for Sequencer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_frame_layout() {
        let bytes = build_frame(
            2,
            Action::Write,
            FunctionalDomain::Control,
            1,
            &[5, 0, 0, 0],
        )
        .unwrap();

        assert_eq!(&bytes[..], &[1, 2, 0, 7, 1, 2, 1, 5, 0, 0, 0, 0xBD]);
    }

    #[test]
    fn test_build_frame_empty_extra_payload() {
        let bytes =
            build_frame(1, Action::ReadRequest, FunctionalDomain::Control, 1, &[]).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE + PAYLOAD_PREFIX_SIZE + CHECKSUM_SIZE);
        assert_eq!(bytes[3], 3);
        assert_eq!(bytes[bytes.len() - 1], 0x46);
    }

    #[test]
    fn test_build_frame_long_payload_sets_high_length_byte() {
        let extra = vec![0u8; 300];
        let bytes =
            build_frame(0, Action::Write, FunctionalDomain::Setup, 1, &extra).unwrap();
        assert_eq!(bytes[2], 0x01);
        assert_eq!(bytes[3], 0x2F); // 303 = 0x012F
    }

    #[test]
    fn test_build_frame_payload_too_large() {
        let extra = vec![0u8; MAX_PAYLOAD_SIZE];
        let result = build_frame(0, Action::Write, FunctionalDomain::Setup, 1, &extra);
        assert!(matches!(result, Err(AprilaireError::InvalidValue(_))));
    }

    #[test]
    fn test_parse_roundtrip() {
        let bytes =
            build_frame(9, Action::Cos, FunctionalDomain::Status, 2, &[1]).unwrap();
        let (frame, consumed) = Frame::parse(&bytes).unwrap();

        assert_eq!(consumed, bytes.len());
        assert_eq!(frame.sequence(), 9);
        assert_eq!(frame.action(), Some(Action::Cos));
        assert_eq!(frame.functional_domain(), Some(FunctionalDomain::Status));
        assert_eq!(frame.attribute(), Some(2));
        assert_eq!(frame.data(), &[1]);
        assert!(frame.is_checksum_valid());
        assert_eq!(frame.to_bytes(), bytes);
    }

    #[test]
    fn test_parse_incomplete() {
        let bytes =
            build_frame(9, Action::Cos, FunctionalDomain::Status, 2, &[1]).unwrap();
        assert!(Frame::parse(&bytes[..bytes.len() - 1]).is_none());
        assert!(Frame::parse(&bytes[..2]).is_none());
    }

    #[test]
    fn test_parse_detects_bad_checksum() {
        let mut bytes =
            build_frame(9, Action::Cos, FunctionalDomain::Status, 2, &[1])
                .unwrap()
                .to_vec();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let (frame, _) = Frame::parse(&bytes).unwrap();
        assert!(!frame.is_checksum_valid());
    }

    #[test]
    fn test_accessors_on_short_payload() {
        // Payload of a single byte: no domain, no attribute
        let bytes = [1u8, 0, 0, 1, 3, 0];
        let (frame, _) = Frame::parse(&bytes).unwrap();
        assert_eq!(frame.action(), Some(Action::ReadResponse));
        assert_eq!(frame.functional_domain(), None);
        assert_eq!(frame.attribute(), None);
        assert!(frame.data().is_empty());
    }

    #[test]
    fn test_sequencer_wraps_after_127() {
        let sequencer = Sequencer::new();
        for expected in 1..=127u8 {
            assert_eq!(sequencer.next(), expected);
        }
        assert_eq!(sequencer.next(), 0);
        assert_eq!(sequencer.next(), 1);
    }
}

//! Frame buffer for accumulating partial reads.
//!
//! The thermostat may split one frame across several TCP reads or coalesce
//! several frames into one. Bytes stay in a `bytes::BytesMut` until a whole
//! frame is present and verified:
//! - the revision byte must be `1` and the length must cover the
//!   action/domain/attribute triple
//! - the trailing checksum must match
//!
//! When a candidate fails either check, one byte is dropped and the scan
//! restarts, so stray or misaligned bytes cost at most the frames they
//! overlap. A candidate that is still incomplete is abandoned as soon as a
//! verified frame starts later in the buffer.
//!
//! # Example
//!
//! ```
//! use aprilaire_client::protocol::{build_frame, Action, FrameBuffer, FunctionalDomain};
//!
//! let bytes = build_frame(1, Action::Cos, FunctionalDomain::Status, 2, &[1]).unwrap();
//! let mut buffer = FrameBuffer::new();
//!
//! assert!(buffer.push(&bytes[..3]).is_empty());
//! let frames = buffer.push(&bytes[3..]);
//! assert_eq!(frames.len(), 1);
//! ```

use bytes::BytesMut;
use tracing::debug;

use super::checksum::checksum;
use super::wire_format::{Header, CHECKSUM_SIZE, HEADER_SIZE, PAYLOAD_PREFIX_SIZE, PROTOCOL_REVISION};
use super::Frame;

/// Default initial buffer capacity.
const DEFAULT_CAPACITY: usize = 4 * 1024;

/// Buffer for accumulating incoming bytes and extracting complete frames.
#[derive(Debug)]
pub struct FrameBuffer {
    /// Bytes from socket reads not yet returned as frames.
    buffer: BytesMut,
    /// Bytes dropped while resynchronizing.
    skipped: usize,
}

/// Outcome of examining the candidate frame at one offset.
enum Candidate {
    /// A complete frame of this many bytes with a matching checksum.
    Valid(usize),
    /// Plausible header, body not fully buffered yet.
    Incomplete,
    /// Not a frame start.
    Invalid,
}

impl FrameBuffer {
    /// Create a new frame buffer.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a new frame buffer with a custom initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            skipped: 0,
        }
    }

    /// Push data into the buffer and extract all complete frames, in wire order.
    ///
    /// Partial trailing data is kept for the next push.
    pub fn push(&mut self, data: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        while let Some(frame) = self.try_extract_one() {
            frames.push(frame);
        }
        frames
    }

    fn try_extract_one(&mut self) -> Option<Frame> {
        loop {
            if self.buffer.len() < HEADER_SIZE {
                return None;
            }

            match candidate(&self.buffer) {
                Candidate::Valid(size) => {
                    let bytes = self.buffer.split_to(size).freeze();
                    let header = Header::decode(&bytes)?;
                    return Some(Frame {
                        header,
                        payload: bytes.slice(HEADER_SIZE..size - CHECKSUM_SIZE),
                        checksum: bytes[size - CHECKSUM_SIZE],
                    });
                }
                Candidate::Invalid => self.skip(1),
                Candidate::Incomplete => {
                    let next = (1..self.buffer.len())
                        .find(|&offset| matches!(candidate(&self.buffer[offset..]), Candidate::Valid(_)))?;
                    self.skip(next);
                }
            }
        }
    }

    fn skip(&mut self, count: usize) {
        debug!(count, next = ?self.buffer.get(..count.min(8)), "Skipping bytes to resynchronize");
        let _ = self.buffer.split_to(count);
        self.skipped += count;
    }

    /// Get the number of buffered bytes not yet part of a frame.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Total bytes discarded while looking for a frame boundary.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Clear the buffer.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn candidate(buf: &[u8]) -> Candidate {
    let Some(header) = Header::decode(buf) else {
        return Candidate::Incomplete;
    };
    if header.revision != PROTOCOL_REVISION || (header.payload_length as usize) < PAYLOAD_PREFIX_SIZE {
        return Candidate::Invalid;
    }

    let size = header.frame_size();
    if buf.len() < size {
        return Candidate::Incomplete;
    }
    if checksum(&buf[..size - CHECKSUM_SIZE]) != buf[size - CHECKSUM_SIZE] {
        return Candidate::Invalid;
    }
    Candidate::Valid(size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{build_frame, Action, FunctionalDomain};

    fn make_frame_bytes(sequence: u8, attribute: u8, data: &[u8]) -> Vec<u8> {
        build_frame(sequence, Action::Cos, FunctionalDomain::Status, attribute, data)
            .unwrap()
            .to_vec()
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();
        let frames = buffer.push(&make_frame_bytes(3, 2, &[1]));

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].sequence(), 3);
        assert_eq!(frames[0].data(), &[1]);
        assert!(frames[0].is_checksum_valid());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_one_push() {
        let mut buffer = FrameBuffer::new();

        let mut combined = make_frame_bytes(1, 2, &[1]);
        combined.extend(make_frame_bytes(2, 6, &[2, 0, 0, 1]));
        combined.extend(make_frame_bytes(3, 8, &[0]));

        let frames = buffer.push(&combined);

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].attribute(), Some(2));
        assert_eq!(frames[1].attribute(), Some(6));
        assert_eq!(frames[2].attribute(), Some(8));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_header() {
        let mut buffer = FrameBuffer::new();
        let bytes = make_frame_bytes(1, 2, &[1]);

        assert!(buffer.push(&bytes[..2]).is_empty());
        assert_eq!(buffer.len(), 2);

        let frames = buffer.push(&bytes[2..]);
        assert_eq!(frames.len(), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_fragmented_body_waits_for_checksum() {
        let mut buffer = FrameBuffer::new();
        let bytes = make_frame_bytes(1, 6, &[2, 0, 0, 1]);

        // Everything but the checksum
        assert!(buffer.push(&bytes[..bytes.len() - 1]).is_empty());
        assert_eq!(buffer.len(), bytes.len() - 1);

        let frames = buffer.push(&bytes[bytes.len() - 1..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data(), &[2, 0, 0, 1]);
        assert_eq!(buffer.skipped(), 0);
    }

    #[test]
    fn test_mixed_complete_and_partial() {
        let mut buffer = FrameBuffer::new();

        let frame1 = make_frame_bytes(1, 2, &[1]);
        let frame2 = make_frame_bytes(2, 7, &[2, 2, 2, 2]);

        let mut data = frame1.clone();
        data.extend_from_slice(&frame2[..5]);

        let frames = buffer.push(&data);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].sequence(), 1);
        assert_eq!(buffer.len(), 5);

        let frames = buffer.push(&frame2[5..]);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].sequence(), 2);
    }

    #[test]
    fn test_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let bytes = make_frame_bytes(4, 2, &[1]);

        let mut all_frames = Vec::new();
        for byte in &bytes {
            all_frames.extend(buffer.push(&[*byte]));
        }

        assert_eq!(all_frames.len(), 1);
        assert_eq!(all_frames[0].sequence(), 4);
    }

    #[test]
    fn test_stray_byte_does_not_stall_stream() {
        let mut buffer = FrameBuffer::new();
        let mut data = vec![0x00];
        for sequence in 0..20 {
            data.extend(make_frame_bytes(sequence, 2, &[1]));
        }

        let frames = buffer.push(&data);
        assert_eq!(frames.len(), 20);
        assert_eq!(buffer.skipped(), 1);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_bogus_length_abandoned_for_later_frame() {
        let mut buffer = FrameBuffer::new();
        // Looks like a header announcing a 65535 byte payload
        assert!(buffer.push(&[1, 9, 0xFF, 0xFF]).is_empty());

        let frames = buffer.push(&make_frame_bytes(5, 2, &[1]));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].sequence(), 5);
        assert_eq!(buffer.skipped(), 4);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_corrupt_frame_is_skipped() {
        let mut buffer = FrameBuffer::new();
        let mut corrupt = make_frame_bytes(2, 6, &[2, 0, 0, 3]);
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0xFF;

        let mut data = make_frame_bytes(1, 2, &[1]);
        data.extend(&corrupt);
        data.extend(make_frame_bytes(3, 8, &[0]));

        let frames = buffer.push(&data);
        let sequences: Vec<u8> = frames.iter().map(Frame::sequence).collect();
        assert_eq!(sequences, vec![1, 3]);
        assert_eq!(buffer.skipped(), corrupt.len());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_clear_drops_partial_frame() {
        let mut buffer = FrameBuffer::new();
        let bytes = make_frame_bytes(1, 2, &[1]);

        buffer.push(&bytes[..HEADER_SIZE + 1]);
        assert!(!buffer.is_empty());

        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.push(&make_frame_bytes(2, 2, &[1])).len(), 1);
    }
}

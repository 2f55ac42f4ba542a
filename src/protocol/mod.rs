//! Protocol module - wire format, checksum, framing and frame types.
//!
//! This module implements the binary framing used by the thermostat:
//! - 4-byte header encoding/decoding
//! - CRC-8 checksum
//! - Frame buffer for accumulating partial reads
//! - Frame struct with typed accessors and a wrapping sequence counter

mod checksum;
mod frame;
mod frame_buffer;
mod wire_format;

pub use checksum::checksum;
pub use frame::{build_frame, Frame, Sequencer};
pub use frame_buffer::FrameBuffer;
pub use wire_format::{
    Action, FunctionalDomain, Header, CHECKSUM_SIZE, HEADER_SIZE, MAX_PAYLOAD_SIZE,
    PAYLOAD_PREFIX_SIZE, PROTOCOL_REVISION, SEQUENCE_MODULUS, UNSOLICITED_SEQUENCE_OFFSET,
};

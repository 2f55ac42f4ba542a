//! Codec module - payload decoding and scalar value encodings.
//!
//! - [`attributes`] - typed [`Attribute`] keys and the positional layout table
//! - [`values`] - temperature, humidity and MAC address helpers
//! - [`record`] - [`DecodedRecord`] and the [`decode`] entry point
//!
//! Encoding a command is a single call to
//! [`build_frame`](crate::protocol::build_frame); everything the device sends
//! back comes through [`decode`] or [`decode_frame`].
//!
//! # Example
//!
//! ```
//! use aprilaire_client::codec::{decode, encode_temperature, Attribute, AttributeValue};
//! use aprilaire_client::protocol::{build_frame, Action, FunctionalDomain};
//!
//! let heat = encode_temperature(21.0).unwrap();
//! let cool = encode_temperature(24.5).unwrap();
//! let bytes = build_frame(5, Action::Cos, FunctionalDomain::Control, 1, &[1, 2, heat, cool]).unwrap();
//!
//! let record = decode(&bytes).remove(0);
//! assert_eq!(record.get(Attribute::CoolSetpoint), Some(&AttributeValue::Temperature(24.5)));
//! ```

pub mod attributes;
pub mod record;
pub mod values;

pub use attributes::{layout, Attribute, Slot, ValueType};
pub use record::{decode, decode_frame, AttributeValue, DecodedRecord, Event};
pub use values::{
    decode_humidity, decode_temperature, encode_temperature, format_mac_address,
    MAX_TEMPERATURE_MAGNITUDE,
};

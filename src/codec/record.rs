//! Decoded records and the frame decoder.
//!
//! # Example
//!
//! ```
//! use aprilaire_client::codec::{decode, Attribute, AttributeValue};
//! use aprilaire_client::protocol::{build_frame, Action, FunctionalDomain};
//!
//! let mut buf = build_frame(1, Action::Cos, FunctionalDomain::Status, 2, &[1]).unwrap().to_vec();
//! buf.extend_from_slice(&build_frame(2, Action::Cos, FunctionalDomain::Status, 8, &[0]).unwrap());
//!
//! let records = decode(&buf);
//! assert_eq!(records.len(), 2);
//! assert_eq!(records[0].get(Attribute::Synced), Some(&AttributeValue::Integer(1)));
//! ```

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use super::attributes::{layout, Attribute, Slot, ValueType};
use super::values::{decode_humidity, decode_temperature, format_mac_address};
use crate::protocol::{Action, Frame, FunctionalDomain};

/// A single decoded value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Integer(u8),
    Temperature(f32),
    Humidity(u8),
    MacAddress(String),
    /// Synthetic connection flags.
    Flag(bool),
    /// A humidity sensor with no reading. Serializes as `null`.
    Unavailable,
}

impl AttributeValue {
    /// Integer-like view (`Integer` or `Humidity`).
    pub fn as_integer(&self) -> Option<u8> {
        match self {
            AttributeValue::Integer(v) | AttributeValue::Humidity(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_temperature(&self) -> Option<f32> {
        match self {
            AttributeValue::Temperature(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            AttributeValue::Flag(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttributeValue::MacAddress(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Integer(v) | AttributeValue::Humidity(v) => write!(f, "{}", v),
            AttributeValue::Temperature(v) => write!(f, "{}", v),
            AttributeValue::MacAddress(v) => f.write_str(v),
            AttributeValue::Flag(v) => write!(f, "{}", v),
            AttributeValue::Unavailable => f.write_str("unavailable"),
        }
    }
}

/// The `(action, functional domain, attribute)` triple that produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Event {
    pub action: Action,
    pub functional_domain: FunctionalDomain,
    pub attribute: u8,
}

/// One frame's worth of decoded attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    pub event: Event,
    pub revision: u8,
    pub sequence: u8,
    pub values: BTreeMap<Attribute, AttributeValue>,
}

impl DecodedRecord {
    /// Look up one decoded attribute.
    pub fn get(&self, attribute: Attribute) -> Option<&AttributeValue> {
        self.values.get(&attribute)
    }

    /// Device-reported error code, only when nonzero.
    pub fn error(&self) -> Option<u8> {
        self.get(Attribute::Error)
            .and_then(AttributeValue::as_integer)
            .filter(|code| *code != 0)
    }

    /// Correlation key of the record.
    pub fn key(&self) -> (FunctionalDomain, u8) {
        (self.event.functional_domain, self.event.attribute)
    }
}

/// Decode every complete frame in `buf`, in wire order.
///
/// Frames the client does not model are skipped. A trailing frame whose
/// declared length runs past the end of `buf` is dropped and ends decoding.
pub fn decode(buf: &[u8]) -> Vec<DecodedRecord> {
    let mut records = Vec::new();
    let mut offset = 0;

    while offset < buf.len() {
        let Some((frame, size)) = Frame::parse(&buf[offset..]) else {
            debug!(
                remaining = buf.len() - offset,
                "Dropping truncated trailing frame"
            );
            break;
        };
        if let Some(record) = decode_frame(&frame) {
            records.push(record);
        }
        offset += size;
    }

    records
}

/// Decode a single frame, `None` if it is unrecognized or malformed.
pub fn decode_frame(frame: &Frame) -> Option<DecodedRecord> {
    let (Some(action), Some(functional_domain), Some(attribute)) =
        (frame.action(), frame.functional_domain(), frame.attribute())
    else {
        debug!(payload = ?hex(&frame.payload), "Unrecognized frame header");
        return None;
    };

    let Some(slots) = layout(action, functional_domain, attribute) else {
        debug!(
            ?action,
            ?functional_domain,
            attribute,
            data = ?hex(frame.data()),
            "Ignoring unmodeled frame"
        );
        return None;
    };

    let data = frame.data();
    let mut values = BTreeMap::new();
    let mut position = 0;

    for slot in slots {
        match *slot {
            Slot::Skip(count) => position += count,
            Slot::Field(name, value_type) => {
                let end = position + value_type.width();
                let Some(bytes) = data.get(position..end) else {
                    debug!(
                        ?functional_domain,
                        attribute,
                        field = %name,
                        len = data.len(),
                        "Frame too short for its layout"
                    );
                    return None;
                };
                if let Some(value) = decode_value(value_type, bytes) {
                    values.insert(name, value);
                }
                position = end;
            }
        }
    }

    Some(DecodedRecord {
        event: Event {
            action,
            functional_domain,
            attribute,
        },
        revision: frame.header.revision,
        sequence: frame.sequence(),
        values,
    })
}

fn decode_value(value_type: ValueType, bytes: &[u8]) -> Option<AttributeValue> {
    let raw = bytes[0];
    match value_type {
        ValueType::Integer => Some(AttributeValue::Integer(raw)),
        ValueType::IntegerRequired => (raw != 0).then_some(AttributeValue::Integer(raw)),
        ValueType::Temperature => Some(AttributeValue::Temperature(decode_temperature(raw))),
        ValueType::TemperatureRequired => {
            (raw != 0).then(|| AttributeValue::Temperature(decode_temperature(raw)))
        }
        ValueType::Humidity => Some(
            decode_humidity(raw)
                .map(AttributeValue::Humidity)
                .unwrap_or(AttributeValue::Unavailable),
        ),
        ValueType::MacAddress => Some(AttributeValue::MacAddress(format_mac_address(bytes))),
    }
}

pub(crate) fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

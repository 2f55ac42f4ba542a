//! Scalar value encodings used inside payloads.
//!
//! Temperatures use one byte:
//! ```text
//! bit 7    bit 6      bits 0-5
//! sign     +0.5       whole degrees (0-63)
//! ```
//! Humidity is a plain percentage where 0 and anything >= 100 mean the
//! sensor has no reading.

use crate::error::{AprilaireError, Result};

const MAGNITUDE_MASK: u8 = 0b0011_1111;
const HALF_DEGREE_FLAG: u8 = 0b0100_0000;
const NEGATIVE_FLAG: u8 = 0b1000_0000;

/// Largest magnitude a temperature byte can carry.
pub const MAX_TEMPERATURE_MAGNITUDE: f32 = 63.5;

/// Encode a temperature for sending to the thermostat.
///
/// The sign comes from the input and the magnitude is truncated to the half
/// degree at or below it, so `21.7` encodes as `21.5` and `-2.7` as `-2.5`.
///
/// # Errors
///
/// Returns `InvalidValue` for non-finite inputs or magnitudes above 63.5.
///
/// # Example
///
/// ```
/// use aprilaire_client::codec::{decode_temperature, encode_temperature};
///
/// assert_eq!(encode_temperature(20.5).unwrap(), 0x54);
/// assert_eq!(decode_temperature(encode_temperature(-7.5).unwrap()), -7.5);
/// ```
pub fn encode_temperature(temperature: f32) -> Result<u8> {
    if !temperature.is_finite() || temperature.abs() > MAX_TEMPERATURE_MAGNITUDE {
        return Err(AprilaireError::InvalidValue(format!(
            "Temperature {} outside ±{}",
            temperature, MAX_TEMPERATURE_MAGNITUDE
        )));
    }

    let magnitude = temperature.abs();
    let whole = magnitude.floor();
    let mut raw = whole as u8;
    if magnitude - whole >= 0.5 {
        raw |= HALF_DEGREE_FLAG;
    }
    if temperature < 0.0 {
        raw |= NEGATIVE_FLAG;
    }
    Ok(raw)
}

/// Decode a temperature byte from the thermostat.
pub fn decode_temperature(raw: u8) -> f32 {
    let mut temperature = f32::from(raw & MAGNITUDE_MASK);
    if raw & HALF_DEGREE_FLAG != 0 {
        temperature += 0.5;
    }
    if raw & NEGATIVE_FLAG != 0 {
        temperature = -temperature;
    }
    temperature
}

/// Decode a humidity byte, `None` when the sensor reports no reading.
pub fn decode_humidity(raw: u8) -> Option<u8> {
    match raw {
        0 | 100..=u8::MAX => None,
        value => Some(value),
    }
}

/// Format six bytes as a colon separated MAC address.
///
/// Octets are lowercase hex without zero padding, the way the thermostat's
/// identity is keyed elsewhere (`1:2:3:4:5:6`, `a0:b:c1:...`).
pub fn format_mac_address(octets: &[u8]) -> String {
    octets
        .iter()
        .map(|octet| format!("{:x}", octet))
        .collect::<Vec<_>>()
        .join(":")
}

//! Device identity derived from identification records.

use serde::Serialize;

use crate::codec::Attribute;
use crate::state::ThermostatState;

/// Name and manufacturer reported for every thermostat.
pub const MANUFACTURER: &str = "Aprilaire";

/// Human-readable model name for a model number.
pub fn model_name(model_number: u8) -> String {
    let name = match model_number {
        0 => "8476W",
        1 => "8810",
        2 => "8620W",
        3 => "8820",
        4 => "8910W",
        5 => "8830",
        6 => "8920W",
        7 => "8840",
        other => return format!("Unknown ({})", other),
    };
    name.to_string()
}

/// Hardware version from the revision byte.
///
/// Revisions above `'A'` are letters (`Rev. C`), anything else is shown as
/// the raw number.
pub fn hardware_version(hardware_revision: Option<u8>) -> String {
    match hardware_revision {
        Some(revision) if revision > b'A' => format!("Rev. {}", revision as char),
        Some(revision) => revision.to_string(),
        None => "Unknown".to_string(),
    }
}

/// Firmware version as `major.minor`, minor zero-padded to two digits.
pub fn firmware_version(major: Option<u8>, minor: Option<u8>) -> Option<String> {
    match (major, minor) {
        (Some(major), Some(minor)) => Some(format!("{}.{:02}", major, minor)),
        (Some(major), None) => Some(major.to_string()),
        (None, _) => None,
    }
}

/// Identity of the connected thermostat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// Unique identifier of the device.
    pub mac_address: String,
    pub manufacturer: String,
    pub model: Option<String>,
    pub hw_version: String,
    pub sw_version: Option<String>,
}

impl DeviceInfo {
    /// Derive device info, `None` until the MAC address is known.
    pub fn from_state(state: &ThermostatState) -> Option<Self> {
        let mac_address = state.mac_address()?.to_string();

        Some(Self {
            mac_address,
            manufacturer: MANUFACTURER.to_string(),
            model: state.integer(Attribute::ModelNumber).map(model_name),
            hw_version: hardware_version(state.integer(Attribute::HardwareRevision)),
            sw_version: firmware_version(
                state.integer(Attribute::FirmwareMajorRevision),
                state.integer(Attribute::FirmwareMinorRevision),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::AttributeValue;
    use std::collections::BTreeMap;

    #[test]
    fn test_model_names() {
        assert_eq!(model_name(0), "8476W");
        assert_eq!(model_name(7), "8840");
        assert_eq!(model_name(42), "Unknown (42)");
    }

    #[test]
    fn test_hardware_version() {
        assert_eq!(hardware_version(Some(b'C')), "Rev. C");
        assert_eq!(hardware_version(Some(b'A')), "65");
        assert_eq!(hardware_version(Some(3)), "3");
        assert_eq!(hardware_version(None), "Unknown");
    }

    #[test]
    fn test_firmware_version() {
        assert_eq!(firmware_version(Some(1), Some(5)), Some("1.05".to_string()));
        assert_eq!(firmware_version(Some(2), Some(12)), Some("2.12".to_string()));
        assert_eq!(firmware_version(Some(2), None), Some("2".to_string()));
        assert_eq!(firmware_version(None, Some(3)), None);
    }

    #[test]
    fn test_from_state_requires_mac() {
        let mut state = ThermostatState::new();
        assert!(DeviceInfo::from_state(&state).is_none());

        state.merge(&BTreeMap::from([
            (
                Attribute::MacAddress,
                AttributeValue::MacAddress("1:2:3:4:5:6".to_string()),
            ),
            (Attribute::ModelNumber, AttributeValue::Integer(4)),
            (Attribute::HardwareRevision, AttributeValue::Integer(b'B')),
            (Attribute::FirmwareMajorRevision, AttributeValue::Integer(1)),
            (Attribute::FirmwareMinorRevision, AttributeValue::Integer(7)),
        ]));

        let info = DeviceInfo::from_state(&state).unwrap();
        assert_eq!(info.mac_address, "1:2:3:4:5:6");
        assert_eq!(info.manufacturer, "Aprilaire");
        assert_eq!(info.model.as_deref(), Some("8910W"));
        assert_eq!(info.hw_version, "Rev. B");
        assert_eq!(info.sw_version.as_deref(), Some("1.07"));
    }
}

//! Attribute keys and the payload layout table.
//!
//! Each `(functional domain, attribute)` pair the client understands has a
//! positional layout describing the bytes after the action/domain/attribute
//! triple. Layouts are shared by WRITE, READ_RESPONSE and COS frames.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::protocol::{Action, FunctionalDomain};

macro_rules! attributes {
    ($($(#[$meta:meta])* $variant:ident => $name:literal,)+) => {
        /// Typed key of the thermostat state map.
        ///
        /// Names match the snake_case identifiers used on the device side.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Attribute {
            $($(#[$meta])* $variant,)+
        }

        impl Attribute {
            /// Every known attribute, in declaration order.
            pub const ALL: &'static [Attribute] = &[$(Attribute::$variant,)+];

            /// Wire-side name of the attribute.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Attribute::$variant => $name,)+
                }
            }

            /// Look an attribute up by name.
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Attribute::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

attributes! {
    AwayAvailable => "away_available",
    Mode => "mode",
    FanMode => "fan_mode",
    HeatSetpoint => "heat_setpoint",
    CoolSetpoint => "cool_setpoint",
    FreshAirMode => "fresh_air_mode",
    FreshAirEvent => "fresh_air_event",
    DehumidificationSetpoint => "dehumidification_setpoint",
    AirCleaningMode => "air_cleaning_mode",
    AirCleaningEvent => "air_cleaning_event",
    HumidificationSetpoint => "humidification_setpoint",
    ThermostatModes => "thermostat_modes",
    AirCleaningAvailable => "air_cleaning_available",
    VentilationAvailable => "ventilation_available",
    DehumidificationAvailable => "dehumidification_available",
    HumidificationAvailable => "humidification_available",
    Hold => "hold",
    BuiltInTemperatureSensorStatus => "built_in_temperature_sensor_status",
    BuiltInTemperatureSensorValue => "built_in_temperature_sensor_value",
    WiredRemoteTemperatureSensorStatus => "wired_remote_temperature_sensor_status",
    WiredRemoteTemperatureSensorValue => "wired_remote_temperature_sensor_value",
    WiredOutdoorTemperatureSensorStatus => "wired_outdoor_temperature_sensor_status",
    WiredOutdoorTemperatureSensorValue => "wired_outdoor_temperature_sensor_value",
    BuiltInHumiditySensorStatus => "built_in_humidity_sensor_status",
    BuiltInHumiditySensorValue => "built_in_humidity_sensor_value",
    RatSensorStatus => "rat_sensor_status",
    RatSensorValue => "rat_sensor_value",
    LatSensorStatus => "lat_sensor_status",
    LatSensorValue => "lat_sensor_value",
    WirelessOutdoorTemperatureSensorStatus => "wireless_outdoor_temperature_sensor_status",
    WirelessOutdoorTemperatureSensorValue => "wireless_outdoor_temperature_sensor_value",
    WirelessOutdoorHumiditySensorStatus => "wireless_outdoor_humidity_sensor_status",
    WirelessOutdoorHumiditySensorValue => "wireless_outdoor_humidity_sensor_value",
    IndoorTemperatureControllingSensorStatus => "indoor_temperature_controlling_sensor_status",
    IndoorTemperatureControllingSensorValue => "indoor_temperature_controlling_sensor_value",
    OutdoorTemperatureControllingSensorStatus => "outdoor_temperature_controlling_sensor_status",
    OutdoorTemperatureControllingSensorValue => "outdoor_temperature_controlling_sensor_value",
    IndoorHumidityControllingSensorStatus => "indoor_humidity_controlling_sensor_status",
    IndoorHumidityControllingSensorValue => "indoor_humidity_controlling_sensor_value",
    OutdoorHumidityControllingSensorStatus => "outdoor_humidity_controlling_sensor_status",
    OutdoorHumidityControllingSensorValue => "outdoor_humidity_controlling_sensor_value",
    Synced => "synced",
    HeatingEquipmentStatus => "heating_equipment_status",
    CoolingEquipmentStatus => "cooling_equipment_status",
    ProgressiveRecovery => "progressive_recovery",
    FanStatus => "fan_status",
    DehumidificationStatus => "dehumidification_status",
    HumidificationStatus => "humidification_status",
    VentilationStatus => "ventilation_status",
    AirCleaningStatus => "air_cleaning_status",
    /// Device-reported error code (STATUS/8).
    Error => "error",
    HardwareRevision => "hardware_revision",
    FirmwareMajorRevision => "firmware_major_revision",
    FirmwareMinorRevision => "firmware_minor_revision",
    ProtocolMajorRevision => "protocol_major_revision",
    ModelNumber => "model_number",
    GainspanFirmwareMajorRevision => "gainspan_firmware_major_revision",
    GainspanFirmwareMinorRevision => "gainspan_firmware_minor_revision",
    MacAddress => "mac_address",
    /// Synthetic: a live connection exists.
    Connected => "connected",
    /// Synthetic: the client was stopped.
    Stopped => "stopped",
    /// Synthetic: a reconnect is in progress.
    Reconnecting => "reconnecting",
    /// Synthetic: the device is answering on the current connection.
    Available => "available",
}

impl Attribute {
    /// Whether the attribute is produced by the client rather than decoded.
    pub fn is_synthetic(&self) -> bool {
        matches!(
            self,
            Attribute::Connected | Attribute::Stopped | Attribute::Reconnecting | Attribute::Available
        )
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Attribute {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// How a payload byte (or run of bytes) is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Integer,
    /// Zero means "unset" and the field is left out of the record.
    IntegerRequired,
    Temperature,
    /// Zero means "unset" and the field is left out of the record.
    TemperatureRequired,
    Humidity,
    /// Consumes six consecutive bytes.
    MacAddress,
}

impl ValueType {
    /// Number of payload bytes consumed.
    pub fn width(&self) -> usize {
        match self {
            ValueType::MacAddress => 6,
            _ => 1,
        }
    }
}

/// One positional entry of a payload layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// Reserved bytes that are skipped.
    Skip(usize),
    /// A named field.
    Field(Attribute, ValueType),
}

use Attribute as A;
use Slot::{Field, Skip};
use ValueType as V;

const SETUP_1: &[Slot] = &[Skip(26), Field(A::AwayAvailable, V::Integer), Skip(17)];

const CONTROL_1: &[Slot] = &[
    Field(A::Mode, V::IntegerRequired),
    Field(A::FanMode, V::IntegerRequired),
    Field(A::HeatSetpoint, V::TemperatureRequired),
    Field(A::CoolSetpoint, V::TemperatureRequired),
];

const CONTROL_3: &[Slot] = &[
    Field(A::FreshAirMode, V::Integer),
    Field(A::FreshAirEvent, V::Integer),
];

const CONTROL_4: &[Slot] = &[Field(A::DehumidificationSetpoint, V::Integer)];

const CONTROL_5: &[Slot] = &[
    Field(A::AirCleaningMode, V::Integer),
    Field(A::AirCleaningEvent, V::Integer),
];

const CONTROL_6: &[Slot] = &[Field(A::HumidificationSetpoint, V::Integer)];

const CONTROL_7: &[Slot] = &[
    Field(A::ThermostatModes, V::Integer),
    Field(A::AirCleaningAvailable, V::Integer),
    Field(A::VentilationAvailable, V::Integer),
    Field(A::DehumidificationAvailable, V::Integer),
    Field(A::HumidificationAvailable, V::Integer),
];

const SCHEDULING_4: &[Slot] = &[Field(A::Hold, V::Integer), Skip(9)];

const SENSORS_1: &[Slot] = &[
    Field(A::BuiltInTemperatureSensorStatus, V::Integer),
    Field(A::BuiltInTemperatureSensorValue, V::Temperature),
    Field(A::WiredRemoteTemperatureSensorStatus, V::Integer),
    Field(A::WiredRemoteTemperatureSensorValue, V::Temperature),
    Field(A::WiredOutdoorTemperatureSensorStatus, V::Integer),
    Field(A::WiredOutdoorTemperatureSensorValue, V::Temperature),
    Field(A::BuiltInHumiditySensorStatus, V::Integer),
    Field(A::BuiltInHumiditySensorValue, V::Humidity),
    Field(A::RatSensorStatus, V::Integer),
    Field(A::RatSensorValue, V::Temperature),
    Field(A::LatSensorStatus, V::Integer),
    Field(A::LatSensorValue, V::Temperature),
    Field(A::WirelessOutdoorTemperatureSensorStatus, V::Integer),
    Field(A::WirelessOutdoorTemperatureSensorValue, V::Temperature),
    Field(A::WirelessOutdoorHumiditySensorStatus, V::Integer),
    Field(A::WirelessOutdoorHumiditySensorValue, V::Humidity),
];

const SENSORS_2: &[Slot] = &[
    Field(A::IndoorTemperatureControllingSensorStatus, V::Integer),
    Field(A::IndoorTemperatureControllingSensorValue, V::Temperature),
    Field(A::OutdoorTemperatureControllingSensorStatus, V::Integer),
    Field(A::OutdoorTemperatureControllingSensorValue, V::Temperature),
    Field(A::IndoorHumidityControllingSensorStatus, V::Integer),
    Field(A::IndoorHumidityControllingSensorValue, V::Humidity),
    Field(A::OutdoorHumidityControllingSensorStatus, V::Integer),
    Field(A::OutdoorHumidityControllingSensorValue, V::Humidity),
];

const STATUS_2: &[Slot] = &[Field(A::Synced, V::Integer)];

const STATUS_6: &[Slot] = &[
    Field(A::HeatingEquipmentStatus, V::Integer),
    Field(A::CoolingEquipmentStatus, V::Integer),
    Field(A::ProgressiveRecovery, V::Integer),
    Field(A::FanStatus, V::Integer),
];

const STATUS_7: &[Slot] = &[
    Field(A::DehumidificationStatus, V::Integer),
    Field(A::HumidificationStatus, V::Integer),
    Field(A::VentilationStatus, V::Integer),
    Field(A::AirCleaningStatus, V::Integer),
];

const STATUS_8: &[Slot] = &[Field(A::Error, V::Integer)];

const IDENTIFICATION_1: &[Slot] = &[
    Field(A::HardwareRevision, V::Integer),
    Field(A::FirmwareMajorRevision, V::Integer),
    Field(A::FirmwareMinorRevision, V::Integer),
    Field(A::ProtocolMajorRevision, V::Integer),
    Field(A::ModelNumber, V::Integer),
    Field(A::GainspanFirmwareMajorRevision, V::Integer),
    Field(A::GainspanFirmwareMinorRevision, V::Integer),
];

const IDENTIFICATION_2: &[Slot] = &[Field(A::MacAddress, V::MacAddress)];

/// Look up the payload layout for a decoded frame triple.
///
/// Returns `None` for anything the client does not model, including every
/// READ_REQUEST and NACK frame.
pub fn layout(
    action: Action,
    functional_domain: FunctionalDomain,
    attribute: u8,
) -> Option<&'static [Slot]> {
    if !matches!(action, Action::Write | Action::ReadResponse | Action::Cos) {
        return None;
    }

    use FunctionalDomain as D;
    match (functional_domain, attribute) {
        (D::Setup, 1) => Some(SETUP_1),
        (D::Control, 1) => Some(CONTROL_1),
        (D::Control, 3) => Some(CONTROL_3),
        (D::Control, 4) => Some(CONTROL_4),
        (D::Control, 5) => Some(CONTROL_5),
        (D::Control, 6) => Some(CONTROL_6),
        (D::Control, 7) => Some(CONTROL_7),
        (D::Scheduling, 4) => Some(SCHEDULING_4),
        (D::Sensors, 1) => Some(SENSORS_1),
        (D::Sensors, 2) => Some(SENSORS_2),
        (D::Status, 2) => Some(STATUS_2),
        (D::Status, 6) => Some(STATUS_6),
        (D::Status, 7) => Some(STATUS_7),
        (D::Status, 8) => Some(STATUS_8),
        (D::Identification, 1) => Some(IDENTIFICATION_1),
        (D::Identification, 2) => Some(IDENTIFICATION_2),
        _ => None,
    }
}

/// Number of data bytes a layout spans.
pub fn layout_width(slots: &[Slot]) -> usize {
    slots
        .iter()
        .map(|slot| match slot {
            Slot::Skip(n) => *n,
            Slot::Field(_, value_type) => value_type.width(),
        })
        .sum()
}

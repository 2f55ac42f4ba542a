//! Typed thermostat commands.
//!
//! A [`Command`] knows its `(action, domain, attribute)` target and its data
//! bytes. [`Command::encode`] turns it into a complete frame.
//!
//! # Example
//!
//! ```
//! use aprilaire_client::command::Command;
//!
//! let frame = Command::UpdateMode(5).encode(2).unwrap();
//! assert_eq!(&frame[..], &[1, 2, 0, 7, 1, 2, 1, 5, 0, 0, 0, 0xBD]);
//! ```

use bytes::Bytes;

use crate::codec::encode_temperature;
use crate::error::Result;
use crate::protocol::{build_frame, Action, FunctionalDomain};

/// Data bytes of the SCHEDULING/4 hold write.
const HOLD_PAYLOAD_SIZE: usize = 10;

/// Change-of-state subscriptions written to STATUS/1 during bring-up.
pub const COS_SUBSCRIPTIONS: [u8; 29] = [
    1, 0, 0, 0, 0, 1, 1, 1, 1, 1, 1, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1, 0, 1, 0, 1, 1, 1, 0, 0,
];

/// A command the client can send to the thermostat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// Read the controlling sensors (SENSORS/2).
    ReadSensors,
    /// Read mode, fan mode and setpoints (CONTROL/1).
    ReadControl,
    /// Read the hold state (SCHEDULING/4).
    ReadScheduling,
    ReadMacAddress,
    ReadRevisionAndModel,
    /// Read which IAQ equipment is installed (CONTROL/7).
    ReadThermostatIaqAvailable,
    /// Read heating, cooling and fan equipment status (STATUS/6).
    ReadThermostatStatus,
    /// Read dehumidification, humidification, ventilation and air cleaning status (STATUS/7).
    ReadIaqStatus,
    UpdateMode(u8),
    UpdateFanMode(u8),
    /// Write both setpoints, in degrees on the half-degree grid.
    UpdateSetpoint { cool: f32, heat: f32 },
    SetHold(u8),
    SetDehumidificationSetpoint(u8),
    SetHumidificationSetpoint(u8),
    SetAirCleaning { mode: u8, event: u8 },
    SetFreshAir { mode: u8, event: u8 },
    /// Subscribe to change-of-state frames.
    ConfigureCos,
    /// Ask the device to push its current state.
    Sync,
}

impl Command {
    /// Requests written on every new connection, in order.
    pub const BRING_UP: [Command; 8] = [
        Command::ReadMacAddress,
        Command::ReadRevisionAndModel,
        Command::ReadThermostatIaqAvailable,
        Command::ReadControl,
        Command::ReadSensors,
        Command::ReadScheduling,
        Command::ConfigureCos,
        Command::Sync,
    ];

    /// `(action, functional domain, attribute)` the command addresses.
    pub fn target(&self) -> (Action, FunctionalDomain, u8) {
        use Action::{ReadRequest, Write};
        use FunctionalDomain as D;

        match self {
            Command::ReadSensors => (ReadRequest, D::Sensors, 2),
            Command::ReadControl => (ReadRequest, D::Control, 1),
            Command::ReadScheduling => (ReadRequest, D::Scheduling, 4),
            Command::ReadMacAddress => (ReadRequest, D::Identification, 2),
            Command::ReadRevisionAndModel => (ReadRequest, D::Identification, 1),
            Command::ReadThermostatIaqAvailable => (ReadRequest, D::Control, 7),
            Command::ReadThermostatStatus => (ReadRequest, D::Status, 6),
            Command::ReadIaqStatus => (ReadRequest, D::Status, 7),
            Command::UpdateMode(_) | Command::UpdateFanMode(_) | Command::UpdateSetpoint { .. } => {
                (Write, D::Control, 1)
            }
            Command::SetHold(_) => (Write, D::Scheduling, 4),
            Command::SetDehumidificationSetpoint(_) => (Write, D::Control, 4),
            Command::SetHumidificationSetpoint(_) => (Write, D::Control, 6),
            Command::SetAirCleaning { .. } => (Write, D::Control, 5),
            Command::SetFreshAir { .. } => (Write, D::Control, 3),
            Command::ConfigureCos => (Write, D::Status, 1),
            Command::Sync => (Write, D::Status, 2),
        }
    }

    /// Data bytes following the triple.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` if a setpoint cannot be encoded.
    pub fn payload(&self) -> Result<Vec<u8>> {
        let payload = match *self {
            Command::UpdateMode(mode) => vec![mode, 0, 0, 0],
            Command::UpdateFanMode(fan_mode) => vec![0, fan_mode, 0, 0],
            Command::UpdateSetpoint { cool, heat } => {
                vec![0, 0, encode_temperature(heat)?, encode_temperature(cool)?]
            }
            Command::SetHold(hold) => {
                let mut payload = vec![0; HOLD_PAYLOAD_SIZE];
                payload[0] = hold;
                payload
            }
            Command::SetDehumidificationSetpoint(setpoint)
            | Command::SetHumidificationSetpoint(setpoint) => vec![setpoint],
            Command::SetAirCleaning { mode, event } | Command::SetFreshAir { mode, event } => {
                vec![mode, event]
            }
            Command::ConfigureCos => COS_SUBSCRIPTIONS.to_vec(),
            Command::Sync => vec![1],
            _ => Vec::new(),
        };
        Ok(payload)
    }

    /// Encode into a complete frame with `sequence`.
    pub fn encode(&self, sequence: u8) -> Result<Bytes> {
        let (action, functional_domain, attribute) = self.target();
        build_frame(sequence, action, functional_domain, attribute, &self.payload()?)
    }
}

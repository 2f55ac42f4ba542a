//! Transport module - TCP connection handling.
//!
//! The client dials the thermostat with [`connect`]; the mock thermostat
//! accepts connections through [`ThermostatListener`].

mod tcp;

pub use tcp::{connect, ThermostatListener};

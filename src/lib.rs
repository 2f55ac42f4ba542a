//! # aprilaire-client
//!
//! Async TCP client for the Aprilaire thermostat wire protocol.
//!
//! The client keeps one long-lived connection to a thermostat, queues encoded
//! commands, decodes every frame the device sends into typed attribute
//! updates and reconnects on its own when the connection drops.
//!
//! ## Architecture
//!
//! - **Protocol**: 4-byte header, payload, CRC-8 trailer; streaming reassembly
//! - **Codec**: positional attribute table, temperature/humidity encodings
//! - **Session**: bring-up requests, queued writes, inbound dispatch
//! - **Supervisor**: connect, retry, proactive refresh
//! - **Correlation**: `wait_for_response` keyed by domain and attribute
//!
//! ## Example
//!
//! ```ignore
//! use std::time::Duration;
//! use aprilaire_client::{Client, FunctionalDomain};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder().host("192.168.1.50").build();
//!     client.start_listen();
//!
//!     client.read_sensors()?;
//!     if let Some(record) = client
//!         .wait_for_response(FunctionalDomain::Sensors, 2, Duration::from_secs(30))
//!         .await
//!     {
//!         println!("{:?}", record.values);
//!     }
//!
//!     client.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod command;
pub mod config;
pub mod correlation;
pub mod device;
pub mod error;
pub mod mock;
pub mod protocol;
pub mod queue;
pub mod state;
pub mod transport;

mod client;
mod reconnect;
mod session;

pub use client::{Client, ClientBuilder};
pub use codec::{Attribute, AttributeValue, DecodedRecord, Event};
pub use command::Command;
pub use config::ClientConfig;
pub use device::DeviceInfo;
pub use error::{AprilaireError, Result};
pub use protocol::{Action, FunctionalDomain};
pub use state::{ConnectionState, ConnectionStatus, StateUpdate, ThermostatState};

//! Client configuration.
//!
//! Durations are whole seconds when loaded from JSON:
//!
//! ```
//! use std::time::Duration;
//! use aprilaire_client::ClientConfig;
//!
//! let config = ClientConfig::from_json(r#"{
//!     "host": "192.168.1.50",
//!     "port": 7001,
//!     "reconnect_interval": null,
//!     "retry_connection_interval": 5
//! }"#).unwrap();
//!
//! assert_eq!(config.port, 7001);
//! assert_eq!(config.reconnect_interval, None);
//! assert_eq!(config.retry_connection_interval, Duration::from_secs(5));
//! ```

use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::Result;

/// Default TCP port of the thermostat's automation interface.
pub const DEFAULT_PORT: u16 = 7000;

/// Default interval between proactive reconnects.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(3600);

/// Default delay between failed connection attempts.
pub const DEFAULT_RETRY_CONNECTION_INTERVAL: Duration = Duration::from_secs(10);

/// Default TCP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default capacity of the state update channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Typical per-request timeout for `wait_for_response`.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for one thermostat.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    /// Proactive reconnect period while connected. `None` disables it.
    #[serde(deserialize_with = "optional_seconds")]
    pub reconnect_interval: Option<Duration>,
    /// Delay between connection attempts, and before reconnecting after a drop.
    #[serde(deserialize_with = "seconds")]
    pub retry_connection_interval: Duration,
    #[serde(deserialize_with = "seconds")]
    pub connect_timeout: Duration,
    /// Buffered state updates per subscriber before it starts lagging.
    pub event_capacity: usize,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// Parse a configuration from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            reconnect_interval: Some(DEFAULT_RECONNECT_INTERVAL),
            retry_connection_interval: DEFAULT_RETRY_CONNECTION_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

fn seconds<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_secs)
}

fn optional_seconds<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<Duration>, D::Error> {
    // Zero disables the proactive reconnect, same as null
    Ok(Option::<u64>::deserialize(deserializer)?
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs))
}

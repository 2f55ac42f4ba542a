//! Latest known thermostat state and connection flags.
//!
//! Every decoded record is merged into a single [`ThermostatState`] map with
//! shallow key overwrite. Each merge is published to subscribers as a
//! [`StateUpdate`] carrying the delta and the full snapshot. Connection flags
//! live in a `watch` channel and are mirrored into the map under the synthetic
//! `connected`, `stopped` and `reconnecting` keys whenever they change.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;

use crate::codec::{Attribute, AttributeValue};

/// Attribute values keyed by [`Attribute`].
pub type AttributeMap = BTreeMap<Attribute, AttributeValue>;

/// Merged view of everything the thermostat has reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ThermostatState {
    values: AttributeMap,
}

impl ThermostatState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, attribute: Attribute) -> Option<&AttributeValue> {
        self.values.get(&attribute)
    }

    pub fn contains(&self, attribute: Attribute) -> bool {
        self.values.contains_key(&attribute)
    }

    pub fn integer(&self, attribute: Attribute) -> Option<u8> {
        self.get(attribute).and_then(AttributeValue::as_integer)
    }

    pub fn temperature(&self, attribute: Attribute) -> Option<f32> {
        self.get(attribute).and_then(AttributeValue::as_temperature)
    }

    pub fn flag(&self, attribute: Attribute) -> Option<bool> {
        self.get(attribute).and_then(AttributeValue::as_flag)
    }

    pub fn mac_address(&self) -> Option<&str> {
        self.get(Attribute::MacAddress).and_then(AttributeValue::as_str)
    }

    /// Whether the device answered on the current connection.
    pub fn is_available(&self) -> bool {
        self.flag(Attribute::Available).unwrap_or(false)
    }

    /// Overwrite the given keys, leaving every other key in place.
    pub fn merge(&mut self, changes: &AttributeMap) {
        for (attribute, value) in changes {
            self.values.insert(*attribute, value.clone());
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Attribute, &AttributeValue)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// One published change: the delta plus the merged state after it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateUpdate {
    pub changes: AttributeMap,
    pub state: ThermostatState,
}

/// Lifecycle of the connection as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Stopped,
    Connecting,
    Connected,
    Reconnecting,
}

/// The three connection flags reported to collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub stopped: bool,
    pub reconnecting: bool,
}

impl ConnectionStatus {
    /// Status of a client that has not been started.
    pub const STOPPED: ConnectionStatus = ConnectionStatus {
        connected: false,
        stopped: true,
        reconnecting: false,
    };

    pub fn state(&self) -> ConnectionState {
        if self.stopped {
            ConnectionState::Stopped
        } else if self.connected {
            ConnectionState::Connected
        } else if self.reconnecting {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Connecting
        }
    }

    fn as_changes(&self) -> AttributeMap {
        BTreeMap::from([
            (Attribute::Connected, AttributeValue::Flag(self.connected)),
            (Attribute::Stopped, AttributeValue::Flag(self.stopped)),
            (Attribute::Reconnecting, AttributeValue::Flag(self.reconnecting)),
        ])
    }
}

impl Default for ConnectionStatus {
    fn default() -> Self {
        Self::STOPPED
    }
}

/// Shared state store: latest state, connection flags and subscribers.
#[derive(Debug)]
pub(crate) struct StateStore {
    state: Mutex<ThermostatState>,
    status: watch::Sender<ConnectionStatus>,
    updates: broadcast::Sender<StateUpdate>,
}

impl StateStore {
    pub(crate) fn new(event_capacity: usize) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::STOPPED);
        let (updates, _) = broadcast::channel(event_capacity.max(1));
        Self {
            state: Mutex::new(ThermostatState::new()),
            status,
            updates,
        }
    }

    /// Merge `changes` and publish them. Empty deltas are not published.
    pub(crate) fn merge(&self, changes: AttributeMap) {
        if changes.is_empty() {
            return;
        }

        let state = {
            let mut state = self.lock();
            state.merge(&changes);
            state.clone()
        };

        // No subscribers is fine
        let _ = self.updates.send(StateUpdate { changes, state });
    }

    pub(crate) fn set_available(&self, available: bool) {
        self.merge(BTreeMap::from([(
            Attribute::Available,
            AttributeValue::Flag(available),
        )]));
    }

    pub(crate) fn snapshot(&self) -> ThermostatState {
        self.lock().clone()
    }

    pub(crate) fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Apply `update` to the connection flags, publishing only real changes.
    ///
    /// The mirror into the state map happens while the flags are locked, so
    /// concurrent updates land in the same order in both places. Returns
    /// whether anything changed.
    pub(crate) fn update_status(&self, update: impl FnOnce(&mut ConnectionStatus)) -> bool {
        self.status.send_if_modified(|status| {
            let before = *status;
            update(status);
            if before == *status {
                return false;
            }
            self.merge(status.as_changes());
            true
        })
    }

    /// Set the `available` flag unless `cancel` has fired.
    ///
    /// Checked under the flag lock: `stop_listen` cancels before it writes
    /// the stopped flags, so a late call here cannot outlive the stop.
    pub(crate) fn set_available_unless_cancelled(&self, available: bool, cancel: &CancellationToken) {
        self.status.send_if_modified(|_| {
            if !cancel.is_cancelled() {
                self.set_available(available);
            }
            false
        });
    }

    pub(crate) fn watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<StateUpdate> {
        self.updates.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, ThermostatState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changes(pairs: &[(Attribute, AttributeValue)]) -> AttributeMap {
        pairs.iter().cloned().collect()
    }

    #[test]
    fn test_merge_overwrites_keys_only() {
        let mut state = ThermostatState::new();
        state.merge(&changes(&[
            (Attribute::Mode, AttributeValue::Integer(2)),
            (Attribute::FanMode, AttributeValue::Integer(1)),
        ]));
        state.merge(&changes(&[(Attribute::Mode, AttributeValue::Integer(3))]));

        assert_eq!(state.integer(Attribute::Mode), Some(3));
        assert_eq!(state.integer(Attribute::FanMode), Some(1));
        assert_eq!(state.len(), 2);
    }

    #[test]
    fn test_unavailable_overwrites_reading() {
        let mut state = ThermostatState::new();
        state.merge(&changes(&[(
            Attribute::IndoorHumidityControllingSensorValue,
            AttributeValue::Humidity(40),
        )]));
        state.merge(&changes(&[(
            Attribute::IndoorHumidityControllingSensorValue,
            AttributeValue::Unavailable,
        )]));

        assert_eq!(
            state.get(Attribute::IndoorHumidityControllingSensorValue),
            Some(&AttributeValue::Unavailable)
        );
    }

    #[test]
    fn test_connection_state_mapping() {
        let mut status = ConnectionStatus::STOPPED;
        assert_eq!(status.state(), ConnectionState::Stopped);

        status.stopped = false;
        assert_eq!(status.state(), ConnectionState::Connecting);

        status.reconnecting = true;
        assert_eq!(status.state(), ConnectionState::Reconnecting);

        status.reconnecting = false;
        status.connected = true;
        assert_eq!(status.state(), ConnectionState::Connected);
    }

    #[test]
    fn test_state_serializes_as_flat_map() {
        let mut state = ThermostatState::new();
        state.merge(&changes(&[
            (Attribute::HeatSetpoint, AttributeValue::Temperature(20.5)),
            (Attribute::Available, AttributeValue::Flag(true)),
        ]));

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["heat_setpoint"], 20.5);
        assert_eq!(json["available"], true);
    }

    #[tokio::test]
    async fn test_store_publishes_merges() {
        let store = StateStore::new(16);
        let mut updates = store.subscribe();

        store.merge(changes(&[(Attribute::Synced, AttributeValue::Integer(1))]));
        store.merge(AttributeMap::new());

        let update = updates.recv().await.unwrap();
        assert_eq!(update.changes.len(), 1);
        assert_eq!(update.state.integer(Attribute::Synced), Some(1));
        assert!(updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_status_changes_are_mirrored() {
        let store = StateStore::new(16);
        let mut updates = store.subscribe();
        let mut watch = store.watch();

        assert!(store.update_status(|s| s.stopped = false));
        assert!(!store.update_status(|s| s.stopped = false));

        watch.changed().await.unwrap();
        assert_eq!(watch.borrow().state(), ConnectionState::Connecting);

        let update = updates.recv().await.unwrap();
        assert_eq!(update.state.flag(Attribute::Stopped), Some(false));
        assert_eq!(update.state.flag(Attribute::Connected), Some(false));
        assert_eq!(update.state.flag(Attribute::Reconnecting), Some(false));
        assert!(updates.try_recv().is_err());
    }

    #[test]
    fn test_availability() {
        let store = StateStore::new(4);
        assert!(!store.snapshot().is_available());
        store.set_available(true);
        assert!(store.snapshot().is_available());
        store.set_available(false);
        assert!(!store.snapshot().is_available());
    }

    #[test]
    fn test_availability_ignored_after_cancel() {
        let store = StateStore::new(4);
        let cancel = CancellationToken::new();

        store.set_available_unless_cancelled(true, &cancel);
        assert!(store.snapshot().is_available());

        cancel.cancel();
        store.set_available(false);
        store.set_available_unless_cancelled(true, &cancel);
        assert!(!store.snapshot().is_available());
    }
}

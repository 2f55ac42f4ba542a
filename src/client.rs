//! Client builder and facade.
//!
//! The [`ClientBuilder`] provides a fluent API for configuring the connection
//! and building the client. The [`Client`] manages the lifecycle:
//! 1. `start_listen` spawns the connection supervisor
//! 2. Each connection writes the bring-up requests, then flushes queued commands
//! 3. Inbound frames are decoded, merged into the latest state and matched
//!    against pending `wait_for_response` calls
//! 4. `stop_listen` cancels everything and closes the socket
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use aprilaire_client::Client;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = Client::builder()
//!         .host("192.168.1.50")
//!         .port(7000)
//!         .build();
//!
//!     client.start_listen();
//!     let device = client.wait_for_ready(Duration::from_secs(30)).await?;
//!     println!("Connected to {}", device.mac_address);
//!
//!     client.update_setpoint(24.0, 20.5)?;
//!
//!     let mut updates = client.subscribe();
//!     while let Ok(update) = updates.recv().await {
//!         println!("{:?}", update.changes);
//!     }
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn, Instrument, Span};

use crate::codec::{Attribute, DecodedRecord};
use crate::command::Command;
use crate::config::ClientConfig;
use crate::correlation::PendingRequests;
use crate::device::DeviceInfo;
use crate::error::{AprilaireError, Result};
use crate::protocol::{FunctionalDomain, Sequencer};
use crate::queue::CommandQueue;
use crate::reconnect;
use crate::state::{ConnectionStatus, StateStore, StateUpdate, ThermostatState};

/// Builder for configuring and creating a [`Client`].
#[derive(Debug, Default)]
pub struct ClientBuilder {
    config: ClientConfig,
    span: Option<Span>,
}

impl ClientBuilder {
    /// Create a new client builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Default: 7000
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Set the proactive reconnect interval, `None` to disable.
    ///
    /// Default: 1 hour
    pub fn reconnect_interval(mut self, interval: Option<Duration>) -> Self {
        self.config.reconnect_interval = interval;
        self
    }

    /// Set the delay between connection attempts.
    ///
    /// Default: 10 seconds
    pub fn retry_connection_interval(mut self, interval: Duration) -> Self {
        self.config.retry_connection_interval = interval;
        self
    }

    /// Default: 10 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set how many state updates a slow subscriber may fall behind.
    ///
    /// Default: 256
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// Span all client logging is recorded under.
    ///
    /// Default: `aprilaire{host, port}` at info level.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Build the client. Nothing connects until [`Client::start_listen`].
    pub fn build(self) -> Client {
        let span = self.span.unwrap_or_else(|| {
            tracing::info_span!("aprilaire", host = %self.config.host, port = self.config.port)
        });
        Client {
            shared: Arc::new(Shared::new(self.config, span)),
        }
    }
}

/// Running supervisor, if any.
#[derive(Debug, Default)]
struct Lifecycle {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl Lifecycle {
    fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

/// State shared between the facade and the supervisor task.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) config: ClientConfig,
    pub(crate) span: Span,
    pub(crate) queue: CommandQueue,
    pub(crate) sequence: Sequencer,
    pub(crate) pending: PendingRequests,
    pub(crate) store: StateStore,
    /// Wakes the live session for a manual reconnect.
    pub(crate) refresh: Notify,
    lifecycle: Mutex<Lifecycle>,
}

impl Shared {
    pub(crate) fn new(config: ClientConfig, span: Span) -> Self {
        let store = StateStore::new(config.event_capacity);
        Self {
            config,
            span,
            queue: CommandQueue::new(),
            sequence: Sequencer::new(),
            pending: PendingRequests::new(),
            store,
            refresh: Notify::new(),
            lifecycle: Mutex::new(Lifecycle::default()),
        }
    }

    /// Encode `command` with the next sequence number and queue it.
    pub(crate) fn send(&self, command: Command) -> Result<()> {
        let frame = command.encode(self.sequence.next())?;
        self.queue.enqueue(frame)
    }

    /// Route one decoded record: log errors, merge state, wake waiters.
    pub(crate) fn dispatch(&self, record: DecodedRecord) {
        if let Some(code) = record.error() {
            warn!(code, "Thermostat reported an error");
        }

        self.store.merge(record.values.clone());
        self.pending.resolve(&record);
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Persistent connection to one thermostat.
///
/// Commands never wait for the socket: they are encoded and queued, and the
/// supervisor writes them once a connection is up. Dropping the client stops
/// the supervisor.
#[derive(Debug)]
pub struct Client {
    shared: Arc<Shared>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Create a client from a configuration.
    pub fn new(config: ClientConfig) -> Self {
        ClientBuilder::new().config(config).build()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Start connecting in the background. Idempotent.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_listen(&self) {
        let mut lifecycle = self.shared.lifecycle();
        if lifecycle.is_running() {
            return;
        }

        self.shared.store.update_status(|status| {
            status.stopped = false;
            status.connected = false;
            status.reconnecting = false;
        });

        let cancel = CancellationToken::new();
        let supervisor = reconnect::supervise(self.shared.clone(), cancel.clone())
            .instrument(self.shared.span.clone());
        *lifecycle = Lifecycle {
            cancel,
            task: Some(tokio::spawn(supervisor)),
        };

        let _enter = self.shared.span.enter();
        info!("Started listening");
    }

    /// Stop the supervisor and close the connection. Idempotent.
    ///
    /// Pending [`wait_for_response`](Client::wait_for_response) calls resolve
    /// to `None` immediately.
    pub fn stop_listen(&self) {
        // Cancel before writing the flags: the supervisor drops its own flag
        // writes once cancelled, so these are the last word.
        let changed = {
            let lifecycle = self.shared.lifecycle();
            lifecycle.cancel.cancel();
            self.shared.store.update_status(|status| {
                status.stopped = true;
                status.connected = false;
                status.reconnecting = false;
            })
        };
        self.shared.pending.cancel_all();

        if changed {
            self.shared.store.set_available(false);
            let _enter = self.shared.span.enter();
            info!("Stopped listening");
        }
    }

    /// Stop and wait for the supervisor task to finish.
    pub async fn shutdown(&self) {
        self.stop_listen();

        let task = self.shared.lifecycle().task.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                let _enter = self.shared.span.enter();
                error!(error = %e, "Supervisor task failed");
            }
        }
    }

    /// Drop the current connection and reconnect.
    ///
    /// No-op unless connected and not already reconnecting.
    pub fn reconnect(&self) {
        let status = self.shared.store.status();
        if status.connected && !status.reconnecting && !status.stopped {
            self.shared.refresh.notify_one();
        }
    }

    /// Wait for the next record addressed to `(functional_domain, attribute)`.
    ///
    /// Returns `None` on timeout or when the client is stopped.
    pub async fn wait_for_response(
        &self,
        functional_domain: FunctionalDomain,
        attribute: u8,
        timeout: Duration,
    ) -> Option<DecodedRecord> {
        self.shared
            .pending
            .wait_for((functional_domain, attribute), timeout)
            .instrument(self.shared.span.clone())
            .await
    }

    /// Wait until the thermostat has identified itself.
    ///
    /// Each missing piece of identity is waited for with `timeout`: the MAC
    /// address is required, IAQ availability and sensors are best effort.
    ///
    /// # Errors
    ///
    /// Returns `MissingMacAddress` if the MAC address never arrives.
    pub async fn wait_for_ready(&self, timeout: Duration) -> Result<DeviceInfo> {
        if !self.state().contains(Attribute::MacAddress) {
            let record = self
                .wait_for_response(FunctionalDomain::Identification, 2, timeout)
                .await;
            if record.and_then(|r| r.get(Attribute::MacAddress).cloned()).is_none() {
                let _enter = self.shared.span.enter();
                error!("Missing MAC address, cannot identify thermostat");
                return Err(AprilaireError::MissingMacAddress);
            }
        }

        if !self.state().contains(Attribute::ThermostatModes) {
            self.wait_for_response(FunctionalDomain::Control, 7, timeout)
                .await;
        }

        if !self
            .state()
            .contains(Attribute::IndoorTemperatureControllingSensorStatus)
        {
            self.wait_for_response(FunctionalDomain::Sensors, 2, timeout)
                .await;
        }

        self.device_info().ok_or(AprilaireError::MissingMacAddress)
    }

    /// Snapshot of the latest known state.
    pub fn state(&self) -> ThermostatState {
        self.shared.store.snapshot()
    }

    /// Identity derived from the latest state, once the MAC is known.
    pub fn device_info(&self) -> Option<DeviceInfo> {
        DeviceInfo::from_state(&self.state())
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.shared.store.status()
    }

    /// Watch the connection flags.
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.store.watch()
    }

    /// Subscribe to every state change, decoded or synthetic.
    pub fn subscribe(&self) -> broadcast::Receiver<StateUpdate> {
        self.shared.store.subscribe()
    }

    /// Number of commands queued and not yet written.
    pub fn pending_commands(&self) -> usize {
        self.shared.queue.pending_count()
    }

    /// Encode and queue an arbitrary command.
    pub fn send(&self, command: Command) -> Result<()> {
        self.shared.send(command)
    }

    pub fn read_sensors(&self) -> Result<()> {
        self.send(Command::ReadSensors)
    }

    pub fn read_control(&self) -> Result<()> {
        self.send(Command::ReadControl)
    }

    pub fn read_scheduling(&self) -> Result<()> {
        self.send(Command::ReadScheduling)
    }

    pub fn read_mac_address(&self) -> Result<()> {
        self.send(Command::ReadMacAddress)
    }

    pub fn read_revision_and_model(&self) -> Result<()> {
        self.send(Command::ReadRevisionAndModel)
    }

    pub fn read_thermostat_iaq_available(&self) -> Result<()> {
        self.send(Command::ReadThermostatIaqAvailable)
    }

    pub fn read_thermostat_status(&self) -> Result<()> {
        self.send(Command::ReadThermostatStatus)
    }

    pub fn read_iaq_status(&self) -> Result<()> {
        self.send(Command::ReadIaqStatus)
    }

    pub fn update_mode(&self, mode: u8) -> Result<()> {
        self.send(Command::UpdateMode(mode))
    }

    pub fn update_fan_mode(&self, fan_mode: u8) -> Result<()> {
        self.send(Command::UpdateFanMode(fan_mode))
    }

    /// Write both setpoints.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` for temperatures outside ±63.5; nothing is queued.
    pub fn update_setpoint(&self, cool_setpoint: f32, heat_setpoint: f32) -> Result<()> {
        self.send(Command::UpdateSetpoint {
            cool: cool_setpoint,
            heat: heat_setpoint,
        })
    }

    pub fn set_hold(&self, hold: u8) -> Result<()> {
        self.send(Command::SetHold(hold))
    }

    pub fn set_dehumidification_setpoint(&self, setpoint: u8) -> Result<()> {
        self.send(Command::SetDehumidificationSetpoint(setpoint))
    }

    pub fn set_humidification_setpoint(&self, setpoint: u8) -> Result<()> {
        self.send(Command::SetHumidificationSetpoint(setpoint))
    }

    pub fn set_air_cleaning(&self, mode: u8, event: u8) -> Result<()> {
        self.send(Command::SetAirCleaning { mode, event })
    }

    pub fn set_fresh_air(&self, mode: u8, event: u8) -> Result<()> {
        self.send(Command::SetFreshAir { mode, event })
    }

    pub fn configure_cos(&self) -> Result<()> {
        self.send(Command::ConfigureCos)
    }

    pub fn sync(&self) -> Result<()> {
        self.send(Command::Sync)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.stop_listen();
    }
}

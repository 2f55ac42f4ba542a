//! Connection supervisor.
//!
//! One supervisor task runs per started client:
//!
//! ```text
//!  start_listen
//!       │
//!       ▼
//!  Connecting ──(refused / timeout: sleep retry interval)──► Connecting
//!       │ ok
//!       ▼
//!  Connected ──(drop, refresh timer, reconnect())──► sleep retry interval ──► Reconnecting
//!       │
//!       └──(stop_listen)──► exit
//! ```
//!
//! The supervisor owns the receiving side of the command queue for its whole
//! lifetime, so only one session can ever drain it.

use std::sync::Arc;

use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::Shared;
use crate::session::{Session, SessionEnd};
use crate::transport;

/// Run connect/session cycles until `cancel` fires.
///
/// Flag writes are dropped once `cancel` has fired: the canceller
/// (`stop_listen`) owns the terminal flags.
pub(crate) async fn supervise(shared: Arc<Shared>, cancel: CancellationToken) {
    let mut drain = tokio::select! {
        _ = cancel.cancelled() => return,
        drain = shared.queue.drain() => drain,
    };

    let mut first_attempt = true;
    loop {
        if !first_attempt && !sleep_or_cancel(&cancel, shared.config.retry_connection_interval).await {
            break;
        }
        first_attempt = false;

        let Some(stream) = connect_with_retry(&shared, &cancel).await else {
            break;
        };
        set_link_flags(&shared, &cancel, true, false);
        if cancel.is_cancelled() {
            break;
        }
        info!("Connected to thermostat");

        let end = Session::new(&shared, &cancel).run(stream, &mut drain).await;
        drain.discard_stale();

        if matches!(end, SessionEnd::Stopped) || cancel.is_cancelled() {
            break;
        }

        match end {
            SessionEnd::Lost(Some(e)) => warn!(error = %e, "Connection to thermostat lost"),
            SessionEnd::Lost(None) => warn!("Thermostat closed the connection"),
            _ => {}
        }

        set_link_flags(&shared, &cancel, false, true);
        shared.store.set_available_unless_cancelled(false, &cancel);
    }

    // No-op when cancelled; otherwise no live transport remains
    set_link_flags(&shared, &cancel, false, false);
    debug!("Supervisor exited");
}

/// Write `connected`/`reconnecting` unless `cancel` has fired.
///
/// Returns whether the flags changed.
fn set_link_flags(
    shared: &Shared,
    cancel: &CancellationToken,
    connected: bool,
    reconnecting: bool,
) -> bool {
    shared.store.update_status(|status| {
        if !cancel.is_cancelled() {
            status.connected = connected;
            status.reconnecting = reconnecting;
        }
    })
}

/// Keep dialing until a connection succeeds, `None` once cancelled.
pub(crate) async fn connect_with_retry(
    shared: &Shared,
    cancel: &CancellationToken,
) -> Option<TcpStream> {
    let config = &shared.config;

    loop {
        let attempt = tokio::select! {
            _ = cancel.cancelled() => return None,
            attempt = transport::connect(&config.host, config.port, config.connect_timeout) => attempt,
        };

        match attempt {
            Ok(stream) => return Some(stream),
            Err(e) => error!(error = %e, "Failed to connect to thermostat"),
        }

        if !sleep_or_cancel(cancel, config.retry_connection_interval).await {
            return None;
        }
    }
}

/// Sleep for `duration`, returning `false` if cancelled first.
async fn sleep_or_cancel(cancel: &CancellationToken, duration: std::time::Duration) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

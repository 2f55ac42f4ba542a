//! One live connection to the thermostat.
//!
//! A session starts by writing the bring-up requests, then multiplexes:
//! - inbound bytes, reassembled into frames and dispatched as records
//! - queued commands, written in batches in enqueue order
//! - the proactive refresh timer and manual reconnect requests
//! - cancellation from `stop_listen`
//!
//! It returns a [`SessionEnd`] telling the supervisor why it stopped.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::Shared;
use crate::codec::{decode_frame, record::hex};
use crate::command::Command;
use crate::error::{AprilaireError, Result};
use crate::protocol::{Action, Frame, FrameBuffer};
use crate::queue::{write_batch, Drain};

/// Read buffer size.
const READ_BUFFER_SIZE: usize = 4 * 1024;

/// Why a session ended.
#[derive(Debug)]
pub(crate) enum SessionEnd {
    /// Cancelled by `stop_listen` or client drop.
    Stopped,
    /// Proactive or requested reconnect.
    Refresh,
    /// The peer closed the connection (`None`) or I/O failed.
    Lost(Option<AprilaireError>),
}

enum Step {
    Stop,
    Refresh,
    Read(std::io::Result<usize>),
    Write(Option<Vec<Bytes>>),
}

pub(crate) struct Session<'a> {
    shared: &'a Shared,
    cancel: &'a CancellationToken,
    frames: FrameBuffer,
    seen_record: bool,
}

impl<'a> Session<'a> {
    pub(crate) fn new(shared: &'a Shared, cancel: &'a CancellationToken) -> Self {
        Self {
            shared,
            cancel,
            frames: FrameBuffer::new(),
            seen_record: false,
        }
    }

    /// Drive the connection until it ends.
    pub(crate) async fn run<S>(
        mut self,
        stream: S,
        drain: &mut Drain<'_>,
    ) -> SessionEnd
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let cancel = self.cancel;
        let (mut reader, mut writer) = tokio::io::split(stream);

        let bring_up = match self.bring_up_frames() {
            Ok(frames) => frames,
            Err(e) => return SessionEnd::Lost(Some(e)),
        };
        tokio::select! {
            _ = cancel.cancelled() => return SessionEnd::Stopped,
            written = write_batch(&mut writer, &bring_up) => {
                if let Err(e) = written {
                    return SessionEnd::Lost(Some(e));
                }
            }
        }

        let refresh = refresh_timer(self.shared.config.reconnect_interval);
        tokio::pin!(refresh);
        let mut buf = vec![0u8; READ_BUFFER_SIZE];

        loop {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => Step::Stop,
                _ = &mut refresh => {
                    info!("Refreshing connection");
                    Step::Refresh
                }
                _ = self.shared.refresh.notified() => {
                    info!("Reconnect requested");
                    Step::Refresh
                }
                read = reader.read(&mut buf) => Step::Read(read),
                batch = drain.next_batch() => Step::Write(batch),
            };

            match step {
                Step::Stop => return SessionEnd::Stopped,
                Step::Refresh => return SessionEnd::Refresh,
                Step::Read(Ok(0)) => return SessionEnd::Lost(None),
                Step::Read(Ok(n)) => self.on_data(&buf[..n]),
                Step::Read(Err(e)) => return SessionEnd::Lost(Some(e.into())),
                // Every sender is gone, so the client no longer exists
                Step::Write(None) => return SessionEnd::Stopped,
                Step::Write(Some(batch)) => {
                    debug!(frames = batch.len(), "Writing queued frames");
                    tokio::select! {
                        _ = cancel.cancelled() => return SessionEnd::Stopped,
                        written = write_batch(&mut writer, &batch) => {
                            if let Err(e) = written {
                                return SessionEnd::Lost(Some(e));
                            }
                        }
                    }
                }
            }
        }
    }

    fn bring_up_frames(&self) -> Result<Vec<Bytes>> {
        Command::BRING_UP
            .iter()
            .map(|command| command.encode(self.shared.sequence.next()))
            .collect()
    }

    fn on_data(&mut self, data: &[u8]) {
        for frame in self.frames.push(data) {
            self.on_frame(&frame);
        }
    }

    fn on_frame(&mut self, frame: &Frame) {
        debug!(sequence = frame.sequence(), bytes = %hex(&frame.to_bytes()), "Received frame");

        if frame.action() == Some(Action::Nack) {
            warn!(
                functional_domain = ?frame.functional_domain(),
                attribute = ?frame.attribute(),
                "Thermostat rejected a command"
            );
            return;
        }

        let Some(record) = decode_frame(frame) else {
            return;
        };

        if !self.seen_record {
            self.seen_record = true;
            self.shared.store.set_available_unless_cancelled(true, self.cancel);
        }
        self.shared.dispatch(record);
    }
}

async fn refresh_timer(interval: Option<Duration>) {
    match interval {
        Some(interval) => tokio::time::sleep(interval).await,
        None => std::future::pending().await,
    }
}

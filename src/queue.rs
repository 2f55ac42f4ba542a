//! Outbound command queue.
//!
//! Commands are encoded by the caller and pushed onto an unbounded channel, so
//! issuing a command never waits on the socket. The session that currently owns
//! the connection drains the channel in batches and writes each batch with
//! scatter/gather I/O.
//!
//! ```text
//! Client::read_control ─┐
//! Client::update_mode  ─┼─► mpsc::UnboundedSender<Bytes> ─► Session ─► TcpStream
//! Client::sync         ─┘
//! ```
//!
//! Frames queued while no session is running stay in the channel and are
//! written after the next bring-up sequence. Frames still queued when a session
//! ends are discarded as stale.

use std::io::IoSlice;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tracing::debug;

use crate::error::{AprilaireError, Result};

/// Maximum frames to batch in a single write operation.
pub const MAX_BATCH_SIZE: usize = 64;

/// Ordered queue of encoded frames waiting for a connection.
#[derive(Debug)]
pub struct CommandQueue {
    tx: mpsc::UnboundedSender<Bytes>,
    rx: Mutex<mpsc::UnboundedReceiver<Bytes>>,
    pending: AtomicUsize,
}

impl CommandQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            pending: AtomicUsize::new(0),
        }
    }

    /// Append a frame. Never blocks.
    pub fn enqueue(&self, frame: Bytes) -> Result<()> {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.tx.send(frame).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::Release);
            AprilaireError::ConnectionClosed
        })
    }

    /// Number of frames waiting to be written.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Take exclusive ownership of the receiving side.
    ///
    /// Held by the connection supervisor for as long as it runs.
    pub(crate) async fn drain(&self) -> Drain<'_> {
        Drain {
            rx: self.rx.lock().await,
            pending: &self.pending,
        }
    }
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

/// Exclusive receiving half of a [`CommandQueue`].
pub(crate) struct Drain<'a> {
    rx: MutexGuard<'a, mpsc::UnboundedReceiver<Bytes>>,
    pending: &'a AtomicUsize,
}

impl Drain<'_> {
    /// Wait for at least one frame, then collect whatever else is ready.
    ///
    /// Returns `None` once every sender is gone.
    pub(crate) async fn next_batch(&mut self) -> Option<Vec<Bytes>> {
        let first = self.rx.recv().await?;

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match self.rx.try_recv() {
                Ok(frame) => batch.push(frame),
                Err(_) => break,
            }
        }

        self.pending.fetch_sub(batch.len(), Ordering::Release);
        Some(batch)
    }

    /// Drop every frame currently queued, returning how many were dropped.
    pub(crate) fn discard_stale(&mut self) -> usize {
        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            self.pending.fetch_sub(discarded, Ordering::Release);
            debug!(discarded, "Discarded stale queued frames");
        }
        discarded
    }
}

/// Write a batch of frames in enqueue order using `write_vectored`.
pub(crate) async fn write_batch<W>(writer: &mut W, batch: &[Bytes]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    let total_size: usize = batch.iter().map(Bytes::len).sum();
    let slices: Vec<IoSlice<'_>> = batch.iter().map(|frame| IoSlice::new(frame)).collect();

    let mut total_written = writer.write_vectored(&slices).await?;

    while total_written < total_size {
        if total_written == 0 {
            return Err(write_zero());
        }
        let remaining = remaining_slices(batch, total_written);
        let written = writer.write_vectored(&remaining).await?;
        if written == 0 {
            return Err(write_zero());
        }
        total_written += written;
    }

    writer.flush().await?;
    Ok(())
}

fn write_zero() -> AprilaireError {
    AprilaireError::Io(std::io::Error::new(
        std::io::ErrorKind::WriteZero,
        "write_vectored returned 0",
    ))
}

/// Build IoSlice array for remaining data after a partial write.
fn remaining_slices(batch: &[Bytes], skip_bytes: usize) -> Vec<IoSlice<'_>> {
    let mut slices = Vec::with_capacity(batch.len());
    let mut offset = 0;

    for frame in batch {
        let end = offset + frame.len();
        if skip_bytes < end {
            let start = skip_bytes.saturating_sub(offset);
            slices.push(IoSlice::new(&frame[start..]));
        }
        offset = end;
    }

    slices
}

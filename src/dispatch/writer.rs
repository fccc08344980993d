//! Dedicated writer task for outbound datagrams.
//!
//! All outbound packets funnel through one mpsc channel into a single task
//! that owns the write half of the byte channel. Queue discipline is what
//! guarantees the wire ordering contract: bytes leave in call order.
//!
//! # Architecture
//!
//! ```text
//! Caller 1 ─┐
//! Caller 2 ─┼─► mpsc::Sender<Bytes> ─► Writer Task ─► byte channel
//! Caller N ─┘
//! ```

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{BowlerError, Result};

/// Default channel capacity for queued datagrams.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Handle for queueing datagrams to the writer task.
///
/// Cheaply cloneable; every clone feeds the same ordered queue.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Bytes>,
}

impl WriterHandle {
    /// Queue one datagram.
    ///
    /// Waits for queue space; errors once the writer task has exited.
    pub async fn send(&self, datagram: Bytes) -> Result<()> {
        self.tx
            .send(datagram)
            .await
            .map_err(|_| BowlerError::TransportClosed)
    }

    /// Whether the writer task is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task over the write half of the byte channel.
///
/// Returns the sending handle and the task's join handle.
pub fn spawn_writer_task<W>(writer: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(DEFAULT_CHANNEL_CAPACITY);
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

/// Receive datagrams and write them out in queue order.
///
/// Drains whatever is already queued before flushing so back-to-back calls
/// cost one flush.
async fn writer_loop<W>(mut rx: mpsc::Receiver<Bytes>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(d) => d,
            None => return Ok(()),
        };
        writer.write_all(&first).await?;

        while let Ok(next) = rx.try_recv() {
            writer.write_all(&next).await?;
        }
        writer.flush().await?;
    }
}

//! Dedicated writer task for the output path.
//!
//! Every outgoing line (dispatch responses and event notifications alike)
//! goes through one mpsc channel to one task that owns the write half of the
//! stream. A line is a single buffer including its terminator, so lines are
//! written whole and never interleave.
//!
//! # Architecture
//!
//! ```text
//! Read loop ──────┐
//! Pending task 1 ─┼─► mpsc::Sender<OutboundLine> ─► Writer Task ─► stdout
//! Pending task N ─┤
//! Broadcaster ────┘
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::codec::JsonLineCodec;
use crate::error::{AgentwireError, Result};
use crate::protocol::{Response, LINE_TERMINATOR};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Default maximum lines to batch in a single write operation.
pub const DEFAULT_MAX_BATCH_LINES: usize = 64;

/// A complete line ready to be written, terminator included.
#[derive(Debug, Clone)]
pub struct OutboundLine(Bytes);

impl OutboundLine {
    /// Build a line from an encoded message (terminator appended here).
    pub fn new(encoded: &[u8]) -> Self {
        let mut line = BytesMut::with_capacity(encoded.len() + 1);
        line.put_slice(encoded);
        line.put_u8(LINE_TERMINATOR);
        Self(line.freeze())
    }

    /// Encode a response into a line.
    ///
    /// # Errors
    ///
    /// Returns error if the payload cannot be serialized.
    pub fn from_response(response: &Response) -> Result<Self> {
        let encoded = JsonLineCodec::encode(response)?;
        Ok(Self::new(&encoded))
    }

    /// Raw bytes, terminator included.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Total size of this line.
    #[inline]
    pub fn size(&self) -> usize {
        self.0.len()
    }
}

/// What the writer task receives.
#[derive(Debug)]
enum WriterCommand {
    /// Write this line.
    Line(OutboundLine),
    /// Acknowledge once everything queued before this is written.
    Flush(oneshot::Sender<()>),
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for the line queue.
    pub channel_capacity: usize,
    /// Maximum lines coalesced into one write.
    pub max_batch_lines: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_batch_lines: DEFAULT_MAX_BATCH_LINES,
        }
    }
}

/// Handle for sending lines to the writer task.
///
/// This is cheaply cloneable and is shared by every producer of output.
#[derive(Clone)]
pub struct WriterHandle {
    /// Channel sender for lines.
    tx: mpsc::Sender<WriterCommand>,
    /// Lines queued but not yet written.
    pending: Arc<AtomicUsize>,
}

impl WriterHandle {
    /// Queue a line. Waits while the channel is full.
    pub async fn send(&self, line: OutboundLine) -> Result<()> {
        // Increment pending count BEFORE sending
        self.pending.fetch_add(1, Ordering::AcqRel);

        self.tx.send(WriterCommand::Line(line)).await.map_err(|_| {
            self.pending.fetch_sub(1, Ordering::Release);
            AgentwireError::ConnectionClosed
        })
    }

    /// Wait until every line queued before this call has been written.
    pub async fn flush(&self) -> Result<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(WriterCommand::Flush(ack_tx))
            .await
            .map_err(|_| AgentwireError::ConnectionClosed)?;
        ack_rx.await.map_err(|_| AgentwireError::ConnectionClosed)
    }

    /// Encode and queue a response.
    pub async fn send_response(&self, response: &Response) -> Result<()> {
        let line = OutboundLine::from_response(response)?;
        self.send(line).await?;
        tracing::trace!(id = response.id, "response queued");
        Ok(())
    }

    /// Get current pending line count.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Whether the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending lines.
///
/// Returns `(WriterHandle, JoinHandle)`; the task ends once every handle is
/// dropped and the queue is drained, or on the first write error.
pub fn spawn_writer_task<W>(writer: W, config: WriterConfig) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let pending = Arc::new(AtomicUsize::new(0));

    let handle = WriterHandle {
        tx,
        pending: pending.clone(),
    };

    let task = tokio::spawn(writer_loop(rx, writer, pending, config.max_batch_lines.max(1)));

    (handle, task)
}

/// Spawn the writer task with default configuration.
pub fn spawn_writer_task_default<W>(writer: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    spawn_writer_task(writer, WriterConfig::default())
}

/// Main writer loop - receives lines and writes them out in batches.
async fn writer_loop<W>(
    mut rx: mpsc::Receiver<WriterCommand>,
    mut writer: W,
    pending: Arc<AtomicUsize>,
    max_batch: usize,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = BytesMut::new();
    let mut acks = Vec::new();

    loop {
        // Wait for first command
        let first = match rx.recv().await {
            Some(command) => command,
            None => {
                // Channel closed, clean shutdown
                return Ok(());
            }
        };

        buf.clear();
        let mut batch_size = 0;
        let mut push = |command: WriterCommand, buf: &mut BytesMut| match command {
            WriterCommand::Line(line) => {
                buf.put_slice(line.as_bytes());
                batch_size += 1;
            }
            WriterCommand::Flush(ack) => acks.push(ack),
        };

        push(first, &mut buf);

        // Collect additional ready commands (non-blocking)
        for _ in 1..max_batch {
            match rx.try_recv() {
                Ok(command) => push(command, &mut buf),
                Err(_) => break,
            }
        }

        let written = write_batch(&mut writer, &buf).await;
        // The batch leaves the queue whether or not the write succeeded
        pending.fetch_sub(batch_size, Ordering::Release);

        if let Err(e) = written {
            tracing::error!(error = %e, "failed to write output; stopping writer");
            return Err(e);
        }

        for ack in acks.drain(..) {
            let _ = ack.send(());
        }
    }
}

/// Write a batch of complete lines and flush.
async fn write_batch<W>(writer: &mut W, batch: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if batch.is_empty() {
        return Ok(());
    }

    writer.write_all(batch).await?;
    writer.flush().await?;
    Ok(())
}

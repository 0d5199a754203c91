//! Server builder and runtime loop.
//!
//! The [`ServerBuilder`] configures the read and write paths and optionally
//! an agent to bind at start. The [`Server`] manages the lifecycle:
//! 1. Spawn the writer task on the write half
//! 2. Bind the agent (if given) and start its event broadcaster
//! 3. Read lines, decode and dispatch each one
//! 4. On end of input, wait for every owed response, then drop the binding
//!    and drain the output
//!
//! # Example
//!
//! ```no_run
//! use agentwire::{Agent, Server};
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> agentwire::Result<()> {
//!     let agent = Agent::builder()
//!         .method("ping", |_: Vec<Value>| Ok("pong"))
//!         .build();
//!
//!     let server = Server::builder().agent(agent).serve_stdio();
//!     server.wait_for_shutdown().await
//! }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::sync::oneshot;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::agent::Agent;
use crate::broadcaster::spawn_broadcaster;
use crate::codec::JsonLineCodec;
use crate::dispatcher::{Dispatch, Dispatcher};
use crate::error::{AgentwireError, Result};
use crate::protocol::{LineBuffer, Response, DEFAULT_CAPACITY};
use crate::transport::stdio;
use crate::writer::{spawn_writer_task, WriterConfig, WriterHandle};

/// Default size of the buffer each read fills.
pub const DEFAULT_READ_BUFFER_SIZE: usize = DEFAULT_CAPACITY;

/// Settings for the read loop.
#[derive(Debug, Clone, Copy)]
struct ReadConfig {
    buffer_size: usize,
    flush_tail_on_close: bool,
}

/// Event forwarding for one binding.
struct Broadcast {
    task: JoinHandle<usize>,
    stop: CancellationToken,
}

/// Builder for configuring and starting a [`Server`].
pub struct ServerBuilder {
    agent: Option<Agent>,
    writer_config: WriterConfig,
    read_config: ReadConfig,
}

impl ServerBuilder {
    /// Create a new server builder.
    pub fn new() -> Self {
        Self {
            agent: None,
            writer_config: WriterConfig::default(),
            read_config: ReadConfig {
                buffer_size: DEFAULT_READ_BUFFER_SIZE,
                flush_tail_on_close: true,
            },
        }
    }

    /// Bind this agent as soon as the server starts.
    ///
    /// Without one, every request is answered with `[0, null]` until
    /// [`Server::bind`] is called.
    pub fn agent(mut self, agent: Agent) -> Self {
        self.agent = Some(agent);
        self
    }

    /// Set the size of the buffer each read fills.
    ///
    /// Default: 64 KiB
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_config.buffer_size = size;
        self
    }

    /// Whether a final line without a terminator is dispatched at end of
    /// input instead of being discarded.
    ///
    /// Default: true
    pub fn flush_tail_on_close(mut self, flush: bool) -> Self {
        self.read_config.flush_tail_on_close = flush;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 1024
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.writer_config.channel_capacity = capacity;
        self
    }

    /// Set how many queued lines may be coalesced into one write.
    ///
    /// Default: 64
    pub fn max_batch_lines(mut self, lines: usize) -> Self {
        self.writer_config.max_batch_lines = lines;
        self
    }

    /// Start serving on the given duplex stream.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn serve<R, W>(self, reader: R, writer: W) -> Server
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        Server::start(self, reader, writer)
    }

    /// Start serving on the process's stdin/stdout.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn serve_stdio(self) -> Server {
        let (reader, writer) = stdio().into_split();
        self.serve(reader, writer)
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running server.
///
/// Use [`Server::bind`] to attach an agent, and
/// [`Server::wait_for_shutdown`] to block until the input stream ends.
pub struct Server {
    /// Shared with the read loop.
    dispatcher: Arc<Dispatcher>,
    /// Writer handle for sending lines.
    writer: WriterHandle,
    /// Event broadcaster of the current binding.
    broadcaster: Mutex<Option<Broadcast>>,
    /// Outcome of the read loop.
    shutdown_rx: oneshot::Receiver<Result<()>>,
    /// Read loop task handle.
    read_task: JoinHandle<()>,
    /// Writer task handle.
    _writer_task: JoinHandle<Result<()>>,
}

impl Server {
    /// Create a new server builder.
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    fn start<R, W>(builder: ServerBuilder, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let ServerBuilder {
            agent,
            writer_config,
            read_config,
        } = builder;

        let (writer, writer_task) = spawn_writer_task(writer, writer_config);
        let dispatcher = Arc::new(Dispatcher::new());

        // Bind before the first line can be read
        let broadcaster = agent.map(|agent| attach(&dispatcher, &writer, agent));

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let dispatcher_clone = dispatcher.clone();
        let writer_clone = writer.clone();

        let read_task = tokio::spawn(async move {
            let mut responses = JoinSet::new();
            let result = Self::read_loop(
                reader,
                &dispatcher_clone,
                &writer_clone,
                read_config,
                &mut responses,
            )
            .await;
            if let Err(e) = &result {
                tracing::error!(error = %e, "read loop failed");
            }

            // Every request read so far is still owed its response
            if !responses.is_empty() {
                tracing::debug!(owed = responses.len(), "waiting for pending responses");
            }
            while let Some(joined) = responses.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "response task failed");
                }
            }

            let _ = shutdown_tx.send(result);
        });

        Server {
            dispatcher,
            writer,
            broadcaster: Mutex::new(broadcaster),
            shutdown_rx,
            read_task,
            _writer_task: writer_task,
        }
    }

    /// Main read loop - splits input into lines and dispatches each one.
    async fn read_loop<R: AsyncRead + Unpin>(
        mut reader: R,
        dispatcher: &Dispatcher,
        writer: &WriterHandle,
        config: ReadConfig,
        responses: &mut JoinSet<()>,
    ) -> Result<()> {
        let mut lines = LineBuffer::new();
        let mut buf = vec![0u8; config.buffer_size.max(1)];

        loop {
            let n = match reader.read(&mut buf).await {
                Ok(0) => break, // End of input
                Ok(n) => n,
                Err(e) => return Err(AgentwireError::Io(e)),
            };

            for line in lines.push(&buf[..n]) {
                Self::dispatch_line(&line, dispatcher, writer, responses).await;
            }

            // Reap finished response tasks
            while let Some(joined) = responses.try_join_next() {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "response task failed");
                }
            }
        }

        if let Some(tail) = lines.finish() {
            if config.flush_tail_on_close {
                Self::dispatch_line(&tail, dispatcher, writer, responses).await;
            } else {
                tracing::debug!(bytes = tail.len(), "discarding unterminated final line");
            }
        }

        tracing::debug!("input closed");
        Ok(())
    }

    /// Decode one line and dispatch it.
    ///
    /// Ready responses are queued inline, so they keep input order relative
    /// to each other. Pending ones are awaited on a task in `responses`.
    async fn dispatch_line(
        line: &[u8],
        dispatcher: &Dispatcher,
        writer: &WriterHandle,
        responses: &mut JoinSet<()>,
    ) {
        if line.iter().all(u8::is_ascii_whitespace) {
            return;
        }

        let request = match JsonLineCodec::decode(line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    line = %String::from_utf8_lossy(line),
                    "dropping undecodable line"
                );
                return;
            }
        };
        tracing::debug!(id = request.id, function = request.call.function(), "request decoded");

        match dispatcher.dispatch(request) {
            Dispatch::Ready(response) => send_response(writer, &response).await,
            Dispatch::Pending(response) => {
                let writer = writer.clone();
                responses.spawn(async move {
                    let response = response.await;
                    send_response(&writer, &response).await;
                });
            }
        }
    }

    fn lock_broadcaster(&self) -> MutexGuard<'_, Option<Broadcast>> {
        self.broadcaster.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Bind an agent, replacing any previous one.
    ///
    /// Pending work of the previous binding is cancelled. Its broadcaster
    /// forwards the events already raised and then stops; the new agent's
    /// events are forwarded from now on.
    pub fn bind(&self, agent: Agent) {
        let broadcast = attach(&self.dispatcher, &self.writer, agent);
        if let Some(previous) = self.lock_broadcaster().replace(broadcast) {
            previous.stop.cancel();
        }
    }

    /// Drop the current binding. Returns whether one existed.
    ///
    /// Requests arriving afterwards are answered with `[0, null]`.
    pub fn unbind(&self) -> bool {
        if let Some(broadcast) = self.lock_broadcaster().take() {
            broadcast.stop.cancel();
        }
        self.dispatcher.unbind()
    }

    /// Whether an agent is bound.
    pub fn is_bound(&self) -> bool {
        self.dispatcher.is_bound()
    }

    /// The dispatcher shared with the read loop.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Number of operations currently awaiting completion.
    pub fn pending_operations(&self) -> usize {
        self.dispatcher.pending().map_or(0, |pending| pending.len())
    }

    /// Get the number of lines queued but not yet written.
    pub fn pending_lines(&self) -> usize {
        self.writer.pending_count()
    }

    /// Wait for the input stream to end.
    ///
    /// This consumes the server. Once input ends, every request already read
    /// is answered (operations that never resolve keep this waiting; cancel
    /// them first or use [`Server::shutdown`]). Then the binding is dropped
    /// and every line queued so far is written.
    /// Returns the read error if input failed rather than closed.
    pub async fn wait_for_shutdown(mut self) -> Result<()> {
        let result = (&mut self.shutdown_rx)
            .await
            .unwrap_or(Err(AgentwireError::ConnectionClosed));
        self.finish().await;
        result
    }

    /// Stop reading immediately without waiting for owed responses.
    ///
    /// Responses not yet written are abandoned and cancelable operations are
    /// cancelled.
    pub async fn shutdown(self) {
        self.read_task.abort();
        self.finish().await;
    }

    async fn finish(self) {
        let broadcast = self.lock_broadcaster().take();
        self.dispatcher.unbind();

        // Forward events raised before the binding ended
        if let Some(broadcast) = broadcast {
            broadcast.stop.cancel();
            if let Err(e) = broadcast.task.await {
                tracing::error!(error = %e, "event broadcaster failed");
            }
        }

        if let Err(e) = self.writer.flush().await {
            tracing::debug!(error = %e, "output closed before final flush");
        }
    }
}

/// Bind the agent's operations and start forwarding its events.
fn attach(dispatcher: &Dispatcher, writer: &WriterHandle, agent: Agent) -> Broadcast {
    let (operations, events) = agent.into_parts();
    let count = operations.len();

    dispatcher.bind(operations);
    tracing::info!(operations = count, "agent bound");

    let stop = CancellationToken::new();
    Broadcast {
        task: spawn_broadcaster(events, writer.clone(), stop.clone()),
        stop,
    }
}

async fn send_response(writer: &WriterHandle, response: &Response) {
    match writer.send_response(response).await {
        Ok(()) => tracing::debug!(id = response.id, "response sent"),
        Err(e) => tracing::error!(id = response.id, error = %e, "failed to send response"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};

    #[test]
    fn test_builder_configuration() {
        let builder = Server::builder()
            .read_buffer_size(1024)
            .flush_tail_on_close(false)
            .channel_capacity(512)
            .max_batch_lines(8);

        assert_eq!(builder.read_config.buffer_size, 1024);
        assert!(!builder.read_config.flush_tail_on_close);
        assert_eq!(builder.writer_config.channel_capacity, 512);
        assert_eq!(builder.writer_config.max_batch_lines, 8);
        assert!(builder.agent.is_none());
    }

    #[test]
    fn test_builder_default() {
        let builder = ServerBuilder::default();

        assert_eq!(builder.read_config.buffer_size, DEFAULT_READ_BUFFER_SIZE);
        assert!(builder.read_config.flush_tail_on_close);
    }

    #[tokio::test]
    async fn test_bind_and_unbind() {
        let (_host, agent_side) = duplex(4096);
        let (reader, writer) = tokio::io::split(agent_side);
        let server = Server::builder().serve(reader, writer);

        assert!(!server.is_bound());
        server.bind(Agent::builder().method("ping", |_: Vec<Value>| Ok("pong")).build());
        assert!(server.is_bound());
        assert_eq!(server.pending_operations(), 0);

        assert!(server.unbind());
        assert!(!server.is_bound());
        assert!(!server.unbind());
    }

    #[tokio::test]
    async fn test_discards_tail_when_configured() {
        let (host, agent_side) = duplex(4096);
        let (reader, writer) = tokio::io::split(agent_side);
        let server = Server::builder()
            .flush_tail_on_close(false)
            .agent(Agent::builder().method("ping", |_: Vec<Value>| Ok("pong")).build())
            .serve(reader, writer);

        let (host_read, mut host_write) = tokio::io::split(host);
        host_write.write_all(b"[1,{\"func\":\"ping\"}]\n").await.unwrap();
        host_write.write_all(b"[2,{\"func\":\"ping\"}]").await.unwrap();
        host_write.shutdown().await.unwrap();

        server.wait_for_shutdown().await.unwrap();

        let mut lines = BufReader::new(host_read).lines();
        assert_eq!(lines.next_line().await.unwrap().unwrap(), r#"[1,"pong"]"#);
    }
}

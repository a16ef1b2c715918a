use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, instrument, warn};

use crate::constant::QueryType;
use crate::error::{Error, Result};
use crate::protocol::response::{self, Response};
use crate::protocol::{frame, handshake, query};

use super::cursor::WaiterHandle;

/// A connection to the server with one background reader task
///
/// One TCP socket is shared by any number of concurrent logical queries,
/// demultiplexed by their 64-bit token. `Connection` is a cheap-to-clone
/// handle; [`Connection::use_db`] produces an alias over the same socket
/// carrying a different default-database tag, and closing any alias closes
/// the shared connection.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
    db: Option<String>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("db", &self.db).finish()
    }
}

/// Per-token registry entry: the response channel plus the originating term,
/// kept only so errors can annotate the failing subterm.
struct Waiter {
    tx: mpsc::UnboundedSender<Result<Response>>,
    term: Option<Value>,
}

/// The write half behind the write latch. Once poisoned it stays poisoned;
/// the stored message is raised by every subsequent writer.
enum WriteState {
    Open {
        half: OwnedWriteHalf,
        /// Reusable buffer for assembling outgoing frames (reduces heap allocations)
        frame: Vec<u8>,
    },
    Poisoned(String),
}

/// CONTINUE/STOP frames are enqueued here and written by a dedicated pump
/// task, so that a cursor dropped in synchronous code can still emit STOP.
enum Control {
    Continue(u64),
    Stop(u64),
}

pub(super) struct Shared {
    writer: Mutex<WriteState>,
    next_token: AtomicU64,
    waiters: StdMutex<HashMap<u64, Waiter>>,
    control_tx: mpsc::UnboundedSender<Control>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl Connection {
    /// Open a connection and perform the handshake (async)
    ///
    /// # Arguments
    /// * `opts` - Connection options (can be a URL string or an `Opts` struct)
    ///
    /// # Examples
    /// ```rs
    /// // Using a URL string
    /// let conn = Connection::connect("rethinkdb://localhost:28015/heroes").await?;
    ///
    /// // Using an Opts struct
    /// let opts = Opts {
    ///     host: "localhost".to_string(),
    ///     port: 28015,
    ///     ..Default::default()
    /// };
    /// let conn = Connection::connect(opts).await?;
    /// ```
    ///
    /// # Returns
    /// * `Ok(Connection)` - Authorized connection with its reader task running
    /// * `Err(Error)` - DNS, TCP, or handshake failure
    pub async fn connect<O: TryInto<crate::opts::Opts>>(opts: O) -> Result<Self>
    where
        Error: From<O::Error>,
    {
        let opts: crate::opts::Opts = opts.try_into()?;

        if opts.host.is_empty() {
            return Err(Error::BadConfigError(
                "Missing host in connection options".to_string(),
            ));
        }

        let addr = format!("{}:{}", opts.host, opts.port);
        let stream = TcpStream::connect(&addr).await?;
        stream.set_nodelay(opts.tcp_nodelay)?;

        Self::connect_with_stream(stream, &opts).await
    }

    /// Open a connection over an existing TCP stream (async)
    ///
    /// Useful when the caller needs control over socket options before the
    /// handshake runs.
    pub async fn connect_with_stream(mut stream: TcpStream, opts: &crate::opts::Opts) -> Result<Self> {
        let mut hello = Vec::new();
        handshake::write_handshake(&mut hello, opts.auth_key.as_deref().unwrap_or(""));
        stream.write_all(&hello).await?;

        let (read_half, write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let mut reply = Vec::new();
        reader.read_until(0, &mut reply).await?;
        handshake::check_handshake_reply(&reply)?;

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            writer: Mutex::new(WriteState::Open {
                half: write_half,
                frame: Vec::new(),
            }),
            next_token: AtomicU64::new(1),
            waiters: StdMutex::new(HashMap::new()),
            control_tx,
            tasks: StdMutex::new(Vec::new()),
        });

        let reader_task = tokio::spawn(reader_loop(Arc::clone(&shared), reader));
        let control_task = tokio::spawn(control_loop(Arc::clone(&shared), control_rx));
        shared.lock_tasks().extend([reader_task, control_task]);

        Ok(Self {
            shared,
            db: opts.db.clone(),
        })
    }

    /// Alias this connection under a different default-database tag.
    ///
    /// The returned handle shares the socket, token counter, and waiter
    /// registry; only the tag differs. Closing either handle closes the
    /// shared connection.
    pub fn use_db(&self, db: impl Into<String>) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            db: Some(db.into()),
        }
    }

    /// The default-database tag carried by this handle, consulted by the
    /// query-building layer.
    pub fn db(&self) -> Option<&str> {
        self.db.as_deref()
    }

    /// Submit a pre-built query and return the handle to its response stream
    ///
    /// Allocates a fresh token, registers a waiter, and writes the frame
    /// through the write latch. A query whose options object contains
    /// `noreply: true` registers no waiter; its handle reports a synthesized
    /// null result immediately.
    ///
    /// # Arguments
    /// * `query` - The complete query payload shaped by the builder
    /// * `term` - The originating term, kept only to annotate server errors
    #[instrument(skip_all)]
    pub async fn run_query(&self, query: Value, term: Option<Value>) -> Result<WaiterHandle> {
        let token = self.shared.next_token.fetch_add(1, Ordering::Relaxed);
        let payload = serde_json::to_vec(&query)?;

        if query::is_noreply(&query) {
            self.shared.send_frame(token, &payload).await?;
            return Ok(WaiterHandle::ready(token, Arc::clone(&self.shared)));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut waiters = self.shared.lock_waiters();
            let previous = waiters.insert(token, Waiter { tx, term });
            debug_assert!(previous.is_none(), "token reused within a connection");
        }

        if let Err(err) = self.shared.send_frame(token, &payload).await {
            // The server never saw this token; drop the entry without a STOP.
            self.shared.lock_waiters().remove(&token);
            return Err(err);
        }

        Ok(WaiterHandle::streaming(token, rx, Arc::clone(&self.shared)))
    }

    /// Barrier: blocks until all previously issued noreply queries have
    /// committed on the server.
    pub async fn noreply_wait(&self) -> Result<()> {
        let mut handle = self.run_query(query::noreply_wait_query(), None).await?;
        handle.recv().await?;
        Ok(())
    }

    /// Close the connection
    ///
    /// Runs the noreply barrier so outstanding noreply writes commit, then
    /// poisons the write latch, stops the background tasks, and drops every
    /// waiter. Idempotent: a second close observes the poisoned latch and
    /// proceeds straight to teardown.
    pub async fn close(&self) -> Result<()> {
        if let Err(err) = self.noreply_wait().await {
            debug!(%err, "noreply barrier skipped during close");
        }

        {
            let mut latch = self.shared.writer.lock().await;
            if let WriteState::Open { .. } = &*latch {
                *latch = WriteState::Poisoned("connection closed".to_string());
            }
        }

        for task in self.shared.lock_tasks().drain(..) {
            task.abort();
        }
        self.shared.lock_waiters().clear();

        Ok(())
    }
}

impl Shared {
    /// Write one complete frame under the write latch.
    ///
    /// The latch is held across this single frame only, so concurrent
    /// submissions interleave at frame granularity. A write failure poisons
    /// the latch; a poisoned latch raises the stored error without touching
    /// the socket.
    #[instrument(skip_all)]
    async fn send_frame(&self, token: u64, payload: &[u8]) -> Result<()> {
        let mut latch = self.writer.lock().await;
        match &mut *latch {
            WriteState::Open { half, frame } => {
                frame::write_frame(frame, token, payload);
                match half.write_all(frame).await {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        *latch = WriteState::Poisoned(err.to_string());
                        Err(Error::from(err))
                    }
                }
            }
            WriteState::Poisoned(message) => Err(Error::ConnectionError(message.clone())),
        }
    }

    /// Tear the connection down after a reader failure: poison the latch
    /// (dropping the write half) and drop every waiter so blocked consumers
    /// observe the closure.
    async fn fail(&self, err: &Error) {
        let mut latch = self.writer.lock().await;
        if let WriteState::Open { .. } = &*latch {
            *latch = WriteState::Poisoned(err.to_string());
        }
        drop(latch);
        self.lock_waiters().clear();
    }

    /// Route one decoded response to its waiter. Terminal responses remove
    /// the registry entry before the channel send, so no later lookup can
    /// find a finished token.
    fn deliver(&self, token: u64, payload: Value) {
        let mut waiters = self.lock_waiters();
        let Some(waiter) = waiters.get(&token) else {
            // Races with cursor abandonment; the STOP is already in flight.
            debug!(token, "dropping response for unknown token");
            return;
        };
        let response = response::classify(payload, waiter.term.as_ref());
        if response.is_terminal() {
            if let Some(waiter) = waiters.remove(&token) {
                drop(waiters);
                let _ = waiter.tx.send(Ok(response));
            }
        } else {
            let tx = waiter.tx.clone();
            drop(waiters);
            let _ = tx.send(Ok(response));
        }
    }

    /// A payload that fails to decode kills only its own token's stream: the
    /// framing is length-prefixed, so the reader stays in sync.
    fn deliver_decode_error(&self, token: u64, err: serde_json::Error) {
        let Some(waiter) = self.lock_waiters().remove(&token) else {
            debug!(token, "dropping undecodable response for unknown token");
            return;
        };
        let _ = waiter.tx.send(Err(Error::from(err)));
    }

    /// Deregister an abandoned waiter. Emits exactly one STOP iff the stream
    /// was still live (the reader had not already removed the entry).
    pub(super) fn abandon(&self, token: u64) {
        if self.lock_waiters().remove(&token).is_some() {
            let _ = self.control_tx.send(Control::Stop(token));
        }
    }

    pub(super) fn request_continue(&self, token: u64) {
        let _ = self.control_tx.send(Control::Continue(token));
    }

    fn lock_waiters(&self) -> MutexGuard<'_, HashMap<u64, Waiter>> {
        self.waiters.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reader task: exclusively owns the read half and runs until failure.
/// Any read error poisons the connection and fans the closure out to every
/// waiter.
async fn reader_loop(shared: Arc<Shared>, mut stream: BufReader<OwnedReadHalf>) {
    let mut payload = Vec::new();
    loop {
        let token = match frame::read_frame(&mut stream, &mut payload).await {
            Ok(token) => token,
            Err(err) => {
                warn!(%err, "connection reader failed");
                shared.fail(&err).await;
                return;
            }
        };
        match serde_json::from_slice::<Value>(&payload) {
            Ok(value) => shared.deliver(token, value),
            Err(err) => shared.deliver_decode_error(token, err),
        }
    }
}

/// Control pump: writes queued CONTINUE/STOP frames through the same latch
/// as query frames. Channel order keeps a token's CONTINUE ahead of its STOP.
async fn control_loop(shared: Arc<Shared>, mut control_rx: mpsc::UnboundedReceiver<Control>) {
    while let Some(control) = control_rx.recv().await {
        let (token, payload) = match control {
            Control::Continue(token) => (token, query::control_payload(QueryType::Continue)),
            Control::Stop(token) => (token, query::control_payload(QueryType::Stop)),
        };
        if let Err(err) = shared.send_frame(token, &payload).await {
            debug!(%err, token, "dropping control frame for a dead connection");
            return;
        }
    }
}

use std::collections::VecDeque;
use std::sync::Arc;

use core::pin::Pin;
use core::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::protocol::response::Response;

use super::conn::Shared;

/// Consumer end of one token's response stream.
///
/// Dropping the handle before the stream terminates deregisters the waiter
/// and emits one STOP for the token; a handle whose stream already ended
/// cleans up nothing.
pub struct WaiterHandle {
    token: u64,
    source: Source,
    finished: bool,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for WaiterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaiterHandle")
            .field("token", &self.token)
            .field("finished", &self.finished)
            .finish()
    }
}

enum Source {
    /// Live response stream fed by the connection reader.
    Channel(mpsc::UnboundedReceiver<Result<Response>>),
    /// Locally synthesized response (NOREPLY queries).
    Ready(Option<Response>),
}

impl WaiterHandle {
    pub(super) fn streaming(
        token: u64,
        rx: mpsc::UnboundedReceiver<Result<Response>>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            token,
            source: Source::Channel(rx),
            finished: false,
            shared,
        }
    }

    /// Handle for a NOREPLY query: no waiter exists, the null result is
    /// synthesized locally.
    pub(super) fn ready(token: u64, shared: Arc<Shared>) -> Self {
        Self {
            token,
            source: Source::Ready(Some(Response::Single(Value::Null))),
            finished: true,
            shared,
        }
    }

    pub fn token(&self) -> u64 {
        self.token
    }

    pub(crate) fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Result<Response>> {
        match &mut self.source {
            Source::Ready(slot) => Poll::Ready(match slot.take() {
                Some(response) => Ok(response),
                None => Err(closed_error()),
            }),
            Source::Channel(rx) => match rx.poll_recv(cx) {
                Poll::Ready(Some(result)) => {
                    let terminal = match &result {
                        Ok(response) => response.is_terminal(),
                        Err(_) => true,
                    };
                    if terminal {
                        self.finished = true;
                    }
                    Poll::Ready(result)
                }
                Poll::Ready(None) => {
                    // Every sender is gone: the connection was torn down.
                    self.finished = true;
                    Poll::Ready(Err(closed_error()))
                }
                Poll::Pending => Poll::Pending,
            },
        }
    }

    pub(crate) async fn recv(&mut self) -> Result<Response> {
        core::future::poll_fn(|cx| self.poll_recv(cx)).await
    }

    fn request_continue(&self) {
        self.shared.request_continue(self.token);
    }
}

impl Drop for WaiterHandle {
    fn drop(&mut self) {
        if !self.finished {
            self.shared.abandon(self.token);
        }
    }
}

fn closed_error() -> Error {
    Error::ConnectionError("connection closed".to_string())
}

type Transform<A> = Arc<dyn Fn(Value) -> A + Send + Sync>;

/// Buffered pull over one query's response stream.
///
/// Consuming a partial batch arms an implicit CONTINUE which is emitted just
/// before the next fetch, so every partial batch costs exactly one CONTINUE
/// and a terminal response costs none. Errors are sticky: once a call raises,
/// every later call raises the same error.
///
/// `&mut self` on every accessor makes per-cursor calls linearizable.
pub struct Cursor<A = Value> {
    handle: WaiterHandle,
    buffer: VecDeque<Value>,
    exhausted: bool,
    error: Option<Error>,
    needs_continue: bool,
    transform: Transform<A>,
}

impl Cursor<Value> {
    pub fn new(handle: WaiterHandle) -> Self {
        Self {
            handle,
            buffer: VecDeque::new(),
            exhausted: false,
            error: None,
            needs_continue: false,
            transform: Arc::new(|datum: Value| datum),
        }
    }
}

impl<A> Cursor<A> {
    /// Post-compose the element transform.
    pub fn map<B: 'static>(self, op: impl Fn(A) -> B + Send + Sync + 'static) -> Cursor<B>
    where
        A: 'static,
    {
        let Self {
            handle,
            buffer,
            exhausted,
            error,
            needs_continue,
            transform,
        } = self;
        Cursor {
            handle,
            buffer,
            exhausted,
            error,
            needs_continue,
            transform: Arc::new(move |datum: Value| op(transform(datum))),
        }
    }

    /// Next element of the stream, fetching batches on demand.
    ///
    /// # Returns
    /// * `Ok(Some(item))` - The next element
    /// * `Ok(None)` - The stream is exhausted
    /// * `Err(Error)` - The stream failed; re-raised by every later call
    pub async fn next(&mut self) -> Result<Option<A>> {
        loop {
            if let Some(err) = &self.error {
                return Err(err.clone());
            }
            if let Some(datum) = self.buffer.pop_front() {
                return Ok(Some((self.transform)(datum)));
            }
            if self.exhausted {
                return Ok(None);
            }
            self.fetch().await;
        }
    }

    /// Drain the buffered batch, fetching one response first when the buffer
    /// is empty. Never pre-fetches past the current batch; an empty result
    /// with an exhausted cursor means end of stream.
    pub async fn next_batch(&mut self) -> Result<Vec<A>> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        if self.buffer.is_empty() && !self.exhausted {
            self.fetch().await;
            if let Some(err) = &self.error {
                return Err(err.clone());
            }
        }
        let transform = Arc::clone(&self.transform);
        Ok(self.buffer.drain(..).map(|datum| transform(datum)).collect())
    }

    /// Strict collection: buffers the entire remaining stream before
    /// returning. The lazy form is the [`futures_core::Stream`] impl.
    pub async fn collect(&mut self) -> Result<Vec<A>> {
        let mut items = Vec::new();
        loop {
            items.extend(self.next_batch().await?);
            if self.exhausted && self.buffer.is_empty() {
                return Ok(items);
            }
        }
    }

    /// Apply `op` to every element, batch-wise, until exhaustion.
    pub async fn each<F: FnMut(A)>(&mut self, mut op: F) -> Result<()> {
        loop {
            for item in self.next_batch().await? {
                op(item);
            }
            if self.exhausted && self.buffer.is_empty() {
                return Ok(());
            }
        }
    }

    async fn fetch(&mut self) {
        if self.needs_continue {
            self.handle.request_continue();
            self.needs_continue = false;
        }
        let result = self.handle.recv().await;
        self.integrate(result);
    }

    fn integrate(&mut self, result: Result<Response>) {
        match result {
            Ok(Response::Single(datum)) => {
                self.buffer.push_back(datum);
                self.exhausted = true;
            }
            Ok(Response::Batch { partial, datums }) => {
                self.buffer.extend(datums);
                if partial {
                    self.needs_continue = true;
                } else {
                    self.exhausted = true;
                }
            }
            Ok(Response::Error(err)) => self.error = Some(Error::DbError(err)),
            Err(err) => self.error = Some(err),
        }
    }
}

/// The demand-driven (lazy) collection form: batches are fetched only as the
/// consumer advances. A sticky error is yielded on every poll, mirroring
/// [`Cursor::next`].
impl<A> futures_core::Stream for Cursor<A> {
    type Item = Result<A>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            if let Some(err) = &this.error {
                return Poll::Ready(Some(Err(err.clone())));
            }
            if let Some(datum) = this.buffer.pop_front() {
                return Poll::Ready(Some(Ok((this.transform)(datum))));
            }
            if this.exhausted {
                return Poll::Ready(None);
            }
            if this.needs_continue {
                this.handle.request_continue();
                this.needs_continue = false;
            }
            match this.handle.poll_recv(cx) {
                Poll::Ready(result) => this.integrate(result),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

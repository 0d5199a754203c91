//! Result classification for invoked operations.
//!
//! An operation either answers on the spot ([`Outcome::Immediate`]) or hands
//! back work that is still running ([`Outcome::Pending`]). Pending work may
//! carry a [`CancelHandle`]; without one, `cancelRequest` only stops tracking
//! it.

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Boxed future for operation results.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What an invoked operation returned.
pub enum Outcome {
    /// Already resolved; used directly as the response payload.
    Immediate(Value),
    /// Not yet resolved; awaited by the dispatcher.
    Pending(PendingOperation),
}

impl Outcome {
    /// Whether this outcome must be awaited.
    #[inline]
    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending(_))
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Immediate(value) => f.debug_tuple("Immediate").field(value).finish(),
            Outcome::Pending(op) => f.debug_tuple("Pending").field(op).finish(),
        }
    }
}

/// Handle that stops a cancelable pending operation.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    /// Create a fresh, not yet cancelled handle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing token.
    pub fn from_token(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether cancellation was requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// The token the operation observes.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// A not-yet-resolved operation.
pub struct PendingOperation {
    future: BoxFuture<'static, Result<Value>>,
    cancel: Option<CancelHandle>,
}

impl PendingOperation {
    /// Pending work that cannot be cancelled.
    pub fn new<Fut>(future: Fut) -> Self
    where
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            future: Box::pin(future),
            cancel: None,
        }
    }

    /// Pending work that stops when `cancel` fires.
    pub fn cancelable<Fut>(future: Fut, cancel: CancelHandle) -> Self
    where
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        Self {
            future: Box::pin(future),
            cancel: Some(cancel),
        }
    }

    /// Whether `cancelRequest` can actually stop this work.
    #[inline]
    pub fn is_cancelable(&self) -> bool {
        self.cancel.is_some()
    }

    /// Split into the future and its optional cancel handle.
    pub fn into_parts(self) -> (BoxFuture<'static, Result<Value>>, Option<CancelHandle>) {
        (self.future, self.cancel)
    }
}

impl fmt::Debug for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOperation")
            .field("cancelable", &self.is_cancelable())
            .finish_non_exhaustive()
    }
}

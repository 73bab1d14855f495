//! Action records and the dispatch / getState handles
//!
//! The store this crate sits on follows the thunk-middleware convention:
//! `dispatch` accepts either a plain [`ActionRecord`] or a [`Thunk`] that is
//! invoked with `(dispatch, get_state)`.

use std::fmt;
use std::sync::Arc;

use anyhow::Context;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::warn;

/// Type of the action the store dispatches once to bootstrap its state
pub const INIT: &str = "@@INIT";

/// Event name used for recovered thunk failures
pub const ERROR_EVENT: &str = "error";

/// The associative state map, keyed by reducer key
pub type StateMap = Map<String, Value>;

/// Completion of a dispatched thunk
pub type ThunkFuture = BoxFuture<'static, anyhow::Result<()>>;

/// A deferred unit of work, invoked by the store with `(dispatch, get_state)`
pub type Thunk = Box<dyn FnOnce(Dispatch, GetState) -> ThunkFuture + Send>;

/// Build the `actionType/event` string used as a record's `type`
pub fn derived_type(action_type: &str, event: &str) -> String {
    format!("{action_type}/{event}")
}

/// A plain action record as it travels through `dispatch`.
///
/// Serializes to `{"type": .., "payload": ..}`, or
/// `{"type": .., "error": true, "payload": ..}` for error events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub error: bool,
    #[serde(default)]
    pub payload: Value,
}

impl ActionRecord {
    pub fn new(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            error: false,
            payload,
        }
    }

    /// A record flagged as an error
    pub fn error(kind: impl Into<String>, payload: Value) -> Self {
        Self {
            kind: kind.into(),
            error: true,
            payload,
        }
    }

    /// The `@@INIT` bootstrap record
    pub fn init() -> Self {
        Self::new(INIT, Value::Null)
    }

    /// Record type, for logging and filtering
    pub fn name(&self) -> &str {
        &self.kind
    }

    /// One-line rendering for logs
    pub fn summary(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}

/// Anything `dispatch` accepts
pub enum Dispatchable {
    Record(ActionRecord),
    Thunk(Thunk),
}

impl fmt::Debug for Dispatchable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatchable::Record(record) => f.debug_tuple("Record").field(record).finish(),
            Dispatchable::Thunk(_) => f.write_str("Thunk(..)"),
        }
    }
}

impl From<ActionRecord> for Dispatchable {
    fn from(record: ActionRecord) -> Self {
        Dispatchable::Record(record)
    }
}

impl From<Thunk> for Dispatchable {
    fn from(thunk: Thunk) -> Self {
        Dispatchable::Thunk(thunk)
    }
}

/// The receiving end of `dispatch`.
///
/// Records must be applied before `dispatch` returns; the returned future
/// then resolves immediately. Thunks return their own completion.
pub trait Dispatcher: Send + Sync + 'static {
    fn dispatch(self: Arc<Self>, action: Dispatchable) -> ThunkFuture;
}

struct FnDispatcher<F>(F);

impl<F> Dispatcher for FnDispatcher<F>
where
    F: Fn(Dispatchable) -> ThunkFuture + Send + Sync + 'static,
{
    fn dispatch(self: Arc<Self>, action: Dispatchable) -> ThunkFuture {
        (self.0)(action)
    }
}

/// Cloneable `dispatch` handle handed to thunks and listeners
#[derive(Clone)]
pub struct Dispatch(Arc<dyn Dispatcher>);

impl Dispatch {
    pub fn from_dispatcher<D: Dispatcher>(dispatcher: Arc<D>) -> Self {
        Self(dispatcher)
    }

    /// Wrap a closure. It must apply records synchronously.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(Dispatchable) -> ThunkFuture + Send + Sync + 'static,
    {
        Self(Arc::new(FnDispatcher(f)))
    }

    /// Dispatch a record or a thunk
    #[must_use = "a dispatched thunk only runs when its future is polled"]
    pub fn call(&self, action: impl Into<Dispatchable>) -> ThunkFuture {
        Arc::clone(&self.0).dispatch(action.into())
    }

    /// Dispatch a plain record
    pub fn record(&self, record: ActionRecord) {
        // Records are applied synchronously; the completion carries nothing.
        drop(self.call(record));
    }

    /// Dispatch a thunk and get its completion
    #[must_use = "a dispatched thunk only runs when its future is polled"]
    pub fn thunk(&self, thunk: Thunk) -> ThunkFuture {
        self.call(thunk)
    }

    /// Dispatch a thunk from synchronous code and run it on the current
    /// tokio runtime.
    ///
    /// Listeners use this to chain further actions. Fails when called
    /// outside a runtime. A failed thunk is logged at `warn`.
    pub fn spawn(&self, thunk: Thunk) -> anyhow::Result<JoinHandle<anyhow::Result<()>>> {
        let handle = Handle::try_current().context("spawning a thunk requires a tokio runtime")?;
        let run = self.thunk(thunk);
        Ok(handle.spawn(async move {
            let result = run.await;
            if let Err(error) = &result {
                warn!(error = %format!("{error:#}"), "spawned thunk failed");
            }
            result
        }))
    }
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch").finish_non_exhaustive()
    }
}

/// Cloneable `getState` handle returning the current state snapshot
#[derive(Clone)]
pub struct GetState(Arc<dyn Fn() -> StateMap + Send + Sync>);

impl GetState {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> StateMap + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    /// Snapshot of the current state
    pub fn get(&self) -> StateMap {
        (self.0)()
    }
}

impl fmt::Debug for GetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GetState").finish_non_exhaustive()
    }
}

/// Completion for dispatches that finish synchronously
pub(crate) fn settled() -> ThunkFuture {
    futures::future::ready(Ok(())).boxed()
}

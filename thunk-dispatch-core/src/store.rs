//! State store with thunk-middleware dispatch

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use crate::action::{
    settled, ActionRecord, Dispatch, Dispatchable, Dispatcher, GetState, StateMap, ThunkFuture,
};
use crate::reducer::RootReducer;

/// Centralized state store following the thunk-middleware convention
///
/// Records are reduced synchronously through the [`RootReducer`]; thunks
/// are invoked with the store's own [`Dispatch`] and [`GetState`]. The
/// store dispatches `@@INIT` once on construction.
///
/// # Example
/// ```
/// use serde_json::json;
/// use thunk_dispatch_core::{ActionRecord, Registry, Store};
///
/// let registry = Registry::new();
/// let store = Store::new(registry.create_reducer(json!({"User": {}})).unwrap());
/// assert_eq!(store.state()["User"], json!({}));
///
/// // Nothing handles this type; state is untouched
/// drop(store.dispatch(ActionRecord::new("noise", json!(1))));
/// assert_eq!(store.state()["User"], json!({}));
/// ```
pub struct Store<M = NoopMiddleware> {
    inner: Arc<StoreInner<M>>,
}

struct StoreInner<M> {
    state: Mutex<StateMap>,
    reducer: RootReducer,
    middleware: Mutex<M>,
}

impl Store<NoopMiddleware> {
    /// Create a store around `reducer`
    pub fn new(reducer: RootReducer) -> Self {
        Self::with_middleware(reducer, NoopMiddleware)
    }
}

impl<M: Middleware + Send + 'static> Store<M> {
    /// Create a store whose middleware sees every reduced record
    pub fn with_middleware(reducer: RootReducer, middleware: M) -> Self {
        let inner = Arc::new(StoreInner {
            state: Mutex::new(StateMap::new()),
            reducer,
            middleware: Mutex::new(middleware),
        });
        inner.apply(ActionRecord::init());
        Self { inner }
    }

    /// Dispatch a record or a thunk.
    ///
    /// Records are applied before this returns; the future only matters
    /// for thunks.
    #[must_use = "a dispatched thunk only runs when its future is polled"]
    pub fn dispatch(&self, action: impl Into<Dispatchable>) -> ThunkFuture {
        Arc::clone(&self.inner).dispatch(action.into())
    }

    /// The `dispatch` handle thunks receive
    pub fn dispatcher(&self) -> Dispatch {
        Dispatch::from_dispatcher(Arc::clone(&self.inner))
    }

    /// The `getState` handle thunks receive
    pub fn getter(&self) -> GetState {
        StoreInner::getter(&self.inner)
    }

    /// Snapshot of the current state
    pub fn state(&self) -> StateMap {
        self.inner.snapshot()
    }

    pub fn reducer(&self) -> &RootReducer {
        &self.inner.reducer
    }

    /// Lock and borrow the middleware
    pub fn middleware(&self) -> MutexGuard<'_, M> {
        self.inner
            .middleware
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<M> Clone for Store<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Middleware + Send + 'static> StoreInner<M> {
    fn apply(&self, record: ActionRecord) {
        let mut middleware = self
            .middleware
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        middleware.before(&record);

        let changed = self.reduce(&record);
        middleware.after(&record, changed);
    }

    /// Reduce `record` into the state and report whether it changed.
    ///
    /// The stored state is only replaced once every handler has returned.
    fn reduce(&self, record: &ActionRecord) -> bool {
        if !self.reducer.handles(&record.kind) {
            return false;
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let next = self.reducer.reduce(state.clone(), record);
        if next == *state {
            return false;
        }
        *state = next;
        true
    }

    fn snapshot(&self) -> StateMap {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn getter(this: &Arc<Self>) -> GetState {
        let inner = Arc::clone(this);
        GetState::new(move || inner.snapshot())
    }
}

impl<M: Middleware + Send + 'static> Dispatcher for StoreInner<M> {
    fn dispatch(self: Arc<Self>, action: Dispatchable) -> ThunkFuture {
        match action {
            Dispatchable::Record(record) => {
                trace!(action = %record.kind, "dispatch record");
                self.apply(record);
                settled()
            }
            Dispatchable::Thunk(thunk) => {
                trace!("dispatch thunk");
                let get_state = Self::getter(&self);
                thunk(Dispatch::from_dispatcher(self), get_state)
            }
        }
    }
}

/// Middleware trait for observing reduced records
///
/// Implement this trait to add logging, persistence, or other
/// cross-cutting concerns to your store. Thunks are not seen here; only
/// the records they emit.
pub trait Middleware {
    /// Called before the record is reduced
    fn before(&mut self, record: &ActionRecord);

    /// Called after the record is reduced
    fn after(&mut self, record: &ActionRecord, state_changed: bool);
}

/// A no-op middleware that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMiddleware;

impl Middleware for NoopMiddleware {
    fn before(&mut self, _record: &ActionRecord) {}
    fn after(&mut self, _record: &ActionRecord, _state_changed: bool) {}
}

/// Middleware that logs records (for debugging)
#[derive(Debug, Clone, Default)]
pub struct LoggingMiddleware {
    /// Whether to log before dispatch
    pub log_before: bool,
    /// Whether to log after dispatch
    pub log_after: bool,
}

impl LoggingMiddleware {
    /// Create a new logging middleware with default settings (log after only)
    pub fn new() -> Self {
        Self {
            log_before: false,
            log_after: true,
        }
    }

    /// Create a logging middleware that logs both before and after
    pub fn verbose() -> Self {
        Self {
            log_before: true,
            log_after: true,
        }
    }
}

impl Middleware for LoggingMiddleware {
    fn before(&mut self, record: &ActionRecord) {
        if self.log_before {
            tracing::debug!(action = %record.name(), error = record.error, "Dispatching action");
        }
    }

    fn after(&mut self, record: &ActionRecord, state_changed: bool) {
        if self.log_after {
            tracing::debug!(
                action = %record.name(),
                state_changed = state_changed,
                "Action processed"
            );
        }
    }
}

/// Compose multiple middleware into a single middleware
#[derive(Default)]
pub struct ComposedMiddleware {
    middlewares: Vec<Box<dyn Middleware + Send>>,
}

impl std::fmt::Debug for ComposedMiddleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComposedMiddleware")
            .field("middlewares_count", &self.middlewares.len())
            .finish()
    }
}

impl ComposedMiddleware {
    /// Create a new composed middleware
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a middleware to the composition
    pub fn add<M: Middleware + Send + 'static>(&mut self, middleware: M) {
        self.middlewares.push(Box::new(middleware));
    }
}

impl Middleware for ComposedMiddleware {
    fn before(&mut self, record: &ActionRecord) {
        for middleware in &mut self.middlewares {
            middleware.before(record);
        }
    }

    fn after(&mut self, record: &ActionRecord, state_changed: bool) {
        // Call in reverse order for proper nesting
        for middleware in self.middlewares.iter_mut().rev() {
            middleware.after(record, state_changed);
        }
    }
}

//! Core types for thunk-dispatch
//!
//! This crate layers event-emitting async actions and keyed reducers over a
//! thunk-middleware store.
//!
//! # Core Concepts
//!
//! - **Registry**: owns the set of action types and the reducer table
//! - **ActionBuilder**: declares an action, its event listeners and reducers
//! - **ActionCreator**: turns arguments into a dispatchable thunk
//! - **EventEmitter**: dispatches `<actionType>/<event>` records and fans out to listeners
//! - **RootReducer**: routes each record to the keyed substate handlers registered for it
//!
//! # Basic Example
//!
//! ```
//! use serde_json::{json, Value};
//! use thunk_dispatch_core::prelude::*;
//!
//! let registry = Registry::new();
//! let load = registry
//!     .action("user", |id: Value| {
//!         Ok(inner_thunk(move |emit, _get_state| async move {
//!             emit.emit("loaded", json!({ "id": id }))
//!         }))
//!     })?
//!     .on_reducer("loaded", "User", |_user, payload| payload.clone())?
//!     .seal();
//!
//! let store = Store::new(registry.create_reducer(json!({ "User": {} }))?);
//!
//! let runtime = tokio::runtime::Builder::new_current_thread().build()?;
//! runtime.block_on(store.dispatch(load.create(json!(7))?))?;
//! assert_eq!(store.state()["User"], json!({ "id": 7 }));
//! # anyhow::Ok(())
//! ```
//!
//! # Failures
//!
//! A failing inner thunk never rejects. The failure is dispatched as an
//! `<actionType>/error` record with `error: true` and handed to the `error`
//! listeners. Raise [`HandlerFailure`] to choose the payload verbatim.

pub mod action;
pub mod builder;
pub mod emitter;
pub mod error;
pub mod logger;
pub mod reducer;
pub mod registry;
pub mod store;
pub mod testing;
pub mod validate;

// Record and dispatch exports
pub use action::{
    derived_type, ActionRecord, Dispatch, Dispatchable, Dispatcher, GetState, StateMap, Thunk,
    ThunkFuture, ERROR_EVENT, INIT,
};

// Builder exports
pub use builder::{
    inner_thunk, ActionBuilder, ActionCreator, ActionHandler, InnerFuture, InnerThunk,
    Registration,
};
pub use emitter::{EmissionContext, EventEmitter, Listener, ListenerMap};
pub use error::{error_payload, ActionError, HandlerFailure};

// Registry and reducer exports
pub use reducer::{create_reducer, RootReducer};
pub use registry::{ActionRegistry, ReducerFn, ReducerRegistry, Registry};

// Store exports
pub use store::{ComposedMiddleware, LoggingMiddleware, Middleware, NoopMiddleware, Store};

pub use logger::{
    glob_match, ActionLog, ActionLogConfig, ActionLogEntry, ActionLoggerConfig,
    ActionLoggerMiddleware,
};
pub use testing::{RecordingMiddleware, TestHarness};
pub use validate::{check_type, ValidationError, ValueKind};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::action::{ActionRecord, Dispatch, GetState, StateMap, Thunk};
    pub use crate::builder::{inner_thunk, ActionBuilder, ActionCreator, Registration};
    pub use crate::emitter::{EmissionContext, EventEmitter};
    pub use crate::error::{ActionError, HandlerFailure};
    pub use crate::reducer::RootReducer;
    pub use crate::registry::Registry;
    pub use crate::store::{Middleware, Store};
}

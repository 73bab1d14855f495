//! thunk-dispatch: event-emitting async actions for thunk-style stores
//!
//! Declare an action once, attach listeners and keyed reducers to its
//! events, and dispatch it like any other thunk. Every emitted event
//! becomes an `<actionType>/<event>` record, and the root reducer routes
//! it to the substates that registered for it.
//!
//! # Example
//! ```
//! use serde_json::{json, Value};
//! use thunk_dispatch::prelude::*;
//!
//! let registry = Registry::new();
//! let save = registry
//!     .action("draft/save", |text: Value| {
//!         Ok(inner_thunk(move |emit, _get_state| async move {
//!             emit.emit("saving", Value::Null)?;
//!             emit.emit("saved", text)
//!         }))
//!     })?
//!     .on_reducer("saving", "Draft", |draft, _| json!({ "text": draft["text"], "busy": true }))?
//!     .on_reducer("saved", "Draft", |_, text| json!({ "text": text, "busy": false }))?
//!     .seal();
//!
//! let store = Store::new(registry.create_reducer(json!({ "Draft": {} }))?);
//! let runtime = tokio::runtime::Builder::new_current_thread().build()?;
//! runtime.block_on(store.dispatch(save.create(json!("hello"))?))?;
//!
//! assert_eq!(store.state()["Draft"], json!({ "text": "hello", "busy": false }));
//! # anyhow::Ok(())
//! ```

// Re-export everything from core
pub use thunk_dispatch_core::*;

/// Prelude for convenient imports
pub mod prelude {
    // Declaring actions
    pub use thunk_dispatch_core::{
        inner_thunk, ActionBuilder, ActionCreator, ActionError, EmissionContext, EventEmitter,
        HandlerFailure, Registration, Registry,
    };

    // Dispatch and state
    pub use thunk_dispatch_core::{
        ActionRecord, Dispatch, GetState, Middleware, RootReducer, StateMap, Store, Thunk,
    };

    // Logging
    pub use thunk_dispatch_core::{ActionLoggerConfig, ActionLoggerMiddleware};
}

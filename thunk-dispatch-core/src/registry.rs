//! Action-type and reducer registries
//!
//! Both registries are cheap, cloneable handles onto shared tables. They are
//! written while actions are being declared (construction and `on_*` calls)
//! and only read once dispatching starts.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;
use tracing::debug;

use crate::builder::{ActionBuilder, ActionHandler, InnerThunk};
use crate::error::ActionError;
use crate::reducer::{create_reducer, RootReducer};

/// Keyed substate handler: `(substate, payload) -> substate`
pub type ReducerFn = Arc<dyn Fn(Value, &Value) -> Value + Send + Sync>;

/// Set of every action type declared against this registry
#[derive(Clone, Default)]
pub struct ActionRegistry {
    types: Arc<RwLock<HashSet<String>>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim an action type. Claims are permanent.
    pub fn register(&self, action_type: &str) -> Result<(), ActionError> {
        let mut types = self.types.write().unwrap_or_else(PoisonError::into_inner);
        if !types.insert(action_type.to_string()) {
            return Err(ActionError::DuplicateActionType(action_type.to_string()));
        }
        debug!(action_type, "registered action type");
        Ok(())
    }

    pub fn contains(&self, action_type: &str) -> bool {
        self.types
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(action_type)
    }

    pub fn len(&self) -> usize {
        self.types.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("types_count", &self.len())
            .finish()
    }
}

/// Derived action type -> reducer key -> handler
#[derive(Clone, Default)]
pub struct ReducerRegistry {
    table: Arc<RwLock<HashMap<String, HashMap<String, ReducerFn>>>>,
}

impl ReducerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `reducer_key` on `derived_type`.
    ///
    /// At most one handler per `(derived_type, reducer_key)` pair.
    pub fn add(
        &self,
        derived_type: &str,
        reducer_key: &str,
        handler: ReducerFn,
    ) -> Result<(), ActionError> {
        let mut table = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let handlers = table.entry(derived_type.to_string()).or_default();
        if handlers.contains_key(reducer_key) {
            return Err(ActionError::DuplicateReducer {
                derived_type: derived_type.to_string(),
                reducer_key: reducer_key.to_string(),
            });
        }
        handlers.insert(reducer_key.to_string(), handler);
        debug!(derived_type, reducer_key, "registered reducer");
        Ok(())
    }

    /// Whether any handler is registered for `derived_type`
    pub fn contains(&self, derived_type: &str) -> bool {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(derived_type)
            .is_some_and(|handlers| !handlers.is_empty())
    }

    /// Reducer keys with a handler for `derived_type`, sorted
    pub fn keys(&self, derived_type: &str) -> Vec<String> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = table
            .get(derived_type)
            .map(|handlers| handlers.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Snapshot of the handlers for `derived_type`.
    ///
    /// The lock is released before the caller runs any handler.
    pub(crate) fn handlers(&self, derived_type: &str) -> Option<Vec<(String, ReducerFn)>> {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        table.get(derived_type).map(|handlers| {
            handlers
                .iter()
                .map(|(key, handler)| (key.clone(), Arc::clone(handler)))
                .collect()
        })
    }
}

impl fmt::Debug for ReducerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("ReducerRegistry")
            .field("derived_types", &table.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// The pair of registries one family of actions and its reducer share.
///
/// # Example
/// ```
/// use serde_json::json;
/// use thunk_dispatch_core::{inner_thunk, Registry};
///
/// let registry = Registry::new();
/// let load = registry
///     .action("user", |_args| {
///         Ok(inner_thunk(|emit, _get_state| async move {
///             emit.emit("loaded", json!({"name": "ada"}))
///         }))
///     })
///     .unwrap()
///     .on_reducer("loaded", "User", |_user, payload| payload.clone())
///     .unwrap()
///     .seal();
///
/// let reducer = registry.create_reducer(json!({})).unwrap();
/// assert_eq!(load.action_type(), "user");
/// assert!(reducer.handles("user/loaded"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct Registry {
    actions: ActionRegistry,
    reducers: ReducerRegistry,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> &ActionRegistry {
        &self.actions
    }

    pub fn reducers(&self) -> &ReducerRegistry {
        &self.reducers
    }

    /// Declare a new action. Fails if `action_type` is taken.
    pub fn action<H>(
        &self,
        action_type: impl Into<String>,
        handler: H,
    ) -> Result<ActionBuilder, ActionError>
    where
        H: Fn(Value) -> anyhow::Result<InnerThunk> + Send + Sync + 'static,
    {
        let handler: ActionHandler = Arc::new(handler);
        ActionBuilder::new(self, action_type, handler)
    }

    /// Build the top-level reducer over this registry's reducer table
    pub fn create_reducer(&self, default_state: Value) -> Result<RootReducer, ActionError> {
        create_reducer(&self.reducers, default_state)
    }
}

//! Top-level reducer folding keyed handlers over the state map

use std::fmt;

use serde_json::{Map, Value};
use tracing::trace;

use crate::action::{ActionRecord, StateMap, INIT};
use crate::error::ActionError;
use crate::registry::ReducerRegistry;
use crate::validate::{ValidationError, ValueKind};

/// Build the top-level reducer for every keyed handler in `reducers`.
///
/// `default_state` must be a JSON object; it becomes the state on `@@INIT`.
/// Handlers registered after this call are still picked up.
pub fn create_reducer(
    reducers: &ReducerRegistry,
    default_state: Value,
) -> Result<RootReducer, ActionError> {
    let default_state = match default_state {
        Value::Object(map) => map,
        other => {
            let err = ValidationError::mismatch(&other, ValueKind::Object, "default state");
            return Err(ActionError::InvalidDefaultState(err));
        }
    };

    Ok(RootReducer {
        default_state,
        reducers: reducers.clone(),
    })
}

/// Pure `(state, record) -> state` function over a [`StateMap`]
#[derive(Clone)]
pub struct RootReducer {
    default_state: StateMap,
    reducers: ReducerRegistry,
}

impl RootReducer {
    /// Reduce one record.
    ///
    /// - `@@INIT` replaces the state with the default state.
    /// - A type with no handlers hands `state` back untouched.
    /// - Otherwise each registered key is replaced by its handler's output,
    ///   fed the key's current substate (or `{}`) and the record payload.
    pub fn reduce(&self, state: StateMap, record: &ActionRecord) -> StateMap {
        if record.kind == INIT {
            return self.default_state.clone();
        }

        let Some(handlers) = self.reducers.handlers(&record.kind) else {
            return state;
        };

        trace!(action = %record.kind, keys = handlers.len(), "reducing");
        handlers
            .into_iter()
            .fold(state, |mut state, (key, handler)| {
                let substate = state
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| Value::Object(Map::new()));
                let next = handler(substate, &record.payload);
                state.insert(key, next);
                state
            })
    }

    /// Whether reducing `kind` can change the state
    pub fn handles(&self, kind: &str) -> bool {
        kind == INIT || self.reducers.contains(kind)
    }

    pub fn default_state(&self) -> &StateMap {
        &self.default_state
    }
}

impl fmt::Debug for RootReducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RootReducer")
            .field("default_state", &self.default_state)
            .field("reducers", &self.reducers)
            .finish()
    }
}

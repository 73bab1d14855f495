//! Error types for action registration and execution

use serde_json::{json, Value};
use thiserror::Error;

use crate::validate::ValidationError;

/// Errors raised while declaring, sealing or invoking actions.
///
/// None of these are recovered internally; they surface to whoever called
/// the builder, registry or action creator. Failures *inside* a running
/// thunk are a different channel: they become `error` events.
#[derive(Debug, Error)]
pub enum ActionError {
    /// The action type was already registered
    #[error("Duplicate action type '{0}'.")]
    DuplicateActionType(String),

    /// The reducer key already has a handler for this derived type
    #[error("Duplicate '{reducer_key}' reducer handler for '{derived_type}'.")]
    DuplicateReducer {
        derived_type: String,
        reducer_key: String,
    },

    /// Registration attempted after `seal()`
    #[error("Can't add listeners after action '{0}' has been sealed.")]
    Sealed(String),

    /// The action handler refused to produce a thunk
    #[error("Action handler for '{action_type}' did not produce a thunk: {source}")]
    InvalidThunk {
        action_type: String,
        #[source]
        source: anyhow::Error,
    },

    /// `create_reducer` was given something other than a map
    #[error("Invalid default state: {0}")]
    InvalidDefaultState(#[source] ValidationError),
}

/// A thunk failure that carries its own error-event payload.
///
/// Returning this from an inner thunk makes the dispatched
/// `<type>/error` record carry exactly the wrapped value. Any other error
/// is rendered as `{"message": "<error chain>"}`.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("action failed: {0}")]
pub struct HandlerFailure(pub Value);

/// Payload dispatched for a recovered thunk failure
pub fn error_payload(error: &anyhow::Error) -> Value {
    match error.downcast_ref::<HandlerFailure>() {
        Some(HandlerFailure(value)) => value.clone(),
        None => json!({ "message": format!("{error:#}") }),
    }
}

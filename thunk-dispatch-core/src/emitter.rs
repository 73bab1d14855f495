//! Per-invocation event emitter
//!
//! Each run of an action's thunk gets a fresh [`EventEmitter`]. Emitting an
//! event dispatches a `<actionType>/<event>` record and then runs the
//! listeners registered for that event, in registration order, with one
//! [`EmissionContext`] shared across the whole run.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::debug;

use crate::action::{derived_type, ActionRecord, Dispatch, GetState, ERROR_EVENT};
use crate::error::error_payload;

/// Event listener: `(payload, dispatch, get_state, context)`
pub type Listener = Arc<
    dyn Fn(&Value, &Dispatch, &GetState, &mut EmissionContext) -> anyhow::Result<()>
        + Send
        + Sync,
>;

/// Event name -> listeners, in registration order
pub type ListenerMap = HashMap<String, Vec<Listener>>;

/// Scratch space shared by every listener within one action run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EmissionContext {
    values: HashMap<String, Value>,
}

impl EmissionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Turns named events into dispatched records and listener calls.
///
/// Clones share the same context.
#[derive(Clone)]
pub struct EventEmitter {
    action_type: Arc<str>,
    dispatch: Dispatch,
    get_state: GetState,
    listeners: Arc<ListenerMap>,
    context: Arc<Mutex<EmissionContext>>,
}

impl EventEmitter {
    pub fn new(
        dispatch: Dispatch,
        get_state: GetState,
        listeners: Arc<ListenerMap>,
        action_type: impl Into<Arc<str>>,
    ) -> Self {
        Self {
            action_type: action_type.into(),
            dispatch,
            get_state,
            listeners,
            context: Arc::new(Mutex::new(EmissionContext::new())),
        }
    }

    /// Emit `event` with `payload`.
    ///
    /// Dispatches `{type: "<actionType>/<event>", payload}` (flagged as an
    /// error for the `error` event), then calls each listener for `event`
    /// in order. The first listener error stops the fan-out and is returned.
    pub fn emit(&self, event: &str, payload: Value) -> anyhow::Result<()> {
        let kind = derived_type(&self.action_type, event);
        debug!(action = %kind, "emit");

        let record = if event == ERROR_EVENT {
            ActionRecord::error(kind, payload.clone())
        } else {
            ActionRecord::new(kind, payload.clone())
        };
        self.dispatch.record(record);

        let Some(listeners) = self.listeners.get(event) else {
            return Ok(());
        };

        let mut context = self.context.lock().unwrap_or_else(PoisonError::into_inner);
        for listener in listeners {
            listener(&payload, &self.dispatch, &self.get_state, &mut *context)?;
        }
        Ok(())
    }

    /// Emit the `error` event for a failed run
    pub fn emit_error(&self, error: &anyhow::Error) -> anyhow::Result<()> {
        self.emit(ERROR_EVENT, error_payload(error))
    }

    pub fn action_type(&self) -> &str {
        &self.action_type
    }

    pub fn dispatch(&self) -> &Dispatch {
        &self.dispatch
    }

    pub fn get_state(&self) -> &GetState {
        &self.get_state
    }

    /// Copy of the shared context as it stands
    pub fn context(&self) -> EmissionContext {
        self.context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("action_type", &self.action_type)
            .field("events", &self.listeners.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{settled, Dispatchable, StateMap};
    use crate::error::HandlerFailure;
    use serde_json::json;

    fn recording_dispatch() -> (Dispatch, Arc<Mutex<Vec<ActionRecord>>>) {
        let records = Arc::new(Mutex::new(Vec::new()));
        let sink = records.clone();
        let dispatch = Dispatch::from_fn(move |action| {
            if let Dispatchable::Record(record) = action {
                sink.lock().unwrap().push(record);
            }
            settled()
        });
        (dispatch, records)
    }

    fn listener<F>(f: F) -> Listener
    where
        F: Fn(&Value, &Dispatch, &GetState, &mut EmissionContext) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(f)
    }

    #[test]
    fn test_emit_without_listeners_only_dispatches() {
        let (dispatch, records) = recording_dispatch();
        let emitter = EventEmitter::new(
            dispatch,
            GetState::new(StateMap::new),
            Arc::new(ListenerMap::new()),
            "user",
        );

        emitter.emit("loaded", json!({"id": 1})).unwrap();

        assert_eq!(
            *records.lock().unwrap(),
            vec![ActionRecord::new("user/loaded", json!({"id": 1}))]
        );
    }

    #[test]
    fn test_error_event_is_flagged() {
        let (dispatch, records) = recording_dispatch();
        let emitter = EventEmitter::new(
            dispatch,
            GetState::new(StateMap::new),
            Arc::new(ListenerMap::new()),
            "user",
        );

        let failure = anyhow::Error::new(HandlerFailure(json!("boom")));
        emitter.emit_error(&failure).unwrap();

        assert_eq!(
            *records.lock().unwrap(),
            vec![ActionRecord::error("user/error", json!("boom"))]
        );
    }

    #[test]
    fn test_listeners_run_in_order_after_dispatch() {
        let (dispatch, records) = recording_dispatch();
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut map = ListenerMap::new();
        for tag in ["first", "second"] {
            let order = order.clone();
            let records = records.clone();
            map.entry("tick".to_string())
                .or_default()
                .push(listener(move |payload, _, _, _| {
                    // The record is already dispatched when listeners run
                    assert_eq!(records.lock().unwrap().len(), 1);
                    order.lock().unwrap().push((tag, payload.clone()));
                    Ok(())
                }));
        }

        let emitter =
            EventEmitter::new(dispatch, GetState::new(StateMap::new), Arc::new(map), "clock");
        emitter.emit("tick", json!(3)).unwrap();

        assert_eq!(
            *order.lock().unwrap(),
            vec![("first", json!(3)), ("second", json!(3))]
        );
    }

    #[test]
    fn test_context_is_shared_across_events() {
        let (dispatch, _records) = recording_dispatch();
        let seen = Arc::new(Mutex::new(None));

        let mut map = ListenerMap::new();
        map.insert(
            "start".into(),
            vec![listener(|payload, _, _, context| {
                context.insert("token", payload.clone());
                Ok(())
            })],
        );
        let sink = seen.clone();
        map.insert(
            "finish".into(),
            vec![listener(move |_, _, _, context| {
                *sink.lock().unwrap() = context.get("token").cloned();
                Ok(())
            })],
        );

        let emitter =
            EventEmitter::new(dispatch, GetState::new(StateMap::new), Arc::new(map), "job");
        emitter.emit("start", json!("abc")).unwrap();
        emitter.emit("finish", Value::Null).unwrap();

        assert_eq!(*seen.lock().unwrap(), Some(json!("abc")));
        assert_eq!(emitter.context().get("token"), Some(&json!("abc")));
    }

    #[test]
    fn test_listener_error_stops_fan_out() {
        let (dispatch, _records) = recording_dispatch();
        let calls = Arc::new(Mutex::new(0));

        let counter = calls.clone();
        let map = ListenerMap::from([(
            "go".to_string(),
            vec![
                listener(|_, _, _, _| anyhow::bail!("listener broke")),
                listener(move |_, _, _, _| {
                    *counter.lock().unwrap() += 1;
                    Ok(())
                }),
            ],
        )]);

        let emitter =
            EventEmitter::new(dispatch, GetState::new(StateMap::new), Arc::new(map), "job");
        let err = emitter.emit("go", Value::Null).unwrap_err();

        assert_eq!(err.to_string(), "listener broke");
        assert_eq!(*calls.lock().unwrap(), 0);
    }
}

//! Declaring actions: draft builder and sealed action creator
//!
//! An [`ActionBuilder`] is the mutable draft. Listeners and keyed reducers
//! are attached with [`ActionBuilder::on`] (or the `on_event` / `on_reducer`
//! shortcuts), then [`ActionBuilder::seal`] freezes the registrations and
//! hands back an [`ActionCreator`].
//!
//! # Example
//!
//! ```
//! use serde_json::{json, Value};
//! use thunk_dispatch_core::{inner_thunk, Registry, Store};
//!
//! # tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(async {
//! let registry = Registry::new();
//! let rename = registry
//!     .action("user/rename", |args: Value| {
//!         Ok(inner_thunk(move |emit, _get_state| async move {
//!             emit.emit("renamed", args)
//!         }))
//!     })?
//!     .on_reducer("renamed", "User", |user, name| json!({ "name": name, "was": user }))?
//!     .seal();
//!
//! let store = Store::new(registry.create_reducer(json!({ "User": {} }))?);
//! store.dispatch(rename.create(json!("ada"))?).await?;
//!
//! assert_eq!(store.state()["User"], json!({ "name": "ada", "was": {} }));
//! # anyhow::Ok(())
//! # }).unwrap();
//! ```

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::action::{derived_type, Dispatch, GetState, Thunk};
use crate::emitter::{EmissionContext, EventEmitter, Listener, ListenerMap};
use crate::error::ActionError;
use crate::registry::{ReducerFn, ReducerRegistry, Registry};

/// Completion of an inner thunk. `Err` becomes an `error` event.
pub type InnerFuture = BoxFuture<'static, anyhow::Result<()>>;

/// The action body, run with `(emit, get_state)`
pub type InnerThunk = Box<dyn FnOnce(EventEmitter, GetState) -> InnerFuture + Send>;

/// Maps action-creator arguments to an inner thunk
pub type ActionHandler = Arc<dyn Fn(Value) -> anyhow::Result<InnerThunk> + Send + Sync>;

/// Box an async closure as an [`InnerThunk`]
pub fn inner_thunk<F, Fut>(f: F) -> InnerThunk
where
    F: FnOnce(EventEmitter, GetState) -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Box::new(move |emit, get_state| f(emit, get_state).boxed())
}

/// One thing to attach to an action before sealing
pub enum Registration {
    /// Call `listener` whenever `event` is emitted
    Listener { event: String, listener: Listener },
    /// Fold `handler` into substate `key` whenever `event` is dispatched
    Reducer {
        event: String,
        key: String,
        handler: ReducerFn,
    },
}

impl Registration {
    pub fn listener<F>(event: impl Into<String>, listener: F) -> Self
    where
        F: Fn(&Value, &Dispatch, &GetState, &mut EmissionContext) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        Registration::Listener {
            event: event.into(),
            listener: Arc::new(listener),
        }
    }

    pub fn reducer<F>(event: impl Into<String>, key: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value, &Value) -> Value + Send + Sync + 'static,
    {
        Registration::Reducer {
            event: event.into(),
            key: key.into(),
            handler: Arc::new(handler),
        }
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Registration::Listener { event, .. } => {
                f.debug_struct("Listener").field("event", event).finish()
            }
            Registration::Reducer { event, key, .. } => f
                .debug_struct("Reducer")
                .field("event", event)
                .field("key", key)
                .finish(),
        }
    }
}

/// Draft of an action, open for registrations until sealed
pub struct ActionBuilder {
    action_type: String,
    handler: ActionHandler,
    listeners: ListenerMap,
    reducers: ReducerRegistry,
    sealed: Option<ActionCreator>,
}

impl ActionBuilder {
    /// Claim `action_type` in `registry` and start a draft.
    pub fn new(
        registry: &Registry,
        action_type: impl Into<String>,
        handler: ActionHandler,
    ) -> Result<Self, ActionError> {
        let action_type = action_type.into();
        registry.actions().register(&action_type)?;

        Ok(Self {
            action_type,
            handler,
            listeners: ListenerMap::new(),
            reducers: registry.reducers().clone(),
            sealed: None,
        })
    }

    /// Attach a listener or keyed reducer.
    ///
    /// Reducers are keyed by `<actionType>/<event>`; a second handler for
    /// the same key on the same event is rejected.
    pub fn on(&mut self, registration: Registration) -> Result<&mut Self, ActionError> {
        if self.sealed.is_some() {
            return Err(ActionError::Sealed(self.action_type.clone()));
        }

        match registration {
            Registration::Listener { event, listener } => {
                debug!(action_type = %self.action_type, %event, "added listener");
                self.listeners.entry(event).or_default().push(listener);
            }
            Registration::Reducer {
                event,
                key,
                handler,
            } => {
                let kind = derived_type(&self.action_type, &event);
                self.reducers.add(&kind, &key, handler)?;
            }
        }
        Ok(self)
    }

    /// Call `listener` with `(payload, dispatch, get_state, context)` on `event`
    pub fn on_event<F>(
        &mut self,
        event: impl Into<String>,
        listener: F,
    ) -> Result<&mut Self, ActionError>
    where
        F: Fn(&Value, &Dispatch, &GetState, &mut EmissionContext) -> anyhow::Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.on(Registration::listener(event, listener))
    }

    /// Replace substate `key` with `handler(substate, payload)` on `event`
    pub fn on_reducer<F>(
        &mut self,
        event: impl Into<String>,
        key: impl Into<String>,
        handler: F,
    ) -> Result<&mut Self, ActionError>
    where
        F: Fn(Value, &Value) -> Value + Send + Sync + 'static,
    {
        self.on(Registration::reducer(event, key, handler))
    }

    /// Freeze registrations and return the action creator.
    ///
    /// Sealing again only warns and returns the same creator.
    pub fn seal(&mut self) -> ActionCreator {
        if let Some(creator) = &self.sealed {
            warn!(action_type = %self.action_type, "seal() called on already sealed action");
            return creator.clone();
        }

        let creator = ActionCreator {
            inner: Arc::new(SealedAction {
                action_type: Arc::from(self.action_type.as_str()),
                handler: Arc::clone(&self.handler),
                listeners: Arc::new(std::mem::take(&mut self.listeners)),
            }),
        };
        debug!(action_type = %self.action_type, "sealed action");
        self.sealed = Some(creator.clone());
        creator
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.is_some()
    }

    pub fn action_type(&self) -> &str {
        &self.action_type
    }
}

impl fmt::Debug for ActionBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionBuilder")
            .field("action_type", &self.action_type)
            .field("events", &self.listeners.keys().collect::<Vec<_>>())
            .field("sealed", &self.is_sealed())
            .finish()
    }
}

struct SealedAction {
    action_type: Arc<str>,
    handler: ActionHandler,
    listeners: Arc<ListenerMap>,
}

/// A sealed action. Call [`create`](Self::create) to get a dispatchable thunk.
#[derive(Clone)]
pub struct ActionCreator {
    inner: Arc<SealedAction>,
}

impl ActionCreator {
    /// Run the action handler on `args` and wrap its inner thunk.
    ///
    /// When the returned thunk is dispatched it gets a fresh
    /// [`EventEmitter`], runs the inner thunk with `(emit, get_state)`, and
    /// turns any failure into an `error` event. Its completion is `Err`
    /// only if an `error` listener itself fails.
    pub fn create(&self, args: Value) -> Result<Thunk, ActionError> {
        let inner_thunk = (self.inner.handler)(args).map_err(|source| ActionError::InvalidThunk {
            action_type: self.inner.action_type.to_string(),
            source,
        })?;

        let action = Arc::clone(&self.inner);
        Ok(Box::new(move |dispatch: Dispatch, get_state: GetState| {
            let emitter = EventEmitter::new(
                dispatch,
                get_state.clone(),
                Arc::clone(&action.listeners),
                Arc::clone(&action.action_type),
            );
            let run = inner_thunk(emitter.clone(), get_state);

            async move {
                match run.await {
                    Ok(()) => Ok(()),
                    Err(error) => {
                        debug!(
                            action_type = %emitter.action_type(),
                            error = %format!("{error:#}"),
                            "action failed, emitting error event"
                        );
                        emitter.emit_error(&error)
                    }
                }
            }
            .boxed()
        }))
    }

    pub fn action_type(&self) -> &str {
        &self.inner.action_type
    }
}

impl fmt::Debug for ActionCreator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionCreator")
            .field("action_type", &self.inner.action_type)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{settled, ActionRecord, Dispatchable, StateMap};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn noop_handler(_args: Value) -> anyhow::Result<InnerThunk> {
        Ok(inner_thunk(|_emit, _get_state| async { anyhow::Ok(()) }))
    }

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

    #[test]
    fn test_duplicate_action_type() {
        let registry = Registry::new();
        registry.action("test", noop_handler).unwrap().seal();

        let err = registry.action("test", noop_handler).unwrap_err();
        assert!(matches!(err, ActionError::DuplicateActionType(ref t) if t == "test"));
    }

    #[test]
    fn test_duplicate_reducer_on_same_event() {
        let registry = Registry::new();
        let mut builder = registry.action("test", noop_handler).unwrap();
        builder
            .on_reducer("loaded", "User", |state, _| state)
            .unwrap()
            .on_reducer("failed", "User", |state, _| state)
            .unwrap();

        let err = builder
            .on_reducer("loaded", "User", |state, _| state)
            .unwrap_err();
        assert!(matches!(
            err,
            ActionError::DuplicateReducer { ref derived_type, ref reducer_key }
                if derived_type == "test/loaded" && reducer_key == "User"
        ));
    }

    #[test]
    fn test_on_after_seal_fails() {
        let registry = Registry::new();
        let mut builder = registry.action("test", noop_handler).unwrap();
        builder.seal();

        let err = builder.on_event("x", |_, _, _, _| Ok(())).unwrap_err();
        assert!(matches!(err, ActionError::Sealed(ref t) if t == "test"));
        let err = builder.on_reducer("x", "K", |s, _| s).unwrap_err();
        assert!(matches!(err, ActionError::Sealed(_)));
    }

    #[test]
    fn test_empty_names_are_ordinary_strings() {
        let registry = Registry::new();
        let mut builder = registry.action("", noop_handler).unwrap();
        builder
            .on_event("", |_, _, _, _| Ok(()))
            .unwrap()
            .on_reducer("loaded", "", |s, _| s)
            .unwrap();
        builder.seal();

        assert!(registry.reducers().contains("/loaded"));
        assert_eq!(registry.reducers().keys("/loaded"), vec![String::new()]);
        assert!(matches!(
            registry.action("", noop_handler).unwrap_err(),
            ActionError::DuplicateActionType(ref t) if t.is_empty()
        ));
    }

    #[test]
    fn test_handler_rejection_is_invalid_thunk() {
        let registry = Registry::new();
        let creator = registry
            .action("test", |_args| anyhow::bail!("missing id"))
            .unwrap()
            .seal();

        let err = creator.create(Value::Null).err().unwrap();
        assert!(matches!(
            err,
            ActionError::InvalidThunk { ref action_type, .. } if action_type == "test"
        ));
    }

    #[tokio::test]
    async fn test_seal_twice_returns_same_creator() {
        let registry = Registry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut builder = registry
            .action("test", move |_args| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(inner_thunk(|emit, _| async move { emit.emit("done", Value::Null) }))
            })
            .unwrap();
        let first = builder.seal();
        let second = builder.seal();
        assert!(builder.is_sealed());
        assert!(Arc::ptr_eq(&first.inner, &second.inner));

        let (dispatch, records) = recording_dispatch();
        let thunk = second.create(Value::Null).unwrap();
        thunk(dispatch, GetState::new(StateMap::new)).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(records.lock().unwrap().len(), 1);
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_second_seal_warns() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();

        let registry = Registry::new();
        let mut builder = registry.action("test", noop_handler).unwrap();
        tracing::subscriber::with_default(subscriber, || {
            builder.seal();
            assert!(logs.text().is_empty());
            builder.seal();
        });

        let text = logs.text();
        assert_eq!(text.matches("already sealed").count(), 1);
        assert!(text.contains("WARN"));
        assert!(text.contains("action_type=test"));
    }

    #[tokio::test]
    async fn test_failure_becomes_error_event() {
        let registry = Registry::new();
        let heard = Arc::new(Mutex::new(Vec::new()));
        let sink = heard.clone();

        let creator = registry
            .action("test", |_args| {
                Ok(inner_thunk(|_emit, _| async {
                    Err::<(), _>(anyhow::Error::new(crate::HandlerFailure(json!("E"))))
                }))
            })
            .unwrap()
            .on_event("error", move |payload, _, _, _| {
                sink.lock().unwrap().push(payload.clone());
                Ok(())
            })
            .unwrap()
            .seal();

        let (dispatch, records) = recording_dispatch();
        let thunk = creator.create(Value::Null).unwrap();
        thunk(dispatch, GetState::new(StateMap::new)).await.unwrap();

        assert_eq!(
            *records.lock().unwrap(),
            vec![ActionRecord::error("test/error", json!("E"))]
        );
        assert_eq!(*heard.lock().unwrap(), vec![json!("E")]);
    }

    #[tokio::test]
    async fn test_failing_error_listener_surfaces() {
        let registry = Registry::new();
        let creator = registry
            .action("test", |_args| {
                Ok(inner_thunk(|_emit, _| async {
                    Err::<(), _>(anyhow::anyhow!("first"))
                }))
            })
            .unwrap()
            .on_event("error", |_, _, _, _| anyhow::bail!("second"))
            .unwrap()
            .seal();

        let (dispatch, _records) = recording_dispatch();
        let thunk = creator.create(Value::Null).unwrap();
        let err = thunk(dispatch, GetState::new(StateMap::new)).await.unwrap_err();
        assert_eq!(err.to_string(), "second");
    }

    #[tokio::test]
    async fn test_each_run_gets_a_fresh_context() {
        let registry = Registry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();

        let creator = registry
            .action("test", |_args| {
                Ok(inner_thunk(|emit, _| async move { emit.emit("bump", Value::Null) }))
            })
            .unwrap()
            .on_event("bump", move |_, _, _, context| {
                let n = context.get("n").and_then(Value::as_i64).unwrap_or(0) + 1;
                context.insert("n", json!(n));
                sink.lock().unwrap().push(n);
                Ok(())
            })
            .unwrap()
            .seal();

        for _ in 0..2 {
            let (dispatch, _records) = recording_dispatch();
            let thunk = creator.create(Value::Null).unwrap();
            thunk(dispatch, GetState::new(StateMap::new)).await.unwrap();
        }

        assert_eq!(*seen.lock().unwrap(), vec![1, 1]);
    }
}

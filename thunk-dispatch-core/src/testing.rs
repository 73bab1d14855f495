//! Test utilities for thunk-dispatch stores
//!
//! - [`TestHarness`]: a store wired to a recording middleware
//! - Assertion macros for verifying dispatched records
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//! use thunk_dispatch_core::testing::TestHarness;
//! use thunk_dispatch_core::{assert_dispatched, ActionRecord, Registry};
//!
//! let registry = Registry::new();
//! let mut harness = TestHarness::new(registry.create_reducer(json!({})).unwrap());
//!
//! drop(harness.dispatch(ActionRecord::new("user/loaded", json!(1))));
//!
//! let records = harness.drain_dispatched();
//! assert_dispatched!(records, "user/loaded");
//! ```

use tokio::sync::mpsc;

use crate::action::{ActionRecord, Dispatch, Dispatchable, GetState, StateMap, ThunkFuture};
use crate::logger::glob_match;
use crate::reducer::RootReducer;
use crate::store::{Middleware, Store};

/// Middleware that forwards every reduced record into a channel
#[derive(Debug, Clone)]
pub struct RecordingMiddleware {
    tx: mpsc::UnboundedSender<ActionRecord>,
}

impl RecordingMiddleware {
    pub fn new(tx: mpsc::UnboundedSender<ActionRecord>) -> Self {
        Self { tx }
    }
}

impl Middleware for RecordingMiddleware {
    fn before(&mut self, record: &ActionRecord) {
        let _ = self.tx.send(record.clone());
    }

    fn after(&mut self, _record: &ActionRecord, _state_changed: bool) {}
}

/// Store harness that captures every record reaching the reducer.
///
/// The `@@INIT` record dispatched on construction is discarded, so the
/// channel starts empty.
pub struct TestHarness {
    store: Store<RecordingMiddleware>,
    /// Sender for re-queueing records skipped by a filtered drain
    tx: mpsc::UnboundedSender<ActionRecord>,
    rx: mpsc::UnboundedReceiver<ActionRecord>,
}

impl TestHarness {
    /// Create a harness around `reducer`
    pub fn new(reducer: RootReducer) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = Store::with_middleware(reducer, RecordingMiddleware::new(tx.clone()));
        let mut harness = Self { store, tx, rx };
        harness.drain_dispatched();
        harness
    }

    pub fn store(&self) -> &Store<RecordingMiddleware> {
        &self.store
    }

    /// Dispatch through the underlying store
    #[must_use = "a dispatched thunk only runs when its future is polled"]
    pub fn dispatch(&self, action: impl Into<Dispatchable>) -> ThunkFuture {
        self.store.dispatch(action)
    }

    pub fn state(&self) -> StateMap {
        self.store.state()
    }

    pub fn dispatcher(&self) -> Dispatch {
        self.store.dispatcher()
    }

    pub fn getter(&self) -> GetState {
        self.store.getter()
    }

    /// Drain all recorded records, oldest first
    pub fn drain_dispatched(&mut self) -> Vec<ActionRecord> {
        let mut records = Vec::new();
        while let Ok(record) = self.rx.try_recv() {
            records.push(record);
        }
        records
    }

    /// Drain records whose type matches a glob pattern (e.g. `user/*`).
    ///
    /// Records not matching the pattern remain in the channel for later draining.
    pub fn drain_matching(&mut self, pattern: &str) -> Vec<ActionRecord> {
        let (matching, rest): (Vec<_>, Vec<_>) = self
            .drain_dispatched()
            .into_iter()
            .partition(|record| glob_match(pattern, &record.kind));

        for record in rest {
            let _ = self.tx.send(record);
        }

        matching
    }

    /// Check if any records were dispatched. Drains the channel.
    pub fn has_dispatched(&mut self) -> bool {
        !self.drain_dispatched().is_empty()
    }
}

/// Assert that a record of the given type was dispatched, optionally with
/// a specific payload.
///
/// # Example
///
/// ```ignore
/// let records = harness.drain_dispatched();
/// assert_dispatched!(records, "user/loaded");
/// assert_dispatched!(records, "user/loaded", json!({"id": 1}));
/// ```
#[macro_export]
macro_rules! assert_dispatched {
    ($records:expr, $kind:expr) => {
        assert!(
            $records.iter().any(|r| r.kind == $kind),
            "Expected `{}` to be dispatched, but got: {:?}",
            $kind,
            $records.iter().map(|r| r.kind.as_str()).collect::<Vec<_>>()
        );
    };
    ($records:expr, $kind:expr, $payload:expr) => {
        assert!(
            $records
                .iter()
                .any(|r| r.kind == $kind && r.payload == $payload),
            "Expected `{}` with payload {} to be dispatched, but got: {:?}",
            $kind,
            $payload,
            $records
        );
    };
}

/// Assert that no record of the given type was dispatched.
#[macro_export]
macro_rules! assert_not_dispatched {
    ($records:expr, $kind:expr) => {
        assert!(
            !$records.iter().any(|r| r.kind == $kind),
            "Expected `{}` NOT to be dispatched, but it was: {:?}",
            $kind,
            $records
        );
    };
}

/// Find the first record of the given type.
///
/// # Example
///
/// ```ignore
/// let records = harness.drain_dispatched();
/// let loaded = find_dispatched!(records, "user/loaded").unwrap();
/// assert_eq!(loaded.payload["id"], 1);
/// ```
#[macro_export]
macro_rules! find_dispatched {
    ($records:expr, $kind:expr) => {
        $records.iter().find(|r| r.kind == $kind)
    };
}

/// Count records of the given type.
#[macro_export]
macro_rules! count_dispatched {
    ($records:expr, $kind:expr) => {
        $records.iter().filter(|r| r.kind == $kind).count()
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use serde_json::json;

    fn harness() -> TestHarness {
        let registry = Registry::new();
        TestHarness::new(registry.create_reducer(json!({"User": {}})).unwrap())
    }

    #[test]
    fn test_harness_starts_empty() {
        let mut harness = harness();
        assert!(!harness.has_dispatched());
        assert_eq!(harness.state()["User"], json!({}));
    }

    #[test]
    fn test_drain_dispatched_in_order() {
        let mut harness = harness();
        drop(harness.dispatch(ActionRecord::new("user/a", json!(1))));
        drop(harness.dispatch(ActionRecord::new("user/b", json!(2))));

        let kinds: Vec<_> = harness
            .drain_dispatched()
            .into_iter()
            .map(|r| r.kind)
            .collect();
        assert_eq!(kinds, vec!["user/a", "user/b"]);
        assert!(harness.drain_dispatched().is_empty());
    }

    #[test]
    fn test_drain_matching_keeps_the_rest() {
        let mut harness = harness();
        drop(harness.dispatch(ActionRecord::new("user/loaded", json!(1))));
        drop(harness.dispatch(ActionRecord::new("cart/added", json!(2))));
        drop(harness.dispatch(ActionRecord::error("user/error", json!("x"))));

        let user = harness.drain_matching("user/*");
        assert_eq!(user.len(), 2);

        let rest = harness.drain_dispatched();
        assert_eq!(rest, vec![ActionRecord::new("cart/added", json!(2))]);
    }

    #[test]
    fn test_assertion_macros() {
        let mut harness = harness();
        drop(harness.dispatch(ActionRecord::new("tick", json!(1))));
        drop(harness.dispatch(ActionRecord::new("tick", json!(2))));
        drop(harness.dispatch(ActionRecord::new("user/loaded", json!({"id": 7}))));

        let records = harness.drain_dispatched();
        assert_dispatched!(records, "tick");
        assert_dispatched!(records, "user/loaded", json!({"id": 7}));
        assert_not_dispatched!(records, "user/error");
        assert_eq!(count_dispatched!(records, "tick"), 2);
        assert_eq!(
            find_dispatched!(records, "user/loaded").map(|r| &r.payload),
            Some(&json!({"id": 7}))
        );
    }
}

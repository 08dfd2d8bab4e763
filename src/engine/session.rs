use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::decision::ActionDescriptor;

/// One independently cancellable run of the perception-action iteration.
///
/// The token lives in the session registry for the unit's lifetime; the unit
/// is removed under the session mutex on completion or via `cancel_all`.
#[derive(Debug, Clone)]
pub struct ExecutionUnit {
    pub id: Uuid,
    pub token: CancellationToken,
}

impl ExecutionUnit {
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Default)]
struct SessionInner {
    interrupted: bool,
    /// Raw decision response bodies, insertion-ordered, never deduplicated.
    history: Vec<String>,
    units: HashMap<Uuid, CancellationToken>,
    pending_action: Option<ActionDescriptor>,
    last_artifact: Option<PathBuf>,
}

/// The only shared mutable resource of the engine. All fields are mutated
/// under a single mutex, so unit registration and `cancel_all` serialize
/// against each other.
#[derive(Clone)]
pub struct Session {
    pub id: Uuid,
    inner: Arc<Mutex<SessionInner>>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            inner: Arc::new(Mutex::new(SessionInner::default())),
        }
    }

    // ── interrupt flag ───────────────────────────────────────────────────

    pub fn is_interrupted(&self) -> bool {
        self.inner.lock().expect("session mutex poisoned").interrupted
    }

    pub fn set_interrupted(&self, value: bool) {
        self.inner.lock().expect("session mutex poisoned").interrupted = value;
        tracing::debug!(interrupted = value, "session interrupt flag updated");
    }

    // ── history ──────────────────────────────────────────────────────────

    pub fn push_history(&self, raw: String) {
        let mut inner = self.inner.lock().expect("session mutex poisoned");
        inner.history.push(raw);
        tracing::debug!(history_len = inner.history.len(), "response archived to history");
    }

    pub fn clear_history(&self) {
        let mut inner = self.inner.lock().expect("session mutex poisoned");
        inner.history.clear();
        tracing::debug!("history cleared");
    }

    pub fn history_snapshot(&self) -> Vec<String> {
        self.inner
            .lock()
            .expect("session mutex poisoned")
            .history
            .clone()
    }

    pub fn history_len(&self) -> usize {
        self.inner.lock().expect("session mutex poisoned").history.len()
    }

    // ── execution units ──────────────────────────────────────────────────

    pub fn register_unit(&self) -> ExecutionUnit {
        let unit = ExecutionUnit {
            id: Uuid::new_v4(),
            token: CancellationToken::new(),
        };
        let mut inner = self.inner.lock().expect("session mutex poisoned");
        inner.units.insert(unit.id, unit.token.clone());
        tracing::debug!(unit = %unit.id, active = inner.units.len(), "execution unit registered");
        unit
    }

    pub fn unregister_unit(&self, id: Uuid) {
        let mut inner = self.inner.lock().expect("session mutex poisoned");
        inner.units.remove(&id);
        tracing::debug!(unit = %id, active = inner.units.len(), "execution unit unregistered");
    }

    /// Signals cancellation to every registered unit, then clears the
    /// registry. Runs entirely under the mutex: no new unit can register
    /// while cancellation is in flight.
    pub fn cancel_all_units(&self) {
        let mut inner = self.inner.lock().expect("session mutex poisoned");
        let count = inner.units.len();
        for (id, token) in inner.units.drain() {
            token.cancel();
            tracing::debug!(unit = %id, "execution unit cancelled");
        }
        tracing::info!(cancelled = count, "all execution units cancelled");
    }

    pub fn active_unit_count(&self) -> usize {
        self.inner.lock().expect("session mutex poisoned").units.len()
    }

    // ── per-iteration transients ─────────────────────────────────────────

    pub fn set_pending_action(&self, action: Option<ActionDescriptor>) {
        self.inner.lock().expect("session mutex poisoned").pending_action = action;
    }

    pub fn pending_action(&self) -> Option<ActionDescriptor> {
        self.inner
            .lock()
            .expect("session mutex poisoned")
            .pending_action
            .clone()
    }

    pub fn set_last_artifact(&self, path: Option<PathBuf>) {
        self.inner.lock().expect("session mutex poisoned").last_artifact = path;
    }

    pub fn last_artifact(&self) -> Option<PathBuf> {
        self.inner
            .lock()
            .expect("session mutex poisoned")
            .last_artifact
            .clone()
    }

    /// Drops the pending action and the outstanding screenshot reference.
    /// Used by the reset protocol.
    pub fn clear_transients(&self) {
        let mut inner = self.inner.lock().expect("session mutex poisoned");
        inner.pending_action = None;
        inner.last_artifact = None;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_insertion_ordered_and_not_deduplicated() {
        let session = Session::new();
        session.push_history("a".into());
        session.push_history("b".into());
        session.push_history("a".into());
        assert_eq!(session.history_snapshot(), vec!["a", "b", "a"]);
    }

    #[test]
    fn cancel_all_cancels_and_clears_registry() {
        let session = Session::new();
        let u1 = session.register_unit();
        let u2 = session.register_unit();
        assert_eq!(session.active_unit_count(), 2);

        session.cancel_all_units();
        assert!(u1.is_cancelled());
        assert!(u2.is_cancelled());
        assert_eq!(session.active_unit_count(), 0);
    }

    #[test]
    fn unregister_removes_only_the_given_unit() {
        let session = Session::new();
        let u1 = session.register_unit();
        let u2 = session.register_unit();
        session.unregister_unit(u1.id);
        assert_eq!(session.active_unit_count(), 1);
        assert!(!u2.is_cancelled());
    }
}

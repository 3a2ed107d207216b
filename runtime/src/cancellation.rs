//! Cancellation registry for [`Effect::Cancellable`](wopi_auth_core::effect::Effect).
//!
//! Each cancellable effect gets a [`CancelToken`]. Tasks spawned for it are
//! recorded under the effect's id so that [`Effect::Cancel`] can flip the
//! token and abort them. The store checks the token under its state lock
//! before dispatching any action produced by the task, so a completion that
//! races with a cancel is dropped rather than delivered.
//!
//! [`Effect::Cancel`]: wopi_auth_core::effect::Effect::Cancel

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::task::AbortHandle;
use wopi_auth_core::effect::EffectId;

/// Shared flag marking one cancellable effect as cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a live token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the token cancelled.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cancelled, &other.cancelled)
    }
}

#[derive(Debug)]
struct Entry {
    token: CancelToken,
    tasks: Vec<AbortHandle>,
}

/// Live cancellable effects keyed by id.
#[derive(Debug, Clone, Default)]
pub(crate) struct CancellationRegistry {
    entries: Arc<Mutex<HashMap<EffectId, Entry>>>,
}

impl CancellationRegistry {
    fn lock(&self) -> MutexGuard<'_, HashMap<EffectId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new scope under `id`, cancelling any scope it replaces.
    pub(crate) fn begin(&self, id: EffectId) -> CancelToken {
        let token = CancelToken::new();
        let replaced = self.lock().insert(
            id,
            Entry {
                token: token.clone(),
                tasks: Vec::new(),
            },
        );
        if let Some(previous) = replaced {
            tracing::debug!(%id, "Replacing live cancellable effect");
            Self::abort(previous);
        }
        token
    }

    /// Record a task spawned inside the scope for `id`.
    ///
    /// If the scope was cancelled or replaced in the meantime the task is
    /// aborted immediately.
    pub(crate) fn attach(&self, id: EffectId, token: &CancelToken, task: AbortHandle) {
        let mut entries = self.lock();
        match entries.get_mut(&id) {
            Some(entry) if entry.token.same_as(token) && !token.is_cancelled() => {
                entry.tasks.push(task);
            },
            _ => task.abort(),
        }
    }

    /// Cancel the scope for `id`. Returns whether anything was live.
    pub(crate) fn cancel(&self, id: EffectId) -> bool {
        let removed = self.lock().remove(&id);
        match removed {
            Some(entry) => {
                Self::abort(entry);
                true
            },
            None => false,
        }
    }

    /// Drop the scope for `id` once its work has finished, unless it has
    /// since been replaced by a newer scope.
    pub(crate) fn finish(&self, id: EffectId, token: &CancelToken) {
        let mut entries = self.lock();
        if entries.get(&id).is_some_and(|entry| entry.token.same_as(token)) {
            entries.remove(&id);
        }
    }

    /// Cancel everything.
    pub(crate) fn cancel_all(&self) -> usize {
        let drained: Vec<Entry> = self.lock().drain().map(|(_, entry)| entry).collect();
        let count = drained.len();
        for entry in drained {
            Self::abort(entry);
        }
        count
    }

    /// Number of live scopes.
    pub(crate) fn live(&self) -> usize {
        self.lock().len()
    }

    /// Whether a scope is live for `id`.
    pub(crate) fn is_live(&self, id: EffectId) -> bool {
        self.lock().contains_key(&id)
    }

    fn abort(entry: Entry) {
        entry.token.cancel();
        for task in entry.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_flips_token_and_forgets_scope() {
        let registry = CancellationRegistry::default();
        let token = registry.begin(EffectId::new(1));
        assert!(registry.is_live(EffectId::new(1)));

        assert!(registry.cancel(EffectId::new(1)));
        assert!(token.is_cancelled());
        assert_eq!(registry.live(), 0);
        assert!(!registry.cancel(EffectId::new(1)));
    }

    #[test]
    fn begin_replaces_previous_scope() {
        let registry = CancellationRegistry::default();
        let first = registry.begin(EffectId::new(1));
        let second = registry.begin(EffectId::new(1));

        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());

        // A stale finish must not remove the newer scope.
        registry.finish(EffectId::new(1), &first);
        assert!(registry.is_live(EffectId::new(1)));

        registry.finish(EffectId::new(1), &second);
        assert!(!registry.is_live(EffectId::new(1)));
    }

    #[tokio::test]
    async fn cancel_aborts_attached_tasks() {
        let registry = CancellationRegistry::default();
        let token = registry.begin(EffectId::new(9));
        let task = tokio::spawn(async {
            tokio::time::sleep(std::time::Duration::from_secs(60)).await;
        });
        registry.attach(EffectId::new(9), &token, task.abort_handle());

        assert_eq!(registry.cancel_all(), 1);
        let joined = task.await;
        assert!(joined.is_err_and(|e| e.is_cancelled()));
    }
}

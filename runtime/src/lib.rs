//! # WOPI Auth Runtime
//!
//! The Store runtime that coordinates reducer execution and effect handling.
//!
//! - **Store**: owns the state and processes one action at a time under a
//!   write lock. This is the single completion context: every network
//!   completion is an action, so state transitions never race.
//! - **Effect execution**: futures run on tokio tasks; any action they
//!   produce is fed back through the store.
//! - **Cancellation**: effects registered under an
//!   [`EffectId`](wopi_auth_core::effect::EffectId) can be cancelled. Their
//!   tasks are aborted and any completion that still arrives is discarded
//!   before it reaches the reducer.
//!
//! ## Example
//!
//! ```ignore
//! use wopi_auth_runtime::Store;
//!
//! let store = Store::new(FlowState::default(), FlowReducer::new(), environment);
//! store.send(FlowAction::StartFlow { provider }).await?;
//! let phase = store.state(|s| s.phase).await;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{RwLock, watch};
use wopi_auth_core::{effect::Effect, reducer::Reducer};

pub mod cancellation;

pub use cancellation::CancelToken;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),

        /// Timeout waiting for a matching action
        #[error("Timeout waiting for action")]
        Timeout,

        /// Action broadcast channel closed
        #[error("Action broadcast channel closed")]
        ChannelClosed,
    }
}

pub use error::StoreError;

/// Store configuration.
///
/// ```ignore
/// let config = StoreConfig::default().with_broadcast_capacity(64);
/// let store = Store::with_config(state, reducer, env, config);
/// ```
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Capacity of the action broadcast channel
    pub broadcast_capacity: usize,
    /// Default timeout for graceful shutdown
    pub default_shutdown_timeout: Duration,
}

impl StoreConfig {
    /// Create a configuration with explicit values.
    #[must_use]
    pub const fn new(broadcast_capacity: usize, default_shutdown_timeout: Duration) -> Self {
        Self {
            broadcast_capacity,
            default_shutdown_timeout,
        }
    }

    /// Set the broadcast channel capacity
    #[must_use]
    pub const fn with_broadcast_capacity(mut self, capacity: usize) -> Self {
        self.broadcast_capacity = capacity;
        self
    }

    /// Set the default shutdown timeout
    #[must_use]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.default_shutdown_timeout = timeout;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 16,
            default_shutdown_timeout: Duration::from_secs(30),
        }
    }
}

/// Handle for tracking effect completion
///
/// Returned by [`Store::send()`]. Waiting on it returns once every effect
/// started by that action has finished (or been cancelled). Effects started
/// by follow-up actions are not tracked.
#[derive(Clone)]
pub struct EffectHandle {
    effects: Arc<AtomicUsize>,
    completion: watch::Receiver<()>,
}

impl EffectHandle {
    fn new() -> (Self, EffectTracking) {
        let counter = Arc::new(AtomicUsize::new(0));
        let (tx, rx) = watch::channel(());
        let handle = Self {
            effects: Arc::clone(&counter),
            completion: rx,
        };
        let tracking = EffectTracking {
            counter,
            notifier: Arc::new(tx),
        };
        (handle, tracking)
    }

    /// A handle with nothing to wait for.
    #[must_use]
    pub fn completed() -> Self {
        Self::new().0
    }

    /// Number of effects still running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.effects.load(Ordering::SeqCst)
    }

    /// Wait for all effects to complete
    pub async fn wait(&mut self) {
        while self.effects.load(Ordering::SeqCst) > 0 {
            if self.completion.changed().await.is_err() {
                break;
            }
        }
    }

    /// Wait for all effects to complete with a timeout
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the timeout expires first.
    pub async fn wait_with_timeout(&mut self, timeout: Duration) -> Result<(), StoreError> {
        tokio::time::timeout(timeout, self.wait())
            .await
            .map_err(|_| StoreError::Timeout)
    }
}

impl std::fmt::Debug for EffectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EffectHandle")
            .field("pending_effects", &self.pending())
            .finish_non_exhaustive()
    }
}

/// Internal: completion counter shared between a handle and its effects.
#[derive(Clone)]
struct EffectTracking {
    counter: Arc<AtomicUsize>,
    notifier: Arc<watch::Sender<()>>,
}

impl EffectTracking {
    fn increment(&self) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement(&self) {
        if self.counter.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _ = self.notifier.send(());
        }
    }
}

/// Internal: decrements the effect counter on drop, including on abort.
struct DecrementGuard(EffectTracking);

impl Drop for DecrementGuard {
    fn drop(&mut self) {
        self.0.decrement();
    }
}

/// Guard that decrements an atomic counter on drop (for shutdown tracking)
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Store runtime for coordinating reducer execution and effect handling.
pub mod store {
    use super::{
        Arc, AtomicBool, AtomicCounterGuard, AtomicUsize, DecrementGuard, Duration, Effect,
        EffectHandle, EffectTracking, Ordering, Reducer, RwLock, StoreConfig, StoreError,
    };
    use crate::cancellation::{CancelToken, CancellationRegistry};
    use tokio::sync::broadcast;
    use wopi_auth_core::effect::EffectId;

    /// Cancellation scope an effect runs in.
    type Scope = Option<(EffectId, CancelToken)>;

    /// The Store - runtime coordinator for a reducer
    ///
    /// # Type Parameters
    ///
    /// - `S`: State type
    /// - `A`: Action type
    /// - `E`: Environment type
    /// - `R`: Reducer implementation
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: R,
        environment: E,
        config: StoreConfig,
        shutdown: Arc<AtomicBool>,
        pending_effects: Arc<AtomicUsize>,
        cancellations: CancellationRegistry,
        /// Every action produced by an effect and accepted by the reducer.
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new Store with the default configuration.
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_config(initial_state, reducer, environment, StoreConfig::default())
        }

        /// Create a new Store with an explicit configuration.
        #[must_use]
        pub fn with_config(initial_state: S, reducer: R, environment: E, config: StoreConfig) -> Self {
            let (action_broadcast, _) = broadcast::channel(config.broadcast_capacity.max(1));

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer,
                environment,
                config,
                shutdown: Arc::new(AtomicBool::new(false)),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                cancellations: CancellationRegistry::default(),
                action_broadcast,
            }
        }

        /// The environment this store was built with.
        #[must_use]
        pub const fn environment(&self) -> &E {
            &self.environment
        }

        /// Number of cancellable effects currently live.
        #[must_use]
        pub fn live_cancellables(&self) -> usize {
            self.cancellations.live()
        }

        /// Number of spawned effects still running, across all actions.
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.pending_effects.load(Ordering::Acquire)
        }

        /// Initiate graceful shutdown.
        ///
        /// New actions are rejected, live cancellable effects are cancelled,
        /// and the call waits for remaining effects up to `timeout`.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if effects are still
        /// running when the timeout elapses.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);

            self.shutdown.store(true, Ordering::Release);
            let cancelled = self.cancellations.cancel_all();
            if cancelled > 0 {
                tracing::debug!(cancelled, "Cancelled live effects for shutdown");
            }

            let start = std::time::Instant::now();
            let poll_interval = Duration::from_millis(20);

            loop {
                let pending = self.pending_effects.load(Ordering::Acquire);
                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    return Ok(());
                }
                if start.elapsed() >= timeout {
                    tracing::error!(pending_effects = pending, "Shutdown timeout");
                    metrics::counter!("store.shutdown.timeout").increment(1);
                    return Err(StoreError::ShutdownTimeout(pending));
                }
                tokio::time::sleep(poll_interval).await;
            }
        }

        /// Shutdown using the configured default timeout.
        ///
        /// # Errors
        ///
        /// See [`shutdown`](Self::shutdown).
        pub async fn shutdown_default(&self) -> Result<(), StoreError> {
            self.shutdown(self.config.default_shutdown_timeout).await
        }

        /// Send an action to the store
        ///
        /// 1. Acquires the write lock on state
        /// 2. Calls the reducer with (state, action, environment)
        /// 3. Starts the returned effects
        ///
        /// Returns once the effects have been started, not completed.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<EffectHandle, StoreError>
        where
            R: Clone,
            E: Clone,
        {
            match self.process(action, None).await? {
                Some(handle) => Ok(handle),
                None => Ok(EffectHandle::completed()),
            }
        }

        /// Send an action and wait for a matching action produced by effects.
        ///
        /// Subscribes before sending so no result can be missed.
        ///
        /// # Errors
        ///
        /// - [`StoreError::Timeout`]: no matching action within `timeout`
        /// - [`StoreError::ChannelClosed`]: the broadcast channel closed
        /// - [`StoreError::ShutdownInProgress`]: the store is shutting down
        pub async fn send_and_wait_for<F>(
            &self,
            action: A,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            R: Clone,
            E: Clone,
            F: Fn(&A) -> bool,
        {
            let mut rx = self.action_broadcast.subscribe();
            self.send(action).await?;
            Self::wait_on(&mut rx, predicate, timeout).await
        }

        /// Wait for the next action matching `predicate` without sending.
        ///
        /// # Errors
        ///
        /// Same as [`send_and_wait_for`](Self::send_and_wait_for).
        pub async fn wait_for<F>(&self, predicate: F, timeout: Duration) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            let mut rx = self.action_broadcast.subscribe();
            Self::wait_on(&mut rx, predicate, timeout).await
        }

        async fn wait_on<F>(
            rx: &mut broadcast::Receiver<A>,
            predicate: F,
            timeout: Duration,
        ) -> Result<A, StoreError>
        where
            F: Fn(&A) -> bool,
        {
            tokio::time::timeout(timeout, async {
                loop {
                    match rx.recv().await {
                        Ok(action) if predicate(&action) => return Ok(action),
                        Ok(_) => {},
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            tracing::warn!(skipped, "Action observer lagged");
                        },
                        Err(broadcast::error::RecvError::Closed) => {
                            return Err(StoreError::ChannelClosed);
                        },
                    }
                }
            })
            .await
            .map_err(|_| StoreError::Timeout)?
        }

        /// Subscribe to actions produced by effects.
        ///
        /// Only actions that were accepted by the reducer are broadcast;
        /// completions of cancelled effects never appear here.
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Read current state via a closure
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&*state)
        }

        /// Run the reducer for one action.
        ///
        /// When `guard` is set the action came from a cancellable effect; it is
        /// dropped if the token was cancelled, checked under the write lock so
        /// that a concurrent cancel is always observed.
        async fn process(
            &self,
            action: A,
            guard: Option<&CancelToken>,
        ) -> Result<Option<EffectHandle>, StoreError>
        where
            R: Clone,
            E: Clone,
        {
            if self.shutdown.load(Ordering::Acquire) {
                tracing::warn!("Rejected action: store is shutting down");
                metrics::counter!("store.shutdown.rejected_actions").increment(1);
                return Err(StoreError::ShutdownInProgress);
            }

            let (handle, tracking) = EffectHandle::new();

            let effects = {
                let mut state = self.state.write().await;

                if guard.is_some_and(CancelToken::is_cancelled) {
                    tracing::debug!("Discarding action from cancelled effect");
                    metrics::counter!("store.actions.discarded").increment(1);
                    return Ok(None);
                }

                let span = tracing::debug_span!("reducer_execution");
                let _enter = span.enter();

                metrics::counter!("store.actions.total").increment(1);
                let effects = self.reducer.reduce(&mut *state, action, &self.environment);
                tracing::trace!("Reducer returned {} effects", effects.len());

                // Cancels take effect before the lock is released, so no
                // completion of a cancelled effect can be reduced after this
                // action.
                for effect in &effects {
                    self.apply_cancellations(effect);
                }
                effects
            };

            for effect in effects {
                self.execute_effect(effect, tracking.clone(), None);
            }

            Ok(Some(handle))
        }

        /// Apply every [`Effect::Cancel`] in `effect`.
        fn apply_cancellations(&self, effect: &Effect<A>) {
            match effect {
                Effect::Cancel(id) => {
                    if self.cancellations.cancel(*id) {
                        tracing::debug!(%id, "Cancelled effect");
                        metrics::counter!("store.effects.cancelled").increment(1);
                    } else {
                        tracing::trace!(%id, "Cancel requested for effect that is not live");
                    }
                },
                Effect::Parallel(effects) => {
                    for effect in effects {
                        self.apply_cancellations(effect);
                    }
                },
                Effect::Cancellable { effect, .. } => self.apply_cancellations(effect),
                Effect::None | Effect::Future(_) => {},
            }
        }

        /// Feed an action produced by an effect back into the store.
        async fn feedback(&self, action: A, scope: &Scope)
        where
            R: Clone,
            E: Clone,
        {
            let guard = scope.as_ref().map(|(_, token)| token);
            match self.process(action.clone(), guard).await {
                Ok(Some(_)) => {
                    let _ = self.action_broadcast.send(action);
                },
                Ok(None) => {},
                Err(error) => {
                    tracing::warn!(error = %error, "Dropped action produced by effect");
                },
            }
        }

        #[allow(clippy::needless_pass_by_value)] // tracking is cloned into tasks
        #[tracing::instrument(skip(self, effect, tracking, scope), name = "execute_effect")]
        fn execute_effect(&self, effect: Effect<A>, tracking: EffectTracking, scope: Scope)
        where
            R: Clone,
            E: Clone,
        {
            match effect {
                Effect::None => {
                    metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                },
                Effect::Parallel(effects) => {
                    metrics::counter!("store.effects.executed", "type" => "parallel").increment(1);
                    for effect in effects {
                        self.execute_effect(effect, tracking.clone(), scope.clone());
                    }
                },
                Effect::Cancellable { id, effect } => {
                    metrics::counter!("store.effects.executed", "type" => "cancellable").increment(1);
                    let token = self.cancellations.begin(id);
                    tracing::trace!(%id, "Registered cancellable effect");
                    self.execute_effect(*effect, tracking, Some((id, token)));
                },
                Effect::Cancel(_) => {
                    // Already applied under the state lock.
                    metrics::counter!("store.effects.executed", "type" => "cancel").increment(1);
                },
                Effect::Future(fut) => {
                    metrics::counter!("store.effects.executed", "type" => "future").increment(1);
                    tracking.increment();
                    self.pending_effects.fetch_add(1, Ordering::SeqCst);
                    let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));
                    let done = DecrementGuard(tracking);

                    let store = self.clone();
                    let task_scope = scope.clone();
                    let task = tokio::spawn(async move {
                        let _done = done;
                        let _pending_guard = pending_guard;

                        let produced = fut.await;
                        if let Some(action) = produced {
                            store.feedback(action, &task_scope).await;
                        }
                        if let Some((id, token)) = &task_scope {
                            store.cancellations.finish(*id, token);
                        }
                    });

                    if let Some((id, token)) = scope {
                        self.cancellations.attach(id, &token, task.abort_handle());
                    }
                },
            }
        }
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Clone,
        E: Clone,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: self.reducer.clone(),
                environment: self.environment.clone(),
                config: self.config.clone(),
                shutdown: Arc::clone(&self.shutdown),
                pending_effects: Arc::clone(&self.pending_effects),
                cancellations: self.cancellations.clone(),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }
}

// Re-export for convenience
pub use store::Store;

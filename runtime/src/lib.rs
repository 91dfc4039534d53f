//! # Boxoffice Runtime
//!
//! Runtime pieces shared by the Boxoffice crates.
//!
//! ## Core Components
//!
//! - **Store**: manages reducer state and executes effects, feeding produced
//!   actions back into the reducer
//! - **`KeyedLocks`**: a table of async mutexes keyed by an identifier, used to
//!   serialize work on one key while other keys proceed in parallel
//! - **`MetricsServer`**: Prometheus exporter
//!
//! ## Example
//!
//! ```ignore
//! use boxoffice_runtime::Store;
//!
//! let store = Store::new(ReaperState::default(), ReaperReducer, environment);
//!
//! store.send(ReaperAction::Start).await?;
//! let sweeps = store.state(|s| s.sweeps).await;
//! ```

use boxoffice_core::{effect::Effect, reducer::Reducer};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// Per-key async mutex table
pub mod locks;

/// Prometheus metrics for observability
pub mod metrics;

pub use locks::{KeyedGuard, KeyedLocks};
pub use store::Store;

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// Returned when `send()` is called after shutdown started.
        #[error("Store is shutting down")]
        ShutdownInProgress,

        /// Shutdown timed out waiting for effects to complete
        #[error("Shutdown timed out with {0} effects still running")]
        ShutdownTimeout(usize),
    }
}

pub use error::StoreError;

/// Decrements the pending-effect counter on drop, including on panic.
struct AtomicCounterGuard(Arc<AtomicUsize>);

impl Drop for AtomicCounterGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Store module - the runtime for reducers
pub mod store {
    use super::{
        Arc, AtomicCounterGuard, AtomicUsize, Duration, Effect, Ordering, Reducer, RwLock,
        StoreError,
    };
    use futures::future::{BoxFuture, join_all};
    use tokio::sync::{broadcast, watch};

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent access)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
    ///
    /// Cloning a Store is cheap; clones share state and effect tracking.
    pub struct Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        state: Arc<RwLock<S>>,
        reducer: Arc<R>,
        environment: Arc<E>,
        pending_effects: Arc<AtomicUsize>,
        shutdown: watch::Sender<bool>,
        /// Actions produced by effects, for observers (tests, dashboards).
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Clone for Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E>,
    {
        fn clone(&self) -> Self {
            Self {
                state: Arc::clone(&self.state),
                reducer: Arc::clone(&self.reducer),
                environment: Arc::clone(&self.environment),
                pending_effects: Arc::clone(&self.pending_effects),
                shutdown: self.shutdown.clone(),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Sync + Clone + std::fmt::Debug + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// The action broadcast channel holds 16 actions; use
        /// [`Store::with_broadcast_capacity`] for busier stores.
        #[must_use]
        pub fn new(initial_state: S, reducer: R, environment: E) -> Self {
            Self::with_broadcast_capacity(initial_state, reducer, environment, 16)
        }

        /// Create a store with a custom action broadcast capacity
        #[must_use]
        pub fn with_broadcast_capacity(
            initial_state: S,
            reducer: R,
            environment: E,
            capacity: usize,
        ) -> Self {
            let (action_broadcast, _) = broadcast::channel(capacity.max(1));
            let (shutdown, _) = watch::channel(false);

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer: Arc::new(reducer),
                environment: Arc::new(environment),
                pending_effects: Arc::new(AtomicUsize::new(0)),
                shutdown,
                action_broadcast,
            }
        }

        /// Send an action to the store
        ///
        /// 1. Acquires the write lock on state
        /// 2. Calls the reducer with (state, action, environment)
        /// 3. Spawns the returned effects
        ///
        /// Returns once the effects are started, not when they finish.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<(), StoreError> {
            if self.is_shutting_down() {
                tracing::debug!(action = ?action, "Rejecting action, store is shutting down");
                return Err(StoreError::ShutdownInProgress);
            }

            let effects = {
                let mut state = self.state.write().await;
                self.reducer.reduce(&mut state, action, &self.environment)
            };

            for effect in effects {
                self.spawn_effect(effect);
            }

            Ok(())
        }

        /// Read current state via a closure
        ///
        /// ```ignore
        /// let sweeps = store.state(|s| s.sweeps).await;
        /// ```
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&state)
        }

        /// Subscribe to actions produced by effects
        ///
        /// Only actions fed back by effects are broadcast, never the action
        /// passed to [`Store::send`]. An action is broadcast after the reducer
        /// has processed it.
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Number of effects currently executing or waiting on a delay
        #[must_use]
        pub fn pending_effects(&self) -> usize {
            self.pending_effects.load(Ordering::Acquire)
        }

        /// Whether [`Store::shutdown`] has been called
        #[must_use]
        pub fn is_shutting_down(&self) -> bool {
            *self.shutdown.borrow()
        }

        /// Initiate graceful shutdown
        ///
        /// New actions are rejected, pending delays are cancelled, and
        /// in-flight futures get until `timeout` to finish.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownTimeout`] if effects are still running
        /// when the timeout expires.
        pub async fn shutdown(&self, timeout: Duration) -> Result<(), StoreError> {
            tracing::info!("Initiating graceful shutdown");
            metrics::counter!("store.shutdown.initiated").increment(1);

            self.shutdown.send_replace(true);

            let start = std::time::Instant::now();
            let poll_interval = Duration::from_millis(10);

            loop {
                let pending = self.pending_effects();

                if pending == 0 {
                    tracing::info!("All effects completed, shutdown successful");
                    metrics::counter!("store.shutdown.completed").increment(1);
                    return Ok(());
                }

                if start.elapsed() >= timeout {
                    tracing::error!(pending_effects = pending, "Shutdown timed out");
                    metrics::counter!("store.shutdown.timeout").increment(1);
                    return Err(StoreError::ShutdownTimeout(pending));
                }

                tokio::time::sleep(poll_interval).await;
            }
        }

        fn spawn_effect(&self, effect: Effect<A>) {
            if matches!(effect, Effect::None) {
                tracing::trace!("Executing Effect::None (no-op)");
                metrics::counter!("store.effects.executed", "type" => "none").increment(1);
                return;
            }

            self.pending_effects.fetch_add(1, Ordering::SeqCst);
            let pending_guard = AtomicCounterGuard(Arc::clone(&self.pending_effects));
            let execution = self.run_effect(effect);

            tokio::spawn(async move {
                let _pending_guard = pending_guard;
                execution.await;
            });
        }

        /// Runs one effect to completion, feeding produced actions back.
        fn run_effect(&self, effect: Effect<A>) -> BoxFuture<'static, ()> {
            metrics::counter!("store.effects.executed", "type" => effect.kind()).increment(1);
            let store = self.clone();

            Box::pin(async move {
                match effect {
                    Effect::None => {},
                    Effect::Future(fut) => {
                        if let Some(action) = fut.await {
                            tracing::trace!("Effect::Future produced an action, sending to store");
                            store.feed_back(action).await;
                        }
                    },
                    Effect::Delay { duration, action } => {
                        let mut shutdown = store.shutdown.subscribe();
                        if *shutdown.borrow_and_update() {
                            return;
                        }
                        tokio::select! {
                            () = tokio::time::sleep(duration) => {
                                tracing::trace!(?duration, "Effect::Delay elapsed, sending action");
                                store.feed_back(*action).await;
                            }
                            _ = shutdown.changed() => {
                                tracing::debug!(?duration, "Effect::Delay cancelled by shutdown");
                            }
                        }
                    },
                    Effect::Parallel(effects) => {
                        join_all(effects.into_iter().map(|e| store.run_effect(e))).await;
                    },
                    Effect::Sequential(effects) => {
                        for effect in effects {
                            store.run_effect(effect).await;
                        }
                    },
                }
            })
        }

        async fn feed_back(&self, action: A) {
            match self.send(action.clone()).await {
                Ok(()) => {
                    let _ = self.action_broadcast.send(action);
                },
                Err(error) => {
                    tracing::debug!(%error, action = ?action, "Dropped action produced by effect");
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use boxoffice_core::SmallVec;
    use boxoffice_core::smallvec;

    #[derive(Debug, Clone, PartialEq)]
    enum CounterAction {
        Increment,
        IncrementLater,
        Incremented,
    }

    #[derive(Debug, Default)]
    struct CounterState {
        count: u32,
    }

    struct CounterReducer;

    impl Reducer for CounterReducer {
        type State = CounterState;
        type Action = CounterAction;
        type Environment = ();

        fn reduce(
            &self,
            state: &mut CounterState,
            action: CounterAction,
            _env: &(),
        ) -> SmallVec<[Effect<CounterAction>; 4]> {
            match action {
                CounterAction::Increment => {
                    smallvec![Effect::Future(Box::pin(async {
                        Some(CounterAction::Incremented)
                    }))]
                },
                CounterAction::IncrementLater => smallvec![Effect::Delay {
                    duration: Duration::from_secs(3600),
                    action: Box::new(CounterAction::Increment),
                }],
                CounterAction::Incremented => {
                    state.count += 1;
                    SmallVec::new()
                },
            }
        }
    }

    #[tokio::test]
    async fn future_effect_feeds_action_back() {
        let store = Store::new(CounterState::default(), CounterReducer, ());
        let mut actions = store.subscribe_actions();

        store.send(CounterAction::Increment).await.unwrap();
        assert_eq!(actions.recv().await.unwrap(), CounterAction::Incremented);

        store.shutdown(Duration::from_secs(1)).await.unwrap();
        assert_eq!(store.state(|s| s.count).await, 1);
    }

    #[tokio::test]
    async fn shutdown_cancels_pending_delays() {
        let store = Store::new(CounterState::default(), CounterReducer, ());

        store.send(CounterAction::IncrementLater).await.unwrap();
        assert_eq!(store.pending_effects(), 1);

        store.shutdown(Duration::from_secs(1)).await.unwrap();
        assert_eq!(store.pending_effects(), 0);
        assert_eq!(store.state(|s| s.count).await, 0);
    }

    #[tokio::test]
    async fn send_after_shutdown_is_rejected() {
        let store = Store::new(CounterState::default(), CounterReducer, ());
        store.shutdown(Duration::from_millis(10)).await.unwrap();

        let result = store.send(CounterAction::Incremented).await;
        assert!(matches!(result, Err(StoreError::ShutdownInProgress)));
    }
}

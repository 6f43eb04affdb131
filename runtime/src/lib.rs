//! # gatecheck runtime
//!
//! The Store runtime that coordinates reducer execution and effect handling.
//!
//! ## Core Components
//!
//! - **Store**: owns the state, runs the reducer and executes effects
//! - **Feedback loop**: actions produced by effects are reduced in turn until
//!   the chain settles
//!
//! ## Serialized dispatch
//!
//! A station has a single operator and one local database. [`Store::send`]
//! holds the dispatch lock for the whole action chain, so two chains never
//! interleave. Callers get control back only once every follow-up action has
//! been reduced, which is what lets the check-in engine hand a settled prompt
//! back to the operator.
//!
//! Slow work that must not hold the lock (a network sync) is returned as
//! [`Effect::Background`](gatecheck_core::effect::Effect::Background). Its
//! action arrives later as a chain of its own and is announced on
//! [`Store::subscribe_actions`].
//!
//! ## Example
//!
//! ```ignore
//! use gatecheck_runtime::Store;
//!
//! let store = Store::new(CheckInState::default(), CheckInReducer, context);
//!
//! store.send(CheckInAction::Submit { input: "2003456789".into() }).await?;
//! let phase = store.state(|s| s.phase.clone()).await;
//! ```

use futures::future::join_all;
use gatecheck_core::{effect::Effect, reducer::Reducer};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock, broadcast};

/// Error types for the Store runtime
pub mod error {
    use thiserror::Error;

    /// Errors that can occur during Store operations
    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum StoreError {
        /// Store is shutting down and not accepting new actions
        ///
        /// This error is returned when `send()` is called after shutdown initiated.
        #[error("Store is shutting down")]
        ShutdownInProgress,
    }
}

pub use error::StoreError;
pub use store::Store;

/// Store module - the runtime coordinator
pub mod store {
    use super::{
        Arc, AtomicBool, Effect, Mutex, Ordering, Reducer, RwLock, StoreError, VecDeque,
        broadcast, join_all,
    };
    use std::future::Future;
    use std::pin::Pin;

    /// The Store - runtime coordinator for a reducer
    ///
    /// The Store manages:
    /// 1. State (behind `RwLock` for concurrent reads)
    /// 2. Reducer (business logic)
    /// 3. Environment (injected dependencies)
    /// 4. Effect execution (with feedback loop)
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
        reducer: Arc<R>,
        environment: Arc<E>,
        dispatch: Arc<Mutex<()>>,
        shutdown: Arc<AtomicBool>,
        /// Action broadcast channel for observing actions produced by effects.
        action_broadcast: broadcast::Sender<A>,
    }

    impl<S, A, E, R> Store<S, A, E, R>
    where
        R: Reducer<State = S, Action = A, Environment = E> + Send + Sync + 'static,
        A: Send + Clone + std::fmt::Debug + 'static,
        S: Send + Sync + 'static,
        E: Send + Sync + 'static,
    {
        /// Create a new store with initial state, reducer, and environment
        ///
        /// The action broadcast channel holds 16 actions; use
        /// [`with_broadcast_capacity`](Self::with_broadcast_capacity) for more.
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

            Self {
                state: Arc::new(RwLock::new(initial_state)),
                reducer: Arc::new(reducer),
                environment: Arc::new(environment),
                dispatch: Arc::new(Mutex::new(())),
                shutdown: Arc::new(AtomicBool::new(false)),
                action_broadcast,
            }
        }

        /// Send an action and drive its effect chain to completion
        ///
        /// The action is reduced, its effects are executed concurrently, and
        /// every action they produce is reduced in turn (breadth first) until
        /// no effects remain. Returns the number of actions reduced.
        ///
        /// Effects must not call `send` on the same store: the dispatch lock
        /// is held for the whole chain.
        ///
        /// # Errors
        ///
        /// Returns [`StoreError::ShutdownInProgress`] if the store is shutting down.
        #[tracing::instrument(skip(self, action), name = "store_send")]
        pub async fn send(&self, action: A) -> Result<usize, StoreError> {
            if self.shutdown.load(Ordering::Acquire) {
                return Err(StoreError::ShutdownInProgress);
            }

            let _chain = self.dispatch.lock().await;
            let mut queue = VecDeque::from([action]);
            let mut reduced = 0usize;

            while let Some(action) = queue.pop_front() {
                tracing::trace!(?action, "reducing action");

                let effects = {
                    let mut state = self.state.write().await;
                    self.reducer.reduce(&mut state, action, &self.environment)
                };
                reduced += 1;

                let pending: Vec<_> = effects
                    .into_iter()
                    .filter_map(|effect| match effect {
                        Effect::None => None,
                        Effect::Future(future) => Some(future),
                        Effect::Background(future) => {
                            self.spawn_background(future);
                            None
                        }
                    })
                    .collect();

                if pending.is_empty() {
                    continue;
                }

                for produced in join_all(pending).await.into_iter().flatten() {
                    // No subscribers is not an error
                    let _ = self.action_broadcast.send(produced.clone());
                    queue.push_back(produced);
                }
            }

            metrics::counter!("store.actions.reduced").increment(reduced as u64);
            Ok(reduced)
        }

        /// Run a background effect on its own task.
        ///
        /// The produced action goes through [`send`](Self::send) like operator
        /// input and is broadcast once reduced. After shutdown it is dropped.
        fn spawn_background(&self, future: Pin<Box<dyn Future<Output = Option<A>> + Send>>) {
            metrics::counter!("store.effects.background").increment(1);
            let store = self.clone();
            tokio::spawn(async move {
                let Some(action) = future.await else {
                    return;
                };
                let notice = action.clone();
                match store.send(action).await {
                    // No subscribers is not an error
                    Ok(_) => {
                        let _ = store.action_broadcast.send(notice);
                    }
                    Err(error) => tracing::debug!(%error, ?notice, "background action dropped"),
                }
            });
        }

        /// Read the current state via a closure
        pub async fn state<F, T>(&self, f: F) -> T
        where
            F: FnOnce(&S) -> T,
        {
            let state = self.state.read().await;
            f(&state)
        }

        /// Subscribe to actions produced by effects
        ///
        /// The initial action passed to [`send`](Self::send) is not broadcast.
        /// Actions from chained effects are broadcast before they are reduced,
        /// actions from background effects after.
        #[must_use]
        pub fn subscribe_actions(&self) -> broadcast::Receiver<A> {
            self.action_broadcast.subscribe()
        }

        /// Stop accepting actions and wait for the in-flight chain to settle
        pub async fn shutdown(&self) {
            self.shutdown.store(true, Ordering::Release);
            let _chain = self.dispatch.lock().await;
            tracing::info!("store shut down");
        }

        /// Whether [`shutdown`](Self::shutdown) has been called
        #[must_use]
        pub fn is_shutting_down(&self) -> bool {
            self.shutdown.load(Ordering::Acquire)
        }
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
                dispatch: Arc::clone(&self.dispatch),
                shutdown: Arc::clone(&self.shutdown),
                action_broadcast: self.action_broadcast.clone(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Test code

    use super::*;
    use gatecheck_core::reducer::Effects;
    use gatecheck_core::smallvec;

    #[derive(Debug, Default)]
    struct CounterState {
        count: i32,
        log: Vec<&'static str>,
    }

    #[derive(Debug, Clone)]
    enum CounterAction {
        Increment,
        IncrementTwiceLater,
        IncrementInBackground,
        Echo(&'static str),
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
        ) -> Effects<CounterAction> {
            match action {
                CounterAction::Increment => {
                    state.count += 1;
                    smallvec![Effect::None]
                }
                CounterAction::IncrementTwiceLater => smallvec![
                    Effect::future(async { Some(CounterAction::Increment) }),
                    Effect::future(async { Some(CounterAction::Increment) }),
                ],
                CounterAction::IncrementInBackground => {
                    smallvec![Effect::background(async {
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                        Some(CounterAction::Increment)
                    })]
                }
                CounterAction::Echo(label) => {
                    state.log.push(label);
                    smallvec![Effect::future(async { None })]
                }
            }
        }
    }

    #[tokio::test]
    async fn send_reduces_action() {
        let store = Store::new(CounterState::default(), CounterReducer, ());
        let reduced = store.send(CounterAction::Increment).await.unwrap();
        assert_eq!(reduced, 1);
        assert_eq!(store.state(|s| s.count).await, 1);
    }

    #[tokio::test]
    async fn send_settles_effect_chain_before_returning() {
        let store = Store::new(CounterState::default(), CounterReducer, ());
        let reduced = store.send(CounterAction::IncrementTwiceLater).await.unwrap();
        assert_eq!(reduced, 3);
        assert_eq!(store.state(|s| s.count).await, 2);
    }

    #[tokio::test]
    async fn produced_actions_are_broadcast() {
        let store = Store::new(CounterState::default(), CounterReducer, ());
        let mut rx = store.subscribe_actions();
        store.send(CounterAction::IncrementTwiceLater).await.unwrap();

        assert!(matches!(rx.try_recv().unwrap(), CounterAction::Increment));
        assert!(matches!(rx.try_recv().unwrap(), CounterAction::Increment));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn effects_yielding_nothing_end_the_chain() {
        let store = Store::new(CounterState::default(), CounterReducer, ());
        assert_eq!(store.send(CounterAction::Echo("a")).await.unwrap(), 1);
        assert_eq!(store.state(|s| s.log.clone()).await, vec!["a"]);
    }

    #[tokio::test]
    async fn concurrent_senders_are_serialized() {
        let store = Store::new(CounterState::default(), CounterReducer, ());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move { store.send(CounterAction::IncrementTwiceLater).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }
        assert_eq!(store.state(|s| s.count).await, 16);
    }

    #[tokio::test]
    async fn rejects_actions_after_shutdown() {
        let store = Store::new(CounterState::default(), CounterReducer, ());
        store.shutdown().await;
        assert!(store.is_shutting_down());
        assert_eq!(
            store.send(CounterAction::Increment).await,
            Err(StoreError::ShutdownInProgress)
        );
    }

    #[tokio::test]
    async fn background_effect_does_not_hold_the_chain() {
        let store = Store::new(CounterState::default(), CounterReducer, ());
        let mut rx = store.subscribe_actions();

        assert_eq!(store.send(CounterAction::IncrementInBackground).await.unwrap(), 1);
        assert_eq!(store.state(|s| s.count).await, 0);
        store.send(CounterAction::Echo("meanwhile")).await.unwrap();

        assert!(matches!(rx.recv().await.unwrap(), CounterAction::Increment));
        assert_eq!(store.state(|s| s.count).await, 1);
        assert_eq!(store.state(|s| s.log.clone()).await, vec!["meanwhile"]);
    }

    #[tokio::test]
    async fn background_result_is_dropped_after_shutdown() {
        let store = Store::new(CounterState::default(), CounterReducer, ());
        let mut rx = store.subscribe_actions();

        store.send(CounterAction::IncrementInBackground).await.unwrap();
        store.shutdown().await;
        tokio::time::sleep(std::time::Duration::from_millis(150)).await;

        assert_eq!(store.state(|s| s.count).await, 0);
        assert!(rx.try_recv().is_err());
    }
}

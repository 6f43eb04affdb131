//! # gatecheck core
//!
//! Domain model and core abstractions for the gatecheck admission station.
//!
//! ## Contents
//!
//! - [`code`]: the 10-digit ticket code and its (tier, number, code) triple
//! - [`ticket`]: ticket rows, check-ins, wristbands and admission totals
//! - [`search`]: the whitelisted operator search query
//! - [`store`]: the [`TicketStore`](store::TicketStore) trait every backend implements
//! - [`reducer`], [`effect`], [`environment`]: the state-machine plumbing the
//!   check-in engine is written against
//!
//! ## Architecture
//!
//! The station keeps business rules in a reducer: a function
//! `(State, Action, Environment) → (State, Effects)`. Effects are descriptions
//! of I/O (store lookups, sync round trips) that the runtime executes and
//! feeds back as new actions. Operator prompts are simply states the reducer
//! waits in until the next operator action arrives.
//!
//! ```ignore
//! impl Reducer for CheckInReducer {
//!     type State = CheckInState;
//!     type Action = CheckInAction;
//!     type Environment = AppContext;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut CheckInState,
//!         action: CheckInAction,
//!         env: &AppContext,
//!     ) -> SmallVec<[Effect<CheckInAction>; 4]> {
//!         // transitions go here
//!         smallvec![Effect::None]
//!     }
//! }
//! ```

pub mod code;
pub mod search;
pub mod store;
pub mod ticket;

// Re-export commonly used types
pub use chrono::{DateTime, Utc};
pub use smallvec::{smallvec, SmallVec};

/// Reducer module - the trait business logic is written against
pub mod reducer {
    use super::effect::Effect;
    use smallvec::SmallVec;

    /// Effects returned from a single reduction.
    ///
    /// Most transitions emit zero or one effect, so four inline slots avoid
    /// heap allocation on the hot path.
    pub type Effects<Action> = SmallVec<[Effect<Action>; 4]>;

    /// The Reducer trait - core abstraction for business logic
    ///
    /// # Type Parameters
    ///
    /// - `State`: The state this reducer operates on
    /// - `Action`: The action type this reducer processes
    /// - `Environment`: The injected dependencies this reducer needs
    pub trait Reducer {
        /// The state type this reducer operates on
        type State;

        /// The action type this reducer processes
        type Action;

        /// The environment type with injected dependencies
        type Environment;

        /// Reduce an action into state changes and effects
        ///
        /// Implementations must not perform I/O directly: anything touching
        /// the store or the network is returned as an [`Effect`].
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> Effects<Self::Action>;
    }
}

/// Effect module - side effect descriptions
pub mod effect {
    use std::future::Future;
    use std::pin::Pin;

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed by the reducer. The runtime executes them
    /// and dispatches whatever action they produce.
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),

        /// Async computation run outside the current dispatch chain
        ///
        /// The runtime spawns it and does not wait for it. Its action, if any,
        /// is dispatched later as a chain of its own.
        Background(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> std::fmt::Debug for Effect<Action> {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                Self::None => write!(f, "Effect::None"),
                Self::Future(_) => write!(f, "Effect::Future(<future>)"),
                Self::Background(_) => write!(f, "Effect::Background(<future>)"),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Wrap an async block that yields the follow-up action.
        pub fn future<F>(future: F) -> Self
        where
            F: Future<Output = Option<Action>> + Send + 'static,
        {
            Self::Future(Box::pin(future))
        }

        /// Wrap an async block that must not hold up the current chain.
        pub fn background<F>(future: F) -> Self
        where
            F: Future<Output = Option<Action>> + Send + 'static,
        {
            Self::Background(Box::pin(future))
        }

        /// Whether this is the no-op effect.
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Self::None)
        }
    }
}

/// Environment module - dependency injection traits
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// Check-in timestamps come from the injected clock, never from
    /// `Utc::now()` inside business logic.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

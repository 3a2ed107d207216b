//! # WOPI Auth Core
//!
//! Core traits and types for the WOPI authentication flow engine.
//!
//! The engine is built from a handful of small abstractions:
//!
//! - **State**: everything the flow knows at a point in time
//! - **Action**: every input to the flow (user commands and network completions)
//! - **Reducer**: pure function `(State, Action, Environment) → (State, Effects)`
//! - **Effect**: a description of side-effecting work, executed by the runtime
//! - **Environment**: injected dependencies (HTTP endpoints, clock, logging)
//!
//! Network round trips are described as cancellable effects so that a running
//! stage can be aborted and its late completion discarded.
//!
//! ## Example
//!
//! ```ignore
//! use wopi_auth_core::{effect::Effect, reducer::Reducer, smallvec, SmallVec};
//!
//! impl Reducer for FlowReducer {
//!     type State = FlowState;
//!     type Action = FlowAction;
//!     type Environment = FlowEnvironment;
//!
//!     fn reduce(
//!         &self,
//!         state: &mut FlowState,
//!         action: FlowAction,
//!         env: &FlowEnvironment,
//!     ) -> SmallVec<[Effect<FlowAction>; 4]> {
//!         smallvec![Effect::None]
//!     }
//! }
//! ```

pub use chrono::{DateTime, Utc};
pub use smallvec::{SmallVec, smallvec};

/// Reducer module - The core trait for business logic
///
/// Reducers are pure functions: `(State, Action, Environment) → (State, Effects)`.
/// All I/O is returned as [`Effect`](crate::effect::Effect) descriptions.
pub mod reducer {
    use super::SmallVec;
    use super::effect::Effect;

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
        /// Updates `state` in place and returns the effects the runtime
        /// should execute. Must not perform I/O itself.
        fn reduce(
            &self,
            state: &mut Self::State,
            action: Self::Action,
            env: &Self::Environment,
        ) -> SmallVec<[Effect<Self::Action>; 4]>;
    }
}

/// Effect module - Side effect descriptions
///
/// Effects are values. The runtime executes them and feeds any produced
/// action back into the reducer.
pub mod effect {
    use std::fmt;
    use std::future::Future;
    use std::pin::Pin;

    /// Identifier of a cancellable effect.
    ///
    /// A reducer tags long-running work with an id and can later abort it
    /// with [`Effect::Cancel`]. Once cancelled, any action the work
    /// produces is discarded by the runtime.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
    pub struct EffectId(u64);

    impl EffectId {
        /// Create an id from a raw value.
        #[must_use]
        pub const fn new(raw: u64) -> Self {
            Self(raw)
        }

        /// The raw value.
        #[must_use]
        pub const fn get(self) -> u64 {
            self.0
        }

        /// The id following this one.
        #[must_use]
        pub const fn next(self) -> Self {
            Self(self.0.wrapping_add(1))
        }
    }

    impl fmt::Display for EffectId {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "op-{}", self.0)
        }
    }

    /// Effect type - describes a side effect to be executed
    ///
    /// Effects are NOT executed immediately. They are descriptions of what
    /// should happen, returned from reducers and executed by the Store runtime.
    pub enum Effect<Action> {
        /// No-op effect
        None,

        /// Run effects in parallel
        Parallel(Vec<Effect<Action>>),

        /// Arbitrary async computation
        ///
        /// Returns `Option<Action>` - if Some, the action is fed back into the reducer
        Future(Pin<Box<dyn Future<Output = Option<Action>> + Send>>),

        /// Run `effect` under a cancellation id.
        ///
        /// Registering a second effect under an id that is still live
        /// cancels the first.
        Cancellable {
            /// Id used by [`Effect::Cancel`]
            id: EffectId,
            /// The work to run
            effect: Box<Effect<Action>>,
        },

        /// Cancel every effect registered under the id.
        ///
        /// Actions produced by cancelled work are never dispatched.
        Cancel(EffectId),
    }

    // Manual Debug implementation since Future doesn't implement Debug
    impl<Action> fmt::Debug for Effect<Action>
    where
        Action: fmt::Debug,
    {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Effect::None => write!(f, "Effect::None"),
                Effect::Parallel(effects) => {
                    f.debug_tuple("Effect::Parallel").field(effects).finish()
                },
                Effect::Future(_) => write!(f, "Effect::Future(<future>)"),
                Effect::Cancellable { id, effect } => f
                    .debug_struct("Effect::Cancellable")
                    .field("id", id)
                    .field("effect", effect)
                    .finish(),
                Effect::Cancel(id) => f.debug_tuple("Effect::Cancel").field(id).finish(),
            }
        }
    }

    impl<Action> Effect<Action> {
        /// Combine effects to run in parallel
        #[must_use]
        pub const fn merge(effects: Vec<Effect<Action>>) -> Effect<Action> {
            Effect::Parallel(effects)
        }

        /// Wrap a future as a cancellable effect.
        #[must_use]
        pub fn cancellable<F>(id: EffectId, future: F) -> Effect<Action>
        where
            F: Future<Output = Option<Action>> + Send + 'static,
        {
            Effect::Cancellable {
                id,
                effect: Box::new(Effect::Future(Box::pin(future))),
            }
        }

        /// Whether this effect does nothing.
        #[must_use]
        pub const fn is_none(&self) -> bool {
            matches!(self, Effect::None)
        }

        /// The cancellation id, if this is a cancellable effect.
        #[must_use]
        pub const fn cancellation_id(&self) -> Option<EffectId> {
            match self {
                Effect::Cancellable { id, .. } => Some(*id),
                _ => None,
            }
        }
    }
}

/// Environment module - Dependency injection traits
///
/// External dependencies are abstracted behind traits and injected via the
/// reducer's environment.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall clock.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

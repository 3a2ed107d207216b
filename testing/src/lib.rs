//! # WOPI Auth Testing
//!
//! Testing utilities for reducers built on `wopi-auth-core`:
//!
//! - [`FixedClock`] / [`test_clock`]: deterministic time
//! - [`ReducerTest`]: Given-When-Then harness for a single reducer step
//! - [`assertions`]: helpers for inspecting returned effects
//!
//! ```ignore
//! use wopi_auth_testing::{ReducerTest, test_clock};
//!
//! ReducerTest::new(FlowReducer::new())
//!     .with_env(test_environment(test_clock()))
//!     .given_state(FlowState::default())
//!     .when_action(FlowAction::Cancel)
//!     .then_state(|s| assert_eq!(s.phase, FlowPhase::Idle))
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use wopi_auth_core::environment::Clock;


/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// ```
    /// use wopi_auth_testing::mocks::FixedClock;
    /// use wopi_auth_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which cannot happen.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

pub use mocks::{FixedClock, test_clock};
pub use reducer_test::{ReducerTest, assertions};

//! # WOPI Client Authentication Flow
//!
//! Diagnostic engine for the WOPI bootstrapper authentication handshake:
//!
//! 1. **Bootstrapper**: unauthenticated `GET`, answered with a 401 challenge
//!    naming the sign-in and token endpoints
//! 2. **Signin**: interactive browser sign-in, ending in a redirect that
//!    carries an authorization code
//! 3. **Tokens**: code-for-token exchange
//! 4. **Profile**: authenticated `GET` returning the user's identity
//!
//! The result is a [`ConnectionRecord`] that can later be refreshed or
//! re-profiled.
//!
//! ## Architecture
//!
//! The flow is a reducer driven by a store:
//!
//! ```text
//! Action → Reducer → (State, Effects) → Effect Execution → More Actions
//! ```
//!
//! Every network round trip (and the browser wait) is a cancellable
//! effect. The store processes one action at a time, so stage transitions
//! never race, and a cancelled stage's completion is never delivered.
//!
//! ## Example
//!
//! ```rust,ignore
//! use wopi_auth::*;
//!
//! let store = FlowStore::new(FlowState::new(), WopiReducer::new(), environment);
//! store
//!     .send_and_wait_for(
//!         FlowAction::StartFlow { provider },
//!         |action| matches!(action, FlowAction::ConnectionCommitted { .. }),
//!         Duration::from_secs(300),
//!     )
//!     .await?;
//! let record = store.state(|s| s.record.clone()).await;
//! ```

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::todo)]
#![deny(clippy::unimplemented)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

// Public modules
pub mod actions;
pub mod catalog;
pub mod challenge;
pub mod config;
pub mod connection;
pub mod constants;
pub mod environment;
pub mod error;
pub mod fetchers;
pub mod form;
pub mod logging;
pub mod provider;
pub mod providers;
pub mod redirect;
pub mod reducers;
pub mod results;
pub mod sign_in;
pub mod state;

#[cfg(any(test, feature = "test-utils"))]
pub mod mocks;

// Re-export main types for convenience
pub use actions::FlowAction;
pub use catalog::ProviderCatalog;
pub use config::{ClientInfo, FlowConfig};
pub use connection::{BootstrapInfo, ConnectionBuilder, ConnectionRecord};
pub use environment::FlowEnvironment;
pub use error::{ErrorKind, FlowError, Result};
pub use logging::{FlowLog, LogLevel, SharedLog, TracingFlowLog};
pub use provider::ProviderConfig;
pub use providers::{
    HttpWopiEndpoints, JsonFilePreferences, MemoryPreferences, PreferenceStore, SignInSurface,
    WopiEndpoints,
};
pub use redirect::AuthResult;
pub use reducers::WopiReducer;
pub use results::{ProfileResult, TokenResult};
pub use sign_in::{NavigationDecision, RedirectWatcher};
pub use state::{FlowPhase, FlowState, Stage, StageStatus};

/// The store type running the flow.
pub type FlowStore<W, S, P> =
    wopi_auth_runtime::Store<FlowState, FlowAction, FlowEnvironment<W, S, P>, WopiReducer<W, S, P>>;

//! Flow environment.

use crate::catalog::ProviderCatalog;
use crate::config::FlowConfig;
use crate::logging::SharedLog;
use crate::providers::{PreferenceStore, SignInSurface, WopiEndpoints};
use std::sync::Arc;
use wopi_auth_core::environment::Clock;

/// Collaborators of the flow reducer.
///
/// # Type Parameters
///
/// - `W`: network endpoints
/// - `S`: sign-in surface
/// - `P`: preference store
#[derive(Clone)]
pub struct FlowEnvironment<W, S, P>
where
    W: WopiEndpoints + Clone,
    S: SignInSurface + Clone,
    P: PreferenceStore + Clone,
{
    /// Bootstrap, token and profile calls.
    pub endpoints: W,

    /// Interactive browser.
    pub sign_in: S,

    /// Providers and connections.
    pub preferences: P,

    /// Client identity, user agents and timeout.
    pub config: FlowConfig,

    /// Flow log.
    pub log: SharedLog,

    /// Time source for token expiry.
    pub clock: Arc<dyn Clock>,
}

impl<W, S, P> FlowEnvironment<W, S, P>
where
    W: WopiEndpoints + Clone,
    S: SignInSurface + Clone,
    P: PreferenceStore + Clone,
{
    /// Create an environment.
    #[must_use]
    pub fn new(
        endpoints: W,
        sign_in: S,
        preferences: P,
        config: FlowConfig,
        log: SharedLog,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            endpoints,
            sign_in,
            preferences,
            config,
            log,
            clock,
        }
    }

    /// A catalog over this environment's preferences.
    #[must_use]
    pub fn catalog(&self) -> ProviderCatalog<P> {
        ProviderCatalog::new(self.preferences.clone())
    }
}

//! Collaborator interfaces.
//!
//! The flow reducer depends on these traits only; the store's environment
//! supplies concrete implementations.
//!
//! ```text
//! ┌──────────────────┐   fetcher values    ┌────────────────────┐
//! │ FlowReducer      │ ──────────────────▶ │ WopiEndpoints      │ HTTP
//! │  (effects)       │   sign-in URL       ├────────────────────┤
//! │                  │ ──────────────────▶ │ SignInSurface      │ browser
//! │                  │   records           ├────────────────────┤
//! │                  │ ──────────────────▶ │ PreferenceStore    │ disk
//! └──────────────────┘                     └────────────────────┘
//! ```
//!
//! - **Testing**: the `mocks` module scripts every collaborator
//! - **Production**: [`HttpWopiEndpoints`] and [`JsonFilePreferences`]

use crate::connection::{BootstrapInfo, ConnectionRecord};
use crate::error::Result;
use crate::fetchers::{BootstrapFetcher, ProfileFetcher, TokenFetcher};
use crate::provider::ProviderConfig;
use crate::redirect::AuthResult;
use crate::results::{ProfileResult, TokenResult};
use crate::sign_in::RedirectWatcher;
use std::future::Future;
use url::Url;

pub mod http;
pub mod preferences;

pub use http::HttpWopiEndpoints;
pub use preferences::{JsonFilePreferences, MemoryPreferences, PreferenceDocument};

/// The three network calls of the flow.
pub trait WopiEndpoints: Send + Sync {
    /// Discovery call.
    ///
    /// # Errors
    ///
    /// Transport or protocol failures from [`BootstrapFetcher::fetch`].
    fn bootstrap(
        &self,
        fetcher: BootstrapFetcher,
    ) -> impl Future<Output = Result<BootstrapInfo>> + Send;

    /// Token exchange or refresh.
    ///
    /// # Errors
    ///
    /// Transport or protocol failures from [`TokenFetcher::fetch`].
    fn tokens(&self, fetcher: TokenFetcher) -> impl Future<Output = Result<TokenResult>> + Send;

    /// Authenticated profile call.
    ///
    /// # Errors
    ///
    /// Transport or protocol failures from [`ProfileFetcher::fetch`].
    fn profile(
        &self,
        fetcher: ProfileFetcher,
    ) -> impl Future<Output = Result<ProfileResult>> + Send;
}

/// The interactive browser used for sign-in.
///
/// Implementations load `url`, pass every navigation to `watcher`, and stop
/// navigating and close once the watcher returns
/// [`Capture`](crate::sign_in::NavigationDecision::Capture).
pub trait SignInSurface: Send + Sync {
    /// Run the sign-in and resolve with the captured outcome.
    ///
    /// # Errors
    ///
    /// - the captured failure ([`FlowError::SignInRejected`](crate::FlowError::SignInRejected)
    ///   or [`FlowError::MissingAuthCode`](crate::FlowError::MissingAuthCode))
    /// - [`FlowError::SignInAbandoned`](crate::FlowError::SignInAbandoned) if the
    ///   surface closes without a capture
    /// - [`FlowError::Transport`](crate::FlowError::Transport) if navigation fails
    fn sign_in(
        &self,
        url: Url,
        watcher: RedirectWatcher,
    ) -> impl Future<Output = Result<AuthResult>> + Send;
}

/// Synchronous accessors for configured providers and saved connections.
pub trait PreferenceStore: Send + Sync {
    /// All providers.
    ///
    /// # Errors
    ///
    /// [`FlowError::Storage`](crate::FlowError::Storage) if reading fails.
    fn providers(&self) -> Result<Vec<ProviderConfig>>;

    /// Replace all providers.
    ///
    /// # Errors
    ///
    /// [`FlowError::Storage`](crate::FlowError::Storage) if writing fails.
    fn set_providers(&self, providers: Vec<ProviderConfig>) -> Result<()>;

    /// All connections.
    ///
    /// # Errors
    ///
    /// [`FlowError::Storage`](crate::FlowError::Storage) if reading fails.
    fn connections(&self) -> Result<Vec<ConnectionRecord>>;

    /// Replace all connections.
    ///
    /// # Errors
    ///
    /// [`FlowError::Storage`](crate::FlowError::Storage) if writing fails.
    fn set_connections(&self, connections: Vec<ConnectionRecord>) -> Result<()>;

    /// The provider selected for the next flow.
    ///
    /// # Errors
    ///
    /// [`FlowError::Storage`](crate::FlowError::Storage) if reading fails.
    fn selected_provider(&self) -> Result<Option<ProviderConfig>>;

    /// Change the selection.
    ///
    /// # Errors
    ///
    /// [`FlowError::Storage`](crate::FlowError::Storage) if writing fails.
    fn set_selected_provider(&self, provider: Option<ProviderConfig>) -> Result<()>;

    /// Apply `change` to the whole document in one write. Nothing is
    /// written when `change` fails.
    ///
    /// # Errors
    ///
    /// The error returned by `change`, or
    /// [`FlowError::Storage`](crate::FlowError::Storage) if reading or
    /// writing fails.
    fn transact<T>(&self, change: impl FnOnce(&mut PreferenceDocument) -> Result<T>) -> Result<T>;
}

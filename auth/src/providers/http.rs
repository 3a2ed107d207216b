//! reqwest-backed endpoints.

use super::WopiEndpoints;
use crate::config::FlowConfig;
use crate::connection::BootstrapInfo;
use crate::error::{FlowError, Result};
use crate::fetchers::{BootstrapFetcher, ProfileFetcher, TokenFetcher};
use crate::logging::SharedLog;
use crate::results::{ProfileResult, TokenResult};
use reqwest::Client;
use std::future::Future;

/// Performs the fetches over HTTPS with a shared client.
///
/// The client keeps no cookies and applies the configured request timeout.
#[derive(Clone)]
pub struct HttpWopiEndpoints {
    http: Client,
    log: SharedLog,
}

impl HttpWopiEndpoints {
    /// Build the client from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Transport`] if the TLS backend cannot be
    /// initialised.
    pub fn new(config: &FlowConfig, log: SharedLog) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| FlowError::Transport(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { http, log })
    }

    /// Use an existing client.
    #[must_use]
    pub const fn with_client(http: Client, log: SharedLog) -> Self {
        Self { http, log }
    }
}

impl WopiEndpoints for HttpWopiEndpoints {
    fn bootstrap(
        &self,
        fetcher: BootstrapFetcher,
    ) -> impl Future<Output = Result<BootstrapInfo>> + Send {
        async move { fetcher.fetch(&self.http, self.log.as_ref()).await }
    }

    fn tokens(&self, fetcher: TokenFetcher) -> impl Future<Output = Result<TokenResult>> + Send {
        async move { fetcher.fetch(&self.http, self.log.as_ref()).await }
    }

    fn profile(
        &self,
        fetcher: ProfileFetcher,
    ) -> impl Future<Output = Result<ProfileResult>> + Send {
        async move { fetcher.fetch(&self.http, self.log.as_ref()).await }
    }
}

impl std::fmt::Debug for HttpWopiEndpoints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpWopiEndpoints").finish_non_exhaustive()
    }
}

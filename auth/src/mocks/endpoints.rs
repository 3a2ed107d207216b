//! Scripted network endpoints.

use crate::connection::BootstrapInfo;
use crate::error::{FlowError, Result};
use crate::fetchers::{BootstrapFetcher, ProfileFetcher, TokenFetcher};
use crate::providers::WopiEndpoints;
use crate::results::{ProfileResult, TokenResult};
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// One recorded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointCall {
    /// Discovery.
    Bootstrap(BootstrapFetcher),
    /// Token exchange or refresh.
    Tokens(TokenFetcher),
    /// Profile.
    Profile(ProfileFetcher),
}

#[derive(Debug, Default)]
struct Script {
    bootstrap: VecDeque<Result<BootstrapInfo>>,
    tokens: VecDeque<Result<TokenResult>>,
    profile: VecDeque<Result<ProfileResult>>,
    calls: Vec<EndpointCall>,
}

/// Endpoints that answer from queued results and record every call.
///
/// An empty queue answers with a transport error.
#[derive(Debug, Clone, Default)]
pub struct MockWopiEndpoints {
    script: Arc<Mutex<Script>>,
    token_gate: Option<Arc<Notify>>,
}

impl MockWopiEndpoints {
    /// Endpoints with nothing queued.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Endpoints answering one successful flow.
    #[must_use]
    pub fn happy_path() -> Self {
        Self::new()
            .with_bootstrap(Ok(sample_bootstrap()))
            .with_tokens(Ok(sample_tokens()))
            .with_profile(Ok(sample_profile()))
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue a discovery result.
    #[must_use]
    pub fn with_bootstrap(self, result: Result<BootstrapInfo>) -> Self {
        self.script().bootstrap.push_back(result);
        self
    }

    /// Queue a token result.
    #[must_use]
    pub fn with_tokens(self, result: Result<TokenResult>) -> Self {
        self.script().tokens.push_back(result);
        self
    }

    /// Queue a profile result.
    #[must_use]
    pub fn with_profile(self, result: Result<ProfileResult>) -> Self {
        self.script().profile.push_back(result);
        self
    }

    /// Make token calls wait until the returned gate is notified.
    #[must_use]
    pub fn hold_tokens(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.token_gate = Some(gate.clone());
        (self, gate)
    }

    /// Every call so far.
    #[must_use]
    pub fn calls(&self) -> Vec<EndpointCall> {
        self.script().calls.clone()
    }

    /// Number of calls so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.script().calls.len()
    }

    /// Token calls so far.
    #[must_use]
    pub fn token_calls(&self) -> Vec<TokenFetcher> {
        self.script()
            .calls
            .iter()
            .filter_map(|call| match call {
                EndpointCall::Tokens(fetcher) => Some(fetcher.clone()),
                _ => None,
            })
            .collect()
    }

    /// Profile calls so far.
    #[must_use]
    pub fn profile_calls(&self) -> Vec<ProfileFetcher> {
        self.script()
            .calls
            .iter()
            .filter_map(|call| match call {
                EndpointCall::Profile(fetcher) => Some(fetcher.clone()),
                _ => None,
            })
            .collect()
    }
}

fn unscripted(what: &str) -> FlowError {
    FlowError::Transport(format!("no scripted {what} response"))
}

impl WopiEndpoints for MockWopiEndpoints {
    fn bootstrap(
        &self,
        fetcher: BootstrapFetcher,
    ) -> impl Future<Output = Result<BootstrapInfo>> + Send {
        let result = {
            let mut script = self.script();
            script.calls.push(EndpointCall::Bootstrap(fetcher));
            script.bootstrap.pop_front()
        };
        async move { result.unwrap_or_else(|| Err(unscripted("bootstrap"))) }
    }

    fn tokens(&self, fetcher: TokenFetcher) -> impl Future<Output = Result<TokenResult>> + Send {
        let result = {
            let mut script = self.script();
            script.calls.push(EndpointCall::Tokens(fetcher));
            script.tokens.pop_front()
        };
        let gate = self.token_gate.clone();
        async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            result.unwrap_or_else(|| Err(unscripted("token")))
        }
    }

    fn profile(
        &self,
        fetcher: ProfileFetcher,
    ) -> impl Future<Output = Result<ProfileResult>> + Send {
        let result = {
            let mut script = self.script();
            script.calls.push(EndpointCall::Profile(fetcher));
            script.profile.pop_front()
        };
        async move { result.unwrap_or_else(|| Err(unscripted("profile"))) }
    }
}

/// Discovery data pointing at `login.contoso.com`.
#[must_use]
pub fn sample_bootstrap() -> BootstrapInfo {
    BootstrapInfo {
        authorization_url: "https://login.contoso.com/authorize".to_string(),
        token_issuance_url: "https://login.contoso.com/token".to_string(),
        provider_id: Some("tp_contoso".to_string()),
    }
}

/// One-hour tokens with a refresh token.
#[must_use]
pub fn sample_tokens() -> TokenResult {
    TokenResult {
        access_token: "access-1".to_string(),
        token_expiration: 3600,
        refresh_token: "refresh-1".to_string(),
    }
}

/// A complete profile.
#[must_use]
pub fn sample_profile() -> ProfileResult {
    ProfileResult {
        user_id: "user-1".to_string(),
        sign_in_name: "megan@contoso.com".to_string(),
        friendly_name: "Megan".to_string(),
    }
}

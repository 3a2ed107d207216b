//! Flow configuration.
//!
//! Client identity and transport settings. Values are supplied by the
//! application; [`FlowConfig::from_env`] reads overrides from the process
//! environment.

use crate::constants::user_agents;
use crate::error::{FlowError, Result};
use std::time::Duration;

/// Client identity sent on the sign-in URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// Culture (`rs` parameter).
    ///
    /// Default: `en-US`
    pub culture: String,

    /// Client build (`build` parameter).
    ///
    /// Default: `16.0.7030`
    pub client_build: String,

    /// Client platform (`platform` parameter).
    ///
    /// Default: `iOS`
    pub client_platform: String,
}

impl ClientInfo {
    /// Create client info with explicit values.
    #[must_use]
    pub fn new(
        culture: impl Into<String>,
        client_build: impl Into<String>,
        client_platform: impl Into<String>,
    ) -> Self {
        Self {
            culture: culture.into(),
            client_build: client_build.into(),
            client_platform: client_platform.into(),
        }
    }

    /// Set culture.
    #[must_use]
    pub fn with_culture(mut self, culture: impl Into<String>) -> Self {
        self.culture = culture.into();
        self
    }

    /// Set client build.
    #[must_use]
    pub fn with_client_build(mut self, build: impl Into<String>) -> Self {
        self.client_build = build.into();
        self
    }

    /// Set client platform.
    #[must_use]
    pub fn with_client_platform(mut self, platform: impl Into<String>) -> Self {
        self.client_platform = platform.into();
        self
    }
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self::new("en-US", "16.0.7030", "iOS")
    }
}

/// Settings shared by all stages of the flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowConfig {
    /// Identity sent on the sign-in URL.
    pub client_info: ClientInfo,

    /// `User-Agent` for the bootstrap call.
    pub bootstrap_user_agent: String,

    /// `User-Agent` for token and profile calls.
    pub service_user_agent: String,

    /// Per-request timeout.
    ///
    /// Default: 30 seconds
    pub request_timeout: Duration,
}

impl FlowConfig {
    /// Create the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set client info.
    #[must_use]
    pub fn with_client_info(mut self, client_info: ClientInfo) -> Self {
        self.client_info = client_info;
        self
    }

    /// Set the bootstrap `User-Agent`.
    #[must_use]
    pub fn with_bootstrap_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.bootstrap_user_agent = agent.into();
        self
    }

    /// Set the token/profile `User-Agent`.
    #[must_use]
    pub fn with_service_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.service_user_agent = agent.into();
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Defaults overridden by `WOPI_AUTH_*` environment variables.
    ///
    /// Recognized: `WOPI_AUTH_CULTURE`, `WOPI_AUTH_CLIENT_BUILD`,
    /// `WOPI_AUTH_CLIENT_PLATFORM`, `WOPI_AUTH_TIMEOUT_SECS`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `WOPI_AUTH_TIMEOUT_SECS` is not a
    /// positive integer.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env) with an explicit lookup.
    ///
    /// # Errors
    ///
    /// See [`from_env`](Self::from_env).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(culture) = lookup("WOPI_AUTH_CULTURE") {
            config.client_info.culture = culture;
        }
        if let Some(build) = lookup("WOPI_AUTH_CLIENT_BUILD") {
            config.client_info.client_build = build;
        }
        if let Some(platform) = lookup("WOPI_AUTH_CLIENT_PLATFORM") {
            config.client_info.client_platform = platform;
        }
        if let Some(raw) = lookup("WOPI_AUTH_TIMEOUT_SECS") {
            let secs = raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| {
                    FlowError::validation(format!(
                        "WOPI_AUTH_TIMEOUT_SECS must be a positive integer, got \"{raw}\""
                    ))
                })?;
            config.request_timeout = Duration::from_secs(secs);
        }
        Ok(config)
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            client_info: ClientInfo::default(),
            bootstrap_user_agent: user_agents::BOOTSTRAP.to_string(),
            service_user_agent: user_agents::SERVICE.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

//! Authenticated profile call.

use super::{log_unsuccessful_body, read_body};
use crate::constants::{headers, user_agents};
use crate::error::{FlowError, Result};
use crate::logging::FlowLog;
use crate::results::{ProfileResult, decode_profile_result};
use reqwest::{Client, StatusCode, header};

/// Bearer-authenticated `GET` on the bootstrapper.
#[derive(Clone, PartialEq, Eq)]
pub struct ProfileFetcher {
    /// Bootstrapper URL.
    pub url: String,
    /// Bearer token.
    pub access_token: String,
    /// Sent as `X-WOPI-SessionContext` when non-empty.
    pub session_context: String,
    /// `User-Agent` header.
    pub user_agent: String,
}

impl ProfileFetcher {
    /// Fetcher for `url` authenticated with `access_token`.
    #[must_use]
    pub fn new(url: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            access_token: access_token.into(),
            session_context: String::new(),
            user_agent: user_agents::SERVICE.to_string(),
        }
    }

    /// Set the session context.
    #[must_use]
    pub fn with_session_context(mut self, session_context: impl Into<String>) -> Self {
        self.session_context = session_context.into();
        self
    }

    /// Override the user agent.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Perform the call.
    ///
    /// # Errors
    ///
    /// - [`FlowError::Transport`] if the request fails
    /// - [`FlowError::Protocol`] on a non-200 status or an undecodable body
    pub async fn fetch(&self, http: &Client, log: &dyn FlowLog) -> Result<ProfileResult> {
        log.info(&format!("Invoking bootstrapper profile via GET: \"{}\"", self.url));

        let mut request = http
            .get(&self.url)
            .bearer_auth(&self.access_token)
            .header(header::USER_AGENT, &self.user_agent);
        if !self.session_context.is_empty() {
            request = request.header(headers::SESSION_CONTEXT, &self.session_context);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = read_body(response).await;

        if status != StatusCode::OK {
            log_unsuccessful_body("Profile", &body, log);
            return Err(FlowError::protocol(format!(
                "Bootstrapper profile endpoint responded with {}",
                status.as_u16()
            )));
        }

        decode_profile_result(&body).inspect_err(|_| log_unsuccessful_body("Profile", &body, log))
    }
}

impl std::fmt::Debug for ProfileFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProfileFetcher")
            .field("url", &self.url)
            .field("access_token", &"...")
            .field("session_context", &self.session_context)
            .finish_non_exhaustive()
    }
}

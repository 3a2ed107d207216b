//! Discovery call.

use super::{log_unsuccessful_body, read_body};
use crate::challenge::parse_authenticate_header;
use crate::connection::BootstrapInfo;
use crate::constants::{headers, user_agents};
use crate::error::{FlowError, Result};
use crate::logging::FlowLog;
use reqwest::{Client, StatusCode, header};

/// Unauthenticated `GET` on the bootstrapper, expecting a 401 challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapFetcher {
    /// Bootstrapper URL.
    pub url: String,
    /// `User-Agent` header.
    pub user_agent: String,
}

impl BootstrapFetcher {
    /// Fetcher for `url` with the default bootstrap user agent.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            user_agent: user_agents::BOOTSTRAP.to_string(),
        }
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
    /// - [`FlowError::Protocol`] on a non-401 status or a missing challenge
    /// - [`FlowError::MissingField`] if the challenge lacks an endpoint
    pub async fn fetch(&self, http: &Client, log: &dyn FlowLog) -> Result<BootstrapInfo> {
        log.info(&format!("Invoking bootstrapper via GET: \"{}\"", self.url));

        let response = http
            .get(&self.url)
            .header(header::USER_AGENT, &self.user_agent)
            .send()
            .await?;

        let status = response.status();
        let challenge = response
            .headers()
            .get(headers::WWW_AUTHENTICATE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        if status != StatusCode::UNAUTHORIZED {
            let body = read_body(response).await;
            log_unsuccessful_body("Bootstrapper", &body, log);
            return Err(FlowError::protocol(format!(
                "Non-401 status code: {}",
                status.as_u16()
            )));
        }

        let Some(challenge) = challenge else {
            let body = read_body(response).await;
            log_unsuccessful_body("Bootstrapper", &body, log);
            return Err(FlowError::protocol("No WWW-Authenticate header on response"));
        };

        parse_authenticate_header(&challenge, log).inspect_err(|_| {
            log.error(&format!("Unable to parse WWW-Authenticate header: \"{challenge}\""));
        })
    }
}

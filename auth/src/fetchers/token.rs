//! Token exchange and refresh.

use super::{log_unsuccessful_body, read_body};
use crate::constants::{headers, user_agents};
use crate::error::{FlowError, Result};
use crate::form::form_encode_pairs;
use crate::logging::FlowLog;
use crate::results::{TokenResult, decode_token_result};
use reqwest::{Client, StatusCode, header};

const REDACTED: &str = "***";

/// Which OAuth2 grant the token call performs.
#[derive(Clone, PartialEq, Eq)]
pub enum GrantMode {
    /// Exchange the code captured at sign-in.
    AuthorizationCode {
        /// The code.
        code: String,
        /// Must match the redirect URL used at sign-in.
        redirect_uri: String,
    },
    /// Trade a refresh token for new tokens.
    RefreshToken {
        /// The refresh token.
        refresh_token: String,
    },
}

impl GrantMode {
    /// The `grant_type` value.
    #[must_use]
    pub const fn grant_type(&self) -> &'static str {
        match self {
            Self::AuthorizationCode { .. } => "authorization_code",
            Self::RefreshToken { .. } => "refresh_token",
        }
    }
}

impl std::fmt::Debug for GrantMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.grant_type())
    }
}

/// Form-encoded `POST` to the token endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenFetcher {
    /// Token endpoint.
    pub url: String,
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Grant to perform.
    pub grant: GrantMode,
    /// Sent as `X-WOPI-SessionContext` when non-empty.
    pub session_context: String,
    /// `User-Agent` header.
    pub user_agent: String,
}

impl TokenFetcher {
    fn with_grant(
        url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        grant: GrantMode,
    ) -> Self {
        Self {
            url: url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            grant,
            session_context: String::new(),
            user_agent: user_agents::SERVICE.to_string(),
        }
    }

    /// An `authorization_code` exchange.
    #[must_use]
    pub fn authorization_code(
        url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        code: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self::with_grant(
            url,
            client_id,
            client_secret,
            GrantMode::AuthorizationCode {
                code: code.into(),
                redirect_uri: redirect_uri.into(),
            },
        )
    }

    /// A `refresh_token` exchange.
    #[must_use]
    pub fn refresh(
        url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self::with_grant(
            url,
            client_id,
            client_secret,
            GrantMode::RefreshToken {
                refresh_token: refresh_token.into(),
            },
        )
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

    /// The encoded request body. With `redact_secret` the client secret is
    /// replaced so the body can be logged.
    #[must_use]
    pub fn form_body(&self, redact_secret: bool) -> String {
        let secret = if redact_secret {
            REDACTED
        } else {
            self.client_secret.as_str()
        };
        let mut pairs = vec![("client_id", self.client_id.as_str()), ("client_secret", secret)];
        match &self.grant {
            GrantMode::AuthorizationCode { code, redirect_uri } => {
                pairs.push(("code", code.as_str()));
                pairs.push(("grant_type", self.grant.grant_type()));
                pairs.push(("redirect_uri", redirect_uri.as_str()));
            }
            GrantMode::RefreshToken { refresh_token } => {
                pairs.push(("refresh_token", refresh_token.as_str()));
                pairs.push(("grant_type", self.grant.grant_type()));
            }
        }
        form_encode_pairs(pairs)
    }

    /// Perform the call.
    ///
    /// # Errors
    ///
    /// - [`FlowError::Transport`] if the request fails
    /// - [`FlowError::Protocol`] on a non-200 status or an undecodable body
    pub async fn fetch(&self, http: &Client, log: &dyn FlowLog) -> Result<TokenResult> {
        log.info(&format!("Invoking token endpoint via POST: \"{}\"", self.url));
        log.info(&format!("POST body={}", self.form_body(true)));

        let mut request = http
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::ACCEPT, "application/json")
            .header(header::USER_AGENT, &self.user_agent);
        if !self.session_context.is_empty() {
            request = request.header(headers::SESSION_CONTEXT, &self.session_context);
        }

        let response = request.body(self.form_body(false)).send().await?;
        let status = response.status();
        let body = read_body(response).await;

        if status != StatusCode::OK {
            log_unsuccessful_body("Token", &body, log);
            return Err(FlowError::protocol(format!(
                "Token endpoint responded with {}",
                status.as_u16()
            )));
        }

        decode_token_result(&body, log).inspect_err(|_| log_unsuccessful_body("Token", &body, log))
    }
}

impl std::fmt::Debug for TokenFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenFetcher")
            .field("url", &self.url)
            .field("grant", &self.grant)
            .field("body", &self.form_body(true))
            .finish_non_exhaustive()
    }
}

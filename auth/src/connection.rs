//! Discovery data, connection records and the in-progress builder.

use crate::error::{FlowError, Result};
use crate::provider::require_https_url;
use crate::redirect::AuthResult;
use crate::results::{ProfileResult, TokenResult};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discovery result from the bootstrap challenge.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapInfo {
    /// Interactive sign-in endpoint.
    pub authorization_url: String,

    /// Code-for-token exchange endpoint.
    pub token_issuance_url: String,

    /// `providerID` challenge parameter, when sent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

impl BootstrapInfo {
    /// Check that both endpoints are HTTPS URLs.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Validation`] naming the offending endpoint.
    pub fn validate(&self) -> Result<()> {
        require_https_url(
            &self.authorization_url,
            "Authorization URL cannot be empty.",
            "Authorization URL must be a valid URL.",
            "Authorization URL must use https.",
        )?;
        require_https_url(
            &self.token_issuance_url,
            "Token issuance URL cannot be empty.",
            "Token issuance URL must be a valid URL.",
            "Token issuance URL must use https.",
        )?;
        Ok(())
    }
}

/// Token endpoint for follow-up calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenEndpoint<'a> {
    /// Override captured on the sign-in redirect.
    PostAuth(&'a str),
    /// Endpoint from discovery.
    Standard(&'a str),
}

impl<'a> TokenEndpoint<'a> {
    /// Pick the override when it is non-empty.
    #[must_use]
    pub const fn select(post_auth: &'a str, standard: &'a str) -> Self {
        if post_auth.is_empty() {
            Self::Standard(standard)
        } else {
            Self::PostAuth(post_auth)
        }
    }

    /// The URL.
    #[must_use]
    pub const fn url(self) -> &'a str {
        match self {
            Self::PostAuth(url) | Self::Standard(url) => url,
        }
    }

    /// The log line announcing the choice.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::PostAuth(_) => "Using post-auth token exchange URL",
            Self::Standard(_) => "Using standard token exchange URL",
        }
    }

    /// Validate the selected URL.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Validation`] unless the URL is HTTPS.
    pub fn validate(self) -> Result<()> {
        require_https_url(
            self.url(),
            "Token exchange URL cannot be empty.",
            "Token exchange URL must be a valid URL.",
            "Token exchange URL must use https.",
        )
        .map(|_| ())
    }
}

/// Absolute expiry for a token lifetime; `None` when it never expires.
///
/// # Errors
///
/// Returns [`FlowError::Protocol`] when `now + token_expiration` is not a
/// representable time.
pub fn expiry_for(now: DateTime<Utc>, token_expiration: i64) -> Result<Option<DateTime<Utc>>> {
    if token_expiration <= 0 {
        return Ok(None);
    }
    TimeDelta::try_seconds(token_expiration)
        .and_then(|lifetime| now.checked_add_signed(lifetime))
        .map(Some)
        .ok_or_else(|| {
            FlowError::protocol(format!("Token lifetime out of range: {token_expiration}"))
        })
}

/// The persisted outcome of one completed flow.
///
/// Identified by `(provider_name, user_id)`. Optional text fields are
/// empty when absent.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionRecord {
    /// Owning provider.
    pub provider_name: String,
    /// Durable user id from the profile call.
    pub user_id: String,
    /// Sign-in name.
    #[serde(default)]
    pub user_name: String,
    /// Friendly name.
    #[serde(default)]
    pub friendly_name: String,
    /// Token endpoint override from the redirect.
    #[serde(default)]
    pub post_auth_token_issuance_url: String,
    /// Session context echoed on token and profile calls.
    #[serde(default)]
    pub session_context: String,
    /// Current access token.
    pub access_token: String,
    /// Lifetime of the access token in seconds; `0` = never expires.
    #[serde(default)]
    pub token_expiration: i64,
    /// When the access token expires.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    /// Refresh token.
    #[serde(default)]
    pub refresh_token: String,
    /// Discovery data.
    pub bootstrap_info: BootstrapInfo,
}

impl ConnectionRecord {
    /// Refresh needs a token lifetime and a refresh token.
    #[must_use]
    pub fn can_refresh(&self) -> bool {
        self.token_expiration > 0 && !self.refresh_token.is_empty()
    }

    /// Re-profiling needs an access token.
    #[must_use]
    pub fn can_reprofile(&self) -> bool {
        !self.access_token.is_empty()
    }

    /// The token endpoint for refresh calls.
    #[must_use]
    pub fn token_endpoint(&self) -> TokenEndpoint<'_> {
        TokenEndpoint::select(
            &self.post_auth_token_issuance_url,
            &self.bootstrap_info.token_issuance_url,
        )
    }

    /// Replace the token fields and recompute `expires_at`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Protocol`] when the lifetime is out of range;
    /// the record is left unchanged.
    pub fn apply_tokens(&mut self, tokens: &TokenResult, now: DateTime<Utc>) -> Result<()> {
        let expires_at = expiry_for(now, tokens.token_expiration)?;
        self.access_token.clone_from(&tokens.access_token);
        self.token_expiration = tokens.token_expiration;
        self.refresh_token.clone_from(&tokens.refresh_token);
        self.expires_at = expires_at;
        Ok(())
    }

    /// Replace the identity fields.
    pub fn apply_profile(&mut self, profile: &ProfileResult) {
        self.user_id.clone_from(&profile.user_id);
        self.user_name.clone_from(&profile.sign_in_name);
        self.friendly_name.clone_from(&profile.friendly_name);
    }

    /// Whether this record belongs to `provider_name` and `user_id`.
    #[must_use]
    pub fn is(&self, provider_name: &str, user_id: &str) -> bool {
        self.provider_name == provider_name && self.user_id == user_id
    }

    /// Check the invariants required before persisting.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Validation`] for the first violated invariant.
    pub fn validate(&self) -> Result<()> {
        if self.provider_name.is_empty() {
            return Err(FlowError::validation("Connection has no provider name."));
        }
        if self.user_id.is_empty() {
            return Err(FlowError::validation("Connection has no user id."));
        }
        if self.access_token.is_empty() {
            return Err(FlowError::validation("Connection has no access token."));
        }
        self.bootstrap_info.validate()
    }
}

impl fmt::Display for ConnectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ConnectionRecord(providerName=\"{}\", userId=\"{}\", userName=\"{}\", \
             friendlyName=\"{}\", accessToken=\"...\", tokenExpiration={}, refreshToken=\"{}\")",
            self.provider_name,
            self.user_id,
            self.user_name,
            self.friendly_name,
            self.token_expiration,
            if self.refresh_token.is_empty() { "" } else { "..." },
        )
    }
}

impl fmt::Debug for ConnectionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Accumulates a [`ConnectionRecord`] across the four flow stages.
///
/// Owned by the flow state; each stage adds its own part.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConnectionBuilder {
    provider_name: String,
    bootstrap: Option<BootstrapInfo>,
    sign_in: Option<AuthResult>,
    tokens: Option<(TokenResult, Option<DateTime<Utc>>)>,
    profile: Option<ProfileResult>,
}

impl ConnectionBuilder {
    /// Start a record for `provider_name`.
    #[must_use]
    pub fn new(provider_name: impl Into<String>) -> Self {
        Self {
            provider_name: provider_name.into(),
            ..Self::default()
        }
    }

    /// Attach discovery data.
    pub fn set_bootstrap(&mut self, info: BootstrapInfo) {
        self.bootstrap = Some(info);
    }

    /// Attach the redirect capture.
    pub fn set_sign_in(&mut self, result: AuthResult) {
        self.sign_in = Some(result);
    }

    /// Attach tokens, deriving the absolute expiry from `now`.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Protocol`] when the lifetime is out of range.
    pub fn set_tokens(&mut self, tokens: TokenResult, now: DateTime<Utc>) -> Result<()> {
        let expires_at = expiry_for(now, tokens.token_expiration)?;
        self.tokens = Some((tokens, expires_at));
        Ok(())
    }

    /// Attach profile data.
    pub fn set_profile(&mut self, profile: ProfileResult) {
        self.profile = Some(profile);
    }

    /// Discovery data, once attached.
    #[must_use]
    pub const fn bootstrap(&self) -> Option<&BootstrapInfo> {
        self.bootstrap.as_ref()
    }

    /// Session context from the redirect, or `""`.
    #[must_use]
    pub fn session_context(&self) -> &str {
        self.sign_in.as_ref().map_or("", |s| s.session_context.as_str())
    }

    /// Authorization code from the redirect, or `""`.
    #[must_use]
    pub fn auth_code(&self) -> &str {
        self.sign_in.as_ref().map_or("", |s| s.auth_code.as_str())
    }

    /// Access token, or `""`.
    #[must_use]
    pub fn access_token(&self) -> &str {
        self.tokens.as_ref().map_or("", |(t, _)| t.access_token.as_str())
    }

    /// The token endpoint to use, once discovery data is attached.
    #[must_use]
    pub fn token_endpoint(&self) -> Option<TokenEndpoint<'_>> {
        let bootstrap = self.bootstrap.as_ref()?;
        let post_auth = self
            .sign_in
            .as_ref()
            .map_or("", |s| s.post_auth_token_issuance_url.as_str());
        Some(TokenEndpoint::select(post_auth, &bootstrap.token_issuance_url))
    }

    /// Assemble and validate the record.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Validation`] if a stage's data is missing or the
    /// record violates [`ConnectionRecord::validate`].
    pub fn build(&self) -> Result<ConnectionRecord> {
        let bootstrap = self
            .bootstrap
            .clone()
            .ok_or_else(|| FlowError::validation("Connection is missing bootstrap data."))?;
        let sign_in = self
            .sign_in
            .as_ref()
            .ok_or_else(|| FlowError::validation("Connection is missing sign-in data."))?;
        let (tokens, expires_at) = self
            .tokens
            .as_ref()
            .ok_or_else(|| FlowError::validation("Connection is missing tokens."))?;
        let profile = self
            .profile
            .as_ref()
            .ok_or_else(|| FlowError::validation("Connection is missing profile data."))?;

        let record = ConnectionRecord {
            provider_name: self.provider_name.clone(),
            user_id: profile.user_id.clone(),
            user_name: profile.sign_in_name.clone(),
            friendly_name: profile.friendly_name.clone(),
            post_auth_token_issuance_url: sign_in.post_auth_token_issuance_url.clone(),
            session_context: sign_in.session_context.clone(),
            access_token: tokens.access_token.clone(),
            token_expiration: tokens.token_expiration,
            expires_at: *expires_at,
            refresh_token: tokens.refresh_token.clone(),
            bootstrap_info: bootstrap,
        };
        record.validate()?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::Duration;
    use wopi_auth_testing::test_clock;
    use wopi_auth_core::environment::Clock;

    fn bootstrap() -> BootstrapInfo {
        BootstrapInfo {
            authorization_url: "https://login.contoso.com/authorize".into(),
            token_issuance_url: "https://login.contoso.com/token".into(),
            provider_id: None,
        }
    }

    fn tokens(expiration: i64, refresh: &str) -> TokenResult {
        TokenResult {
            access_token: "at".into(),
            token_expiration: expiration,
            refresh_token: refresh.into(),
        }
    }

    fn complete_builder() -> ConnectionBuilder {
        let mut builder = ConnectionBuilder::new("Contoso");
        builder.set_bootstrap(bootstrap());
        builder.set_sign_in(AuthResult {
            auth_code: "code".into(),
            session_context: "ctx".into(),
            ..AuthResult::default()
        });
        builder.set_tokens(tokens(3600, "rt"), test_clock().now()).unwrap();
        builder.set_profile(ProfileResult {
            user_id: "u1".into(),
            sign_in_name: "a@b.com".into(),
            friendly_name: "A".into(),
        });
        builder
    }

    #[test]
    fn bootstrap_validation_requires_https() {
        assert!(bootstrap().validate().is_ok());
        let mut info = bootstrap();
        info.token_issuance_url = "http://login.contoso.com/token".into();
        assert_eq!(
            info.validate().unwrap_err().to_string(),
            "Token issuance URL must use https."
        );
    }

    #[test]
    fn builder_composes_all_stages() {
        let record = complete_builder().build().unwrap();
        assert_eq!(record.provider_name, "Contoso");
        assert_eq!(record.user_id, "u1");
        assert_eq!(record.user_name, "a@b.com");
        assert_eq!(record.session_context, "ctx");
        assert_eq!(record.access_token, "at");
        assert_eq!(record.expires_at, Some(test_clock().now() + Duration::seconds(3600)));
        assert_eq!(record.bootstrap_info, bootstrap());
    }

    #[test]
    fn builder_rejects_missing_stage() {
        let mut builder = ConnectionBuilder::new("Contoso");
        builder.set_bootstrap(bootstrap());
        assert!(matches!(builder.build(), Err(FlowError::Validation { .. })));
    }

    #[test]
    fn token_endpoint_prefers_post_auth_override() {
        let mut builder = complete_builder();
        assert_eq!(
            builder.token_endpoint(),
            Some(TokenEndpoint::Standard("https://login.contoso.com/token"))
        );
        builder.set_sign_in(AuthResult {
            auth_code: "code".into(),
            post_auth_token_issuance_url: "https://other/token".into(),
            ..AuthResult::default()
        });
        let endpoint = builder.token_endpoint().unwrap();
        assert_eq!(endpoint, TokenEndpoint::PostAuth("https://other/token"));
        assert_eq!(endpoint.describe(), "Using post-auth token exchange URL");
    }

    #[test]
    fn refresh_and_reprofile_preconditions() {
        let mut record = complete_builder().build().unwrap();
        assert!(record.can_refresh());
        assert!(record.can_reprofile());

        record.token_expiration = 0;
        assert!(!record.can_refresh());

        record.token_expiration = 60;
        record.refresh_token.clear();
        assert!(!record.can_refresh());
    }

    #[test]
    fn apply_tokens_recomputes_expiry() {
        let mut record = complete_builder().build().unwrap();
        let now = test_clock().now() + Duration::hours(2);

        record.apply_tokens(&tokens(60, "rt2"), now).unwrap();
        assert_eq!(record.expires_at, Some(now + Duration::seconds(60)));
        assert_eq!(record.refresh_token, "rt2");

        record.apply_tokens(&tokens(0, ""), now).unwrap();
        assert_eq!(record.expires_at, None);
        assert!(!record.can_refresh());
    }

    #[test]
    fn unrepresentable_lifetime_is_an_error() {
        let now = test_clock().now();
        for lifetime in [10_000_000_000_000, i64::MAX] {
            let error = expiry_for(now, lifetime).unwrap_err();
            assert_eq!(error.kind(), ErrorKind::Protocol);
        }
        assert_eq!(expiry_for(now, -5).unwrap(), None);

        let mut builder = ConnectionBuilder::new("Contoso");
        assert!(builder.set_tokens(tokens(i64::MAX, "rt"), now).is_err());
        assert!(builder.access_token().is_empty());

        let mut record = complete_builder().build().unwrap();
        let before = record.clone();
        assert!(record.apply_tokens(&tokens(i64::MAX, "rt2"), now).is_err());
        assert_eq!(record, before);
    }

    #[test]
    fn display_masks_tokens() {
        let record = complete_builder().build().unwrap();
        let shown = record.to_string();
        assert!(shown.contains("accessToken=\"...\""));
        assert!(!shown.contains("\"at\""));
        assert!(!format!("{record:?}").contains("\"rt\""));
    }
}

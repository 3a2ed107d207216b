//! Provider configuration and validation.

use crate::error::{FlowError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// One configured identity provider.
///
/// `provider_name` is the display key and must be unique among configured
/// providers; connections refer to their provider by name.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Display name, unique among providers.
    pub provider_name: String,

    /// HTTPS bootstrapper endpoint (discovery and profile).
    pub bootstrapper: String,

    /// OAuth client id.
    pub client_id: String,

    /// OAuth client secret.
    pub client_secret: String,

    /// HTTPS redirect URL registered with the provider.
    pub redirect_url: String,

    /// Requested scope, passed through unvalidated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl ProviderConfig {
    /// Create a provider without a scope.
    #[must_use]
    pub fn new(
        provider_name: impl Into<String>,
        bootstrapper: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        redirect_url: impl Into<String>,
    ) -> Self {
        Self {
            provider_name: provider_name.into(),
            bootstrapper: bootstrapper.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            redirect_url: redirect_url.into(),
            scope: None,
        }
    }

    /// Set the scope.
    #[must_use]
    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// Trim surrounding whitespace from every text field.
    pub fn trim_spaces(&mut self) {
        for field in [
            &mut self.provider_name,
            &mut self.bootstrapper,
            &mut self.client_id,
            &mut self.client_secret,
            &mut self.redirect_url,
        ] {
            trim_in_place(field);
        }
        if let Some(scope) = self.scope.as_mut() {
            trim_in_place(scope);
        }
    }

    /// Consuming variant of [`trim_spaces`](Self::trim_spaces).
    #[must_use]
    pub fn trimmed(mut self) -> Self {
        self.trim_spaces();
        self
    }

    /// Check every invariant, reporting the first problem found.
    ///
    /// # Errors
    ///
    /// Returns [`FlowError::Validation`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        require_non_empty(&self.provider_name, "Provider Name cannot be empty.")?;
        require_https_url(
            &self.bootstrapper,
            "Bootstrapper URL cannot be empty.",
            "Bootstrapper must be a valid URL.",
            "Bootstrapper URL must use https.",
        )?;
        require_non_empty(&self.client_id, "Client ID cannot be empty.")?;
        require_non_empty(&self.client_secret, "Client Secret cannot be empty.")?;
        require_https_url(
            &self.redirect_url,
            "Redirect URL cannot be empty.",
            "Redirect URL must be a valid URL.",
            "Redirect URL must use https.",
        )?;
        Ok(())
    }

    /// The scope, or `""` when none is configured.
    #[must_use]
    pub fn scope_or_empty(&self) -> &str {
        self.scope.as_deref().unwrap_or_default()
    }

    /// The parsed redirect URL.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the redirect URL does not parse.
    pub fn parsed_redirect_url(&self) -> Result<Url> {
        Url::parse(self.redirect_url.trim())
            .map_err(|_| FlowError::validation("Redirect URL must be a valid URL."))
    }
}

impl fmt::Display for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ProviderConfig(providerName=\"{}\", bootstrapper=\"{}\", clientId=\"{}\", \
             clientSecret=\"*\", redirectUrl=\"{}\", scope=\"{}\")",
            self.provider_name,
            self.bootstrapper,
            self.client_id,
            self.redirect_url,
            self.scope_or_empty()
        )
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider_name", &self.provider_name)
            .field("bootstrapper", &self.bootstrapper)
            .field("client_id", &self.client_id)
            .field("client_secret", &"*")
            .field("redirect_url", &self.redirect_url)
            .field("scope", &self.scope)
            .finish()
    }
}

fn trim_in_place(value: &mut String) {
    let trimmed = value.trim();
    if trimmed.len() != value.len() {
        *value = trimmed.to_string();
    }
}

fn require_non_empty(value: &str, message: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(FlowError::validation(message))
    } else {
        Ok(())
    }
}

/// Parse `value` as an absolute HTTPS URL.
///
/// # Errors
///
/// Returns [`FlowError::Validation`] with `empty`, `invalid` or `insecure`
/// as the message depending on what is wrong.
pub fn require_https_url(value: &str, empty: &str, invalid: &str, insecure: &str) -> Result<Url> {
    let value = value.trim();
    if value.is_empty() {
        return Err(FlowError::validation(empty));
    }
    let url = Url::parse(value).map_err(|_| FlowError::validation(invalid))?;
    if !url.has_host() {
        return Err(FlowError::validation(invalid));
    }
    if url.scheme() != "https" {
        return Err(FlowError::validation(insecure));
    }
    Ok(url)
}

//! Interactive sign-in: URL construction and redirect capture.
//!
//! The browser itself lives outside this crate (see
//! [`SignInSurface`](crate::providers::SignInSurface)). It feeds every
//! navigation to a [`RedirectWatcher`], which decides whether to let the
//! page load or to capture the redirect and close the surface.

use crate::config::ClientInfo;
use crate::connection::BootstrapInfo;
use crate::error::{FlowError, Result};
use crate::logging::SharedLog;
use crate::provider::ProviderConfig;
use crate::redirect::{AuthResult, parse_redirect_query};
use url::Url;

/// Build the interactive sign-in URL.
///
/// The authorization URL's own query is replaced.
///
/// # Errors
///
/// Returns [`FlowError::Validation`] if the authorization URL does not parse.
pub fn build_sign_in_url(
    bootstrap: &BootstrapInfo,
    provider: &ProviderConfig,
    client: &ClientInfo,
) -> Result<Url> {
    let mut url = Url::parse(bootstrap.authorization_url.trim())
        .map_err(|_| FlowError::validation("Authorization URL must be a valid URL."))?;

    url.query_pairs_mut()
        .clear()
        .append_pair("client_id", &provider.client_id)
        .append_pair("redirect_uri", &provider.redirect_url)
        .append_pair("response_type", "code")
        .append_pair("rs", &client.culture)
        .append_pair("build", &client.client_build)
        .append_pair("platform", &client.client_platform)
        .append_pair("scope", provider.scope_or_empty());

    Ok(url)
}

/// The scheme, host and path a redirect must match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTarget {
    scheme: String,
    host: Option<String>,
    path: String,
}

impl RedirectTarget {
    /// Target for the configured redirect URL.
    #[must_use]
    pub fn new(redirect_url: &Url) -> Self {
        Self {
            scheme: redirect_url.scheme().to_string(),
            host: redirect_url.host_str().map(str::to_string),
            path: redirect_url.path().to_string(),
        }
    }

    /// Whether `url` is a navigation to this target.
    ///
    /// Paths match when equal, or when one is empty and the other is `/`.
    #[must_use]
    pub fn matches(&self, url: &Url) -> bool {
        url.scheme() == self.scheme
            && url.host_str() == self.host.as_deref()
            && paths_match(url.path(), &self.path)
    }
}

fn paths_match(a: &str, b: &str) -> bool {
    a == b || (a.is_empty() && b == "/") || (a == "/" && b.is_empty())
}

/// What the sign-in surface should do with a navigation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationDecision {
    /// Not the redirect; let it load.
    Allow,
    /// The redirect: cancel the navigation, close the surface and resolve
    /// with this outcome.
    Capture(Result<AuthResult>),
    /// A capture already happened; do nothing.
    Ignore,
}

/// Inspects navigations until the redirect is captured, exactly once.
pub struct RedirectWatcher {
    target: RedirectTarget,
    captured: bool,
    log: SharedLog,
}

impl RedirectWatcher {
    /// Watch for navigations to `redirect_url`.
    #[must_use]
    pub fn new(redirect_url: &Url, log: SharedLog) -> Self {
        Self {
            target: RedirectTarget::new(redirect_url),
            captured: false,
            log,
        }
    }

    /// Whether the redirect has been captured.
    #[must_use]
    pub const fn is_captured(&self) -> bool {
        self.captured
    }

    /// Decide on one navigation.
    pub fn observe(&mut self, navigation: &str) -> NavigationDecision {
        if self.captured {
            return NavigationDecision::Ignore;
        }

        let url = match Url::parse(navigation.trim()) {
            Ok(url) => url,
            Err(error) => {
                self.log
                    .warning(&format!("Unable to parse navigation \"{navigation}\": {error}"));
                return NavigationDecision::Allow;
            }
        };

        if url.scheme() != "https" {
            self.log.warning(&format!("Navigation to non-https URL: {url}"));
        }

        if !self.target.matches(&url) {
            return NavigationDecision::Allow;
        }

        let Some(query) = url.query() else {
            self.log
                .info(&format!("Redirect URL reached without parameters: {url}"));
            return NavigationDecision::Allow;
        };

        self.captured = true;
        let result = parse_redirect_query(query, self.log.as_ref());
        NavigationDecision::Capture(result.into_outcome())
    }
}

impl std::fmt::Debug for RedirectWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedirectWatcher")
            .field("target", &self.target)
            .field("captured", &self.captured)
            .finish_non_exhaustive()
    }
}

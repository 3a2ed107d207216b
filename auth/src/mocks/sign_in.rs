//! Scripted sign-in surface.

use crate::error::{FlowError, Result};
use crate::providers::SignInSurface;
use crate::redirect::AuthResult;
use crate::sign_in::{NavigationDecision, RedirectWatcher};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use url::Url;

/// A browser that visits a fixed list of URLs.
///
/// Each navigation is handed to the watcher; the first capture resolves
/// the sign-in. Running out of navigations means the user closed the
/// window.
#[derive(Debug, Clone, Default)]
pub struct MockSignInSurface {
    navigations: Vec<String>,
    opened: Arc<Mutex<Vec<Url>>>,
}

impl MockSignInSurface {
    /// Surface that visits `navigations` in order.
    #[must_use]
    pub fn navigating<I, U>(navigations: I) -> Self
    where
        I: IntoIterator<Item = U>,
        U: Into<String>,
    {
        Self {
            navigations: navigations.into_iter().map(Into::into).collect(),
            opened: Arc::default(),
        }
    }

    /// Surface that lands on `redirect` after one unrelated page.
    #[must_use]
    pub fn redirecting_to(redirect: impl Into<String>) -> Self {
        Self::navigating(["https://login.contoso.com/consent".to_string(), redirect.into()])
    }

    /// Surface closed before any redirect.
    #[must_use]
    pub fn abandoned() -> Self {
        Self::default()
    }

    /// Sign-in URLs opened so far.
    #[must_use]
    pub fn opened(&self) -> Vec<Url> {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl SignInSurface for MockSignInSurface {
    fn sign_in(
        &self,
        url: Url,
        mut watcher: RedirectWatcher,
    ) -> impl Future<Output = Result<AuthResult>> + Send {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url);
        let navigations = self.navigations.clone();

        async move {
            for navigation in &navigations {
                if let NavigationDecision::Capture(outcome) = watcher.observe(navigation) {
                    return outcome;
                }
            }
            Err(FlowError::SignInAbandoned)
        }
    }
}

//! Sign-in redirect query parsing.

use crate::constants::redirect;
use crate::error::{FlowError, Result};
use crate::logging::FlowLog;
use percent_encoding::percent_decode_str;

/// Parameters captured from the terminal sign-in redirect.
///
/// Absent parameters are empty strings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthResult {
    /// Authorization code.
    pub auth_code: String,
    /// Token endpoint override (`tk`).
    pub post_auth_token_issuance_url: String,
    /// Session context (`sc`).
    pub session_context: String,
    /// OAuth2 `error`.
    pub error: String,
    /// OAuth2 `error_description`.
    pub error_description: String,
    /// OAuth2 `error_uri`.
    pub error_uri: String,
}

impl AuthResult {
    /// A capture is a success exactly when it carries a code.
    #[must_use]
    pub fn is_success(&self) -> bool {
        !self.auth_code.is_empty()
    }

    /// Turn the capture into the sign-in stage outcome.
    ///
    /// # Errors
    ///
    /// [`FlowError::SignInRejected`] when the provider sent an `error`,
    /// otherwise [`FlowError::MissingAuthCode`] when there is no code.
    pub fn into_outcome(self) -> Result<Self> {
        if self.is_success() {
            Ok(self)
        } else if !self.error.is_empty() {
            Err(FlowError::SignInRejected {
                error: self.error,
                description: self.error_description,
                uri: self.error_uri,
            })
        } else {
            Err(FlowError::MissingAuthCode)
        }
    }

    fn slot(&mut self, name: &str) -> Option<&mut String> {
        match name {
            redirect::CODE => Some(&mut self.auth_code),
            redirect::TOKEN_URL => Some(&mut self.post_auth_token_issuance_url),
            redirect::SESSION_CONTEXT => Some(&mut self.session_context),
            redirect::ERROR => Some(&mut self.error),
            redirect::ERROR_DESCRIPTION => Some(&mut self.error_description),
            redirect::ERROR_URI => Some(&mut self.error_uri),
            _ => None,
        }
    }
}

fn decode(component: &str) -> String {
    percent_decode_str(component).decode_utf8_lossy().into_owned()
}

/// Parse a redirect query string (without the leading `?`).
///
/// Names are matched case-insensitively; a name that is not already
/// lowercase is accepted with a warning. Unknown names are logged and
/// skipped. A repeated name keeps its last value.
pub fn parse_redirect_query(query: &str, log: &dyn FlowLog) -> AuthResult {
    log.info(&format!("Redirect query: {query}"));
    let mut result = AuthResult::default();

    for pair in query.split('&').filter(|p| !p.is_empty()) {
        let (raw_name, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let name = decode(raw_name);
        let lower = name.to_lowercase();

        let Some(slot) = result.slot(&lower) else {
            log.warning(&format!("Unrecognized redir parameter: {name}"));
            continue;
        };
        if name != lower {
            log.warning(&format!(
                "Redirect params must be lowercase: matched {name} as {lower}"
            ));
        }
        *slot = decode(raw_value);
    }

    if !result.error.is_empty() {
        log.error(&format!(
            "Sign-in error \"{}\": {} ({})",
            result.error, result.error_description, result.error_uri
        ));
    }
    if result.is_success() {
        log.info("Received auth_code");
    }
    if !result.post_auth_token_issuance_url.is_empty() {
        log.info(&format!(
            "Received post-auth token issuance URL: {}",
            result.post_auth_token_issuance_url
        ));
    }
    if !result.session_context.is_empty() {
        log.info(&format!("Received session context: {}", result.session_context));
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogLevel;
    use crate::mocks::RecordingLog;
    use proptest::prelude::*;

    #[test]
    fn parses_success_redirect() {
        let log = RecordingLog::new();
        let result = parse_redirect_query(
            "code=abc&tk=https%3A%2F%2Flogin.contoso.com%2Ftoken2&sc=ctx%201",
            &log,
        );
        assert_eq!(result.auth_code, "abc");
        assert_eq!(result.post_auth_token_issuance_url, "https://login.contoso.com/token2");
        assert_eq!(result.session_context, "ctx 1");
        assert!(result.is_success());
        assert!(log.contains_at(LogLevel::Info, "Received auth_code"));
    }

    #[test]
    fn plus_is_kept_literally() {
        let result = parse_redirect_query("code=a+b", &RecordingLog::new());
        assert_eq!(result.auth_code, "a+b");
    }

    #[test]
    fn error_only_redirect_is_a_rejection() {
        let log = RecordingLog::new();
        let result = parse_redirect_query("error=access_denied", &log);
        assert_eq!(result.error, "access_denied");
        assert!(!result.is_success());
        assert!(log.contains_at(LogLevel::Error, "access_denied"));

        assert_eq!(
            result.into_outcome(),
            Err(FlowError::SignInRejected {
                error: "access_denied".into(),
                description: String::new(),
                uri: String::new(),
            })
        );
    }

    #[test]
    fn code_wins_over_error() {
        let result = parse_redirect_query("error=x&code=c", &RecordingLog::new());
        assert_eq!(result.into_outcome().unwrap().auth_code, "c");
    }

    #[test]
    fn nothing_useful_is_missing_auth_code() {
        let result = parse_redirect_query("code=&state=1", &RecordingLog::new());
        assert_eq!(result.into_outcome(), Err(FlowError::MissingAuthCode));
    }

    #[test]
    fn unknown_parameters_are_warned_and_ignored() {
        let log = RecordingLog::new();
        let result = parse_redirect_query("state=xyz&code=c", &log);
        assert_eq!(result.auth_code, "c");
        assert!(log.contains_at(LogLevel::Warning, "Unrecognized redir parameter: state"));
    }

    #[test]
    fn last_value_wins() {
        let result = parse_redirect_query("sc=1&sc=2&code=c", &RecordingLog::new());
        assert_eq!(result.session_context, "2");
    }

    proptest! {
        #[test]
        fn code_matches_in_any_case(name in "[cC][oO][dD][eE]", value in "[A-Za-z0-9_-]{1,24}") {
            let log = RecordingLog::new();
            let result = parse_redirect_query(&format!("{name}={value}"), &log);
            prop_assert_eq!(&result.auth_code, &value);
            let warned = log.contains_at(LogLevel::Warning, "must be lowercase");
            prop_assert_eq!(warned, name != "code");
        }
    }
}

//! `WWW-Authenticate` challenge parsing.
//!
//! The bootstrapper answers an unauthenticated request with
//!
//! ```text
//! WWW-Authenticate: Bearer authorization_uri="https://…",tokenIssuance_uri="https://…",providerID="…"
//! ```
//!
//! The header is tokenized by splitting on `=` and `,` and pairing the
//! tokens by index parity. A value containing `=` or `,` (a URL with a
//! query string, say) is therefore split too; this is the dialect the
//! bootstrappers are tested against, so it is kept as is.

use crate::connection::BootstrapInfo;
use crate::constants::challenge;
use crate::error::{FlowError, Result};
use crate::logging::FlowLog;
use std::collections::BTreeMap;

/// Tokenize a challenge into its parameters.
///
/// Every `Bearer` is removed first. Even-indexed tokens are names, each
/// followed by its value; a trailing name without a value maps to `""`.
#[must_use]
pub fn parse_challenge_params(header: &str) -> BTreeMap<String, String> {
    let stripped = header.replace("Bearer", "");
    let mut params = BTreeMap::new();
    let mut current: Option<String> = None;

    for (index, token) in stripped.trim().split(['=', ',']).enumerate() {
        let token = token.trim_matches(|c: char| c.is_whitespace() || c == '"');
        if index % 2 == 0 {
            params.insert(token.to_string(), String::new());
            current = Some(token.to_string());
        } else if let Some(name) = current.as_ref() {
            params.insert(name.clone(), token.to_string());
        }
    }
    params
}

/// Parse a challenge into discovery data.
///
/// URLs are not validated here; see [`BootstrapInfo::validate`].
///
/// # Errors
///
/// Returns [`FlowError::MissingField`] when `authorization_uri` or
/// `tokenIssuance_uri` is absent (checked in that order).
pub fn parse_authenticate_header(header: &str, log: &dyn FlowLog) -> Result<BootstrapInfo> {
    log.info(&format!("WWW-Authenticate: {header}"));
    let mut params = parse_challenge_params(header);

    let mut take = |field: &str| {
        params.remove(field).ok_or_else(|| {
            log.error(&format!("No {field} in WWW-Authenticate header"));
            FlowError::MissingField {
                field: field.to_string(),
            }
        })
    };

    let authorization_url = take(challenge::AUTHORIZATION_URI)?;
    let token_issuance_url = take(challenge::TOKEN_ISSUANCE_URI)?;
    let provider_id = params
        .remove(challenge::PROVIDER_ID)
        .filter(|id| !id.is_empty());

    Ok(BootstrapInfo {
        authorization_url,
        token_issuance_url,
        provider_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogLevel;
    use crate::mocks::RecordingLog;
    use proptest::prelude::*;

    #[test]
    fn parses_standard_challenge() {
        let log = RecordingLog::new();
        let info = parse_authenticate_header(
            r#"Bearer authorization_uri="https://login.contoso.com/authorize",tokenIssuance_uri="https://login.contoso.com/token",providerID="tp_contoso""#,
            &log,
        )
        .unwrap();

        assert_eq!(info.authorization_url, "https://login.contoso.com/authorize");
        assert_eq!(info.token_issuance_url, "https://login.contoso.com/token");
        assert_eq!(info.provider_id.as_deref(), Some("tp_contoso"));
        assert!(log.contains("WWW-Authenticate: Bearer"));
    }

    #[test]
    fn tolerates_spaces_around_separators() {
        let info = parse_authenticate_header(
            r#"  Bearer authorization_uri = "https://a/x" , tokenIssuance_uri = "https://a/t"  "#,
            &RecordingLog::new(),
        )
        .unwrap();
        assert_eq!(info.authorization_url, "https://a/x");
        assert_eq!(info.token_issuance_url, "https://a/t");
        assert_eq!(info.provider_id, None);
    }

    #[test]
    fn every_bearer_is_removed() {
        let params = parse_challenge_params(r#"Bearer authorization_uri="https://a/Bearer/x""#);
        assert_eq!(params["authorization_uri"], "https://a//x");
    }

    #[test]
    fn missing_authorization_uri_is_reported_first() {
        let log = RecordingLog::new();
        let error = parse_authenticate_header("Bearer realm=\"x\"", &log).unwrap_err();
        assert_eq!(
            error,
            FlowError::MissingField {
                field: "authorization_uri".into()
            }
        );
        assert!(log.contains_at(LogLevel::Error, "No authorization_uri"));
    }

    #[test]
    fn missing_token_uri_is_reported() {
        let error =
            parse_authenticate_header(r#"Bearer authorization_uri="https://a/x""#, &RecordingLog::new())
                .unwrap_err();
        assert_eq!(
            error,
            FlowError::MissingField {
                field: "tokenIssuance_uri".into()
            }
        );
    }

    #[test]
    fn dangling_key_counts_as_present_but_empty() {
        let info = parse_authenticate_header(
            r#"Bearer authorization_uri="https://a/x",tokenIssuance_uri"#,
            &RecordingLog::new(),
        )
        .unwrap();
        assert_eq!(info.token_issuance_url, "");
        assert!(info.validate().is_err());
    }

    #[test]
    fn query_string_in_value_is_split() {
        let params = parse_challenge_params(
            r#"Bearer authorization_uri="https://a/x?p=1",tokenIssuance_uri="https://a/t""#,
        );
        assert_eq!(params["authorization_uri"], "https://a/x?p");
    }

    proptest! {
        #[test]
        fn well_formed_headers_round_trip(
            a in "https://[a-z]{1,12}\\.com/[a-z/]{0,12}",
            b in "https://[a-z]{1,12}\\.com/[a-z/]{0,12}",
        ) {
            let header = format!("Bearer authorization_uri=\"{a}\",tokenIssuance_uri=\"{b}\"");
            let info = parse_authenticate_header(&header, &RecordingLog::new()).unwrap();
            prop_assert_eq!(info.authorization_url, a);
            prop_assert_eq!(info.token_issuance_url, b);
        }
    }
}

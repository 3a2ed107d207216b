//! Decoders for the token and profile JSON bodies.
//!
//! Both decoders work on the raw body so that a wrongly-typed field is
//! reported the same way as a missing one.

use crate::error::{FlowError, Result};
use crate::logging::FlowLog;
use serde_json::{Map, Number, Value};
use std::fmt;

/// Result of a token exchange or refresh.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct TokenResult {
    /// Bearer token for the profile call. Never empty.
    pub access_token: String,

    /// Lifetime in seconds; `0` means the token does not expire.
    pub token_expiration: i64,

    /// Refresh token, empty when none was issued.
    pub refresh_token: String,
}

impl fmt::Debug for TokenResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResult")
            .field("access_token", &"...")
            .field("token_expiration", &self.token_expiration)
            .field("refresh_token", &if self.refresh_token.is_empty() { "" } else { "..." })
            .finish()
    }
}

/// Result of the authenticated profile call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProfileResult {
    /// Durable identity key. Never empty.
    pub user_id: String,

    /// Sign-in name, empty when absent.
    pub sign_in_name: String,

    /// Friendly name, empty when absent.
    pub friendly_name: String,
}

fn parse_object(body: &[u8], what: &str) -> Result<Map<String, Value>> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(FlowError::protocol(format!("{what} response is not a JSON object"))),
        Err(error) => Err(FlowError::protocol(format!("Malformed {what} response: {error}"))),
    }
}

fn string_field<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key).and_then(Value::as_str)
}

/// Longest accepted `expires_in`, in seconds.
pub const MAX_TOKEN_LIFETIME: i64 = i32::MAX as i64;

/// `expires_in` in whole seconds. Fractions are truncated.
fn token_lifetime(n: &Number) -> Result<i64> {
    let max = f64::from(i32::MAX);
    #[allow(clippy::cast_possible_truncation)]
    let seconds = n.as_i64().or_else(|| {
        n.as_f64()
            .filter(|f| (0.0..=max).contains(f))
            .map(|f| f as i64)
    });
    match seconds {
        Some(seconds) if (0..=MAX_TOKEN_LIFETIME).contains(&seconds) => Ok(seconds),
        _ => Err(FlowError::protocol(format!("Invalid expires_in: {n}"))),
    }
}

/// Decode a token endpoint body.
///
/// `access_token` and `token_type` are required strings. `expires_in` is
/// read only when it is a JSON number, and must then lie between zero and
/// [`MAX_TOKEN_LIFETIME`]. `refresh_token` is read only when it is a
/// string.
///
/// # Errors
///
/// Returns [`FlowError::Protocol`] when the body is not a JSON object, a
/// required field is missing, mistyped or empty, or `expires_in` is out of
/// range.
pub fn decode_token_result(body: &[u8], log: &dyn FlowLog) -> Result<TokenResult> {
    let map = parse_object(body, "Token")?;

    let access_token = string_field(&map, "access_token")
        .ok_or_else(|| FlowError::protocol("Unable to extract access_token"))?;
    if access_token.is_empty() {
        return Err(FlowError::protocol("Empty access_token"));
    }

    let token_type =
        string_field(&map, "token_type").ok_or_else(|| FlowError::protocol("No token_type"))?;
    log.info(&format!("Token type = \"{token_type}\""));

    let token_expiration = match map.get("expires_in") {
        Some(Value::Number(n)) => token_lifetime(n)?,
        _ => 0,
    };

    let refresh_token = string_field(&map, "refresh_token").unwrap_or_default();

    Ok(TokenResult {
        access_token: access_token.to_string(),
        token_expiration,
        refresh_token: refresh_token.to_string(),
    })
}

/// Decode a bootstrapper profile body.
///
/// # Errors
///
/// Returns [`FlowError::Protocol`] when the body is not a JSON object or
/// `UserId` is missing, mistyped or empty.
pub fn decode_profile_result(body: &[u8]) -> Result<ProfileResult> {
    let map = parse_object(body, "Profile")?;

    let user_id =
        string_field(&map, "UserId").ok_or_else(|| FlowError::protocol("Unable to extract UserId"))?;
    if user_id.is_empty() {
        return Err(FlowError::protocol("Empty UserId"));
    }

    Ok(ProfileResult {
        user_id: user_id.to_string(),
        sign_in_name: string_field(&map, "SignInName").unwrap_or_default().to_string(),
        friendly_name: string_field(&map, "UserFriendlyName").unwrap_or_default().to_string(),
    })
}

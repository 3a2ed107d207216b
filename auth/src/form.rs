//! `application/x-www-form-urlencoded` codec for the token request body.
//!
//! Values are percent-encoded with every byte escaped except ASCII
//! alphanumerics, `-`, `.`, `_`, `*` and space; spaces are then replaced
//! with `+`. Providers compare these bytes, so the alphabet is fixed.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use std::collections::BTreeMap;

const FORM_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'*')
    .remove(b' ');

/// Encode one name or value.
///
/// ```
/// # use wopi_auth::form::form_encode;
/// assert_eq!(form_encode("a b+c/d~"), "a+b%2Bc%2Fd%7E");
/// ```
#[must_use]
pub fn form_encode(value: &str) -> String {
    utf8_percent_encode(value, FORM_VALUE).to_string().replace(' ', "+")
}

/// Encode `pairs` in order as `name=value&name=value`.
#[must_use]
pub fn form_encode_pairs<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    pairs
        .into_iter()
        .map(|(name, value)| format!("{}={}", form_encode(name), form_encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Decode one encoded name or value: `+` becomes space, then escapes are
/// resolved. Invalid UTF-8 is replaced.
#[must_use]
pub fn form_decode_component(encoded: &str) -> String {
    percent_decode_str(&encoded.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

/// Decode a whole body into a map. Later duplicates win.
#[must_use]
pub fn form_decode(body: &str) -> BTreeMap<String, String> {
    body.split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (form_decode_component(name), form_decode_component(value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn unreserved_characters_pass_through() {
        assert_eq!(form_encode("Az09-._*"), "Az09-._*");
    }

    #[test]
    fn reserved_characters_are_escaped() {
        assert_eq!(form_encode("https://x/y?z=1&w"), "https%3A%2F%2Fx%2Fy%3Fz%3D1%26w");
        assert_eq!(form_encode("~!'()"), "%7E%21%27%28%29");
        assert_eq!(form_encode("é"), "%C3%A9");
    }

    #[test]
    fn spaces_become_plus_and_plus_is_escaped() {
        assert_eq!(form_encode("a b"), "a+b");
        assert_eq!(form_encode("x+y"), "x%2By");
    }

    #[test]
    fn pairs_keep_their_order() {
        let body = form_encode_pairs([("client_id", "a b"), ("code", "x+y")]);
        assert_eq!(body, "client_id=a+b&code=x%2By");
    }

    #[test]
    fn round_trip_of_token_fields() {
        let body = form_encode_pairs([("client_id", "a b"), ("code", "x+y")]);
        let decoded = form_decode(&body);
        let expected: BTreeMap<String, String> = [("client_id", "a b"), ("code", "x+y")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn decode_tolerates_bare_names() {
        let decoded = form_decode("flag&x=1&&x=2");
        assert_eq!(decoded.get("flag").map(String::as_str), Some(""));
        assert_eq!(decoded.get("x").map(String::as_str), Some("2"));
    }

    proptest! {
        #[test]
        fn any_value_survives_encoding(value in "\\PC*") {
            prop_assert_eq!(form_decode_component(&form_encode(&value)), value);
        }

        #[test]
        fn encoded_output_is_url_safe(value in "\\PC*") {
            let encoded = form_encode(&value);
            prop_assert!(encoded.bytes().all(|b| b.is_ascii_alphanumeric() || b"-._*+%".contains(&b)));
        }
    }
}

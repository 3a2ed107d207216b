//! Wire constants of the WOPI bootstrapper dialect.

/// Header names.
pub mod headers {
    /// Echoes the provider's session context on token and profile calls.
    pub const SESSION_CONTEXT: &str = "X-WOPI-SessionContext";

    /// Challenge header on the bootstrap 401.
    pub const WWW_AUTHENTICATE: &str = "WWW-Authenticate";
}

/// Client identification strings.
pub mod user_agents {
    /// Sent on the unauthenticated bootstrap call.
    pub const BOOTSTRAP: &str = "Word/1.22.16051600 CFNetwork/758.2.8 Darwin/15.4.0";

    /// Sent on token and profile calls.
    pub const SERVICE: &str = "Microsoft Office Identity Service";
}

/// Challenge parameter names.
pub mod challenge {
    /// Where the user signs in.
    pub const AUTHORIZATION_URI: &str = "authorization_uri";

    /// Where codes are exchanged for tokens.
    pub const TOKEN_ISSUANCE_URI: &str = "tokenIssuance_uri";

    /// Provider identifier (informational).
    pub const PROVIDER_ID: &str = "providerID";
}

/// Redirect query parameter names. Providers must send them lowercase.
pub mod redirect {
    /// Authorization code.
    pub const CODE: &str = "code";
    /// Post-auth token issuance URL override.
    pub const TOKEN_URL: &str = "tk";
    /// Session context.
    pub const SESSION_CONTEXT: &str = "sc";
    /// OAuth2 error code.
    pub const ERROR: &str = "error";
    /// OAuth2 error description.
    pub const ERROR_DESCRIPTION: &str = "error_description";
    /// OAuth2 error URI.
    pub const ERROR_URI: &str = "error_uri";
}

/// Flow stage log lines.
pub mod messages {
    /// First line of a flow.
    pub const FLOW_START: &str = "START WOPI client authentication flow";
    /// Last line of a successful flow.
    pub const FLOW_SUCCESS: &str = "SUCCESS WOPI client authentication flow";
    /// Cancellation notice.
    pub const USER_CANCELLED: &str = "User cancelled request";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_names_are_lowercase() {
        for name in [
            redirect::CODE,
            redirect::TOKEN_URL,
            redirect::SESSION_CONTEXT,
            redirect::ERROR,
            redirect::ERROR_DESCRIPTION,
            redirect::ERROR_URI,
        ] {
            assert_eq!(name, name.to_lowercase());
        }
    }
}

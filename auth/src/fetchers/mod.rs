//! HTTP fetchers for the three network stages.
//!
//! Each fetcher is a plain value holding the URL and parameters of one
//! request. [`fetch`](BootstrapFetcher::fetch) performs the request and
//! returns the decoded result; cancellation and serialized delivery are
//! handled by the store that runs the fetch as an effect.

pub mod bootstrap;
pub mod profile;
pub mod token;

pub use bootstrap::BootstrapFetcher;
pub use profile::ProfileFetcher;
pub use token::{GrantMode, TokenFetcher};

use crate::logging::FlowLog;
use reqwest::Response;

/// Read the whole body, treating a failed read as empty.
pub(crate) async fn read_body(response: Response) -> Vec<u8> {
    match response.bytes().await {
        Ok(bytes) => bytes.to_vec(),
        Err(error) => {
            tracing::debug!(%error, "failed to read response body");
            Vec::new()
        }
    }
}

/// Log a failed call's body for diagnosis.
pub(crate) fn log_unsuccessful_body(stage: &str, body: &[u8], log: &dyn FlowLog) {
    log.error(&format!("{stage} call unsuccessful. Body of response follows."));
    if body.is_empty() {
        log.error("<no response body>");
    } else {
        log.error(&String::from_utf8_lossy(body));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::LogLevel;
    use crate::mocks::RecordingLog;

    #[test]
    fn empty_body_is_called_out() {
        let log = RecordingLog::new();
        log_unsuccessful_body("Token", b"", &log);
        assert!(log.contains_at(LogLevel::Error, "Token call unsuccessful"));
        assert!(log.contains("<no response body>"));
    }

    #[test]
    fn body_is_logged_verbatim() {
        let log = RecordingLog::new();
        log_unsuccessful_body("Profile", b"{\"error\":\"nope\"}", &log);
        assert!(log.contains("{\"error\":\"nope\"}"));
    }
}

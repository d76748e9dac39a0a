use thiserror::Error;

/// Failure taxonomy for upstream API access.
///
/// `Configuration` is local and fatal (missing credential, bad base URL).
/// `Upstream` carries the HTTP status and body of a non-success response.
/// `Transport` covers connection failures and timeouts. Callers decide per
/// call site whether a failure skips the item or fails the whole invocation;
/// nothing here retries.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("upstream API returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
}

impl FetchError {
    /// Machine-readable code for tool error payloads.
    pub fn code(&self) -> &'static str {
        match self {
            FetchError::Configuration(_) => codes::CONFIGURATION_ERROR,
            FetchError::Upstream { .. } => codes::UPSTREAM_ERROR,
            FetchError::Transport(_) => codes::TRANSPORT_ERROR,
        }
    }
}

/// Error codes used across tool payloads
pub mod codes {
    pub const CONFIGURATION_ERROR: &str = "configuration_error";
    pub const UPSTREAM_ERROR: &str = "upstream_error";
    pub const TRANSPORT_ERROR: &str = "transport_error";
    pub const VALIDATION_FAILED: &str = "validation_failed";
    pub const UNKNOWN_TOOL: &str = "unknown_tool";
}

#[cfg(test)]
mod tests {
    use super::{FetchError, codes};

    #[test]
    fn error_codes_match_variants() {
        assert_eq!(
            FetchError::Configuration("missing key".into()).code(),
            codes::CONFIGURATION_ERROR
        );
        assert_eq!(
            FetchError::Upstream {
                status: 503,
                body: "unavailable".into()
            }
            .code(),
            codes::UPSTREAM_ERROR
        );
        assert_eq!(
            FetchError::Transport("timed out".into()).code(),
            codes::TRANSPORT_ERROR
        );
    }

    #[test]
    fn upstream_error_message_carries_status_and_body() {
        let err = FetchError::Upstream {
            status: 404,
            body: "topic not found".into(),
        };
        let message = err.to_string();
        assert!(message.contains("404"));
        assert!(message.contains("topic not found"));
    }
}

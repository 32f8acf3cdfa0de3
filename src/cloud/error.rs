use thiserror::Error;

/// Failures from a single call to the remote service.
///
/// `is_retryable()` drives the retry executor: transport failures and
/// ordinary non-success statuses are transient, while a rejected or relocated
/// credential can never succeed by repeating the same request.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{operation} failed: {source}")]
    Transport {
        operation: &'static str,
        source: reqwest::Error,
    },

    /// No response headers within the allowed time.
    #[error("{operation} timed out after {}s waiting for a response", .after.as_secs())]
    Timeout {
        operation: &'static str,
        after: std::time::Duration,
    },

    #[error("{operation} returned HTTP {status}")]
    Status { operation: &'static str, status: u16 },

    #[error("{operation} was rejected: credential not accepted")]
    Rejected { operation: &'static str },

    #[error("credential endpoint has moved; the stored token is no longer valid")]
    Relocated,

    #[error("token refresh returned an empty token")]
    EmptyCredential,

    #[error("{operation} returned an unreadable response: {source}")]
    Decode {
        operation: &'static str,
        source: serde_json::Error,
    },

    #[error("invalid request URL: {0}")]
    Url(#[from] url::ParseError),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        match self {
            GatewayError::Transport { .. } => true,
            GatewayError::Timeout { .. } => true,
            GatewayError::Status { .. } => true,
            GatewayError::Rejected { .. } => false,
            GatewayError::Relocated => false,
            GatewayError::EmptyCredential => true,
            GatewayError::Decode { .. } => false,
            GatewayError::Url(_) => false,
        }
    }
}

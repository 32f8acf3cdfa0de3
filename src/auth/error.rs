use std::sync::Arc;

use thiserror::Error;

use crate::cloud::GatewayError;

/// Failures of the credential lifecycle.
///
/// Cloneable so that every caller waiting on a refresh receives the outcome
/// of that one refresh.
#[derive(Debug, Clone, Error)]
pub enum CredentialError {
    #[error("No token available; run interactively to enter one or pass --token")]
    NoSeed,

    #[error("Stored token is no longer valid and has been cleared; a new token is required")]
    Invalidated,

    #[error("Token refresh failed: {0}")]
    Refresh(#[source] Arc<GatewayError>),

    #[error("Token store failed: {0}")]
    Store(#[source] Arc<std::io::Error>),
}

impl From<std::io::Error> for CredentialError {
    fn from(e: std::io::Error) -> Self {
        Self::Store(Arc::new(e))
    }
}

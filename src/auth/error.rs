use thiserror::Error;

use crate::error::TetherError;

/// Errors raised while obtaining identity tokens.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),
    #[error("Token endpoint rejected request (status {status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::InvalidResponse(error.to_string())
    }
}

impl From<AuthError> for TetherError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::Rejected { status, body } => TetherError::Api {
                status,
                message: body,
            },
            AuthError::Network(err) => TetherError::Network(err),
            AuthError::MissingCredentials(msg) => TetherError::Configuration(msg),
            other => TetherError::Authentication(other.to_string()),
        }
    }
}

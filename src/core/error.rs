//! Error taxonomy for the completion pipeline.
//!
//! Only [`ValidationError`] and [`TransportError`] ever reach the user.
//! Malformed frames are recovered inside the stream loop and cancellation is
//! a terminal state, not an error.

use std::time::Duration;

use thiserror::Error;

/// Precondition failures detected before any network activity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Select a chat workspace before sending a message.")]
    NoProvider,

    #[error("Provide your {provider} API key before sending a message.")]
    MissingCredential { provider: String },

    #[error("Select a model to continue.")]
    NoModel,

    #[error("Enter a message before sending.")]
    EmptyMessage,
}

/// Failures of the request itself or of the response body transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Non-success HTTP status; `message` is the service's `detail` or the
    /// status text.
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("Response carried no body")]
    MissingBody,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("No data received for {}s", .0.as_secs())]
    IdleTimeout(Duration),
}

impl TransportError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TransportError::InvalidResponse(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompletionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl CompletionError {
    pub fn is_validation(&self) -> bool {
        matches!(self, CompletionError::Validation(_))
    }
}

//! Reaper error taxonomy
//!
//! Every failure the engine can report to a caller is one of these. None of
//! them is fatal to the process: parse and verification failures are
//! recovered locally, provider failures are logged and returned.

use thiserror::Error;

/// Errors surfaced by the reaping engine
#[derive(Debug, Error)]
pub enum ReaperError {
    /// No registry entry for an action target
    #[error("Resource not found: '{id}' in {region}")]
    NotFound { region: String, id: String },

    /// Serialized reaper state did not match `STAGE|since|until`
    #[error("Malformed reaper state '{input}': {reason}")]
    MalformedState { input: String, reason: String },

    /// Action token failed its integrity check or could not be decoded
    #[error("Invalid action token: {0}")]
    InvalidToken(String),

    /// A mutation or discovery collaborator failed
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl ReaperError {
    /// Create a `NotFound` error for a registry key
    pub fn not_found(region: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            region: region.into(),
            id: id.into(),
        }
    }

    /// Create a `MalformedState` error
    pub fn malformed_state(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedState {
            input: input.into(),
            reason: reason.into(),
        }
    }

    /// Check if this is a registry miss (user-visible, not a system error)
    pub fn is_not_found(&self) -> bool {
        matches!(self, ReaperError::NotFound { .. })
    }

    /// Check if this is a rejected token
    pub fn is_invalid_token(&self) -> bool {
        matches!(self, ReaperError::InvalidToken(_))
    }
}

/// Opaque failure reported by a provider collaborator, passed through verbatim
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Provider error: {message}")]
pub struct ProviderError {
    /// Provider error code, when the provider reports one
    pub code: Option<String>,
    /// Provider error message
    pub message: String,
}

impl ProviderError {
    /// Create a provider error without a code
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// Create a provider error carrying the provider's error code
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }
}

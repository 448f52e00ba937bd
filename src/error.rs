//! Error types for mail-brief.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// State store errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Could not open database: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Message source (mailbox API) errors.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The bearer credential was rejected. Callers should invalidate it and retry once.
    #[error("Credential rejected by {source_name}")]
    Unauthorized { source_name: String },

    #[error("No credential available: {0}")]
    MissingCredential(String),

    #[error("{source_name} returned HTTP {status}: {reason}")]
    Http {
        source_name: String,
        status: u16,
        reason: String,
    },

    #[error("Request to {source_name} failed: {reason}")]
    Request { source_name: String, reason: String },

    #[error("Invalid response from {source_name}: {reason}")]
    InvalidResponse { source_name: String, reason: String },
}

impl SourceError {
    /// Whether this error means the credential must be refreshed.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Self::Unauthorized { .. } | Self::MissingCredential(_)
        )
    }
}

/// LLM provider errors. All of them are non-fatal for the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Provider {provider} returned HTTP {status}")]
    Status { provider: String, status: u16 },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Notification dispatch errors.
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification {id} could not be dispatched: {reason}")]
    DispatchFailed { id: String, reason: String },
}

/// Pipeline-related errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Source fetch failed: {0}")]
    Source(#[from] SourceError),

    #[error("Credential rejected after retry: {0}")]
    AuthRejected(String),
}

impl PipelineError {
    /// Whether this error came from a rejected or missing credential.
    pub fn is_auth(&self) -> bool {
        match self {
            Self::Source(e) => e.is_auth(),
            Self::AuthRejected(_) => true,
        }
    }
}

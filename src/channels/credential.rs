//! Bearer credential for the mailbox API.
//!
//! Token acquisition and refresh belong to an external auth flow. This side
//! only reads the current token and forgets it when the API rejects it.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use secrecy::SecretString;
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::SourceError;

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Current bearer token.
    async fn token(&self) -> Result<SecretString, SourceError>;

    /// Drop any cached token so the next `token()` re-reads its source.
    async fn invalidate(&self);
}

/// Token file layout written by the auth flow. A bare token string is also accepted.
#[derive(Debug, Deserialize)]
struct TokenFile {
    access_token: Option<String>,
}

/// Reads the token from a file, falling back to a static token when the file
/// is missing or holds no token, and caches it.
pub struct FileTokenProvider {
    path: Option<PathBuf>,
    fallback: Option<SecretString>,
    cached: RwLock<Option<SecretString>>,
}

impl FileTokenProvider {
    pub fn new(path: Option<PathBuf>, fallback: Option<SecretString>) -> Self {
        Self {
            path,
            fallback,
            cached: RwLock::new(None),
        }
    }

    /// A provider that always yields the same token.
    pub fn from_token(token: SecretString) -> Self {
        Self::new(None, Some(token))
    }

    /// The token file wins; the static token covers a missing or empty file.
    async fn read_source(&self) -> Result<SecretString, SourceError> {
        let from_file = match &self.path {
            Some(path) => Some(read_token_file(path).await),
            None => None,
        };

        match (from_file, &self.fallback) {
            (Some(Ok(token)), _) => Ok(token),
            (Some(Err(e)), Some(fallback)) => {
                warn!(error = %e, "Token file unusable, using static access token");
                Ok(fallback.clone())
            }
            (Some(Err(e)), None) => Err(e),
            (None, Some(fallback)) => Ok(fallback.clone()),
            (None, None) => Err(SourceError::MissingCredential(
                "no token file or access token configured".into(),
            )),
        }
    }
}

async fn read_token_file(path: &Path) -> Result<SecretString, SourceError> {
    let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
        SourceError::MissingCredential(format!("cannot read {}: {e}", path.display()))
    })?;
    parse_token_file(&raw).ok_or_else(|| {
        SourceError::MissingCredential(format!("no access token in {}", path.display()))
    })
}

#[async_trait]
impl TokenProvider for FileTokenProvider {
    async fn token(&self) -> Result<SecretString, SourceError> {
        if let Some(token) = self.cached.read().await.as_ref() {
            return Ok(token.clone());
        }

        let token = self.read_source().await?;
        debug!("Loaded mailbox access token");
        *self.cached.write().await = Some(token.clone());
        Ok(token)
    }

    async fn invalidate(&self) {
        if self.cached.write().await.take().is_some() {
            info!("Mailbox access token invalidated");
        }
    }
}

fn parse_token_file(raw: &str) -> Option<SecretString> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if trimmed.starts_with('{') {
        let file: TokenFile = serde_json::from_str(trimmed).ok()?;
        return file
            .access_token
            .filter(|t| !t.trim().is_empty())
            .map(SecretString::from);
    }
    Some(SecretString::from(trimmed.to_string()))
}

//! Gmail REST message source.
//!
//! Lists unread message ids and fetches full MIME trees with a bearer token.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::channels::MessageSource;
use crate::channels::credential::TokenProvider;
use crate::channels::email_types::RawMessage;
use crate::error::SourceError;

const SOURCE_NAME: &str = "gmail";

/// Per-request HTTP timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListMessagesResponse {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

pub struct GmailSource {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl GmailSource {
    pub fn new(base_url: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SourceError::Request {
                source_name: SOURCE_NAME.into(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn list_url(&self, limit: usize) -> String {
        format!(
            "{}/users/me/messages?q=is:unread&maxResults={limit}",
            self.base_url
        )
    }

    fn message_url(&self, id: &str) -> String {
        format!("{}/users/me/messages/{id}?format=full", self.base_url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        let token = self.tokens.token().await?;

        let response = self
            .client
            .get(url)
            .bearer_auth(token.expose_secret())
            .send()
            .await
            .map_err(|e| SourceError::Request {
                source_name: SOURCE_NAME.into(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if let Some(err) = status_error(status) {
            return Err(err);
        }

        response.json().await.map_err(|e| SourceError::InvalidResponse {
            source_name: SOURCE_NAME.into(),
            reason: e.to_string(),
        })
    }
}

/// Map a non-success status to an error. 401/403 mean the token was rejected.
fn status_error(status: StatusCode) -> Option<SourceError> {
    if status.is_success() {
        return None;
    }
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Some(SourceError::Unauthorized {
            source_name: SOURCE_NAME.into(),
        });
    }
    Some(SourceError::Http {
        source_name: SOURCE_NAME.into(),
        status: status.as_u16(),
        reason: status.canonical_reason().unwrap_or("unknown").to_string(),
    })
}

#[async_trait]
impl MessageSource for GmailSource {
    fn name(&self) -> &str {
        SOURCE_NAME
    }

    async fn list_unread(&self, limit: usize) -> Result<Vec<String>, SourceError> {
        let list: ListMessagesResponse = self.get_json(&self.list_url(limit)).await?;
        let ids: Vec<String> = list.messages.into_iter().map(|m| m.id).take(limit).collect();
        debug!(count = ids.len(), "Listed unread messages");
        Ok(ids)
    }

    async fn get_message(&self, id: &str) -> Result<RawMessage, SourceError> {
        self.get_json(&self.message_url(id)).await
    }

    async fn invalidate_credential(&self) {
        self.tokens.invalidate().await;
    }
}

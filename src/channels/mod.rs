//! Channel abstraction: where mail comes from and where notifications go.

pub mod credential;
pub mod email_types;
pub mod gmail;
pub mod notifier;

pub use credential::{FileTokenProvider, TokenProvider};
pub use email_types::{ExtractedEmail, MessagePart, RawMessage, Sender};
pub use gmail::GmailSource;
pub use notifier::{LogNotifier, Notification, Notifier};

use async_trait::async_trait;

use crate::error::SourceError;

/// A mailbox that can list unread ids and fetch raw messages.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Up to `limit` unread message ids, newest first.
    async fn list_unread(&self, limit: usize) -> Result<Vec<String>, SourceError>;

    /// Fetch one full message.
    async fn get_message(&self, id: &str) -> Result<RawMessage, SourceError>;

    /// Forget any cached credential after an auth rejection.
    async fn invalidate_credential(&self) {}
}

//! Notification seam. Rendering belongs to the host; the pipeline only hands
//! over `{id, title, body}`.

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::channels::email_types::ExtractedEmail;
use crate::error::NotifyError;
use crate::pipeline::types::ClassificationResult;

/// Prefix for notification ids, so repeated dispatches for one message collapse.
pub const NOTIFICATION_ID_PREFIX: &str = "mail-brief-";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: String,
    pub title: String,
    pub body: String,
}

impl Notification {
    pub fn for_email(email: &ExtractedEmail, result: &ClassificationResult) -> Self {
        Self {
            id: format!("{NOTIFICATION_ID_PREFIX}{}", email.id()),
            title: format!("New Email from {}", email.from().display()),
            body: format!("{}\n{}", result.summary, result.tag.label()),
        }
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Emits notifications as structured log lines.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            id = %notification.id,
            title = %notification.title,
            body = %notification.body,
            "Notification"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    use super::*;
    use crate::channels::email_types::{Header, MessagePart, RawMessage};
    use crate::pipeline::types::Tag;

    fn email(from: Option<&str>) -> ExtractedEmail {
        let mut payload = MessagePart::leaf("text/plain", &URL_SAFE_NO_PAD.encode("hi"));
        if let Some(from) = from {
            payload.headers.push(Header {
                name: "From".into(),
                value: from.into(),
            });
        }
        ExtractedEmail::from_raw(&RawMessage {
            id: "m1".into(),
            payload,
            ..Default::default()
        })
    }

    #[test]
    fn notification_shape() {
        let result = ClassificationResult::new("Confirm interview time.", Tag::ActionRequired);
        let n = Notification::for_email(&email(Some("\"Ada\" <ada@example.com>")), &result);
        assert_eq!(n.id, "mail-brief-m1");
        assert_eq!(n.title, "New Email from Ada");
        assert_eq!(n.body, "Confirm interview time.\nAction Required");
    }

    #[test]
    fn title_falls_back_to_address_then_unknown() {
        let result = ClassificationResult::new("x", Tag::Fyi);
        let n = Notification::for_email(&email(Some("ada@example.com")), &result);
        assert_eq!(n.title, "New Email from ada@example.com");
        let n = Notification::for_email(&email(None), &result);
        assert_eq!(n.title, "New Email from Unknown");
    }

    #[tokio::test]
    async fn log_notifier_accepts() {
        let n = Notification {
            id: "mail-brief-1".into(),
            title: "t".into(),
            body: "b".into(),
        };
        assert!(LogNotifier.notify(&n).await.is_ok());
    }
}

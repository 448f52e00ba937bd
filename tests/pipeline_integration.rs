//! End-to-end: raw Gmail-shaped messages through the public pipeline API,
//! with on-disk state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use secrecy::SecretString;

use mail_brief::channels::{MessageSource, Notification, Notifier, RawMessage};
use mail_brief::config::Settings;
use mail_brief::error::{LlmError, NotifyError, SourceError};
use mail_brief::llm::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};
use mail_brief::pipeline::{AiClassifier, MessageProcessor, Poller, RuleClassifier, Tag};
use mail_brief::store::{DedupTracker, LibSqlBackend, StateStore};

struct Inbox {
    messages: HashMap<String, RawMessage>,
}

impl Inbox {
    fn from_json(raw: &[serde_json::Value]) -> Self {
        let messages = raw
            .iter()
            .map(|v| {
                let m: RawMessage = serde_json::from_value(v.clone()).unwrap();
                (m.id.clone(), m)
            })
            .collect();
        Self { messages }
    }
}

#[async_trait]
impl MessageSource for Inbox {
    fn name(&self) -> &str {
        "inbox"
    }

    async fn list_unread(&self, limit: usize) -> Result<Vec<String>, SourceError> {
        let mut ids: Vec<String> = self.messages.keys().cloned().collect();
        ids.sort();
        ids.truncate(limit);
        Ok(ids)
    }

    async fn get_message(&self, id: &str) -> Result<RawMessage, SourceError> {
        self.messages
            .get(id)
            .cloned()
            .ok_or_else(|| SourceError::Http {
                source_name: "inbox".into(),
                status: 404,
                reason: "Not Found".into(),
            })
    }
}

#[derive(Default)]
struct Collector {
    sent: Mutex<Vec<Notification>>,
}

#[async_trait]
impl Notifier for Collector {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

/// Model stub that always breaks the contract by copying the body.
struct CopyingModel;

#[async_trait]
impl LlmProvider for CopyingModel {
    fn model_name(&self) -> &str {
        "copying-model"
    }

    async fn complete(
        &self,
        request: CompletionRequest,
        _api_key: &SecretString,
    ) -> Result<CompletionResponse, LlmError> {
        let body = request.messages[1]
            .content
            .split_once("Email Body:\n")
            .map(|(_, b)| b.to_string())
            .unwrap_or_default();
        Ok(CompletionResponse {
            content: serde_json::json!({"summary": body, "tag": "Urgent"}).to_string(),
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: FinishReason::Stop,
            response_id: None,
        })
    }
}

fn b64(text: &str) -> String {
    URL_SAFE_NO_PAD.encode(text)
}

fn interview_message() -> serde_json::Value {
    serde_json::json!({
        "id": "m1",
        "threadId": "t1",
        "snippet": "Please confirm your availability",
        "payload": {
            "mimeType": "multipart/alternative",
            "headers": [
                {"name": "Subject", "value": "Interview"},
                {"name": "From", "value": "\"Hiring Team\" <jobs@corp.example>"},
                {"name": "Date", "value": "Mon, 2 Mar 2026 09:00:00 +0000"}
            ],
            "parts": [
                {"mimeType": "text/html", "body": {"data": b64("<p>ignored html</p>")}},
                {"mimeType": "text/plain", "body": {"data": b64(
                    "Hi Sam,\n\nPlease confirm your availability for the interview on Monday.\n\nBest regards,\nHiring Team\n\nOn Fri, Sam wrote:\n> earlier"
                )}}
            ]
        }
    })
}

async fn open_store(dir: &tempfile::TempDir) -> Arc<dyn StateStore> {
    Arc::new(
        LibSqlBackend::new_local(&dir.path().join("state.db"))
            .await
            .unwrap(),
    )
}

async fn poller(
    store: Arc<dyn StateStore>,
    source: Arc<Inbox>,
    notifier: Arc<Collector>,
    ai: Option<Arc<AiClassifier>>,
) -> Poller {
    let tracker = Arc::new(DedupTracker::load(Arc::clone(&store)).await.unwrap());
    let mut processor = MessageProcessor::new(source, notifier, tracker, store);
    if let Some(ai) = ai {
        processor = processor.with_ai(ai);
    }
    Poller::new(Arc::new(processor))
}

#[tokio::test]
async fn rules_path_end_to_end_with_dedup_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let source = Arc::new(Inbox::from_json(&[interview_message()]));
    let notifier = Arc::new(Collector::default());

    {
        let store = open_store(&dir).await;
        let poller = poller(store, Arc::clone(&source), Arc::clone(&notifier), None).await;

        let report = poller.run_cycle().await.unwrap().unwrap();
        assert_eq!(report.notified, 1);

        let sent = notifier.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].id, "mail-brief-m1");
        assert_eq!(sent[0].title, "New Email from Hiring Team");
        let (summary, label) = sent[0].body.split_once('\n').unwrap();
        assert_eq!(
            summary,
            "Please confirm your availability for the interview on Monday."
        );
        assert_eq!(label, Tag::ActionRequired.label());

        assert!(poller.processor().tracker().has("m1").await);

        let again = poller.run_cycle().await.unwrap().unwrap();
        assert_eq!(again.skipped, 1);
        assert_eq!(notifier.sent.lock().unwrap().len(), 1);
    }

    // Fresh process, same database: still deduplicated.
    let store = open_store(&dir).await;
    let poller = poller(store, source, Arc::clone(&notifier), None).await;
    let report = poller.run_cycle().await.unwrap().unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(report.processed(), 0);
    assert_eq!(notifier.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn clearing_dedup_reprocesses() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;
    let source = Arc::new(Inbox::from_json(&[interview_message()]));
    let notifier = Arc::new(Collector::default());
    let poller = poller(store, source, Arc::clone(&notifier), None).await;

    poller.run_cycle().await.unwrap().unwrap();
    poller.processor().tracker().clear().await.unwrap();
    let report = poller.run_cycle().await.unwrap().unwrap();

    assert_eq!(report.notified, 1);
    assert_eq!(notifier.sent.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn model_path_rejects_copied_summary_but_keeps_tag() {
    let dir = tempfile::tempdir().unwrap();
    let store = open_store(&dir).await;

    let mut settings = Settings::default();
    settings.ai_api_key = Some(SecretString::from("sk-test"));
    settings.save(store.as_ref()).await.unwrap();

    let long_body = "Please confirm your availability for the interview on Monday at the downtown office with the whole panel.";
    let mut message = interview_message();
    message["payload"]["parts"][1]["body"]["data"] = serde_json::json!(b64(long_body));

    let source = Arc::new(Inbox::from_json(&[message]));
    let notifier = Arc::new(Collector::default());
    let ai = Arc::new(AiClassifier::new(
        Arc::new(CopyingModel),
        RuleClassifier::default_rules(),
    ));
    let poller = poller(store, source, Arc::clone(&notifier), Some(ai)).await;

    poller.run_cycle().await.unwrap().unwrap();

    let sent = notifier.sent.lock().unwrap().clone();
    let (summary, label) = sent[0].body.split_once('\n').unwrap();
    assert_ne!(summary, long_body);
    assert!(summary.split_whitespace().count() <= 15);
    assert!(summary.ends_with('.'));
    assert_eq!(label, "Urgent");
}

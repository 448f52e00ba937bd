//! Message processor: fetch → extract → sanitize → classify → notify → mark.
//!
//! Faults stay scoped to the message that produced them. The one exception
//! is a rejected credential, which is surfaced so the poller can refresh it
//! and retry the batch.

use std::sync::Arc;

use futures::future::join_all;
use secrecy::SecretString;
use tracing::{debug, error, info, warn};

use crate::channels::email_types::ExtractedEmail;
use crate::channels::{MessageSource, Notification, Notifier};
use crate::config::Settings;
use crate::error::PipelineError;
use crate::pipeline::classifier::AiClassifier;
use crate::pipeline::rules::RuleClassifier;
use crate::pipeline::sanitize::sanitize;
use crate::pipeline::types::{ClassificationResult, MessageOutcome};
use crate::store::{DedupTracker, StateStore};

pub struct MessageProcessor {
    source: Arc<dyn MessageSource>,
    notifier: Arc<dyn Notifier>,
    tracker: Arc<DedupTracker>,
    settings_store: Arc<dyn StateStore>,
    rules: RuleClassifier,
    ai: Option<Arc<AiClassifier>>,
}

impl MessageProcessor {
    pub fn new(
        source: Arc<dyn MessageSource>,
        notifier: Arc<dyn Notifier>,
        tracker: Arc<DedupTracker>,
        settings_store: Arc<dyn StateStore>,
    ) -> Self {
        Self {
            source,
            notifier,
            tracker,
            settings_store,
            rules: RuleClassifier::default_rules(),
            ai: None,
        }
    }

    /// Enable the model path. It only runs when settings hold an API key.
    pub fn with_ai(mut self, ai: Arc<AiClassifier>) -> Self {
        self.ai = Some(ai);
        self
    }

    pub fn source(&self) -> &Arc<dyn MessageSource> {
        &self.source
    }

    pub fn tracker(&self) -> &Arc<DedupTracker> {
        &self.tracker
    }

    pub fn settings_store(&self) -> &Arc<dyn StateStore> {
        &self.settings_store
    }

    /// Process a batch of ids concurrently.
    ///
    /// Returns per-id outcomes. If any fetch was rejected for auth, the whole
    /// batch reports the auth error once every sibling has finished; finished
    /// messages are already marked, so a retry skips them.
    pub async fn process_batch(
        &self,
        ids: &[String],
    ) -> Result<Vec<(String, MessageOutcome)>, PipelineError> {
        let settings = match Settings::load(self.settings_store.as_ref()).await {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "Failed to load settings, using defaults");
                Settings::default()
            }
        };
        let api_key = settings.ai_api_key.as_ref();

        debug!(count = ids.len(), ai = api_key.is_some(), "Processing message batch");

        let results = join_all(ids.iter().map(|id| self.process_one(id, api_key))).await;

        let mut outcomes = Vec::with_capacity(ids.len());
        let mut auth_error = None;
        for (id, result) in ids.iter().zip(results) {
            match result {
                Ok(outcome) => outcomes.push((id.clone(), outcome)),
                Err(e) if e.is_auth() => auth_error = Some(e),
                Err(e) => {
                    error!(id = %id, error = %e, "Failed to process message");
                    outcomes.push((id.clone(), MessageOutcome::FetchFailed(e.to_string())));
                }
            }
        }

        match auth_error {
            Some(e) => Err(e),
            None => Ok(outcomes),
        }
    }

    /// Run one message through the pipeline.
    pub async fn process_one(
        &self,
        id: &str,
        api_key: Option<&SecretString>,
    ) -> Result<MessageOutcome, PipelineError> {
        if self.tracker.has(id).await {
            debug!(id, "Already processed, skipping");
            return Ok(MessageOutcome::Skipped);
        }

        let raw = match self.source.get_message(id).await {
            Ok(raw) => raw,
            Err(e) if e.is_auth() => return Err(e.into()),
            Err(e) => {
                warn!(id, error = %e, "Failed to fetch message");
                return Ok(MessageOutcome::FetchFailed(e.to_string()));
            }
        };

        let email = ExtractedEmail::from_raw(&raw);
        let classification = self.classify(&email, api_key).await;

        info!(
            id,
            tag = classification.tag.label(),
            words = classification.summary_word_count(),
            "Classified message"
        );

        let notification = Notification::for_email(&email, &classification);
        let outcome = match self.notifier.notify(&notification).await {
            Ok(()) => MessageOutcome::Notified(classification),
            Err(e) => {
                warn!(id, error = %e, "Notification dispatch failed");
                MessageOutcome::NotifyFailed(classification)
            }
        };

        // Dispatch was attempted either way; a persistence failure only risks
        // a duplicate notification, which collapses by id.
        if let Err(e) = self.tracker.mark_processed(id).await {
            error!(id, error = %e, "Failed to persist processed id");
        }

        Ok(outcome)
    }

    async fn classify(
        &self,
        email: &ExtractedEmail,
        api_key: Option<&SecretString>,
    ) -> ClassificationResult {
        let content = sanitize(email.body());
        debug!(
            id = email.id(),
            raw_len = email.body().len(),
            sanitized_words = content.word_count(),
            "Sanitized body"
        );

        match (&self.ai, api_key) {
            (Some(ai), Some(key)) => ai.classify_with_model(email.subject(), &content, key).await,
            _ => self.rules.classify(email.subject(), &content),
        }
    }
}

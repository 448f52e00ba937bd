//! Shared types for the summarisation pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Sanitized content ───────────────────────────────────────────────

/// Bounded, noise-free text produced by [`crate::pipeline::sanitize::sanitize`].
///
/// Only the sanitizer constructs these outside of tests, so anything holding
/// one can rely on the word ceiling and redactions having been applied.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SanitizedContent(String);

impl SanitizedContent {
    pub(crate) fn new(text: String) -> Self {
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn word_count(&self) -> usize {
        self.0.split_whitespace().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for SanitizedContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Tag ─────────────────────────────────────────────────────────────

/// Category attached to every classified email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Urgent,
    ActionRequired,
    #[serde(rename = "fyi")]
    Fyi,
    NoActionNeeded,
}

impl Tag {
    pub const ALL: [Tag; 4] = [
        Tag::Urgent,
        Tag::ActionRequired,
        Tag::Fyi,
        Tag::NoActionNeeded,
    ];

    /// Human-readable label, as shown in notifications and requested from the model.
    pub fn label(&self) -> &'static str {
        match self {
            Tag::Urgent => "Urgent",
            Tag::ActionRequired => "Action Required",
            Tag::Fyi => "FYI",
            Tag::NoActionNeeded => "No Action Needed",
        }
    }

    /// Parse a label leniently.
    ///
    /// Case, spacing, `_` and `-` are ignored. "Reply Required" and
    /// "No Reply Needed" are accepted as aliases for the action tags.
    pub fn parse(raw: &str) -> Option<Self> {
        let key: String = raw
            .chars()
            .filter(|c| c.is_alphanumeric())
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "urgent" => Some(Tag::Urgent),
            "actionrequired" | "replyrequired" | "actionneeded" => Some(Tag::ActionRequired),
            "fyi" | "foryourinformation" | "informational" => Some(Tag::Fyi),
            "noactionneeded" | "noreplyneeded" | "noactionrequired" | "none" => {
                Some(Tag::NoActionNeeded)
            }
            _ => None,
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ── Classification result ───────────────────────────────────────────

/// Outcome of classifying one email: a short summary plus a tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub summary: String,
    pub tag: Tag,
}

impl ClassificationResult {
    pub fn new(summary: impl Into<String>, tag: Tag) -> Self {
        Self {
            summary: summary.into(),
            tag,
        }
    }

    pub fn summary_word_count(&self) -> usize {
        self.summary.split_whitespace().count()
    }
}

// ── Per-message outcome ─────────────────────────────────────────────

/// What happened to one message id during a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Already in the dedup set; nothing ran.
    Skipped,
    /// Classified and a notification was dispatched.
    Notified(ClassificationResult),
    /// Classified, but dispatch failed. Still marked processed.
    NotifyFailed(ClassificationResult),
    /// Fetching the message failed; not marked, retried next cycle.
    FetchFailed(String),
}

impl MessageOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skipped => "skipped",
            Self::Notified(_) => "notified",
            Self::NotifyFailed(_) => "notify_failed",
            Self::FetchFailed(_) => "fetch_failed",
        }
    }

    pub fn classification(&self) -> Option<&ClassificationResult> {
        match self {
            Self::Notified(c) | Self::NotifyFailed(c) => Some(c),
            _ => None,
        }
    }
}

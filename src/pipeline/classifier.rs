//! Model-backed classifier with strict output-contract enforcement.
//!
//! One chat-completion call per message. Transport failures (network, timeout,
//! non-success status, unparsable JSON) fall back to the [`RuleClassifier`].
//! Parsed responses are validated; a summary that breaks the contract is
//! replaced by an extractive emergency summary while a valid tag is kept.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use secrecy::SecretString;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::rules::{EMPTY_SUMMARY, MAX_SUMMARY_WORDS, RuleClassifier};
use crate::pipeline::sanitize::{contains_phone, contains_url};
use crate::pipeline::types::{ClassificationResult, SanitizedContent, Tag};

/// Default bound on a single model call.
pub const DEFAULT_AI_TIMEOUT: Duration = Duration::from_secs(15);

/// Max tokens for the classification call (summary + tag only).
const CLASSIFY_MAX_TOKENS: u32 = 150;

/// Low temperature for stable labels.
const CLASSIFY_TEMPERATURE: f32 = 0.2;

/// A summary whose leading span of this many characters appears verbatim in
/// the content counts as a copy.
const COPY_PROBE_CHARS: usize = 50;

const EMERGENCY_WORDS: usize = 15;
const EMERGENCY_MAX_CHARS: usize = 150;

static QUOTE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*>").unwrap());

static FROM_LINE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?mi)^\s*from:").unwrap());

static SENT_FROM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bsent\s+from\s+my\b").unwrap());

/// Ways a parsed model response can break the output contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContractViolation {
    #[error("summary missing, empty or not a string")]
    MissingSummary,

    #[error("summary has {0} words")]
    TooLong(usize),

    #[error("summary contains forbidden content: {0}")]
    Forbidden(&'static str),

    #[error("summary copies the email text")]
    Copied,
}

/// Classifier that asks a chat-completion model first.
pub struct AiClassifier {
    llm: Arc<dyn LlmProvider>,
    rules: RuleClassifier,
    timeout: Duration,
    fallback_tag: Tag,
}

impl AiClassifier {
    pub fn new(llm: Arc<dyn LlmProvider>, rules: RuleClassifier) -> Self {
        Self {
            llm,
            rules,
            timeout: DEFAULT_AI_TIMEOUT,
            fallback_tag: Tag::NoActionNeeded,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Tag used when the model returns a missing or unknown tag.
    pub fn with_fallback_tag(mut self, tag: Tag) -> Self {
        self.fallback_tag = tag;
        self
    }

    pub fn rules(&self) -> &RuleClassifier {
        &self.rules
    }

    /// Classify with the model when a key is present, otherwise with rules.
    pub async fn classify(
        &self,
        subject: &str,
        content: &SanitizedContent,
        api_key: Option<&SecretString>,
    ) -> ClassificationResult {
        match api_key {
            Some(key) => self.classify_with_model(subject, content, key).await,
            None => self.rules.classify(subject, content),
        }
    }

    /// One model call; never fails.
    pub async fn classify_with_model(
        &self,
        subject: &str,
        content: &SanitizedContent,
        api_key: &SecretString,
    ) -> ClassificationResult {
        let raw = match self.call_model(subject, content, api_key).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "Model call failed, using rule classifier");
                return self.rules.classify(subject, content);
            }
        };

        let Some(parsed) = parse_model_json(&raw) else {
            warn!(raw_response = %raw, "Model response is not a JSON object, using rule classifier");
            return self.rules.classify(subject, content);
        };

        self.validate(&parsed, content)
    }

    async fn call_model(
        &self,
        subject: &str,
        content: &SanitizedContent,
        api_key: &SecretString,
    ) -> Result<String, LlmError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_system_prompt()),
            ChatMessage::user(build_user_prompt(subject, content)),
        ])
        .with_max_tokens(CLASSIFY_MAX_TOKENS)
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_json_object();

        let response = tokio::time::timeout(self.timeout, self.llm.complete(request, api_key))
            .await
            .map_err(|_| LlmError::Timeout {
                provider: self.llm.model_name().to_string(),
                timeout: self.timeout,
            })??;

        debug!(
            model = self.llm.model_name(),
            output_tokens = response.output_tokens,
            "Model classification received"
        );
        Ok(response.content)
    }

    /// Apply the output contract to a parsed response.
    fn validate(&self, parsed: &Value, content: &SanitizedContent) -> ClassificationResult {
        let tag = match parsed.get("tag").and_then(Value::as_str).and_then(Tag::parse) {
            Some(tag) => tag,
            None => {
                warn!(
                    tag = ?parsed.get("tag"),
                    fallback = self.fallback_tag.label(),
                    "Model returned an invalid tag"
                );
                self.fallback_tag
            }
        };

        let summary = parsed.get("summary").and_then(Value::as_str).map(str::trim);
        match check_summary(summary, content) {
            Ok(summary) => ClassificationResult::new(summary, tag),
            Err(violation) => {
                warn!(%violation, "Model summary rejected, using emergency summary");
                ClassificationResult::new(emergency_summary(content), tag)
            }
        }
    }
}

/// Check a model summary against every contract rule.
pub fn check_summary<'a>(
    summary: Option<&'a str>,
    content: &SanitizedContent,
) -> Result<&'a str, ContractViolation> {
    let summary = summary
        .filter(|s| !s.is_empty())
        .ok_or(ContractViolation::MissingSummary)?;

    let words = summary.split_whitespace().count();
    if words > MAX_SUMMARY_WORDS {
        return Err(ContractViolation::TooLong(words));
    }

    if contains_url(summary) {
        return Err(ContractViolation::Forbidden("url"));
    }
    if contains_phone(summary) {
        return Err(ContractViolation::Forbidden("phone number"));
    }
    if QUOTE_LINE_RE.is_match(summary) {
        return Err(ContractViolation::Forbidden("quote marker"));
    }
    if FROM_LINE_RE.is_match(summary) {
        return Err(ContractViolation::Forbidden("from header"));
    }
    if SENT_FROM_RE.is_match(summary) {
        return Err(ContractViolation::Forbidden("device signature"));
    }

    if summary.chars().count() >= COPY_PROBE_CHARS {
        let probe: String = summary.chars().take(COPY_PROBE_CHARS).collect();
        if content.as_str().contains(&probe) {
            return Err(ContractViolation::Copied);
        }
    }

    Ok(summary)
}

/// Extractive fallback: first 15 tokens, at most 150 chars, terminal punctuation.
pub fn emergency_summary(content: &SanitizedContent) -> String {
    if content.is_empty() {
        return EMPTY_SUMMARY.to_string();
    }

    let mut summary = content
        .as_str()
        .split_whitespace()
        .take(EMERGENCY_WORDS)
        .collect::<Vec<_>>()
        .join(" ");

    if summary.chars().count() > EMERGENCY_MAX_CHARS {
        let kept: String = summary.chars().take(EMERGENCY_MAX_CHARS - 3).collect();
        summary = format!("{}...", kept.trim_end());
    }

    if !summary.ends_with(['.', '!', '?']) {
        summary.push('.');
    }
    summary
}

// ── Prompt construction ─────────────────────────────────────────────

fn build_system_prompt() -> String {
    let tags = Tag::ALL
        .iter()
        .map(|t| format!("\"{}\"", t.label()))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"You summarise emails for a phone notification.

Rules:
- Write the summary in your own words, at most {MAX_SUMMARY_WORDS} words and at most 2 lines.
- Never copy sentences from the email.
- Never include quotes, signatures, greetings, URLs, email addresses or phone numbers.
- Choose exactly one tag from: {tags}.
  "Urgent": time-critical or security-related. "Action Required": the reader must reply or do something.
  "FYI": informational updates. "No Action Needed": everything else.

Respond with ONLY this JSON object:
{{"summary": "...", "tag": "..."}}"#
    )
}

fn build_user_prompt(subject: &str, content: &SanitizedContent) -> String {
    format!("Subject: {subject}\nEmail Body:\n{content}")
}

/// Parse a JSON object out of model output, tolerating markdown fences and
/// surrounding prose.
fn parse_model_json(raw: &str) -> Option<Value> {
    let candidate = extract_json_object(raw);
    match serde_json::from_str::<Value>(&candidate) {
        Ok(value @ Value::Object(_)) => Some(value),
        _ => None,
    }
}

fn extract_json_object(text: &str) -> String {
    let trimmed = text.trim();

    let unfenced = match trimmed.find("```") {
        Some(start) => {
            let after = &trimmed[start + 3..];
            let after = after.strip_prefix("json").unwrap_or(after);
            match after.find("```") {
                Some(end) => after[..end].trim(),
                None => after.trim(),
            }
        }
        None => trimmed,
    };

    if let (Some(start), Some(end)) = (unfenced.find('{'), unfenced.rfind('}'))
        && end > start
    {
        return unfenced[start..=end].to_string();
    }

    unfenced.to_string()
}

//! Deterministic rule classifier.
//!
//! Used whenever no model credential is configured and as the fallback when
//! the model call fails. A single ordered table of compiled patterns is
//! evaluated against the lower-cased `subject + " " + body`; the first
//! matching row decides the tag. Nothing here performs I/O.

use regex::Regex;
use tracing::debug;

use crate::pipeline::types::{ClassificationResult, SanitizedContent, Tag};

/// Placeholder summary for messages with no readable body.
pub const EMPTY_SUMMARY: &str = "No readable content.";

/// Hard ceiling on summary length, in words, on every path.
pub const MAX_SUMMARY_WORDS: usize = 35;

/// Soft budget used when assembling the summary from sentences.
const SUMMARY_WORD_BUDGET: usize = 25;

/// A first sentence shorter than this borrows words from the following ones.
const MIN_FIRST_SENTENCE_CHARS: usize = 20;

/// Word count used when the text has no sentence terminator at all.
const UNTERMINATED_WORDS: usize = 20;

const ELLIPSIS: &str = "...";

/// One row of the rule table.
#[derive(Debug, Clone)]
pub struct ClassRule {
    /// Lower wins.
    pub priority: u8,
    pub tag: Tag,
    /// Compiled regex, matched against lower-cased text.
    pub regex: Regex,
}

/// Pattern-based classifier.
#[derive(Debug, Clone)]
pub struct RuleClassifier {
    rules: Vec<ClassRule>,
    default_tag: Tag,
}

impl RuleClassifier {
    /// The built-in table.
    pub fn default_rules() -> Self {
        let rules = vec![
            ClassRule {
                priority: 1,
                tag: Tag::Urgent,
                regex: Regex::new(concat!(
                    r"\b(?:urgent|urgently|asap|emergency|deadline|immediately|critical)\b",
                    r"|\baccount (?:has been |was |is )?suspended\b",
                    r"|\bverify your account\b",
                    r"|\bexpires? today\b",
                    r"|\bfinal notice\b",
                    r"|\bpast due\b",
                    r"|\bsecurity alert\b",
                ))
                .unwrap(),
            },
            ClassRule {
                priority: 2,
                tag: Tag::ActionRequired,
                regex: Regex::new(concat!(
                    r"\b(?:please|could you|can you|would you|reply|respond|confirm",
                    r"|meeting|schedule|sign|submit|approve|rsvp|let me know)\b",
                ))
                .unwrap(),
            },
            ClassRule {
                priority: 3,
                tag: Tag::Fyi,
                regex: Regex::new(concat!(
                    r"\b(?:update|updates|announcement|announcing|newsletter",
                    r"|for your information|fyi|digest|no action)\b",
                ))
                .unwrap(),
            },
        ];

        Self {
            rules,
            default_tag: Tag::NoActionNeeded,
        }
    }

    /// Table rows in evaluation order.
    pub fn rules(&self) -> &[ClassRule] {
        &self.rules
    }

    /// Classify a message. Pure: the same input always yields the same result.
    pub fn classify(&self, subject: &str, content: &SanitizedContent) -> ClassificationResult {
        if content.is_empty() {
            return ClassificationResult::new(EMPTY_SUMMARY, Tag::NoActionNeeded);
        }

        let tag = self.tag_for(subject, content.as_str());
        let summary = summarize(content.as_str());
        debug!(tag = tag.label(), words = summary.split_whitespace().count(), "Rule classification");
        ClassificationResult::new(summary, tag)
    }

    /// First matching row, or the default tag.
    pub fn tag_for(&self, subject: &str, text: &str) -> Tag {
        let haystack = format!("{subject} {text}").to_lowercase();
        let mut ordered: Vec<&ClassRule> = self.rules.iter().collect();
        ordered.sort_by_key(|r| r.priority);
        ordered
            .into_iter()
            .find(|r| r.regex.is_match(&haystack))
            .map(|r| r.tag)
            .unwrap_or(self.default_tag)
    }
}

impl Default for RuleClassifier {
    fn default() -> Self {
        Self::default_rules()
    }
}

/// Extractive summary of already-sanitized text.
pub fn summarize(text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        return EMPTY_SUMMARY.to_string();
    }

    let sentences = split_sentences(text);
    let summary = if !text.contains(['.', '!', '?']) {
        take_words(text, UNTERMINATED_WORDS)
    } else if sentences
        .first()
        .is_some_and(|s| s.chars().count() >= MIN_FIRST_SENTENCE_CHARS)
    {
        take_words(sentences[0], SUMMARY_WORD_BUDGET)
    } else {
        let joined = sentences.join(" ");
        take_words(&joined, SUMMARY_WORD_BUDGET)
    };

    take_words(&summary, MAX_SUMMARY_WORDS)
}

/// Split after runs of `.`, `!` or `?`. Trailing text without a terminator
/// forms the last sentence.
fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if matches!(c, '.' | '!' | '?') {
            let next_is_terminator = chars
                .peek()
                .is_some_and(|(_, n)| matches!(n, '.' | '!' | '?'));
            if !next_is_terminator {
                let end = i + c.len_utf8();
                let sentence = text[start..end].trim();
                if !sentence.is_empty() {
                    sentences.push(sentence);
                }
                start = end;
            }
        }
    }

    let rest = text[start..].trim();
    if !rest.is_empty() {
        sentences.push(rest);
    }
    sentences
}

/// First `max` whitespace tokens; appends an ellipsis when anything was dropped.
pub(crate) fn take_words(text: &str, max: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.len() <= max {
        return words.join(" ");
    }
    let mut out = words[..max].join(" ");
    out.push_str(ELLIPSIS);
    out
}

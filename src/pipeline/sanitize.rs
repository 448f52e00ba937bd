//! Sanitizer: turns an extracted body into bounded, noise-free text.
//!
//! Stages run strictly in order:
//! 1. cut signatures/footers
//! 2. cut quoted replies and forwarded blocks
//! 3. redact URLs and phone-shaped substrings
//! 4. normalise characters and whitespace (line structure kept)
//! 5. drop leading greetings and trailing closings
//! 6. cap at [`MAX_WORDS`] tokens joined by single spaces
//!
//! Line endings are normalised to `\n` first. The cascade then repeats until
//! its output stops changing, since removing a greeting or collapsing
//! whitespace can expose a marker an earlier stage would have cut.

use std::sync::LazyLock;

use regex::Regex;

use crate::pipeline::types::SanitizedContent;

/// Word ceiling for sanitized content.
pub const MAX_WORDS: usize = 400;

pub const URL_TOKEN: &str = "[URL]";
pub const PHONE_TOKEN: &str = "[PHONE]";

static SIGNATURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?m:^[ \t]*--[ \t]*$)",
        r"|(?i:\b(?:best|kind|warm|warmest)\s+regards\b)",
        r"|(?i:\b(?:yours\s+)?sincerely,)",
        r"|(?i:\bsent\s+from\s+my\b)",
        r"|(?i:\bget\s+outlook\s+for\b)",
        r"|_{10,}",
    ))
    .unwrap()
});

static QUOTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?s:\bOn\s.{1,200}?\swrote:)",
        r"|(?m:^[ \t]*>)",
        r"|(?m:^[ \t]*From:\s)",
        r"|(?i:-{3,}\s*original\s+message\s*-{3,})",
        r"|(?i:-{3,}\s*forwarded\s+message\s*-{3,})",
        r"|(?i:\bbegin\s+forwarded\s+message:)",
    ))
    .unwrap()
});

static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\b(?:https?://|www\.)[^\s<>"]+"#).unwrap());

/// Loose digit grouping; false positives (dates, order numbers) are accepted.
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+\d{1,3}[\s.-]?)?\(?\b\d{2,4}\)?(?:[\s.-]?\d{2,4}){2,4}\b").unwrap()
});

static HSPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").unwrap());

static BLANK_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n{3,}").unwrap());

static GREETING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^\s*(?i:hi|hello|hey|dear|greetings|good\s+(?:morning|afternoon|evening)",
        r"|hope\s+(?:you|this|all|everyone)(?:\s+[\w'’]+){0,6})\b",
        r"(?:\s+[\w.'-]+){0,3}\s*[,!:.]\s*",
    ))
    .unwrap()
});

static CLOSING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(^|[.!?])\s*",
        r"(?i:thanks(?:\s+(?:again|so\s+much|in\s+advance))?",
        r"|thank\s+you(?:\s+(?:again|so\s+much|in\s+advance))?",
        r"|many\s+thanks|cheers|best|regards|best\s+wishes|all\s+the\s+best",
        r"|take\s+care|talk\s+soon)\b",
        r"[\s,.!]*(?:[A-Z][\w.'-]*(?:\s+[A-Z][\w.'-]*)?)?\s*$",
    ))
    .unwrap()
});

/// Typographic marks kept alongside ASCII and alphanumerics.
const EXTRA_ALLOWED: &[char] = &[
    '\u{2018}', '\u{2019}', '\u{201c}', '\u{201d}', '\u{2013}', '\u{2014}', '\u{2026}', '\u{20ac}',
    '\u{a3}',
];

/// Passes never grow the text, so this is only reached by pathological input.
const MAX_PASSES: usize = 16;

/// Run the cascade to a fixed point.
pub fn sanitize(text: &str) -> SanitizedContent {
    let mut current = normalize_line_endings(text);
    for _ in 0..MAX_PASSES {
        let next = sanitize_pass(&current);
        if next == current {
            break;
        }
        current = next;
    }
    SanitizedContent::new(current)
}

fn sanitize_pass(text: &str) -> String {
    let text = strip_signature(text);
    let text = strip_quoted(text);
    let text = redact(text);
    let text = normalize_whitespace(&text);
    let text = strip_greetings_and_closings(&text);
    truncate_words(&text, MAX_WORDS)
}

/// CRLF and lone CR become LF so line-anchored markers match.
fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

/// Stage 1: cut from the first signature marker to the end.
fn strip_signature(text: &str) -> &str {
    cut_at_first_match(&SIGNATURE_RE, text)
}

/// Stage 2: cut from the first quoted/forwarded marker to the end.
fn strip_quoted(text: &str) -> &str {
    cut_at_first_match(&QUOTE_RE, text)
}

fn cut_at_first_match<'a>(re: &Regex, text: &'a str) -> &'a str {
    match re.find(text) {
        Some(m) => &text[..m.start()],
        None => text,
    }
}

/// Stage 3: replace URLs and phone-shaped substrings with placeholder tokens.
fn redact(text: &str) -> String {
    let text = URL_RE.replace_all(text, URL_TOKEN);
    PHONE_RE
        .replace_all(&text, |caps: &regex::Captures| {
            let found = &caps[0];
            if is_phone_length(found) {
                PHONE_TOKEN.to_string()
            } else {
                found.to_string()
            }
        })
        .into_owned()
}

/// Matches shorter than the token stay, so redaction never grows the text.
fn is_phone_length(found: &str) -> bool {
    found.len() >= PHONE_TOKEN.len()
}

/// Whether `text` holds a phone-shaped substring that redaction would replace.
pub(crate) fn contains_phone(text: &str) -> bool {
    PHONE_RE.find_iter(text).any(|m| is_phone_length(m.as_str()))
}

/// Whether `text` holds a raw URL.
pub(crate) fn contains_url(text: &str) -> bool {
    URL_RE.is_match(text)
}

/// Stage 4: allow-list characters, collapse whitespace, keep at most one blank line.
fn normalize_whitespace(text: &str) -> String {
    let filtered: String = text
        .chars()
        .filter_map(|c| {
            if c == '\n' {
                Some('\n')
            } else if c.is_whitespace() {
                Some(' ')
            } else if c.is_ascii_graphic() || c.is_alphanumeric() || EXTRA_ALLOWED.contains(&c) {
                Some(c)
            } else {
                None
            }
        })
        .collect();

    let lines: Vec<String> = filtered
        .lines()
        .map(|line| HSPACE_RE.replace_all(line, " ").trim().to_string())
        .collect();

    BLANK_RUN_RE
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}

/// Stage 5: drop greetings at the start and closings at the end until stable.
fn strip_greetings_and_closings(text: &str) -> String {
    let mut current = text.trim().to_string();
    loop {
        let next = GREETING_RE.replace(&current, "");
        let next = CLOSING_RE.replace(&next, "${1}");
        let next = next.trim().to_string();
        if next == current {
            return current;
        }
        current = next;
    }
}

/// Stage 6: first `max` whitespace tokens, single-space joined.
fn truncate_words(text: &str, max: usize) -> String {
    text.split_whitespace()
        .take(max)
        .collect::<Vec<_>>()
        .join(" ")
}

//! Content extraction: walks a MIME part tree and yields one plain-text body.
//!
//! Priority at every level: a `text/plain` leaf, then a `text/html` leaf
//! (markup stripped), then the first non-empty result of recursing into
//! each child in order. Extraction is best-effort and never fails: an
//! undecodable part contributes an empty string.

use std::sync::LazyLock;

use base64::Engine;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use regex::Regex;
use tracing::debug;

use crate::channels::email_types::MessagePart;

/// base64url, accepting data with or without `=` padding.
const BASE64_URL: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

static SCRIPT_STYLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<!--.*?-->|<script\b.*?</script\s*>|<style\b.*?</style\s*>|<head\b.*?</head\s*>")
        .unwrap()
});

static HSPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t\u{a0}]+").unwrap());

static BLANK_LINES_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\s*\n\s*").unwrap());

/// Wide enough that html2text never wraps a paragraph.
const HTML_WRAP_WIDTH: usize = 10_000;

/// Extract the best plain-text body from a part tree.
///
/// Returns an empty string when no textual leaf exists (e.g. attachment-only mail).
pub fn extract_body(root: &MessagePart) -> String {
    if root.parts.is_empty() {
        return extract_leaf(root);
    }

    // Plain wins over html at the same level, regardless of order.
    for kind in [TextKind::Plain, TextKind::Html] {
        for child in root.parts.iter().filter(|p| p.parts.is_empty()) {
            if text_kind(&child.mime_type) == Some(kind) {
                let text = extract_leaf(child);
                if !text.is_empty() {
                    return text;
                }
            }
        }
    }

    root.parts
        .iter()
        .filter(|p| !p.parts.is_empty())
        .map(extract_body)
        .find(|text| !text.is_empty())
        .unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TextKind {
    Plain,
    Html,
}

/// Classify a MIME type, ignoring case and parameters.
fn text_kind(mime_type: &str) -> Option<TextKind> {
    let essence = mime_type.split(';').next().unwrap_or_default().trim();
    if essence.eq_ignore_ascii_case("text/plain") {
        Some(TextKind::Plain)
    } else if essence.eq_ignore_ascii_case("text/html") {
        Some(TextKind::Html)
    } else {
        None
    }
}

fn extract_leaf(part: &MessagePart) -> String {
    let Some(kind) = text_kind(&part.mime_type) else {
        return String::new();
    };
    let Some(data) = part.data() else {
        debug!(mime_type = %part.mime_type, "Text part has no inline data");
        return String::new();
    };
    let decoded = decode_base64url(data);
    match kind {
        TextKind::Plain => decoded,
        TextKind::Html => strip_html(&decoded),
    }
}

/// Decode base64url data into UTF-8 text. Any failure yields an empty string.
pub fn decode_base64url(data: &str) -> String {
    // Some producers wrap encoded bodies across lines.
    let compact: String = data.chars().filter(|c| !c.is_whitespace()).collect();
    match BASE64_URL.decode(compact.as_bytes()) {
        Ok(bytes) => String::from_utf8(bytes).unwrap_or_else(|e| {
            debug!(error = %e, "Decoded part is not valid UTF-8");
            String::new()
        }),
        Err(e) => {
            debug!(error = %e, "Failed to decode message part");
            String::new()
        }
    }
}

/// Convert HTML to plain text: drop scripts, styles and comments, render the
/// rest without decoration (entities decoded, links reduced to their text),
/// then collapse whitespace.
pub fn strip_html(html: &str) -> String {
    let html = SCRIPT_STYLE_RE.replace_all(html, " ");
    let rendered = match html2text::config::plain_no_decorate()
        .string_from_read(html.as_bytes(), HTML_WRAP_WIDTH)
    {
        Ok(text) => text,
        Err(e) => {
            debug!(error = %e, "Failed to render html part");
            return String::new();
        }
    };

    let text = HSPACE_RE.replace_all(&rendered, " ");
    let text = BLANK_LINES_RE.replace_all(&text, "\n\n");

    text.lines()
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};

    fn enc(text: &str) -> String {
        URL_SAFE_NO_PAD.encode(text)
    }

    fn plain(text: &str) -> MessagePart {
        MessagePart::leaf("text/plain", &enc(text))
    }

    fn html(text: &str) -> MessagePart {
        MessagePart::leaf("text/html", &enc(text))
    }

    #[test]
    fn plain_leaf_returned_verbatim() {
        assert_eq!(extract_body(&plain("Hello\n  world")), "Hello\n  world");
    }

    #[test]
    fn html_leaf_is_stripped() {
        let part = html("<p>Hello&nbsp;<b>there</b></p><p>Bye &amp; thanks</p>");
        assert_eq!(extract_body(&part), "Hello there\n\nBye & thanks");
    }

    #[test]
    fn plain_wins_over_earlier_html_sibling() {
        let root = MessagePart::multipart(
            "multipart/alternative",
            vec![html("<b>hi</b>"), plain("Hello world")],
        );
        assert_eq!(extract_body(&root), "Hello world");
    }

    #[test]
    fn plain_wins_over_later_html_sibling() {
        let root = MessagePart::multipart(
            "multipart/alternative",
            vec![plain("Hello world"), html("<b>hi</b>")],
        );
        assert_eq!(extract_body(&root), "Hello world");
    }

    #[test]
    fn html_used_when_no_plain() {
        let root = MessagePart::multipart(
            "multipart/alternative",
            vec![
                MessagePart::leaf("image/png", &enc("png bytes")),
                html("<div>Only html</div>"),
            ],
        );
        assert_eq!(extract_body(&root), "Only html");
    }

    #[test]
    fn recurses_into_nested_multipart() {
        let root = MessagePart::multipart(
            "multipart/mixed",
            vec![
                MessagePart::leaf("application/pdf", &enc("%PDF")),
                MessagePart::multipart(
                    "multipart/alternative",
                    vec![html("<i>nested</i>"), plain("nested plain")],
                ),
            ],
        );
        assert_eq!(extract_body(&root), "nested plain");
    }

    #[test]
    fn sibling_leaf_beats_nested_plain() {
        let root = MessagePart::multipart(
            "multipart/mixed",
            vec![
                MessagePart::multipart("multipart/alternative", vec![plain("deep")]),
                html("<p>shallow</p>"),
            ],
        );
        assert_eq!(extract_body(&root), "shallow");
    }

    #[test]
    fn attachment_only_yields_empty() {
        let root = MessagePart::multipart(
            "multipart/mixed",
            vec![
                MessagePart::leaf("application/pdf", &enc("%PDF")),
                MessagePart::multipart(
                    "multipart/related",
                    vec![MessagePart::leaf("image/jpeg", &enc("jpg"))],
                ),
            ],
        );
        assert_eq!(extract_body(&root), "");
    }

    #[test]
    fn empty_tree_yields_empty() {
        assert_eq!(extract_body(&MessagePart::default()), "");
    }

    #[test]
    fn undecodable_part_yields_empty() {
        let part = MessagePart::leaf("text/plain", "!!!not base64!!!");
        assert_eq!(extract_body(&part), "");
    }

    #[test]
    fn undecodable_plain_falls_through_to_html() {
        let root = MessagePart::multipart(
            "multipart/alternative",
            vec![
                MessagePart::leaf("text/plain", "%%%"),
                html("<p>fallback</p>"),
            ],
        );
        assert_eq!(extract_body(&root), "fallback");
    }

    #[test]
    fn mime_parameters_and_case_ignored() {
        let part = MessagePart::leaf("Text/Plain; charset=\"UTF-8\"", &enc("ok"));
        assert_eq!(extract_body(&part), "ok");
    }

    #[test]
    fn padded_data_decodes() {
        let part = MessagePart::leaf("text/plain", &URL_SAFE.encode("pad me!"));
        assert!(part.data().is_some_and(|d| d.ends_with("==")));
        assert_eq!(extract_body(&part), "pad me!");
    }

    #[test]
    fn url_safe_alphabet_decodes() {
        // "??>" encodes to "Pz8-" in the URL-safe alphabet.
        assert_eq!(decode_base64url("Pz8-"), "??>");
    }

    #[test]
    fn strip_html_drops_scripts_and_styles() {
        let text = strip_html(
            "<html><head><title>x</title></head><style>p{}</style><script>alert(1)</script><p>Body</p></html>",
        );
        assert_eq!(text, "Body");
    }

    #[test]
    fn strip_html_decodes_numeric_entities() {
        assert_eq!(strip_html("caf&#233; &#x2014; ok"), "caf\u{e9} \u{2014} ok");
    }

    #[test]
    fn strip_html_decodes_named_entities() {
        assert_eq!(
            strip_html("<p>Caf&eacute; costs 5&euro; &mdash; Acme&trade; &reg; &lt;ok&gt;</p>"),
            "Caf\u{e9} costs 5\u{20ac} \u{2014} Acme\u{2122} \u{ae} <ok>"
        );
    }

    #[test]
    fn strip_html_keeps_link_text_only() {
        assert_eq!(
            strip_html(r#"<p>Read the <a href="https://x.io/doc">release notes</a> today.</p>"#),
            "Read the release notes today."
        );
    }

    #[test]
    fn strip_html_collapses_blank_lines() {
        let text = strip_html("<p>a</p>\n\n\n<p>b</p>");
        assert_eq!(text, "a\n\nb");
    }
}

//! Email-specific types: the raw MIME part tree delivered by the mailbox API,
//! and the extracted record handed to the pipeline.

use serde::{Deserialize, Serialize};

use crate::pipeline::extract::extract_body;

/// A raw message as delivered by the mail source.
///
/// Field names follow the Gmail `users.messages.get?format=full` JSON shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMessage {
    pub id: String,
    #[serde(default)]
    pub thread_id: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    #[serde(default)]
    pub payload: MessagePart,
}

/// One node of the MIME tree: a media type plus either inline data or child parts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePart {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub headers: Vec<Header>,
    #[serde(default)]
    pub body: Option<PartBody>,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

/// A single header.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Header {
    pub name: String,
    pub value: String,
}

/// Inline body data (base64url text).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PartBody {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

impl MessagePart {
    /// A leaf part carrying inline base64url data.
    pub fn leaf(mime_type: &str, data: &str) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            body: Some(PartBody {
                data: Some(data.to_string()),
                size: None,
            }),
            ..Default::default()
        }
    }

    /// A container part.
    pub fn multipart(mime_type: &str, parts: Vec<MessagePart>) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            parts,
            ..Default::default()
        }
    }

    /// Inline data, if any.
    pub fn data(&self) -> Option<&str> {
        self.body.as_ref()?.data.as_deref()
    }

    /// Find a header value by name (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }
}

/// Parsed `From` header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Sender {
    pub name: Option<String>,
    pub email: Option<String>,
}

impl Sender {
    /// Parse `"Jane Doe" <jane@example.com>`, `Jane <jane@x>` or a bare address.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self::default();
        }

        if let (Some(open), Some(close)) = (raw.rfind('<'), raw.rfind('>'))
            && open < close
        {
            let email = raw[open + 1..close].trim();
            let name = raw[..open].trim().trim_matches('"').trim();
            return Self {
                name: (!name.is_empty()).then(|| name.to_string()),
                email: (!email.is_empty()).then(|| email.to_string()),
            };
        }

        if raw.contains('@') {
            Self {
                name: None,
                email: Some(raw.to_string()),
            }
        } else {
            Self {
                name: Some(raw.to_string()),
                email: None,
            }
        }
    }

    /// Display label: name, then email, then "Unknown".
    pub fn display(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("Unknown")
    }
}

/// The readable record extracted from a [`RawMessage`]. Immutable once built.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedEmail {
    id: String,
    subject: String,
    from: Sender,
    date: Option<String>,
    snippet: String,
    body: String,
}

impl ExtractedEmail {
    /// Extract headers and the best-effort plain-text body. Never fails.
    pub fn from_raw(raw: &RawMessage) -> Self {
        let payload = &raw.payload;
        Self {
            id: raw.id.clone(),
            subject: payload.header("Subject").unwrap_or_default().to_string(),
            from: Sender::parse(payload.header("From").unwrap_or_default()),
            date: payload.header("Date").map(str::to_string),
            snippet: raw.snippet.clone().unwrap_or_default(),
            body: extract_body(payload),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn from(&self) -> &Sender {
        &self.from
    }

    pub fn date(&self) -> Option<&str> {
        self.date.as_deref()
    }

    pub fn snippet(&self) -> &str {
        &self.snippet
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    fn header(name: &str, value: &str) -> Header {
        Header {
            name: name.into(),
            value: value.into(),
        }
    }

    #[test]
    fn sender_with_quoted_name() {
        let s = Sender::parse("\"Jane Doe\" <jane@example.com>");
        assert_eq!(s.name.as_deref(), Some("Jane Doe"));
        assert_eq!(s.email.as_deref(), Some("jane@example.com"));
        assert_eq!(s.display(), "Jane Doe");
    }

    #[test]
    fn sender_bare_address() {
        let s = Sender::parse("bob@example.com");
        assert_eq!(s.name, None);
        assert_eq!(s.display(), "bob@example.com");
    }

    #[test]
    fn sender_empty_is_unknown() {
        assert_eq!(Sender::parse("  ").display(), "Unknown");
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let part = MessagePart {
            headers: vec![header("SUBJECT", "Hi")],
            ..Default::default()
        };
        assert_eq!(part.header("subject"), Some("Hi"));
        assert_eq!(part.header("From"), None);
    }

    #[test]
    fn extracted_email_from_raw() {
        let mut payload = MessagePart::leaf(
            "text/plain",
            &URL_SAFE_NO_PAD.encode("Lunch at noon?"),
        );
        payload.headers = vec![
            header("Subject", "Lunch"),
            header("From", "Alice <alice@example.com>"),
            header("Date", "Mon, 1 Jan 2026 10:00:00 +0000"),
        ];
        let raw = RawMessage {
            id: "m1".into(),
            thread_id: None,
            snippet: Some("Lunch at noon?".into()),
            payload,
        };

        let email = ExtractedEmail::from_raw(&raw);
        assert_eq!(email.id(), "m1");
        assert_eq!(email.subject(), "Lunch");
        assert_eq!(email.from().display(), "Alice");
        assert_eq!(email.date(), Some("Mon, 1 Jan 2026 10:00:00 +0000"));
        assert_eq!(email.snippet(), "Lunch at noon?");
        assert_eq!(email.body(), "Lunch at noon?");
    }

    #[test]
    fn raw_message_deserializes_gmail_shape() {
        let json = r#"{
            "id": "18c",
            "threadId": "18c",
            "snippet": "Hello",
            "payload": {
                "mimeType": "multipart/alternative",
                "headers": [{"name": "Subject", "value": "Test"}],
                "body": {"size": 0},
                "parts": [
                    {"mimeType": "text/plain", "body": {"size": 5, "data": "SGVsbG8"}}
                ]
            }
        }"#;
        let raw: RawMessage = serde_json::from_str(json).unwrap();
        assert_eq!(raw.payload.parts.len(), 1);
        assert_eq!(raw.payload.parts[0].data(), Some("SGVsbG8"));
        assert_eq!(ExtractedEmail::from_raw(&raw).body(), "Hello");
    }
}

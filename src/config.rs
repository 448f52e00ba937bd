//! Configuration: process environment plus persisted user settings.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::warn;

use crate::error::{ConfigError, DatabaseError};
use crate::llm::OPENAI_BASE_URL;
use crate::pipeline::types::Tag;
use crate::store::{SETTINGS_KEY, StateStore};

pub const DEFAULT_DB_PATH: &str = "./data/mail-brief.db";
pub const DEFAULT_GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
pub const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const MAX_BATCH_SIZE: usize = 50;
pub const DEFAULT_AI_TIMEOUT_SECS: u64 = 15;

/// Poll interval used when none (or garbage) is stored.
pub const DEFAULT_POLL_INTERVAL_MINUTES: u64 = 5;
/// Poll interval floor.
pub const MIN_POLL_INTERVAL_MINUTES: u64 = 1;
/// Poll interval ceiling: one day.
pub const MAX_POLL_INTERVAL_MINUTES: u64 = 24 * 60;

/// Process-level configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub db_path: PathBuf,
    pub gmail_api_base: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub ai_timeout: Duration,
    pub batch_size: usize,
    pub fallback_tag: Tag,
    /// File holding the current mailbox access token, rewritten by the auth flow.
    pub token_file: Option<PathBuf>,
    /// Static access token, used when no token file is configured.
    pub access_token: Option<SecretString>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let ai_timeout_secs = match get("MAIL_BRIEF_AI_TIMEOUT_SECS") {
            Some(raw) => parse_number::<u64>("MAIL_BRIEF_AI_TIMEOUT_SECS", &raw)?.max(1),
            None => DEFAULT_AI_TIMEOUT_SECS,
        };

        let batch_size = match get("MAIL_BRIEF_BATCH_SIZE") {
            Some(raw) => {
                parse_number::<usize>("MAIL_BRIEF_BATCH_SIZE", &raw)?.clamp(1, MAX_BATCH_SIZE)
            }
            None => DEFAULT_BATCH_SIZE,
        };

        let fallback_tag = match get("MAIL_BRIEF_FALLBACK_TAG") {
            Some(raw) => match Tag::parse(&raw) {
                Some(tag @ (Tag::NoActionNeeded | Tag::Fyi)) => tag,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "MAIL_BRIEF_FALLBACK_TAG".into(),
                        message: format!("expected 'no_action_needed' or 'fyi', got '{raw}'"),
                    });
                }
            },
            None => Tag::NoActionNeeded,
        };

        Ok(Self {
            db_path: get("MAIL_BRIEF_DB_PATH")
                .unwrap_or_else(|| DEFAULT_DB_PATH.to_string())
                .into(),
            gmail_api_base: get("MAIL_BRIEF_GMAIL_API_BASE")
                .unwrap_or_else(|| DEFAULT_GMAIL_API_BASE.to_string()),
            llm_base_url: get("MAIL_BRIEF_LLM_BASE_URL")
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            llm_model: get("MAIL_BRIEF_LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
            ai_timeout: Duration::from_secs(ai_timeout_secs),
            batch_size,
            fallback_tag,
            token_file: get("GMAIL_TOKEN_FILE").map(PathBuf::from),
            access_token: get("GMAIL_ACCESS_TOKEN").map(SecretString::from),
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: e.to_string(),
    })
}

// ── Persisted settings ──────────────────────────────────────────────

/// User settings, persisted as `{"ai_api_key": string|null, "poll_interval_minutes": number}`.
#[derive(Debug, Clone)]
pub struct Settings {
    pub ai_api_key: Option<SecretString>,
    pub poll_interval_minutes: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ai_api_key: None,
            poll_interval_minutes: DEFAULT_POLL_INTERVAL_MINUTES,
        }
    }
}

impl Settings {
    /// Lenient decode. Anything unreadable falls back to the defaults.
    pub fn from_value(value: &Value) -> Self {
        let ai_api_key = value
            .get("ai_api_key")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(|k| SecretString::from(k.to_string()));

        Self {
            ai_api_key,
            poll_interval_minutes: sanitize_interval(value.get("poll_interval_minutes")),
        }
    }

    pub fn to_value(&self) -> Value {
        json!({
            "ai_api_key": self.ai_api_key.as_ref().map(|k| k.expose_secret().to_string()),
            "poll_interval_minutes": self.poll_interval_minutes,
        })
    }

    pub async fn load(store: &dyn StateStore) -> Result<Self, DatabaseError> {
        match store.get_value(SETTINGS_KEY).await {
            Ok(Some(value)) => Ok(Self::from_value(&value)),
            Ok(None) => Ok(Self::default()),
            Err(DatabaseError::Serialization(e)) => {
                warn!(error = %e, "Stored settings are unreadable, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn save(&self, store: &dyn StateStore) -> Result<(), DatabaseError> {
        store.set_value(SETTINGS_KEY, &self.to_value()).await
    }

    pub fn has_ai_key(&self) -> bool {
        self.ai_api_key.is_some()
    }

    pub fn set_poll_interval(&mut self, minutes: u64) {
        self.poll_interval_minutes = clamp_interval(minutes);
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(clamp_interval(self.poll_interval_minutes) * 60)
    }
}

fn clamp_interval(minutes: u64) -> u64 {
    minutes.clamp(MIN_POLL_INTERVAL_MINUTES, MAX_POLL_INTERVAL_MINUTES)
}

/// Out-of-range values are clamped to the floor or ceiling; missing or
/// non-numeric values become the default.
fn sanitize_interval(value: Option<&Value>) -> u64 {
    match value.and_then(Value::as_f64) {
        Some(minutes) if minutes.is_finite() => {
            if minutes < MIN_POLL_INTERVAL_MINUTES as f64 {
                MIN_POLL_INTERVAL_MINUTES
            } else {
                clamp_interval(minutes.floor() as u64)
            }
        }
        _ => DEFAULT_POLL_INTERVAL_MINUTES,
    }
}

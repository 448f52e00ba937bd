//! Backend-agnostic key-value state store.
//!
//! The app persists two things: the processed-id set and the settings blob.
//! Both are JSON values addressed by a string key.

use async_trait::async_trait;

use crate::error::DatabaseError;

/// Persisted key for the processed message id list.
pub const PROCESSED_IDS_KEY: &str = "processed_ids";

/// Persisted key for user settings.
pub const SETTINGS_KEY: &str = "settings";

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read a value. `Ok(None)` when the key was never written.
    async fn get_value(&self, key: &str) -> Result<Option<serde_json::Value>, DatabaseError>;

    /// Insert or replace a value.
    async fn set_value(&self, key: &str, value: &serde_json::Value) -> Result<(), DatabaseError>;
}

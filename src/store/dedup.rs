//! Duplicate suppression: the set of message ids already notified.
//!
//! Membership is a `HashSet` in memory. The mutex is held across the persist
//! so concurrent marks from one batch never drop each other's ids. On disk the
//! set is a sorted JSON array under [`PROCESSED_IDS_KEY`].

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::DatabaseError;
use crate::store::traits::{PROCESSED_IDS_KEY, StateStore};

pub struct DedupTracker {
    store: Arc<dyn StateStore>,
    ids: Mutex<HashSet<String>>,
}

impl DedupTracker {
    /// Load the persisted set. A missing key starts empty; a malformed value
    /// is logged and treated as empty.
    pub async fn load(store: Arc<dyn StateStore>) -> Result<Self, DatabaseError> {
        let ids = match store.get_value(PROCESSED_IDS_KEY).await {
            Ok(Some(value)) => serde_json::from_value::<Vec<String>>(value)
                .map(|v| v.into_iter().collect())
                .unwrap_or_else(|e| {
                    warn!(error = %e, "Processed id list is malformed, starting empty");
                    HashSet::new()
                }),
            Ok(None) => HashSet::new(),
            Err(DatabaseError::Serialization(e)) => {
                warn!(error = %e, "Processed id list is unreadable, starting empty");
                HashSet::new()
            }
            Err(e) => return Err(e),
        };

        info!(count = ids.len(), "Loaded processed message ids");
        Ok(Self {
            store,
            ids: Mutex::new(ids),
        })
    }

    pub async fn has(&self, id: &str) -> bool {
        self.ids.lock().await.contains(id)
    }

    pub async fn len(&self) -> usize {
        self.ids.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.ids.lock().await.is_empty()
    }

    /// Add an id and persist the whole set.
    ///
    /// The id stays in memory even if the write fails; the next successful
    /// persist carries it.
    pub async fn mark_processed(&self, id: &str) -> Result<(), DatabaseError> {
        let mut ids = self.ids.lock().await;
        if !ids.insert(id.to_string()) {
            return Ok(());
        }
        debug!(id, "Marking message processed");
        persist(self.store.as_ref(), &ids).await
    }

    /// Forget every id. Memory is only cleared once the empty set is stored.
    pub async fn clear(&self) -> Result<(), DatabaseError> {
        let mut ids = self.ids.lock().await;
        persist(self.store.as_ref(), &HashSet::new()).await?;
        let dropped = std::mem::take(&mut *ids).len();
        info!(dropped, "Cleared processed message ids");
        Ok(())
    }
}

async fn persist(store: &dyn StateStore, ids: &HashSet<String>) -> Result<(), DatabaseError> {
    let mut sorted: Vec<&String> = ids.iter().collect();
    sorted.sort();
    let value =
        serde_json::to_value(sorted).map_err(|e| DatabaseError::Serialization(e.to_string()))?;
    store.set_value(PROCESSED_IDS_KEY, &value).await
}

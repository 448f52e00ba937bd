//! Persistence layer: a JSON key-value store plus the dedup set built on it.

pub mod dedup;
pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod traits;

pub use dedup::DedupTracker;
pub use libsql_backend::LibSqlBackend;
pub use memory::MemoryStore;
pub use traits::{PROCESSED_IDS_KEY, SETTINGS_KEY, StateStore};

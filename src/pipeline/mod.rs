//! Email summarisation pipeline.
//!
//! Every unread message flows through:
//! 1. `extract::extract_body()`: best-effort plain text from the MIME tree
//! 2. `sanitize::sanitize()`: signatures, quotes, greetings and contact data removed
//! 3. `classifier::AiClassifier`: model call with contract checks, or
//!    `rules::RuleClassifier` when no key is set or the call fails
//! 4. Notification, then the id is marked in the dedup set

pub mod classifier;
pub mod extract;
pub mod poller;
pub mod processor;
pub mod rules;
pub mod sanitize;
pub mod types;

pub use classifier::AiClassifier;
pub use poller::{CycleReport, Poller, spawn_poller};
pub use processor::MessageProcessor;
pub use rules::RuleClassifier;
pub use sanitize::sanitize;
pub use types::{ClassificationResult, MessageOutcome, SanitizedContent, Tag};

//! Mail Brief: unread mail in, one-line notifications out.

pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod store;

//! LLM integration.
//!
//! A single OpenAI-compatible chat-completions backend behind the
//! `LlmProvider` trait, so tests can substitute a stub.

pub mod openai;
pub mod provider;

pub use openai::{OPENAI_BASE_URL, OpenAiProvider};
pub use provider::*;

//! Text-generation collaborator used by the orchestrator, explainer and refiner.
//!
//! Agents depend only on [`TextGenerator`]; [`LangbaseClient`] is the HTTP
//! implementation and [`DisabledGenerator`] stands in when no API key is set.

mod client;
mod types;

pub use client::LangbaseClient;
pub use types::{Message, MessageRole, PipeRequest, PipeResponse, RawResponse, Usage};

use async_trait::async_trait;

use crate::error::{LlmError, LlmResult};

/// Single call contract: system instruction plus user content in, response text out.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Run `pipe` with the given instruction and content.
    async fn generate(&self, pipe: &str, system: &str, user: &str) -> LlmResult<String>;
}

/// Generator used when the LLM is not configured. Every call fails with
/// [`LlmError::Disabled`] so callers take their fallback path.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGenerator;

#[async_trait]
impl TextGenerator for DisabledGenerator {
    async fn generate(&self, _pipe: &str, _system: &str, _user: &str) -> LlmResult<String> {
        Err(LlmError::Disabled)
    }
}

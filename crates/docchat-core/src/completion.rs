//! Completion provider trait.
//!
//! The language model is an opaque service: an assembled [`Prompt`] and
//! sampling options go in; text and token usage come out. Concrete
//! providers (Anthropic, OpenAI-compatible, local echo) live in the
//! `docchat` app crate.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::context::Prompt;
use crate::error::Result;
use crate::models::TokenUsage;
use crate::session::SessionSettings;

/// Sampling options for one completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionOptions {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl From<&SessionSettings> for CompletionOptions {
    fn from(settings: &SessionSettings) -> Self {
        Self {
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }
}

/// Result of one completion call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    pub usage: TokenUsage,
    /// Model that actually answered, as reported by the provider.
    pub model: String,
}

/// Trait for completion backends.
///
/// Transport, authentication and rate-limit failures must surface as
/// [`RagError::Provider`](crate::error::RagError::Provider).
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Short provider name for logs (e.g. `"anthropic"`).
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &Prompt, options: &CompletionOptions) -> Result<Completion>;
}

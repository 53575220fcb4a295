//! Completion provider implementations.
//!
//! Concrete [`CompletionProvider`]s selected by `[completion] provider`:
//! - **[`DisabledProvider`]**: fails every call.
//! - **[`AnthropicProvider`]**: `POST /v1/messages`, key from `ANTHROPIC_API_KEY`.
//! - **[`OpenAIChatProvider`]**: `POST /chat/completions` on any
//!   OpenAI-compatible endpoint, key from `OPENAI_API_KEY`.
//! - **[`EchoProvider`]**: local and deterministic; repeats the question and
//!   lists the sources it was given.
//!
//! The HTTP providers retry 429 and 5xx responses with the same exponential
//! backoff as the embedding client. Failures surface as
//! [`RagError::Provider`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde_json::{json, Value};

use docchat_core::completion::{Completion, CompletionOptions, CompletionProvider};
use docchat_core::context::{estimate_tokens, Prompt, SegmentKind};
use docchat_core::error::{RagError, Result};
use docchat_core::models::{Role, TokenUsage};

use crate::config::CompletionConfig;

const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Conversation turns shaped for chat APIs that require alternating roles
/// starting with the user: leading assistant turns are dropped and
/// consecutive turns of the same role are merged.
fn alternating_turns(prompt: &Prompt) -> Vec<(Role, String)> {
    let mut turns: Vec<(Role, String)> = Vec::new();
    for (role, text) in prompt.turns() {
        if turns.is_empty() && role != Role::User {
            continue;
        }
        match turns.last_mut() {
            Some((last_role, last_text)) if *last_role == role => {
                last_text.push_str("\n\n");
                last_text.push_str(text);
            }
            _ => turns.push((role, text.to_string())),
        }
    }
    turns
}

fn http_client(timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("Failed to build HTTP client")
}

/// POST `body` as JSON, retrying rate limits and server errors.
async fn post_json(
    client: &reqwest::Client,
    url: &str,
    headers: &[(&str, &str)],
    body: &Value,
    max_retries: u32,
) -> Result<Value> {
    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tracing::debug!(attempt, ?delay, url, "retrying completion request");
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        for (name, value) in headers {
            request = request.header(*name, *value);
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    return response
                        .json()
                        .await
                        .map_err(|e| RagError::Provider(format!("invalid response body: {}", e)));
                }

                let body_text = response.text().await.unwrap_or_default();
                let err = format!("API error {}: {}", status, body_text);
                if status.as_u16() == 429 || status.is_server_error() {
                    last_err = Some(err);
                    continue;
                }
                return Err(RagError::Provider(err));
            }
            Err(e) => {
                last_err = Some(e.to_string());
                continue;
            }
        }
    }

    Err(RagError::Provider(
        last_err.unwrap_or_else(|| "completion failed after retries".to_string()),
    ))
}

fn usage_field(json: &Value, field: &str) -> u32 {
    json.get("usage")
        .and_then(|u| u.get(field))
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32
}

// ============ Disabled Provider ============

pub struct DisabledProvider;

#[async_trait]
impl CompletionProvider for DisabledProvider {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _prompt: &Prompt, _options: &CompletionOptions) -> Result<Completion> {
        Err(RagError::Provider(
            "completion provider is disabled; set [completion] provider in config".to_string(),
        ))
    }
}

// ============ Anthropic Provider ============

pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    max_retries: u32,
}

impl AnthropicProvider {
    pub fn new(config: &CompletionConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("ANTHROPIC_API_KEY")
            .map_err(|_| anyhow::anyhow!("ANTHROPIC_API_KEY environment variable not set"))?;
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            api_key,
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| ANTHROPIC_BASE_URL.to_string()),
            max_retries: config.max_retries,
        })
    }
}

fn anthropic_body(prompt: &Prompt, options: &CompletionOptions) -> Value {
    let messages: Vec<Value> = alternating_turns(prompt)
        .into_iter()
        .map(|(role, content)| json!({ "role": role.as_str(), "content": content }))
        .collect();

    let mut body = json!({
        "model": options.model,
        "max_tokens": options.max_tokens,
        "temperature": options.temperature,
        "messages": messages,
    });
    let system = prompt.system_text();
    if !system.is_empty() {
        body["system"] = Value::String(system);
    }
    body
}

fn parse_anthropic_response(json: &Value, requested_model: &str) -> Result<Completion> {
    let text: String = json
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| RagError::Provider("invalid Anthropic response: missing content".into()))?
        .iter()
        .filter(|block| block.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|block| block.get("text").and_then(Value::as_str))
        .collect();

    Ok(Completion {
        text,
        usage: TokenUsage {
            input_tokens: usage_field(json, "input_tokens"),
            output_tokens: usage_field(json, "output_tokens"),
        },
        model: json
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(requested_model)
            .to_string(),
    })
}

#[async_trait]
impl CompletionProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, prompt: &Prompt, options: &CompletionOptions) -> Result<Completion> {
        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let headers = [
            ("x-api-key", self.api_key.as_str()),
            ("anthropic-version", ANTHROPIC_VERSION),
        ];
        let json = post_json(
            &self.client,
            &url,
            &headers,
            &anthropic_body(prompt, options),
            self.max_retries,
        )
        .await?;
        parse_anthropic_response(&json, &options.model)
    }
}

// ============ OpenAI-compatible Provider ============

pub struct OpenAIChatProvider {
    client: reqwest::Client,
    auth_header: String,
    base_url: String,
    max_retries: u32,
}

impl OpenAIChatProvider {
    pub fn new(config: &CompletionConfig) -> anyhow::Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            client: http_client(config.timeout_secs)?,
            auth_header: format!("Bearer {}", api_key),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| OPENAI_BASE_URL.to_string()),
            max_retries: config.max_retries,
        })
    }
}

fn openai_body(prompt: &Prompt, options: &CompletionOptions) -> Value {
    let mut messages = Vec::new();
    let system = prompt.system_text();
    if !system.is_empty() {
        messages.push(json!({ "role": "system", "content": system }));
    }
    messages.extend(
        prompt
            .turns()
            .into_iter()
            .map(|(role, content)| json!({ "role": role.as_str(), "content": content })),
    );

    json!({
        "model": options.model,
        "max_tokens": options.max_tokens,
        "temperature": options.temperature,
        "messages": messages,
    })
}

fn parse_openai_response(json: &Value, requested_model: &str) -> Result<Completion> {
    let text = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .ok_or_else(|| RagError::Provider("invalid OpenAI response: missing choices".into()))?;

    Ok(Completion {
        text: text.to_string(),
        usage: TokenUsage {
            input_tokens: usage_field(json, "prompt_tokens"),
            output_tokens: usage_field(json, "completion_tokens"),
        },
        model: json
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(requested_model)
            .to_string(),
    })
}

#[async_trait]
impl CompletionProvider for OpenAIChatProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, prompt: &Prompt, options: &CompletionOptions) -> Result<Completion> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let headers = [("Authorization", self.auth_header.as_str())];
        let json = post_json(
            &self.client,
            &url,
            &headers,
            &openai_body(prompt, options),
            self.max_retries,
        )
        .await?;
        parse_openai_response(&json, &options.model)
    }
}

// ============ Echo Provider ============

/// Answers with the user's question and the sources in the prompt.
pub struct EchoProvider;

#[async_trait]
impl CompletionProvider for EchoProvider {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, prompt: &Prompt, _options: &CompletionOptions) -> Result<Completion> {
        let question = prompt
            .of_kind(SegmentKind::UserMessage)
            .last()
            .map(|s| s.content.as_str())
            .unwrap_or_default();

        let mut text = format!("You asked: {}", question);
        let sources: Vec<&str> = prompt
            .of_kind(SegmentKind::Context)
            .filter_map(|s| s.source.as_deref())
            .collect();
        if !sources.is_empty() {
            text.push_str("\n\nSources:");
            for source in sources {
                text.push_str("\n- ");
                text.push_str(source);
            }
        }

        let output_tokens = estimate_tokens(&text) as u32;
        Ok(Completion {
            text,
            usage: TokenUsage {
                input_tokens: prompt.estimated_tokens as u32,
                output_tokens,
            },
            model: "echo".to_string(),
        })
    }
}

// ============ Factory ============

pub fn create_provider(config: &CompletionConfig) -> anyhow::Result<Arc<dyn CompletionProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledProvider)),
        "anthropic" => Ok(Arc::new(AnthropicProvider::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIChatProvider::new(config)?)),
        "echo" => Ok(Arc::new(EchoProvider)),
        other => bail!("Unknown completion provider: {}", other),
    }
}

use anyhow::{Result, bail};
use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::auth::{AuthStorage, Provider};
use crate::consts::DEFAULT_MODEL;
use crate::prompts::modernize::build_modernize_system_prompt;

use super::{ModernizeRequest, Modernized, Modernizer, TokenUsage};

const API_URL: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MAX_TOKENS: u32 = 8192;

/// A modernizer that calls the Anthropic Messages API.
pub struct AnthropicModernizer {
    model: String,
    auth: AuthStorage,
    client: reqwest::Client,
}

impl AnthropicModernizer {
    pub fn new(model: Option<String>, auth: AuthStorage) -> Self {
        Self {
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            auth,
            client: reqwest::Client::new(),
        }
    }

    fn build_messages(request: &ModernizeRequest) -> Vec<Message> {
        vec![Message {
            role: "user".to_string(),
            content: request.text.clone(),
        }]
    }

    /// Join the text blocks of a response into the rewritten passage.
    fn extract_text(response: &ApiResponse) -> Result<String> {
        let text: String = response
            .content
            .iter()
            .filter_map(|block| {
                if block.content_type == "text" {
                    block.text.as_deref()
                } else {
                    None
                }
            })
            .collect::<Vec<_>>()
            .join("");

        let text = strip_fences(&text);
        if text.is_empty() {
            bail!("Anthropic API returned empty response");
        }
        Ok(text.to_string())
    }
}

#[async_trait]
impl Modernizer for AnthropicModernizer {
    async fn modernize(&self, request: &ModernizeRequest) -> Result<Modernized> {
        let api_key = self.auth.api_key(Provider::Anthropic)?.ok_or_else(|| {
            anyhow::anyhow!(
                "no Anthropic credentials found. Run `quill login anthropic` or set ANTHROPIC_API_KEY."
            )
        })?;

        let system = build_modernize_system_prompt(request.previous.as_deref());
        let messages = Self::build_messages(request);

        let body = ApiRequest {
            model: &self.model,
            max_tokens: MAX_TOKENS,
            system: &system,
            messages: &messages,
        };

        let resp = self
            .client
            .post(API_URL)
            .header("anthropic-version", API_VERSION)
            .header("content-type", "application/json")
            .header("x-api-key", &api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            bail!("Anthropic API error ({}): {}", status, text);
        }

        let api_resp: ApiResponse = resp.json().await?;
        let text = Self::extract_text(&api_resp)?;

        let usage = api_resp.usage.map(|u| TokenUsage {
            input_tokens: u.input_tokens,
            output_tokens: u.output_tokens,
        });
        if let Some(usage) = usage {
            debug!(
                "modernized {} chars: {} input / {} output tokens",
                request.text.len(),
                usage.input_tokens,
                usage.output_tokens
            );
        }

        Ok(Modernized { text, usage })
    }

    fn model(&self) -> String {
        self.model.clone()
    }
}

/// Remove a markdown code fence the model wrapped its answer in.
fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();

    if let Some(after) = trimmed.strip_prefix("```")
        && let Some(inner) = after.strip_suffix("```")
    {
        // Drop an info string such as ```text
        let inner = match inner.split_once('\n') {
            Some((info, rest)) if !info.trim().contains(' ') => rest,
            _ => inner,
        };
        return inner.trim();
    }

    trimmed
}

// --- API types ---

#[derive(Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: &'a [Message],
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ApiResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}

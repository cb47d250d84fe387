//! Anthropic Messages API backend. Refactor only.

use super::http::{build_client, send_with_retry, truncate_str};
use super::{BackendKind, Transformer};
use crate::error::{RefactorError, Result};
use crate::policy::Policy;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

pub const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com/v1/messages";
const API_VERSION: &str = "2023-06-01";
const MODEL: &str = "claude-3-haiku-20240307";
const MAX_TOKENS: u32 = 1500;

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: String,
}

pub struct ClaudeTransformer {
    client: reqwest::Client,
    api_key: String,
    endpoint: Url,
}

impl std::fmt::Debug for ClaudeTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeTransformer")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl ClaudeTransformer {
    /// Build a handle. Fails before any network call when the key is missing
    /// or the endpoint override is not a URL.
    pub fn new(api_key: Option<String>, endpoint: Option<&str>) -> Result<Self> {
        let api_key = api_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                RefactorError::Configuration(
                    "Anthropic API key not configured. Run 'refract set-credential claude' or set ANTHROPIC_API_KEY."
                        .to_string(),
                )
            })?;

        let endpoint = Url::parse(endpoint.unwrap_or(DEFAULT_ENDPOINT)).map_err(|e| {
            RefactorError::Configuration(format!("Invalid Anthropic endpoint: {}", e))
        })?;

        Ok(Self {
            client: build_client(BackendKind::Claude)?,
            api_key,
            endpoint,
        })
    }
}

#[async_trait]
impl Transformer for ClaudeTransformer {
    fn kind(&self) -> BackendKind {
        BackendKind::Claude
    }

    async fn transform(&self, policy: &Policy) -> Result<String> {
        let request = MessagesRequest {
            model: MODEL,
            max_tokens: MAX_TOKENS,
            system: policy.system(),
            messages: vec![Message {
                role: "user",
                content: policy.task(),
            }],
        };

        debug!(intent = %policy.intent(), model = MODEL, "sending refactor request");
        let body = send_with_retry(BackendKind::Claude, || {
            self.client
                .post(self.endpoint.clone())
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", API_VERSION)
                .json(&request)
        })
        .await?;

        parse_messages_response(&body).map_err(|e| RefactorError::backend(BackendKind::Claude, e))
    }
}

/// Text of the first text block in a Messages API response.
fn parse_messages_response(body: &str) -> std::result::Result<String, String> {
    let parsed: MessagesResponse = serde_json::from_str(body).map_err(|e| {
        format!(
            "Failed to parse response: {} ({})",
            e,
            truncate_str(body, 200)
        )
    })?;
    parsed
        .content
        .into_iter()
        .find(|block| block.block_type == "text")
        .map(|block| block.text)
        .ok_or_else(|| "Unexpected response format from AI service".to_string())
}

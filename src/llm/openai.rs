//! OpenAI-compatible HTTP clients for the reasoning and embedding services.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{AssistantMessage, ChatModel, ChatRequest, EmbeddingModel, LlmError, ToolSpec};
use crate::config::FinbotConfig;
use crate::turn::{ConversationTurn, ToolCallRequest};

/// Chat-completions client for any OpenAI-compatible endpoint.
#[derive(Clone, Debug)]
pub struct OpenAiChatModel {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct WireChatRequest<'a> {
    model: &'a str,
    messages: &'a [ConversationTurn],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<&'a ToolSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'static str>,
}

#[derive(Deserialize)]
struct WireChatResponse {
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallRequest>,
}

impl OpenAiChatModel {
    /// Builds a client from service configuration.
    pub fn new(config: &FinbotConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.chat_model.clone(),
        })
    }

    /// Overrides the request deadline (mainly for tests against mock servers).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        if let Ok(client) = Client::builder().timeout(timeout).build() {
            self.client = client;
        }
        self
    }
}

#[async_trait]
impl ChatModel for OpenAiChatModel {
    #[instrument(skip_all, fields(model = %self.model, tools = request.tools.len()))]
    async fn chat(&self, request: ChatRequest) -> Result<AssistantMessage, LlmError> {
        let body = WireChatRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: request.temperature,
            tools: request.tools.iter().collect(),
            tool_choice: if request.tools.is_empty() {
                None
            } else {
                Some("auto")
            },
        };

        let response: WireChatResponse = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let message = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| LlmError::MalformedResponse("empty choices array".to_string()))?;

        debug!(
            has_content = message.content.is_some(),
            tool_calls = message.tool_calls.len(),
            "chat completion received"
        );

        Ok(AssistantMessage {
            content: message.content.filter(|c| !c.is_empty()),
            tool_calls: message.tool_calls,
        })
    }
}

/// Embeddings client for any OpenAI-compatible endpoint.
///
/// The output dimensionality is validated on every call; a mismatch means
/// the corpus and the configured model have diverged, which callers treat
/// as fatal.
#[derive(Clone, Debug)]
pub struct OpenAiEmbeddingModel {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    dimensions: usize,
}

#[derive(Serialize)]
struct WireEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Deserialize)]
struct WireEmbeddingResponse {
    data: Vec<WireEmbedding>,
}

#[derive(Deserialize)]
struct WireEmbedding {
    embedding: Vec<f32>,
}

impl OpenAiEmbeddingModel {
    pub fn new(config: &FinbotConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.embedding_model.clone(),
            dimensions: config.embedding_dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingModel for OpenAiEmbeddingModel {
    #[instrument(skip_all, fields(model = %self.model, chars = text.len()))]
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let body = WireEmbeddingRequest {
            model: &self.model,
            input: text,
        };

        let response: WireEmbeddingResponse = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let vector = response
            .data
            .into_iter()
            .next()
            .map(|entry| entry.embedding)
            .ok_or_else(|| LlmError::MalformedResponse("empty embedding data".to_string()))?;

        if vector.len() != self.dimensions {
            return Err(LlmError::DimensionMismatch {
                expected: self.dimensions,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

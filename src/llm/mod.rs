//! Reasoning and embedding capability seams.
//!
//! Both services are consumed through narrow async traits so the
//! orchestrator and the ingestion pipeline can run against test doubles.
//! The wire model mirrors the OpenAI-compatible chat-completions format:
//! a request carries an ordered message list plus optional tool
//! declarations; the response is a single assistant message that either
//! ends the turn with text or requests capability invocations.

pub mod openai;

use async_trait::async_trait;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::turn::{ConversationTurn, ToolCallRequest};

pub use openai::{OpenAiChatModel, OpenAiEmbeddingModel};

/// Declaration of one invocable capability, advertised verbatim to the
/// reasoning service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSpec {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionSpec,
}

/// Name, description, and JSON parameter schema of a capability.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSpec {
    /// Declares a function-style capability with a JSON schema for its parameters.
    #[must_use]
    pub fn function(name: &str, description: &str, parameters: Value) -> Self {
        Self {
            kind: "function".to_string(),
            function: FunctionSpec {
                name: name.to_string(),
                description: description.to_string(),
                parameters,
            },
        }
    }
}

/// One reasoning-service request: ordered messages, optional tools, sampling.
#[derive(Clone, Debug)]
pub struct ChatRequest {
    pub messages: Vec<ConversationTurn>,
    pub tools: Vec<ToolSpec>,
    pub temperature: Option<f32>,
}

impl ChatRequest {
    /// Request without tool declarations (summarization, QA).
    #[must_use]
    pub fn plain(messages: Vec<ConversationTurn>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            temperature: None,
        }
    }

    /// Request with tool declarations and explicit sampling temperature.
    /// `tool_choice` is left to the model.
    #[must_use]
    pub fn with_tools(messages: Vec<ConversationTurn>, tools: Vec<ToolSpec>, temperature: f32) -> Self {
        Self {
            messages,
            tools,
            temperature: Some(temperature),
        }
    }
}

/// The reasoning service's reply: terminal text, tool calls, or both.
#[derive(Clone, Debug, Default)]
pub struct AssistantMessage {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl AssistantMessage {
    /// Converts the reply into a history turn, preserving the tool-call list.
    #[must_use]
    pub fn into_turn(self) -> ConversationTurn {
        if self.tool_calls.is_empty() {
            let mut turn = ConversationTurn::assistant(self.content.unwrap_or_default());
            turn.content = turn.content.filter(|c| !c.is_empty());
            turn
        } else {
            ConversationTurn::assistant_tool_calls(self.content, self.tool_calls)
        }
    }
}

/// Errors from the reasoning or embedding service.
///
/// These are infrastructure-fatal for the current turn: the orchestrator
/// surfaces them to its caller instead of feeding them back to the model.
#[derive(Debug, Error, Diagnostic)]
pub enum LlmError {
    #[error("reasoning service request failed: {0}")]
    #[diagnostic(
        code(finbot::llm::request),
        help("Check connectivity, the API base URL, and the configured key.")
    )]
    Request(#[from] reqwest::Error),

    #[error("reasoning service returned an unusable response: {0}")]
    #[diagnostic(code(finbot::llm::malformed_response))]
    MalformedResponse(String),

    #[error("embedding dimensionality mismatch: expected {expected}, got {actual}")]
    #[diagnostic(
        code(finbot::llm::dimension_mismatch),
        help("The embedding model must match the corpus-wide dimensionality constant.")
    )]
    DimensionMismatch { expected: usize, actual: usize },
}

/// The reasoning capability: messages + tool schema in, one message out.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, request: ChatRequest) -> Result<AssistantMessage, LlmError>;
}

/// The embedding capability: text in, fixed-dimension vector out.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;

    /// Corpus-wide output dimensionality; constant for a given model.
    fn dimensions(&self) -> usize;
}

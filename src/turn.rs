//! Conversation turns: the append-only units of chat history.
//!
//! A [`ConversationTurn`] is both the persisted history record and the wire
//! shape sent to the reasoning service, so a reloaded conversation replays
//! byte-for-byte. Assistant turns may carry a list of [`ToolCallRequest`]s;
//! each of those is answered by exactly one later `tool` turn whose
//! `tool_call_id` matches.
//!
//! # Examples
//!
//! ```
//! use finbot::turn::ConversationTurn;
//!
//! let user = ConversationTurn::user("List GRs from the Pension branch");
//! assert!(user.has_role(ConversationTurn::USER));
//!
//! let reply = ConversationTurn::assistant("Here are the matching records.");
//! assert!(reply.is_terminal());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single named capability invocation requested by the reasoning service.
///
/// Arguments arrive as an unparsed JSON string, exactly as the service
/// emitted them; parsing (and parse failure reporting) is the dispatcher's
/// job so a malformed payload can be reflected back to the model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Correlation id; the matching tool-result turn must echo it.
    pub id: String,
    /// Invocation kind; always `"function"` on the current wire format.
    #[serde(rename = "type", default = "function_kind")]
    pub kind: String,
    pub function: FunctionCall,
}

fn function_kind() -> String {
    "function".to_string()
}

/// Name + raw argument payload of a requested capability invocation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON object, serialized; may be malformed and must be parsed defensively.
    pub arguments: String,
}

/// One entry in a conversation's append-only history.
///
/// Turns are never mutated after append. A `tool` turn always references a
/// `tool_call_id` emitted by the immediately preceding assistant turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Role of the sender; use the constants on [`ConversationTurn`].
    pub role: String,
    /// Textual content. `None` for assistant turns that only carry tool calls.
    pub content: Option<String>,
    /// For `tool` turns: the call id this result answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// For assistant turns: capability invocations requested by the model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallRequest>>,
    /// Append timestamp; not part of the reasoning-service wire shape.
    #[serde(default = "Utc::now", skip_serializing)]
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    /// System prompt role.
    pub const SYSTEM: &'static str = "system";
    /// End-user input role.
    pub const USER: &'static str = "user";
    /// Reasoning-service output role.
    pub const ASSISTANT: &'static str = "assistant";
    /// Capability result role.
    pub const TOOL: &'static str = "tool";

    /// Creates a turn with the given role and textual content.
    #[must_use]
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.into()),
            tool_call_id: None,
            tool_calls: None,
            created_at: Utc::now(),
        }
    }

    /// Creates a user turn.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Self::USER, content)
    }

    /// Creates a system turn.
    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Self::SYSTEM, content)
    }

    /// Creates a plain-text assistant turn.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Self::ASSISTANT, content)
    }

    /// Creates an assistant turn that requests capability invocations.
    #[must_use]
    pub fn assistant_tool_calls(content: Option<String>, calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: Self::ASSISTANT.to_string(),
            content,
            tool_call_id: None,
            tool_calls: Some(calls),
            created_at: Utc::now(),
        }
    }

    /// Creates a tool-result turn answering `call_id` with a serialized payload.
    #[must_use]
    pub fn tool_result(call_id: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            role: Self::TOOL.to_string(),
            content: Some(payload.into()),
            tool_call_id: Some(call_id.into()),
            tool_calls: None,
            created_at: Utc::now(),
        }
    }

    /// Returns `true` if this turn has the given role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }

    /// A terminal turn ends the orchestrator loop: an assistant turn that
    /// carries direct textual content. This is the loop's only exit
    /// condition; direct content wins even if tool calls are also present.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.role == Self::ASSISTANT
            && self
                .content
                .as_deref()
                .is_some_and(|text| !text.is_empty())
    }

    /// Capability invocations carried by this turn, if any.
    #[must_use]
    pub fn invocations(&self) -> &[ToolCallRequest] {
        self.tool_calls.as_deref().unwrap_or(&[])
    }
}

/// Key identifying one conversation's history.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    pub user_id: String,
    pub session_id: String,
}

impl ConversationKey {
    #[must_use]
    pub fn new(user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.user_id, self.session_id)
    }
}

//! The agent orchestrator: the control loop between the reasoning service
//! and the capability registry.
//!
//! One call to [`Orchestrator::run`] processes one user turn as a bounded
//! state machine:
//!
//! ```text
//! append user turn
//!        │
//!        ▼
//! AWAIT_MODEL ──(terminal text)──► DONE (return answer)
//!        │ ▲
//!        │ └──────────────┐
//!   (tool calls)          │
//!        ▼                │
//! DISPATCH_TOOLS ─(tool-result turns appended)
//! ```
//!
//! Every turn is durably appended before the loop acts on it, so a crash at
//! any point leaves a replayable prefix and the loop can re-enter at
//! `AWAIT_MODEL` with whatever history exists. Capability failures are
//! folded back into the conversation as error payloads; only history and
//! reasoning-service failures abort the turn.

pub mod registry;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use miette::Diagnostic;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::docstore::{DocumentStore, StoreError};
use crate::history::{HistoryError, HistoryStore};
use crate::llm::{ChatModel, ChatRequest, LlmError};
use crate::progress::ProgressEmitter;
use crate::turn::{ConversationKey, ConversationTurn};

pub use registry::{CapabilityError, CapabilityHandler, CapabilityRegistry};

/// Turn-fatal orchestrator errors.
///
/// Capability-level failures never appear here; they are reported to the
/// model as tool-result payloads instead.
#[derive(Debug, Error, Diagnostic)]
pub enum AgentError {
    #[error(transparent)]
    #[diagnostic(code(finbot::agent::history))]
    History(#[from] HistoryError),

    #[error(transparent)]
    #[diagnostic(code(finbot::agent::reasoning))]
    Reasoning(#[from] LlmError),

    #[error(transparent)]
    #[diagnostic(code(finbot::agent::store))]
    Store(#[from] StoreError),

    /// The loop ran `rounds` times without producing terminal text.
    #[error("agent loop exceeded its budget of {rounds} rounds")]
    #[diagnostic(
        code(finbot::agent::loop_budget),
        help("The model kept requesting tools without answering; the persisted history prefix is intact for retry.")
    )]
    LoopBudgetExceeded { rounds: usize },
}

/// Orchestrator configuration knobs.
#[derive(Clone, Copy, Debug)]
pub struct OrchestratorOptions {
    /// Sampling temperature for tool selection.
    pub temperature: f32,
    /// Maximum AWAIT_MODEL rounds per user turn.
    pub max_rounds: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            temperature: 0.1,
            max_rounds: 10,
        }
    }
}

/// The per-conversation control loop.
///
/// Conversations are serialized by key — two concurrent `run` calls for the
/// same `(user, session)` queue behind one lock, because history mutation
/// is not transactional across turns. Distinct conversations run fully in
/// parallel.
pub struct Orchestrator {
    chat: Arc<dyn ChatModel>,
    history: Arc<dyn HistoryStore>,
    store: Arc<dyn DocumentStore>,
    registry: CapabilityRegistry,
    progress: ProgressEmitter,
    options: OrchestratorOptions,
    conversation_locks: Mutex<HashMap<ConversationKey, Arc<Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(
        chat: Arc<dyn ChatModel>,
        history: Arc<dyn HistoryStore>,
        store: Arc<dyn DocumentStore>,
        registry: CapabilityRegistry,
        progress: ProgressEmitter,
        options: OrchestratorOptions,
    ) -> Self {
        Self {
            chat,
            history,
            store,
            registry,
            progress,
            options,
            conversation_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Runs one user turn to completion and returns the final answer text.
    #[instrument(skip(self, user_message), fields(conversation = %key), err)]
    pub async fn run(
        &self,
        key: &ConversationKey,
        user_message: &str,
    ) -> Result<String, AgentError> {
        let lock = self.conversation_lock(key).await;
        let _guard = lock.lock().await;

        self.history
            .append(key, ConversationTurn::user(user_message))
            .await?;

        for round in 1..=self.options.max_rounds {
            debug!(round, "entering AWAIT_MODEL");
            let messages = self.outgoing_messages(key).await?;
            let reply = self
                .chat
                .chat(ChatRequest::with_tools(
                    messages,
                    self.registry.tool_specs(),
                    self.options.temperature,
                ))
                .await?;

            // Persist the assistant turn verbatim before acting on it, so
            // the history stays a faithful record even if dispatch fails.
            let assistant_turn = reply.into_turn();
            self.history.append(key, assistant_turn.clone()).await?;

            if assistant_turn.is_terminal() {
                info!(round, "turn complete");
                return Ok(assistant_turn.content.unwrap_or_default());
            }

            let invocations = assistant_turn.invocations().to_vec();
            if invocations.is_empty() {
                return Err(AgentError::Reasoning(LlmError::MalformedResponse(
                    "assistant message carried neither content nor tool calls".to_string(),
                )));
            }

            debug!(count = invocations.len(), "entering DISPATCH_TOOLS");
            self.progress.emit("Detecting the arguments...");
            // Invocations within one round are independent by construction:
            // execute concurrently, reassemble in invocation order.
            let payloads = join_all(
                invocations
                    .iter()
                    .map(|invocation| self.registry.dispatch(invocation)),
            )
            .await;

            for (invocation, payload) in invocations.iter().zip(payloads) {
                self.history
                    .append(
                        key,
                        ConversationTurn::tool_result(invocation.id.clone(), payload.to_string()),
                    )
                    .await?;
            }
        }

        Err(AgentError::LoopBudgetExceeded {
            rounds: self.options.max_rounds,
        })
    }

    /// Builds `[system] + full history` for the next reasoning call. The
    /// system prompt is rebuilt every round with fresh context and is never
    /// persisted as a history entry.
    async fn outgoing_messages(
        &self,
        key: &ConversationKey,
    ) -> Result<Vec<ConversationTurn>, AgentError> {
        let total_records = self.store.count_documents().await?;
        let now = Utc::now();
        let system_prompt = format!(
            "You are an AI assistant for querying and summarizing financial department documents. \
             When you receive data from a tool call (presented as a 'tool' message in the conversation), \
             use that information to provide a complete answer. If the tool returns a list of documents, \
             list them in your answer. If the query is ambiguous, ask clarifying questions.\n\
             <context>\n\
             Total records in the database: {total_records}\n\
             Current time: {}\n\
             </context>",
            now.format("%H:%M:%S %m-%d-%Y")
        );

        let mut messages = Vec::with_capacity(1);
        messages.push(ConversationTurn::system(system_prompt));
        messages.extend(self.history.load(key).await?);
        Ok(messages)
    }

    async fn conversation_lock(&self, key: &ConversationKey) -> Arc<Mutex<()>> {
        let mut locks = self.conversation_locks.lock().await;
        locks.entry(key.clone()).or_default().clone()
    }
}

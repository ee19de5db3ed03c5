//! # Finbot: agentic retrieval over scanned government documents
//!
//! Finbot answers natural-language questions about a corpus of scanned
//! Finance Department government resolutions (image-only PDFs), grounding
//! every answer in that corpus. The crate is organised around one control
//! loop and the capabilities it dispatches to:
//!
//! - [`agent`] — the orchestrator state machine and the capability
//!   registry it consults
//! - [`query`] — the constrained structured-query translator (the
//!   deliberate replacement for generate-and-execute query code)
//! - [`ingest`] — the OCR ingestion pipeline, chunker, and the
//!   summarization / document-QA variants
//! - [`docstore`] — document catalogue + chunk-vector datastore seam
//! - [`history`] — durable append-only chat history
//! - [`llm`] — reasoning and embedding capability clients
//! - [`turn`] — conversation turn and tool-call types
//! - [`progress`] — user-visible processing-log labels
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use finbot::agent::{CapabilityRegistry, Orchestrator, OrchestratorOptions};
//! use finbot::history::InMemoryHistoryStore;
//! use finbot::progress::ProgressEmitter;
//! use finbot::turn::ConversationKey;
//!
//! # async fn example(
//! #     chat: Arc<dyn finbot::llm::ChatModel>,
//! #     store: Arc<dyn finbot::docstore::DocumentStore>,
//! #     registry: CapabilityRegistry,
//! # ) -> Result<(), finbot::agent::AgentError> {
//! let orchestrator = Orchestrator::new(
//!     chat,
//!     Arc::new(InMemoryHistoryStore::new()),
//!     store,
//!     registry,
//!     ProgressEmitter::disabled(),
//!     OrchestratorOptions::default(),
//! );
//! let key = ConversationKey::new("user_13", "session_456");
//! let answer = orchestrator.run(&key, "List GRs about pensions from 2022").await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Design posture
//!
//! The reasoning service proposes *intent*, never code: tool arguments are
//! schema-constrained mappings, and [`query::translate`] turns them into a
//! [`query::StructuredFilter`] that cannot express a write. Each component
//! takes its collaborators explicitly at construction, so every external
//! capability (reasoning, embedding, OCR, rasterization, datastore) can be
//! replaced with a test double.

pub mod agent;
pub mod config;
pub mod docstore;
pub mod history;
pub mod ingest;
pub mod llm;
pub mod progress;
pub mod query;
pub mod telemetry;
pub mod turn;

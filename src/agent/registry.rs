//! Capability registry: the declarative mapping from capability name to
//! parameter schema and dispatch handler.
//!
//! The parameter schemas below are advertised to the reasoning service
//! verbatim — they are the sole contract the model sees, so they stay in
//! lockstep with the translator's fixed predicate table and the handlers'
//! argument parsing.

use std::sync::Arc;

use async_trait::async_trait;
use miette::Diagnostic;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tracing::instrument;

use crate::config::SearchConfig;
use crate::docstore::{DocumentStore, StoreError};
use crate::ingest::{IngestError, IngestionPipeline};
use crate::llm::{EmbeddingModel, LlmError, ToolSpec};
use crate::progress::ProgressEmitter;
use crate::query::{TranslateError, translate};
use crate::turn::ToolCallRequest;

/// Errors inside a single capability dispatch.
///
/// Never propagated out of the orchestrator loop: each becomes a structured
/// `{"error": ...}` tool-result payload for the model to self-correct on.
#[derive(Debug, Error, Diagnostic)]
pub enum CapabilityError {
    #[error("missing required argument: {0}")]
    #[diagnostic(code(finbot::capability::missing_argument))]
    MissingArgument(&'static str),

    #[error(transparent)]
    #[diagnostic(code(finbot::capability::translate))]
    Translate(#[from] TranslateError),

    #[error(transparent)]
    #[diagnostic(code(finbot::capability::store))]
    Store(#[from] StoreError),

    #[error(transparent)]
    #[diagnostic(code(finbot::capability::ingest))]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    #[diagnostic(code(finbot::capability::llm))]
    Llm(#[from] LlmError),
}

/// One invocable capability's executable side.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, CapabilityError>;
}

struct Capability {
    spec: ToolSpec,
    handler: Arc<dyn CapabilityHandler>,
}

/// Name → (schema, handler) registry consulted by the orchestrator.
pub struct CapabilityRegistry {
    capabilities: Vec<Capability>,
}

impl CapabilityRegistry {
    /// Empty registry; used directly only in tests.
    #[must_use]
    pub fn new() -> Self {
        Self {
            capabilities: Vec::new(),
        }
    }

    /// Adds a capability declaration with its handler.
    #[must_use]
    pub fn register(mut self, spec: ToolSpec, handler: Arc<dyn CapabilityHandler>) -> Self {
        self.capabilities.push(Capability { spec, handler });
        self
    }

    /// The standard four-capability registry.
    #[must_use]
    pub fn standard(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn EmbeddingModel>,
        pipeline: Arc<IngestionPipeline>,
        search: SearchConfig,
        progress: ProgressEmitter,
    ) -> Self {
        Self::new()
            .register(
                lookup_spec(),
                Arc::new(LookupHandler {
                    store: store.clone(),
                    progress: progress.clone(),
                }),
            )
            .register(
                semantic_search_spec(),
                Arc::new(SemanticSearchHandler {
                    store,
                    embedder,
                    search,
                    progress,
                }),
            )
            .register(
                summarize_spec(),
                Arc::new(SummarizeHandler {
                    pipeline: pipeline.clone(),
                }),
            )
            .register(query_document_spec(), Arc::new(QueryDocumentHandler { pipeline }))
    }

    /// Tool declarations advertised to the reasoning service.
    #[must_use]
    pub fn tool_specs(&self) -> Vec<ToolSpec> {
        self.capabilities
            .iter()
            .map(|capability| capability.spec.clone())
            .collect()
    }

    /// Executes one invocation, converting every failure into a structured
    /// error payload. Always yields a JSON value to append as the
    /// tool-result turn.
    #[instrument(skip(self, invocation), fields(name = %invocation.function.name, call_id = %invocation.id))]
    pub async fn dispatch(&self, invocation: &ToolCallRequest) -> Value {
        let Ok(parsed) = serde_json::from_str::<Value>(&invocation.function.arguments) else {
            return json!({"error": "Invalid arguments format"});
        };
        let Value::Object(arguments) = parsed else {
            return json!({"error": "Invalid arguments format"});
        };

        let Some(capability) = self
            .capabilities
            .iter()
            .find(|capability| capability.spec.function.name == invocation.function.name)
        else {
            return json!({"error": "Unknown tool"});
        };

        match capability.handler.call(arguments).await {
            Ok(result) => result,
            Err(error) => json!({"error": error.to_string()}),
        }
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn required_str(
    arguments: &Map<String, Value>,
    field: &'static str,
) -> Result<String, CapabilityError> {
    arguments
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(CapabilityError::MissingArgument(field))
}

/// Structured catalogue lookup: translator + filtered datastore read.
struct LookupHandler {
    store: Arc<dyn DocumentStore>,
    progress: ProgressEmitter,
}

#[async_trait]
impl CapabilityHandler for LookupHandler {
    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, CapabilityError> {
        self.progress.emit("Generating the query...");
        let filter = translate(&arguments)?;
        self.progress.emit("Fetching data...");
        let results = self.store.find_documents(&filter).await?;
        self.progress
            .emit(format!("Query successful, retrieved {} records.", results.len()));
        Ok(json!({ "results": results }))
    }
}

/// Semantic search: embed the query text, nearest-neighbor over chunks.
struct SemanticSearchHandler {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn EmbeddingModel>,
    search: SearchConfig,
    progress: ProgressEmitter,
}

#[async_trait]
impl CapabilityHandler for SemanticSearchHandler {
    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, CapabilityError> {
        let content = required_str(&arguments, "content")?;
        self.progress.emit("Generating the embeddings...");
        let embedding = self.embedder.embed(&content).await?;
        self.progress.emit("Searching for similar documents...");
        let results = self
            .store
            .search_chunks(&embedding, self.search.match_threshold, self.search.match_count)
            .await?;
        Ok(json!({ "results": results }))
    }
}

/// Whole-document summarization over the ingestion front end.
struct SummarizeHandler {
    pipeline: Arc<IngestionPipeline>,
}

#[async_trait]
impl CapabilityHandler for SummarizeHandler {
    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, CapabilityError> {
        let pdf_url = required_str(&arguments, "pdf_url")?;
        let summary = self.pipeline.summarize_document(&pdf_url).await?;
        Ok(json!({ "summary": summary }))
    }
}

/// Question answering against one document's full extracted text.
struct QueryDocumentHandler {
    pipeline: Arc<IngestionPipeline>,
}

#[async_trait]
impl CapabilityHandler for QueryDocumentHandler {
    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, CapabilityError> {
        let pdf_url = required_str(&arguments, "pdf_url")?;
        let query = required_str(&arguments, "query")?;
        let answer = self.pipeline.answer_from_document(&pdf_url, &query).await?;
        Ok(json!({ "answer": answer }))
    }
}

const BRANCHES: [&str; 21] = [
    "A-(Public Sector Undertaking)",
    "CH-(Service Matter)",
    "K-(Budget)",
    "M-(Pay of Government Employee)",
    "PayCell-(Pay Commission)",
    "N-(Banking)",
    "P-(Pension)",
    "T-(Local Establishment)",
    "TH-(Value Added Tax)",
    "TH-3-(Commercial Tax Establishment)",
    "Z-(Treasury)",
    "Z-1-(Economy)",
    "G-(Audit Para)",
    "GH-(Accounts Cadre Establishment)",
    "FR-(Financial Resources)",
    "DMO-(Debt Management)",
    "GO Cell-(Government Companies)",
    "B-RTI Cell-(Small Savings RTI)",
    "KH",
    "PMU-Cell",
    "GST Cell",
];

fn lookup_spec() -> ToolSpec {
    ToolSpec::function(
        "get_pdf_related_data",
        "Query database for PDFs using various criteria. Maintain the original language as input.",
        json!({
            "type": "object",
            "properties": {
                "gr_no": {
                    "type": "string",
                    "description": "GR number e.g. STS-1096-535-Adt.07-03-1996, FD/OTH/e-file/4/2024/Extended Budget, જનવ-૧૦૨૦૧૪-૪૭૩૯૦૨-(૨)-અ"
                },
                "date": {
                    "type": "string",
                    "description": "Date as YYYY, YYYY-MM or YYYY-MM-DD. For a range, use 'from_date' and 'to_date' instead."
                },
                "from_date": {
                    "type": "string",
                    "description": "Start date e.g. 2023-01-01"
                },
                "to_date": {
                    "type": "string",
                    "description": "End date e.g. 2023-12-31"
                },
                "branch": {
                    "type": "string",
                    "enum": BRANCHES,
                    "description": "Branch name"
                },
                "subject_en": {
                    "type": "string",
                    "description": "Document subject in English e.g. 'Payment of bonus for the year 2016-17 to Class-4 employees of the Government of Gujarat'. If the subject is in Gujarati, use 'subject_gu' instead."
                },
                "subject_gu": {
                    "type": "string",
                    "description": "Document subject in Gujarati. If the subject is in English, use 'subject_en' instead."
                }
            }
        }),
    )
}

fn semantic_search_spec() -> ToolSpec {
    ToolSpec::function(
        "get_pdf_by_content",
        "Given the content, retrieve the pdf from the vector store using similarity search",
        json!({
            "type": "object",
            "properties": {
                "content": {
                    "type": "string",
                    "description": "Get the content from the user query that they want to search in the pdf"
                }
            },
            "required": ["content"]
        }),
    )
}

fn summarize_spec() -> ToolSpec {
    ToolSpec::function(
        "summarize_pdf",
        "Summarize PDF content from URL",
        json!({
            "type": "object",
            "properties": {
                "pdf_url": {"type": "string", "description": "PDF URL"}
            },
            "required": ["pdf_url"]
        }),
    )
}

fn query_document_spec() -> ToolSpec {
    ToolSpec::function(
        "query_pdf",
        "Process the pdf and answer the user query based on the content of the pdf",
        json!({
            "type": "object",
            "properties": {
                "pdf_url": {"type": "string", "description": "PDF URL"},
                "query": {"type": "string", "description": "User query"}
            },
            "required": ["pdf_url", "query"]
        }),
    )
}

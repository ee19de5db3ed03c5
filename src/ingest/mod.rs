//! Document ingestion: fetch → rasterize → OCR → chunk → embed → persist.
//!
//! Each stage is checkpointable and a failure at any stage aborts the
//! whole document — no chunk row is written until every earlier stage has
//! succeeded, so retries are clean. The same fetch/rasterize/OCR front end
//! also powers the token-bounded whole-document summarizer and the
//! document question-answering capability.

pub mod chunker;
pub mod pdf;

use std::sync::Arc;

use futures_util::future::join_all;
use miette::Diagnostic;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tiktoken_rs::CoreBPE;
use tracing::{debug, instrument, warn};

use crate::config::{ChunkingConfig, SummarizeConfig};
use crate::docstore::{DocumentStore, NewChunk, StoreError};
use crate::llm::{ChatModel, ChatRequest, EmbeddingModel, LlmError};
use crate::progress::ProgressEmitter;
use crate::turn::ConversationTurn;

pub use chunker::TextSplitter;
pub use pdf::{OcrEngine, PageRasterizer, PdftoppmRasterizer, TesseractOcr};

/// Fixed dual-script OCR mode: Latin plus Gujarati.
pub const OCR_SCRIPTS: [&str; 2] = ["eng", "guj"];

const PAGE_SEPARATOR: &str = "\n";
const SUMMARY_PROMPT: &str = "Summarize the given content with all the important details.";
const COMBINE_PROMPT: &str =
    "Given the summaries separated by three newlines, generate a final summary.";

/// Ingestion failures. Every variant aborts the document without partial rows.
#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error("failed to fetch PDF: {0}")]
    #[diagnostic(
        code(finbot::ingest::fetch),
        help("Check the URL and that the source host is reachable.")
    )]
    Fetch(#[from] reqwest::Error),

    #[error("rasterization failed: {0}")]
    #[diagnostic(code(finbot::ingest::rasterize))]
    Rasterize(String),

    #[error("OCR failed: {0}")]
    #[diagnostic(code(finbot::ingest::ocr))]
    Ocr(String),

    /// Every page came back empty; there is nothing to index or summarize.
    #[error("no extractable text in document")]
    #[diagnostic(code(finbot::ingest::no_text))]
    NoExtractableText,

    #[error("no catalogued document for pdf_url: {0}")]
    #[diagnostic(
        code(finbot::ingest::unknown_document),
        help("Catalogue the document record before ingesting its chunks.")
    )]
    UnknownDocument(String),

    /// The document already has chunk rows; ingestion is idempotent per URL.
    #[error("document already ingested: {0}")]
    #[diagnostic(code(finbot::ingest::duplicate))]
    AlreadyIngested(String),

    #[error("scratch directory error: {0}")]
    #[diagnostic(code(finbot::ingest::scratch))]
    Scratch(String),

    #[error(transparent)]
    #[diagnostic(code(finbot::ingest::embedding))]
    Embedding(LlmError),

    #[error(transparent)]
    #[diagnostic(code(finbot::ingest::store))]
    Store(#[from] StoreError),

    #[error("summarization failed: {0}")]
    #[diagnostic(code(finbot::ingest::summarize))]
    Summarize(String),
}

/// Result of a successful ingestion run.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IngestReport {
    pub doc_id: i64,
    pub chunk_count: usize,
}

/// The ingestion pipeline and its document-reading variants.
///
/// All collaborators are injected at construction; nothing here touches
/// global state.
pub struct IngestionPipeline {
    http: Client,
    rasterizer: Arc<dyn PageRasterizer>,
    ocr: Arc<dyn OcrEngine>,
    embedder: Arc<dyn EmbeddingModel>,
    chat: Arc<dyn ChatModel>,
    store: Arc<dyn DocumentStore>,
    splitter: TextSplitter,
    summarize: SummarizeConfig,
    tokenizer: CoreBPE,
    progress: ProgressEmitter,
}

impl IngestionPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        http: Client,
        rasterizer: Arc<dyn PageRasterizer>,
        ocr: Arc<dyn OcrEngine>,
        embedder: Arc<dyn EmbeddingModel>,
        chat: Arc<dyn ChatModel>,
        store: Arc<dyn DocumentStore>,
        chunking: ChunkingConfig,
        summarize: SummarizeConfig,
        progress: ProgressEmitter,
    ) -> Result<Self, IngestError> {
        let tokenizer = tiktoken_rs::o200k_base()
            .map_err(|e| IngestError::Summarize(format!("tokenizer init: {e}")))?;
        Ok(Self {
            http,
            rasterizer,
            ocr,
            embedder,
            chat,
            store,
            splitter: TextSplitter::new(chunking),
            summarize,
            tokenizer,
            progress,
        })
    }

    /// Ingests one catalogued document into chunk rows.
    ///
    /// All-or-nothing: chunks are embedded before anything is written, and
    /// the batch insert is transactional. Re-running for an already-ingested
    /// URL fails with [`IngestError::AlreadyIngested`].
    #[instrument(skip(self), fields(pdf_url), err)]
    pub async fn ingest(&self, pdf_url: &str) -> Result<IngestReport, IngestError> {
        let document = self
            .store
            .document_by_pdf_url(pdf_url)
            .await?
            .ok_or_else(|| IngestError::UnknownDocument(pdf_url.to_string()))?;
        if self.store.has_chunks(document.id).await? {
            return Err(IngestError::AlreadyIngested(pdf_url.to_string()));
        }

        let pages = self.capture_pages(pdf_url).await?;
        let text = self.pages_to_text(&pages);
        if text.trim().is_empty() {
            return Err(IngestError::NoExtractableText);
        }

        self.progress.emit("Splitting text...");
        let bodies = self.splitter.split(&text);
        if bodies.is_empty() {
            return Err(IngestError::NoExtractableText);
        }
        debug!(chunks = bodies.len(), "document chunked");

        self.progress.emit("Generating the embeddings...");
        let embeddings = join_all(bodies.iter().map(|body| self.embedder.embed(body))).await;

        let mut chunks = Vec::with_capacity(bodies.len());
        for (body, embedding) in bodies.into_iter().zip(embeddings) {
            let embedding = embedding.map_err(IngestError::Embedding)?;
            chunks.push(NewChunk { body, embedding });
        }

        let chunk_count = chunks.len();
        self.store.insert_chunks(document.id, chunks).await?;
        Ok(IngestReport {
            doc_id: document.id,
            chunk_count,
        })
    }

    /// Summarizes a whole document under a rolling token budget.
    ///
    /// Pages accumulate into a buffer; when the next page would exceed the
    /// budget the buffer is summarized and reset to that page. Partial
    /// summaries, if any, are combined in one final pass.
    #[instrument(skip(self), fields(pdf_url), err)]
    pub async fn summarize_document(&self, pdf_url: &str) -> Result<String, IngestError> {
        let pages = self.capture_pages(pdf_url).await?;

        let mut buffer = String::new();
        let mut partial_summaries: Vec<String> = Vec::new();

        self.progress.emit("Summarizing the text...");
        for page_text in &pages {
            if page_text.trim().is_empty() {
                continue;
            }
            let candidate_tokens =
                self.count_tokens(&format!("{buffer}{page_text}{PAGE_SEPARATOR}"));
            if candidate_tokens < self.summarize.max_buffer_tokens || buffer.is_empty() {
                buffer.push_str(page_text);
                buffer.push_str(PAGE_SEPARATOR);
            } else {
                partial_summaries.push(self.summarize_text(&buffer, SUMMARY_PROMPT).await?);
                buffer = format!("{page_text}{PAGE_SEPARATOR}");
            }
        }

        if buffer.trim().is_empty() && partial_summaries.is_empty() {
            return Err(IngestError::NoExtractableText);
        }

        if partial_summaries.is_empty() {
            return self.summarize_text(&buffer, SUMMARY_PROMPT).await;
        }
        if !buffer.trim().is_empty() {
            partial_summaries.push(self.summarize_text(&buffer, SUMMARY_PROMPT).await?);
        }
        let combined = partial_summaries.join("\n\n\n");
        self.summarize_text(&combined, COMBINE_PROMPT).await
    }

    /// Answers a question against the full extracted text of one document.
    #[instrument(skip(self, question), fields(pdf_url), err)]
    pub async fn answer_from_document(
        &self,
        pdf_url: &str,
        question: &str,
    ) -> Result<String, IngestError> {
        let pages = self.capture_pages(pdf_url).await?;
        let text = self.pages_to_text(&pages);
        if text.trim().is_empty() {
            return Err(IngestError::NoExtractableText);
        }

        self.progress.emit("Generating the answer...");
        let system = format!(
            "Given the text from the pdf, generate an answer to the user query.\nText: {text}"
        );
        let reply = self
            .chat
            .chat(ChatRequest::plain(vec![
                ConversationTurn::system(system),
                ConversationTurn::user(question),
            ]))
            .await
            .map_err(|e| IngestError::Summarize(e.to_string()))?;
        reply
            .content
            .ok_or_else(|| IngestError::Summarize("empty answer from reasoning service".into()))
    }

    /// Fetches the PDF and returns per-page OCR text, in page order.
    ///
    /// Unreadable pages yield empty strings rather than failing the run.
    async fn capture_pages(&self, pdf_url: &str) -> Result<Vec<String>, IngestError> {
        self.progress.emit("Fetching the PDF...");
        let bytes = self
            .http
            .get(pdf_url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        self.progress.emit("Fetching successful.");

        let scratch = tempfile::tempdir().map_err(|e| IngestError::Scratch(e.to_string()))?;
        let page_images = self.rasterizer.rasterize(&bytes, scratch.path()).await?;

        self.progress.emit("Extracting the text...");
        let recognitions = join_all(
            page_images
                .iter()
                .map(|page| self.ocr.recognize(page, &OCR_SCRIPTS)),
        )
        .await;

        let mut pages = Vec::with_capacity(recognitions.len());
        for (index, recognition) in recognitions.into_iter().enumerate() {
            match recognition {
                Ok(text) => pages.push(text),
                Err(IngestError::Ocr(message)) => {
                    // Best-effort per page: a failed or unreadable page
                    // degrades quality, it does not abort the document.
                    warn!(page = index + 1, %message, "page OCR failed, skipping");
                    pages.push(String::new());
                }
                Err(other) => return Err(other),
            }
        }
        Ok(pages)
    }

    fn pages_to_text(&self, pages: &[String]) -> String {
        let mut text = String::new();
        for page in pages {
            text.push_str(page);
            text.push_str(PAGE_SEPARATOR);
        }
        text
    }

    async fn summarize_text(&self, text: &str, prompt: &str) -> Result<String, IngestError> {
        let reply = self
            .chat
            .chat(ChatRequest::plain(vec![
                ConversationTurn::system(prompt),
                ConversationTurn::user(text),
            ]))
            .await
            .map_err(|e| IngestError::Summarize(e.to_string()))?;
        reply
            .content
            .ok_or_else(|| IngestError::Summarize("empty summary from reasoning service".into()))
    }

    fn count_tokens(&self, text: &str) -> usize {
        self.tokenizer.encode_with_special_tokens(text).len()
    }
}

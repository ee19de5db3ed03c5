//! Document catalogue and chunk-vector storage.
//!
//! The [`DocumentStore`] trait is the single datastore seam: structured
//! filtered reads over the catalogue, nearest-neighbor reads over chunk
//! embeddings, and batch inserts. The SQLite implementation lives in
//! [`sqlite`]; tests substitute an in-memory double.

#[cfg(feature = "sqlite")]
pub mod sqlite;

use async_trait::async_trait;
use chrono::NaiveDate;
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::query::StructuredFilter;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteDocumentStore;

/// One catalogued government resolution document.
///
/// Immutable after creation; chunk rows reference it by `id`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: i64,
    pub gr_no: String,
    pub date: NaiveDate,
    pub branch: String,
    pub subject_en: Option<String>,
    pub subject_gu: Option<String>,
    pub pdf_url: String,
}

/// Catalogue entry prior to insertion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewDocument {
    pub gr_no: String,
    pub date: NaiveDate,
    pub branch: String,
    pub subject_en: Option<String>,
    pub subject_gu: Option<String>,
    pub pdf_url: String,
}

/// A chunk body with its embedding, ready for batch insertion.
///
/// `chunk_no` is assigned by the store: 1-based, strictly increasing within
/// a document.
#[derive(Clone, Debug)]
pub struct NewChunk {
    pub body: String,
    pub embedding: Vec<f32>,
}

/// A similarity-search hit: the chunk, its document, and the score.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkMatch {
    pub doc_id: i64,
    pub chunk_no: i64,
    pub body: String,
    pub similarity: f32,
    pub gr_no: String,
    pub branch: String,
    pub pdf_url: String,
}

/// Datastore errors.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("datastore backend error: {0}")]
    #[diagnostic(
        code(finbot::docstore::backend),
        help("Check the database URL and that migrations have been applied.")
    )]
    Backend(String),

    /// A chunk's embedding does not match the corpus-wide dimensionality.
    /// Fatal for the ingestion attempt; never written partially.
    #[error("embedding dimensionality mismatch: expected {expected}, got {actual}")]
    #[diagnostic(code(finbot::docstore::dimension_mismatch))]
    DimensionMismatch { expected: usize, actual: usize },

    /// The document is already present (keyed on `pdf_url`).
    #[error("document already ingested: {pdf_url}")]
    #[diagnostic(code(finbot::docstore::duplicate))]
    Duplicate { pdf_url: String },
}

/// The datastore capability consumed by the translator, the semantic-search
/// handler, and the ingestion pipeline.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts a catalogue entry, returning its id. Fails with
    /// [`StoreError::Duplicate`] when the `pdf_url` is already catalogued.
    async fn insert_document(&self, doc: NewDocument) -> Result<i64, StoreError>;

    /// Looks up a catalogue entry by its `pdf_url`.
    async fn document_by_pdf_url(&self, pdf_url: &str)
    -> Result<Option<DocumentRecord>, StoreError>;

    /// Executes a structured read over the catalogue.
    async fn find_documents(
        &self,
        filter: &StructuredFilter,
    ) -> Result<Vec<DocumentRecord>, StoreError>;

    /// Persists a document's chunks in one atomic batch with 1-based,
    /// strictly increasing `chunk_no`. Fails without writing any row when a
    /// chunk's dimensionality is off or chunks already exist for the doc.
    async fn insert_chunks(&self, doc_id: i64, chunks: Vec<NewChunk>) -> Result<(), StoreError>;

    /// Returns `true` if any chunk rows exist for the document.
    async fn has_chunks(&self, doc_id: i64) -> Result<bool, StoreError>;

    /// Nearest-neighbor read over chunk embeddings: cosine similarity with a
    /// floor and a result cap, most similar first.
    async fn search_chunks(
        &self,
        embedding: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<ChunkMatch>, StoreError>;

    /// Total catalogued documents (used in the orchestrator's system prompt).
    async fn count_documents(&self) -> Result<u64, StoreError>;
}

/// Encodes an embedding as little-endian f32 bytes for BLOB storage.
#[must_use]
pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vector.len() * 4);
    for value in vector {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Decodes a BLOB previously produced by [`encode_embedding`].
#[must_use]
pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity between two vectors; 0.0 when either has no magnitude.
#[must_use]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

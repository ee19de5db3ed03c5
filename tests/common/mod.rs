//! Shared fixtures: capability doubles for the reasoning service, the
//! embedding service, OCR, rasterization, and the datastore.
#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;

use finbot::docstore::{
    ChunkMatch, DocumentRecord, DocumentStore, NewChunk, NewDocument, StoreError,
    cosine_similarity,
};
use finbot::ingest::{IngestError, OcrEngine, PageRasterizer};
use finbot::llm::{AssistantMessage, ChatModel, ChatRequest, EmbeddingModel, LlmError};
use finbot::query::StructuredFilter;
use finbot::turn::{FunctionCall, ToolCallRequest};

/// Scripted reasoning service: pops one reply per call and records requests.
pub struct StubChatModel {
    replies: Mutex<VecDeque<AssistantMessage>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl StubChatModel {
    pub fn new(replies: Vec<AssistantMessage>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Requests seen so far, in call order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatModel for StubChatModel {
    async fn chat(&self, request: ChatRequest) -> Result<AssistantMessage, LlmError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::MalformedResponse("stub ran out of replies".to_string()))
    }
}

/// Builds a terminal-text reply.
pub fn text_reply(text: &str) -> AssistantMessage {
    AssistantMessage {
        content: Some(text.to_string()),
        tool_calls: Vec::new(),
    }
}

/// Builds a reply requesting one tool call.
pub fn tool_reply(call_id: &str, name: &str, arguments: &str) -> AssistantMessage {
    AssistantMessage {
        content: None,
        tool_calls: vec![ToolCallRequest {
            id: call_id.to_string(),
            kind: "function".to_string(),
            function: FunctionCall {
                name: name.to_string(),
                arguments: arguments.to_string(),
            },
        }],
    }
}

/// Deterministic embedding double: equal text yields equal unit vectors.
pub struct StubEmbeddingModel {
    dims: usize,
}

impl StubEmbeddingModel {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

#[async_trait]
impl EmbeddingModel for StubEmbeddingModel {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let mut vector = vec![0.0f32; self.dims];
        for (index, byte) in text.bytes().enumerate() {
            vector[index % self.dims] += f32::from(byte);
        }
        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

/// Embedding double that fails after `allow` successful calls, for
/// exercising the pipeline's all-or-nothing abort.
pub struct FailingEmbeddingModel {
    dims: usize,
    allow: AtomicI64,
}

impl FailingEmbeddingModel {
    pub fn new(dims: usize, allow: i64) -> Self {
        Self {
            dims,
            allow: AtomicI64::new(allow),
        }
    }
}

#[async_trait]
impl EmbeddingModel for FailingEmbeddingModel {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
        if self.allow.fetch_sub(1, Ordering::SeqCst) <= 0 {
            return Err(LlmError::MalformedResponse("embedding service down".into()));
        }
        Ok(vec![0.5; self.dims])
    }

    fn dimensions(&self) -> usize {
        self.dims
    }
}

/// Rasterizer double: one synthetic page path per configured page.
pub struct StubRasterizer {
    pub pages: usize,
}

#[async_trait]
impl PageRasterizer for StubRasterizer {
    async fn rasterize(
        &self,
        _pdf_bytes: &[u8],
        scratch_dir: &Path,
    ) -> Result<Vec<PathBuf>, IngestError> {
        Ok((1..=self.pages)
            .map(|page| scratch_dir.join(format!("page-{page:02}.png")))
            .collect())
    }
}

/// OCR double: returns the configured text per page index; `None` simulates
/// a page whose recognition fails outright.
pub struct StubOcr {
    pub pages: Vec<Option<String>>,
}

impl StubOcr {
    pub fn with_texts(texts: Vec<&str>) -> Self {
        Self {
            pages: texts.into_iter().map(|t| Some(t.to_string())).collect(),
        }
    }
}

#[async_trait]
impl OcrEngine for StubOcr {
    async fn recognize(&self, page: &Path, _scripts: &[&str]) -> Result<String, IngestError> {
        let name = page
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let index: usize = name
            .rsplit('-')
            .next()
            .and_then(|n| n.parse::<usize>().ok())
            .map(|n| n - 1)
            .unwrap_or(0);
        match self.pages.get(index) {
            Some(Some(text)) => Ok(text.clone()),
            Some(None) => Err(IngestError::Ocr(format!("unreadable page {name}"))),
            None => Ok(String::new()),
        }
    }
}

/// In-memory datastore double with the same contract as the SQLite store.
pub struct MemoryDocumentStore {
    dims: usize,
    next_id: AtomicI64,
    docs: Mutex<Vec<DocumentRecord>>,
    chunks: Mutex<HashMap<i64, Vec<(i64, String, Vec<f32>)>>>,
}

impl MemoryDocumentStore {
    pub fn new(dims: usize) -> Self {
        Self {
            dims,
            next_id: AtomicI64::new(1),
            docs: Mutex::new(Vec::new()),
            chunks: Mutex::new(HashMap::new()),
        }
    }

    pub fn chunk_rows(&self, doc_id: i64) -> Vec<(i64, String)> {
        self.chunks
            .lock()
            .unwrap()
            .get(&doc_id)
            .map(|rows| {
                rows.iter()
                    .map(|(no, body, _)| (*no, body.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn matches_text(candidate: &str, term: &Option<String>) -> bool {
    term.as_ref().is_none_or(|t| {
        candidate.to_lowercase().contains(&t.to_lowercase())
    })
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert_document(&self, doc: NewDocument) -> Result<i64, StoreError> {
        let mut docs = self.docs.lock().unwrap();
        if docs.iter().any(|d| d.pdf_url == doc.pdf_url) {
            return Err(StoreError::Duplicate {
                pdf_url: doc.pdf_url,
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        docs.push(DocumentRecord {
            id,
            gr_no: doc.gr_no,
            date: doc.date,
            branch: doc.branch,
            subject_en: doc.subject_en,
            subject_gu: doc.subject_gu,
            pdf_url: doc.pdf_url,
        });
        Ok(id)
    }

    async fn document_by_pdf_url(
        &self,
        pdf_url: &str,
    ) -> Result<Option<DocumentRecord>, StoreError> {
        Ok(self
            .docs
            .lock()
            .unwrap()
            .iter()
            .find(|d| d.pdf_url == pdf_url)
            .cloned())
    }

    async fn find_documents(
        &self,
        filter: &StructuredFilter,
    ) -> Result<Vec<DocumentRecord>, StoreError> {
        Ok(self
            .docs
            .lock()
            .unwrap()
            .iter()
            .filter(|d| {
                matches_text(&d.gr_no, &filter.gr_no)
                    && matches_text(&d.branch, &filter.branch)
                    && matches_text(d.subject_en.as_deref().unwrap_or(""), &filter.subject_en)
                    && matches_text(d.subject_gu.as_deref().unwrap_or(""), &filter.subject_gu)
                    && filter.date.as_ref().is_none_or(|range| {
                        range.from.is_none_or(|from| d.date >= from)
                            && range.until.is_none_or(|until| d.date < until)
                    })
            })
            .cloned()
            .collect())
    }

    async fn insert_chunks(&self, doc_id: i64, chunks: Vec<NewChunk>) -> Result<(), StoreError> {
        for chunk in &chunks {
            if chunk.embedding.len() != self.dims {
                return Err(StoreError::DimensionMismatch {
                    expected: self.dims,
                    actual: chunk.embedding.len(),
                });
            }
        }
        let mut store = self.chunks.lock().unwrap();
        if store.get(&doc_id).is_some_and(|rows| !rows.is_empty()) {
            return Err(StoreError::Backend(format!(
                "chunks already exist for doc {doc_id}"
            )));
        }
        store.insert(
            doc_id,
            chunks
                .into_iter()
                .enumerate()
                .map(|(index, chunk)| ((index + 1) as i64, chunk.body, chunk.embedding))
                .collect(),
        );
        Ok(())
    }

    async fn has_chunks(&self, doc_id: i64) -> Result<bool, StoreError> {
        Ok(self
            .chunks
            .lock()
            .unwrap()
            .get(&doc_id)
            .is_some_and(|rows| !rows.is_empty()))
    }

    async fn search_chunks(
        &self,
        embedding: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<ChunkMatch>, StoreError> {
        let docs = self.docs.lock().unwrap();
        let chunks = self.chunks.lock().unwrap();
        let mut matches: Vec<ChunkMatch> = chunks
            .iter()
            .flat_map(|(doc_id, rows)| {
                let doc = docs.iter().find(|d| d.id == *doc_id);
                rows.iter().filter_map(move |(chunk_no, body, stored)| {
                    let doc = doc?;
                    let similarity = cosine_similarity(embedding, stored);
                    (similarity >= threshold).then(|| ChunkMatch {
                        doc_id: *doc_id,
                        chunk_no: *chunk_no,
                        body: body.clone(),
                        similarity,
                        gr_no: doc.gr_no.clone(),
                        branch: doc.branch.clone(),
                        pdf_url: doc.pdf_url.clone(),
                    })
                })
            })
            .collect();
        matches.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        matches.truncate(limit);
        Ok(matches)
    }

    async fn count_documents(&self) -> Result<u64, StoreError> {
        Ok(self.docs.lock().unwrap().len() as u64)
    }
}

/// A catalogued document for seeding stores in tests.
pub fn sample_document(pdf_url: &str) -> NewDocument {
    NewDocument {
        gr_no: "STS-1096-535".to_string(),
        date: chrono::NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        branch: "P-(Pension)".to_string(),
        subject_en: Some("Payment of bonus to Class-4 employees".to_string()),
        subject_gu: Some("વર્ગ-૪ કર્મચારીઓને બોનસ".to_string()),
        pdf_url: pdf_url.to_string(),
    }
}

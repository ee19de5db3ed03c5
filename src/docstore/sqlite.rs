//! SQLite-backed document and chunk storage.
//!
//! Connects with a shared `sqlx` pool and runs the embedded migrations on
//! connect, so a fresh database file is immediately usable. Similarity
//! search loads candidate vectors and ranks them in process; the corpus
//! (a few thousand chunks) is small enough that an index-backed ANN search
//! would be overkill.

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool, sqlite::SqliteRow};
use tracing::instrument;

use super::{
    ChunkMatch, DocumentRecord, DocumentStore, NewChunk, NewDocument, StoreError,
    cosine_similarity, decode_embedding, encode_embedding,
};
use crate::query::StructuredFilter;

/// Durable catalogue + vector store on SQLite.
#[derive(Clone)]
pub struct SqliteDocumentStore {
    pool: Arc<SqlitePool>,
    embedding_dimensions: usize,
}

impl std::fmt::Debug for SqliteDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteDocumentStore")
            .field("embedding_dimensions", &self.embedding_dimensions)
            .finish()
    }
}

impl SqliteDocumentStore {
    /// Connects (or creates) the database at `database_url` and applies
    /// embedded migrations.
    #[instrument(skip(database_url))]
    pub async fn connect(
        database_url: &str,
        embedding_dimensions: usize,
    ) -> Result<Self, StoreError> {
        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(|e| StoreError::Backend(format!("connect error: {e}")))?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(format!("migration failure: {e}")))?;
        Ok(Self {
            pool: Arc::new(pool),
            embedding_dimensions,
        })
    }

    /// Wraps an existing pool (shared with the history store in the binary).
    #[must_use]
    pub fn with_pool(pool: Arc<SqlitePool>, embedding_dimensions: usize) -> Self {
        Self {
            pool,
            embedding_dimensions,
        }
    }
}

fn document_from_row(row: &SqliteRow) -> DocumentRecord {
    DocumentRecord {
        id: row.get("id"),
        gr_no: row.get("gr_no"),
        date: row.get("date"),
        branch: row.get("branch"),
        subject_en: row.get("subject_en"),
        subject_gu: row.get("subject_gu"),
        pdf_url: row.get("pdf_url"),
    }
}

fn like_pattern(term: &str) -> String {
    format!("%{}%", term.to_lowercase())
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    #[instrument(skip(self, doc), fields(pdf_url = %doc.pdf_url), err)]
    async fn insert_document(&self, doc: NewDocument) -> Result<i64, StoreError> {
        let existing = self.document_by_pdf_url(&doc.pdf_url).await?;
        if existing.is_some() {
            return Err(StoreError::Duplicate {
                pdf_url: doc.pdf_url,
            });
        }

        let result = sqlx::query(
            r#"
            INSERT INTO documents (gr_no, date, branch, subject_en, subject_gu, pdf_url)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&doc.gr_no)
        .bind(doc.date)
        .bind(&doc.branch)
        .bind(&doc.subject_en)
        .bind(&doc.subject_gu)
        .bind(&doc.pdf_url)
        .execute(self.pool.as_ref())
        .await
        .map_err(|e| StoreError::Backend(format!("insert document: {e}")))?;

        Ok(result.last_insert_rowid())
    }

    async fn document_by_pdf_url(
        &self,
        pdf_url: &str,
    ) -> Result<Option<DocumentRecord>, StoreError> {
        let row = sqlx::query(
            "SELECT id, gr_no, date, branch, subject_en, subject_gu, pdf_url \
             FROM documents WHERE pdf_url = ?1",
        )
        .bind(pdf_url)
        .fetch_optional(self.pool.as_ref())
        .await
        .map_err(|e| StoreError::Backend(format!("lookup by pdf_url: {e}")))?;

        Ok(row.as_ref().map(document_from_row))
    }

    #[instrument(skip(self, filter), err)]
    async fn find_documents(
        &self,
        filter: &StructuredFilter,
    ) -> Result<Vec<DocumentRecord>, StoreError> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id, gr_no, date, branch, subject_en, subject_gu, pdf_url \
             FROM documents WHERE 1=1",
        );

        if let Some(term) = &filter.gr_no {
            builder.push(" AND LOWER(gr_no) LIKE ");
            builder.push_bind(like_pattern(term));
        }
        if let Some(term) = &filter.branch {
            builder.push(" AND LOWER(branch) LIKE ");
            builder.push_bind(like_pattern(term));
        }
        if let Some(term) = &filter.subject_en {
            builder.push(" AND LOWER(subject_en) LIKE ");
            builder.push_bind(like_pattern(term));
        }
        if let Some(term) = &filter.subject_gu {
            builder.push(" AND LOWER(subject_gu) LIKE ");
            builder.push_bind(like_pattern(term));
        }
        if let Some(range) = &filter.date {
            if let Some(from) = range.from {
                builder.push(" AND date >= ");
                builder.push_bind(from);
            }
            if let Some(until) = range.until {
                builder.push(" AND date < ");
                builder.push_bind(until);
            }
        }
        builder.push(" ORDER BY date DESC, id DESC");

        let rows = builder
            .build()
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(|e| StoreError::Backend(format!("filtered read: {e}")))?;

        Ok(rows.iter().map(document_from_row).collect())
    }

    #[instrument(skip(self, chunks), fields(doc_id, count = chunks.len()), err)]
    async fn insert_chunks(&self, doc_id: i64, chunks: Vec<NewChunk>) -> Result<(), StoreError> {
        for chunk in &chunks {
            if chunk.embedding.len() != self.embedding_dimensions {
                return Err(StoreError::DimensionMismatch {
                    expected: self.embedding_dimensions,
                    actual: chunk.embedding.len(),
                });
            }
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Backend(format!("tx begin: {e}")))?;

        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE doc_id = ?1")
            .bind(doc_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| StoreError::Backend(format!("chunk count: {e}")))?;
        if existing > 0 {
            return Err(StoreError::Backend(format!(
                "chunks already exist for doc {doc_id}"
            )));
        }

        for (index, chunk) in chunks.iter().enumerate() {
            sqlx::query(
                "INSERT INTO chunks (doc_id, chunk_no, body, embedding) VALUES (?1, ?2, ?3, ?4)",
            )
            .bind(doc_id)
            .bind((index + 1) as i64)
            .bind(&chunk.body)
            .bind(encode_embedding(&chunk.embedding))
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Backend(format!("insert chunk: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::Backend(format!("tx commit: {e}")))?;
        Ok(())
    }

    async fn has_chunks(&self, doc_id: i64) -> Result<bool, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE doc_id = ?1")
            .bind(doc_id)
            .fetch_one(self.pool.as_ref())
            .await
            .map_err(|e| StoreError::Backend(format!("chunk count: {e}")))?;
        Ok(count > 0)
    }

    #[instrument(skip(self, embedding), fields(threshold, limit), err)]
    async fn search_chunks(
        &self,
        embedding: &[f32],
        threshold: f32,
        limit: usize,
    ) -> Result<Vec<ChunkMatch>, StoreError> {
        if embedding.len() != self.embedding_dimensions {
            return Err(StoreError::DimensionMismatch {
                expected: self.embedding_dimensions,
                actual: embedding.len(),
            });
        }

        let rows = sqlx::query(
            "SELECT c.doc_id, c.chunk_no, c.body, c.embedding, d.gr_no, d.branch, d.pdf_url \
             FROM chunks c JOIN documents d ON d.id = c.doc_id",
        )
        .fetch_all(self.pool.as_ref())
        .await
        .map_err(|e| StoreError::Backend(format!("similarity read: {e}")))?;

        let mut matches: Vec<ChunkMatch> = rows
            .into_iter()
            .filter_map(|row| {
                let stored = decode_embedding(row.get::<Vec<u8>, _>("embedding").as_slice());
                let similarity = cosine_similarity(embedding, &stored);
                (similarity >= threshold).then(|| ChunkMatch {
                    doc_id: row.get("doc_id"),
                    chunk_no: row.get("chunk_no"),
                    body: row.get("body"),
                    similarity,
                    gr_no: row.get("gr_no"),
                    branch: row.get("branch"),
                    pdf_url: row.get("pdf_url"),
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
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(self.pool.as_ref())
            .await
            .map_err(|e| StoreError::Backend(format!("document count: {e}")))?;
        Ok(count as u64)
    }
}

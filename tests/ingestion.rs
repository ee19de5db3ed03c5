use std::sync::Arc;

use httpmock::prelude::*;

use finbot::config::{ChunkingConfig, SummarizeConfig};
use finbot::docstore::DocumentStore;
use finbot::ingest::{IngestError, IngestionPipeline};
use finbot::llm::AssistantMessage;
use finbot::progress::ProgressEmitter;

mod common;
use common::*;

const DIMS: usize = 4;

struct PipelineFixture {
    server: MockServer,
    store: Arc<MemoryDocumentStore>,
    chat: Arc<StubChatModel>,
}

fn pipeline_with(
    fixture: &PipelineFixture,
    ocr: StubOcr,
    pages: usize,
    embedder: Arc<dyn finbot::llm::EmbeddingModel>,
    summarize: SummarizeConfig,
) -> IngestionPipeline {
    IngestionPipeline::new(
        reqwest::Client::new(),
        Arc::new(StubRasterizer { pages }),
        Arc::new(ocr),
        embedder,
        fixture.chat.clone(),
        fixture.store.clone(),
        ChunkingConfig {
            chunk_size: 80,
            chunk_overlap: 10,
        },
        summarize,
        ProgressEmitter::disabled(),
    )
    .unwrap()
}

async fn fixture_with_replies(replies: Vec<AssistantMessage>) -> PipelineFixture {
    PipelineFixture {
        server: MockServer::start_async().await,
        store: Arc::new(MemoryDocumentStore::new(DIMS)),
        chat: Arc::new(StubChatModel::new(replies)),
    }
}

/// Serves a fake PDF body and catalogues a document pointing at it.
async fn serve_document(fixture: &PipelineFixture) -> (String, i64) {
    let url = fixture.server.url("/docs/sample.pdf");
    fixture
        .server
        .mock_async(|when, then| {
            when.method(GET).path("/docs/sample.pdf");
            then.status(200).body("%PDF-1.4 fake");
        })
        .await;
    let doc_id = fixture
        .store
        .insert_document(sample_document(&url))
        .await
        .unwrap();
    (url, doc_id)
}

#[tokio::test]
async fn ingest_persists_ordered_chunks() {
    let fixture = fixture_with_replies(vec![]).await;
    let (url, doc_id) = serve_document(&fixture).await;

    let page = "The pension scheme was revised. ".repeat(10);
    let pipeline = pipeline_with(
        &fixture,
        StubOcr::with_texts(vec![&page, &page]),
        2,
        Arc::new(StubEmbeddingModel::new(DIMS)),
        SummarizeConfig::default(),
    );

    let report = pipeline.ingest(&url).await.unwrap();
    assert_eq!(report.doc_id, doc_id);
    assert!(report.chunk_count > 1);

    let rows = fixture.store.chunk_rows(doc_id);
    assert_eq!(rows.len(), report.chunk_count);
    for (index, (chunk_no, body)) in rows.iter().enumerate() {
        assert_eq!(*chunk_no, (index + 1) as i64);
        assert!(!body.is_empty());
    }
}

#[tokio::test]
async fn duplicate_ingestion_is_rejected() {
    let fixture = fixture_with_replies(vec![]).await;
    let (url, _doc_id) = serve_document(&fixture).await;

    let page = "Budget circular text. ".repeat(12);
    let pipeline = pipeline_with(
        &fixture,
        StubOcr::with_texts(vec![&page]),
        1,
        Arc::new(StubEmbeddingModel::new(DIMS)),
        SummarizeConfig::default(),
    );

    pipeline.ingest(&url).await.unwrap();
    let error = pipeline.ingest(&url).await.unwrap_err();
    assert!(matches!(error, IngestError::AlreadyIngested(_)));

    // No accumulation of a second chunk set.
    let doc = fixture.store.document_by_pdf_url(&url).await.unwrap().unwrap();
    let first_count = fixture.store.chunk_rows(doc.id).len();
    assert!(first_count > 0);
}

#[tokio::test]
async fn unknown_document_aborts_before_fetch() {
    let fixture = fixture_with_replies(vec![]).await;
    let pipeline = pipeline_with(
        &fixture,
        StubOcr::with_texts(vec!["text"]),
        1,
        Arc::new(StubEmbeddingModel::new(DIMS)),
        SummarizeConfig::default(),
    );
    let error = pipeline
        .ingest("https://example.invalid/missing.pdf")
        .await
        .unwrap_err();
    assert!(matches!(error, IngestError::UnknownDocument(_)));
}

#[tokio::test]
async fn embedding_failure_leaves_no_partial_rows() {
    let fixture = fixture_with_replies(vec![]).await;
    let (url, doc_id) = serve_document(&fixture).await;

    let page = "One sentence here. ".repeat(30);
    let pipeline = pipeline_with(
        &fixture,
        StubOcr::with_texts(vec![&page]),
        1,
        // First embedding succeeds, the rest fail: the whole document must abort.
        Arc::new(FailingEmbeddingModel::new(DIMS, 1)),
        SummarizeConfig::default(),
    );

    let error = pipeline.ingest(&url).await.unwrap_err();
    assert!(matches!(error, IngestError::Embedding(_)));
    assert!(fixture.store.chunk_rows(doc_id).is_empty());
}

#[tokio::test]
async fn empty_ocr_output_aborts_without_rows() {
    let fixture = fixture_with_replies(vec![]).await;
    let (url, doc_id) = serve_document(&fixture).await;

    let pipeline = pipeline_with(
        &fixture,
        StubOcr::with_texts(vec!["", "  ", ""]),
        3,
        Arc::new(StubEmbeddingModel::new(DIMS)),
        SummarizeConfig::default(),
    );

    let error = pipeline.ingest(&url).await.unwrap_err();
    assert!(matches!(error, IngestError::NoExtractableText));
    assert!(fixture.store.chunk_rows(doc_id).is_empty());
}

#[tokio::test]
async fn unreadable_pages_degrade_but_do_not_abort() {
    let fixture = fixture_with_replies(vec![]).await;
    let (url, doc_id) = serve_document(&fixture).await;

    let page = "Readable page content. ".repeat(10);
    let ocr = StubOcr {
        pages: vec![Some(page.clone()), None, Some(page)],
    };
    let pipeline = pipeline_with(
        &fixture,
        ocr,
        3,
        Arc::new(StubEmbeddingModel::new(DIMS)),
        SummarizeConfig::default(),
    );

    let report = pipeline.ingest(&url).await.unwrap();
    assert!(report.chunk_count > 0);
    assert!(!fixture.store.chunk_rows(doc_id).is_empty());
}

#[tokio::test]
async fn fetch_failure_is_reported_as_fetch_error() {
    let fixture = fixture_with_replies(vec![]).await;
    let url = fixture.server.url("/docs/gone.pdf");
    fixture
        .server
        .mock_async(|when, then| {
            when.method(GET).path("/docs/gone.pdf");
            then.status(404);
        })
        .await;
    fixture
        .store
        .insert_document(sample_document(&url))
        .await
        .unwrap();

    let pipeline = pipeline_with(
        &fixture,
        StubOcr::with_texts(vec!["text"]),
        1,
        Arc::new(StubEmbeddingModel::new(DIMS)),
        SummarizeConfig::default(),
    );
    let error = pipeline.ingest(&url).await.unwrap_err();
    assert!(matches!(error, IngestError::Fetch(_)));
}

#[tokio::test]
async fn small_documents_are_summarized_in_one_pass() {
    let fixture = fixture_with_replies(vec![text_reply("the whole summary")]).await;
    let (url, _doc_id) = serve_document(&fixture).await;

    let pipeline = pipeline_with(
        &fixture,
        StubOcr::with_texts(vec!["short page one", "short page two"]),
        2,
        Arc::new(StubEmbeddingModel::new(DIMS)),
        SummarizeConfig::default(),
    );

    let summary = pipeline.summarize_document(&url).await.unwrap();
    assert_eq!(summary, "the whole summary");

    // One reasoning call: the buffer never overflowed.
    let requests = fixture.chat.requests();
    assert_eq!(requests.len(), 1);
    let text = requests[0].messages[1].content.as_deref().unwrap();
    assert!(text.contains("short page one"));
    assert!(text.contains("short page two"));
}

#[tokio::test]
async fn oversized_documents_roll_partial_summaries() {
    // Three chat replies: two partial summaries plus the final combine pass.
    let fixture = fixture_with_replies(vec![
        text_reply("partial A"),
        text_reply("partial B"),
        text_reply("final combined summary"),
    ])
    .await;
    let (url, _doc_id) = serve_document(&fixture).await;

    let long_page = "word ".repeat(40);
    let pipeline = pipeline_with(
        &fixture,
        StubOcr::with_texts(vec![&long_page, &long_page]),
        2,
        Arc::new(StubEmbeddingModel::new(DIMS)),
        // Tiny budget: the second page forces a buffer flush.
        SummarizeConfig {
            max_buffer_tokens: 50,
        },
    );

    let summary = pipeline.summarize_document(&url).await.unwrap();
    assert_eq!(summary, "final combined summary");

    let requests = fixture.chat.requests();
    assert_eq!(requests.len(), 3);
    // The combine pass receives the partials separated by three newlines.
    let combined_input = requests[2].messages[1].content.as_deref().unwrap();
    assert!(combined_input.contains("partial A\n\n\npartial B"));
}

#[tokio::test]
async fn document_qa_answers_against_extracted_text() {
    let fixture = fixture_with_replies(vec![text_reply("The bonus rate is 8.33%.")]).await;
    let (url, _doc_id) = serve_document(&fixture).await;

    let pipeline = pipeline_with(
        &fixture,
        StubOcr::with_texts(vec!["bonus rate of 8.33% applies to Class-4 staff"]),
        1,
        Arc::new(StubEmbeddingModel::new(DIMS)),
        SummarizeConfig::default(),
    );

    let answer = pipeline
        .answer_from_document(&url, "What is the bonus rate?")
        .await
        .unwrap();
    assert_eq!(answer, "The bonus rate is 8.33%.");

    let requests = fixture.chat.requests();
    assert_eq!(requests.len(), 1);
    let system = requests[0].messages[0].content.as_deref().unwrap();
    assert!(system.contains("bonus rate of 8.33%"));
    let user = requests[0].messages[1].content.as_deref().unwrap();
    assert_eq!(user, "What is the bonus rate?");
}

//! Thin command-line driver.
//!
//! `finbot chat` runs an interactive conversation against the corpus;
//! `finbot ingest <manifest.json>` catalogues and ingests documents from a
//! manifest. This binary only wires components together — all behavior
//! lives in the library.

use std::io::{BufRead, Write};
use std::sync::Arc;

use finbot::agent::{CapabilityRegistry, Orchestrator, OrchestratorOptions};
use finbot::config::FinbotConfig;
use finbot::docstore::{DocumentStore, NewDocument, SqliteDocumentStore, StoreError};
use finbot::history::SqliteHistoryStore;
use finbot::ingest::{IngestionPipeline, PdftoppmRasterizer, TesseractOcr};
use finbot::llm::{OpenAiChatModel, OpenAiEmbeddingModel};
use finbot::progress::ProgressEmitter;
use finbot::turn::ConversationKey;
use serde::Deserialize;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
struct ManifestEntry {
    gr_no: String,
    date: chrono::NaiveDate,
    branch: String,
    #[serde(default)]
    subject_en: Option<String>,
    #[serde(default)]
    subject_gu: Option<String>,
    pdf_url: String,
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    finbot::telemetry::init();

    let config = FinbotConfig::from_env().map_err(|e| miette::miette!("{e}"))?;

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("chat") => chat(&config).await,
        Some("ingest") => {
            let manifest = args
                .next()
                .ok_or_else(|| miette::miette!("usage: finbot ingest <manifest.json>"))?;
            ingest(&config, &manifest).await
        }
        _ => Err(miette::miette!("usage: finbot <chat|ingest> [args]")),
    }
}

async fn build_pipeline(
    config: &FinbotConfig,
    store: Arc<dyn DocumentStore>,
    progress: ProgressEmitter,
) -> miette::Result<Arc<IngestionPipeline>> {
    let chat_model = OpenAiChatModel::new(config).map_err(|e| miette::miette!("{e}"))?;
    let embedder = OpenAiEmbeddingModel::new(config).map_err(|e| miette::miette!("{e}"))?;
    let http = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .map_err(|e| miette::miette!("{e}"))?;

    let pipeline = IngestionPipeline::new(
        http,
        Arc::new(PdftoppmRasterizer::new(config.subprocess_timeout)),
        Arc::new(TesseractOcr::new(config.subprocess_timeout)),
        Arc::new(embedder),
        Arc::new(chat_model),
        store,
        config.chunking,
        config.summarize,
        progress,
    )
    .map_err(|e| miette::miette!("{e}"))?;
    Ok(Arc::new(pipeline))
}

async fn chat(config: &FinbotConfig) -> miette::Result<()> {
    let store = Arc::new(
        SqliteDocumentStore::connect(&config.database_url, config.embedding_dimensions)
            .await
            .map_err(|e| miette::miette!("{e}"))?,
    );
    let history = Arc::new(
        SqliteHistoryStore::connect(&config.database_url)
            .await
            .map_err(|e| miette::miette!("{e}"))?,
    );

    let (progress, progress_rx) = ProgressEmitter::channel();
    let store_dyn: Arc<dyn DocumentStore> = store;
    let pipeline = build_pipeline(config, store_dyn.clone(), progress.clone()).await?;

    let chat_model = OpenAiChatModel::new(config).map_err(|e| miette::miette!("{e}"))?;
    let embedder = OpenAiEmbeddingModel::new(config).map_err(|e| miette::miette!("{e}"))?;
    let registry = CapabilityRegistry::standard(
        store_dyn.clone(),
        Arc::new(embedder),
        pipeline,
        config.search,
        progress.clone(),
    );

    let orchestrator = Orchestrator::new(
        Arc::new(chat_model),
        history,
        store_dyn,
        registry,
        progress,
        OrchestratorOptions {
            temperature: config.temperature,
            max_rounds: config.max_rounds,
        },
    );

    // Mirror stage labels to stderr while answers go to stdout.
    tokio::spawn(async move {
        while let Ok(label) = progress_rx.recv_async().await {
            eprintln!("  - {label}");
        }
    });

    let key = ConversationKey::new(
        std::env::var("FINBOT_USER_ID").unwrap_or_else(|_| "user_13".into()),
        std::env::var("FINBOT_SESSION_ID")
            .unwrap_or_else(|_| format!("session_{}", uuid::Uuid::new_v4())),
    );
    info!(conversation = %key, "chat session ready");

    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();
    loop {
        write!(stdout, "> ").ok();
        stdout.flush().ok();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        match orchestrator.run(&key, message).await {
            Ok(answer) => println!("{answer}"),
            Err(e) => error!("turn failed: {e}"),
        }
    }
    Ok(())
}

async fn ingest(config: &FinbotConfig, manifest_path: &str) -> miette::Result<()> {
    let store = Arc::new(
        SqliteDocumentStore::connect(&config.database_url, config.embedding_dimensions)
            .await
            .map_err(|e| miette::miette!("{e}"))?,
    );
    let store_dyn: Arc<dyn DocumentStore> = store;
    let pipeline = build_pipeline(config, store_dyn.clone(), ProgressEmitter::disabled()).await?;

    let raw = tokio::fs::read_to_string(manifest_path)
        .await
        .map_err(|e| miette::miette!("read manifest: {e}"))?;
    let entries: Vec<ManifestEntry> =
        serde_json::from_str(&raw).map_err(|e| miette::miette!("parse manifest: {e}"))?;

    for entry in entries {
        info!(pdf_url = %entry.pdf_url, "processing");
        let catalogued = store_dyn
            .insert_document(NewDocument {
                gr_no: entry.gr_no,
                date: entry.date,
                branch: entry.branch,
                subject_en: entry.subject_en,
                subject_gu: entry.subject_gu,
                pdf_url: entry.pdf_url.clone(),
            })
            .await;
        match catalogued {
            Ok(_) | Err(StoreError::Duplicate { .. }) => {}
            Err(e) => {
                error!(pdf_url = %entry.pdf_url, "catalogue failed: {e}");
                continue;
            }
        }

        match pipeline.ingest(&entry.pdf_url).await {
            Ok(report) => info!(
                doc_id = report.doc_id,
                chunks = report.chunk_count,
                "ingested"
            ),
            Err(e) => error!(pdf_url = %entry.pdf_url, "ingestion failed: {e}"),
        }
    }
    Ok(())
}

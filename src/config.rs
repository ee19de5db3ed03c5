//! Environment-driven configuration.
//!
//! Every component receives its configuration explicitly at construction;
//! nothing reads the environment after startup. [`FinbotConfig::from_env`]
//! loads a `.env` file when present (via `dotenvy`) and then reads
//! `FINBOT_*` variables, falling back to compiled defaults for everything
//! except the API key.

use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while loading configuration from the environment.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    #[diagnostic(
        code(finbot::config::missing_var),
        help("Set the variable in the environment or in a .env file.")
    )]
    MissingVar(&'static str),

    #[error("invalid value for {key}: {message}")]
    #[diagnostic(code(finbot::config::invalid_value))]
    InvalidValue { key: &'static str, message: String },
}

/// Top-level service configuration.
#[derive(Clone, Debug)]
pub struct FinbotConfig {
    /// Base URL of the OpenAI-compatible reasoning/embedding service.
    pub api_base_url: String,
    /// Bearer token for the reasoning/embedding service.
    pub api_key: String,
    /// Chat model used by the orchestrator and summarizer.
    pub chat_model: String,
    /// Embedding model; its output dimensionality is `embedding_dimensions`.
    pub embedding_model: String,
    /// Corpus-wide embedding dimensionality. Mixing dimensionalities is a
    /// fatal ingestion error, so this is fixed at configuration time.
    pub embedding_dimensions: usize,
    /// SQLite database URL, e.g. `sqlite://finbot.db`.
    pub database_url: String,
    /// Sampling temperature for tool selection; near-deterministic on purpose.
    pub temperature: f32,
    /// Maximum orchestrator rounds before the turn fails with a loop-budget error.
    pub max_rounds: usize,
    /// Deadline applied to every reasoning/embedding/HTTP call.
    pub request_timeout: Duration,
    /// Deadline applied to each rasterization/OCR subprocess.
    pub subprocess_timeout: Duration,
    pub chunking: ChunkingConfig,
    pub search: SearchConfig,
    pub summarize: SummarizeConfig,
}

/// Chunking constants for the ingestion pipeline.
#[derive(Clone, Copy, Debug)]
pub struct ChunkingConfig {
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Overlap carried between adjacent chunks, in characters.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
        }
    }
}

/// Semantic-search constants.
#[derive(Clone, Copy, Debug)]
pub struct SearchConfig {
    /// Minimum cosine similarity for a chunk to count as a match.
    pub match_threshold: f32,
    /// Maximum number of matches returned per query.
    pub match_count: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            match_threshold: 0.78,
            match_count: 10,
        }
    }
}

/// Token budget for the rolling summarization buffer.
#[derive(Clone, Copy, Debug)]
pub struct SummarizeConfig {
    /// Upper bound on tokens accumulated before a partial summary is taken.
    pub max_buffer_tokens: usize,
}

impl Default for SummarizeConfig {
    fn default() -> Self {
        Self {
            max_buffer_tokens: 100_000,
        }
    }
}

impl FinbotConfig {
    /// Loads configuration from the process environment.
    ///
    /// Reads `.env` first when one exists; real environment variables win.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let api_key = std::env::var("FINBOT_API_KEY")
            .map_err(|_| ConfigError::MissingVar("FINBOT_API_KEY"))?;

        Ok(Self {
            api_base_url: var_or("FINBOT_API_BASE_URL", "https://api.openai.com/v1"),
            api_key,
            chat_model: var_or("FINBOT_CHAT_MODEL", "gpt-4o-mini"),
            embedding_model: var_or("FINBOT_EMBEDDING_MODEL", "text-embedding-3-small"),
            embedding_dimensions: parsed_var_or("FINBOT_EMBEDDING_DIMENSIONS", 1536)?,
            database_url: var_or("FINBOT_DATABASE_URL", "sqlite://finbot.db"),
            temperature: parsed_var_or("FINBOT_TEMPERATURE", 0.1)?,
            max_rounds: parsed_var_or("FINBOT_MAX_ROUNDS", 10)?,
            request_timeout: Duration::from_secs(parsed_var_or("FINBOT_REQUEST_TIMEOUT_SECS", 60)?),
            subprocess_timeout: Duration::from_secs(parsed_var_or(
                "FINBOT_SUBPROCESS_TIMEOUT_SECS",
                120,
            )?),
            chunking: ChunkingConfig::default(),
            search: SearchConfig::default(),
            summarize: SummarizeConfig::default(),
        })
    }
}

fn var_or(key: &'static str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed_var_or<T>(key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key,
            message: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

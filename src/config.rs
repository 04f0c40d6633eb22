use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub completion: CompletionConfig,
    #[serde(default)]
    pub rerank: RerankConfig,
    #[serde(default)]
    pub query: QueryConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chunk_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_min_chunk_tokens")]
    pub min_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_chunk_tokens(),
            min_tokens: default_min_chunk_tokens(),
        }
    }
}

fn default_max_chunk_tokens() -> usize {
    256
}
fn default_min_chunk_tokens() -> usize {
    16
}

/// Adaptive top-k parameters. These are tunable inputs, not constants; the
/// selector never hard-codes them.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct SelectionConfig {
    #[serde(default = "default_min_k")]
    pub min_k: usize,
    #[serde(default = "default_max_k")]
    pub max_k: usize,
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
    /// Relative score drop between consecutive candidates that marks the
    /// start of the low-relevance tail.
    #[serde(default = "default_relative_drop")]
    pub relative_drop: f32,
    /// How many candidates to pull from the index before selection.
    #[serde(default = "default_candidate_k")]
    pub candidate_k: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_k: default_min_k(),
            max_k: default_max_k(),
            token_budget: default_token_budget(),
            relative_drop: default_relative_drop(),
            candidate_k: default_candidate_k(),
        }
    }
}

fn default_min_k() -> usize {
    1
}
fn default_max_k() -> usize {
    10
}
fn default_token_budget() -> usize {
    2048
}
fn default_relative_drop() -> f32 {
    0.3
}
fn default_candidate_k() -> usize {
    40
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_max_input_tokens")]
    pub max_input_tokens: usize,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            dims: None,
            max_input_tokens: default_max_input_tokens(),
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CompletionConfig {
    #[serde(default = "default_disabled")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_completion_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            provider: default_disabled(),
            model: None,
            url: None,
            max_retries: default_max_retries(),
            timeout_secs: default_completion_timeout_secs(),
        }
    }
}

impl CompletionConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RerankConfig {
    /// `"lexical"` (deterministic, offline), `"llm"` (completion-backed),
    /// or `"disabled"` (retrieval order kept as-is).
    #[serde(default = "default_rerank_scorer")]
    pub scorer: String,
}

impl Default for RerankConfig {
    fn default() -> Self {
        Self {
            scorer: default_rerank_scorer(),
        }
    }
}

fn default_rerank_scorer() -> String {
    "lexical".to_string()
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct QueryConfig {
    /// Light synonym expansion: term -> additional terms appended to the
    /// adapted query when the term appears.
    #[serde(default)]
    pub expansions: HashMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_ingest_root")]
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    /// Upper bound on documents processed concurrently.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            root: default_ingest_root(),
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            parallelism: default_parallelism(),
        }
    }
}

fn default_disabled() -> String {
    "disabled".to_string()
}
fn default_max_input_tokens() -> usize {
    512
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_completion_timeout_secs() -> u64 {
    60
}
fn default_ingest_root() -> PathBuf {
    PathBuf::from("./docs")
}
fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.pdf".to_string(),
        "**/*.blocks.json".to_string(),
        "**/*.md".to_string(),
        "**/*.txt".to_string(),
    ]
}
fn default_parallelism() -> usize {
    4
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.chunking.max_tokens == 0 {
        anyhow::bail!("chunking.max_tokens must be > 0");
    }
    if config.chunking.min_tokens > config.chunking.max_tokens {
        anyhow::bail!("chunking.min_tokens must not exceed chunking.max_tokens");
    }

    if config.selection.min_k == 0 {
        anyhow::bail!("selection.min_k must be >= 1");
    }
    if config.selection.max_k < config.selection.min_k {
        anyhow::bail!("selection.max_k must be >= selection.min_k");
    }
    if !(0.0..=1.0).contains(&config.selection.relative_drop) {
        anyhow::bail!("selection.relative_drop must be in [0.0, 1.0]");
    }
    if config.selection.candidate_k < config.selection.max_k {
        anyhow::bail!("selection.candidate_k must be >= selection.max_k");
    }

    if config.embedding.is_enabled() {
        if config.embedding.model.is_none() {
            anyhow::bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.dims.is_none() || config.embedding.dims == Some(0) {
            anyhow::bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.max_input_tokens == 0 {
            anyhow::bail!("embedding.max_input_tokens must be > 0");
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "http" => {}
        other => anyhow::bail!(
            "Unknown embedding provider: '{}'. Must be disabled or http.",
            other
        ),
    }

    match config.completion.provider.as_str() {
        "disabled" | "http" => {}
        other => anyhow::bail!(
            "Unknown completion provider: '{}'. Must be disabled or http.",
            other
        ),
    }

    match config.rerank.scorer.as_str() {
        "disabled" | "lexical" | "llm" => {}
        other => anyhow::bail!(
            "Unknown rerank scorer: '{}'. Must be disabled, lexical, or llm.",
            other
        ),
    }
    if config.rerank.scorer == "llm" && !config.completion.is_enabled() {
        anyhow::bail!("rerank.scorer = 'llm' requires a configured [completion] provider");
    }

    if config.ingest.parallelism == 0 {
        anyhow::bail!("ingest.parallelism must be >= 1");
    }

    Ok(())
}

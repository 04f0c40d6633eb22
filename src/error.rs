//! Typed error taxonomy for the pipeline core.
//!
//! Application edges (CLI, batch orchestration) work with `anyhow`; the
//! pipeline itself returns [`PipelineError`] so callers can distinguish a
//! missing provider from a transient one, or a fatally oversized chunk from
//! a degradable layout problem.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// The document carries no blocks at all. Fatal for that document only.
    #[error("document has no blocks")]
    EmptyDocument,

    /// Layout metadata was malformed beyond what inference can absorb.
    #[error("layout extraction failed: {0}")]
    Extraction(String),

    /// A chunk's token span does not fit inside any encode window, so no
    /// pooled vector can be produced for it.
    #[error(
        "chunk at position {position} spans {chunk_tokens} tokens, larger than the {window_tokens}-token encode window"
    )]
    ChunkTooLargeForWindow {
        position: usize,
        chunk_tokens: usize,
        window_tokens: usize,
    },

    /// A required external capability is not configured.
    #[error("{capability} provider is not configured")]
    ProviderUnavailable { capability: &'static str },

    /// An external provider call failed after bounded retries.
    #[error("{capability} provider failed after {attempts} attempt(s): {message}")]
    ProviderTransient {
        capability: &'static str,
        attempts: u32,
        message: String,
    },

    /// The vector store rejected an operation.
    #[error("vector store error: {0}")]
    Store(String),
}

impl PipelineError {
    /// True when retrying the same call might succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, PipelineError::ProviderTransient { .. })
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::Store(err.to_string())
    }
}

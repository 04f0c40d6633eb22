//! Reranking: re-order an adaptively-selected context set with a secondary
//! relevance signal.
//!
//! The reranker never changes set membership — its output is a permutation
//! of its input, annotated with rerank scores. Ties are broken by the
//! original retrieval score and then by chunk position, so a deterministic
//! scorer yields a deterministic order. A scorer failure on one chunk falls
//! back to that chunk's retrieval score instead of failing the query.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::completion::CompletionClient;
use crate::config::{CompletionConfig, RerankConfig};
use crate::error::PipelineError;
use crate::models::{ContextChunk, ContextSet, Query};

/// Pairwise query–chunk relevance signal used for reranking.
#[async_trait]
pub trait RelevanceScorer: Send + Sync {
    fn name(&self) -> &str;

    /// Relevance of `chunk` to `query`, higher is more relevant.
    async fn score(&self, query: &Query, chunk: &ContextChunk) -> Result<f32, PipelineError>;
}

/// Instantiate the scorer named by the configuration, or `None` when
/// reranking is disabled.
pub fn create_scorer(
    rerank: &RerankConfig,
    completion: &CompletionConfig,
) -> Result<Option<Box<dyn RelevanceScorer>>, PipelineError> {
    match rerank.scorer.as_str() {
        "disabled" => Ok(None),
        "lexical" => Ok(Some(Box::new(LexicalScorer))),
        "llm" => {
            let client = crate::completion::create_completion(completion)?;
            Ok(Some(Box::new(LlmScorer { client })))
        }
        other => Err(PipelineError::ProviderTransient {
            capability: "rerank",
            attempts: 0,
            message: format!("unknown rerank scorer: {}", other),
        }),
    }
}

/// Re-score and re-order `set` in place.
pub async fn rerank(set: &mut ContextSet, query: &Query, scorer: &dyn RelevanceScorer) {
    for chunk in &mut set.chunks {
        match scorer.score(query, chunk).await {
            Ok(score) => chunk.rerank_score = Some(score),
            Err(e) => {
                eprintln!(
                    "Warning: {} scorer failed for chunk {}, keeping retrieval score: {}",
                    scorer.name(),
                    chunk.chunk_id,
                    e
                );
                chunk.rerank_score = Some(chunk.retrieval_score);
            }
        }
    }

    set.chunks.sort_by(|a, b| {
        let ra = a.rerank_score.unwrap_or(a.retrieval_score);
        let rb = b.rerank_score.unwrap_or(b.retrieval_score);
        rb.partial_cmp(&ra)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                b.retrieval_score
                    .partial_cmp(&a.retrieval_score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.position.cmp(&b.position))
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
}

// ============ Lexical Scorer ============

/// Deterministic offline scorer: the fraction of distinct adapted-query
/// terms that occur in the chunk text.
pub struct LexicalScorer;

#[async_trait]
impl RelevanceScorer for LexicalScorer {
    fn name(&self) -> &str {
        "lexical"
    }

    async fn score(&self, query: &Query, chunk: &ContextChunk) -> Result<f32, PipelineError> {
        let terms: HashSet<String> = query
            .adapted
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        if terms.is_empty() {
            return Ok(0.0);
        }

        let chunk_terms: HashSet<String> = chunk
            .text
            .split_whitespace()
            .map(|t| {
                t.trim_matches(|c: char| !c.is_alphanumeric())
                    .to_lowercase()
            })
            .collect();

        let hits = terms.iter().filter(|t| chunk_terms.contains(*t)).count();
        Ok(hits as f32 / terms.len() as f32)
    }
}

// ============ LLM Scorer ============

/// Relevance scorer backed by the completion provider: asks a yes/no
/// question per query–chunk pair and maps the answer to a score.
pub struct LlmScorer {
    client: Box<dyn CompletionClient>,
}

#[async_trait]
impl RelevanceScorer for LlmScorer {
    fn name(&self) -> &str {
        "llm"
    }

    async fn score(&self, query: &Query, chunk: &ContextChunk) -> Result<f32, PipelineError> {
        let prompt = format!(
            "Query: {}\n\nPassage:\n{}\n\nDoes this passage contain information relevant to the query? Answer Yes or No.\nAnswer:",
            query.adapted, chunk.text
        );
        let response = self.client.complete(&prompt).await?;
        Ok(parse_yes_no(&response))
    }
}

/// Map a yes/no answer to 1.0/0.0; an ambiguous answer scores 0.5.
fn parse_yes_no(response: &str) -> f32 {
    let lower = response.to_lowercase();
    let trimmed = lower.trim();
    if trimmed.starts_with("yes") {
        1.0
    } else if trimmed.starts_with("no") {
        0.0
    } else if trimmed.contains("yes") && !trimmed.contains("no") {
        1.0
    } else if trimmed.contains("no") && !trimmed.contains("yes") {
        0.0
    } else {
        0.5
    }
}

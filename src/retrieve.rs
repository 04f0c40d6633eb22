//! Query-time retrieval: adapt → embed → search → adaptive selection →
//! rerank.
//!
//! Retrieval never surfaces raw provider errors to the caller; failures
//! degrade to an empty [`ContextSet`] carrying an explicit status. Queries
//! never write to the index.

use crate::config::SelectionConfig;
use crate::embedding::TokenEmbedder;
use crate::models::{ContextChunk, ContextSet, PoolingMethod, Query, RetrievalStatus};
use crate::query::QueryAdapter;
use crate::rerank::{self, RelevanceScorer};
use crate::select;
use crate::store::VectorIndex;

/// Assemble the context set for one query.
///
/// Returns the adapted [`Query`] (raw text retained) alongside the set, so
/// callers can log what was actually searched.
pub async fn retrieve_context(
    raw_query: &str,
    adapter: &QueryAdapter,
    embedder: &dyn TokenEmbedder,
    index: &dyn VectorIndex,
    selection: &SelectionConfig,
    scorer: Option<&dyn RelevanceScorer>,
) -> (Query, ContextSet) {
    let query = adapter.adapt(raw_query);

    let query_vec = match embedder.embed_pooled(&query.adapted).await {
        Ok(v) => v,
        Err(e) => {
            let set = ContextSet::empty(RetrievalStatus::Degraded(e.to_string()));
            return (query, set);
        }
    };

    // Chunk vectors in the index are late-pooled; the query vector comes
    // from the same model's pooled endpoint and is compared only against
    // that one configuration.
    let candidates = match index
        .search(
            &query_vec,
            embedder.model_id(),
            PoolingMethod::LateMean.as_str(),
            selection.candidate_k,
        )
        .await
    {
        Ok(c) => c,
        Err(e) => {
            let set = ContextSet::empty(RetrievalStatus::Degraded(e.to_string()));
            return (query, set);
        }
    };

    if candidates.is_empty() {
        return (query, ContextSet::empty(RetrievalStatus::Empty));
    }

    let selected = select::select_adaptive(&candidates, selection);
    let mut set = ContextSet {
        chunks: selected.into_iter().map(ContextChunk::from).collect(),
        status: RetrievalStatus::Complete,
    };

    if let Some(scorer) = scorer {
        rerank::rerank(&mut set, &query, scorer).await;
    }

    (query, set)
}

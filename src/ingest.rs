//! Ingestion pipeline orchestration.
//!
//! Runs each document through layout inference → chunking → late-chunking
//! embedding → index insertion. Documents are independent: they share no
//! mutable state, process under bounded parallelism, and one document's
//! failure never aborts its siblings. The batch reports a per-document
//! outcome summary.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::chunk;
use crate::config::ChunkingConfig;
use crate::embedding::TokenEmbedder;
use crate::late_embed;
use crate::layout;
use crate::models::Document;
use crate::store::VectorIndex;

/// Outcome of ingesting one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Ingested { chunks: usize },
    /// A document with the same content hash is already stored.
    SkippedUnchanged,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct IngestReport {
    /// Source label for display (file path or title).
    pub label: String,
    pub document_id: String,
    pub outcome: IngestOutcome,
}

/// Per-document outcomes for one batch, in input order.
#[derive(Debug, Default)]
pub struct IngestSummary {
    pub reports: Vec<IngestReport>,
}

impl IngestSummary {
    pub fn ingested(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, IngestOutcome::Ingested { .. }))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.outcome == IngestOutcome::SkippedUnchanged)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, IngestOutcome::Failed(_)))
            .count()
    }

    pub fn chunks_written(&self) -> usize {
        self.reports
            .iter()
            .map(|r| match r.outcome {
                IngestOutcome::Ingested { chunks } => chunks,
                _ => 0,
            })
            .sum()
    }
}

/// Ingest a batch of labeled documents with at most `parallelism` in
/// flight at once.
pub async fn ingest_documents(
    docs: Vec<(String, Document)>,
    chunking: &ChunkingConfig,
    embedder: Arc<dyn TokenEmbedder>,
    index: Arc<dyn VectorIndex>,
    parallelism: usize,
) -> IngestSummary {
    let semaphore = Arc::new(Semaphore::new(parallelism.max(1)));
    let mut tasks: JoinSet<(usize, IngestReport)> = JoinSet::new();

    for (order, (label, doc)) in docs.into_iter().enumerate() {
        let semaphore = semaphore.clone();
        let embedder = embedder.clone();
        let index = index.clone();
        let chunking = chunking.clone();

        tasks.spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("ingest semaphore is never closed");
            let document_id = doc.id.clone();
            let outcome = ingest_one(doc, &chunking, embedder.as_ref(), index.as_ref()).await;
            (
                order,
                IngestReport {
                    label,
                    document_id,
                    outcome,
                },
            )
        });
    }

    let mut ordered: Vec<(usize, IngestReport)> = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(entry) => ordered.push(entry),
            Err(e) => ordered.push((
                usize::MAX,
                IngestReport {
                    label: "<task>".to_string(),
                    document_id: String::new(),
                    outcome: IngestOutcome::Failed(format!("ingest task panicked: {}", e)),
                },
            )),
        }
    }
    ordered.sort_by_key(|(order, _)| *order);

    IngestSummary {
        reports: ordered.into_iter().map(|(_, r)| r).collect(),
    }
}

/// Run the full pipeline for one document. Errors stay inside the returned
/// outcome so sibling documents are unaffected.
async fn ingest_one(
    mut doc: Document,
    chunking: &ChunkingConfig,
    embedder: &dyn TokenEmbedder,
    index: &dyn VectorIndex,
) -> IngestOutcome {
    match index.contains_document(&doc.id).await {
        Ok(true) => return IngestOutcome::SkippedUnchanged,
        Ok(false) => {}
        Err(e) => return IngestOutcome::Failed(e.to_string()),
    }

    if let Err(e) = layout::infer_layout(&mut doc) {
        return IngestOutcome::Failed(e.to_string());
    }

    let chunks = chunk::chunk_document(&doc, chunking);

    let embeddings = match late_embed::embed_chunks(&doc, &chunks, embedder).await {
        Ok(e) => e,
        Err(e) => return IngestOutcome::Failed(e.to_string()),
    };

    if let Err(e) = index.insert_document(&doc, &chunks, &embeddings).await {
        return IngestOutcome::Failed(e.to_string());
    }

    IngestOutcome::Ingested {
        chunks: chunks.len(),
    }
}

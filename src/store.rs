//! Vector index adapter.
//!
//! The [`VectorIndex`] trait is the system of record for retrieval: the
//! pipeline writes `(chunk, embedding)` pairs through it and issues
//! similarity queries against it, never re-deriving vectors from storage.
//!
//! Two implementations:
//! - **[`SqliteIndex`]** — chunks and vectors in SQLite; vectors stored as
//!   little-endian `f32` BLOBs, similarity computed in-process.
//! - **[`MemoryIndex`]** — `HashMap`/`Vec` behind `RwLock`, for tests.
//!
//! Inserts are upserts keyed by `(document_id, chunk_position)`, and the
//! document id is the content hash, so re-ingesting an identical document
//! never duplicates chunks. Search is always scoped to one
//! `(model_id, pooling)` configuration; vectors from different
//! configurations are never compared.

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::error::PipelineError;
use crate::models::{Chunk, Document, Embedding, ScoredCandidate};

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Whether a document with this content hash is already stored.
    async fn contains_document(&self, document_id: &str) -> Result<bool, PipelineError>;

    /// Upsert a document with its chunks and their embeddings.
    /// `chunks` and `embeddings` are parallel slices in chunk order.
    async fn insert_document(
        &self,
        doc: &Document,
        chunks: &[Chunk],
        embeddings: &[Embedding],
    ) -> Result<(), PipelineError>;

    /// Similarity query scoped to one embedding configuration, returning
    /// candidates in descending score order.
    async fn search(
        &self,
        query_vec: &[f32],
        model_id: &str,
        pooling: &str,
        limit: usize,
    ) -> Result<Vec<ScoredCandidate>, PipelineError>;
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or mismatched
/// vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

fn sort_and_truncate(mut candidates: Vec<ScoredCandidate>, limit: usize) -> Vec<ScoredCandidate> {
    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    candidates.truncate(limit);
    candidates
}

// ============ SQLite implementation ============

pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn contains_document(&self, document_id: &str) -> Result<bool, PipelineError> {
        let exists: bool = sqlx::query_scalar("SELECT COUNT(*) > 0 FROM documents WHERE id = ?")
            .bind(document_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn insert_document(
        &self,
        doc: &Document,
        chunks: &[Chunk],
        embeddings: &[Embedding],
    ) -> Result<(), PipelineError> {
        if chunks.len() != embeddings.len() {
            return Err(PipelineError::Store(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO documents (id, title, page_count, block_count, ingested_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.title)
        .bind(doc.page_count as i64)
        .bind(doc.blocks.len() as i64)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            // Upsert keyed by (document_id, position); a retry of the same
            // document updates in place instead of duplicating.
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, position, text, token_start, token_end, heading_level)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(document_id, position) DO UPDATE SET
                    text = excluded.text,
                    token_start = excluded.token_start,
                    token_end = excluded.token_end,
                    heading_level = excluded.heading_level
                "#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(&chunk.document_id)
            .bind(chunk.position as i64)
            .bind(&chunk.text)
            .bind(chunk.token_span.start as i64)
            .bind(chunk.token_span.end as i64)
            .bind(chunk.heading_level as i64)
            .execute(&mut *tx)
            .await?;

            let chunk_id: String =
                sqlx::query_scalar("SELECT id FROM chunks WHERE document_id = ? AND position = ?")
                    .bind(&chunk.document_id)
                    .bind(chunk.position as i64)
                    .fetch_one(&mut *tx)
                    .await?;

            sqlx::query(
                r#"
                INSERT INTO chunk_vectors (chunk_id, document_id, model_id, pooling, dims, embedding)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(chunk_id, model_id, pooling) DO UPDATE SET
                    dims = excluded.dims,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&chunk_id)
            .bind(&chunk.document_id)
            .bind(&embedding.model_id)
            .bind(embedding.pooling.as_str())
            .bind(embedding.vector.len() as i64)
            .bind(vec_to_blob(&embedding.vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn search(
        &self,
        query_vec: &[f32],
        model_id: &str,
        pooling: &str,
        limit: usize,
    ) -> Result<Vec<ScoredCandidate>, PipelineError> {
        let rows = sqlx::query(
            r#"
            SELECT cv.chunk_id, cv.embedding, c.document_id, c.position, c.text
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            WHERE cv.model_id = ? AND cv.pooling = ?
            "#,
        )
        .bind(model_id)
        .bind(pooling)
        .fetch_all(&self.pool)
        .await?;

        let candidates: Vec<ScoredCandidate> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                let position: i64 = row.get("position");
                ScoredCandidate {
                    chunk_id: row.get("chunk_id"),
                    document_id: row.get("document_id"),
                    position: position as usize,
                    text: row.get("text"),
                    score: cosine_similarity(query_vec, &vector),
                }
            })
            .collect();

        Ok(sort_and_truncate(candidates, limit))
    }
}

// ============ In-memory implementation ============

struct StoredChunk {
    chunk_id: String,
    document_id: String,
    position: usize,
    text: String,
}

struct StoredVector {
    chunk_id: String,
    model_id: String,
    pooling: String,
    vector: Vec<f32>,
}

/// In-memory index for tests: brute-force cosine over all stored vectors.
pub struct MemoryIndex {
    documents: RwLock<HashMap<String, Option<String>>>,
    chunks: RwLock<Vec<StoredChunk>>,
    vectors: RwLock<Vec<StoredVector>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
            chunks: RwLock::new(Vec::new()),
            vectors: RwLock::new(Vec::new()),
        }
    }

    /// Number of stored chunks, across all documents.
    pub fn chunk_count(&self) -> usize {
        self.chunks.read().unwrap().len()
    }
}

impl Default for MemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn contains_document(&self, document_id: &str) -> Result<bool, PipelineError> {
        Ok(self.documents.read().unwrap().contains_key(document_id))
    }

    async fn insert_document(
        &self,
        doc: &Document,
        chunks: &[Chunk],
        embeddings: &[Embedding],
    ) -> Result<(), PipelineError> {
        if chunks.len() != embeddings.len() {
            return Err(PipelineError::Store(format!(
                "{} chunks but {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }

        self.documents
            .write()
            .unwrap()
            .insert(doc.id.clone(), doc.title.clone());

        let mut stored_chunks = self.chunks.write().unwrap();
        let mut stored_vectors = self.vectors.write().unwrap();

        // Upsert by (document_id, position): drop any prior rows for this
        // document, then re-add.
        let old_ids: Vec<String> = stored_chunks
            .iter()
            .filter(|c| c.document_id == doc.id)
            .map(|c| c.chunk_id.clone())
            .collect();
        stored_chunks.retain(|c| c.document_id != doc.id);
        stored_vectors.retain(|v| !old_ids.contains(&v.chunk_id));

        for (chunk, embedding) in chunks.iter().zip(embeddings.iter()) {
            let chunk_id = Uuid::new_v4().to_string();
            stored_chunks.push(StoredChunk {
                chunk_id: chunk_id.clone(),
                document_id: chunk.document_id.clone(),
                position: chunk.position,
                text: chunk.text.clone(),
            });
            stored_vectors.push(StoredVector {
                chunk_id,
                model_id: embedding.model_id.clone(),
                pooling: embedding.pooling.as_str().to_string(),
                vector: embedding.vector.clone(),
            });
        }

        Ok(())
    }

    async fn search(
        &self,
        query_vec: &[f32],
        model_id: &str,
        pooling: &str,
        limit: usize,
    ) -> Result<Vec<ScoredCandidate>, PipelineError> {
        let vectors = self.vectors.read().unwrap();
        let chunks = self.chunks.read().unwrap();

        let candidates: Vec<ScoredCandidate> = vectors
            .iter()
            .filter(|v| v.model_id == model_id && v.pooling == pooling)
            .filter_map(|v| {
                let chunk = chunks.iter().find(|c| c.chunk_id == v.chunk_id)?;
                Some(ScoredCandidate {
                    chunk_id: chunk.chunk_id.clone(),
                    document_id: chunk.document_id.clone(),
                    position: chunk.position,
                    text: chunk.text.clone(),
                    score: cosine_similarity(query_vec, &v.vector),
                })
            })
            .collect();

        Ok(sort_and_truncate(candidates, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Block, PoolingMethod, TokenSpan};

    fn doc_with_chunks(text: &str) -> (Document, Vec<Chunk>, Vec<Embedding>) {
        let doc = Document::new(None, vec![Block::new(text, 0, Some(12.0))]);
        let chunk = Chunk {
            document_id: doc.id.clone(),
            position: 0,
            text: text.to_string(),
            token_span: TokenSpan {
                start: 0,
                end: crate::tokens::count(text),
            },
            heading_level: 0,
        };
        let embedding = Embedding {
            vector: vec![1.0, 0.0],
            model_id: "m1".to_string(),
            pooling: PoolingMethod::LateMean,
        };
        (doc, vec![chunk], vec![embedding])
    }

    #[test]
    fn blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }

    #[test]
    fn cosine_basics() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn memory_index_upsert_is_idempotent() {
        let index = MemoryIndex::new();
        let (doc, chunks, embeddings) = doc_with_chunks("hello world");

        index
            .insert_document(&doc, &chunks, &embeddings)
            .await
            .unwrap();
        index
            .insert_document(&doc, &chunks, &embeddings)
            .await
            .unwrap();

        assert_eq!(index.chunk_count(), 1);
        assert!(index.contains_document(&doc.id).await.unwrap());
    }

    #[tokio::test]
    async fn search_is_scoped_to_model_and_pooling() {
        let index = MemoryIndex::new();
        let (doc, chunks, embeddings) = doc_with_chunks("hello world");
        index
            .insert_document(&doc, &chunks, &embeddings)
            .await
            .unwrap();

        let hits = index
            .search(&[1.0, 0.0], "m1", "late-mean", 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        // Same vector under a different model id must not be visible.
        let misses = index
            .search(&[1.0, 0.0], "m2", "late-mean", 10)
            .await
            .unwrap();
        assert!(misses.is_empty());

        // Nor under a different pooling method.
        let misses = index
            .search(&[1.0, 0.0], "m1", "provider-pooled", 10)
            .await
            .unwrap();
        assert!(misses.is_empty());
    }

    #[tokio::test]
    async fn search_orders_by_descending_similarity() {
        let index = MemoryIndex::new();
        let doc = Document::new(None, vec![Block::new("a b c", 0, Some(12.0))]);
        let mk_chunk = |position: usize, text: &str| Chunk {
            document_id: doc.id.clone(),
            position,
            text: text.to_string(),
            token_span: TokenSpan {
                start: position,
                end: position + 1,
            },
            heading_level: 0,
        };
        let mk_embedding = |vector: Vec<f32>| Embedding {
            vector,
            model_id: "m1".to_string(),
            pooling: PoolingMethod::LateMean,
        };

        index
            .insert_document(
                &doc,
                &[mk_chunk(0, "a"), mk_chunk(1, "b"), mk_chunk(2, "c")],
                &[
                    mk_embedding(vec![0.0, 1.0]),
                    mk_embedding(vec![1.0, 0.0]),
                    mk_embedding(vec![0.7, 0.7]),
                ],
            )
            .await
            .unwrap();

        let hits = index
            .search(&[1.0, 0.0], "m1", "late-mean", 2)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].text, "b");
        assert_eq!(hits[1].text, "c");
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn mismatched_chunks_and_embeddings_are_rejected() {
        let index = MemoryIndex::new();
        let (doc, chunks, _) = doc_with_chunks("hello world");
        let err = index.insert_document(&doc, &chunks, &[]).await.unwrap_err();
        assert!(matches!(err, PipelineError::Store(_)));
    }
}

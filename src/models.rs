//! Core data models used throughout the pipeline.
//!
//! These types represent the documents, blocks, chunks, embeddings, and
//! retrieval results that flow from ingestion to context assembly.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Bounding geometry of a block on its page, in extractor coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

/// One extracted text span with layout metadata.
///
/// `font_size` may be absent at extraction time; `heading_level` is derived
/// (0 = body text) and only meaningful after layout inference has run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub text: String,
    pub page: usize,
    #[serde(default)]
    pub bbox: Option<BoundingBox>,
    #[serde(default)]
    pub font_size: Option<f32>,
    #[serde(default)]
    pub heading_level: u8,
}

impl Block {
    pub fn new(text: impl Into<String>, page: usize, font_size: Option<f32>) -> Self {
        Self {
            text: text.into(),
            page,
            bbox: None,
            font_size,
            heading_level: 0,
        }
    }
}

/// An ingested document: a stable content hash plus its ordered blocks.
///
/// Immutable once built; re-ingesting a document with the same hash is a
/// no-op at the store layer.
#[derive(Debug, Clone)]
pub struct Document {
    /// Stable content hash (SHA-256 over block texts and page indices).
    pub id: String,
    pub title: Option<String>,
    pub page_count: usize,
    pub blocks: Vec<Block>,
}

impl Document {
    /// Build a document from ordered blocks, deriving the content hash and
    /// page count.
    pub fn new(title: Option<String>, blocks: Vec<Block>) -> Self {
        let mut hasher = Sha256::new();
        for block in &blocks {
            hasher.update(block.text.as_bytes());
            hasher.update(block.page.to_le_bytes());
            hasher.update([0u8]);
        }
        let id = format!("{:x}", hasher.finalize());
        let page_count = blocks.iter().map(|b| b.page + 1).max().unwrap_or(0);

        Self {
            id,
            title,
            page_count,
            blocks,
        }
    }

    /// The document's canonical text: block texts joined with `\n`.
    ///
    /// Chunk char ranges index into this string, which is what makes the
    /// exact-partition invariant checkable.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for (i, block) in self.blocks.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&block.text);
        }
        out
    }
}

/// Half-open `[start, end)` range over a document's token stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSpan {
    pub start: usize,
    pub end: usize,
}

impl TokenSpan {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

/// A contiguous, non-overlapping span of one document.
///
/// The chunks of a document partition its canonical text exactly: the
/// ordered concatenation of chunk texts equals [`Document::text`].
#[derive(Debug, Clone)]
pub struct Chunk {
    pub document_id: String,
    /// Position of this chunk within its document, starting at 0.
    pub position: usize,
    pub text: String,
    pub token_span: TokenSpan,
    /// Heading level of the section this chunk belongs to (0 = body).
    pub heading_level: u8,
}

/// How a sequence of token vectors was reduced to one chunk vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolingMethod {
    /// Mean over the chunk's token range of a whole-span encoding.
    LateMean,
    /// The provider pooled the input itself (used for query vectors).
    ProviderPooled,
}

impl PoolingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolingMethod::LateMean => "late-mean",
            PoolingMethod::ProviderPooled => "provider-pooled",
        }
    }
}

/// A chunk vector tagged with the configuration that produced it.
///
/// Vectors from different `(model_id, pooling)` configurations are never
/// compared against each other.
#[derive(Debug, Clone)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub model_id: String,
    pub pooling: PoolingMethod,
}

/// A `(chunk, similarity score)` pair returned by a similarity query.
///
/// Scores are comparable only within one query.
#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub chunk_id: String,
    pub document_id: String,
    pub position: usize,
    pub text: String,
    pub score: f32,
}

impl ScoredCandidate {
    /// Token count of the candidate's text, used for budget accounting.
    pub fn token_count(&self) -> usize {
        crate::tokens::count(&self.text)
    }
}

/// A selected chunk inside a [`ContextSet`], annotated with its retrieval
/// score and, after reranking, a rerank score.
#[derive(Debug, Clone)]
pub struct ContextChunk {
    pub chunk_id: String,
    pub document_id: String,
    pub position: usize,
    pub text: String,
    pub retrieval_score: f32,
    pub rerank_score: Option<f32>,
}

impl From<ScoredCandidate> for ContextChunk {
    fn from(c: ScoredCandidate) -> Self {
        Self {
            chunk_id: c.chunk_id,
            document_id: c.document_id,
            position: c.position,
            text: c.text,
            retrieval_score: c.score,
            rerank_score: None,
        }
    }
}

/// Outcome class of one retrieval request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalStatus {
    /// Selection ran to completion.
    Complete,
    /// The index returned no candidates.
    Empty,
    /// A provider or store failure was absorbed; the set may be partial.
    Degraded(String),
}

/// The ordered context selected for one query.
#[derive(Debug, Clone)]
pub struct ContextSet {
    pub chunks: Vec<ContextChunk>,
    pub status: RetrievalStatus,
}

impl ContextSet {
    pub fn empty(status: RetrievalStatus) -> Self {
        Self {
            chunks: Vec::new(),
            status,
        }
    }
}

/// One request's query state: the raw text is always retained alongside the
/// adapted text, so adaptation is invertible for logging and evaluation.
#[derive(Debug, Clone)]
pub struct Query {
    pub raw: String,
    pub adapted: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_hash_is_stable() {
        let blocks = vec![
            Block::new("Title", 0, Some(18.0)),
            Block::new("Body text.", 0, Some(12.0)),
        ];
        let a = Document::new(Some("t".into()), blocks.clone());
        let b = Document::new(Some("t".into()), blocks);
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn document_hash_depends_on_content() {
        let a = Document::new(None, vec![Block::new("alpha", 0, None)]);
        let b = Document::new(None, vec![Block::new("beta", 0, None)]);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn document_hash_depends_on_block_boundaries() {
        // "ab" + "c" and "a" + "bc" must hash differently.
        let a = Document::new(
            None,
            vec![Block::new("ab", 0, None), Block::new("c", 0, None)],
        );
        let b = Document::new(
            None,
            vec![Block::new("a", 0, None), Block::new("bc", 0, None)],
        );
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn text_joins_blocks_with_newlines() {
        let doc = Document::new(
            None,
            vec![Block::new("one", 0, None), Block::new("two", 1, None)],
        );
        assert_eq!(doc.text(), "one\ntwo");
        assert_eq!(doc.page_count, 2);
    }
}

//! Late-chunking embedder.
//!
//! Embeds the longest possible contiguous token span of a document first,
//! then pools each chunk's vector from the token matrix afterward, so chunk
//! vectors are informed by neighboring chunks' tokens instead of seeing
//! their own text in isolation.
//!
//! Documents longer than the provider's input limit are encoded through
//! overlapping windows. The window stride keeps the overlap at least as
//! long as the longest chunk, which guarantees every chunk is fully
//! contained in at least one window; a chunk that straddles window
//! boundaries is pooled once per containing window and the pooled vectors
//! are averaged.

use crate::embedding::TokenEmbedder;
use crate::error::PipelineError;
use crate::models::{Chunk, Document, Embedding, PoolingMethod};
use crate::tokens;

/// Produce one embedding per chunk, in chunk order.
///
/// `chunks` must be the chunker's output for `doc`: token spans are
/// interpreted against the document's canonical token stream.
///
/// # Errors
///
/// - [`PipelineError::ChunkTooLargeForWindow`] when a chunk's token span
///   exceeds the provider's input limit (no window can contain it).
/// - Provider errors propagate unchanged.
pub async fn embed_chunks(
    doc: &Document,
    chunks: &[Chunk],
    embedder: &dyn TokenEmbedder,
) -> Result<Vec<Embedding>, PipelineError> {
    if chunks.is_empty() {
        return Ok(Vec::new());
    }

    let text = doc.text();
    let token_texts: Vec<String> = tokens::tokenize(&text)
        .iter()
        .map(|t| t.text.to_string())
        .collect();
    let total = token_texts.len();

    let window_tokens = embedder.max_input_tokens();
    let longest_chunk = chunks.iter().map(|c| c.token_span.len()).max().unwrap_or(0);

    if window_tokens > 0 && longest_chunk > window_tokens {
        let offender = chunks
            .iter()
            .find(|c| c.token_span.len() > window_tokens)
            .expect("longest chunk exceeds the window");
        return Err(PipelineError::ChunkTooLargeForWindow {
            position: offender.position,
            chunk_tokens: offender.token_span.len(),
            window_tokens,
        });
    }

    // Per-chunk accumulator: sum of pooled vectors and the number of
    // windows that contributed one.
    let mut sums: Vec<Vec<f32>> = vec![Vec::new(); chunks.len()];
    let mut contributions: Vec<usize> = vec![0; chunks.len()];

    for (start, end) in encode_windows(total, window_tokens, longest_chunk) {
        let matrix = embedder.embed_tokens(&token_texts[start..end]).await?;
        if matrix.len() != end - start {
            return Err(PipelineError::ProviderTransient {
                capability: "embedding",
                attempts: 1,
                message: format!(
                    "provider returned {} vectors for {} tokens",
                    matrix.len(),
                    end - start
                ),
            });
        }

        for (idx, chunk) in chunks.iter().enumerate() {
            let span = chunk.token_span;
            if span.is_empty() || span.start < start || span.end > end {
                continue;
            }
            let pooled = mean_rows(&matrix[span.start - start..span.end - start]);
            accumulate(&mut sums[idx], &pooled);
            contributions[idx] += 1;
        }
    }

    let mut embeddings = Vec::with_capacity(chunks.len());
    for (idx, chunk) in chunks.iter().enumerate() {
        let vector = if chunk.token_span.is_empty() {
            // Whitespace-only chunk: nothing to pool.
            vec![0.0; embedder.dims()]
        } else if contributions[idx] == 0 {
            return Err(PipelineError::ChunkTooLargeForWindow {
                position: chunk.position,
                chunk_tokens: chunk.token_span.len(),
                window_tokens,
            });
        } else {
            let n = contributions[idx] as f32;
            sums[idx].iter().map(|v| v / n).collect()
        };

        embeddings.push(Embedding {
            vector,
            model_id: embedder.model_id().to_string(),
            pooling: PoolingMethod::LateMean,
        });
    }

    Ok(embeddings)
}

/// Maximal encode windows over `total` tokens.
///
/// One window when everything fits; otherwise windows of `window_tokens`
/// advancing by `window_tokens - longest_chunk` so consecutive windows
/// overlap by at least the longest chunk's length.
fn encode_windows(total: usize, window_tokens: usize, longest_chunk: usize) -> Vec<(usize, usize)> {
    if total == 0 {
        return Vec::new();
    }
    if window_tokens == 0 || total <= window_tokens {
        return vec![(0, total)];
    }

    let stride = window_tokens.saturating_sub(longest_chunk).max(1);
    let mut windows = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + window_tokens).min(total);
        windows.push((start, end));
        if end >= total {
            break;
        }
        start += stride;
    }
    windows
}

/// Elementwise mean of a non-empty set of rows.
fn mean_rows(rows: &[Vec<f32>]) -> Vec<f32> {
    let dims = rows.first().map(|r| r.len()).unwrap_or(0);
    let mut out = vec![0.0f32; dims];
    for row in rows {
        for (acc, v) in out.iter_mut().zip(row.iter()) {
            *acc += v;
        }
    }
    let n = rows.len() as f32;
    for acc in &mut out {
        *acc /= n;
    }
    out
}

fn accumulate(sum: &mut Vec<f32>, pooled: &[f32]) {
    if sum.is_empty() {
        sum.extend_from_slice(pooled);
    } else {
        for (acc, v) in sum.iter_mut().zip(pooled.iter()) {
            *acc += v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Block, TokenSpan};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Deterministic fake: token `wN` embeds to `[N]`, so pooled means are
    /// directly checkable.
    struct IndexEmbedder {
        window: usize,
    }

    #[async_trait]
    impl TokenEmbedder for IndexEmbedder {
        fn model_id(&self) -> &str {
            "fake-index"
        }
        fn dims(&self) -> usize {
            1
        }
        fn max_input_tokens(&self) -> usize {
            self.window
        }

        async fn embed_tokens(&self, tokens: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
            Ok(tokens
                .iter()
                .map(|t| {
                    let n: f32 = t.trim_start_matches('w').parse().unwrap_or(0.0);
                    vec![n]
                })
                .collect())
        }

        async fn embed_pooled(&self, _text: &str) -> Result<Vec<f32>, PipelineError> {
            Ok(vec![0.0])
        }
    }

    /// Fake whose vectors depend on which encode call produced them, for
    /// observing cross-window averaging.
    struct CallCountingEmbedder {
        window: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenEmbedder for CallCountingEmbedder {
        fn model_id(&self) -> &str {
            "fake-calls"
        }
        fn dims(&self) -> usize {
            1
        }
        fn max_input_tokens(&self) -> usize {
            self.window
        }

        async fn embed_tokens(&self, tokens: &[String]) -> Result<Vec<Vec<f32>>, PipelineError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as f32;
            Ok(tokens.iter().map(|_| vec![call]).collect())
        }

        async fn embed_pooled(&self, _text: &str) -> Result<Vec<f32>, PipelineError> {
            Ok(vec![0.0])
        }
    }

    fn doc_of_words(n: usize) -> Document {
        let text = (0..n)
            .map(|i| format!("w{}", i))
            .collect::<Vec<_>>()
            .join(" ");
        Document::new(None, vec![Block::new(text, 0, Some(12.0))])
    }

    fn chunk_at(doc: &Document, position: usize, start: usize, end: usize) -> Chunk {
        Chunk {
            document_id: doc.id.clone(),
            position,
            text: String::new(),
            token_span: TokenSpan { start, end },
            heading_level: 0,
        }
    }

    #[tokio::test]
    async fn pooled_vector_is_mean_over_chunk_token_range() {
        let doc = doc_of_words(10);
        let chunks = vec![chunk_at(&doc, 0, 2, 5)];
        let embedder = IndexEmbedder { window: 512 };

        let embeddings = embed_chunks(&doc, &chunks, &embedder).await.unwrap();
        // Tokens w2, w3, w4 embed to [2], [3], [4]; the mean is 3.
        assert_eq!(embeddings.len(), 1);
        assert!((embeddings[0].vector[0] - 3.0).abs() < 1e-6);
        assert_eq!(embeddings[0].model_id, "fake-index");
        assert_eq!(embeddings[0].pooling, PoolingMethod::LateMean);
    }

    #[tokio::test]
    async fn windowed_pooling_matches_single_window_pooling() {
        // 10 tokens, window 6, longest chunk 2 -> windows (0,6) and (4,10).
        // The index fake is position-independent, so pooled values must be
        // identical to the unwindowed case.
        let doc = doc_of_words(10);
        let chunks = vec![
            chunk_at(&doc, 0, 0, 2),
            chunk_at(&doc, 1, 2, 4),
            chunk_at(&doc, 2, 4, 6),
            chunk_at(&doc, 3, 6, 8),
            chunk_at(&doc, 4, 8, 10),
        ];
        let windowed = IndexEmbedder { window: 6 };
        let whole = IndexEmbedder { window: 512 };

        let a = embed_chunks(&doc, &chunks, &windowed).await.unwrap();
        let b = embed_chunks(&doc, &chunks, &whole).await.unwrap();
        for (x, y) in a.iter().zip(b.iter()) {
            assert!((x.vector[0] - y.vector[0]).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn straddling_chunk_averages_over_containing_windows() {
        // Windows (0,6) and (4,10); the chunk [4,6) lies in both. The
        // call-counting fake embeds window 0 as 0.0 and window 1 as 1.0,
        // so the averaged vector is 0.5.
        let doc = doc_of_words(10);
        let chunks = vec![chunk_at(&doc, 0, 4, 6)];
        let embedder = CallCountingEmbedder {
            window: 6,
            calls: AtomicUsize::new(0),
        };

        let embeddings = embed_chunks(&doc, &chunks, &embedder).await.unwrap();
        assert!((embeddings[0].vector[0] - 0.5).abs() < 1e-6);
    }

    #[tokio::test]
    async fn oversized_chunk_is_an_error() {
        let doc = doc_of_words(12);
        let chunks = vec![chunk_at(&doc, 3, 0, 8)];
        let embedder = IndexEmbedder { window: 4 };

        let err = embed_chunks(&doc, &chunks, &embedder).await.unwrap_err();
        match err {
            PipelineError::ChunkTooLargeForWindow {
                position,
                chunk_tokens,
                window_tokens,
            } => {
                assert_eq!(position, 3);
                assert_eq!(chunk_tokens, 8);
                assert_eq!(window_tokens, 4);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn empty_chunk_list_is_a_no_op() {
        let doc = doc_of_words(4);
        let embedder = IndexEmbedder { window: 8 };
        let embeddings = embed_chunks(&doc, &[], &embedder).await.unwrap();
        assert!(embeddings.is_empty());
    }

    #[test]
    fn windows_cover_every_chunk_start() {
        let windows = encode_windows(100, 32, 8);
        assert_eq!(windows[0].0, 0);
        assert_eq!(windows.last().unwrap().1, 100);
        // Consecutive windows overlap by at least the longest chunk.
        for pair in windows.windows(2) {
            assert!(pair[0].1 >= pair[1].0 + 8);
        }
    }

    #[test]
    fn single_window_when_document_fits() {
        assert_eq!(encode_windows(50, 512, 10), vec![(0, 50)]);
    }
}

//! Structure-aware text chunker.
//!
//! Splits a document's block sequence into token-bounded [`Chunk`]s. Chunk
//! boundaries preferentially align with heading transitions recovered by
//! layout inference; sections that exceed the token budget split into
//! fixed-size sub-windows in document order, and an undersized trailing
//! chunk merges into its predecessor.
//!
//! Chunks are char ranges over the document's canonical text, so the
//! ordered concatenation of chunk texts equals the document text exactly:
//! no gaps, no overlap. Identical input always yields identical boundaries.

use crate::config::ChunkingConfig;
use crate::models::{Block, Chunk, Document, TokenSpan};
use crate::tokens;

/// Chunk a document whose blocks carry inferred heading levels.
pub fn chunk_document(doc: &Document, cfg: &ChunkingConfig) -> Vec<Chunk> {
    let text = doc.text();
    if text.is_empty() {
        return Vec::new();
    }

    let toks = tokens::tokenize(&text);
    let block_offsets = block_byte_offsets(&doc.blocks);
    let sections = split_sections(&doc.blocks);

    // Boundary set: byte offsets where one chunk ends and the next begins.
    // Section starts come first; oversized sections contribute sub-window
    // boundaries at token starts.
    let mut boundaries: Vec<usize> = vec![0];

    for section in &sections {
        let sec_start = block_offsets[section.first_block];
        let sec_end = section
            .last_block
            .checked_add(1)
            .filter(|&next| next < doc.blocks.len())
            .map(|next| block_offsets[next])
            .unwrap_or(text.len());

        if sec_start > 0 {
            boundaries.push(sec_start);
        }

        // Token range of this section. Tokens never straddle block
        // boundaries (the separator is whitespace), so these are exact.
        let ts = toks.partition_point(|t| t.start < sec_start);
        let te = toks.partition_point(|t| t.start < sec_end);
        let section_tokens = te - ts;

        if section_tokens > cfg.max_tokens {
            let mut window_count = section_tokens / cfg.max_tokens;
            let remainder = section_tokens % cfg.max_tokens;
            if remainder >= cfg.min_tokens {
                window_count += 1;
            }
            // window_count full-ish windows; the trailing remainder (if
            // below min_tokens) stays merged into the final window.
            for w in 1..window_count {
                boundaries.push(toks[ts + w * cfg.max_tokens].start);
            }
        }
    }

    boundaries.push(text.len());
    boundaries.sort_unstable();
    boundaries.dedup();

    let mut chunks = assemble_chunks(doc, &text, &toks, &boundaries, &sections, &block_offsets);
    merge_undersized_tail(&mut chunks, cfg.min_tokens);
    chunks
}

struct Section {
    first_block: usize,
    last_block: usize,
    level: u8,
}

/// Byte offset of each block's text within the canonical document text.
fn block_byte_offsets(blocks: &[Block]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(blocks.len());
    let mut pos = 0usize;
    for (i, block) in blocks.iter().enumerate() {
        if i > 0 {
            pos += 1; // '\n' separator, owned by the preceding chunk
        }
        offsets.push(pos);
        pos += block.text.len();
    }
    offsets
}

/// Group consecutive blocks into heading-delimited sections. Every block
/// with a heading level starts a new section; the section inherits that
/// level.
fn split_sections(blocks: &[Block]) -> Vec<Section> {
    let mut sections: Vec<Section> = Vec::new();
    for (i, block) in blocks.iter().enumerate() {
        let starts_section = i == 0 || block.heading_level > 0;
        if starts_section {
            sections.push(Section {
                first_block: i,
                last_block: i,
                level: block.heading_level,
            });
        } else {
            sections
                .last_mut()
                .expect("first block always opens a section")
                .last_block = i;
        }
    }
    sections
}

fn assemble_chunks(
    doc: &Document,
    text: &str,
    toks: &[tokens::Token<'_>],
    boundaries: &[usize],
    sections: &[Section],
    block_offsets: &[usize],
) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for pair in boundaries.windows(2) {
        let (start, end) = (pair[0], pair[1]);
        if start >= end {
            continue;
        }

        let span = TokenSpan {
            start: toks.partition_point(|t| t.start < start),
            end: toks.partition_point(|t| t.start < end),
        };

        let level = sections
            .iter()
            .rev()
            .find(|s| block_offsets[s.first_block] <= start)
            .map(|s| s.level)
            .unwrap_or(0);

        chunks.push(Chunk {
            document_id: doc.id.clone(),
            position: chunks.len(),
            text: text[start..end].to_string(),
            token_span: span,
            heading_level: level,
        });
    }

    chunks
}

/// Merge a trailing chunk below `min_tokens` into its predecessor so a
/// document never ends on a degenerate chunk.
fn merge_undersized_tail(chunks: &mut Vec<Chunk>, min_tokens: usize) {
    while chunks.len() > 1 {
        let last = chunks.last().expect("len > 1");
        if last.token_span.len() >= min_tokens {
            break;
        }
        let last = chunks.pop().expect("len > 1");
        let prev = chunks.last_mut().expect("len > 1 before pop");
        prev.text.push_str(&last.text);
        prev.token_span.end = last.token_span.end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout;
    use crate::models::Block;

    fn cfg(max_tokens: usize, min_tokens: usize) -> ChunkingConfig {
        ChunkingConfig {
            max_tokens,
            min_tokens,
        }
    }

    fn words(prefix: &str, n: usize) -> String {
        (0..n)
            .map(|i| format!("{}{}", prefix, i))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Two headed sections, each within budget, with body blocks.
    fn sectioned_doc() -> Document {
        let mut blocks = vec![
            Block::new("Introduction", 0, Some(18.0)),
            Block::new(words("intro", 20), 0, Some(12.0)),
            Block::new("Methods", 1, Some(18.0)),
            Block::new(words("method", 20), 1, Some(12.0)),
        ];
        layout::infer_blocks(&mut blocks).unwrap();
        Document::new(Some("paper".into()), blocks)
    }

    fn concat(chunks: &[Chunk]) -> String {
        chunks.iter().map(|c| c.text.as_str()).collect()
    }

    #[test]
    fn chunks_partition_document_text_exactly() {
        let doc = sectioned_doc();
        let chunks = chunk_document(&doc, &cfg(64, 4));
        assert!(!chunks.is_empty());
        assert_eq!(concat(&chunks), doc.text());
    }

    #[test]
    fn heading_transitions_become_boundaries() {
        let doc = sectioned_doc();
        let chunks = chunk_document(&doc, &cfg(64, 4));
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].text.starts_with("Introduction"));
        assert!(chunks[1].text.starts_with("Methods"));
        assert_eq!(chunks[0].heading_level, 1);
        assert_eq!(chunks[1].heading_level, 1);
    }

    #[test]
    fn token_spans_are_contiguous_and_cover_all_tokens() {
        let doc = sectioned_doc();
        let text = doc.text();
        let total = tokens::count(&text);
        let chunks = chunk_document(&doc, &cfg(16, 4));

        assert_eq!(chunks[0].token_span.start, 0);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].token_span.end, pair[1].token_span.start);
        }
        assert_eq!(chunks.last().unwrap().token_span.end, total);
    }

    #[test]
    fn oversized_section_splits_into_fixed_windows() {
        let mut blocks = vec![Block::new(words("w", 25), 0, Some(12.0))];
        layout::infer_blocks(&mut blocks).unwrap();
        let doc = Document::new(None, blocks);

        let chunks = chunk_document(&doc, &cfg(10, 2));
        // 25 tokens at 10 per window: 10 + 10 + 5.
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].token_span.len(), 10);
        assert_eq!(chunks[1].token_span.len(), 10);
        assert_eq!(chunks[2].token_span.len(), 5);
        assert_eq!(concat(&chunks), doc.text());
    }

    #[test]
    fn undersized_trailing_window_merges_into_predecessor() {
        let mut blocks = vec![Block::new(words("w", 12), 0, Some(12.0))];
        layout::infer_blocks(&mut blocks).unwrap();
        let doc = Document::new(None, blocks);

        // 12 tokens, max 10, min 4: the 2-token tail folds back.
        let chunks = chunk_document(&doc, &cfg(10, 4));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].token_span.len(), 12);
    }

    #[test]
    fn undersized_trailing_section_merges_into_predecessor() {
        let mut blocks = vec![
            Block::new(words("body", 20), 0, Some(12.0)),
            Block::new("Appendix", 0, Some(18.0)),
        ];
        layout::infer_blocks(&mut blocks).unwrap();
        let doc = Document::new(None, blocks);

        let chunks = chunk_document(&doc, &cfg(64, 4));
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].text.ends_with("Appendix"));
        assert_eq!(concat(&chunks), doc.text());
    }

    #[test]
    fn chunking_is_deterministic() {
        let doc = sectioned_doc();
        let a = chunk_document(&doc, &cfg(16, 4));
        let b = chunk_document(&doc, &cfg(16, 4));
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            assert_eq!(x.text, y.text);
            assert_eq!(x.token_span, y.token_span);
            assert_eq!(x.position, y.position);
        }
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let doc = Document::new(None, Vec::new());
        assert!(chunk_document(&doc, &cfg(16, 4)).is_empty());
    }

    #[test]
    fn positions_are_contiguous_from_zero() {
        let doc = sectioned_doc();
        let chunks = chunk_document(&doc, &cfg(8, 2));
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.position, i);
        }
    }
}

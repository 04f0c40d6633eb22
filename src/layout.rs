//! Layout inference: recovers missing font sizes and derives heading levels.
//!
//! PDF text extraction frequently loses font metadata for some or all
//! blocks. This module completes the font-size assignment by propagating
//! from same-page neighbors and then ranks distinct sizes to recover the
//! document's heading structure, which the chunker uses for boundary
//! placement.
//!
//! Missing or malformed metadata never fails a document; the only fatal
//! condition is a document with zero blocks.

use crate::error::PipelineError;
use crate::models::{Block, Document};

/// Nominal body size assigned when a document carries no usable font
/// metadata at all. Such a document ends up uniform, so it yields no
/// headings.
const FALLBACK_BODY_SIZE: f32 = 12.0;

/// Heading levels deeper than this clamp to it.
const MAX_HEADING_LEVEL: u8 = 6;

/// Complete the font-size assignment and derive a heading level for every
/// block of `doc`.
///
/// Blocks that already carry a valid font size are left unchanged (identity
/// on fully-annotated documents). A block missing its size receives the
/// median of the nearest preceding and following same-page blocks with
/// known sizes, falling back to the document-wide median, then to
/// [`FALLBACK_BODY_SIZE`].
///
/// # Errors
///
/// [`PipelineError::EmptyDocument`] if the document has zero blocks.
pub fn infer_layout(doc: &mut Document) -> Result<(), PipelineError> {
    infer_blocks(&mut doc.blocks)
}

/// Same as [`infer_layout`], operating directly on a block slice.
pub fn infer_blocks(blocks: &mut [Block]) -> Result<(), PipelineError> {
    if blocks.is_empty() {
        return Err(PipelineError::EmptyDocument);
    }

    // Known sizes are captured before any assignment so propagation never
    // chains off an inferred value.
    let known: Vec<Option<f32>> = blocks.iter().map(|b| valid_size(b.font_size)).collect();
    let doc_median = median(known.iter().filter_map(|s| *s));

    for idx in 0..blocks.len() {
        if known[idx].is_some() {
            // Keep the extractor's value verbatim.
            blocks[idx].font_size = known[idx];
            continue;
        }

        let page = blocks[idx].page;
        let prev = (0..idx)
            .rev()
            .find(|&i| blocks[i].page == page && known[i].is_some())
            .and_then(|i| known[i]);
        let next = (idx + 1..blocks.len())
            .find(|&i| blocks[i].page == page && known[i].is_some())
            .and_then(|i| known[i]);

        let inferred = match (prev, next) {
            (Some(a), Some(b)) => (a + b) / 2.0,
            (Some(a), None) | (None, Some(a)) => a,
            (None, None) => doc_median.unwrap_or(FALLBACK_BODY_SIZE),
        };
        blocks[idx].font_size = Some(inferred);
    }

    assign_heading_levels(blocks);
    Ok(())
}

/// Treat NaN, infinite, and non-positive sizes as missing so malformed
/// metadata degrades instead of aborting the document.
fn valid_size(size: Option<f32>) -> Option<f32> {
    size.filter(|s| s.is_finite() && *s > 0.0)
}

/// Median of an iterator of sizes (mean of the middle pair for even
/// counts). `None` when the iterator is empty.
fn median(sizes: impl Iterator<Item = f32>) -> Option<f32> {
    let mut values: Vec<f32> = sizes.collect();
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

/// Font sizes are grouped at 0.1pt granularity when ranking, so extractor
/// jitter does not fabricate heading tiers.
fn size_key(size: f32) -> i64 {
    (size * 10.0).round() as i64
}

/// Rank distinct font sizes and assign heading levels.
///
/// The modal (most frequent) size is body text, level 0; sizes larger than
/// the modal size get level 1.. in descending size order; sizes at or below
/// the modal size are body text. A uniform document yields no headings.
fn assign_heading_levels(blocks: &mut [Block]) {
    let mut counts: Vec<(i64, usize)> = Vec::new();
    for block in blocks.iter() {
        let key = size_key(block.font_size.unwrap_or(FALLBACK_BODY_SIZE));
        match counts.iter_mut().find(|(k, _)| *k == key) {
            Some((_, n)) => *n += 1,
            None => counts.push((key, 1)),
        }
    }

    // Modal size; ties resolve toward the smaller size, since body text is
    // at least as frequent as any heading tier.
    let modal_key = counts
        .iter()
        .copied()
        .max_by(|(ka, na), (kb, nb)| na.cmp(nb).then(kb.cmp(ka)))
        .map(|(k, _)| k)
        .unwrap_or_else(|| size_key(FALLBACK_BODY_SIZE));

    let mut heading_keys: Vec<i64> = counts
        .iter()
        .map(|(k, _)| *k)
        .filter(|k| *k > modal_key)
        .collect();
    heading_keys.sort_unstable_by(|a, b| b.cmp(a));

    for block in blocks.iter_mut() {
        let key = size_key(block.font_size.unwrap_or(FALLBACK_BODY_SIZE));
        block.heading_level = heading_keys
            .iter()
            .position(|k| *k == key)
            .map(|rank| (rank as u8).saturating_add(1).min(MAX_HEADING_LEVEL))
            .unwrap_or(0);
    }
}

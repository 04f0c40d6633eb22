//! Adaptive top-k selection.
//!
//! Instead of a fixed top-k, the selector keeps a prefix of the
//! similarity-ranked candidates sized by the score distribution: a sharp
//! relative drop between consecutive scores marks the start of the
//! low-relevance tail and stops extension, as do the token budget and the
//! configured `max_k`. Candidates tied with the score at the cutoff are
//! kept even past `max_k`, so equally relevant chunks are never dropped
//! arbitrarily.

use crate::config::SelectionConfig;
use crate::models::ScoredCandidate;

/// Upper bound on how many tied candidates may be kept past the cutoff, so
/// a flat score distribution cannot grow the slack without bound.
const MAX_TIE_SLACK: usize = 3;

/// Select the prefix of `candidates` (already sorted by descending score)
/// to keep for one query.
pub fn select_adaptive(
    candidates: &[ScoredCandidate],
    config: &SelectionConfig,
) -> Vec<ScoredCandidate> {
    if candidates.is_empty() {
        return Vec::new();
    }
    if candidates.len() <= config.min_k {
        return candidates.to_vec();
    }

    // The first min_k candidates are guaranteed regardless of budget.
    let mut keep = config.min_k;
    let mut token_count: usize = candidates[..keep].iter().map(|c| c.token_count()).sum();

    while keep < candidates.len() {
        if keep >= config.max_k {
            break;
        }
        let next = &candidates[keep];
        if token_count + next.token_count() > config.token_budget {
            break;
        }
        if relative_drop(candidates[keep - 1].score, next.score) >= config.relative_drop {
            break;
        }
        token_count += next.token_count();
        keep += 1;
    }

    // Include score ties at the cutoff, up to the bounded slack.
    let cutoff_score = candidates[keep - 1].score;
    let tie_cap = keep + MAX_TIE_SLACK;
    while keep < candidates.len() && keep < tie_cap && candidates[keep].score == cutoff_score {
        keep += 1;
    }

    candidates[..keep].to_vec()
}

/// Relative gap between two consecutive descending scores, in `[0, 1]`
/// for positive scores. Non-positive leading scores produce no gap signal.
fn relative_drop(prev: f32, next: f32) -> f32 {
    if prev <= 0.0 {
        return 0.0;
    }
    ((prev - next) / prev).max(0.0)
}

//! Query adaptation.
//!
//! Minimal, stateless transformation of the raw user query before it is
//! embedded: whitespace and punctuation normalization plus light synonym
//! expansion from the configured map. The raw text is always retained on
//! the resulting [`Query`], so the adaptation is invertible for logging and
//! evaluation.

use std::collections::HashMap;

use crate::config::QueryConfig;
use crate::models::Query;

pub struct QueryAdapter {
    expansions: HashMap<String, Vec<String>>,
}

impl QueryAdapter {
    pub fn new(config: &QueryConfig) -> Self {
        Self {
            expansions: config.expansions.clone(),
        }
    }

    /// Normalize `raw` and append expansion terms for any matched entries.
    pub fn adapt(&self, raw: &str) -> Query {
        let mut terms: Vec<String> = raw
            .split_whitespace()
            .map(normalize_term)
            .filter(|t| !t.is_empty())
            .collect();

        let mut expanded: Vec<String> = Vec::new();
        for term in &terms {
            if let Some(extra) = self.expansions.get(term) {
                for e in extra {
                    let e = normalize_term(e);
                    if !e.is_empty() && !terms.contains(&e) && !expanded.contains(&e) {
                        expanded.push(e);
                    }
                }
            }
        }
        terms.extend(expanded);

        Query {
            raw: raw.to_string(),
            adapted: terms.join(" "),
        }
    }
}

/// Lowercase and strip leading/trailing punctuation; interior punctuation
/// (hyphens, apostrophes) is preserved.
fn normalize_term(term: &str) -> String {
    term.trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

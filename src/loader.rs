//! Document loading.
//!
//! Walks the configured ingest root and builds [`Document`]s from three
//! input shapes:
//!
//! - `*.blocks.json` — pre-extracted blocks with layout metadata (page,
//!   bounding box, optional font size); the richest input.
//! - `*.pdf` — text extracted in-process. PDF text extraction carries no
//!   font sizes, so every block arrives unannotated and layout inference
//!   fills the gap.
//! - `*.md` / `*.txt` — plain text split into paragraph blocks.
//!
//! Files that fail to read or parse are skipped with a warning; the rest of
//! the batch proceeds. Ordering is deterministic (sorted by relative path).

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Deserialize;
use std::path::Path;
use walkdir::WalkDir;

use crate::config::IngestConfig;
use crate::error::PipelineError;
use crate::models::{Block, Document};

/// Scan the ingest root and load every matching file as a document.
///
/// Returns `(relative path, document)` pairs in path order.
pub fn load_documents(config: &IngestConfig) -> Result<Vec<(String, Document)>> {
    let root = &config.root;
    if !root.exists() {
        bail!("Ingest root does not exist: {}", root.display());
    }

    let include_set = build_globset(&config.include_globs)?;

    let mut default_excludes = vec!["**/.git/**".to_string(), "**/target/**".to_string()];
    default_excludes.extend(config.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut paths = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path().to_path_buf();
        let relative = path.strip_prefix(root).unwrap_or(&path);
        let rel_str = relative.to_string_lossy().to_string();

        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }
        paths.push((rel_str, path));
    }
    paths.sort_by(|a, b| a.0.cmp(&b.0));

    let mut documents = Vec::new();
    for (rel_str, path) in paths {
        match load_file(&path) {
            Ok(doc) => documents.push((rel_str, doc)),
            Err(e) => eprintln!("Warning: skipping {}: {}", rel_str, e),
        }
    }

    Ok(documents)
}

fn load_file(path: &Path) -> Result<Document> {
    let title = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string());
    let name = path.to_string_lossy();

    if name.ends_with(".blocks.json") {
        let content = std::fs::read_to_string(path)?;
        let file: BlockFile = serde_json::from_str(&content)?;
        return Ok(Document::new(file.title.or(title), file.blocks));
    }

    if name.ends_with(".pdf") {
        let bytes = std::fs::read(path)?;
        let text = pdf_extract::extract_text_from_mem(&bytes)
            .map_err(|e| PipelineError::Extraction(e.to_string()))?;
        return Ok(Document::new(title, paged_text_to_blocks(&text)));
    }

    let text = std::fs::read_to_string(path)?;
    Ok(Document::new(title, text_to_blocks(&text, 0)))
}

/// Pre-extracted block file: `{ "title": ..., "blocks": [...] }`.
#[derive(Deserialize)]
struct BlockFile {
    #[serde(default)]
    title: Option<String>,
    blocks: Vec<Block>,
}

/// Split extracted text into blocks, treating form feeds as page breaks.
fn paged_text_to_blocks(text: &str) -> Vec<Block> {
    let mut blocks = Vec::new();
    for (page, page_text) in text.split('\u{c}').enumerate() {
        blocks.extend(text_to_blocks(page_text, page));
    }
    blocks
}

/// Split plain text into paragraph blocks on blank lines. No font metadata
/// is available at this point.
fn text_to_blocks(text: &str, page: usize) -> Vec<Block> {
    text.split("\n\n")
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| Block::new(p, page, None))
        .collect()
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

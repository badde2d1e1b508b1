//! Filesystem document loader.
//!
//! Walks `data.root`, keeps files matching the include globs and not the
//! exclude globs, extracts and cleans their text, and returns
//! [`Document`]s sorted by `source_id`.
//!
//! The `source_id` is the path relative to `data.root`, `/`-separated
//! (`reports/report.pdf`), so chunk ids read `reports/report.pdf:0` however
//! the root itself is spelled.

use std::path::{Component, Path};

use anyhow::{bail, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use tracing::{debug, warn};
use walkdir::WalkDir;

use evidence_harness_core::models::Document;

use crate::config::Config;
use crate::extract::{clean_text, extract_file, structure_sections};

/// Result of one scan.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub documents: Vec<Document>,
    /// Files matched by the globs but skipped because extraction failed or
    /// produced no text.
    pub skipped: Vec<String>,
}

pub fn scan_documents(config: &Config) -> Result<ScanReport> {
    let data = &config.data;
    let root = &data.root;
    if !root.exists() {
        bail!("Data root does not exist: {}", root.display());
    }

    let include_set = build_globset(&data.include_globs)?;

    let mut default_excludes = vec!["**/.git/**".to_string(), "**/.*".to_string()];
    default_excludes.extend(data.exclude_globs.clone());
    let exclude_set = build_globset(&default_excludes)?;

    let mut report = ScanReport::default();

    let walker = WalkDir::new(root).follow_links(data.follow_symlinks);
    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative_id(relative);

        // Apply exclude patterns
        if exclude_set.is_match(&rel_str) {
            continue;
        }

        // Apply include patterns
        if !include_set.is_match(&rel_str) {
            continue;
        }

        let source_id = rel_str;
        match extract_file(path) {
            Ok(raw) => {
                let cleaned = clean_text(&raw);
                if cleaned.is_empty() {
                    warn!(source = %source_id, "no text extracted, skipping");
                    report.skipped.push(source_id);
                    continue;
                }
                let text = structure_sections(&cleaned, &config.chunking.section_markers);
                debug!(source = %source_id, chars = text.len(), "loaded document");
                report.documents.push(Document { source_id, text });
            }
            Err(e) => {
                warn!(source = %source_id, error = %e, "extraction failed, skipping");
                report.skipped.push(source_id);
            }
        }
    }

    // Sort for deterministic ordering
    report.documents.sort_by(|a, b| a.source_id.cmp(&b.source_id));
    report.skipped.sort();

    Ok(report)
}

/// `/`-joined normal components, so `./a/b.txt` and `a/b.txt` agree.
fn relative_id(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

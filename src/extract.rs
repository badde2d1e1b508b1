//! Text extraction and cleanup for source files.
//!
//! PDFs go through `pdf-extract`; everything else the loader accepts is
//! read as UTF-8. Extraction failures are returned, never panicked on, and
//! the loader skips the offending file.

use std::path::Path;

/// Heading given to the text before the first section marker.
pub const PREAMBLE_LABEL: &str = "Basic Information";

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("PDF extraction failed: {0}")]
    Pdf(String),

    #[error("file is not valid UTF-8: {0}")]
    NotUtf8(String),

    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
}

/// Extract the raw text of a file, choosing the extractor by extension.
pub fn extract_file(path: &Path) -> Result<String, ExtractError> {
    let bytes = std::fs::read(path)?;
    let is_pdf = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);

    if is_pdf {
        extract_pdf(&bytes)
    } else {
        String::from_utf8(bytes).map_err(|_| ExtractError::NotUtf8(path.display().to_string()))
    }
}

pub fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

/// Collapse every whitespace run (including newlines) into one space.
pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Reorganise `text` into labelled sections split at `markers`.
///
/// When the first marker occurs in `text`, the result is
///
/// ```text
/// Basic Information:
/// <text before the first marker>
///
/// <marker 1>:
/// <text up to marker 2>
/// ...
/// ```
///
/// A marker missing from the remaining text leaves its predecessor holding
/// the rest, and later sections empty. If `markers` is empty or the first
/// marker is absent, `text` is returned unchanged.
pub fn structure_sections(text: &str, markers: &[String]) -> String {
    let Some(first) = markers.first() else {
        return text.to_string();
    };
    let Some((preamble, mut rest)) = text.split_once(first.as_str()) else {
        return text.to_string();
    };

    let mut out = format!("{}:\n{}", PREAMBLE_LABEL, preamble.trim());
    for (i, marker) in markers.iter().enumerate() {
        let next = markers.get(i + 1).and_then(|next| rest.split_once(next.as_str()));
        let body = match next {
            Some((body, tail)) => {
                rest = tail;
                body
            }
            None => std::mem::take(&mut rest),
        };
        out.push_str(&format!("\n\n{}:\n{}", marker, body.trim()));
    }
    out
}

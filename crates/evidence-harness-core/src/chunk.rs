//! Recursive-separator text splitter.
//!
//! Splits cleaned document text into overlapping pieces of at most
//! `chunk_size` characters, then stamps them as identified [`Chunk`]s.
//!
//! # Algorithm
//!
//! 1. Pick the coarsest separator present in the text, trying
//!    `"\n\n"`, `"\n"`, `". "`, `" "`, then single characters.
//! 2. Split on it. Pieces that fit are merged greedily back together
//!    (re-joined with the separator) until the next piece would overflow.
//! 3. When a merged chunk is emitted, the tail of it (up to
//!    `chunk_overlap` characters worth of whole pieces) seeds the next one.
//! 4. Pieces that are still too large are split again with the next
//!    finer separator.
//!
//! Sizes are counted in `char`s, so multi-byte text never splits inside a
//! code point.
//!
//! # Example
//!
//! ```rust
//! use evidence_harness_core::chunk::split_text;
//!
//! let pieces = split_text("First paragraph.\n\nSecond paragraph.", 600, 100);
//! assert_eq!(pieces.len(), 1);
//! ```

use std::collections::VecDeque;

use crate::chunk_id::assign_sequence_indices;
use crate::models::{Chunk, Document};

const SEPARATORS: [&str; 5] = ["\n\n", "\n", ". ", " ", ""];

/// Split text into pieces of at most `chunk_size` characters.
///
/// Returns an empty vector for blank text. `chunk_overlap` should be
/// smaller than `chunk_size`; larger values are capped to it.
pub fn split_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    if text.trim().is_empty() || chunk_size == 0 {
        return Vec::new();
    }
    let overlap = chunk_overlap.min(chunk_size);
    split_recursive(text, &SEPARATORS, chunk_size, overlap)
}

/// Split every document and assign chunk identifiers in extraction order.
pub fn chunk_documents(docs: &[Document], chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    let pieces = docs.iter().flat_map(|doc| {
        split_text(&doc.text, chunk_size, chunk_overlap)
            .into_iter()
            .map(move |piece| (doc.source_id.clone(), piece))
    });
    assign_sequence_indices(pieces)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn split_recursive(text: &str, separators: &[&str], size: usize, overlap: usize) -> Vec<String> {
    let position = separators
        .iter()
        .position(|sep| sep.is_empty() || text.contains(sep))
        .unwrap_or(separators.len() - 1);
    let separator = separators[position];
    let finer = &separators[position + 1..];

    let splits: Vec<String> = if separator.is_empty() {
        text.chars().map(String::from).collect()
    } else {
        text.split(separator)
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
            .collect()
    };

    let mut out = Vec::new();
    let mut fitting: Vec<String> = Vec::new();

    for piece in splits {
        if char_len(&piece) <= size {
            fitting.push(piece);
            continue;
        }
        if !fitting.is_empty() {
            out.extend(merge_splits(&fitting, separator, size, overlap));
            fitting.clear();
        }
        if finer.is_empty() {
            out.push(piece.trim().to_string());
        } else {
            out.extend(split_recursive(&piece, finer, size, overlap));
        }
    }

    if !fitting.is_empty() {
        out.extend(merge_splits(&fitting, separator, size, overlap));
    }

    out
}

fn merge_splits(splits: &[String], separator: &str, size: usize, overlap: usize) -> Vec<String> {
    let sep_len = char_len(separator);
    let mut chunks = Vec::new();
    let mut current: VecDeque<&str> = VecDeque::new();
    let mut total = 0usize;

    for piece in splits {
        let len = char_len(piece);
        let joiner = if current.is_empty() { 0 } else { sep_len };

        if total + joiner + len > size && !current.is_empty() {
            push_joined(&current, separator, &mut chunks);

            // Drop pieces from the front until only the overlap window remains
            // and the incoming piece fits.
            loop {
                let joiner = if current.is_empty() { 0 } else { sep_len };
                let must_shrink = total > overlap || (total > 0 && total + joiner + len > size);
                if !must_shrink {
                    break;
                }
                let Some(first) = current.pop_front() else {
                    break;
                };
                total -= char_len(first);
                if !current.is_empty() {
                    total -= sep_len;
                }
            }
        }

        if !current.is_empty() {
            total += sep_len;
        }
        total += len;
        current.push_back(piece);
    }

    push_joined(&current, separator, &mut chunks);
    chunks
}

fn push_joined(parts: &VecDeque<&str>, separator: &str, out: &mut Vec<String>) {
    let joined = parts.iter().copied().collect::<Vec<_>>().join(separator);
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
}

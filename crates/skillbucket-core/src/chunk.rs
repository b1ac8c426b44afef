//! Paragraph-boundary text chunker.
//!
//! Splits extracted document text into [`TextChunk`]s that respect a
//! configurable `max_tokens` limit. Splitting occurs on paragraph
//! boundaries (`\n\n`) so a skill description and its level text stay
//! together where they fit.
//!
//! # Algorithm
//!
//! 1. Convert `max_tokens` to `max_chars` using a 4 chars/token ratio.
//! 2. Split text on `\n\n` paragraph boundaries.
//! 3. Accumulate paragraphs into a buffer until adding the next paragraph
//!    would exceed `max_chars`, then flush.
//! 4. A single paragraph longer than `max_chars` is hard-split at the
//!    nearest newline or space boundary.
//!
//! # Example
//!
//! ```rust
//! use skillbucket_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("PROG\n\nLevel 4: Designs, codes, tests.", 700);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].index, 0);
//! ```

use sha2::{Digest, Sha256};

/// Approximate characters-per-token ratio.
const CHARS_PER_TOKEN: usize = 4;

/// One piece of chunked text, before it becomes a
/// [`KnowledgeChunk`](crate::models::KnowledgeChunk).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Contiguous position within the source, starting at 0.
    pub index: usize,
    pub text: String,
    /// SHA-256 of `text`, lowercase hex.
    pub hash: String,
}

/// Split text into chunks on paragraph boundaries, respecting `max_tokens`.
///
/// Never produces blank chunks; blank input yields an empty vector.
pub fn chunk_text(text: &str, max_tokens: usize) -> Vec<TextChunk> {
    let max_chars = (max_tokens * CHARS_PER_TOKEN).max(1);
    let mut chunks = Vec::new();
    let mut current_buf = String::new();

    for para in text.split("\n\n") {
        let trimmed = para.trim();
        if trimmed.is_empty() {
            continue;
        }

        let would_be = if current_buf.is_empty() {
            trimmed.len()
        } else {
            current_buf.len() + 2 + trimmed.len()
        };

        if would_be > max_chars && !current_buf.is_empty() {
            push_chunk(&mut chunks, &current_buf);
            current_buf.clear();
        }

        if trimmed.len() > max_chars {
            hard_split(&mut chunks, trimmed, max_chars);
        } else {
            if !current_buf.is_empty() {
                current_buf.push_str("\n\n");
            }
            current_buf.push_str(trimmed);
        }
    }

    if !current_buf.is_empty() {
        push_chunk(&mut chunks, &current_buf);
    }

    chunks
}

fn hard_split(chunks: &mut Vec<TextChunk>, paragraph: &str, max_chars: usize) {
    let mut remaining = paragraph;
    while !remaining.is_empty() {
        let limit = snap_to_char_boundary(remaining, remaining.len().min(max_chars));
        let split_at = if limit < remaining.len() {
            remaining[..limit]
                .rfind('\n')
                .or_else(|| remaining[..limit].rfind(' '))
                .map(|pos| pos + 1)
                .unwrap_or(limit)
        } else {
            limit
        };
        // A single char wider than max_chars still has to make progress.
        let split_at = if split_at == 0 {
            remaining
                .char_indices()
                .nth(1)
                .map(|(i, _)| i)
                .unwrap_or(remaining.len())
        } else {
            split_at
        };
        let piece = remaining[..split_at].trim();
        if !piece.is_empty() {
            push_chunk(chunks, piece);
        }
        remaining = &remaining[split_at..];
    }
}

/// Snap a byte index back to the nearest valid UTF-8 char boundary.
fn snap_to_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    let mut i = index;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn push_chunk(chunks: &mut Vec<TextChunk>, text: &str) {
    chunks.push(TextChunk {
        index: chunks.len(),
        text: text.to_string(),
        hash: content_hash(text.as_bytes()),
    });
}

/// SHA-256 of `bytes` as lowercase hex.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

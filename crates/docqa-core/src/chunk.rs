//! Boundary-aware text chunker.
//!
//! Splits normalized document text into [`Chunk`]s of at most `max_chars`
//! characters, cutting on the largest semantic boundary that fits.
//!
//! # Algorithm
//!
//! 1. If the text fits in `max_chars`, it is one chunk.
//! 2. Otherwise split it on the current boundary level, keeping each
//!    separator attached to the piece before it: paragraphs (`\n\n`), then
//!    lines (`\n`), then sentences (`.`, `!`, `?` followed by a space), then
//!    words (` `).
//! 3. Greedily merge consecutive pieces while the merged span still fits.
//! 4. A piece that is too long on its own recurses to the next level,
//!    unless only its trailing separator pushes it over: then the body is
//!    cut at the bound and the separator starts the next span.
//! 5. A single word longer than `max_chars` has nothing left to split on
//!    and is emitted whole as an oversized chunk.
//!
//! Every chunk is a contiguous slice of the input, so with zero overlap the
//! chunks concatenated in order reproduce the input exactly.
//!
//! # Example
//!
//! ```rust
//! use docqa_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("notes.txt", "Hello world.\n\nSecond paragraph.", 500, 0);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].chunk_index, 0);
//! ```

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::Chunk;

/// Default maximum chunk size in characters.
pub const DEFAULT_MAX_CHARS: usize = 500;

#[derive(Debug, Clone, Copy)]
enum Boundary {
    Paragraph,
    Line,
    Sentence,
    Word,
}

const BOUNDARIES: [Boundary; 4] = [
    Boundary::Paragraph,
    Boundary::Line,
    Boundary::Sentence,
    Boundary::Word,
];

impl Boundary {
    /// Split `text` into contiguous pieces, each ending with its separator.
    fn split(self, text: &str) -> Vec<&str> {
        match self {
            Boundary::Paragraph => text.split_inclusive("\n\n").collect(),
            Boundary::Line => text.split_inclusive('\n').collect(),
            Boundary::Sentence => split_sentences(text),
            Boundary::Word => text.split_inclusive(' ').collect(),
        }
    }
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut prev_terminal = false;
    for (i, c) in text.char_indices() {
        if prev_terminal && c == ' ' {
            let end = i + c.len_utf8();
            pieces.push(&text[start..end]);
            start = end;
        }
        prev_terminal = matches!(c, '.' | '!' | '?');
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split `text` into contiguous spans of at most `max_chars` characters.
///
/// Spans longer than `max_chars` only occur for single words that cannot
/// be split further.
pub fn split_text(text: &str, max_chars: usize) -> Vec<&str> {
    let mut out = Vec::new();
    split_into(text, max_chars.max(1), 0, &mut out);
    out
}

fn split_into<'a>(text: &'a str, max_chars: usize, level: usize, out: &mut Vec<&'a str>) {
    if text.is_empty() {
        return;
    }
    if char_len(text) <= max_chars {
        out.push(text);
        return;
    }
    let Some(boundary) = BOUNDARIES.get(level) else {
        out.push(text);
        return;
    };

    let mut span_start = 0;
    let mut span_end = 0;
    let mut span_chars = 0;
    for piece in boundary.split(text) {
        let piece_start = span_end;
        let piece_end = piece_start + piece.len();
        let piece_chars = char_len(piece);

        if piece_chars > max_chars {
            // Over the bound only because of its trailing separator: emit the
            // body and carry the separator into the next span.
            let body = piece.trim_end_matches([' ', '\n']);
            let body_chars = char_len(body);
            if !body.is_empty() && body_chars <= max_chars {
                if span_chars + body_chars > max_chars && span_end > span_start {
                    out.push(&text[span_start..span_end]);
                    span_start = piece_start;
                }
                let body_end = piece_start + body.len();
                out.push(&text[span_start..body_end]);
                span_start = body_end;
                span_end = piece_end;
                span_chars = piece_chars - body_chars;
                continue;
            }
            if span_end > span_start {
                out.push(&text[span_start..span_end]);
            }
            split_into(piece, max_chars, level + 1, out);
            span_start = piece_end;
            span_end = piece_end;
            span_chars = 0;
            continue;
        }

        if span_chars + piece_chars > max_chars && span_end > span_start {
            out.push(&text[span_start..span_end]);
            span_start = piece_start;
            span_chars = 0;
        }
        span_end = piece_end;
        span_chars += piece_chars;
    }
    if span_end > span_start {
        out.push(&text[span_start..span_end]);
    }
}

/// Last `n` characters of `s`, on a char boundary.
fn tail_chars(s: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match s.char_indices().rev().nth(n - 1) {
        Some((i, _)) => &s[i..],
        None => s,
    }
}

/// Chunk `text` for the document `document_id`.
///
/// With `overlap_chars == 0` the chunks partition the text. With a positive
/// overlap, spans are cut at `max_chars - overlap_chars` and every chunk
/// after the first is prefixed with the last `overlap_chars` characters of
/// the span before it, so the size bound still holds.
///
/// Returns chunks with contiguous indices starting at 0. Empty text yields
/// no chunks.
pub fn chunk_text(
    document_id: &str,
    text: &str,
    max_chars: usize,
    overlap_chars: usize,
) -> Vec<Chunk> {
    let max_chars = max_chars.max(1);
    let overlap = overlap_chars.min(max_chars - 1);
    let spans = split_text(text, max_chars - overlap);

    let mut chunks = Vec::with_capacity(spans.len());
    let mut prev: Option<&str> = None;
    for (index, span) in spans.into_iter().enumerate() {
        let body = match prev {
            Some(p) if overlap > 0 => format!("{}{}", tail_chars(p, overlap), span),
            _ => span.to_string(),
        };
        chunks.push(make_chunk(document_id, index as i64, body));
        prev = Some(span);
    }
    chunks
}

/// Create a single [`Chunk`] with a UUID and SHA-256 content hash.
fn make_chunk(document_id: &str, index: i64, text: String) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        document_id: document_id.to_string(),
        chunk_index: index,
        text,
        hash,
    }
}

//! Text cleanup applied to extracted document text before chunking.
//!
//! Extractors hand back whatever the source format produced: PDF text with
//! hard line breaks and hyphenated words, DOCX paragraphs, stray control
//! characters. [`normalize`] turns that into plain ASCII with single spaces,
//! repaired hyphenation and blank-line paragraph breaks.
//!
//! # Steps
//!
//! Applied in this order; later steps rely on the earlier ones:
//!
//! 1. Every run of characters outside printable ASCII becomes one space.
//!    Newlines survive this step.
//! 2. Runs of two or more newlines collapse into a single paragraph break.
//! 3. Runs of spaces collapse to one space.
//! 4. A hyphen followed by optional whitespace, a newline and optional
//!    whitespace is deleted, joining the word halves.
//! 5. Newline, optional whitespace, newline becomes a blank line (`\n\n`).
//! 6. Leading and trailing whitespace is trimmed.
//!
//! Step 1 turns tabs and carriage returns into spaces, so step 3 only ever
//! sees spaces. Steps 2 and 5 share one rule: a newline run is a paragraph
//! break written as exactly `\n\n`. Collapsing it to a lone `\n` instead
//! would let a second pass undo the first pass's paragraph breaks.
//!
//! # Example
//!
//! ```rust
//! use docqa_core::normalize::normalize;
//!
//! assert_eq!(normalize("  hyphen-\n  ated\twords  "), "hyphenated words");
//! ```

/// Normalize raw extracted text. Pure and idempotent.
pub fn normalize(raw: &str) -> String {
    let text = replace_non_printable(raw);
    let text = paragraph_breaks(&text);
    let text = collapse_spaces(&text);
    let text = join_hyphenated(&text);
    let text = paragraph_breaks(&text);
    text.trim().to_string()
}

fn is_kept(c: char) -> bool {
    c == '\n' || (' '..='~').contains(&c)
}

fn replace_non_printable(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_run = false;
    for c in text.chars() {
        if is_kept(c) {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push(' ');
            in_run = true;
        }
    }
    out
}

fn collapse_spaces(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == ' ' && out.ends_with(' ') {
            continue;
        }
        out.push(c);
    }
    out
}

/// Drop `-<ws>*\n<ws>*` so that `"hyph-\n en"` becomes `"hyphen"`.
fn join_hyphenated(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'-' {
            let mut j = i + 1;
            while j < bytes.len() && bytes[j] == b' ' {
                j += 1;
            }
            if j < bytes.len() && bytes[j] == b'\n' {
                j += 1;
                while j < bytes.len() && (bytes[j] == b' ' || bytes[j] == b'\n') {
                    j += 1;
                }
                i = j;
                continue;
            }
        }
        // Input is ASCII plus '\n' after step 1, so byte == char here.
        out.push(bytes[i] as char);
        i += 1;
    }
    out
}

/// Rewrite `\n<ws>*\n` runs as exactly `\n\n`.
fn paragraph_breaks(text: &str) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\n' {
            let mut j = i + 1;
            let mut newlines = 1;
            let mut last_newline = i;
            while j < bytes.len() && (bytes[j] == b' ' || bytes[j] == b'\n') {
                if bytes[j] == b'\n' {
                    newlines += 1;
                    last_newline = j;
                }
                j += 1;
            }
            if newlines >= 2 {
                out.push_str("\n\n");
                i = last_newline + 1;
                continue;
            }
        }
        out.push(bytes[i] as char);
        i += 1;
    }
    out
}

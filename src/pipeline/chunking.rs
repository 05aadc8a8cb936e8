//! Text normalization and character-window segmentation.
//!
//! Extracted PDF text arrives noisy: hyphenated line breaks, blank-line
//! runs, and ragged horizontal whitespace. Normalization cleans that up
//! before the splitter cuts the text into fixed-size overlapping character
//! windows. Splitting never loses characters: stripping the overlap prefix
//! from every segment but the first reconstructs the normalized input.

use super::types::ChunkingError;

/// Normalize extracted text for indexing.
///
/// Collapses hyphenation line breaks, runs of blank lines, and runs of
/// horizontal whitespace, then trims.
pub fn normalize_text(text: &str) -> String {
    let dehyphenated = collapse_hyphenation(text);
    collapse_whitespace_runs(&dehyphenated).trim().to_string()
}

/// Drop a `-` followed by whitespace containing a line break, rejoining the
/// split word.
fn collapse_hyphenation(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '-' {
            let mut j = i + 1;
            let mut saw_newline = false;
            while j < chars.len() && chars[j].is_whitespace() {
                if chars[j] == '\n' {
                    saw_newline = true;
                }
                j += 1;
            }
            if saw_newline {
                i = j;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Collapse runs of newlines to one newline and runs of spaces/tabs to one
/// space. Single characters pass through unchanged.
fn collapse_whitespace_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\n' => {
                while matches!(chars.peek(), Some('\n')) {
                    chars.next();
                }
                out.push('\n');
            }
            ' ' | '\t' => {
                let mut run = 1;
                while matches!(chars.peek(), Some(' ' | '\t')) {
                    chars.next();
                    run += 1;
                }
                if run > 1 {
                    out.push(' ');
                } else {
                    out.push(c);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Split normalized text into overlapping character windows.
///
/// Each segment is at most `chunk_size` characters and begins
/// `chunk_overlap` characters before the prior segment's end (except the
/// first). Empty input yields zero segments.
pub fn split_segments(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<String>, ChunkingError> {
    if chunk_size == 0 {
        return Err(ChunkingError::InvalidChunkSize);
    }
    if chunk_overlap >= chunk_size {
        return Err(ChunkingError::OverlapTooLarge {
            chunk_size,
            chunk_overlap,
        });
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Ok(Vec::new());
    }

    let step = chunk_size - chunk_overlap;
    let mut segments = Vec::new();
    let mut start = 0;
    loop {
        let end = (start + chunk_size).min(chars.len());
        segments.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }
    Ok(segments)
}

/// Normalize each extracted page, join the non-empty ones, and split the
/// whole document into segments.
pub fn segment_document(
    pages: &[String],
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<String>, ChunkingError> {
    let normalized: Vec<String> = pages
        .iter()
        .map(|page| normalize_text(page))
        .filter(|page| !page.is_empty())
        .collect();
    split_segments(&normalized.join("\n"), chunk_size, chunk_overlap)
}

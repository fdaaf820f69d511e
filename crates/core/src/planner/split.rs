//! Splitting raw text into overlapping, size-bounded segments.

use super::types::TextSegment;

/// Default segment size in characters.
pub const DEFAULT_CHUNK_SIZE_CHARS: usize = 32_000;

/// Default overlap between consecutive segments in characters.
pub const DEFAULT_OVERLAP_CHARS: usize = 1_000;

/// A soft cut is taken only if the boundary lies past this fraction of the window.
pub const BOUNDARY_RATIO: f64 = 0.7;

/// Character-indexed view over a `&str`.
///
/// Plan offsets are character offsets; this maps them to byte offsets so
/// segments can be sliced without splitting a code point.
#[derive(Debug)]
pub struct SourceText<'a> {
    text: &'a str,
    boundaries: Vec<usize>,
}

impl<'a> SourceText<'a> {
    pub fn new(text: &'a str) -> Self {
        let mut boundaries: Vec<usize> = text.char_indices().map(|(idx, _)| idx).collect();
        boundaries.push(text.len());
        Self { text, boundaries }
    }

    /// Number of characters in the text.
    pub fn char_len(&self) -> usize {
        self.boundaries.len() - 1
    }

    pub fn as_str(&self) -> &'a str {
        self.text
    }

    /// Slice `[start, end)` in character offsets, clamped to the text.
    pub fn slice(&self, start: usize, end: usize) -> &'a str {
        let len = self.char_len();
        let end = end.min(len);
        let start = start.min(end);
        &self.text[self.boundaries[start]..self.boundaries[end]]
    }

    /// First `max_chars` characters of the text.
    pub fn prefix(&self, max_chars: usize) -> &'a str {
        self.slice(0, max_chars)
    }
}

/// Split `text` into segments of at most `chunk_size_chars` characters.
///
/// Texts that fit in one window yield the single segment `[0, len)`.
/// Otherwise each window is cut at its last `.` or `\n` when that boundary
/// lies past 70% of the window, and the next window starts
/// `overlap_chars` before the previous end.
pub fn split_text(text: &str, chunk_size_chars: usize, overlap_chars: usize) -> Vec<TextSegment> {
    let source = SourceText::new(text);
    split_source(&source, chunk_size_chars, overlap_chars)
}

/// Same as [`split_text`] for an already-indexed text.
pub fn split_source(
    source: &SourceText<'_>,
    chunk_size_chars: usize,
    overlap_chars: usize,
) -> Vec<TextSegment> {
    let len = source.char_len();
    let chunk_size = chunk_size_chars.max(1);

    if len <= chunk_size {
        return vec![TextSegment { start: 0, end: len }];
    }

    let min_cut = chunk_size as f64 * BOUNDARY_RATIO;
    let mut segments = Vec::new();
    let mut start = 0;

    while start < len {
        let mut end = start + chunk_size;

        if end >= len {
            end = len;
        } else {
            let window = source.slice(start, end);
            let from_end = window.chars().rev().position(|c| c == '.' || c == '\n');
            if let Some(from_end) = from_end {
                let split_point = (end - start) - 1 - from_end;
                if split_point as f64 > min_cut {
                    end = start + split_point + 1;
                }
            }
        }

        segments.push(TextSegment { start, end });

        if end >= len {
            break;
        }
        // Always move forward, even with a misconfigured overlap.
        start = end.saturating_sub(overlap_chars).max(start + 1);
    }

    segments
}

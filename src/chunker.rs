//! Sliding-window text chunking.
//!
//! Sizes are expressed in an approximate token unit and converted with a
//! fixed ratio of 4 characters per token, the same estimate the rest of
//! the engine uses for budgets.

/// Approximate characters per token used for size conversion.
pub const CHARS_PER_TOKEN: usize = 4;

/// Splits raw documents into overlapping text segments.
///
/// A window of `target_tokens * 4` characters slides across the text,
/// advancing so that consecutive chunks share `overlap_tokens * 4`
/// characters. A cut that would land mid-sentence snaps backward to the
/// nearest sentence terminator (`.`) or newline, provided that keeps at
/// least half the window. Chunking is deterministic: identical input and
/// parameters always produce identical chunks, and the chunk spans cover
/// the entire source contiguously.
pub struct TextChunker {
    target_tokens: usize,
    overlap_tokens: usize,
}

impl TextChunker {
    /// Create a chunker. `overlap_tokens` is clamped below `target_tokens`
    /// so every step makes progress.
    pub fn new(target_tokens: usize, overlap_tokens: usize) -> Self {
        let target_tokens = target_tokens.max(1);
        let overlap_tokens = overlap_tokens.min(target_tokens - 1);
        Self {
            target_tokens,
            overlap_tokens,
        }
    }

    /// Split `text` into chunks. Empty or whitespace-only windows are
    /// dropped; a document shorter than one window yields exactly one
    /// chunk.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        self.spans(text)
            .into_iter()
            .map(|(start, end)| &text[start..end])
            .filter(|piece| !piece.trim().is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Chunk spans as byte offsets into `text`, aligned to `char`
    /// boundaries. Consecutive spans overlap; their union is the whole
    /// text.
    fn spans(&self, text: &str) -> Vec<(usize, usize)> {
        if text.is_empty() {
            return Vec::new();
        }

        // Byte offset of every char boundary, plus the end of the text.
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let n_chars = bounds.len() - 1;
        let chars: Vec<char> = text.chars().collect();

        let window = self.target_tokens * CHARS_PER_TOKEN;
        let overlap = self.overlap_tokens * CHARS_PER_TOKEN;

        let mut spans = Vec::new();
        let mut start = 0usize;
        loop {
            let mut end = (start + window).min(n_chars);
            if end < n_chars {
                if let Some(cut) = snap_to_sentence(&chars, start, end, window) {
                    end = cut;
                }
            }
            spans.push((bounds[start], bounds[end]));
            if end == n_chars {
                break;
            }
            // The next window starts `overlap` chars before the cut, so the
            // spans stay contiguous even when the cut was snapped early.
            start = end.saturating_sub(overlap).max(start + 1);
        }
        spans
    }
}

/// Find a cut at a sentence terminator in `[start + window/2, end]`,
/// scanning backward from `end`. Returns the char index just past the
/// terminator, or `None` when no terminator keeps at least half the
/// window.
fn snap_to_sentence(chars: &[char], start: usize, end: usize, window: usize) -> Option<usize> {
    let floor = start + window / 2;
    let mut i = end;
    while i >= floor {
        let c = chars[i - 1];
        if c == '.' || c == '\n' {
            return Some(i);
        }
        i -= 1;
    }
    None
}

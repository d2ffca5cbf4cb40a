//! Citation-numbered context assembly.
//!
//! Converts ranked search results into a size-bounded text block whose
//! entries are numbered `[1]`, `[2]`, and so on: the same markers the
//! answer generator is instructed to cite.

use serde::{Deserialize, Serialize};
use tessera_vector::{Chunk, SearchResult};

/// Text used when no context could be assembled.
pub const NO_CONTEXT_TEXT: &str = "(no context)";

/// One context block: a chunk plus its citation number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    /// 1-based citation number; dense over the included entries.
    pub ref_id: usize,
    /// The included chunk.
    pub chunk: Chunk,
}

/// An assembled, citation-numbered context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssembledContext {
    /// Included chunks in rank order with their citation numbers.
    pub entries: Vec<ContextEntry>,
    /// Serialized context text, at most the requested character budget.
    pub text: String,
}

impl AssembledContext {
    /// Whether no chunks were included.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct source ids of the included chunks, in first-seen order.
    pub fn sources(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for entry in &self.entries {
            if !seen.contains(&entry.chunk.source_id) {
                seen.push(entry.chunk.source_id.clone());
            }
        }
        seen
    }
}

/// Builds an [`AssembledContext`] from ranked search results.
pub struct ContextAssembler;

impl ContextAssembler {
    /// Assemble results in rank order under a character budget.
    ///
    /// Each included chunk is rendered as a block headed by
    /// `[ref_id] source_id (chunk position/total)`. A block that would
    /// push the text past `max_chars` is skipped whole, never truncated,
    /// and later, smaller blocks may still fit. Citation numbers are
    /// assigned on inclusion, so the sequence stays dense starting at 1.
    pub fn assemble(results: &[SearchResult], max_chars: usize) -> AssembledContext {
        if results.is_empty() {
            return AssembledContext {
                entries: Vec::new(),
                text: NO_CONTEXT_TEXT.to_string(),
            };
        }

        let mut entries = Vec::new();
        let mut text = String::new();
        let mut next_ref = 1usize;

        for result in results {
            let chunk = &result.record.chunk;
            let block = format!(
                "[{}] {} (chunk {}/{})\n{}",
                next_ref,
                chunk.source_id,
                chunk.position + 1,
                chunk.total_chunks,
                chunk.text
            );
            let separator = if text.is_empty() { 0 } else { 2 };

            if text.len() + separator + block.len() > max_chars {
                continue;
            }

            if separator > 0 {
                text.push_str("\n\n");
            }
            text.push_str(&block);
            entries.push(ContextEntry {
                ref_id: next_ref,
                chunk: chunk.clone(),
            });
            next_ref += 1;
        }

        if entries.is_empty() {
            return AssembledContext {
                entries,
                text: NO_CONTEXT_TEXT.to_string(),
            };
        }

        AssembledContext { entries, text }
    }
}

//! Budget-aware prompt assembly.
//!
//! The context section is the rendered chunk blocks joined by [`SEPARATOR`]. Its
//! length in chars never exceeds the budget: chunks are taken whole in rank order
//! until the next one would overflow. Only when the top-ranked chunk alone is too
//! large is it clipped, so the prompt is never built from lower-ranked chunks while
//! the best match is missing.

use crate::models::{ChunkId, RetrievalResult, ScoredChunk};

pub const SEPARATOR: &str = "\n\n---\n\n";

const INSTRUCTION: &str = "You are a helpful AI assistant. Answer the user's question using only the \
context below. Each context block starts with its source marker.
If the answer is not in the context, say \"I don't have enough information to answer that based on \
the provided documents.\" Do not use outside knowledge.";

/// The part of a retrieval result that fits the budget.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextWindow {
    pub section: String,
    pub sources: Vec<ChunkId>,
}

impl ContextWindow {
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn char_len(&self) -> usize {
        self.section.chars().count()
    }
}

fn header(rank: usize, scored: &ScoredChunk) -> String {
    format!(
        "[{}] source: {} ({}, chunk {})\n",
        rank,
        scored.chunk.id,
        scored.chunk.metadata.document,
        scored.chunk.metadata.chunk_index
    )
}

fn clip(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_pos, _)) => &text[..byte_pos],
        None => text,
    }
}

pub fn fit_context(context: &RetrievalResult, max_chars: usize) -> ContextWindow {
    let separator_len = SEPARATOR.chars().count();
    let mut window = ContextWindow::default();
    let mut used = 0usize;

    for (i, scored) in context.iter().enumerate() {
        let header = header(i + 1, scored);
        let header_len = header.chars().count();
        let text_len = scored.chunk.text.chars().count();
        let separator = if window.is_empty() { 0 } else { separator_len };
        let cost = separator + header_len + text_len;

        if used + cost > max_chars {
            if window.is_empty() && header_len < max_chars {
                window.section.push_str(&header);
                window
                    .section
                    .push_str(clip(&scored.chunk.text, max_chars - header_len));
                window.sources.push(scored.chunk.id.clone());
            }
            break;
        }

        if separator > 0 {
            window.section.push_str(SEPARATOR);
        }
        window.section.push_str(&header);
        window.section.push_str(&scored.chunk.text);
        window.sources.push(scored.chunk.id.clone());
        used += cost;
    }

    window
}

pub fn build_prompt(question: &str, window: &ContextWindow) -> String {
    format!(
        "{}\n\nCONTEXT:\n{}\n\nUSER QUESTION:\n{}\n\nANSWER:\n",
        INSTRUCTION, window.section, question
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ranked;

    #[test]
    fn test_all_chunks_fit() {
        let context = ranked(&[("a", "alpha"), ("b", "beta")]);
        let window = fit_context(&context, 10_000);

        assert_eq!(window.sources, vec!["a", "b"]);
        assert!(window.section.contains("alpha"));
        assert!(window.section.contains(SEPARATOR));
        assert!(window.section.starts_with("[1] source: a"));
    }

    #[test]
    fn test_budget_drops_trailing_chunks() {
        let long = "x".repeat(1000);
        let context = ranked(&[("c1", &long), ("c2", &long), ("c3", &long)]);
        let window = fit_context(&context, 1500);

        assert_eq!(window.sources, vec!["c1"]);
        assert!(window.char_len() <= 1500);
        assert!(window.section.contains(&long));
    }

    #[test]
    fn test_oversized_top_chunk_is_clipped() {
        let long = "é".repeat(500);
        let context = ranked(&[("big", &long), ("small", "tiny")]);
        let window = fit_context(&context, 200);

        assert_eq!(window.sources, vec!["big"]);
        assert_eq!(window.char_len(), 200);
    }

    #[test]
    fn test_budget_smaller_than_header_yields_nothing() {
        let context = ranked(&[("a", "alpha")]);
        let window = fit_context(&context, 5);
        assert!(window.is_empty());
        assert!(window.section.is_empty());
    }

    #[test]
    fn test_prompt_contains_question_verbatim() {
        let context = ranked(&[("a", "The sky is blue.")]);
        let window = fit_context(&context, 1000);
        let prompt = build_prompt("Why is the sky blue?", &window);

        assert!(prompt.contains("USER QUESTION:\nWhy is the sky blue?"));
        assert!(prompt.contains("The sky is blue."));
        assert!(prompt.contains("don't have enough information"));
    }
}

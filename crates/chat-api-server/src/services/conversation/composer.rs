use serde::Serialize;

use crate::models::Turn;

/// One retrieved knowledge-base excerpt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Passage {
    pub content: String,
    pub source: Option<String>,
    pub score: f32,
}

impl Passage {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: None,
            score: 0.0,
        }
    }
}

/// Both memory views handed to the model chain for a single turn.
#[derive(Debug, Clone, Default)]
pub struct MergedContext {
    pub short_term: Vec<Turn>,
    pub long_term: Vec<Passage>,
}

impl MergedContext {
    pub fn long_term_text(&self) -> String {
        self.long_term
            .iter()
            .map(|p| p.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

pub struct MemoryComposer;

impl MemoryComposer {
    /// Neither side is filtered or reordered.
    pub fn merge(short_term: Vec<Turn>, long_term: Vec<Passage>) -> MergedContext {
        MergedContext {
            short_term,
            long_term,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_both_sides() {
        let merged = MemoryComposer::merge(
            vec![Turn::human("hi"), Turn::assistant("hello")],
            vec![Passage::new("first"), Passage::new("second")],
        );
        assert_eq!(merged.short_term.len(), 2);
        assert_eq!(merged.long_term_text(), "first\n\nsecond");
    }

    #[test]
    fn test_empty_merge() {
        let merged = MemoryComposer::merge(Vec::new(), Vec::new());
        assert!(merged.short_term.is_empty());
        assert_eq!(merged.long_term_text(), "");
    }
}

use anyhow::{Context, Result};
use text_splitter::{ChunkConfig, TextSplitter};

pub struct TextChunker {
    splitter: TextSplitter<text_splitter::Characters>,
}

impl TextChunker {
    /// `chunk_size` and `overlap` are in characters; overlap must be smaller.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        let config = ChunkConfig::new(chunk_size.max(1))
            .with_overlap(overlap)
            .context("Invalid chunk configuration")?;
        Ok(Self {
            splitter: TextSplitter::new(config),
        })
    }

    pub fn chunk(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return Vec::new();
        }
        self.splitter.chunks(text).map(str::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_respect_size() {
        let chunker = TextChunker::new(20, 0).unwrap();
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(5);

        let chunks = chunker.chunk(&text);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= 20));
    }

    #[test]
    fn test_blank_text_has_no_chunks() {
        let chunker = TextChunker::new(100, 0).unwrap();
        assert!(chunker.chunk("  \n ").is_empty());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        assert!(TextChunker::new(10, 10).is_err());
    }
}

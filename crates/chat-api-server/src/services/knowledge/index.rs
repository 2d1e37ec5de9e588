use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::services::conversation::Passage;
use crate::utils::cosine_similarity;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub content: String,
    pub source: String,
    pub embedding: Vec<f32>,
}

/// Flat in-memory vector index, persisted as JSON.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorIndex {
    pub chunks: Vec<IndexedChunk>,
}

impl VectorIndex {
    pub fn new(chunks: Vec<IndexedChunk>) -> Self {
        Self { chunks }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read vector index {}", path.display()))?;
        let index: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse vector index {}", path.display()))?;
        info!(chunks = index.len(), "Loaded vector index from {}", path.display());
        Ok(index)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let raw = serde_json::to_string(self)?;
        fs::write(path, raw).with_context(|| format!("Failed to write vector index {}", path.display()))?;
        info!(chunks = self.len(), "Saved vector index to {}", path.display());
        Ok(())
    }

    /// Top `k` chunks by cosine similarity, best first.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<Passage> {
        let mut scored: Vec<(f32, &IndexedChunk)> = self
            .chunks
            .iter()
            .filter_map(|chunk| match cosine_similarity(query, &chunk.embedding) {
                Ok(score) => Some((score, chunk)),
                Err(e) => {
                    debug!(source = %chunk.source, "Skipping chunk: {}", e);
                    None
                }
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));

        scored
            .into_iter()
            .take(k)
            .map(|(score, chunk)| Passage {
                content: chunk.content.clone(),
                source: Some(chunk.source.clone()),
                score,
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

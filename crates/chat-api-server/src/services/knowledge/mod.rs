//! Long-term memory: documents on disk, embedded once, searched per query.

mod chunker;
mod index;
mod loader;

pub use chunker::TextChunker;
pub use index::{IndexedChunk, VectorIndex};
pub use loader::{DocumentLoader, LoadedDocument};

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::KnowledgeConfig;
use crate::services::conversation::{LongTermContextProvider, Passage};
use crate::services::embedding_service::EmbeddingProvider;

pub struct KnowledgeBase {
    index: VectorIndex,
    embedder: Arc<dyn EmbeddingProvider>,
    k: usize,
}

impl KnowledgeBase {
    pub fn new(index: VectorIndex, embedder: Arc<dyn EmbeddingProvider>, k: usize) -> Self {
        Self { index, embedder, k }
    }

    /// Load the persisted index, or build and persist it from the documents directory.
    pub async fn build(config: &KnowledgeConfig, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let index_path = Path::new(&config.index_path);
        let documents_path = Path::new(&config.documents_path);

        let index = if index_path.exists() {
            VectorIndex::load(index_path)?
        } else if !documents_path.is_dir() {
            warn!(
                "Documents directory {} not found, long-term memory is empty",
                documents_path.display()
            );
            VectorIndex::default()
        } else {
            let index = Self::index_documents(config, documents_path, embedder.as_ref()).await?;
            index.save(index_path)?;
            index
        };

        info!(chunks = index.len(), k = config.context_size, "Knowledge base ready");
        Ok(Self::new(index, embedder, config.context_size))
    }

    async fn index_documents(
        config: &KnowledgeConfig,
        documents_path: &Path,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<VectorIndex> {
        let documents = DocumentLoader::load_dir(documents_path)?;
        let chunker = TextChunker::new(config.chunk_size, config.chunk_overlap)?;
        info!(documents = documents.len(), "Embedding documents");

        let mut chunks = Vec::new();
        for document in &documents {
            for content in chunker.chunk(&document.content) {
                let embedding = embedder
                    .embed(&content)
                    .await
                    .with_context(|| format!("Failed to embed chunk of {}", document.source))?;
                chunks.push(IndexedChunk {
                    content,
                    source: document.source.clone(),
                    embedding,
                });
            }
        }
        Ok(VectorIndex::new(chunks))
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[async_trait]
impl LongTermContextProvider for KnowledgeBase {
    async fn retrieve(&self, query: &str) -> Result<Vec<Passage>> {
        if self.index.is_empty() || self.k == 0 {
            return Ok(Vec::new());
        }
        let query_embedding = self.embedder.embed(query).await?;
        Ok(self.index.search(&query_embedding, self.k))
    }

    fn context_size(&self) -> usize {
        self.k
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embeds text by keyword presence so ranking is predictable.
    struct KeywordEmbedder {
        calls: AtomicUsize,
    }

    impl KeywordEmbedder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl EmbeddingProvider for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let lower = text.to_lowercase();
            Ok(["cat", "dog", "fish"]
                .iter()
                .map(|w| if lower.contains(w) { 1.0 } else { 0.0 })
                .collect())
        }
    }

    fn config(dir: &Path) -> KnowledgeConfig {
        KnowledgeConfig {
            documents_path: dir.join("Documents").to_string_lossy().into_owned(),
            index_path: dir.join("VectorStore").join("index.json").to_string_lossy().into_owned(),
            chunk_size: 1000,
            chunk_overlap: 0,
            context_size: 2,
            ..KnowledgeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_missing_documents_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = KeywordEmbedder::new();

        let kb = KnowledgeBase::build(&config(dir.path()), embedder.clone()).await.unwrap();

        assert!(kb.is_empty());
        assert!(kb.retrieve("anything").await.unwrap().is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert!(!dir.path().join("VectorStore").exists());
    }

    #[tokio::test]
    async fn test_build_indexes_and_retrieves_top_k() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("Documents");
        fs::create_dir(&docs).unwrap();
        fs::write(docs.join("cats.txt"), "All about the cat.").unwrap();
        fs::write(docs.join("dogs.txt"), "All about the dog.").unwrap();
        fs::write(docs.join("fish.md"), "# Fish\n\nAll about the fish.").unwrap();

        let cfg = config(dir.path());
        let kb = KnowledgeBase::build(&cfg, KeywordEmbedder::new()).await.unwrap();
        assert_eq!(kb.len(), 3);
        assert_eq!(kb.context_size(), 2);
        assert!(Path::new(&cfg.index_path).exists());

        let passages = kb.retrieve("tell me about my dog").await.unwrap();
        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].content, "All about the dog.");
        assert_eq!(passages[0].source.as_deref(), Some("dogs.txt"));
    }

    #[tokio::test]
    async fn test_persisted_index_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("Documents");
        fs::create_dir(&docs).unwrap();
        fs::write(docs.join("cats.txt"), "cat facts").unwrap();
        let cfg = config(dir.path());

        KnowledgeBase::build(&cfg, KeywordEmbedder::new()).await.unwrap();

        let embedder = KeywordEmbedder::new();
        let kb = KnowledgeBase::build(&cfg, embedder.clone()).await.unwrap();
        assert_eq!(kb.len(), 1);
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }
}

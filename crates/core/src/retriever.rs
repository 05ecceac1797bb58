use crate::embeddings::{embed_with_retry, normalize_l2};
use crate::store::EmbeddingIndex;
use crate::traits::{ChunkRetriever, EmbeddingProvider};
use crate::{PipelineError, ProviderError, RetrievedChunk};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Read-only similarity search over a loaded index. Cloning shares the index.
#[derive(Debug, Clone)]
pub struct Retriever<E> {
    index: Arc<EmbeddingIndex>,
    embedder: E,
    max_retries: usize,
}

impl<E> Retriever<E>
where
    E: EmbeddingProvider,
{
    pub fn open(dir: &Path, embedder: E) -> Result<Self, PipelineError> {
        Self::new(Arc::new(EmbeddingIndex::load(dir)?), embedder)
    }

    /// Rejects an embedder whose model differs from the one that built the index.
    pub fn new(index: Arc<EmbeddingIndex>, embedder: E) -> Result<Self, PipelineError> {
        let built_with = &index.manifest().embedding_model;
        if built_with != embedder.model() {
            return Err(PipelineError::Configuration(format!(
                "index was built with embedding model {built_with:?} but queries use {:?}; re-run ingestion",
                embedder.model()
            )));
        }
        Ok(Self {
            index,
            embedder,
            max_retries: 3,
        })
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn index(&self) -> &EmbeddingIndex {
        &self.index
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, PipelineError> {
        let mut vectors = embed_with_retry(&self.embedder, &[query.to_string()], self.max_retries).await?;
        if vectors.len() != 1 {
            return Err(ProviderError::Response {
                provider: self.embedder.model().to_string(),
                details: format!("expected one query embedding, got {}", vectors.len()),
            }
            .into());
        }
        let mut vector = vectors.swap_remove(0);

        if vector.len() != self.index.dimensions() {
            return Err(PipelineError::Configuration(format!(
                "query embedding has {} dimensions, index has {}",
                vector.len(),
                self.index.dimensions()
            )));
        }
        normalize_l2(&mut vector);
        Ok(vector)
    }
}

#[async_trait]
impl<E> ChunkRetriever for Retriever<E>
where
    E: EmbeddingProvider,
{
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievedChunk>, PipelineError> {
        if query.trim().is_empty() {
            return Err(PipelineError::InvalidArgument("query is empty".to_string()));
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let vector = self.embed_query(query).await?;
        self.index.search(&vector, top_k)
    }
}

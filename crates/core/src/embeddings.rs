use crate::traits::EmbeddingProvider;
use crate::{PipelineError, ProviderError};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;

/// Deterministic offline embedder: hashed character trigrams, L2-normalized.
#[derive(Debug, Clone)]
pub struct CharacterNgramEmbedder {
    dimensions: usize,
    model: String,
}

impl CharacterNgramEmbedder {
    pub fn new(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self {
            dimensions,
            model: format!("char-trigram-{dimensions}"),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        normalize_l2(&mut vector);
        vector
    }
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIMENSIONS)
    }
}

#[async_trait]
impl EmbeddingProvider for CharacterNgramEmbedder {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

/// Scales `vector` to unit length so inner product equals cosine similarity.
/// All-zero vectors are left untouched.
pub fn normalize_l2(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 && magnitude.is_finite() {
        for value in vector.iter_mut() {
            *value /= magnitude;
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchPlan {
    pub batch_size: usize,
    pub concurrency: usize,
    pub max_retries: usize,
}

/// Embeds `texts` batch by batch, with up to `plan.concurrency` batches in
/// flight. Output rows line up with `texts` regardless of which response
/// arrives first, and every row is normalized and of one dimensionality.
pub async fn embed_in_batches<E>(
    provider: &E,
    texts: &[String],
    plan: BatchPlan,
) -> Result<Vec<Vec<f32>>, PipelineError>
where
    E: EmbeddingProvider + ?Sized,
{
    if plan.batch_size == 0 {
        return Err(PipelineError::Configuration(
            "embedding batch_size must be greater than zero".to_string(),
        ));
    }

    let batches: Vec<Vec<Vec<f32>>> = stream::iter(texts.chunks(plan.batch_size).enumerate())
        .map(|(batch_index, batch)| async move {
            let vectors = embed_with_retry(provider, batch, plan.max_retries).await?;
            if vectors.len() != batch.len() {
                return Err(ProviderError::Response {
                    provider: provider.model().to_string(),
                    details: format!(
                        "batch {batch_index} returned {} vectors for {} inputs",
                        vectors.len(),
                        batch.len()
                    ),
                });
            }
            debug!(batch_index, rows = batch.len(), "embedded batch");
            Ok(vectors)
        })
        .buffered(plan.concurrency.max(1))
        .try_collect()
        .await?;

    let mut vectors: Vec<Vec<f32>> = batches.into_iter().flatten().collect();
    if let Some(first) = vectors.first() {
        let dimensions = first.len();
        if dimensions == 0 || vectors.iter().any(|vector| vector.len() != dimensions) {
            return Err(PipelineError::Provider(ProviderError::Response {
                provider: provider.model().to_string(),
                details: "embedding vectors have inconsistent dimensions".to_string(),
            }));
        }
    }

    for vector in &mut vectors {
        normalize_l2(vector);
    }
    Ok(vectors)
}

/// Retries transient failures with exponential backoff, at most `max_retries`
/// times after the first call.
pub async fn embed_with_retry<E>(
    provider: &E,
    batch: &[String],
    max_retries: usize,
) -> Result<Vec<Vec<f32>>, ProviderError>
where
    E: EmbeddingProvider + ?Sized,
{
    let mut attempt = 0usize;
    loop {
        match provider.embed(batch).await {
            Ok(vectors) => return Ok(vectors),
            Err(error) if error.is_transient() && attempt < max_retries => {
                attempt += 1;
                let delay = retry_backoff(attempt);
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "transient embedding failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => return Err(error),
        }
    }
}

pub(crate) fn retry_backoff(attempt: usize) -> Duration {
    let capped = attempt.min(5) as u32;
    Duration::from_millis(500 * (1 << capped))
}

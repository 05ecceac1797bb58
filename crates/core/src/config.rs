use crate::error::PipelineError;
use std::time::Duration;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_COMPLETION_MODEL: &str = "gpt-4.1-mini";

/// Connection settings shared by the OpenAI-compatible providers.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub api_key: Option<String>,
    pub base_url: Url,
    pub embedding_model: String,
    pub completion_model: String,
    pub timeout: Duration,
    pub max_retries: usize,
}

impl ProviderSettings {
    pub fn new(api_key: Option<String>, base_url: &str) -> Result<Self, PipelineError> {
        // Url::join drops the last path segment unless the base ends with a slash.
        let base_url = if base_url.ends_with('/') {
            Url::parse(base_url)?
        } else {
            Url::parse(&format!("{base_url}/"))?
        };

        Ok(Self {
            api_key: api_key
                .map(|key| key.trim().to_string())
                .filter(|key| !key.is_empty()),
            base_url,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            completion_model: DEFAULT_COMPLETION_MODEL.to_string(),
            timeout: Duration::from_secs(60),
            max_retries: 3,
        })
    }

    pub fn endpoint(&self, path: &str) -> Result<Url, PipelineError> {
        Ok(self.base_url.join(path)?)
    }
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_size: usize,
    pub overlap: usize,
    pub batch_size: usize,
    pub embed_concurrency: usize,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_size: 2_200,
            overlap: 250,
            batch_size: 64,
            embed_concurrency: 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    pub top_k: usize,
    pub max_context_chars: usize,
    pub max_output_tokens: usize,
    pub temperature: f32,
    /// Characters of offending model output kept in a parse-failure error.
    pub preview_chars: usize,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_context_chars: 12_000,
            max_output_tokens: 800,
            temperature: 0.0,
            preview_chars: 200,
        }
    }
}

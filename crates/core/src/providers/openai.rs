//! OpenAI-compatible embedding and chat-completion clients.

use crate::config::ProviderSettings;
use crate::traits::{CompletionProvider, CompletionRequest, EmbeddingProvider};
use crate::{PipelineError, ProviderError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

const PROVIDER: &str = "openai";

fn build_client(settings: &ProviderSettings) -> Result<Client, PipelineError> {
    let api_key = settings
        .api_key
        .as_deref()
        .ok_or_else(|| ProviderError::MissingCredential {
            provider: PROVIDER.to_string(),
        })?;

    let mut headers = HeaderMap::new();
    let auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
        .map_err(|_| PipelineError::Configuration("OpenAI API key is not a valid header value".to_string()))?;
    headers.insert(AUTHORIZATION, auth);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    Client::builder()
        .timeout(settings.timeout)
        .default_headers(headers)
        .build()
        .map_err(|error| PipelineError::Configuration(format!("failed to build OpenAI HTTP client: {error}")))
}

fn classify_status(status: StatusCode, body: String) -> ProviderError {
    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        ProviderError::Transient {
            provider: PROVIDER.to_string(),
            details: format!("{status}: {body}"),
        }
    } else {
        ProviderError::Response {
            provider: PROVIDER.to_string(),
            details: format!("{status}: {body}"),
        }
    }
}

async fn check_status(response: Response) -> Result<Response, ProviderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<body unavailable>".to_string());
    Err(classify_status(status, body))
}

#[derive(Debug, Clone)]
pub struct OpenAiEmbeddings {
    client: Client,
    endpoint: Url,
    model: String,
}

impl OpenAiEmbeddings {
    /// Fails with a configuration error when no API key is configured.
    pub fn new(settings: &ProviderSettings) -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_client(settings)?,
            endpoint: settings.endpoint("embeddings")?,
            model: settings.embedding_model.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    fn model(&self) -> &str {
        &self.model
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await?;
        let parsed: EmbeddingResponse = check_status(response).await?.json().await?;
        into_ordered_vectors(parsed, texts.len())
    }
}

fn into_ordered_vectors(mut parsed: EmbeddingResponse, expected: usize) -> Result<Vec<Vec<f32>>, ProviderError> {
    parsed.data.sort_by_key(|entry| entry.index);
    if parsed.data.len() != expected {
        return Err(ProviderError::Response {
            provider: PROVIDER.to_string(),
            details: format!("returned {} embeddings for {} inputs", parsed.data.len(), expected),
        });
    }
    Ok(parsed.data.into_iter().map(|entry| entry.embedding).collect())
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Clone)]
pub struct OpenAiCompletions {
    client: Client,
    endpoint: Url,
    model: String,
}

impl OpenAiCompletions {
    pub fn new(settings: &ProviderSettings) -> Result<Self, PipelineError> {
        Ok(Self {
            client: build_client(settings)?,
            endpoint: settings.endpoint("chat/completions")?,
            model: settings.completion_model.clone(),
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletions {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, ProviderError> {
        let body = ChatRequest {
            model: &self.model,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
        };

        let response = self.client.post(self.endpoint.clone()).json(&body).send().await?;
        let parsed: ChatResponse = check_status(response).await?.json().await?;
        first_message(parsed)
    }
}

fn first_message(parsed: ChatResponse) -> Result<String, ProviderError> {
    parsed
        .choices
        .into_iter()
        .next()
        .map(|choice| choice.message.content.unwrap_or_default())
        .ok_or_else(|| ProviderError::Response {
            provider: PROVIDER.to_string(),
            details: "completion response has no choices".to_string(),
        })
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}

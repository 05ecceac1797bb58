use thiserror::Error;

/// Failures raised by an embedding or completion provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} credential is missing; set OPENAI_API_KEY")]
    MissingCredential { provider: String },

    #[error("transient failure from {provider}: {details}")]
    Transient { provider: String, details: String },

    #[error("invalid response from {provider}: {details}")]
    Response { provider: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Transient { .. } => true,
            ProviderError::Http(error) => {
                error.is_timeout() || error.is_connect() || error.is_request() || error.is_body()
            }
            ProviderError::MissingCredential { .. } | ProviderError::Response { .. } => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("provider error: {0}")]
    Provider(ProviderError),

    #[error("{stage} output is not valid summary JSON: {preview:?}")]
    ParseFailure { stage: &'static str, preview: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<ProviderError> for PipelineError {
    fn from(error: ProviderError) -> Self {
        match error {
            ProviderError::MissingCredential { .. } => PipelineError::Configuration(error.to_string()),
            other => PipelineError::Provider(other),
        }
    }
}

impl From<url::ParseError> for PipelineError {
    fn from(error: url::ParseError) -> Self {
        PipelineError::Configuration(format!("invalid provider url: {error}"))
    }
}

impl PipelineError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, PipelineError::Configuration(_))
    }
}

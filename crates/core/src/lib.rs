pub mod chunking;
pub mod config;
pub mod context;
pub mod embeddings;
pub mod error;
pub mod extraction;
pub mod index;
pub mod ingest;
pub mod loader;
pub mod models;
pub mod pipeline;
pub mod policy;
pub mod providers;
pub mod retriever;
pub mod schema;
pub mod store;
pub mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use chunking::{chunk_pages, normalize_whitespace, ChunkingConfig};
pub use config::{AnalysisOptions, IngestionOptions, ProviderSettings};
pub use context::assemble;
pub use embeddings::{CharacterNgramEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{PipelineError, ProviderError};
pub use extraction::{extract_json_text, parse_summary, Extraction, ExtractionStage, Extractor};
pub use index::{FlatIpIndex, Neighbor};
pub use ingest::{collect_pages, discover_pdf_files, CollectedPages, Ingestor, SkippedPdf};
pub use loader::{load_pdf, LopdfLoader, PageLoader};
pub use models::{Chunk, Page, RetrievedChunk};
pub use pipeline::DocumentAnalyzer;
pub use policy::{Decision, PolicyDecision, PolicyGate, PolicyRule, ReasonCode};
pub use providers::{OpenAiCompletions, OpenAiEmbeddings};
pub use retriever::Retriever;
pub use schema::{DocumentSummary, ExperienceItem};
pub use store::{EmbeddingIndex, IndexManifest};
pub use traits::{ChunkRetriever, CompletionProvider, CompletionRequest, EmbeddingProvider};

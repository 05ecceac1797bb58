use crate::chunking::{chunk_pages, ChunkingConfig};
use crate::config::IngestionOptions;
use crate::embeddings::{embed_in_batches, BatchPlan};
use crate::loader::PageLoader;
use crate::store::{EmbeddingIndex, IndexManifest};
use crate::traits::EmbeddingProvider;
use crate::{Page, PipelineError};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};
use walkdir::WalkDir;

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn doc_id_from_path(path: &Path) -> Result<String, PipelineError> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
        .ok_or_else(|| PipelineError::InvalidArgument(format!("path has no file name: {}", path.display())))
}

pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

pub struct CollectedPages {
    pub pages: Vec<Page>,
    pub skipped_files: Vec<SkippedPdf>,
}

/// Loads one PDF, or every PDF under a folder. A single file that cannot be
/// read is an error; inside a folder unreadable files are skipped and reported.
pub fn collect_pages<L: PageLoader>(
    path: &Path,
    doc_id: Option<&str>,
    loader: &L,
) -> Result<CollectedPages, PipelineError> {
    if path.is_file() {
        let doc_id = match doc_id {
            Some(doc_id) => doc_id.to_string(),
            None => doc_id_from_path(path)?,
        };
        return Ok(CollectedPages {
            pages: loader.load_pages(path, &doc_id)?,
            skipped_files: Vec::new(),
        });
    }

    if !path.is_dir() {
        return Err(PipelineError::InvalidArgument(format!(
            "file not found: {}",
            path.display()
        )));
    }

    let files = discover_pdf_files(path);
    if files.is_empty() {
        return Err(PipelineError::InvalidArgument(format!(
            "no pdf files found in {}",
            path.display()
        )));
    }

    let mut pages = Vec::new();
    let mut skipped_files = Vec::new();
    for file in files {
        match doc_id_from_path(&file).and_then(|doc_id| loader.load_pages(&file, &doc_id)) {
            Ok(file_pages) => pages.extend(file_pages),
            Err(error) => skipped_files.push(SkippedPdf {
                path: file,
                reason: error.to_string(),
            }),
        }
    }

    Ok(CollectedPages {
        pages,
        skipped_files,
    })
}

/// Chunks pages, embeds the chunks and writes the index artifacts.
pub struct Ingestor<E> {
    embedder: E,
    options: IngestionOptions,
    max_retries: usize,
}

impl<E> Ingestor<E>
where
    E: EmbeddingProvider,
{
    pub fn new(embedder: E, options: IngestionOptions, max_retries: usize) -> Result<Self, PipelineError> {
        ChunkingConfig::from(&options).validate()?;
        Ok(Self {
            embedder,
            options,
            max_retries,
        })
    }

    pub async fn build_index(&self, pages: &[Page]) -> Result<EmbeddingIndex, PipelineError> {
        let started = Instant::now();
        let chunks = chunk_pages(pages, ChunkingConfig::from(&self.options))?;
        if chunks.is_empty() {
            return Err(PipelineError::InvalidArgument(
                "documents produced no chunks to index".to_string(),
            ));
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let plan = BatchPlan {
            batch_size: self.options.batch_size,
            concurrency: self.options.embed_concurrency,
            max_retries: self.max_retries,
        };
        let vectors = embed_in_batches(&self.embedder, &texts, plan).await?;
        let index = EmbeddingIndex::from_parts(chunks, &vectors, self.embedder.model())?;

        info!(
            pages = pages.len(),
            chunk_count = index.len(),
            dimensions = index.dimensions(),
            embed_ms = started.elapsed().as_secs_f64() * 1000.0,
            "built embedding index"
        );
        Ok(index)
    }

    /// Builds from `pages` and atomically replaces whatever index is in `dir`.
    pub async fn ingest(&self, pages: &[Page], dir: &Path) -> Result<IndexManifest, PipelineError> {
        if pages.is_empty() {
            warn!("no pages to ingest");
        }
        let index = self.build_index(pages).await?;
        index.persist(dir)?;
        Ok(index.manifest().clone())
    }
}

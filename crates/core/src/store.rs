//! On-disk artifacts for the embedding index.
//!
//! A built index is a directory holding three files that are only valid
//! together: the chunk records (`chunks.jsonl`), the vectors (`vectors.index`)
//! and a manifest binding them. Row `i` of the vectors is chunk line `i`.
//! A rebuild is staged in a sibling directory and renamed into place, so a
//! reader never opens a half-written set.

use crate::error::PipelineError;
use crate::index::FlatIpIndex;
use crate::models::{Chunk, RetrievedChunk};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

pub const CHUNKS_FILE: &str = "chunks.jsonl";
pub const VECTORS_FILE: &str = "vectors.index";
pub const MANIFEST_FILE: &str = "manifest.json";

const MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexManifest {
    pub format_version: u32,
    pub run_id: Uuid,
    pub built_at: DateTime<Utc>,
    pub embedding_model: String,
    pub dimensions: usize,
    pub chunk_count: usize,
    pub chunks_sha256: String,
    pub vectors_sha256: String,
}

/// Chunk records and their vectors, position-aligned.
#[derive(Debug, Clone)]
pub struct EmbeddingIndex {
    manifest: IndexManifest,
    vectors: FlatIpIndex,
    chunks: Vec<Chunk>,
}

impl EmbeddingIndex {
    /// Pairs `chunks[i]` with `vectors[i]`; vectors must already be unit length.
    pub fn from_parts(
        chunks: Vec<Chunk>,
        vectors: &[Vec<f32>],
        embedding_model: &str,
    ) -> Result<Self, PipelineError> {
        if chunks.len() != vectors.len() {
            return Err(PipelineError::Configuration(format!(
                "embedding count {} doesn't match chunk count {}",
                vectors.len(),
                chunks.len()
            )));
        }
        let dimensions = vectors.first().map(Vec::len).ok_or_else(|| {
            PipelineError::InvalidArgument("no chunks to index".to_string())
        })?;

        let mut index = FlatIpIndex::new(dimensions)?;
        for vector in vectors {
            index.add(vector)?;
        }

        let manifest = IndexManifest {
            format_version: MANIFEST_VERSION,
            run_id: Uuid::new_v4(),
            built_at: Utc::now(),
            embedding_model: embedding_model.to_string(),
            dimensions,
            chunk_count: chunks.len(),
            chunks_sha256: digest(&encode_chunks(&chunks)?),
            vectors_sha256: digest(&encode_vectors(&index)?),
        };

        Ok(Self {
            manifest,
            vectors: index,
            chunks,
        })
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn dimensions(&self) -> usize {
        self.vectors.dimensions()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Nearest chunks for a unit-length query vector, best first. A position
    /// with no chunk record behind it is dropped rather than returned.
    pub fn search(&self, query_vector: &[f32], k: usize) -> Result<Vec<RetrievedChunk>, PipelineError> {
        let neighbors = self.vectors.search(query_vector, k)?;
        let mut results = Vec::with_capacity(neighbors.len());

        for neighbor in neighbors {
            match self.chunks.get(neighbor.position) {
                Some(chunk) => results.push(RetrievedChunk::from_chunk(chunk, neighbor.score)),
                None => warn!(position = neighbor.position, "index row has no chunk record, skipping"),
            }
        }

        Ok(results)
    }

    pub fn exists(dir: &Path) -> bool {
        [CHUNKS_FILE, VECTORS_FILE, MANIFEST_FILE]
            .iter()
            .all(|name| dir.join(name).is_file())
    }

    pub fn persist(&self, dir: &Path) -> Result<(), PipelineError> {
        let staging = sibling(dir, &format!("staging-{}", self.manifest.run_id))?;
        if staging.exists() {
            fs::remove_dir_all(&staging)?;
        }
        fs::create_dir_all(&staging)?;

        let written = self.write_files(&staging).and_then(|()| swap_into_place(&staging, dir));
        if written.is_err() && staging.exists() {
            let _ = fs::remove_dir_all(&staging);
        }
        written?;

        info!(
            dir = %dir.display(),
            run_id = %self.manifest.run_id,
            chunk_count = self.manifest.chunk_count,
            dimensions = self.manifest.dimensions,
            "persisted index artifacts"
        );
        Ok(())
    }

    pub fn load(dir: &Path) -> Result<Self, PipelineError> {
        if !Self::exists(dir) {
            return Err(PipelineError::Configuration(format!(
                "index not found in {}; run ingestion first to create {CHUNKS_FILE} and {VECTORS_FILE}",
                dir.display()
            )));
        }

        let manifest: IndexManifest =
            serde_json::from_reader(BufReader::new(File::open(dir.join(MANIFEST_FILE))?))?;
        if manifest.format_version != MANIFEST_VERSION {
            return Err(misaligned(format!(
                "manifest format version {} is not supported",
                manifest.format_version
            )));
        }

        let chunk_bytes = fs::read(dir.join(CHUNKS_FILE))?;
        if digest(&chunk_bytes) != manifest.chunks_sha256 {
            return Err(misaligned(format!(
                "{CHUNKS_FILE} does not match the manifest checksum"
            )));
        }
        let chunks = decode_chunks(&chunk_bytes)?;

        let vector_bytes = fs::read(dir.join(VECTORS_FILE))?;
        if digest(&vector_bytes) != manifest.vectors_sha256 {
            return Err(misaligned(format!(
                "{VECTORS_FILE} does not match the manifest checksum"
            )));
        }
        let vectors = FlatIpIndex::from_bytes(&vector_bytes).map_err(|error| match error {
            PipelineError::Configuration(details) => misaligned(details),
            other => other,
        })?;

        if vectors.len() != chunks.len() || chunks.len() != manifest.chunk_count {
            return Err(misaligned(format!(
                "{} vectors, {} chunk records, manifest says {}",
                vectors.len(),
                chunks.len(),
                manifest.chunk_count
            )));
        }
        if vectors.dimensions() != manifest.dimensions {
            return Err(misaligned(format!(
                "vectors have {} dimensions, manifest says {}",
                vectors.dimensions(),
                manifest.dimensions
            )));
        }

        Ok(Self {
            manifest,
            vectors,
            chunks,
        })
    }

    fn write_files(&self, dir: &Path) -> Result<(), PipelineError> {
        let chunk_bytes = encode_chunks(&self.chunks)?;
        write_synced(&dir.join(CHUNKS_FILE), |writer| Ok(writer.write_all(&chunk_bytes)?))?;
        let vector_bytes = encode_vectors(&self.vectors)?;
        write_synced(&dir.join(VECTORS_FILE), |writer| Ok(writer.write_all(&vector_bytes)?))?;
        write_synced(&dir.join(MANIFEST_FILE), |writer| {
            Ok(serde_json::to_writer_pretty(writer, &self.manifest)?)
        })?;
        Ok(())
    }
}

fn encode_chunks(chunks: &[Chunk]) -> Result<Vec<u8>, PipelineError> {
    let mut bytes = Vec::new();
    for chunk in chunks {
        serde_json::to_writer(&mut bytes, chunk)?;
        bytes.push(b'\n');
    }
    Ok(bytes)
}

fn encode_vectors(index: &FlatIpIndex) -> Result<Vec<u8>, PipelineError> {
    let mut bytes = Vec::new();
    index.write_to(&mut bytes)?;
    Ok(bytes)
}

fn decode_chunks(bytes: &[u8]) -> Result<Vec<Chunk>, PipelineError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|error| misaligned(format!("{CHUNKS_FILE} is not UTF-8: {error}")))?;
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(PipelineError::from))
        .collect()
}

fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

fn misaligned(details: String) -> PipelineError {
    PipelineError::Configuration(format!("index artifacts are misaligned: {details}; re-run ingestion"))
}

fn write_synced<F>(path: &Path, write: F) -> Result<(), PipelineError>
where
    F: FnOnce(&mut BufWriter<&File>) -> Result<(), PipelineError>,
{
    let file = File::create(path)?;
    let mut writer = BufWriter::new(&file);
    write(&mut writer)?;
    writer.flush()?;
    drop(writer);
    file.sync_all()?;
    Ok(())
}

fn sibling(dir: &Path, suffix: &str) -> Result<PathBuf, PipelineError> {
    let name = dir
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| PipelineError::InvalidArgument(format!("index path has no directory name: {}", dir.display())))?;
    Ok(dir.with_file_name(format!(".{name}-{suffix}")))
}

fn swap_into_place(staging: &Path, dir: &Path) -> Result<(), PipelineError> {
    if !dir.exists() {
        if let Some(parent) = dir.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::rename(staging, dir)?;
        return Ok(());
    }

    let retired = sibling(dir, &format!("retired-{}", Uuid::new_v4()))?;
    fs::rename(dir, &retired)?;
    if let Err(error) = fs::rename(staging, dir) {
        fs::rename(&retired, dir)?;
        return Err(error.into());
    }
    if let Err(error) = fs::remove_dir_all(&retired) {
        warn!(path = %retired.display(), error = %error, "could not remove retired index");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn chunk(id: usize, text: &str) -> Chunk {
        Chunk {
            doc_id: "doc".to_string(),
            chunk_id: Chunk::make_id("doc", 1, id),
            page_num: 1,
            text: text.to_string(),
        }
    }

    fn sample_index() -> EmbeddingIndex {
        let chunks = vec![chunk(0, "alpha"), chunk(1, "beta"), chunk(2, "gamma")];
        let vectors = vec![vec![1.0, 0.0], vec![0.0, 1.0], vec![0.6, 0.8]];
        EmbeddingIndex::from_parts(chunks, &vectors, "test-model").unwrap()
    }

    #[test]
    fn search_joins_rows_back_to_chunks() {
        let index = sample_index();
        let hits = index.search(&[0.0, 1.0], 2).unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk_id, "doc-p1-c1");
        assert_eq!(hits[0].text, "beta");
        assert_eq!(hits[1].chunk_id, "doc-p1-c2");
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn mismatched_parts_are_rejected() {
        let result = EmbeddingIndex::from_parts(vec![chunk(0, "alpha")], &[], "m");
        assert!(result.unwrap_err().is_configuration());
        assert!(EmbeddingIndex::from_parts(Vec::new(), &[], "m").is_err());
    }

    #[test]
    fn persist_then_load_preserves_alignment() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let target = dir.path().join("index");
        let index = sample_index();

        index.persist(&target)?;
        let loaded = EmbeddingIndex::load(&target)?;

        assert_eq!(loaded.manifest(), index.manifest());
        assert_eq!(loaded.chunks(), index.chunks());
        assert_eq!(
            loaded.search(&[0.6, 0.8], 3)?,
            index.search(&[0.6, 0.8], 3)?
        );
        Ok(())
    }

    #[test]
    fn rebuild_replaces_previous_artifacts() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let target = dir.path().join("index");
        sample_index().persist(&target)?;

        let replacement =
            EmbeddingIndex::from_parts(vec![chunk(0, "only")], &[vec![1.0, 0.0]], "test-model")?;
        replacement.persist(&target)?;

        let loaded = EmbeddingIndex::load(&target)?;
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.chunks()[0].text, "only");

        let leftovers = fs::read_dir(dir.path())?.count();
        assert_eq!(leftovers, 1);
        Ok(())
    }

    #[test]
    fn missing_artifacts_ask_for_ingestion() {
        let dir = tempdir().unwrap();
        let error = EmbeddingIndex::load(&dir.path().join("index")).unwrap_err();
        assert!(error.is_configuration());
        assert!(error.to_string().contains("run ingestion first"));
    }

    #[test]
    fn edited_chunk_file_is_detected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let target = dir.path().join("index");
        sample_index().persist(&target)?;

        let path = target.join(CHUNKS_FILE);
        let contents = fs::read_to_string(&path)?;
        let truncated: String = contents.lines().take(2).map(|line| format!("{line}\n")).collect();
        fs::write(&path, truncated)?;

        let error = EmbeddingIndex::load(&target).unwrap_err();
        assert!(error.to_string().contains("misaligned"));
        Ok(())
    }

    #[test]
    fn vectors_from_another_build_are_detected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        sample_index().persist(&first)?;
        EmbeddingIndex::from_parts(vec![chunk(0, "only")], &[vec![1.0, 0.0]], "m")?.persist(&second)?;

        fs::copy(second.join(VECTORS_FILE), first.join(VECTORS_FILE))?;

        let error = EmbeddingIndex::load(&first).unwrap_err();
        assert!(error.is_configuration());
        Ok(())
    }

    #[test]
    fn same_shape_vectors_from_another_build_are_detected() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let first = dir.path().join("first");
        let second = dir.path().join("second");
        let chunks = vec![chunk(0, "alpha"), chunk(1, "beta")];
        EmbeddingIndex::from_parts(chunks.clone(), &[vec![1.0, 0.0], vec![0.0, 1.0]], "m")?.persist(&first)?;
        EmbeddingIndex::from_parts(chunks, &[vec![0.0, 1.0], vec![1.0, 0.0]], "m")?.persist(&second)?;

        fs::copy(second.join(VECTORS_FILE), first.join(VECTORS_FILE))?;

        let error = EmbeddingIndex::load(&first).unwrap_err();
        assert!(error.is_configuration());
        assert!(error.to_string().contains("misaligned"));
        Ok(())
    }

    #[test]
    fn truncated_vectors_file_is_a_configuration_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let target = dir.path().join("index");
        sample_index().persist(&target)?;

        let path = target.join(VECTORS_FILE);
        let bytes = fs::read(&path)?;
        fs::write(&path, &bytes[..bytes.len() - 3])?;

        let error = EmbeddingIndex::load(&target).unwrap_err();
        assert!(error.is_configuration());
        assert!(error.to_string().contains("re-run ingestion"));
        Ok(())
    }

    #[test]
    fn corrupt_vector_header_is_a_configuration_error() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let target = dir.path().join("index");
        let index = sample_index();
        index.persist(&target)?;

        let mut bytes = fs::read(target.join(VECTORS_FILE))?;
        bytes[12..20].copy_from_slice(&(u64::MAX / 2).to_le_bytes());
        fs::write(target.join(VECTORS_FILE), &bytes)?;

        // keep the checksum consistent so the header itself is what gets checked
        let mut manifest = index.manifest().clone();
        manifest.vectors_sha256 = digest(&bytes);
        fs::write(target.join(MANIFEST_FILE), serde_json::to_vec(&manifest)?)?;

        let error = EmbeddingIndex::load(&target).unwrap_err();
        assert!(error.is_configuration());
        assert!(error.to_string().contains("misaligned"));
        Ok(())
    }
}

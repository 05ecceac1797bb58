use crate::config::IngestionOptions;
use crate::error::PipelineError;
use crate::models::{Chunk, Page};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self::from(&IngestionOptions::default())
    }
}

impl From<&IngestionOptions> for ChunkingConfig {
    fn from(value: &IngestionOptions) -> Self {
        Self {
            chunk_size: value.chunk_size,
            overlap: value.overlap,
        }
    }
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, PipelineError> {
        let config = Self {
            chunk_size,
            overlap,
        };
        config.validate()?;
        Ok(config)
    }

    /// The window must advance on every step, otherwise a page never finishes.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.chunk_size == 0 {
            return Err(PipelineError::Configuration(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(PipelineError::Configuration(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Slides a `chunk_size` character window over each page independently.
///
/// Windows are measured in characters, not bytes, and are trimmed; windows
/// that trim to nothing are skipped but still consume a per-page index so
/// ids stay stable for identical input.
pub fn chunk_pages(pages: &[Page], config: ChunkingConfig) -> Result<Vec<Chunk>, PipelineError> {
    config.validate()?;

    let mut chunks = Vec::new();
    for page in pages {
        chunks.extend(chunk_page(page, config));
    }
    Ok(chunks)
}

fn chunk_page(page: &Page, config: ChunkingConfig) -> Vec<Chunk> {
    let chars: Vec<char> = page.text.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0;
    let mut index = 0;

    while start < chars.len() {
        let end = (start + config.chunk_size).min(chars.len());
        let window: String = chars[start..end].iter().collect();
        let text = window.trim();

        if !text.is_empty() {
            chunks.push(Chunk {
                doc_id: page.doc_id.clone(),
                chunk_id: Chunk::make_id(&page.doc_id, page.page_num, index),
                page_num: page.page_num,
                text: text.to_string(),
            });
        }

        index += 1;
        if end == chars.len() {
            break;
        }
        start += config.stride();
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn page(doc_id: &str, page_num: u32, text: &str) -> Page {
        Page {
            doc_id: doc_id.to_string(),
            page_num,
            text: text.to_string(),
        }
    }

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\nof   spacing";
        assert_eq!(normalize_whitespace(input), "A lot of spacing");
    }

    #[test]
    fn overlap_not_smaller_than_chunk_size_fails_fast() {
        assert!(ChunkingConfig::new(10, 10).unwrap_err().is_configuration());
        assert!(ChunkingConfig::new(10, 25).is_err());
        assert!(ChunkingConfig::new(0, 0).is_err());

        let misconfigured = ChunkingConfig {
            chunk_size: 5,
            overlap: 5,
        };
        let result = chunk_pages(&[page("doc", 1, "abcdefghij")], misconfigured);
        assert!(result.is_err());
    }

    #[test]
    fn chunk_count_matches_stride_formula() {
        let text: String = std::iter::repeat('x').take(1_000).collect();
        let config = ChunkingConfig::new(120, 20).unwrap();
        let chunks = chunk_pages(&[page("doc", 1, &text)], config).unwrap();

        // ceil((L - O) / (C - O)) = ceil(980 / 100)
        assert_eq!(chunks.len(), 10);
    }

    #[test]
    fn short_page_yields_single_chunk() {
        let chunks = chunk_pages(&[page("doc", 1, "tiny")], ChunkingConfig::default()).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "tiny");
        assert_eq!(chunks[0].chunk_id, "doc-p1-c0");
    }

    #[test]
    fn consecutive_windows_overlap_and_stay_contiguous() {
        let text = "abcdefghijklmnopqrstuvwxyz";
        let config = ChunkingConfig::new(10, 3).unwrap();
        let chunks = chunk_pages(&[page("doc", 2, text)], config).unwrap();

        let texts: Vec<&str> = chunks.iter().map(|chunk| chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["abcdefghij", "hijklmnopq", "opqrstuvwx", "vwxyz"]);

        for chunk in &chunks {
            assert!(text.contains(&chunk.text));
        }
        for pair in chunks.windows(2) {
            let previous: Vec<char> = pair[0].text.chars().collect();
            let tail: String = previous[previous.len() - 3..].iter().collect();
            assert!(pair[1].text.starts_with(&tail));
        }
    }

    #[test]
    fn windows_are_counted_in_characters() {
        let text = "héllo wörld ünïcode";
        let config = ChunkingConfig::new(6, 1).unwrap();
        let chunks = chunk_pages(&[page("doc", 1, text)], config).unwrap();
        assert!(chunks.iter().all(|chunk| chunk.text.chars().count() <= 6));
        assert_eq!(chunks[0].text, "héllo");
    }

    #[test]
    fn blank_windows_are_skipped_but_keep_index() {
        let text = format!("{}{}", "ab", " ".repeat(20));
        let config = ChunkingConfig::new(8, 2).unwrap();
        let chunks = chunk_pages(&[page("doc", 1, &text)], config).unwrap();

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "ab");
        assert!(chunks.iter().all(|chunk| !chunk.text.trim().is_empty()));
    }

    #[test]
    fn chunks_never_cross_pages_and_ids_are_unique() {
        let pages = vec![
            page("cv", 1, &"first page text ".repeat(40)),
            page("cv", 2, &"second page text ".repeat(40)),
            page("other", 1, &"first page text ".repeat(40)),
        ];
        let config = ChunkingConfig::new(100, 10).unwrap();
        let chunks = chunk_pages(&pages, config).unwrap();

        let ids: HashSet<&str> = chunks.iter().map(|chunk| chunk.chunk_id.as_str()).collect();
        assert_eq!(ids.len(), chunks.len());

        for chunk in &chunks {
            let source = pages
                .iter()
                .find(|page| page.doc_id == chunk.doc_id && page.page_num == chunk.page_num)
                .unwrap();
            assert!(source.text.contains(&chunk.text));
        }
    }

    #[test]
    fn chunking_is_reproducible() {
        let pages = vec![page("doc", 1, &"repeatable ".repeat(300))];
        let first = chunk_pages(&pages, ChunkingConfig::default()).unwrap();
        let second = chunk_pages(&pages, ChunkingConfig::default()).unwrap();
        assert_eq!(first, second);
    }
}

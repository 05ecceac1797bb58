use serde::{Deserialize, Serialize};

/// One physical page of extracted document text, numbered from 1.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Page {
    pub doc_id: String,
    pub page_num: u32,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub doc_id: String,
    pub chunk_id: String,
    pub page_num: u32,
    pub text: String,
}

impl Chunk {
    pub fn make_id(doc_id: &str, page_num: u32, index: usize) -> String {
        format!("{doc_id}-p{page_num}-c{index}")
    }
}

/// A chunk joined back from the index together with its cosine similarity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievedChunk {
    pub score: f32,
    pub doc_id: String,
    pub chunk_id: String,
    pub page_num: u32,
    pub text: String,
}

impl RetrievedChunk {
    pub fn from_chunk(chunk: &Chunk, score: f32) -> Self {
        Self {
            score,
            doc_id: chunk.doc_id.clone(),
            chunk_id: chunk.chunk_id.clone(),
            page_num: chunk.page_num,
            text: chunk.text.clone(),
        }
    }
}

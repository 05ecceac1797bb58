use crate::chunking::normalize_whitespace;
use crate::error::PipelineError;
use crate::models::Page;
use lopdf::Document;
use std::path::Path;

pub trait PageLoader {
    fn load_pages(&self, path: &Path, doc_id: &str) -> Result<Vec<Page>, PipelineError>;
}

/// Text-layer extraction with `lopdf`. Whitespace is collapsed and pages
/// without text are dropped, so page numbers may have gaps.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfLoader;

impl PageLoader for LopdfLoader {
    fn load_pages(&self, path: &Path, doc_id: &str) -> Result<Vec<Page>, PipelineError> {
        let document = Document::load(path).map_err(|error| PipelineError::PdfParse(error.to_string()))?;

        let mut pages = Vec::new();
        for (page_num, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_num])
                .map_err(|error| PipelineError::PdfParse(error.to_string()))?;

            if let Some(page) = clean_page(doc_id, page_num, &text) {
                pages.push(page);
            }
        }

        if pages.is_empty() {
            return Err(PipelineError::PdfParse(format!(
                "pdf had no readable page text: {}",
                path.display()
            )));
        }

        Ok(pages)
    }
}

fn clean_page(doc_id: &str, page_num: u32, raw: &str) -> Option<Page> {
    let text = normalize_whitespace(raw);
    if text.is_empty() {
        return None;
    }
    Some(Page {
        doc_id: doc_id.to_string(),
        page_num,
        text,
    })
}

pub fn load_pdf(path: &Path, doc_id: &str) -> Result<Vec<Page>, PipelineError> {
    LopdfLoader.load_pages(path, doc_id)
}

use crate::models::RetrievedChunk;

pub const BLOCK_SEPARATOR: &str = "\n\n---\n\n";

pub fn format_block(chunk: &RetrievedChunk) -> String {
    format!(
        "[chunk_id={} page={}]\n{}",
        chunk.chunk_id, chunk.page_num, chunk.text
    )
}

/// Concatenates labelled chunk blocks in ranked order until the next block
/// would push the running total past `max_chars`.
///
/// Blocks are never cut: each is wholly in or wholly out, and assembly stops
/// at the first block that does not fit so lower-ranked blocks cannot jump
/// ahead of it. The budget counts block characters; separators are not
/// charged against it.
pub fn assemble(chunks: &[RetrievedChunk], max_chars: usize) -> String {
    let mut parts = Vec::new();
    let mut total = 0usize;

    for chunk in chunks {
        let block = format_block(chunk);
        let block_chars = block.chars().count();
        if total + block_chars > max_chars {
            break;
        }
        total += block_chars;
        parts.push(block);
    }

    parts.join(BLOCK_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retrieved(id: &str, page_num: u32, text: &str) -> RetrievedChunk {
        RetrievedChunk {
            score: 0.5,
            doc_id: "doc".to_string(),
            chunk_id: id.to_string(),
            page_num,
            text: text.to_string(),
        }
    }

    #[test]
    fn blocks_are_labelled_and_joined_in_rank_order() {
        let chunks = vec![retrieved("doc-p2-c0", 2, "second page"), retrieved("doc-p1-c0", 1, "first page")];
        let context = assemble(&chunks, 1_000);

        assert_eq!(
            context,
            "[chunk_id=doc-p2-c0 page=2]\nsecond page\n\n---\n\n[chunk_id=doc-p1-c0 page=1]\nfirst page"
        );
    }

    #[test]
    fn block_that_overflows_is_excluded_whole() {
        let first = retrieved("a", 1, "x".repeat(50).as_str());
        let second = retrieved("b", 1, "y".repeat(50).as_str());
        let first_len = format_block(&first).chars().count();

        let context = assemble(&[first.clone(), second], first_len + 10);

        assert_eq!(context, format_block(&first));
        assert!(!context.contains('y'));
    }

    #[test]
    fn assembly_stops_at_first_block_that_does_not_fit() {
        let chunks = vec![
            retrieved("a", 1, "short"),
            retrieved("b", 1, &"z".repeat(500)),
            retrieved("c", 1, "tiny"),
        ];
        let context = assemble(&chunks, 100);

        assert!(context.contains("short"));
        assert!(!context.contains("tiny"));
    }

    #[test]
    fn nothing_fits_or_nothing_retrieved_gives_empty_context() {
        assert!(assemble(&[], 12_000).is_empty());
        assert!(assemble(&[retrieved("a", 1, "some text")], 5).is_empty());
    }

    #[test]
    fn exact_fit_is_included() {
        let chunk = retrieved("a", 1, "fits");
        let budget = format_block(&chunk).chars().count();
        assert_eq!(assemble(&[chunk.clone()], budget), format_block(&chunk));
    }
}

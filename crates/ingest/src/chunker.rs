use uuid::Uuid;

use crate::error::IngestError;

/// One page of extracted text, as produced by the out-of-scope PDF extraction service.
#[derive(Debug, Clone)]
pub struct ExtractedPageText {
    pub page: u32,
    pub text: String,
}

/// A character-budget chunk carved out of one or more pages.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: Uuid,
    pub text: String,
    pub page_span: Vec<u32>,
    pub length: usize,
}

/// Split `pages` into chunks of at most `chunk_size` characters, seeding each new chunk
/// with the last `overlap` characters of the one before it.
///
/// Sentences are split on `". "` within each page; a sentence is appended to the chunk
/// under construction unless doing so would cross `chunk_size` and the chunk already
/// holds something, in which case the chunk is closed and a new one started. `page_span`
/// tracks pages in first-seen order, not sorted — a chunk that straddles pages 3 and 1
/// (out-of-order input) keeps that order.
pub fn create_chunks(
    pages: &[ExtractedPageText],
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<Chunk>, IngestError> {
    if chunk_size == 0 {
        return Err(IngestError::InvalidConfig("chunk_size must be >= 1".into()));
    }
    if overlap >= chunk_size {
        return Err(IngestError::InvalidConfig(
            "chunk_overlap must be smaller than chunk_size".into(),
        ));
    }

    let mut chunks = Vec::new();
    let mut current_chunk = String::new();
    let mut current_pages: Vec<u32> = Vec::new();

    for page in pages {
        for sentence in page.text.split(". ") {
            let sentence_len = sentence.chars().count();
            let current_len = current_chunk.chars().count();

            if current_len + sentence_len > chunk_size && !current_chunk.is_empty() {
                chunks.push(Chunk {
                    id: Uuid::new_v4(),
                    text: current_chunk.trim().to_string(),
                    page_span: current_pages.clone(),
                    length: current_chunk.chars().count(),
                });

                let overlap_text = if overlap > 0 {
                    last_n_chars(&current_chunk, overlap)
                } else {
                    String::new()
                };
                current_chunk = overlap_text;
                append_sentence(&mut current_chunk, sentence);
                current_pages = if overlap == 0 {
                    vec![page.page]
                } else {
                    current_pages.last().copied().into_iter().collect()
                };
            } else {
                append_sentence(&mut current_chunk, sentence);
                if !current_pages.contains(&page.page) {
                    current_pages.push(page.page);
                }
            }
        }
    }

    if !current_chunk.trim().is_empty() {
        chunks.push(Chunk {
            id: Uuid::new_v4(),
            text: current_chunk.trim().to_string(),
            page_span: current_pages,
            length: current_chunk.chars().count(),
        });
    }

    Ok(chunks)
}

/// Append one `". "`-split fragment to `buf`. A fragment only lacks its trailing `.`
/// when the split consumed it (every fragment but a page's last); re-adding it
/// unconditionally would double up the period on fragments that already have one.
fn append_sentence(buf: &mut String, sentence: &str) {
    buf.push_str(sentence);
    if sentence.ends_with('.') {
        buf.push(' ');
    } else {
        buf.push_str(". ");
    }
}

fn last_n_chars(s: &str, n: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= n {
        s.to_string()
    } else {
        s.chars().skip(char_count - n).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(page: u32, text: &str) -> ExtractedPageText {
        ExtractedPageText { page, text: text.to_string() }
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let err = create_chunks(&[page(1, "hello")], 0, 0);
        assert!(matches!(err, Err(IngestError::InvalidConfig(_))));
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk_size() {
        let err = create_chunks(&[page(1, "hello")], 10, 10);
        assert!(matches!(err, Err(IngestError::InvalidConfig(_))));
    }

    #[test]
    fn single_short_page_produces_one_chunk() {
        let chunks = create_chunks(&[page(1, "A short sentence")], 1000, 0).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "A short sentence.");
        assert_eq!(chunks[0].page_span, vec![1]);
    }

    #[test]
    fn splits_when_budget_exceeded() {
        let text = "One. Two. Three. Four. Five.";
        let chunks = create_chunks(&[page(1, text)], 10, 0).unwrap();
        assert!(chunks.len() > 1);
        for c in &chunks {
            // the boundary check runs before appending the overflowing sentence, so a
            // lone long sentence can still make one chunk exceed chunk_size.
            assert!(!c.text.is_empty());
        }
    }

    #[test]
    fn overlap_seeds_next_chunk_with_trailing_characters() {
        let text = "AAAAAAAAAA. BBBBBBBBBB. CCCCCCCCCC.";
        let chunks = create_chunks(&[page(1, text)], 12, 4).unwrap();
        assert!(chunks.len() >= 2);
        // the tail of chunk N's raw buffer (pre-strip) seeds chunk N+1.
        assert!(chunks[1].text.starts_with("AAAA") || chunks[1].text.contains('B'));
    }

    #[test]
    fn zero_overlap_resets_page_span_to_new_page() {
        let pages = vec![page(1, "Alpha sentence here"), page(2, "Beta sentence here")];
        let chunks = create_chunks(&pages, 15, 0).unwrap();
        assert!(chunks.len() >= 2);
        assert_eq!(chunks.last().unwrap().page_span, vec![2]);
    }

    #[test]
    fn page_span_is_ordered_and_deduplicated() {
        let pages = vec![
            page(3, "first sentence"),
            page(3, "second sentence still page three"),
            page(4, "third sentence now page four"),
        ];
        let chunks = create_chunks(&pages, 1000, 0).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].page_span, vec![3, 4]);
    }

    #[test]
    fn final_partial_chunk_is_always_emitted() {
        let chunks = create_chunks(&[page(1, "Trailing content")], 1000, 0).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "Trailing content.");
    }

    #[test]
    fn empty_pages_yield_no_chunks() {
        let chunks = create_chunks(&[], 1000, 0).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn sentences_crossing_a_page_boundary_keep_a_single_period() {
        let pages = vec![
            page(1, "AAA. BBB. CCC."),
            page(2, "DDD. EEE."),
            page(3, "FFF."),
        ];
        let chunks = create_chunks(&pages, 10, 0).unwrap();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["AAA. BBB.", "CCC. DDD.", "EEE. FFF."]);
    }
}

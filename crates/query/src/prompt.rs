use serde::Deserialize;

use pdfchat_clients::SearchHit;

/// Shape of the `payload` every ingested vector carries, as written by the Ingestion
/// Orchestrator's Store stage. Fields unused for prompting (`length`, `job_id`,
/// `metadata`) are left unparsed.
#[derive(Debug, Deserialize)]
struct StoredChunkPayload {
    text: String,
    page_span: Vec<u32>,
}

/// One included context section plus the page span it was sourced from.
pub struct ContextBlock {
    pub text: String,
    pub sources: Vec<Vec<u32>>,
    pub hits_used: usize,
}

/// Rank `hits` by descending score, keep only those above `threshold`, and render each
/// as a numbered `Context {i} (Pages ..., Relevance: ...): {text}` section.
pub fn build_context(hits: &[SearchHit], threshold: f32) -> ContextBlock {
    let mut ranked: Vec<&SearchHit> = hits.iter().collect();
    ranked.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut sections = Vec::new();
    let mut sources = Vec::new();
    for hit in ranked.into_iter().filter(|h| h.score > threshold) {
        let Ok(chunk) = serde_json::from_value::<StoredChunkPayload>(hit.payload.clone()) else {
            continue;
        };
        let pages = chunk
            .page_span
            .iter()
            .map(|p| p.to_string())
            .collect::<Vec<_>>()
            .join(", ");
        sections.push(format!(
            "Context {} (Pages {pages}, Relevance: {:.2}):\n{}",
            sections.len() + 1,
            hit.score,
            chunk.text,
        ));
        sources.push(chunk.page_span);
    }

    ContextBlock {
        hits_used: sections.len(),
        text: sections.join("\n\n"),
        sources,
    }
}

/// The grounded template used when at least one context section survives the threshold.
pub fn grounded_prompt(context_text: &str, query: &str) -> String {
    format!(
        "Based on the following context from the uploaded documents, please answer the user's question:\n\n\
         Context:\n{context_text}\n\n\
         User Question: {query}\n\n\
         Please provide a comprehensive answer based on the context provided. If the context doesn't contain enough information to answer the question, please say so.\n\n\
         Assistant:"
    )
}

/// The bare template used when no context section clears the similarity threshold.
pub fn ungrounded_prompt(query: &str) -> String {
    format!("User: {query}\nAssistant:")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn hit(score: f32, pages: Vec<u32>, text: &str) -> SearchHit {
        SearchHit {
            id: "x".into(),
            score,
            payload: json!({ "text": text, "page_span": pages }),
        }
    }

    #[test]
    fn orders_by_descending_score_and_filters_threshold() {
        let hits = vec![
            hit(0.40, vec![9], "low relevance"),
            hit(0.91, vec![1], "top hit"),
            hit(0.72, vec![2, 3], "second hit"),
        ];
        let block = build_context(&hits, 0.7);
        assert_eq!(block.hits_used, 2);
        assert!(block.text.starts_with("Context 1"));
        assert!(block.text.contains("top hit"));
        assert!(block.text.contains("Context 2"));
        assert!(block.text.contains("second hit"));
        assert!(!block.text.contains("low relevance"));
        assert_eq!(block.sources, vec![vec![1], vec![2, 3]]);
    }

    #[test]
    fn no_hit_above_threshold_yields_empty_context() {
        let hits = vec![hit(0.50, vec![1], "a"), hit(0.40, vec![2], "b")];
        let block = build_context(&hits, 0.7);
        assert_eq!(block.hits_used, 0);
        assert!(block.text.is_empty());
    }

    #[test]
    fn grounded_template_embeds_context_and_query() {
        let prompt = grounded_prompt("Context 1 (Pages 1, Relevance: 0.91):\nhello", "What is this?");
        assert!(prompt.starts_with("Based on the following context"));
        assert!(prompt.contains("Context 1 (Pages 1, Relevance: 0.91):\nhello"));
        assert!(prompt.contains("User Question: What is this?"));
        assert!(prompt.trim_end().ends_with("Assistant:"));
    }

    #[test]
    fn ungrounded_template_is_bare() {
        assert_eq!(ungrounded_prompt("hi"), "User: hi\nAssistant:");
    }
}

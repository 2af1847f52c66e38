use serde::{Deserialize, Serialize};

/// Answer to a single chat turn, returned whether or not any context was found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub response: String,
    pub context_used: usize,
    pub context_sources: Vec<Vec<u32>>,
    pub model: String,
    pub processing_time: f64,
}

impl QueryResponse {
    /// Well-typed fallback returned when an upstream collaborator (embedding, vector
    /// store, or LLM) fails — the chat turn still gets an answer, just not a grounded one.
    pub fn apology(processing_time: f64) -> Self {
        Self {
            response: "I'm sorry, I'm having trouble answering right now. Please try again in a moment.".to_string(),
            context_used: 0,
            context_sources: Vec::new(),
            model: "unknown".to_string(),
            processing_time,
        }
    }
}

use std::time::Instant;

use pdfchat_clients::{EmbeddingClient, LlmClient, VectorStoreClient};
use pdfchat_core::config::{ClientsConfig, EmbeddingConfig, QueryConfig};
use pdfchat_core::SessionId;
use pdfchat_session::{ConversationEntry, ConversationRole, SessionStore};
use tracing::warn;

use crate::error::QueryError;
use crate::prompt::{build_context, grounded_prompt, ungrounded_prompt};
use crate::response::QueryResponse;

/// Holds every collaborator a chat turn needs: the embedding/vector/LLM clients and the
/// session store, plus the tunables that decide how much context gets pulled in.
pub struct QueryOrchestrator {
    embedder: EmbeddingClient,
    vector_store: VectorStoreClient,
    llm: LlmClient,
    sessions: SessionStore,
    config: QueryConfig,
}

impl QueryOrchestrator {
    pub fn new(
        clients: &ClientsConfig,
        embedding: &EmbeddingConfig,
        sessions: SessionStore,
        config: QueryConfig,
    ) -> Self {
        Self {
            embedder: EmbeddingClient::new(
                clients.embedding_url.clone(),
                embedding.max_texts_per_call,
                embedding.max_text_length,
            ),
            vector_store: VectorStoreClient::new(clients.vector_store_url.clone(), clients.collection_name.clone()),
            llm: LlmClient::new(clients.llm_url.clone()),
            sessions,
            config,
        }
    }

    /// Answer one chat turn: create or reuse `session_id`, ground the query against the
    /// vector store, call the LLM, and append both sides of the turn to the session's
    /// history. Any upstream failure (embed/search/generate) is caught into a well-typed
    /// apology response rather than propagated — a session-store failure is not.
    pub async fn ask(
        &self,
        session_id: Option<SessionId>,
        user_id: Option<String>,
        query: &str,
        model: Option<&str>,
        max_tokens: Option<u32>,
    ) -> Result<(SessionId, QueryResponse), QueryError> {
        let session_id = self.sessions.create_session(session_id, user_id).await?;
        let started = Instant::now();
        let max_tokens = max_tokens.unwrap_or(self.config.max_context_length);

        let answer = match self.answer(query, model, max_tokens).await {
            Ok(response) => response,
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "query failed, returning apology");
                QueryResponse::apology(started.elapsed().as_secs_f64())
            }
        };

        self.sessions
            .append_conversation(&session_id, ConversationEntry::new(ConversationRole::User, query))
            .await?;
        self.sessions
            .append_conversation(&session_id, ConversationEntry::new(ConversationRole::Assistant, answer.response.clone()))
            .await?;
        self.sessions.touch(&session_id).await?;

        Ok((session_id, answer))
    }

    async fn answer(
        &self,
        query: &str,
        model: Option<&str>,
        max_tokens: u32,
    ) -> Result<QueryResponse, pdfchat_clients::ClientError> {
        let started = Instant::now();

        let embedded = self.embedder.embed(&[query.to_string()]).await?;
        let query_vector = embedded
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| pdfchat_clients::ClientError::Parse("empty embedding response".into()))?;

        let search = self
            .vector_store
            .search(&query_vector, self.config.max_search_results, 0.0)
            .await?;
        let context = build_context(&search.results, self.config.similarity_threshold);

        let prompt = if context.hits_used > 0 {
            grounded_prompt(&context.text, query)
        } else {
            ungrounded_prompt(query)
        };

        let generated = self
            .llm
            .generate(&prompt, model, max_tokens, self.config.temperature)
            .await?;

        Ok(QueryResponse {
            response: generated.response,
            context_used: context.hits_used,
            context_sources: context.sources,
            model: generated.model,
            processing_time: started.elapsed().as_secs_f64(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orchestrator_holds_configured_threshold() {
        let config = QueryConfig {
            max_context_length: 4000,
            max_search_results: 5,
            similarity_threshold: 0.7,
            temperature: 0.7,
            distance_metric: "Cosine".to_string(),
        };
        assert_eq!(config.similarity_threshold, 0.7);
    }
}

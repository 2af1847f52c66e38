use chrono::Utc;
use pdfchat_core::SessionId;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::info;

use crate::error::SessionError;
use crate::model::{ConversationEntry, SessionRecord};

const SESSIONS_INDEX_KEY: &str = "sessions:index";

fn session_key(id: &SessionId) -> String {
    format!("chat_session:{id}")
}

fn conversation_key(id: &SessionId) -> String {
    format!("chat_conversation:{id}")
}

fn user_index_key(user_id: &str) -> String {
    format!("sessions:by_user:{user_id}")
}

/// Redis-backed chat session store: `chat_session:{id}` (hash, TTLed) plus
/// `chat_conversation:{id}` (list, TTLed, trimmed to `conversation_cap`).
#[derive(Clone)]
pub struct SessionStore {
    conn: ConnectionManager,
    session_timeout_secs: u64,
    conversation_cap: usize,
}

impl SessionStore {
    pub fn new(conn: ConnectionManager, session_timeout_secs: u64, conversation_cap: usize) -> Self {
        Self {
            conn,
            session_timeout_secs,
            conversation_cap,
        }
    }

    /// Create a session, reusing `id` if supplied (idempotent — an existing session
    /// with that id is left untouched rather than reset).
    pub async fn create_session(
        &self,
        id: Option<SessionId>,
        user_id: Option<String>,
    ) -> Result<SessionId, SessionError> {
        let id = id.unwrap_or_else(SessionId::new_v4);
        if self.get(&id).await?.is_some() {
            return Ok(id);
        }

        let now = Utc::now();
        let record = SessionRecord {
            id,
            user_id: user_id.clone(),
            created_at: now,
            last_activity: now,
            message_count: 0,
        };
        self.write_record(&record).await?;

        let mut conn = self.conn.clone();
        let _: () = conn.sadd(SESSIONS_INDEX_KEY, id.to_string()).await?;
        if let Some(user_id) = user_id {
            let _: () = conn.sadd(user_index_key(&user_id), id.to_string()).await?;
        }

        info!(session_id = %id, "session created");
        Ok(id)
    }

    async fn write_record(&self, record: &SessionRecord) -> Result<(), SessionError> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(record)?;
        let key = session_key(&record.id);
        let _: () = conn.set(&key, json).await?;
        let _: () = conn.expire(&key, self.session_timeout_secs as i64).await?;
        Ok(())
    }

    pub async fn get(&self, id: &SessionId) -> Result<Option<SessionRecord>, SessionError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(session_key(id)).await?;
        Ok(match raw {
            Some(json) => Some(serde_json::from_str(&json)?),
            None => None,
        })
    }

    /// Update `last_activity`, increment `message_count`, and refresh the session's TTL.
    pub async fn touch(&self, id: &SessionId) -> Result<(), SessionError> {
        let mut record = self
            .get(id)
            .await?
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        record.last_activity = Utc::now();
        record.message_count += 1;
        self.write_record(&record).await
    }

    /// Append a conversation turn, trimming to `conversation_cap` and refreshing TTL
    /// on both the conversation list and the session hash.
    pub async fn append_conversation(
        &self,
        id: &SessionId,
        entry: ConversationEntry,
    ) -> Result<(), SessionError> {
        if self.get(id).await?.is_none() {
            return Err(SessionError::NotFound(id.to_string()));
        }

        let mut conn = self.conn.clone();
        let key = conversation_key(id);
        let json = serde_json::to_string(&entry)?;
        let _: () = conn.rpush(&key, json).await?;
        let cap = self.conversation_cap as isize;
        let _: () = conn.ltrim(&key, -cap, -1).await?;
        let _: () = conn.expire(&key, self.session_timeout_secs as i64).await?;

        let session_key = session_key(id);
        let _: () = conn.expire(&session_key, self.session_timeout_secs as i64).await?;
        Ok(())
    }

    pub async fn get_conversation(
        &self,
        id: &SessionId,
    ) -> Result<Vec<ConversationEntry>, SessionError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.lrange(conversation_key(id), 0, -1).await?;
        raw.iter()
            .map(|json| serde_json::from_str(json).map_err(SessionError::from))
            .collect()
    }

    /// Delete a session and its conversation history. Returns whether a session existed.
    pub async fn delete(&self, id: &SessionId) -> Result<bool, SessionError> {
        let Some(record) = self.get(id).await? else {
            return Ok(false);
        };

        let mut conn = self.conn.clone();
        let _: () = conn.del(session_key(id)).await?;
        let _: () = conn.del(conversation_key(id)).await?;
        let _: () = conn.srem(SESSIONS_INDEX_KEY, id.to_string()).await?;
        if let Some(user_id) = record.user_id {
            let _: () = conn.srem(user_index_key(&user_id), id.to_string()).await?;
        }
        Ok(true)
    }

    /// List session ids, optionally scoped to one user via the secondary index.
    pub async fn list(&self, user_id: Option<&str>) -> Result<Vec<SessionId>, SessionError> {
        let mut conn = self.conn.clone();
        let key = match user_id {
            Some(user_id) => user_index_key(user_id),
            None => SESSIONS_INDEX_KEY.to_string(),
        };
        let raw: Vec<String> = conn.smembers(key).await?;
        raw.iter()
            .filter_map(|s| s.parse::<SessionId>().ok())
            .map(Ok)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_naming_matches_spec_prefixes() {
        let id = SessionId::nil();
        assert_eq!(session_key(&id), format!("chat_session:{id}"));
        assert_eq!(conversation_key(&id), format!("chat_conversation:{id}"));
        assert_eq!(user_index_key("alice"), "sessions:by_user:alice");
    }
}

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use pdfchat_core::JobId;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};

use crate::error::IngestError;

const JOBS_INDEX_KEY: &str = "pdf_jobs:index";

fn job_key(id: &JobId) -> String {
    format!("pdf_job:{id}")
}

fn hash_index_key(content_hash: &str) -> String {
    format!("pdf_jobs:by_hash:{content_hash}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    fn as_str(self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(JobStatus::Queued),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// `pdf_job:{id}` as read back from Redis. Numeric fields not yet written decode as
/// `None`/`0` rather than failing the read.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub id: JobId,
    pub status: JobStatus,
    pub progress: u8,
    pub content_hash: String,
    pub source_path: String,
    pub pages: Option<u32>,
    pub chunks: Option<u32>,
    pub total_batches: Option<u32>,
    pub batches_done: u32,
    pub vectors_stored: u32,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Redis-backed job-status table, keyed `pdf_job:{id}`. Every update after `create` is
/// a single `HSET`/`HINCRBY` field write — never a whole-record read-modify-write.
#[derive(Clone)]
pub struct JobStore {
    conn: ConnectionManager,
    job_ttl_secs: u64,
}

impl JobStore {
    pub fn new(conn: ConnectionManager, job_ttl_secs: u64) -> Self {
        Self { conn, job_ttl_secs }
    }

    /// Accept a file by content hash. Reuses the id of an existing non-terminal job for
    /// the same hash; otherwise creates a fresh `queued` job. The returned bool marks
    /// whether this call actually started a new job (vs. returning an existing one).
    pub async fn create(
        &self,
        content_hash: &str,
        source_path: &str,
    ) -> Result<(JobId, bool), IngestError> {
        let mut conn = self.conn.clone();
        let existing: Option<String> = conn.get(hash_index_key(content_hash)).await?;
        if let Some(existing_id) = existing {
            if let Ok(id) = existing_id.parse::<JobId>() {
                if let Some(record) = self.get(&id).await? {
                    if !record.status.is_terminal() {
                        return Ok((id, false));
                    }
                }
            }
        }

        let id = JobId::new_v4();
        let key = job_key(&id);
        let fields: Vec<(&str, String)> = vec![
            ("id", id.to_string()),
            ("status", JobStatus::Queued.as_str().to_string()),
            ("progress", "0".to_string()),
            ("content_hash", content_hash.to_string()),
            ("source_path", source_path.to_string()),
            ("batches_done", "0".to_string()),
            ("vectors_stored", "0".to_string()),
            ("created_at", Utc::now().to_rfc3339()),
        ];
        let _: () = conn.hset_multiple(&key, &fields).await?;
        let _: () = conn.expire(&key, self.job_ttl_secs as i64).await?;
        let _: () = conn.set(hash_index_key(content_hash), id.to_string()).await?;
        let _: () = conn
            .expire(hash_index_key(content_hash), self.job_ttl_secs as i64)
            .await?;
        let _: () = conn.sadd(JOBS_INDEX_KEY, id.to_string()).await?;
        Ok((id, true))
    }

    async fn set_field(&self, id: &JobId, field: &str, value: impl ToString) -> Result<(), IngestError> {
        let mut conn = self.conn.clone();
        let _: () = conn.hset(job_key(id), field, value.to_string()).await?;
        Ok(())
    }

    pub async fn set_status(&self, id: &JobId, status: JobStatus) -> Result<(), IngestError> {
        self.set_field(id, "status", status.as_str()).await
    }

    pub async fn set_progress(&self, id: &JobId, progress: u8) -> Result<(), IngestError> {
        self.set_field(id, "progress", progress).await
    }

    pub async fn set_pages(&self, id: &JobId, pages: u32) -> Result<(), IngestError> {
        self.set_field(id, "pages", pages).await
    }

    pub async fn set_chunks(&self, id: &JobId, chunks: u32) -> Result<(), IngestError> {
        self.set_field(id, "chunks", chunks).await
    }

    pub async fn set_total_batches(&self, id: &JobId, total: u32) -> Result<(), IngestError> {
        self.set_field(id, "total_batches", total).await
    }

    pub async fn set_error(&self, id: &JobId, error: &str) -> Result<(), IngestError> {
        self.set_field(id, "error", error).await
    }

    /// Atomically bump `vectors_stored` and `batches_done`, returning the new `batches_done`.
    pub async fn record_batch_completion(
        &self,
        id: &JobId,
        vectors_in_batch: u32,
    ) -> Result<u32, IngestError> {
        let mut conn = self.conn.clone();
        let _: i64 = conn
            .hincr(job_key(id), "vectors_stored", vectors_in_batch as i64)
            .await?;
        let done: i64 = conn.hincr(job_key(id), "batches_done", 1).await?;
        Ok(done as u32)
    }

    pub async fn get(&self, id: &JobId) -> Result<Option<JobRecord>, IngestError> {
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(job_key(id)).await?;
        if fields.is_empty() {
            return Ok(None);
        }
        Ok(Some(JobRecord {
            id: *id,
            status: fields
                .get("status")
                .and_then(|s| JobStatus::parse(s))
                .unwrap_or(JobStatus::Queued),
            progress: fields.get("progress").and_then(|s| s.parse().ok()).unwrap_or(0),
            content_hash: fields.get("content_hash").cloned().unwrap_or_default(),
            source_path: fields.get("source_path").cloned().unwrap_or_default(),
            pages: fields.get("pages").and_then(|s| s.parse().ok()),
            chunks: fields.get("chunks").and_then(|s| s.parse().ok()),
            total_batches: fields.get("total_batches").and_then(|s| s.parse().ok()),
            batches_done: fields.get("batches_done").and_then(|s| s.parse().ok()).unwrap_or(0),
            vectors_stored: fields
                .get("vectors_stored")
                .and_then(|s| s.parse().ok())
                .unwrap_or(0),
            error: fields.get("error").cloned(),
            created_at: fields
                .get("created_at")
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(Utc::now),
        }))
    }

    pub async fn list(&self) -> Result<Vec<JobId>, IngestError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn.smembers(JOBS_INDEX_KEY).await?;
        Ok(raw.iter().filter_map(|s| s.parse::<JobId>().ok()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_round_trips_through_str() {
        for status in [
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(JobStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn terminal_statuses_are_completed_and_failed_only() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn key_naming_matches_spec_prefixes() {
        let id = JobId::nil();
        assert_eq!(job_key(&id), format!("pdf_job:{id}"));
        assert_eq!(hash_index_key("abc123"), "pdf_jobs:by_hash:abc123");
    }
}

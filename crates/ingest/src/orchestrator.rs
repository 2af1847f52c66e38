use std::path::{Path, PathBuf};
use std::sync::Arc;

use pdfchat_broker::Broker;
use pdfchat_clients::{EmbeddingClient, PdfExtractorClient, Point, VectorStoreClient};
use pdfchat_core::config::{ChunkConfig, ClientsConfig, EmbeddingConfig};
use pdfchat_core::{Error as CoreError, JobId, Message, Priority};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::chunker::{create_chunks, Chunk, ExtractedPageText};
use crate::job::{JobStatus, JobStore};

const SOURCE: &str = "pdfchat-ingest";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PageText {
    page: u32,
    text: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ExtractPayload {
    job_id: JobId,
    source_path: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChunkPayload {
    job_id: JobId,
    source_path: String,
    pages: Vec<PageText>,
    metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChunkWire {
    id: Uuid,
    text: String,
    page_span: Vec<u32>,
    length: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct EmbedBatchPayload {
    job_id: JobId,
    source_path: String,
    batch: Vec<ChunkWire>,
    metadata: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct ArchivePayload {
    job_id: JobId,
    source_path: String,
}

/// Shared state behind every ingestion stage handler: the out-of-scope HTTP
/// collaborators plus the `pdf_job:{id}` status table.
pub struct IngestState {
    pub jobs: JobStore,
    pub extractor: PdfExtractorClient,
    pub embedder: EmbeddingClient,
    pub vector_store: VectorStoreClient,
    pub chunk_config: ChunkConfig,
    pub embed_batch_size: usize,
    pub archive_dir: Option<PathBuf>,
}

impl IngestState {
    pub fn new(
        jobs: JobStore,
        clients: &ClientsConfig,
        embedding: &EmbeddingConfig,
        chunk_config: ChunkConfig,
        archive_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            extractor: PdfExtractorClient::new(clients.pdf_extractor_url.clone()),
            embedder: EmbeddingClient::new(
                clients.embedding_url.clone(),
                embedding.max_texts_per_call,
                embedding.max_text_length,
            ),
            vector_store: VectorStoreClient::new(
                clients.vector_store_url.clone(),
                clients.collection_name.clone(),
            ),
            chunk_config,
            embed_batch_size: embedding.batch_size,
            archive_dir,
            jobs,
        }
    }
}

/// Wire the Extract/Chunk/Embed/Archive stage handlers onto `broker`. Accept happens
/// synchronously in [`submit`], ahead of the first published message.
///
/// Each closure holds an `Arc<Broker>` back to the broker it is registered on, so the
/// broker's handler table keeps it alive for the lifetime of the process — acceptable
/// here since a worker's `Broker` is never expected to be dropped before the process
/// exits (`stop()` runs once, right before `main` returns).
pub async fn register_handlers(broker: &Arc<Broker>, state: Arc<IngestState>) {
    let b = broker.clone();
    let s = state.clone();
    broker
        .register_handler("ingest.extract", move |msg| {
            let b = b.clone();
            let s = s.clone();
            async move { handle_extract(&b, &s, msg).await }
        })
        .await;

    let b = broker.clone();
    let s = state.clone();
    broker
        .register_handler("ingest.chunk", move |msg| {
            let b = b.clone();
            let s = s.clone();
            async move { handle_chunk(&b, &s, msg).await }
        })
        .await;

    let b = broker.clone();
    let s = state.clone();
    broker
        .register_handler("ingest.embed_batch", move |msg| {
            let b = b.clone();
            let s = s.clone();
            async move { handle_embed_batch(&b, &s, msg).await }
        })
        .await;

    let s = state.clone();
    broker
        .register_handler("ingest.archive", move |msg| {
            let s = s.clone();
            async move { handle_archive(&s, msg).await }
        })
        .await;
}

/// Accept a PDF already written to `source_path`. Hashes the file, creates (or reuses)
/// its Job, and kicks off the Extract stage. Returns the job id either way.
pub async fn submit(broker: &Broker, state: &IngestState, source_path: &str) -> Result<JobId, CoreError> {
    let bytes = tokio::fs::read(source_path).await?;
    let content_hash = format!("{:x}", Sha256::digest(&bytes));
    let (job_id, started) = state.jobs.create(&content_hash, source_path).await?;

    if started {
        broker
            .publish(
                SOURCE,
                SOURCE,
                "ingest.extract",
                serde_json::to_value(ExtractPayload {
                    job_id,
                    source_path: source_path.to_string(),
                })
                .map_err(|e| CoreError::Serialize(e.to_string()))?,
                Priority::Normal.value(),
                None,
                None,
                None,
                None,
            )
            .await?;
        info!(job_id = %job_id, %content_hash, "ingestion job accepted");
    } else {
        info!(job_id = %job_id, %content_hash, "reusing in-flight job for content hash");
    }

    Ok(job_id)
}

async fn handle_extract(broker: &Broker, state: &IngestState, msg: Message) -> Result<(), CoreError> {
    let payload: ExtractPayload =
        serde_json::from_value(msg.payload.clone()).map_err(|e| CoreError::Serialize(e.to_string()))?;

    let extraction = state.extractor.extract(&payload.source_path).await?;
    let pages: Vec<PageText> = extraction
        .non_empty_pages()
        .map(|p| PageText { page: p.page, text: p.text.clone() })
        .collect();

    if pages.is_empty() {
        state.jobs.set_status(&payload.job_id, JobStatus::Failed).await?;
        state.jobs.set_error(&payload.job_id, "no_text").await?;
        warn!(job_id = %payload.job_id, "no extractable text in source document");
        return Ok(());
    }

    state.jobs.set_status(&payload.job_id, JobStatus::Processing).await?;
    state.jobs.set_progress(&payload.job_id, 10).await?;
    state.jobs.set_pages(&payload.job_id, extraction.total_pages).await?;
    state.jobs.set_progress(&payload.job_id, 30).await?;

    broker
        .publish(
            SOURCE,
            SOURCE,
            "ingest.chunk",
            serde_json::to_value(ChunkPayload {
                job_id: payload.job_id,
                source_path: payload.source_path,
                pages,
                metadata: extraction.metadata,
            })
            .map_err(|e| CoreError::Serialize(e.to_string()))?,
            Priority::Normal.value(),
            None,
            None,
            None,
            None,
        )
        .await?;
    Ok(())
}

async fn handle_chunk(broker: &Broker, state: &IngestState, msg: Message) -> Result<(), CoreError> {
    let payload: ChunkPayload =
        serde_json::from_value(msg.payload.clone()).map_err(|e| CoreError::Serialize(e.to_string()))?;

    let extracted: Vec<ExtractedPageText> = payload
        .pages
        .iter()
        .map(|p| ExtractedPageText { page: p.page, text: p.text.clone() })
        .collect();
    let all_chunks: Vec<Chunk> = create_chunks(
        &extracted,
        state.chunk_config.chunk_size,
        state.chunk_config.chunk_overlap,
    )?;

    state.jobs.set_chunks(&payload.job_id, all_chunks.len() as u32).await?;
    state.jobs.set_progress(&payload.job_id, 50).await?;

    let batch_size = state.embed_batch_size.max(1);
    let batches: Vec<Vec<Chunk>> = all_chunks.chunks(batch_size).map(|b| b.to_vec()).collect();
    let total_batches = batches.len() as u32;

    if total_batches == 0 {
        // Chunking produced nothing even though extraction found text — treat as a
        // completed, empty job rather than leaving it stuck at progress 50.
        state.jobs.set_status(&payload.job_id, JobStatus::Completed).await?;
        state.jobs.set_progress(&payload.job_id, 100).await?;
        return Ok(());
    }
    state.jobs.set_total_batches(&payload.job_id, total_batches).await?;

    for batch in batches {
        let wire: Vec<ChunkWire> = batch
            .into_iter()
            .map(|c| ChunkWire { id: c.id, text: c.text, page_span: c.page_span, length: c.length })
            .collect();
        broker
            .publish(
                SOURCE,
                SOURCE,
                "ingest.embed_batch",
                serde_json::to_value(EmbedBatchPayload {
                    job_id: payload.job_id,
                    source_path: payload.source_path.clone(),
                    batch: wire,
                    metadata: payload.metadata.clone(),
                })
                .map_err(|e| CoreError::Serialize(e.to_string()))?,
                Priority::Normal.value(),
                None,
                None,
                None,
                None,
            )
            .await?;
    }
    Ok(())
}

async fn handle_embed_batch(broker: &Broker, state: &IngestState, msg: Message) -> Result<(), CoreError> {
    let payload: EmbedBatchPayload =
        serde_json::from_value(msg.payload.clone()).map_err(|e| CoreError::Serialize(e.to_string()))?;

    let texts: Vec<String> = payload.batch.iter().map(|c| c.text.clone()).collect();
    let embeddings = state.embedder.embed(&texts).await?;

    let points: Vec<Point> = payload
        .batch
        .iter()
        .zip(embeddings.embeddings.iter())
        .map(|(chunk, vector)| Point {
            id: chunk.id.to_string(),
            vector: vector.clone(),
            payload: json!({
                "text": chunk.text,
                "page_span": chunk.page_span,
                "length": chunk.length,
                "job_id": payload.job_id,
                "metadata": payload.metadata,
            }),
        })
        .collect();

    state.vector_store.upsert(&points).await?;
    let done = state.jobs.record_batch_completion(&payload.job_id, points.len() as u32).await?;

    let Some(record) = state.jobs.get(&payload.job_id).await? else {
        return Ok(());
    };
    let Some(total) = record.total_batches else {
        return Ok(());
    };

    let progress = 50 + ((done as u64 * 50) / total as u64).min(50) as u8;
    state.jobs.set_progress(&payload.job_id, progress).await?;

    if done >= total {
        state.jobs.set_status(&payload.job_id, JobStatus::Completed).await?;
        state.jobs.set_progress(&payload.job_id, 100).await?;
        info!(
            job_id = %payload.job_id,
            vectors_stored = record.vectors_stored,
            "ingestion completed"
        );

        if let Err(e) = broker
            .publish(
                SOURCE,
                SOURCE,
                "ingest.archive",
                serde_json::to_value(ArchivePayload {
                    job_id: payload.job_id,
                    source_path: payload.source_path.clone(),
                })
                .map_err(|e| CoreError::Serialize(e.to_string()))?,
                Priority::Low.value(),
                None,
                None,
                None,
                Some(1),
            )
            .await
        {
            warn!(job_id = %payload.job_id, error = %e, "failed to publish archive stage");
        }
    }
    Ok(())
}

async fn handle_archive(state: &IngestState, msg: Message) -> Result<(), CoreError> {
    let payload: ArchivePayload =
        serde_json::from_value(msg.payload.clone()).map_err(|e| CoreError::Serialize(e.to_string()))?;

    let Some(archive_dir) = &state.archive_dir else {
        return Ok(());
    };
    let source = Path::new(&payload.source_path);
    let Some(file_name) = source.file_name() else {
        return Ok(());
    };
    let dest = archive_dir.join(file_name);

    if let Err(e) = tokio::fs::rename(source, &dest).await {
        warn!(job_id = %payload.job_id, error = %e, "archive move failed, leaving source file in place");
    }
    Ok(())
}

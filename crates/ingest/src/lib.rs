pub mod chunker;
pub mod error;
pub mod job;
pub mod orchestrator;

pub use chunker::{create_chunks, Chunk, ExtractedPageText};
pub use error::IngestError;
pub use job::{JobRecord, JobStatus, JobStore};
pub use orchestrator::{register_handlers, submit, IngestState};

pub mod embedding;
pub mod error;
pub mod llm;
pub mod pdf_extractor;
pub mod vector_store;

pub use embedding::{BatchStatus, EmbedResponse, EmbeddingClient};
pub use error::ClientError;
pub use llm::{ChatMessage, ChatRole, GenerateResponse, LlmClient};
pub use pdf_extractor::{ExtractedPage, ExtractionResponse, PdfExtractorClient};
pub use vector_store::{CollectionInfo, DistanceMetric, Point, SearchHit, SearchResponse, VectorStoreClient};

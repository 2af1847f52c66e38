use uuid::Uuid;

/// Identifier assigned to a [`Message`](crate::Message) at publish time.
pub type MessageId = Uuid;

/// Identifier for an Ingestion Job.
pub type JobId = Uuid;

/// Identifier for a chat Session.
pub type SessionId = Uuid;

/// Identifier for a Chunk derived from a Job.
pub type ChunkId = Uuid;

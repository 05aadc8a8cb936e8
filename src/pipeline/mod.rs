//! Upload and question answering pipeline: chunking, orchestration, quota.

pub mod chunking;
pub mod sanitize;
mod service;
pub mod types;

pub use service::{QaApi, QaService, SYSTEM_PROMPT};
pub use types::{AnswerError, ChunkingError, IngestError, IngestOutcome};

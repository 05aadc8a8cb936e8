#![deny(missing_docs)]

//! Core library for the DocQA session question answering server.

/// HTTP routing and REST handlers.
pub mod api;
/// Chat completion client abstraction and adapters.
pub mod completion;
/// Environment-driven configuration management.
pub mod config;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// PDF text extraction strategy chain.
pub mod extract;
/// Vector index construction, search, and durable storage.
pub mod index;
/// Structured logging and tracing setup.
pub mod logging;
/// Ingestion and answer metrics helpers.
pub mod metrics;
/// Upload and question answering pipeline.
pub mod pipeline;
/// Per-session status ledger, quota tracking, and cleanup.
pub mod session;
/// Blob store abstraction and backends.
pub mod storage;

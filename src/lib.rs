#![deny(missing_docs)]

//! Core library for Groundwork, a grounded document question-answering service.

/// HTTP routing and REST handlers.
pub mod api;
/// Document ownership catalog.
pub mod catalog;
/// Environment-driven configuration management.
pub mod config;
/// Conversation audit trail.
pub mod conversation;
/// Embedding client abstraction and adapters.
pub mod embedding;
/// Owner-scoped vector index over Qdrant or memory.
pub mod index;
/// Chunking and ingestion of extracted documents.
pub mod ingestion;
/// Structured logging and tracing setup.
pub mod logging;
/// Pipeline metrics helpers.
pub mod metrics;
/// Grounded prompt construction.
pub mod prompt;
/// Completion provider dispatch.
pub mod providers;
/// Owner-scoped retrieval and context assembly.
pub mod retrieval;
/// Composition root and service operations.
pub mod service;

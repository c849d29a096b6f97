//! # RAG Harness Core
//!
//! Pure retrieval logic for RAG Harness: data models, text normalization,
//! chunking, the brute-force vector index, top-k and MMR retrieval, prompt
//! assembly, and the collaborator traits for embedding and generation
//! services.
//!
//! This crate contains no tokio, reqwest, filesystem I/O, or logging. Every
//! function here is a data transformation that can be tested without a
//! network; the `rag-harness` application crate supplies the providers and
//! the orchestrator.

pub mod chunk;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod index;
pub mod models;
pub mod normalize;
pub mod prompt;
pub mod retrieve;

pub use error::RagError;

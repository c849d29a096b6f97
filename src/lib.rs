//! # RAG Harness
//!
//! Question answering over your own documents: extract text, normalize it,
//! cut it into passages, embed and index them, retrieve the passages most
//! relevant to a question, and have a language model answer from those
//! passages only.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌─────────┐   ┌──────────┐
//! │ Extract  │──▶│ Normalize │──▶│  Chunk  │──▶│  Embed   │
//! │ txt/pdf/ │   │ NFC, URLs │   │ 3 modes │   │ provider │
//! │ OOXML    │   └───────────┘   └─────────┘   └────┬─────┘
//! └──────────┘                                      ▼
//!                ┌───────────┐   ┌──────────┐   ┌──────────┐
//!                │ Generate  │◀──│  Prompt  │◀──│ Retrieve │
//!                │ provider  │   │ context  │   │ top-k/MMR│
//!                └───────────┘   └──────────┘   └──────────┘
//! ```
//!
//! The pure stages (normalizer, chunker, vector index, retriever, prompt)
//! live in `rag-harness-core` and are re-exported as [`rag_core`]. This crate
//! adds configuration, the HTTP-backed providers, document extraction,
//! logging, and the [`pipeline`] that ties them together.
//!
//! ## Quick Start
//!
//! ```bash
//! rag normalize "Xem chi tiết tại https://example.com <b>nhé</b>!"
//! rag chunk notes.txt
//! rag search "Which city is the economic center?" --dir ./docs
//! rag ask "Which city is the economic center?" --dir ./docs --config rag.toml
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`embedding`] | Embedding providers |
//! | [`generation`] | Generation providers |
//! | [`extract`] | File → text for txt, md, pdf, docx, pptx, xlsx |
//! | [`pipeline`] | Ingestion and question answering |
//! | [`commands`] | CLI subcommand implementations |
//! | [`logging`] | `tracing` subscriber setup |

pub mod commands;
pub mod config;
pub mod embedding;
pub mod extract;
pub mod generation;
mod http;
pub mod logging;
pub mod pipeline;

pub use rag_harness_core as rag_core;
pub use rag_harness_core::RagError;

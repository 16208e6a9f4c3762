//! # ragbox
//!
//! A document question-answering pipeline: ingest staged documents into a
//! remote vector index, then answer natural-language questions by
//! retrieving relevant passages and synthesizing an answer with a
//! language model.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌───────────────┐
//! │ data/    │──▶│  Ingestion   │──▶│ Vector index  │
//! │ (inbox)  │   │ Load+Chunk  │   │   (remote)    │
//! └────┬─────┘   │ Embed+Upsert│   └──────┬────────┘
//!      │         └─────────────┘          │
//!      ▼                                  ▼
//! data/processed/                  ┌─────────────┐   ┌─────────┐
//! (commit point)                   │ Retrieval   │──▶│   LLM   │
//!                                  │ chain       │   │ (remote)│
//!                                  └─────────────┘   └─────────┘
//! ```
//!
//! Embeddings are computed in-process (fastembed); document text never
//! leaves the machine to become a vector. The move from `data/` into
//! `data/processed/` is the ingestion commit point: a relocated file is
//! never re-ingested.
//!
//! ## Quick Start
//!
//! ```bash
//! ragbox ingest                 # vectorize everything in data/
//! ragbox ask "What is covered?" # one-shot question
//! ragbox chat                   # interactive session
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`loader`] | Document text extraction (PDF, DOCX, plain text) |
//! | [`chunker`] | Overlapping sliding-window chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Remote vector index client |
//! | [`ingest`] | Batch ingestion engine |
//! | [`llm`] | Language model client |
//! | [`chain`] | Retrieval-augmented answer generation |
//! | [`conversation`] | Per-session turn history |

pub mod chain;
pub mod chunker;
pub mod config;
pub mod conversation;
pub mod embedding;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod loader;

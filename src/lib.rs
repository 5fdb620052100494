//! # wikiqa
//!
//! Grounded question answering over wiki knowledge-base PDF exports.
//!
//! wikiqa ingests exported wiki pages (PDFs), splits them into overlapping
//! chunks, embeds the chunks via a remote embedding service, and stores the
//! vectors in a durable SQLite index. At query time it retrieves the most
//! similar chunks, assembles a grounded prompt, and asks a remote
//! generative model for an answer attributed back to the originating wiki
//! pages.
//!
//! ## Architecture
//!
//! ```text
//! Ingestion:
//! ┌──────────┐   ┌─────────┐   ┌─────────┐   ┌───────────┐   ┌──────────┐
//! │  Source  │──▶│ Extract │──▶│  Chunk  │──▶│ Embedding │──▶│  Vector  │
//! │ (PDFs)   │   │ (pages) │   │(overlap)│   │ (batched) │   │  Index   │
//! └──────────┘   └─────────┘   └─────────┘   └───────────┘   └──────────┘
//!
//! Query:
//! ┌───────┐   ┌───────────┐   ┌───────────┐   ┌──────────┐   ┌──────────┐
//! │ query │──▶│ Embedding │──▶│ Retrieval │──▶│ Citation │──▶│ Generate │
//! └───────┘   └───────────┘   └───────────┘   └──────────┘   └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and startup validation |
//! | [`error`] | The failure taxonomy ([`WikiqaError`](error::WikiqaError)) |
//! | [`models`] | Core data types |
//! | [`sources`] | Document-source providers (filesystem PDF exports) |
//! | [`extract`] | Per-page PDF text extraction |
//! | [`chunk`] | Rolling-buffer chunker with overlap |
//! | [`embedding`] | Embedding client abstraction (OpenAI, Ollama) |
//! | [`index`] | Durable vector index over SQLite |
//! | [`ingest`] | Ingestion pipeline orchestration |
//! | [`retrieval`] | k-NN retrieval with per-document capping |
//! | [`citation`] | Citation reconciliation |
//! | [`generate`] | Prompt assembly and generation clients |
//! | [`ask`] | The query path |
//! | [`db`], [`migrate`] | SQLite pool and schema |
//! | [`stats`] | Index summary |

pub mod ask;
pub mod chunk;
pub mod citation;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generate;
pub mod index;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod retrieval;
pub mod sources;
pub mod stats;

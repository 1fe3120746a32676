//! # Chat With It
//!
//! A document ingestion and retrieval-augmented chat backend.
//!
//! Files land in object storage; each arrival runs the ingestion pipeline,
//! which extracts markdown, uploads it to a managed vector store scoped to
//! the file's owner, and waits for indexing to finish. Chat prompts are then
//! answered by an assistant that searches the user's stores.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────┐   ┌───────────┐   ┌──────────────┐
//! │   Blob    │──▶│ Classify │──▶│  Extract  │──▶│ Index client │
//! │ FS / S3   │   │          │   │ OCR/Vision│   │ upload+poll  │
//! └───────────┘   └──────────┘   └───────────┘   └──────┬───────┘
//!                                                       │
//!                    ┌──────────────┐            ┌──────▼───────┐
//!                    │ Chat         │◀───────────│ Registry +   │
//!                    │ responder    │            │ status (SQL) │
//!                    └──────────────┘            └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Events, records, and response envelopes |
//! | [`classify`] | File format classification and allow-list |
//! | [`blob`], [`blob_s3`] | Object storage backends |
//! | [`buffer`] | Releasable in-memory buffers |
//! | [`extract`] | PDF / image → markdown |
//! | [`openai`] | OpenAI REST client |
//! | [`vector_store`] | Vector-index service contract |
//! | [`index_client`] | Upload, attach, and completion polling |
//! | [`store`] | Registry, status, session, and transcript repositories |
//! | [`status`] | Processing-status transitions |
//! | [`pipeline`] | Ingestion orchestrator |
//! | [`chat`] | Retrieval-augmented chat responder |
//! | [`sessions`] | Session management callables |
//! | [`services`] | Wiring from configuration |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod blob;
pub mod blob_s3;
pub mod buffer;
pub mod chat;
pub mod classify;
pub mod config;
pub mod db;
pub mod extract;
pub mod index_client;
pub mod migrate;
pub mod models;
pub mod openai;
pub mod pipeline;
pub mod server;
pub mod services;
pub mod sessions;
pub mod status;
pub mod store;
pub mod vector_store;

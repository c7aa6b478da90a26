//! # pdfchat
//!
//! Retrieval-augmented chat over PDF documents.
//!
//! PDFs are split into fixed-width character chunks, embedded through a
//! hosted embedding model, and stored in a SQLite-backed vector collection.
//! Each user question retrieves the nearest PDF chunks and earlier
//! conversation turns, which are prepended as a context block to the
//! message list sent to a hosted chat model. Completed turns are embedded
//! and stored so later questions can draw on them.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────────┐   ┌──────────────┐
//! │   PDF    │──▶│ Chunk+Embed │──▶│    SQLite    │
//! │ extract  │   │  (ingest)   │   │ vector store │
//! └──────────┘   └─────────────┘   └──────┬───────┘
//!                                         │
//!        ┌─────────────┐   ┌──────────┐   │
//!        │  Context    │◀──┤ Embed    │◀──┘
//!        │  Assembler  │   │ query    │
//!        └──────┬──────┘   └──────────┘
//!               ▼
//!        ┌─────────────┐   ┌──────────────┐
//!        │ Chat model  │──▶│ Conversation │
//!        │  (session)  │   │   logger     │
//!        └─────────────┘   └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`extract`] | PDF text extraction |
//! | [`chunk`] | Fixed-width text chunking |
//! | [`openai`] | Shared OpenAI / Azure OpenAI HTTP client |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`chat`] | Chat-completion provider abstraction |
//! | [`store`] | Vector store trait, SQLite and in-memory backends |
//! | [`context`] | Context retrieval and assembly |
//! | [`conversation`] | Conversation history logging |
//! | [`pipeline`] | Process-wide wiring of the gateways |
//! | [`session`] | Per-conversation turn orchestration |
//! | [`ingest`] | PDF ingestion |
//! | [`search`] | Retrieval preview |
//! | [`stats`] | Collection statistics |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chat;
pub mod chunk;
pub mod config;
pub mod context;
pub mod conversation;
pub mod db;
pub mod embedding;
pub mod extract;
pub mod ingest;
pub mod migrate;
pub mod models;
pub mod openai;
pub mod pipeline;
pub mod search;
pub mod server;
pub mod session;
pub mod stats;
pub mod store;

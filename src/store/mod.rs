//! Vector store abstraction.
//!
//! The [`VectorStore`] trait defines the storage operations used by
//! ingestion, retrieval, and conversation logging, so the SQLite backend
//! can be swapped for the in-memory one in tests.
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`ensure_collection`](VectorStore::ensure_collection) | Idempotent open-or-create |
//! | [`upsert`](VectorStore::upsert) | Insert an entry, overwriting an existing id |
//! | [`query`](VectorStore::query) | Nearest entries by cosine distance, optionally filtered |
//! | [`count`](VectorStore::count) | Number of entries in a collection |
//! | [`get_all`](VectorStore::get_all) | Every entry in a collection |
//! | [`content_hash`](VectorStore::content_hash) | Stored text hash for an id |

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::chunk::{entry_fingerprint, hash_text};
use crate::models::{MetadataFilter, QueryHit, StoredEntry, META_EMBEDDING_MODEL};

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

/// A vector-store operation failed.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt entry {id}: {reason}")]
    Corrupt { id: String, reason: String },
    #[error("vector store unavailable: {0}")]
    Unavailable(String),
}

/// A named collection that has been opened (and created if needed).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionHandle {
    name: String,
}

impl CollectionHandle {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Storage backend holding embedded chunks.
///
/// Implementations must be `Send + Sync`; a single instance is shared
/// across the whole process.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn ensure_collection(&self, name: &str) -> Result<CollectionHandle, RetrievalError>;

    /// Insert an entry. An existing `id` in the same collection is overwritten.
    async fn upsert(
        &self,
        collection: &CollectionHandle,
        id: &str,
        text: &str,
        vector: &[f32],
        metadata: &Map<String, Value>,
    ) -> Result<(), RetrievalError>;

    /// Return up to `top_k` entries ordered by ascending cosine distance.
    ///
    /// An empty collection yields an empty vector, not an error.
    async fn query(
        &self,
        collection: &CollectionHandle,
        query_vec: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryHit>, RetrievalError>;

    async fn count(&self, collection: &CollectionHandle) -> Result<usize, RetrievalError>;

    async fn get_all(&self, collection: &CollectionHandle)
        -> Result<Vec<StoredEntry>, RetrievalError>;

    /// Fingerprint recorded for `id` when it was written, if the entry exists.
    /// See [`stored_hash`].
    async fn content_hash(
        &self,
        collection: &CollectionHandle,
        id: &str,
    ) -> Result<Option<String>, RetrievalError>;

    /// Release underlying resources. Default is a no-op.
    async fn close(&self) {}
}

/// Hash a backend records for an entry: its text hash, mixed with the
/// `embeddingModel` metadata value when present.
pub fn stored_hash(text: &str, metadata: &Map<String, Value>) -> String {
    let model = metadata.get(META_EMBEDDING_MODEL).and_then(Value::as_str);
    entry_fingerprint(hash_text(text), model)
}

/// Sort hits by ascending distance and keep the first `top_k`.
pub(crate) fn rank_hits(mut hits: Vec<QueryHit>, top_k: usize) -> Vec<QueryHit> {
    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    hits.truncate(top_k);
    hits
}

//! In-memory [`VectorStore`] implementation for testing.
//!
//! Entries live in a `HashMap` of collections behind a tokio `RwLock`.
//! Queries are brute-force cosine distance over every stored vector,
//! the same ranking the SQLite backend performs.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::embedding::cosine_distance;
use crate::models::{MetadataFilter, QueryHit, StoredEntry};

use super::{rank_hits, stored_hash, CollectionHandle, RetrievalError, VectorStore};

struct MemEntry {
    id: String,
    text: String,
    vector: Vec<f32>,
    metadata: Map<String, Value>,
    hash: String,
}

/// In-memory store; entries keep their insertion order.
#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, Vec<MemEntry>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorStore for InMemoryStore {
    async fn ensure_collection(&self, name: &str) -> Result<CollectionHandle, RetrievalError> {
        self.collections
            .write()
            .await
            .entry(name.to_string())
            .or_default();
        Ok(CollectionHandle::new(name))
    }

    async fn upsert(
        &self,
        collection: &CollectionHandle,
        id: &str,
        text: &str,
        vector: &[f32],
        metadata: &Map<String, Value>,
    ) -> Result<(), RetrievalError> {
        let mut collections = self.collections.write().await;
        let entries = collections.entry(collection.name().to_string()).or_default();
        let entry = MemEntry {
            id: id.to_string(),
            text: text.to_string(),
            vector: vector.to_vec(),
            metadata: metadata.clone(),
            hash: stored_hash(text, metadata),
        };
        match entries.iter_mut().find(|e| e.id == id) {
            Some(existing) => *existing = entry,
            None => entries.push(entry),
        }
        Ok(())
    }

    async fn query(
        &self,
        collection: &CollectionHandle,
        query_vec: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryHit>, RetrievalError> {
        let collections = self.collections.read().await;
        let Some(entries) = collections.get(collection.name()) else {
            return Ok(Vec::new());
        };

        let hits = entries
            .iter()
            .filter(|e| filter.map_or(true, |f| f.matches(&e.metadata)))
            .map(|e| QueryHit {
                id: e.id.clone(),
                text: e.text.clone(),
                metadata: e.metadata.clone(),
                distance: cosine_distance(query_vec, &e.vector),
            })
            .collect();

        Ok(rank_hits(hits, top_k))
    }

    async fn count(&self, collection: &CollectionHandle) -> Result<usize, RetrievalError> {
        let collections = self.collections.read().await;
        Ok(collections.get(collection.name()).map_or(0, Vec::len))
    }

    async fn get_all(
        &self,
        collection: &CollectionHandle,
    ) -> Result<Vec<StoredEntry>, RetrievalError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection.name())
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| StoredEntry {
                        id: e.id.clone(),
                        text: e.text.clone(),
                        metadata: e.metadata.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn content_hash(
        &self,
        collection: &CollectionHandle,
        id: &str,
    ) -> Result<Option<String>, RetrievalError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection.name())
            .and_then(|entries| entries.iter().find(|e| e.id == id))
            .map(|e| e.hash.clone()))
    }
}

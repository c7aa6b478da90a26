//! SQLite-backed [`VectorStore`] implementation.
//!
//! Vectors are stored as little-endian `f32` BLOBs next to their text and
//! a JSON metadata object. Metadata filters are evaluated in SQL with
//! `json_extract`; similarity is computed in Rust over the filtered rows.

use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use crate::config::Config;
use crate::db;
use crate::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use crate::migrate;
use crate::models::{MetadataFilter, QueryHit, StoredEntry};

use super::{rank_hits, stored_hash, CollectionHandle, RetrievalError, VectorStore};

/// SQLite implementation of the [`VectorStore`] trait.
///
/// Wraps one [`SqlitePool`] for the lifetime of the process.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to the configured database and make sure the schema exists.
    pub async fn open(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn parse_metadata(id: &str, raw: &str) -> Result<Map<String, Value>, RetrievalError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(RetrievalError::Corrupt {
            id: id.to_string(),
            reason: "metadata is not a JSON object".to_string(),
        }),
        Err(e) => Err(RetrievalError::Corrupt {
            id: id.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// SQL literal for the JSON path of a top-level metadata key.
///
/// Only plain identifiers are accepted. The path is spliced into the
/// statement text because SQLite matches an expression index only against
/// an identical expression, and `idx_entries_type` is built on
/// `json_extract(metadata_json, '$.type')`.
fn json_path_literal(key: &str) -> Option<String> {
    if !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Some(format!("'$.{}'", key))
    } else {
        None
    }
}

fn filtered_select(path: &str) -> String {
    format!(
        "{} AND json_extract(metadata_json, {}) = ?",
        SELECT_ENTRIES, path
    )
}

const SELECT_ENTRIES: &str =
    "SELECT id, document, embedding, metadata_json FROM entries WHERE collection = ?";

#[async_trait]
impl VectorStore for SqliteStore {
    async fn ensure_collection(&self, name: &str) -> Result<CollectionHandle, RetrievalError> {
        sqlx::query("INSERT OR IGNORE INTO collections (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
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
        let metadata_json = Value::Object(metadata.clone()).to_string();

        sqlx::query(
            r#"
            INSERT INTO entries (collection, id, document, embedding, metadata_json, hash, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(collection, id) DO UPDATE SET
                document = excluded.document,
                embedding = excluded.embedding,
                metadata_json = excluded.metadata_json,
                hash = excluded.hash
            "#,
        )
        .bind(collection.name())
        .bind(id)
        .bind(text)
        .bind(vec_to_blob(vector))
        .bind(&metadata_json)
        .bind(stored_hash(text, metadata))
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query(
        &self,
        collection: &CollectionHandle,
        query_vec: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryHit>, RetrievalError> {
        // Scalars on plain keys are compared in SQL; anything else is
        // matched after loading.
        let pushed = filter.and_then(|f| json_path_literal(&f.key).map(|p| (p, &f.value)));
        let rows = match pushed {
            Some((path, Value::String(s))) => {
                sqlx::query(&filtered_select(&path))
                    .bind(collection.name())
                    .bind(s.as_str())
                    .fetch_all(&self.pool)
                    .await?
            }
            Some((path, Value::Number(n))) if n.is_i64() => {
                sqlx::query(&filtered_select(&path))
                    .bind(collection.name())
                    .bind(n.as_i64())
                    .fetch_all(&self.pool)
                    .await?
            }
            Some((path, Value::Bool(b))) => {
                sqlx::query(&filtered_select(&path))
                    .bind(collection.name())
                    .bind(i64::from(*b))
                    .fetch_all(&self.pool)
                    .await?
            }
            _ => {
                sqlx::query(SELECT_ENTRIES)
                    .bind(collection.name())
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: String = row.get("id");
            let metadata = match parse_metadata(&id, row.get("metadata_json")) {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if let Some(f) = filter {
                if !f.matches(&metadata) {
                    continue;
                }
            }
            let blob: Vec<u8> = row.get("embedding");
            let vec = blob_to_vec(&blob);
            hits.push(QueryHit {
                distance: cosine_distance(query_vec, &vec),
                text: row.get("document"),
                metadata,
                id,
            });
        }

        debug!(
            collection = collection.name(),
            scanned = rows.len(),
            top_k,
            "vector query"
        );
        Ok(rank_hits(hits, top_k))
    }

    async fn count(&self, collection: &CollectionHandle) -> Result<usize, RetrievalError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries WHERE collection = ?")
            .bind(collection.name())
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(n).unwrap_or(0))
    }

    async fn get_all(
        &self,
        collection: &CollectionHandle,
    ) -> Result<Vec<StoredEntry>, RetrievalError> {
        let rows = sqlx::query(
            "SELECT id, document, metadata_json FROM entries WHERE collection = ? ORDER BY rowid",
        )
        .bind(collection.name())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let id: String = row.get("id");
                let metadata = parse_metadata(&id, row.get("metadata_json"))?;
                Ok(StoredEntry {
                    text: row.get("document"),
                    metadata,
                    id,
                })
            })
            .collect()
    }

    async fn content_hash(
        &self,
        collection: &CollectionHandle,
        id: &str,
    ) -> Result<Option<String>, RetrievalError> {
        let hash: Option<String> =
            sqlx::query_scalar("SELECT hash FROM entries WHERE collection = ? AND id = ?")
                .bind(collection.name())
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(hash)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::hash_text;
    use crate::models::{ChunkMetadata, Role, SourceType};
    use tempfile::TempDir;

    async fn open_store(tmp: &TempDir) -> SqliteStore {
        let pool = db::connect_path(&tmp.path().join("data/test.sqlite"))
            .await
            .unwrap();
        migrate::run_migrations(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    #[tokio::test]
    async fn test_empty_collection_query() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let coll = store.ensure_collection("documents").await.unwrap();
        let filter = MetadataFilter::source_type(SourceType::Pdf);
        assert!(store
            .query(&coll, &[1.0, 0.0], 3, Some(&filter))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(store.count(&coll).await.unwrap(), 0);
        store.close().await;
    }

    #[tokio::test]
    async fn test_ensure_collection_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let a = store.ensure_collection("documents").await.unwrap();
        let b = store.ensure_collection("documents").await.unwrap();
        assert_eq!(a, b);
        store.close().await;
    }

    #[tokio::test]
    async fn test_filtered_query_in_sql() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let coll = store.ensure_collection("documents").await.unwrap();

        let pdf = ChunkMetadata::pdf("manual.pdf", 0, 100).to_map();
        let conv = ChunkMetadata::conversation(Role::User, 100, None).to_map();
        store.upsert(&coll, "p0", "pdf text", &[1.0, 0.0], &pdf).await.unwrap();
        store.upsert(&coll, "c0", "user text", &[1.0, 0.0], &conv).await.unwrap();

        let filter = MetadataFilter::source_type(SourceType::Conversation);
        let hits = store.query(&coll, &[1.0, 0.0], 5, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "c0");
        assert_eq!(hits[0].metadata.get("role"), Some(&Value::from("user")));

        let by_index = MetadataFilter::equals("chunkIndex", 0);
        let hits = store.query(&coll, &[1.0, 0.0], 5, Some(&by_index)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "p0");
        store.close().await;
    }

    #[tokio::test]
    async fn test_upsert_overwrites_and_persists() {
        let tmp = TempDir::new().unwrap();
        {
            let store = open_store(&tmp).await;
            let coll = store.ensure_collection("documents").await.unwrap();
            let meta = ChunkMetadata::pdf("a.pdf", 0, 1).to_map();
            store.upsert(&coll, "x", "first", &[0.5, 0.5], &meta).await.unwrap();
            store.upsert(&coll, "x", "second", &[0.5, 0.5], &meta).await.unwrap();
            store.close().await;
        }

        let store = open_store(&tmp).await;
        let coll = store.ensure_collection("documents").await.unwrap();
        let all = store.get_all(&coll).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].text, "second");
        assert_eq!(
            store.content_hash(&coll, "x").await.unwrap(),
            Some(hash_text("second"))
        );
        store.close().await;
    }

    #[tokio::test]
    async fn test_query_orders_by_distance() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let coll = store.ensure_collection("documents").await.unwrap();
        let meta = ChunkMetadata::pdf("a.pdf", 0, 1).to_map();
        store.upsert(&coll, "orthogonal", "o", &[0.0, 1.0], &meta).await.unwrap();
        store.upsert(&coll, "same", "s", &[2.0, 0.0], &meta).await.unwrap();
        store.upsert(&coll, "close", "c", &[1.0, 0.2], &meta).await.unwrap();

        let hits = store.query(&coll, &[1.0, 0.0], 2, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["same", "close"]);
        assert!(hits[0].distance <= hits[1].distance);
        store.close().await;
    }

    #[test]
    fn test_json_path_literal_plain_keys_only() {
        assert_eq!(json_path_literal("type").as_deref(), Some("'$.type'"));
        assert_eq!(json_path_literal("chunkIndex").as_deref(), Some("'$.chunkIndex'"));
        assert_eq!(json_path_literal("odd key"), None);
        assert_eq!(json_path_literal("a'b"), None);
        assert_eq!(json_path_literal(""), None);
    }

    #[tokio::test]
    async fn test_type_filter_uses_expression_index() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;

        let path = json_path_literal("type").unwrap();
        let sql = format!("EXPLAIN QUERY PLAN {}", filtered_select(&path));
        let plan: Vec<String> = sqlx::query(&sql)
            .bind("documents")
            .bind("pdf")
            .fetch_all(store.pool())
            .await
            .unwrap()
            .iter()
            .map(|row| row.get::<String, _>("detail"))
            .collect();

        assert!(
            plan.iter().any(|d| d.contains("idx_entries_type")),
            "plan did not use idx_entries_type: {:?}",
            plan
        );
        store.close().await;
    }

    #[tokio::test]
    async fn test_unusual_key_filtered_after_loading() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let coll = store.ensure_collection("documents").await.unwrap();

        let mut tagged = ChunkMetadata::pdf("a.pdf", 0, 1).to_map();
        tagged.insert("odd key".to_string(), Value::from("yes"));
        let plain = ChunkMetadata::pdf("a.pdf", 1, 1).to_map();
        store.upsert(&coll, "tagged", "t", &[1.0, 0.0], &tagged).await.unwrap();
        store.upsert(&coll, "plain", "p", &[1.0, 0.0], &plain).await.unwrap();

        let filter = MetadataFilter::equals("odd key", "yes");
        let hits = store.query(&coll, &[1.0, 0.0], 5, Some(&filter)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "tagged");
        store.close().await;
    }

    #[tokio::test]
    async fn test_corrupt_metadata_row_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let store = open_store(&tmp).await;
        let coll = store.ensure_collection("documents").await.unwrap();
        let meta = ChunkMetadata::pdf("a.pdf", 0, 1).to_map();
        store.upsert(&coll, "good", "g", &[1.0, 0.0], &meta).await.unwrap();
        store.upsert(&coll, "bad", "b", &[1.0, 0.0], &meta).await.unwrap();

        sqlx::query("UPDATE entries SET metadata_json = '[1, 2]' WHERE id = 'bad'")
            .execute(store.pool())
            .await
            .unwrap();

        let hits = store.query(&coll, &[1.0, 0.0], 5, None).await.unwrap();
        let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["good"]);
        store.close().await;
    }
}

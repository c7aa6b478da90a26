//! Conversation history persistence.
//!
//! Each completed chat turn is written back into the shared collection as
//! two `type = conversation` entries so later queries can retrieve earlier
//! answers. The assistant entry carries a `relatedId` pointing at the user
//! entry it answers.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::models::{ChunkMetadata, Role, SourceType, StoredEntry};
use crate::store::{CollectionHandle, RetrievalError, VectorStore};

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error(transparent)]
    Store(#[from] RetrievalError),
}

/// Ids of the two entries written for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedTurn {
    pub user_id: String,
    pub assistant_id: String,
}

/// Tally of stored conversation entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ConversationStats {
    pub total: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
}

/// `<role>_<unix seconds>_<uuid v4>`
pub fn turn_entry_id(role: Role, timestamp: i64) -> String {
    format!("{}_{}_{}", role.as_str(), timestamp, Uuid::new_v4())
}

pub struct ConversationLogger {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    collection: CollectionHandle,
}

impl ConversationLogger {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        collection: CollectionHandle,
    ) -> Self {
        Self {
            embedder,
            store,
            collection,
        }
    }

    /// Embed and store a user/assistant pair.
    ///
    /// Both messages are embedded before anything is written, so an
    /// embedding failure leaves the store untouched.
    pub async fn log_turn(
        &self,
        user_message: &str,
        assistant_message: &str,
    ) -> Result<LoggedTurn, ConversationError> {
        let vectors = self
            .embedder
            .embed_batch(&[user_message.to_string(), assistant_message.to_string()])
            .await?;
        let (user_vec, assistant_vec) = match vectors.as_slice() {
            [u, a] => (u, a),
            _ => {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "expected 2 vectors, got {}",
                    vectors.len()
                ))
                .into())
            }
        };

        let timestamp = chrono::Utc::now().timestamp();
        let user_id = turn_entry_id(Role::User, timestamp);
        let assistant_id = turn_entry_id(Role::Assistant, timestamp);

        let user_meta = ChunkMetadata::conversation(Role::User, timestamp, None);
        self.store
            .upsert(
                &self.collection,
                &user_id,
                user_message,
                user_vec,
                &user_meta.to_map(),
            )
            .await?;

        let assistant_meta =
            ChunkMetadata::conversation(Role::Assistant, timestamp, Some(user_id.clone()));
        self.store
            .upsert(
                &self.collection,
                &assistant_id,
                assistant_message,
                assistant_vec,
                &assistant_meta.to_map(),
            )
            .await?;

        info!(user_id = %user_id, assistant_id = %assistant_id, "conversation turn logged");
        Ok(LoggedTurn {
            user_id,
            assistant_id,
        })
    }

    /// Count stored conversation entries by role with a full scan.
    pub async fn get_stats(&self) -> Result<ConversationStats, RetrievalError> {
        let entries = self.store.get_all(&self.collection).await?;
        Ok(ConversationStats::tally(&entries))
    }
}

impl ConversationStats {
    /// Tally conversation entries; other provenances are ignored.
    pub fn tally(entries: &[StoredEntry]) -> Self {
        let mut stats = Self::default();
        for entry in entries {
            let Some(meta) = ChunkMetadata::from_map(&entry.metadata) else {
                continue;
            };
            if meta.source_type != SourceType::Conversation {
                continue;
            }
            stats.total += 1;
            match meta.role {
                Some(Role::User) => stats.user_messages += 1,
                Some(Role::Assistant) => stats.assistant_messages += 1,
                _ => {}
            }
        }
        stats
    }
}

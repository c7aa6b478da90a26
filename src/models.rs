//! Core data models shared by ingestion, retrieval, and chat.
//!
//! These types represent the stored chunks, their metadata, and the
//! role-tagged messages that flow through the chat pipeline.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Metadata key holding the provenance of an entry.
pub const META_TYPE: &str = "type";
pub const META_ROLE: &str = "role";
pub const META_FILENAME: &str = "filename";
pub const META_CHUNK_INDEX: &str = "chunkIndex";
/// Model that produced the stored vector of a PDF chunk.
pub const META_EMBEDDING_MODEL: &str = "embeddingModel";

/// Where a stored chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Pdf,
    Conversation,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Pdf => "pdf",
            SourceType::Conversation => "conversation",
        }
    }
}

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single entry in the message list sent to the chat model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Metadata attached to every stored chunk.
///
/// Serialized as a flat JSON object using the camelCase keys of the
/// collection schema (`type`, `chunkIndex`, `relatedId`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkMetadata {
    #[serde(rename = "type")]
    pub source_type: SourceType,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
}

impl ChunkMetadata {
    pub fn pdf(filename: &str, chunk_index: i64, timestamp: i64) -> Self {
        Self {
            source_type: SourceType::Pdf,
            timestamp,
            filename: Some(filename.to_string()),
            chunk_index: Some(chunk_index),
            role: None,
            related_id: None,
            embedding_model: None,
        }
    }

    pub fn conversation(role: Role, timestamp: i64, related_id: Option<String>) -> Self {
        Self {
            source_type: SourceType::Conversation,
            timestamp,
            filename: None,
            chunk_index: None,
            role: Some(role),
            related_id,
            embedding_model: None,
        }
    }

    pub fn with_embedding_model(mut self, model: &str) -> Self {
        self.embedding_model = Some(model.to_string());
        self
    }

    /// Flatten into the key-value map stored next to the vector.
    pub fn to_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Rebuild from a stored map. Returns `None` if required keys are missing.
    pub fn from_map(map: &Map<String, Value>) -> Option<Self> {
        serde_json::from_value(Value::Object(map.clone())).ok()
    }
}

/// Exact-match equality filter on a single metadata field.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataFilter {
    pub key: String,
    pub value: Value,
}

impl MetadataFilter {
    pub fn equals(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Filter restricting results to one provenance.
    pub fn source_type(source_type: SourceType) -> Self {
        Self::equals(META_TYPE, source_type.as_str())
    }

    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        metadata.get(&self.key) == Some(&self.value)
    }
}

/// One nearest-neighbor result from a similarity query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryHit {
    pub id: String,
    pub text: String,
    pub metadata: Map<String, Value>,
    /// Cosine distance (`1 - similarity`); smaller is closer.
    pub distance: f32,
}

/// A stored entry as returned by a full-collection scan.
#[derive(Debug, Clone, Serialize)]
pub struct StoredEntry {
    pub id: String,
    pub text: String,
    pub metadata: Map<String, Value>,
}

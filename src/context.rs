//! Context assembly for a single chat turn.
//!
//! Given a user query, the [`ContextAssembler`] embeds it once, fetches the
//! nearest PDF chunks and the nearest prior conversation entries from the
//! shared collection, and merges them into one instruction-annotated text
//! block that is sent to the chat model as its `system` message.
//!
//! # Failure Policy
//!
//! Retrieval never blocks a turn by default. Each lookup runs a filtered
//! query first; if the store rejects it, the lookup is retried once without
//! a filter (over-fetching by [`FALLBACK_OVERFETCH`]) and post-filtered in
//! memory. A lookup that still fails becomes [`RetrievalOutcome::Failed`],
//! which contributes nothing to the context. With
//! `retrieval.fail_on_error = true` the assembler returns a
//! [`ContextError`] instead.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::RetrievalConfig;
use crate::embedding::{EmbeddingError, EmbeddingProvider};
use crate::models::{ChatMessage, MetadataFilter, QueryHit, Role, SourceType, META_ROLE};
use crate::store::{CollectionHandle, VectorStore};

/// Guidance placed at the top of every non-empty context block.
pub const CONTEXT_PREAMBLE: &str = "You are a support assistant. Answer using the reference \
material below. If the conversation history already answers the question, stay consistent \
with what was said before and use the document excerpts to fill in missing details. When \
the material contains concrete identifiers such as order numbers, codes, or field names, \
quote them exactly as written.";

/// Multiplier applied to `top_k` when falling back to an unfiltered query.
pub const FALLBACK_OVERFETCH: usize = 4;

/// Result of one retrieval lookup.
#[derive(Debug, Clone)]
pub enum RetrievalOutcome {
    /// At least one matching entry.
    Found(Vec<QueryHit>),
    /// The lookup succeeded and matched nothing.
    Empty,
    /// The lookup failed; the message describes why.
    Failed(String),
}

impl RetrievalOutcome {
    fn from_hits(hits: Vec<QueryHit>) -> Self {
        if hits.is_empty() {
            RetrievalOutcome::Empty
        } else {
            RetrievalOutcome::Found(hits)
        }
    }

    pub fn hits(&self) -> &[QueryHit] {
        match self {
            RetrievalOutcome::Found(hits) => hits,
            _ => &[],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, RetrievalOutcome::Failed(_))
    }
}

/// Raised only when `retrieval.fail_on_error` is enabled.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),
    #[error("{kind} retrieval failed: {reason}")]
    Retrieval { kind: &'static str, reason: String },
}

/// Everything retrieved for one query.
#[derive(Debug, Clone, Serialize)]
pub struct AssembledContext {
    pub pdf_chunks: Vec<String>,
    pub conversation_history: Vec<String>,
    /// Empty only when both lists are empty.
    pub context_text: String,
    #[serde(skip)]
    pub pdf_outcome: RetrievalOutcome,
    #[serde(skip)]
    pub conversation_outcome: RetrievalOutcome,
}

impl AssembledContext {
    fn new(pdf_outcome: RetrievalOutcome, conversation_outcome: RetrievalOutcome) -> Self {
        let context_text = build_context_text(pdf_outcome.hits(), conversation_outcome.hits());
        Self {
            pdf_chunks: texts(pdf_outcome.hits()),
            conversation_history: texts(conversation_outcome.hits()),
            context_text,
            pdf_outcome,
            conversation_outcome,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.context_text.is_empty()
    }
}

fn texts(hits: &[QueryHit]) -> Vec<String> {
    hits.iter().map(|h| h.text.clone()).collect()
}

/// Remove every `system` message, keeping the order of the rest.
pub fn strip_system_messages(messages: &mut Vec<ChatMessage>) {
    messages.retain(|m| m.role != Role::System);
}

/// Build the context block from retrieved PDF chunks and conversation entries.
///
/// Returns an empty string when both slices are empty. Otherwise the
/// preamble appears once, followed by the numbered PDF excerpts and then
/// the numbered conversation entries.
pub fn build_context_text(pdf: &[QueryHit], conversation: &[QueryHit]) -> String {
    if pdf.is_empty() && conversation.is_empty() {
        return String::new();
    }

    let mut out = String::from(CONTEXT_PREAMBLE);

    if !pdf.is_empty() {
        out.push_str("\n\n[Document excerpts]");
        for (i, hit) in pdf.iter().enumerate() {
            out.push_str(&format!("\n{}. {}", i + 1, hit.text.trim()));
        }
    }

    if !conversation.is_empty() {
        out.push_str("\n\n[Conversation history]");
        for (i, hit) in conversation.iter().enumerate() {
            let role = hit
                .metadata
                .get(META_ROLE)
                .and_then(|r| r.as_str())
                .unwrap_or("unknown");
            out.push_str(&format!("\n{}. ({}) {}", i + 1, role, hit.text.trim()));
        }
    }

    out
}

/// Retrieves PDF and conversation context for user queries.
pub struct ContextAssembler {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn VectorStore>,
    collection: CollectionHandle,
    retrieval: RetrievalConfig,
}

impl ContextAssembler {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn VectorStore>,
        collection: CollectionHandle,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            store,
            collection,
            retrieval,
        }
    }

    /// Retrieve and assemble context for `query`.
    ///
    /// Never fails unless `retrieval.fail_on_error` is set.
    pub async fn assemble(&self, query: &str) -> Result<AssembledContext, ContextError> {
        let query_vec = match self.embedder.embed(query).await {
            Ok(v) => v,
            Err(e) if self.retrieval.fail_on_error => return Err(e.into()),
            Err(e) => {
                warn!(error = %e, "query embedding failed; answering without context");
                let reason = e.to_string();
                return Ok(AssembledContext::new(
                    RetrievalOutcome::Failed(reason.clone()),
                    RetrievalOutcome::Failed(reason),
                ));
            }
        };

        let pdf = self
            .retrieve(SourceType::Pdf, &query_vec, self.retrieval.pdf_top_k)
            .await;
        let conversation = self
            .retrieve(
                SourceType::Conversation,
                &query_vec,
                self.retrieval.conversation_top_k,
            )
            .await;

        if self.retrieval.fail_on_error {
            for (kind, outcome) in [(SourceType::Pdf, &pdf), (SourceType::Conversation, &conversation)]
            {
                if let RetrievalOutcome::Failed(reason) = outcome {
                    return Err(ContextError::Retrieval {
                        kind: kind.as_str(),
                        reason: reason.clone(),
                    });
                }
            }
        }

        debug!(
            pdf = pdf.hits().len(),
            conversation = conversation.hits().len(),
            "context assembled"
        );
        Ok(AssembledContext::new(pdf, conversation))
    }

    /// One lookup with the two-tier fallback.
    async fn retrieve(&self, kind: SourceType, query_vec: &[f32], top_k: usize) -> RetrievalOutcome {
        let filter = MetadataFilter::source_type(kind);

        let err = match self
            .store
            .query(&self.collection, query_vec, top_k, Some(&filter))
            .await
        {
            Ok(hits) => return RetrievalOutcome::from_hits(hits),
            Err(e) => e,
        };

        warn!(
            kind = kind.as_str(),
            error = %err,
            "filtered query failed; retrying without filter"
        );

        let overfetch = top_k.saturating_mul(FALLBACK_OVERFETCH);
        match self
            .store
            .query(&self.collection, query_vec, overfetch, None)
            .await
        {
            Ok(hits) => RetrievalOutcome::from_hits(
                hits.into_iter()
                    .filter(|h| filter.matches(&h.metadata))
                    .take(top_k)
                    .collect(),
            ),
            Err(e) => {
                warn!(kind = kind.as_str(), error = %e, "unfiltered query failed");
                RetrievalOutcome::Failed(e.to_string())
            }
        }
    }
}

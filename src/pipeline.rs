//! Process-wide wiring of the gateways.
//!
//! A [`Pipeline`] owns the vector store, the embedding and chat providers,
//! and the open collection. It is built once per process (one `SqlitePool`,
//! one `reqwest::Client` per provider), shared behind an `Arc`, and closed
//! explicitly on shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::chat::{create_chat_provider, ChatProvider};
use crate::config::Config;
use crate::context::ContextAssembler;
use crate::conversation::ConversationLogger;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::store::{CollectionHandle, SqliteStore, VectorStore};

pub struct Pipeline {
    config: Config,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    chat: Arc<dyn ChatProvider>,
    collection: CollectionHandle,
    assembler: ContextAssembler,
    logger: ConversationLogger,
}

impl Pipeline {
    /// Open the SQLite store and build the providers named in `config`.
    pub async fn open(config: &Config) -> Result<Self> {
        let store = SqliteStore::open(config).await?;
        let embedder = create_provider(&config.embedding)
            .context("Failed to create embedding provider")?;
        let chat = create_chat_provider(&config.chat).context("Failed to create chat provider")?;
        Self::with_components(config.clone(), Arc::new(store), embedder, chat).await
    }

    /// Assemble a pipeline from already-built components.
    pub async fn with_components(
        config: Config,
        store: Arc<dyn VectorStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        chat: Arc<dyn ChatProvider>,
    ) -> Result<Self> {
        let collection = store
            .ensure_collection(&config.store.collection)
            .await
            .with_context(|| format!("Failed to open collection '{}'", config.store.collection))?;

        info!(
            collection = collection.name(),
            embedding = embedder.model_name(),
            chat = chat.model_name(),
            "pipeline ready"
        );

        let assembler = ContextAssembler::new(
            embedder.clone(),
            store.clone(),
            collection.clone(),
            config.retrieval.clone(),
        );
        let logger = ConversationLogger::new(embedder.clone(), store.clone(), collection.clone());

        Ok(Self {
            config,
            store,
            embedder,
            chat,
            collection,
            assembler,
            logger,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn VectorStore> {
        &self.store
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    pub fn chat(&self) -> &Arc<dyn ChatProvider> {
        &self.chat
    }

    pub fn collection(&self) -> &CollectionHandle {
        &self.collection
    }

    pub fn assembler(&self) -> &ContextAssembler {
        &self.assembler
    }

    pub fn logger(&self) -> &ConversationLogger {
        &self.logger
    }

    /// Release the store's connections.
    pub async fn close(&self) {
        self.store.close().await;
    }
}

//! PDF ingestion: extract → chunk → embed → store.
//!
//! Chunk ids are deterministic (`pdf:<filename>:<chunkIndex>`), so ingesting
//! the same file again overwrites its entries in place. A chunk whose id is
//! already stored with the same text and embedding model is not re-embedded.
//!
//! Extraction and embedding failures are fatal and reported to the caller.

use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::chunk::{chunk_document, entry_fingerprint, PdfChunk};
use crate::config::Config;
use crate::embedding::EmbeddingError;
use crate::extract::{extract_text, extract_text_from_bytes, ExtractionError};
use crate::models::ChunkMetadata;
use crate::pipeline::Pipeline;
use crate::store::RetrievalError;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    #[error("failed to store chunks: {0}")]
    Store(#[from] RetrievalError),
    #[error("invalid filename: {0}")]
    InvalidFilename(String),
}

/// Summary of one ingested document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub filename: String,
    /// Chunks produced from the extracted text.
    pub chunks: usize,
    /// Chunks embedded and written by this run.
    pub embedded: usize,
    /// Chunks already stored with identical text and embedding model.
    pub unchanged: usize,
}

/// Ingest a PDF from disk. The stored filename is the path's final component.
pub async fn ingest_pdf(pipeline: &Pipeline, path: &Path) -> Result<IngestReport, IngestError> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| IngestError::InvalidFilename(path.display().to_string()))?;
    let text = extract_text(path)?;
    ingest_text(pipeline, filename, &text).await
}

/// Ingest an uploaded PDF held in memory.
pub async fn ingest_pdf_bytes(
    pipeline: &Pipeline,
    filename: &str,
    bytes: &[u8],
) -> Result<IngestReport, IngestError> {
    if filename.trim().is_empty() {
        return Err(IngestError::InvalidFilename(filename.to_string()));
    }
    let text = extract_text_from_bytes(bytes)?;
    ingest_text(pipeline, filename, &text).await
}

/// Chunk, embed and store already-extracted text under `filename`.
pub async fn ingest_text(
    pipeline: &Pipeline,
    filename: &str,
    text: &str,
) -> Result<IngestReport, IngestError> {
    let chunks = chunk_document(filename, text, pipeline.config().chunking.chunk_size);
    let store = pipeline.store();
    let collection = pipeline.collection();
    let model = pipeline.embedder().model_name().to_string();

    let mut pending: Vec<&PdfChunk> = Vec::new();
    for chunk in &chunks {
        let expected = entry_fingerprint(chunk.hash.clone(), Some(&model));
        let stored = store.content_hash(collection, &chunk.id).await?;
        if stored.as_deref() != Some(expected.as_str()) {
            pending.push(chunk);
        }
    }

    let texts: Vec<String> = pending.iter().map(|c| c.text.clone()).collect();
    let vectors = pipeline.embedder().embed_batch(&texts).await?;

    let timestamp = chrono::Utc::now().timestamp();
    for (chunk, vector) in pending.iter().zip(&vectors) {
        let metadata = ChunkMetadata::pdf(filename, chunk.chunk_index, timestamp)
            .with_embedding_model(&model)
            .to_map();
        store
            .upsert(collection, &chunk.id, &chunk.text, vector, &metadata)
            .await?;
    }

    let report = IngestReport {
        filename: filename.to_string(),
        chunks: chunks.len(),
        embedded: pending.len(),
        unchanged: chunks.len() - pending.len(),
    };
    info!(
        filename,
        chunks = report.chunks,
        embedded = report.embedded,
        unchanged = report.unchanged,
        "ingested document"
    );
    Ok(report)
}

/// CLI entry point for `pdfchat ingest`.
pub async fn run_ingest(config: &Config, paths: &[PathBuf]) -> Result<()> {
    let pipeline = Pipeline::open(config).await?;

    let mut result = Ok(());
    for path in paths {
        match ingest_pdf(&pipeline, path).await {
            Ok(report) => {
                println!("ingest {}", path.display());
                println!("  chunks: {}", report.chunks);
                println!("  embedded: {}", report.embedded);
                println!("  unchanged: {}", report.unchanged);
            }
            Err(e) => {
                result = Err(anyhow::anyhow!("Failed to ingest {}: {}", path.display(), e));
                break;
            }
        }
    }

    pipeline.close().await;
    result?;
    println!("ok");
    Ok(())
}

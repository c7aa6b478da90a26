//! Fixed-width character chunker.
//!
//! Splits extracted document text into consecutive windows of
//! `chunk_size` characters. There is no overlap and no sentence or token
//! awareness, so a boundary may fall mid-word. Windows are counted in
//! Unicode scalar values, never bytes, so multi-byte text is never split
//! inside a character.
//!
//! Each [`PdfChunk`] carries a SHA-256 hash of its text so re-ingesting an
//! unchanged document can skip the embedding call. Stored entries keep an
//! [`entry_fingerprint`] that also covers the embedding model, so a model
//! change forces re-embedding.

use sha2::{Digest, Sha256};

/// Default window width in characters.
pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// A chunk of an ingested PDF, ready to be embedded and stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfChunk {
    pub id: String,
    pub filename: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// Split `text` into consecutive `chunk_size`-character windows.
///
/// The last window may be shorter. Empty text yields no chunks.
/// A `chunk_size` of zero is treated as one.
pub fn split_text(text: &str, chunk_size: usize) -> Vec<String> {
    let size = chunk_size.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut count = 0usize;

    for ch in text.chars() {
        current.push(ch);
        count += 1;
        if count == size {
            chunks.push(std::mem::take(&mut current));
            count = 0;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Split a document and wrap each window with its deterministic id.
///
/// Ids take the form `pdf:<filename>:<index>`, so ingesting the same file
/// twice targets the same entries.
pub fn chunk_document(filename: &str, text: &str, chunk_size: usize) -> Vec<PdfChunk> {
    split_text(text, chunk_size)
        .into_iter()
        .enumerate()
        .map(|(i, piece)| PdfChunk {
            id: pdf_chunk_id(filename, i as i64),
            filename: filename.to_string(),
            chunk_index: i as i64,
            hash: hash_text(&piece),
            text: piece,
        })
        .collect()
}

pub fn pdf_chunk_id(filename: &str, index: i64) -> String {
    format!("pdf:{}:{}", filename, index)
}

pub fn hash_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hash stored next to an entry: the text hash, mixed with the embedding
/// model when one is recorded.
pub fn entry_fingerprint(text_hash: String, embedding_model: Option<&str>) -> String {
    match embedding_model {
        Some(model) => hash_text(&format!("{}\n{}", model, text_hash)),
        None => text_hash,
    }
}

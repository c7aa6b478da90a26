//! PDF text extraction.
//!
//! Reads every page of a PDF and concatenates the page texts, each
//! followed by a newline. Pages that yield no text contribute nothing;
//! a page holding only spaces is kept as it is.
//!
//! `pdf-extract` emits layout line breaks before the first glyph of a page.
//! Those are dropped so a page's text starts at its first character.

use std::path::Path;

use thiserror::Error;

/// The source document could not be opened or parsed.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
}

/// Extract the text of every page of the PDF at `path`.
pub fn extract_text(path: &Path) -> Result<String, ExtractionError> {
    let bytes = std::fs::read(path).map_err(|source| ExtractionError::Io {
        path: path.display().to_string(),
        source,
    })?;
    extract_text_from_bytes(&bytes)
}

/// Extract page text from an in-memory PDF (used for HTTP uploads).
pub fn extract_text_from_bytes(bytes: &[u8]) -> Result<String, ExtractionError> {
    let pages = pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| ExtractionError::Pdf(e.to_string()))?;
    Ok(join_pages(pages))
}

fn join_pages(pages: Vec<String>) -> String {
    let mut text = String::new();
    for page in &pages {
        let page = page.trim_start_matches('\n');
        if page.is_empty() {
            continue;
        }
        text.push_str(page);
        text.push('\n');
    }
    text
}

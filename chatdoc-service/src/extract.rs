//! Local PDF text extraction.
//!
//! Extraction is best-effort: a document whose text cannot be read
//! still uploads fine, it just stays at the `uploaded` stage with no
//! text. The remote OCR fallback lives in the service layer, not here.

use tracing::debug;

use crate::error::ExtractionError;

/// Result of extracting text from a PDF
#[derive(Debug, Clone)]
pub struct Extraction {
    pub text: String,
    pub page_count: i64,
}

impl Extraction {
    /// True when the extracted text carries no usable content.
    /// Scanned PDFs typically parse fine but yield only whitespace.
    pub fn is_effectively_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Extract text and page count from in-memory PDF bytes.
///
/// Runs synchronously; callers on the async runtime should wrap this in
/// `spawn_blocking`.
pub fn extract_pdf(bytes: &[u8]) -> Result<Extraction, ExtractionError> {
    let document = lopdf::Document::load_mem(bytes).map_err(|e| ExtractionError::Parse {
        message: e.to_string(),
    })?;
    let page_count = document.get_pages().len() as i64;

    let text = pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractionError::Parse {
        message: e.to_string(),
    })?;

    debug!(
        page_count,
        text_len = text.len(),
        "extracted text from pdf"
    );

    Ok(Extraction { text, page_count })
}

/// Quick sanity check on uploaded bytes before anything is stored.
/// Only rejects files that are clearly not PDFs.
pub fn looks_like_pdf(bytes: &[u8]) -> bool {
    bytes.starts_with(b"%PDF-")
}

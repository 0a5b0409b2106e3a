use tracing::debug;

use crate::errors::ApiError;

/// Raw text and page count pulled out of an uploaded PDF. Extraction itself
/// is delegated to the pdf-extract/lopdf crates; this module only adapts
/// their output and failure modes.
#[derive(Debug, Clone)]
pub struct PdfText {
    pub text: String,
    pub pages: usize,
}

/// Extract plain text and a page count from PDF bytes.
pub fn extract_text(bytes: &[u8]) -> Result<PdfText, ApiError> {
    let pages = page_count(bytes)?;

    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| ApiError::PdfExtraction(e.to_string()))?;

    debug!(pages, text_length = text.len(), "PDF text extracted");

    Ok(PdfText { text, pages })
}

fn page_count(bytes: &[u8]) -> Result<usize, ApiError> {
    let document =
        lopdf::Document::load_mem(bytes).map_err(|e| ApiError::PdfExtraction(e.to_string()))?;
    Ok(document.get_pages().len())
}

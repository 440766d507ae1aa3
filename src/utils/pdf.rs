//! PDF text extraction utilities.
//!
//! Only digital-native PDFs carry a text layer; scanned documents come back
//! empty and are reported as such rather than guessed at.

use thiserror::Error;

/// Magic bytes every PDF file starts with
const PDF_MAGIC: &[u8] = b"%PDF";

/// Errors that can occur during PDF extraction
#[derive(Debug, Error)]
pub enum PdfExtractError {
    #[error("not a PDF document")]
    NotPdf,

    #[error("PDF has no extractable text layer")]
    NoText,

    #[error("failed to extract text from PDF: {0}")]
    ExtractionFailed(String),
}

/// Whether the bytes start with the PDF signature (leading whitespace allowed)
pub fn is_pdf(bytes: &[u8]) -> bool {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    bytes[start..].starts_with(PDF_MAGIC)
}

/// Extract the text layer of an in-memory PDF.
///
/// Parsing is CPU bound; async callers should run it on a blocking thread.
///
/// # Examples
///
/// ```ignore
/// let text = extract_text(&bytes)?;
/// println!("Extracted {} characters", text.len());
/// ```
pub fn extract_text(bytes: &[u8]) -> Result<String, PdfExtractError> {
    if !is_pdf(bytes) {
        return Err(PdfExtractError::NotPdf);
    }

    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| PdfExtractError::ExtractionFailed(e.to_string()))?;

    if text.trim().is_empty() {
        tracing::debug!("PDF of {} bytes has no text layer", bytes.len());
        return Err(PdfExtractError::NoText);
    }

    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_detection() {
        assert!(is_pdf(b"%PDF-1.7\n..."));
        assert!(is_pdf(b"\r\n %PDF-1.4"));
        assert!(!is_pdf(b"<html><body>Access denied</body></html>"));
        assert!(!is_pdf(b""));
    }

    #[test]
    fn test_html_is_rejected_before_parsing() {
        let result = extract_text(b"<!DOCTYPE html><html></html>");
        assert!(matches!(result, Err(PdfExtractError::NotPdf)));
    }
}

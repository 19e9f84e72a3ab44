//! Source-independent document validation.

use thiserror::Error;

use crate::adapters::FetchedDocument;

pub const PDF_MAGIC: &[u8] = b"%PDF";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("empty body")]
    Empty,
    #[error("document too large: {size} bytes (limit {limit})")]
    TooLarge { size: usize, limit: usize },
    #[error("not a PDF (content-type {0:?})")]
    NotPdf(Option<String>),
}

/// True when the content-type says PDF or the bytes carry the PDF signature.
pub fn is_valid_pdf(content_type: Option<&str>, bytes: &[u8]) -> bool {
    let declared = content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("application/pdf"));
    declared || bytes.starts_with(PDF_MAGIC)
}

pub fn validate(doc: &FetchedDocument, max_bytes: usize) -> Result<(), Rejection> {
    if doc.bytes.is_empty() {
        return Err(Rejection::Empty);
    }
    if doc.bytes.len() > max_bytes {
        return Err(Rejection::TooLarge { size: doc.bytes.len(), limit: max_bytes });
    }
    if !is_valid_pdf(doc.content_type.as_deref(), &doc.bytes) {
        return Err(Rejection::NotPdf(doc.content_type.clone()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(bytes: &[u8], ct: Option<&str>) -> FetchedDocument {
        FetchedDocument {
            bytes: bytes.to_vec(),
            content_type: ct.map(String::from),
            url: "https://repo.example.org/x".to_string(),
        }
    }

    #[test]
    fn test_magic_bytes_without_header() {
        assert!(is_valid_pdf(None, b"%PDF-1.7\n..."));
        assert!(is_valid_pdf(Some("application/octet-stream"), b"%PDF-1.4"));
    }

    #[test]
    fn test_header_without_magic() {
        assert!(is_valid_pdf(Some("Application/PDF; charset=binary"), b"\x00\x01garbage"));
    }

    #[test]
    fn test_html_rejected() {
        assert!(!is_valid_pdf(Some("text/html; charset=utf-8"), b"<!DOCTYPE html>"));
        assert_eq!(
            validate(&doc(b"<html>", Some("text/html")), 1024),
            Err(Rejection::NotPdf(Some("text/html".to_string())))
        );
    }

    #[test]
    fn test_empty_and_oversized() {
        assert_eq!(validate(&doc(b"", Some("application/pdf")), 1024), Err(Rejection::Empty));
        assert!(matches!(
            validate(&doc(b"%PDF-1.5 0123456789", None), 8),
            Err(Rejection::TooLarge { limit: 8, .. })
        ));
        assert_eq!(validate(&doc(b"%PDF-1.5", None), 8), Ok(()));
    }
}

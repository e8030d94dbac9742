//! # Document Number Formatting
//!
//! `{code}-{number zero-padded}`, e.g. `INV-000042`.

use crate::types::DocumentType;

/// Default series code per document type.
pub fn default_code(document_type: DocumentType) -> &'static str {
    match document_type {
        DocumentType::Invoice => "INV",
        DocumentType::Quote => "QUO",
    }
}

/// Formats an issued number.
///
/// Numbers wider than `padding` are printed in full, never truncated.
///
/// ## Example
/// ```rust
/// use till_core::numbering::format_document_number;
///
/// assert_eq!(format_document_number("INV", 42, 6), "INV-000042");
/// assert_eq!(format_document_number("QUO", 1234567, 4), "QUO-1234567");
/// ```
pub fn format_document_number(code: &str, number: i64, padding: usize) -> String {
    format!("{}-{:0>width$}", code, number, width = padding)
}

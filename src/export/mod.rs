//! Export of assistant replies to portable documents.

pub mod pdf;

use thiserror::Error;

pub use pdf::{export_text, export_text_with, wrap_text};

/// Export failures.
#[derive(Debug, Error)]
pub enum ExportError {
    /// There is nothing to export.
    #[error("nothing to export")]
    Empty,
    /// The document could not be assembled.
    #[error("pdf error: {0}")]
    Pdf(#[from] lopdf::Error),
    /// The document could not be written.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

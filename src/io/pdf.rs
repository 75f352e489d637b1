//! PDF text-extraction collaborator.
//!
//! Seller fee statements arrive as text-extractable PDFs; the extractor
//! turns one into plain text for the invoice parser. OCR is out of scope.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::core::PipelineError;

pub trait PdfTextExtractor: Send + Sync {
    fn extract_text(&self, path: &Path) -> Result<String, PipelineError>;
}

/// Canned extractor for tests: maps paths to pre-extracted text.
#[derive(Default)]
pub struct StaticPdfText {
    texts: Mutex<BTreeMap<PathBuf, String>>,
}

impl StaticPdfText {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, path: impl Into<PathBuf>, text: impl Into<String>) {
        if let Ok(mut texts) = self.texts.lock() {
            texts.insert(path.into(), text.into());
        }
    }
}

impl PdfTextExtractor for StaticPdfText {
    fn extract_text(&self, path: &Path) -> Result<String, PipelineError> {
        self.texts
            .lock()
            .map_err(|_| PipelineError::StorageUnavailable("pdf extractor poisoned".into()))?
            .get(path)
            .cloned()
            .ok_or_else(|| {
                PipelineError::StorageUnavailable(format!(
                    "no extractable text for {}",
                    path.display()
                ))
            })
    }
}

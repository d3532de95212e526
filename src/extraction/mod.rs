//! Document text extraction with a quality signal
//!
//! Turns raw document bytes into normalized page-tagged text plus a heuristic
//! quality score. Tabular regions are rendered in a separate `TABLES:` section
//! so the chunker can keep them intact.

mod pdf;
mod tables;

use crate::config::ExtractionConfig;
use crate::error::{Error, Result};

/// Result of extracting a document
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Normalized text: page-tagged prose followed by a page-tagged table section
    pub text: String,
    /// Heuristic quality score in [0, 1]
    pub quality_score: f64,
    /// Total pages in the document
    pub total_pages: usize,
    /// Pages that yielded any extractable text
    pub pages_with_text: usize,
}

/// Trait for turning raw bytes into normalized text
///
/// Constructed once and threaded through the pipeline, so tests can
/// substitute a fake.
pub trait DocumentExtractor: Send + Sync {
    /// Content-signature check; cheap, used during upload validation
    fn sniff(&self, data: &[u8]) -> bool;

    /// Extract normalized text and quality from raw bytes
    ///
    /// A malformed byte stream fails loudly; it never silently returns empty
    /// text. A page without extractable text (scanned page) contributes an
    /// empty page block and lowers the quality score instead.
    fn extract(&self, filename: &str, data: &[u8]) -> Result<Extraction>;

    /// Extractor name for logging
    fn name(&self) -> &str;
}

/// PDF extractor backed by lopdf
pub struct PdfExtractor {
    config: ExtractionConfig,
}

impl PdfExtractor {
    /// Create a new PDF extractor
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }
}

impl DocumentExtractor for PdfExtractor {
    fn sniff(&self, data: &[u8]) -> bool {
        data.starts_with(b"%PDF")
    }

    fn extract(&self, filename: &str, data: &[u8]) -> Result<Extraction> {
        if !self.sniff(data) {
            return Err(Error::extraction(filename, "missing %PDF signature"));
        }

        let pages = pdf::page_texts(filename, data)?;
        let total_pages = pages.len();

        let mut parts = Vec::with_capacity(total_pages);
        let mut pages_with_text = 0usize;
        for (i, page_text) in pages.iter().enumerate() {
            if !page_text.is_empty() {
                pages_with_text += 1;
            }
            parts.push(format!("\n\n--- PAGE {} ---\n{}", i + 1, page_text));
        }
        let text_part = parts.join("\n");
        let tables_section = tables::tables_section(&pages);

        let quality_score = quality_score(
            &self.config,
            total_pages,
            pages_with_text,
            text_part.chars().count(),
        );

        tracing::info!(
            filename,
            quality_score,
            total_pages,
            pages_with_text,
            text_chars = text_part.chars().count(),
            "extraction finished"
        );

        Ok(Extraction {
            text: format!("{}\n\n{}", text_part, tables_section),
            quality_score,
            total_pages,
            pages_with_text,
        })
    }

    fn name(&self) -> &str {
        "pdf"
    }
}

/// Compute the extraction quality score
///
/// Weighted blend of the pages-with-text ratio and a saturating text-length
/// score, rounded to 3 decimals. Zero pages yields 0.0. A low score suggests
/// an image-only document (scanned, no OCR); callers warn below a threshold
/// but never reject on this basis alone.
pub fn quality_score(
    config: &ExtractionConfig,
    total_pages: usize,
    pages_with_text: usize,
    text_chars: usize,
) -> f64 {
    if total_pages == 0 {
        return 0.0;
    }
    let pages_ratio = pages_with_text as f64 / total_pages as f64;
    let length_score = (text_chars as f64 / config.length_norm_chars as f64).min(1.0);
    let score = (config.page_weight * pages_ratio + config.length_weight * length_score).min(1.0);
    (score * 1000.0).round() / 1000.0
}

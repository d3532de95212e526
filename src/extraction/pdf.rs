//! Per-page PDF text extraction via lopdf

use crate::error::{Error, Result};

/// Extract trimmed text for each page, in page order
///
/// A document that fails to parse is an error; a single page that fails text
/// extraction yields an empty string for that page.
pub(crate) fn page_texts(filename: &str, data: &[u8]) -> Result<Vec<String>> {
    let doc = lopdf::Document::load_mem(data)
        .map_err(|e| Error::extraction(filename, format!("unreadable PDF: {}", e)))?;

    let pages = doc.get_pages();
    let mut texts = Vec::with_capacity(pages.len());
    for &page_no in pages.keys() {
        let raw = doc.extract_text(&[page_no]).unwrap_or_default();
        texts.push(normalize_page_text(&raw));
    }
    Ok(texts)
}

/// Trim and strip control characters the PDF text stream may carry
fn normalize_page_text(raw: &str) -> String {
    raw.replace('\0', "").trim().to_string()
}

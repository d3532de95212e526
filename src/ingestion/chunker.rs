//! Page- and table-aware text chunking
//!
//! Splits normalized page-tagged text into bounded-size overlapping windows.
//! Prose and the `TABLES:` section are chunked separately per page so table
//! blocks stay intact, then emitted in a stable order that makes chunk keys
//! reproducible across re-ingestion of identical input.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use crate::config::ChunkingConfig;
use crate::error::{Error, Result};

fn page_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"--- PAGE (\d+) ---\n").expect("valid regex"))
}

fn table_marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[TABLE \d+\]").expect("valid regex"))
}

/// One chunk of a document with its position metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPiece {
    /// Chunk text
    pub text: String,
    /// Page the chunk belongs to
    pub page: u32,
    /// Sequence within the page (prose chunks first, then table chunks)
    pub page_index: u32,
    /// Monotonically increasing index across the whole document
    pub global_index: u32,
}

/// Character-window chunker with page and table awareness
pub struct TextChunker {
    max_chars: usize,
    overlap: usize,
}

impl TextChunker {
    /// Create a new chunker
    pub fn new(max_chars: usize, overlap: usize) -> Self {
        Self { max_chars, overlap }
    }

    /// Create a chunker from configuration
    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self::new(config.max_chars, config.overlap)
    }

    /// Chunk normalized page-tagged text
    ///
    /// Empty or whitespace-only input yields an empty sequence. All size
    /// accounting is in characters, not bytes.
    pub fn chunk(&self, text: &str) -> Result<Vec<ChunkPiece>> {
        if self.max_chars == 0 {
            return Err(Error::invalid_input("max_chars must be greater than zero"));
        }
        let overlap = if self.overlap >= self.max_chars {
            self.max_chars / 4
        } else {
            self.overlap
        };

        let text = text.trim();
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let (body_text, tables_text) = match text.find("\n\nTABLES:") {
            Some(pos) => (&text[..pos], &text[pos + "\n\nTABLES:".len()..]),
            None => (text, ""),
        };

        let body_pages = parse_pages(body_text);
        let table_pages = parse_pages(tables_text);
        let page_numbers: BTreeSet<u32> = body_pages
            .iter()
            .chain(table_pages.iter())
            .map(|(page, _)| *page)
            .collect();

        let mut pieces = Vec::new();
        let mut global_index = 0u32;

        for page in page_numbers {
            let page_body = lookup(&body_pages, page);
            let page_table = lookup(&table_pages, page);

            let mut page_chunks = chunk_text_block(page_body, self.max_chars, overlap);
            let mut table_chunks = chunk_table_content(page_table, self.max_chars, overlap);

            // Merge a page's last prose chunk with its first table chunk when
            // both fit in one window (plus the 2-char separator).
            if let (Some(last), Some(first)) = (page_chunks.last(), table_chunks.first()) {
                if char_len(last) + 2 + char_len(first) <= self.max_chars {
                    let merged = format!("{}\n\n{}", last, first);
                    *page_chunks.last_mut().expect("non-empty") = merged;
                    table_chunks.remove(0);
                }
            }

            for (page_index, chunk_text) in
                page_chunks.into_iter().chain(table_chunks).enumerate()
            {
                pieces.push(ChunkPiece {
                    text: chunk_text,
                    page,
                    page_index: page_index as u32,
                    global_index,
                });
                global_index += 1;
            }
        }

        Ok(pieces)
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn lookup<'a>(pages: &'a [(u32, String)], page: u32) -> &'a str {
    pages
        .iter()
        .find(|(p, _)| *p == page)
        .map(|(_, content)| content.as_str())
        .unwrap_or("")
}

/// Parse a page-tagged section into (page number, content) pairs
///
/// Without any page marker the whole blob becomes page 1.
fn parse_pages(section_text: &str) -> Vec<(u32, String)> {
    let mut pages = Vec::new();
    if section_text.is_empty() {
        return pages;
    }

    let matches: Vec<_> = page_marker_re().captures_iter(section_text).collect();
    if matches.is_empty() {
        let cleaned = section_text.trim();
        if !cleaned.is_empty() {
            pages.push((1, cleaned.to_string()));
        }
        return pages;
    }

    for (i, caps) in matches.iter().enumerate() {
        let page_no: u32 = caps[1].parse().unwrap_or(0);
        let whole = caps.get(0).expect("match");
        let start = whole.end();
        let end = matches
            .get(i + 1)
            .map(|next| next.get(0).expect("match").start())
            .unwrap_or(section_text.len());
        let content = section_text[start..end].trim();
        if content.is_empty() {
            continue;
        }
        // a repeated marker for the same page replaces the earlier content
        match pages.iter_mut().find(|(p, _)| *p == page_no) {
            Some(existing) => existing.1 = content.to_string(),
            None => pages.push((page_no, content.to_string())),
        }
    }
    pages
}

/// Split prose into fixed sliding windows of `max_chars` with `overlap`
/// characters of carry-over between consecutive windows
fn chunk_text_block(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    let chars: Vec<char> = trimmed.chars().collect();
    let mut chunks = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + max_chars).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start = end.saturating_sub(overlap);
    }
    chunks
}

/// Split table content on `[TABLE n]` markers, including any prefix segment
fn split_table_blocks(text: &str) -> Vec<String> {
    let mut boundaries: Vec<usize> = vec![0];
    boundaries.extend(table_marker_re().find_iter(text).map(|m| m.start()));
    boundaries.dedup();

    let mut blocks = Vec::new();
    for (i, &start) in boundaries.iter().enumerate() {
        let end = boundaries.get(i + 1).copied().unwrap_or(text.len());
        let block = text[start..end].trim();
        if !block.is_empty() {
            blocks.push(block.to_string());
        }
    }
    blocks
}

/// Chunk one page's table section into self-contained blocks
///
/// Blocks are greedily packed under a `TABLES:` prefix up to `max_chars`; a
/// single block that cannot fit degrades to the same window splitting as
/// prose.
fn chunk_table_content(table_text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let cleaned = table_text.trim();
    if cleaned.is_empty() {
        return Vec::new();
    }
    let blocks = split_table_blocks(cleaned);
    if blocks.is_empty() {
        return chunk_text_block(cleaned, max_chars, overlap);
    }

    const SEED: &str = "TABLES:\n";
    let mut chunks = Vec::new();
    let mut current = SEED.to_string();

    for block in blocks {
        if char_len(&block) > max_chars {
            flush(&mut chunks, &current);
            chunks.extend(chunk_text_block(&block, max_chars, overlap));
            current = SEED.to_string();
            continue;
        }
        let candidate = format!("{}\n\n{}", current, block).trim().to_string();
        if char_len(&candidate) <= max_chars {
            current = candidate;
            continue;
        }
        flush(&mut chunks, &current);
        let seeded = format!("TABLES:\n\n{}", block);
        if char_len(&seeded) <= max_chars {
            current = seeded;
        } else {
            chunks.extend(chunk_text_block(&block, max_chars, overlap));
            current = SEED.to_string();
        }
    }
    flush(&mut chunks, &current);
    chunks
}

fn flush(chunks: &mut Vec<String>, current: &str) {
    let trimmed = current.trim();
    if !trimmed.is_empty() && trimmed != "TABLES:" {
        chunks.push(trimmed.to_string());
    }
}

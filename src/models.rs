//! Core data models used throughout the pipeline.
//!
//! These types represent the pages, chunks, and retrieval results that flow
//! from document extraction through indexing to answer generation.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// One page of extracted document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// 0-based position of the page in the document.
    pub index: usize,
    pub text: String,
}

impl Page {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }
}

/// A contiguous slice of a page's normalized text, used as a retrieval unit.
///
/// `start_offset` and `length` count characters (not bytes) of the
/// normalized page text, so `text` can always be located again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Ordinal of the chunk within the document, contiguous from 0.
    pub index: usize,
    pub text: String,
    pub source_page: usize,
    pub start_offset: usize,
    pub length: usize,
    /// SHA-256 of `text`.
    pub hash: String,
}

/// A chunk returned by similarity search.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity in `[-1.0, 1.0]`.
    pub score: f32,
}

impl ScoredChunk {
    /// First `max_chars` characters of the chunk, with `...` when cut.
    pub fn preview(&self, max_chars: usize) -> String {
        let mut out: String = self.chunk.text.chars().take(max_chars).collect();
        if self.chunk.text.chars().count() > max_chars {
            out.push_str("...");
        }
        out
    }
}

/// A question asked during a session. Display data only.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub question: String,
    pub asked_at: DateTime<Utc>,
}

/// Description of the document currently loaded in a session.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentInfo {
    pub id: String,
    pub name: String,
    /// SHA-256 of the raw document bytes.
    pub sha256: String,
    pub pages: usize,
    pub chunks: usize,
    pub loaded_at: DateTime<Utc>,
}

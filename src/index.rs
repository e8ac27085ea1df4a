//! In-memory vector index over the chunks of one document.
//!
//! Brute-force cosine similarity over every stored vector. Documents are a
//! few hundred chunks, so a linear scan is fast enough; [`VectorIndex::search_vector`]
//! is the seam where an approximate-nearest-neighbour structure would go.

use crate::embedding::{cosine_similarity, embed_query, EmbeddingProvider};
use crate::error::{Error, Result};
use crate::models::{Chunk, ScoredChunk};

#[derive(Debug, Default)]
pub struct VectorIndex {
    entries: Vec<(Chunk, Vec<f32>)>,
    dims: usize,
}

impl VectorIndex {
    /// An empty index. Searching it fails with [`Error::EmptyIndex`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Embed `chunks` in batches of `batch_size` and index them.
    ///
    /// All-or-nothing: any provider failure, a vector count that does not
    /// match the batch, or vectors of inconsistent dimension fail the whole
    /// build with [`Error::Embedding`].
    pub async fn build(
        chunks: Vec<Chunk>,
        embedder: &dyn EmbeddingProvider,
        batch_size: usize,
    ) -> Result<Self> {
        let batch_size = batch_size.max(1);
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = embedder.embed(&texts).await?;
            if embedded.len() != texts.len() {
                return Err(Error::Embedding(format!(
                    "provider returned {} vectors for {} texts",
                    embedded.len(),
                    texts.len()
                )));
            }
            vectors.extend(embedded);
        }

        let dims = vectors.first().map(Vec::len).unwrap_or(0);
        if let Some(bad) = vectors.iter().position(|v| v.len() != dims || v.is_empty()) {
            return Err(Error::Embedding(format!(
                "vector {} has dimension {}, expected {}",
                bad,
                vectors[bad].len(),
                dims
            )));
        }

        tracing::debug!(chunks = chunks.len(), dims, "vector index built");

        Ok(Self {
            entries: chunks.into_iter().zip(vectors).collect(),
            dims,
        })
    }

    /// Embed `query` and return the `k` most similar chunks.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        embedder: &dyn EmbeddingProvider,
    ) -> Result<Vec<ScoredChunk>> {
        if self.entries.is_empty() {
            return Err(Error::EmptyIndex);
        }
        if k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = embed_query(embedder, query).await?;
        self.search_vector(&query_vec, k)
    }

    /// Top-`k` chunks by descending cosine similarity to `query_vec`.
    ///
    /// Equal scores keep insertion order. `k` larger than the index returns
    /// every chunk.
    pub fn search_vector(&self, query_vec: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if self.entries.is_empty() {
            return Err(Error::EmptyIndex);
        }
        if query_vec.len() != self.dims {
            return Err(Error::Embedding(format!(
                "query vector has dimension {}, index has {}",
                query_vec.len(),
                self.dims
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, (_, v))| (i, cosine_similarity(query_vec, v)))
            .collect();
        // `sort_by` is stable, so ties stay in insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(i, score)| ScoredChunk {
                chunk: self.entries[i].0.clone(),
                score,
            })
            .collect())
    }

    /// Discard all entries.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.dims = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.entries.iter().map(|(c, _)| c)
    }
}

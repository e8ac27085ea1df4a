//! Document session: the loaded document, its index and question history.
//!
//! A [`Session`] is plain state. [`SessionHandle`] wraps one for shared use
//! by the server and the REPL:
//!
//! - `load` and `reset` are serialised by a build mutex. A new index is
//!   built with no session lock held and swapped in under the write lock, so
//!   questions against the previous document keep working meanwhile.
//! - `ask` holds the read lock only while retrieving; generation runs with
//!   no lock held.

use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::chunk;
use crate::engine::{Answer, QueryEngine};
use crate::error::{Error, Result};
use crate::extract::extract_pages;
use crate::index::VectorIndex;
use crate::models::{DocumentInfo, HistoryEntry, Page};

#[derive(Debug)]
pub struct Session {
    id: Uuid,
    document: Option<DocumentInfo>,
    index: VectorIndex,
    history: VecDeque<HistoryEntry>,
    history_limit: usize,
}

impl Session {
    /// A fresh session with no document.
    pub fn new(history_limit: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            document: None,
            index: VectorIndex::new(),
            history: VecDeque::new(),
            history_limit,
        }
    }

    /// Forget the document, the index and the history. A new id is assigned.
    pub fn reset(&mut self) {
        *self = Self::new(self.history_limit);
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn document(&self) -> Option<&DocumentInfo> {
        self.document.as_ref()
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn record_question(&mut self, question: &str) {
        if self.history_limit == 0 {
            return;
        }
        while self.history.len() >= self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(HistoryEntry {
            question: question.to_string(),
            asked_at: Utc::now(),
        });
    }

    /// Up to `limit` most recent questions, newest first.
    pub fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        self.history.iter().rev().take(limit).cloned().collect()
    }

    fn install(&mut self, info: DocumentInfo, index: VectorIndex) {
        self.document = Some(info);
        self.index = index;
    }
}

pub struct SessionHandle {
    engine: Arc<QueryEngine>,
    chunk_size: usize,
    overlap: usize,
    batch_size: usize,
    build_lock: Mutex<()>,
    session: RwLock<Session>,
}

impl SessionHandle {
    pub fn new(
        engine: Arc<QueryEngine>,
        chunk_size: usize,
        overlap: usize,
        batch_size: usize,
        history_limit: usize,
    ) -> Self {
        Self {
            engine,
            chunk_size,
            overlap,
            batch_size,
            build_lock: Mutex::new(()),
            session: RwLock::new(Session::new(history_limit)),
        }
    }

    /// Extract, chunk and index a PDF, replacing the current document.
    ///
    /// On any failure the previous document stays loaded.
    pub async fn load(&self, name: &str, bytes: Vec<u8>) -> Result<DocumentInfo> {
        let sha256 = format!("{:x}", Sha256::digest(&bytes));
        let pages = extract_pages(bytes).await?;
        self.load_pages(name, sha256, pages).await
    }

    /// Index already-extracted pages, replacing the current document.
    pub async fn load_pages(
        &self,
        name: &str,
        sha256: String,
        pages: Vec<Page>,
    ) -> Result<DocumentInfo> {
        let _build = self.build_lock.lock().await;

        let chunks = chunk::split(&pages, self.chunk_size, self.overlap)?;
        if chunks.is_empty() {
            return Err(Error::Extract(
                "document contains no extractable text".to_string(),
            ));
        }
        let chunk_count = chunks.len();
        let index =
            VectorIndex::build(chunks, self.engine.embedder().as_ref(), self.batch_size).await?;

        let info = DocumentInfo {
            id: Uuid::new_v4().to_string(),
            name: name.to_string(),
            sha256,
            pages: pages.len(),
            chunks: chunk_count,
            loaded_at: Utc::now(),
        };

        tracing::info!(
            document = %info.name,
            pages = info.pages,
            chunks = info.chunks,
            dims = index.dims(),
            "document indexed"
        );

        self.session.write().await.install(info.clone(), index);
        Ok(info)
    }

    /// Drop the document and history.
    pub async fn reset(&self) {
        let _build = self.build_lock.lock().await;
        self.session.write().await.reset();
        tracing::info!("session reset");
    }

    pub async fn document(&self) -> Option<DocumentInfo> {
        self.session.read().await.document().cloned()
    }

    pub async fn session_id(&self) -> Uuid {
        self.session.read().await.id()
    }

    /// Answer `question` from the loaded document and record it in history.
    pub async fn ask(&self, question: &str, model: &str, k: usize) -> Result<Answer> {
        let sources = {
            let session = self.session.read().await;
            self.engine.retrieve(question, session.index(), k).await?
        };

        self.session.write().await.record_question(question.trim());

        self.engine.generate_answer(question, sources, model).await
    }

    pub async fn history(&self, limit: usize) -> Vec<HistoryEntry> {
        self.session.read().await.recent(limit)
    }
}

//! Storage abstraction for extracted text and embedding references.
//!
//! The ingestion side writes raw fragments, the vectorization pass reads the
//! pending ones back and marks each of them processed exactly once.
//!
//! ## Key Components
//!
//! - **TextStore**: async persistence trait consumed by the pipeline
//! - **SqliteTextStore**: sqlx/SQLite implementation
//! - **TextRecord / EmbeddingRef / NewText**: row types
//!
//! ## Lifecycle
//!
//! ```text
//! save_texts ──> pending (processed_content IS NULL)
//!                   │ set_processed_content (once)
//!                   v
//!               processed ──> save_embedding
//! ```
//!
//! Records are never deleted and `content` is never rewritten.

use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

pub mod sqlite_store;

pub use sqlite_store::SqliteTextStore;

/// A fragment of text extracted from one source file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextRecord {
    pub id: String,
    pub source_file: String,
    /// Text exactly as extracted
    pub content: String,
    /// Normalized text; `None` while the record waits for vectorization
    pub processed_content: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TextRecord {
    pub fn is_pending(&self) -> bool {
        self.processed_content.is_none()
    }
}

/// Insert payload for [`TextStore::save_texts`].
#[derive(Debug, Clone)]
pub struct NewText {
    pub id: String,
    pub source_file: String,
    pub content: String,
}

impl NewText {
    /// Fragment with a freshly generated id.
    pub fn new(source_file: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            source_file: source_file.into(),
            content: content.into(),
        }
    }
}

/// Link between a text record and the index snapshot holding its vector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingRef {
    pub id: String,
    pub text_id: String,
    pub vector_path: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total_texts: usize,
    pub pending_texts: usize,
    pub embeddings: usize,
    pub source_files: usize,
}

#[async_trait]
pub trait TextStore: Send + Sync {
    /// Insert a single record in its own unit of work.
    async fn save_text(
        &self,
        id: &str,
        source_file: &str,
        content: &str,
        processed_content: Option<&str>,
    ) -> Result<()>;

    /// Insert all fragments of one file atomically.
    async fn save_texts(&self, texts: &[NewText]) -> Result<()>;

    /// Set `processed_content` if it is still unset. Returns whether a row changed.
    async fn set_processed_content(&self, id: &str, processed: &str) -> Result<bool>;

    /// Every pending record, in no particular order.
    async fn get_unprocessed_texts(&self) -> Result<Vec<TextRecord>>;

    async fn get_text(&self, id: &str) -> Result<Option<TextRecord>>;

    async fn save_embedding(&self, id: &str, text_id: &str, vector_path: &str) -> Result<()>;

    async fn get_embeddings(&self, text_id: &str) -> Result<Vec<EmbeddingRef>>;

    async fn stats(&self) -> Result<StoreStats>;
}

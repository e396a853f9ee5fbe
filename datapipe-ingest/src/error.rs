//! Error taxonomy for ingestion, storage and indexing.
//!
//! Every loader, the text store and the vector index report failures as an
//! [`IngestError`]. The orchestrator never lets one of these escape a single
//! file: it is captured in that file's outcome and the batch moves on.
//! [`IngestError::kind`] folds the variants into the coarse categories shown in
//! the final report.

use datapipe_embed::EmbedError;
use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, IngestError>;

/// Coarse classification used for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    UnsupportedFormat,
    EmptyContent,
    SchemaMismatch,
    LimitExceeded,
    Backend,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("File not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// Extension outside the allowlist of the selected loader, or no loader at all
    #[error("{0}")]
    UnsupportedFormat(String),

    /// Extraction succeeded but produced no usable text
    #[error("{0}")]
    EmptyContent(String),

    /// A required column, field or tag is missing or matched nothing
    #[error("{0}")]
    SchemaMismatch(String),

    #[error("Vector dimension mismatch. Expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Traversal guard tripped on deeply nested or oversized input
    #[error("{0}")]
    LimitExceeded(String),

    #[error("Failed to parse {format}: {message}")]
    Parse {
        format: &'static str,
        message: String,
    },

    #[error("Transcription failed: {0}")]
    Transcription(String),

    #[error("Embedding failed: {0}")]
    Embedding(#[from] EmbedError),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl IngestError {
    pub fn parse(format: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Parse {
            format,
            message: err.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Io(e) if e.kind() == std::io::ErrorKind::NotFound => ErrorKind::NotFound,
            Self::UnsupportedFormat(_) => ErrorKind::UnsupportedFormat,
            Self::EmptyContent(_) => ErrorKind::EmptyContent,
            Self::SchemaMismatch(_) | Self::DimensionMismatch { .. } => ErrorKind::SchemaMismatch,
            Self::LimitExceeded(_) => ErrorKind::LimitExceeded,
            Self::Parse { .. }
            | Self::Transcription(_)
            | Self::Embedding(_)
            | Self::Storage(_)
            | Self::Io(_)
            | Self::Task(_) => ErrorKind::Backend,
        }
    }
}

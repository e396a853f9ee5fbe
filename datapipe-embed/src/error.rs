//! Error types for the embedding engine

use std::path::PathBuf;

/// Result type for embedding operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Errors raised while configuring, loading or running an embedding model.
///
/// - **Configuration Errors**: unknown model names, missing local model files
/// - **Initialization Errors**: failures while the ONNX runtime loads a model
/// - **Runtime Errors**: failures during embedding generation
/// - **External Errors**: anything bubbling up from fastembed or tokio
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    /// A file required by a local model directory is missing
    #[error("Model file not found: {path}")]
    ModelFileNotFound { path: PathBuf },

    /// The configuration cannot be turned into a working provider
    #[error("Invalid model configuration: {message}")]
    InvalidConfig { message: String },

    /// The model produced vectors of a different width than configured
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Error during embedding generation
    #[error("Embedding generation failed: {source}")]
    EmbeddingGeneration {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("Async task failed: {source}")]
    AsyncTask {
        #[from]
        source: tokio::task::JoinError,
    },

    #[error("External error: {source}")]
    External {
        #[from]
        source: anyhow::Error,
    },
}

impl EmbedError {
    /// Wrap a failure that happened while generating embeddings.
    pub fn embedding_gen<E>(source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::EmbeddingGeneration {
            source: source.into(),
        }
    }

    /// Create an invalid configuration error with a custom message.
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

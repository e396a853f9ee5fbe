//! datapipe-ingest: turn a directory of mixed documents into searchable text
//!
//! Files are routed by extension to a loader (spreadsheets, documents, audio,
//! JSON/XML/HTML), every extracted fragment is stored as a text record in
//! SQLite, and a vectorization pass embeds the pending records into a flat L2
//! index that is snapshotted to disk.
//!
//! ## Key Modules
//!
//! - **[`pipeline`]**: the orchestrator and its per-file and per-run reports
//! - **[`loaders`]**: the [`Loader`](loaders::Loader) trait, built-in loaders and the extension registry
//! - **[`storage`]**: the [`TextStore`](storage::TextStore) trait and its SQLite implementation
//! - **[`vector`]**: the in-memory index and the manager that owns it for a run
//! - **[`preprocess`]**, **[`transcribe`]**: text normalization and the speech-to-text seam
//! - **[`config`]**, **[`error`]**: startup configuration and the error taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use datapipe_embed::HashingProvider;
//! use datapipe_ingest::{
//!     IngestPipeline, LoadHints, LoaderRegistry, SqliteTextStore, VectorIndexManager,
//!     WhisperHttpTranscriber, config::PipelineConfig,
//! };
//! use std::{path::Path, sync::Arc};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = PipelineConfig::default();
//! config.ensure_directories()?;
//!
//! let store = Arc::new(SqliteTextStore::open_memory().await?);
//! let transcriber = Arc::new(WhisperHttpTranscriber::new(&config.transcription)?);
//! let registry = LoaderRegistry::with_defaults(transcriber, Some(config.transcripts_dir()));
//! let index = VectorIndexManager::open(Arc::new(HashingProvider::new(300)), config.index_path())?;
//!
//! let mut pipeline = IngestPipeline::new(store, registry, index);
//! let summary = pipeline.run(Path::new("inbox"), &LoadHints::default()).await?;
//! println!("{} files ok", summary.ingest.success_count());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod loaders;
pub mod pipeline;
pub mod preprocess;
pub mod storage;
pub mod transcribe;
pub mod vector;

pub use error::{ErrorKind, IngestError, Result};
pub use loaders::{LoadHints, Loader, LoaderRegistry};
pub use pipeline::{
    FileOutcome, IngestPipeline, IngestReport, LoadSummary, RunSummary, VectorizeReport,
    VectorizeStatus,
};
pub use storage::{SqliteTextStore, TextRecord, TextStore};
pub use transcribe::{Transcriber, WhisperHttpTranscriber};
pub use vector::{SearchHit, VectorIndex, VectorIndexManager};

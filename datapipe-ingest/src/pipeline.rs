//! End-to-end ingestion: discovery, extraction, persistence and vectorization.
//!
//! ## Pipeline Flow
//!
//! ```text
//! discover_files → LoaderRegistry → TextStore (pending records)
//!                                       │
//!              vectorize_pending: preprocess → embed → set_processed_content
//!                                       │            → index add → save_embedding
//!                                       v
//!                         index snapshot + metadata (written once)
//! ```
//!
//! Every step is awaited in sequence. A failing file or record is reported and
//! the batch carries on; nothing short of a broken store or index aborts a run.

use crate::error::{ErrorKind, IngestError, Result};
use crate::loaders::{LoadHints, LoaderRegistry, extension_of};
use crate::preprocess::TextPreprocessor;
use crate::storage::{NewText, TextRecord, TextStore};
use crate::vector::{SearchHit, VectorIndexManager};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What one successfully loaded file contributed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadSummary {
    pub loader: &'static str,
    pub text_ids: Vec<String>,
}

impl LoadSummary {
    pub fn fragments(&self) -> usize {
        self.text_ids.len()
    }
}

#[derive(Debug)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub result: std::result::Result<LoadSummary, IngestError>,
}

impl FileOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        self.result.as_ref().err().map(IngestError::kind)
    }
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub outcomes: Vec<FileOutcome>,
}

impl IngestReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &FileOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn success_count(&self) -> usize {
        self.succeeded().count()
    }

    pub fn failure_count(&self) -> usize {
        self.failed().count()
    }

    /// Records created across all files.
    pub fn records_created(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .map(LoadSummary::fragments)
            .sum()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorizeStatus {
    /// Nothing was pending; no embedding calls, nothing written
    NoOp,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordFailure {
    pub text_id: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorizeReport {
    pub status: VectorizeStatus,
    pub pending: usize,
    pub processed: usize,
    pub failures: Vec<RecordFailure>,
    pub index_size: usize,
}

impl VectorizeReport {
    fn no_op(index_size: usize) -> Self {
        Self {
            status: VectorizeStatus::NoOp,
            pending: 0,
            processed: 0,
            failures: Vec::new(),
            index_size,
        }
    }
}

#[derive(Debug)]
pub struct RunSummary {
    pub ingest: IngestReport,
    pub vectorize: VectorizeReport,
}

impl RunSummary {
    /// `0` when every file and record went through, `1` otherwise.
    pub fn exit_code(&self) -> i32 {
        if self.ingest.failure_count() == 0 && self.vectorize.failures.is_empty() {
            0
        } else {
            1
        }
    }
}

pub struct IngestPipeline {
    store: Arc<dyn TextStore>,
    registry: LoaderRegistry,
    index: VectorIndexManager,
    preprocessor: TextPreprocessor,
    show_progress: bool,
}

impl IngestPipeline {
    pub fn new(
        store: Arc<dyn TextStore>,
        registry: LoaderRegistry,
        index: VectorIndexManager,
    ) -> Self {
        Self {
            store,
            registry,
            index,
            preprocessor: TextPreprocessor::new(),
            show_progress: false,
        }
    }

    pub fn with_progress(self, show_progress: bool) -> Self {
        Self {
            show_progress,
            ..self
        }
    }

    pub fn store(&self) -> &Arc<dyn TextStore> {
        &self.store
    }

    pub fn index(&self) -> &VectorIndexManager {
        &self.index
    }

    /// Every regular file below `dir`, sorted. Ignore files and hidden
    /// entries are not filtered.
    pub fn discover_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        if !dir.is_dir() {
            return Err(IngestError::NotFound {
                path: dir.to_path_buf(),
            });
        }

        let mut files = Vec::new();
        for entry in ignore::WalkBuilder::new(dir).standard_filters(false).build() {
            match entry {
                Ok(entry) if entry.file_type().is_some_and(|t| t.is_file()) => {
                    files.push(entry.into_path());
                }
                Ok(_) => {}
                Err(e) => warn!("Skipping unreadable entry under {}: {}", dir.display(), e),
            }
        }
        files.sort();
        info!("Discovered {} files in {}", files.len(), dir.display());
        Ok(files)
    }

    /// Load and persist each file independently.
    pub async fn process_files(&self, paths: &[PathBuf], hints: &LoadHints) -> IngestReport {
        let progress = self.progress_bar(paths.len(), "files");
        let mut report = IngestReport::default();

        for path in paths {
            progress.set_message(
                path.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
            );
            let result = self.process_file(path, hints).await;
            match &result {
                Ok(summary) => debug!(
                    "Loaded {} fragments from {} via {}",
                    summary.fragments(),
                    path.display(),
                    summary.loader
                ),
                Err(e) => warn!("Failed to process {}: {}", path.display(), e),
            }
            report.outcomes.push(FileOutcome {
                path: path.clone(),
                result,
            });
            progress.inc(1);
        }
        progress.finish_and_clear();

        info!(
            "Processed {} files successfully, {} failed, {} records created",
            report.success_count(),
            report.failure_count(),
            report.records_created()
        );
        report
    }

    async fn process_file(&self, path: &Path, hints: &LoadHints) -> Result<LoadSummary> {
        let loader = self.registry.get_for_path(path).ok_or_else(|| {
            let ext = extension_of(path);
            let shown = if ext.is_empty() { ext } else { format!(".{ext}") };
            IngestError::UnsupportedFormat(format!("Unsupported file type: {shown}"))
        })?;

        let fragments = loader.extract(path, hints).await?;
        let source_file = path.to_string_lossy().to_string();
        let texts: Vec<NewText> = fragments
            .into_iter()
            .map(|content| NewText::new(source_file.clone(), content))
            .collect();

        self.store.save_texts(&texts).await?;
        Ok(LoadSummary {
            loader: loader.name(),
            text_ids: texts.into_iter().map(|t| t.id).collect(),
        })
    }

    /// Normalize, embed and index every pending record, then snapshot the index.
    pub async fn vectorize_pending(&mut self) -> Result<VectorizeReport> {
        let pending = self.store.get_unprocessed_texts().await?;
        if pending.is_empty() {
            info!("No unprocessed texts found");
            return Ok(VectorizeReport::no_op(self.index.len()));
        }

        info!("Processing {} texts", pending.len());
        let progress = self.progress_bar(pending.len(), "texts");
        let vector_path = self.index.index_path().to_string_lossy().to_string();
        let mut processed = 0;
        let mut failures = Vec::new();

        for record in &pending {
            match self.vectorize_record(record, &vector_path).await {
                Ok(()) => processed += 1,
                Err(e) => {
                    warn!("Failed to vectorize text {}: {}", record.id, e);
                    failures.push(RecordFailure {
                        text_id: record.id.clone(),
                        message: e.to_string(),
                    });
                }
            }
            progress.inc(1);
        }
        progress.finish_and_clear();

        self.index.save()?;
        info!(
            "Vectorized {} texts, {} failed, index holds {} vectors",
            processed,
            failures.len(),
            self.index.len()
        );

        Ok(VectorizeReport {
            status: VectorizeStatus::Completed,
            pending: pending.len(),
            processed,
            failures,
            index_size: self.index.len(),
        })
    }

    async fn vectorize_record(&mut self, record: &TextRecord, vector_path: &str) -> Result<()> {
        let processed = self.preprocessor.preprocess(&record.content);
        let vector = self.index.embed(&processed).await?;

        if !self
            .store
            .set_processed_content(&record.id, &processed)
            .await?
        {
            debug!("Text {} was already processed, skipping", record.id);
            return Ok(());
        }

        self.index
            .add_with_ids(std::slice::from_ref(&record.id), &[vector])?;
        let embedding_id = uuid::Uuid::new_v4().to_string();
        self.store
            .save_embedding(&embedding_id, &record.id, vector_path)
            .await?;
        debug!("Vectorized text {}", record.id);
        Ok(())
    }

    /// Ingest everything under `input_dir`, then run the vectorization pass.
    pub async fn run(&mut self, input_dir: &Path, hints: &LoadHints) -> Result<RunSummary> {
        let files = self.discover_files(input_dir)?;
        let ingest = self.process_files(&files, hints).await;
        let vectorize = self.vectorize_pending().await?;
        Ok(RunSummary { ingest, vectorize })
    }

    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        self.index.search_text(query, k).await
    }

    fn progress_bar(&self, len: usize, unit: &str) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        let template = format!(
            "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {unit} ({{percent}}%) {{msg}}"
        );
        if let Ok(style) = ProgressStyle::default_bar().template(&template) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    }
}

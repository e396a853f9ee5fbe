use super::index::{Neighbor, VectorIndex, write_atomic};
use crate::error::{IngestError, Result};
use crate::preprocess::TextPreprocessor;
use datapipe_embed::EmbeddingProvider;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// A search result mapped back to the text record it was built from.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub position: usize,
    pub distance: f32,
    pub text_id: Option<String>,
}

/// Owns the embedding provider and the in-memory index for one run.
///
/// Positions are mirrored by a list of text ids which is written next to the
/// snapshot as `<index>.meta.json`.
pub struct VectorIndexManager {
    provider: Arc<dyn EmbeddingProvider>,
    preprocessor: TextPreprocessor,
    index: VectorIndex,
    text_ids: Vec<Option<String>>,
    index_path: PathBuf,
}

impl VectorIndexManager {
    /// Empty index sized to the provider's output width.
    pub fn new(provider: Arc<dyn EmbeddingProvider>, index_path: impl Into<PathBuf>) -> Self {
        let index = VectorIndex::new(provider.embedding_dimension());
        Self {
            provider,
            preprocessor: TextPreprocessor::new(),
            index,
            text_ids: Vec::new(),
            index_path: index_path.into(),
        }
    }

    /// Resume from the snapshot at `index_path` when one exists.
    pub fn open(
        provider: Arc<dyn EmbeddingProvider>,
        index_path: impl Into<PathBuf>,
    ) -> Result<Self> {
        let mut manager = Self::new(provider, index_path);
        if !manager.index_path.exists() {
            tracing::debug!(
                "No index snapshot at {}, starting empty",
                manager.index_path.display()
            );
            return Ok(manager);
        }

        let index = VectorIndex::load(&manager.index_path)?;
        if index.dimension() != manager.index.dimension() {
            return Err(IngestError::DimensionMismatch {
                expected: manager.index.dimension(),
                actual: index.dimension(),
            });
        }

        let meta_path = metadata_path(&manager.index_path);
        let text_ids: Vec<Option<String>> = if meta_path.exists() {
            let raw = std::fs::read(&meta_path)?;
            serde_json::from_slice(&raw).map_err(|e| IngestError::parse("index metadata", e))?
        } else {
            tracing::warn!(
                "Index metadata missing at {}, search hits will carry no text ids",
                meta_path.display()
            );
            vec![None; index.len()]
        };
        if text_ids.len() != index.len() {
            return Err(IngestError::parse(
                "index metadata",
                format!("{} ids for {} vectors", text_ids.len(), index.len()),
            ));
        }

        tracing::info!(
            "Loaded index with {} vectors from {}",
            index.len(),
            manager.index_path.display()
        );
        manager.index = index;
        manager.text_ids = text_ids;
        Ok(manager)
    }

    pub fn index_path(&self) -> &Path {
        &self.index_path
    }

    pub fn dimension(&self) -> usize {
        self.index.dimension()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Embed text, rejecting vectors of the wrong width.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vector = self.provider.embed_text(text).await?;
        if vector.len() != self.index.dimension() {
            return Err(IngestError::DimensionMismatch {
                expected: self.index.dimension(),
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    /// Append vectors that have no associated text record.
    pub fn add(&mut self, vectors: &[Vec<f32>]) -> Result<()> {
        self.index.add(vectors)?;
        self.text_ids.extend(std::iter::repeat_n(None, vectors.len()));
        Ok(())
    }

    pub fn add_with_ids(&mut self, ids: &[String], vectors: &[Vec<f32>]) -> Result<()> {
        if ids.len() != vectors.len() {
            return Err(IngestError::SchemaMismatch(format!(
                "{} ids for {} vectors",
                ids.len(),
                vectors.len()
            )));
        }
        self.index.add(vectors)?;
        self.text_ids.extend(ids.iter().cloned().map(Some));
        Ok(())
    }

    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        self.index.search(query, k)
    }

    /// Normalize and embed `query` the same way records are, then search.
    pub async fn search_text(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let normalized = self.preprocessor.preprocess(query);
        let vector = self.embed(&normalized).await?;
        Ok(self
            .search(&vector, k)?
            .into_iter()
            .map(|n| SearchHit {
                position: n.position,
                distance: n.distance,
                text_id: self.text_ids.get(n.position).cloned().flatten(),
            })
            .collect())
    }

    /// Persist the snapshot and its metadata side-file.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.index_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        self.index.save(&self.index_path)?;

        let meta = serde_json::to_vec(&self.text_ids)
            .map_err(|e| IngestError::parse("index metadata", e))?;
        write_atomic(&metadata_path(&self.index_path), &meta)?;

        tracing::info!(
            "Saved index with {} vectors to {}",
            self.index.len(),
            self.index_path.display()
        );
        Ok(())
    }
}

/// `<index>.meta.json` next to the snapshot.
pub fn metadata_path(index_path: &Path) -> PathBuf {
    let mut name = index_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".meta.json");
    index_path.with_file_name(name)
}

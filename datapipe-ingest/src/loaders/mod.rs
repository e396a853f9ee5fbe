//! Type-specific text extraction.
//!
//! Each [`Loader`] turns one file into zero or more text fragments and knows
//! nothing about persistence. The [`LoaderRegistry`] maps lowercased file
//! extensions onto loaders, so adding a format means registering one more
//! loader rather than editing the dispatch.
//!
//! ## Key Components
//!
//! - **StructuredLoader**: `.csv`, `.xlsx`, `.xls`, one fragment per row
//! - **DocumentLoader**: `.txt`, `.pdf`, one fragment per file
//! - **AudioLoader**: `.mp3`, `.mp4`, `.wav`, `.m4a` through a [`Transcriber`]
//! - **MarkupLoader**: `.json` by field name, `.xml` and `.html` by tag name

use crate::error::Result;
use crate::transcribe::Transcriber;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub mod audio;
pub mod document;
pub mod markup;
pub mod structured;

pub use audio::AudioLoader;
pub use document::DocumentLoader;
pub use markup::MarkupLoader;
pub use structured::StructuredLoader;

/// Caller-supplied selectors for formats that need to know where the text lives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadHints {
    /// Column holding the text in CSV and spreadsheet files
    pub text_column: Option<String>,
    /// Object keys whose string values are collected from JSON files
    pub text_fields: Vec<String>,
    /// Element names whose text is collected from XML and HTML files
    pub text_tags: Vec<String>,
}

#[async_trait]
pub trait Loader: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lowercase extensions without the leading dot.
    fn extensions(&self) -> &[&'static str];

    async fn extract(&self, path: &Path, hints: &LoadHints) -> Result<Vec<String>>;
}

/// Lowercased extension of `path` without the dot, empty when there is none.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

pub struct LoaderRegistry {
    loaders: HashMap<&'static str, Arc<dyn Loader>>,
    by_extension: HashMap<String, &'static str>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self {
            loaders: HashMap::new(),
            by_extension: HashMap::new(),
        }
    }

    /// Registry with every built-in loader. Transcripts are written to
    /// `transcripts_dir` when given.
    pub fn with_defaults(
        transcriber: Arc<dyn Transcriber>,
        transcripts_dir: Option<PathBuf>,
    ) -> Self {
        let mut registry = Self::new();
        registry.register(StructuredLoader::new());
        registry.register(DocumentLoader::new());
        registry.register(AudioLoader::new(transcriber, transcripts_dir));
        registry.register(MarkupLoader::new());
        registry
    }

    /// Register a loader for all of its extensions. Later registrations win.
    pub fn register<L: Loader + 'static>(&mut self, loader: L) {
        let loader = Arc::new(loader);
        for ext in loader.extensions() {
            self.by_extension.insert((*ext).to_string(), loader.name());
        }
        self.loaders.insert(loader.name(), loader);
    }

    pub fn get_for_extension(&self, ext: &str) -> Option<Arc<dyn Loader>> {
        let ext = ext.trim_start_matches('.').to_lowercase();
        self.by_extension
            .get(&ext)
            .and_then(|name| self.loaders.get(name))
            .cloned()
    }

    pub fn get_for_path(&self, path: &Path) -> Option<Arc<dyn Loader>> {
        self.get_for_extension(&extension_of(path))
    }

    /// Every routed extension, sorted.
    pub fn extensions(&self) -> Vec<&str> {
        let mut exts: Vec<&str> = self.by_extension.keys().map(String::as_str).collect();
        exts.sort_unstable();
        exts
    }
}

impl Default for LoaderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

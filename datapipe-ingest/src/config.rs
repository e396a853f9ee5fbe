//! Startup configuration.
//!
//! [`PipelineConfig`] is read once in `main` through figment: built-in
//! defaults, then an optional TOML file, then `DATAPIPE_*` environment
//! variables. The result is validated and handed to every component by
//! reference. Nothing below this module reads the environment or creates
//! directories on its own.
//!
//! Environment names follow the TOML layout with the section as a prefix,
//! e.g. `DATAPIPE_EMBEDDING_PROVIDER` or `DATAPIPE_EMBEDDING__PROVIDER` for
//! `embedding.provider`. `DATAPIPE_DATABASE_PATH` is accepted for
//! `storage.database_path`.
//!
//! ```toml
//! data_dir = "data"
//! log_level = "info"
//!
//! [storage]
//! database_path = "data/datapipe.db"
//!
//! [embedding]
//! provider = "fastembed"
//! model = "all-minilm-l6-v2"
//! dimension = 384
//!
//! [transcription]
//! endpoint = "http://localhost:8000"
//! model = "base"
//! ```

use anyhow::{Context, Result, bail};
use datapipe_embed::EmbedConfig;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use figment::value::{Uncased, UncasedStr};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File picked up from the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "datapipe.toml";

const ENV_PREFIX: &str = "DATAPIPE_";

const SECTIONS: &[&str] = &["storage", "embedding", "transcription"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Root of the persisted state (audio, transcripts, vectors)
    pub data_dir: PathBuf,
    /// Default tracing filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Draw progress bars while ingesting and vectorizing
    pub show_progress: bool,
    pub storage: StorageConfig,
    pub embedding: EmbeddingSettings,
    pub transcription: TranscriptionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database file; defaults to `<data_dir>/datapipe.db`
    pub database_path: Option<PathBuf>,
    pub busy_timeout_secs: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// ONNX models via fastembed
    Fastembed,
    /// Offline feature hashing
    Hashing,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: ProviderKind,
    pub model: String,
    /// Local ONNX model directory, overrides `model`
    pub model_path: Option<PathBuf>,
    pub cache_dir: PathBuf,
    pub dimension: usize,
    pub batch_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TranscriptionConfig {
    /// Base URL of a Whisper-compatible transcription server
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub language: Option<String>,
    pub timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            log_level: "info".to_string(),
            show_progress: true,
            storage: StorageConfig::default(),
            embedding: EmbeddingSettings::default(),
            transcription: TranscriptionConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            busy_timeout_secs: 5,
        }
    }
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        let defaults = EmbedConfig::default();
        Self {
            provider: ProviderKind::Fastembed,
            model: defaults.model_name,
            model_path: None,
            cache_dir: defaults.cache_dir,
            dimension: defaults.dimension,
            batch_size: defaults.batch_size,
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8000".to_string(),
            model: "base".to_string(),
            api_key: None,
            language: None,
            timeout_secs: 600,
        }
    }
}

impl PipelineConfig {
    /// Layer defaults, the configuration file and the environment.
    ///
    /// An explicit path must exist. Without one, [`DEFAULT_CONFIG_FILE`] is used
    /// when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) if !p.exists() => bail!("config file {} does not exist", p.display()),
            Some(p) => p.to_path_buf(),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        Figment::new()
            .merge(Toml::file(&file))
            .merge(Self::env())
            .extract()
            .with_context(|| format!("loading configuration (file {})", file.display()))
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(Figment::new().merge(Toml::string(raw)).extract()?)
    }

    /// `DATAPIPE_*` variables mapped onto configuration keys.
    fn env() -> Env {
        Env::prefixed(ENV_PREFIX).split("__").map(env_key)
    }

    pub fn validate(&self) -> Result<()> {
        if self.embedding.dimension == 0 {
            bail!("embedding.dimension must be positive");
        }
        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be positive");
        }
        if self.transcription.endpoint.trim().is_empty() {
            bail!("transcription.endpoint must not be empty");
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join("datapipe.db"))
    }

    pub fn audio_dir(&self) -> PathBuf {
        self.data_dir.join("audio")
    }

    pub fn transcripts_dir(&self) -> PathBuf {
        self.data_dir.join("transcripts")
    }

    pub fn vectors_dir(&self) -> PathBuf {
        self.data_dir.join("vectors")
    }

    /// Location of the single index snapshot.
    pub fn index_path(&self) -> PathBuf {
        self.vectors_dir().join("text.index")
    }

    /// Create the data directory layout.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            self.data_dir.clone(),
            self.audio_dir(),
            self.transcripts_dir(),
            self.vectors_dir(),
        ] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("creating directory {}", dir.display()))?;
        }
        if let Some(parent) = self.database_path().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    pub fn embed_config(&self) -> EmbedConfig {
        let settings = &self.embedding;
        let base = match &settings.model_path {
            Some(path) => EmbedConfig::local(path, settings.dimension),
            None => EmbedConfig::new(settings.model.clone(), settings.dimension),
        };
        base.with_cache_dir(settings.cache_dir.clone())
            .with_batch_size(settings.batch_size)
    }
}

/// `embedding_provider` -> `embedding.provider`, `database_path` ->
/// `storage.database_path`; anything else is left as is.
fn env_key(key: &UncasedStr) -> Uncased<'_> {
    let key = key.as_str().to_ascii_lowercase();
    if key == "database_path" {
        return Uncased::from_owned("storage.database_path".to_string());
    }
    for section in SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return Uncased::from_owned(format!("{section}.{rest}"));
        }
    }
    Uncased::from_owned(key)
}

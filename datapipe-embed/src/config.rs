//! Configuration for embedding models

use crate::error::{EmbedError, Result};
use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the model used when nothing else is configured.
pub const DEFAULT_MODEL: &str = "all-minilm-l6-v2";

/// Output width of [`DEFAULT_MODEL`].
pub const DEFAULT_DIMENSION: usize = 384;

/// Tokenizer files that accompany a local ONNX model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenizerConfig {
    /// Path to the tokenizer.json file
    pub tokenizer_path: PathBuf,
    /// Path to the config.json file
    pub config_path: PathBuf,
    /// Path to the special_tokens_map.json file
    pub special_tokens_map_path: PathBuf,
    /// Path to the tokenizer_config.json file (optional, a minimal one is generated if missing)
    pub tokenizer_config_path: Option<PathBuf>,
}

impl TokenizerConfig {
    /// Standard HuggingFace layout inside a model directory.
    pub fn standard<P: AsRef<Path>>(model_dir: P) -> Self {
        let model_dir = model_dir.as_ref();
        Self {
            tokenizer_path: model_dir.join("tokenizer.json"),
            config_path: model_dir.join("config.json"),
            special_tokens_map_path: model_dir.join("special_tokens_map.json"),
            tokenizer_config_path: Some(model_dir.join("tokenizer_config.json")),
        }
    }

    /// Validate that all required tokenizer files exist
    pub fn validate(&self) -> Result<()> {
        let paths_to_check = [
            ("tokenizer", &self.tokenizer_path),
            ("config", &self.config_path),
            ("special tokens map", &self.special_tokens_map_path),
        ];

        for (name, path) in &paths_to_check {
            if !path.exists() {
                tracing::error!("Missing {}: {}", name, path.display());
                return Err(EmbedError::ModelFileNotFound {
                    path: path.to_path_buf(),
                });
            }
        }

        if let Some(path) = &self.tokenizer_config_path {
            if !path.exists() {
                tracing::warn!(
                    "tokenizer_config.json not found at {}, will generate minimal config",
                    path.display()
                );
            }
        }

        Ok(())
    }
}

/// Configuration for an embedding provider.
///
/// Either names one of the built-in fastembed models (downloaded into
/// `cache_dir` on first use) or points `model_path` at a local directory holding
/// an exported ONNX model plus its tokenizer files.
#[derive(Debug, Clone, Builder, Serialize, Deserialize, PartialEq)]
#[builder(setter(into))]
pub struct EmbedConfig {
    /// Name of the embedding model to use
    #[builder(default = "DEFAULT_MODEL.to_string()")]
    pub model_name: String,
    /// Local model directory; when set, `model_name` is only used for logging
    #[builder(default)]
    pub model_path: Option<PathBuf>,
    /// Where built-in models are downloaded to
    #[builder(default = r#"PathBuf::from("models")"#)]
    pub cache_dir: PathBuf,
    /// Expected width of every produced vector
    #[builder(default = "DEFAULT_DIMENSION")]
    pub dimension: usize,
    /// Maximum batch size for embedding generation
    #[builder(default = "32")]
    pub batch_size: usize,
    /// Whether to L2-normalize embeddings
    #[builder(default = "true")]
    pub normalize: bool,
}

impl EmbedConfig {
    pub fn builder() -> EmbedConfigBuilder {
        EmbedConfigBuilder::default()
    }

    /// Configuration for a built-in model with a known output width.
    pub fn new(model_name: impl Into<String>, dimension: usize) -> Self {
        Self {
            model_name: model_name.into(),
            dimension,
            ..Self::default()
        }
    }

    /// Configuration for a local ONNX model directory.
    pub fn local<P: AsRef<Path>>(model_path: P, dimension: usize) -> Self {
        let model_path = model_path.as_ref();
        let model_name = model_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "local-model".to_string());
        Self {
            model_name,
            model_path: Some(model_path.to_path_buf()),
            dimension,
            ..Self::default()
        }
    }

    pub fn with_cache_dir<P: Into<PathBuf>>(self, cache_dir: P) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            ..self
        }
    }

    pub fn with_batch_size(self, batch_size: usize) -> Self {
        Self { batch_size, ..self }
    }

    pub fn with_normalize(self, normalize: bool) -> Self {
        Self { normalize, ..self }
    }

    pub fn is_local_model(&self) -> bool {
        self.model_path.is_some()
    }

    /// Path to the ONNX file of a local model.
    ///
    /// Prefers `onnx/model.onnx` and falls back to `onnx/model_quantized.onnx`.
    pub fn onnx_model_path(&self) -> Option<PathBuf> {
        let model_dir = self.model_path.as_ref()?;
        let plain = model_dir.join("onnx").join("model.onnx");
        if plain.exists() {
            return Some(plain);
        }
        Some(model_dir.join("onnx").join("model_quantized.onnx"))
    }

    pub fn tokenizer_config(&self) -> Option<TokenizerConfig> {
        self.model_path.as_ref().map(TokenizerConfig::standard)
    }

    /// Validate settings that can be checked without loading the model.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(EmbedError::invalid_config("dimension must be positive"));
        }
        if self.batch_size == 0 {
            return Err(EmbedError::invalid_config("batch_size must be positive"));
        }

        if let (Some(onnx_path), Some(tokenizer)) =
            (self.onnx_model_path(), self.tokenizer_config())
        {
            if !onnx_path.exists() {
                tracing::error!("Missing ONNX model: {}", onnx_path.display());
                return Err(EmbedError::ModelFileNotFound { path: onnx_path });
            }
            tokenizer.validate()?;
        }

        tracing::debug!("Model configuration valid for: {}", self.model_name);
        Ok(())
    }
}

impl Default for EmbedConfig {
    fn default() -> Self {
        Self {
            model_name: DEFAULT_MODEL.to_string(),
            model_path: None,
            cache_dir: PathBuf::from("models"),
            dimension: DEFAULT_DIMENSION,
            batch_size: 32,
            normalize: true,
        }
    }
}

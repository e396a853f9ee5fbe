//! Embedding provider implementations

use crate::config::EmbedConfig;
use crate::error::{EmbedError, Result};
use async_trait::async_trait;
use fastembed::{
    EmbeddingModel, InitOptions, TextEmbedding, TokenizerFiles, UserDefinedEmbeddingModel,
};
use std::sync::{Arc, Mutex};
use tokio::fs;

/// Result of embedding generation
#[derive(Debug, Clone)]
pub struct EmbeddingResult {
    /// The generated embeddings, one per input text
    pub embeddings: Vec<Vec<f32>>,
    /// The dimension of each embedding vector
    pub dimension: usize,
}

impl EmbeddingResult {
    /// Create a result; the dimension is taken from the first vector (0 when empty).
    pub fn new(embeddings: Vec<Vec<f32>>) -> Self {
        let dimension = embeddings.first().map(|e| e.len()).unwrap_or(0);
        Self {
            embeddings,
            dimension,
        }
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

/// Trait for embedding providers that can generate embeddings from text
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate the embedding for a single text
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let result = self.embed_texts(&[text.to_string()]).await?;
        result
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::embedding_gen("No embedding generated for text"))
    }

    /// Generate embeddings for multiple texts (batch processing)
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult>;

    /// Width of every vector this provider produces
    fn embedding_dimension(&self) -> usize;

    fn provider_name(&self) -> &str;
}

/// Scale a vector to unit length in place. Zero vectors are left untouched.
pub(crate) fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

/// Map a configured model name onto one of fastembed's bundled models.
pub fn builtin_model(name: &str) -> Result<EmbeddingModel> {
    let model = match name.to_ascii_lowercase().as_str() {
        "all-minilm-l6-v2" => EmbeddingModel::AllMiniLML6V2,
        "all-minilm-l12-v2" => EmbeddingModel::AllMiniLML12V2,
        "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
        "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
        "multilingual-e5-small" => EmbeddingModel::MultilingualE5Small,
        "paraphrase-multilingual-minilm-l12-v2" => EmbeddingModel::ParaphraseMLMiniLML12V2,
        other => {
            return Err(EmbedError::invalid_config(format!(
                "unknown built-in model: {other}"
            )));
        }
    };
    Ok(model)
}

/// FastEmbed-based embedding provider running ONNX models locally
#[derive(Clone)]
pub struct FastEmbedProvider {
    config: EmbedConfig,
    model: Option<Arc<Mutex<TextEmbedding>>>,
}

impl std::fmt::Debug for FastEmbedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FastEmbedProvider")
            .field("config", &self.config)
            .field("model", &self.model.is_some())
            .finish()
    }
}

impl FastEmbedProvider {
    /// Creates an uninitialized provider; call [`initialize`](Self::initialize) before use.
    pub fn new(config: EmbedConfig) -> Self {
        Self {
            config,
            model: None,
        }
    }

    /// Creates and initializes a provider in one step.
    pub async fn create(config: EmbedConfig) -> Result<Self> {
        let mut provider = Self::new(config);
        provider.initialize().await?;
        Ok(provider)
    }

    /// Load the configured model and check that it yields vectors of the configured width.
    pub async fn initialize(&mut self) -> Result<()> {
        self.config.validate()?;
        tracing::info!(
            "Initializing FastEmbed provider for model: {}",
            self.config.model_name
        );

        let model = if self.config.is_local_model() {
            self.load_user_defined_model().await?
        } else {
            let embedding_model = builtin_model(&self.config.model_name)?;
            let cache_dir = self.config.cache_dir.clone();
            tokio::task::spawn_blocking(move || -> Result<TextEmbedding> {
                let init_options = InitOptions::new(embedding_model)
                    .with_cache_dir(cache_dir)
                    .with_show_download_progress(true);
                TextEmbedding::try_new(init_options).map_err(|e| EmbedError::External { source: e })
            })
            .await??
        };

        self.model = Some(Arc::new(Mutex::new(model)));
        self.validate_model().await
    }

    /// Load a local ONNX export plus its tokenizer files
    async fn load_user_defined_model(&self) -> Result<TextEmbedding> {
        let (Some(onnx_path), Some(tokenizer_config)) =
            (self.config.onnx_model_path(), self.config.tokenizer_config())
        else {
            return Err(EmbedError::invalid_config("model_path is not set"));
        };
        tracing::info!("Loading local model from {}", onnx_path.display());

        let onnx_file = fs::read(&onnx_path).await?;
        let tokenizer_file = fs::read(&tokenizer_config.tokenizer_path).await?;
        let config_file = fs::read(&tokenizer_config.config_path).await?;
        let special_tokens_map_file = fs::read(&tokenizer_config.special_tokens_map_path).await?;

        let tokenizer_config_file = match &tokenizer_config.tokenizer_config_path {
            Some(path) if path.exists() => fs::read(path).await?,
            _ => {
                let minimal_config = serde_json::json!({
                    "clean_up_tokenization_spaces": true,
                    "do_lower_case": true,
                    "model_max_length": 512,
                    "tokenizer_class": "BertTokenizer"
                });
                serde_json::to_vec_pretty(&minimal_config)
                    .map_err(|e| EmbedError::External { source: e.into() })?
            }
        };

        let user_model = UserDefinedEmbeddingModel::new(
            onnx_file,
            TokenizerFiles {
                tokenizer_file,
                config_file,
                special_tokens_map_file,
                tokenizer_config_file,
            },
        );

        tokio::task::spawn_blocking(move || -> Result<TextEmbedding> {
            TextEmbedding::try_new_from_user_defined(user_model, Default::default())
                .map_err(|e| EmbedError::External { source: e })
        })
        .await?
    }

    /// Embed one sample text and compare its width with the configuration
    async fn validate_model(&self) -> Result<()> {
        let sample = self.embed_text("validation test").await?;

        if sample.len() != self.config.dimension {
            return Err(EmbedError::DimensionMismatch {
                expected: self.config.dimension,
                actual: sample.len(),
            });
        }
        if sample.iter().any(|v| !v.is_finite()) {
            return Err(EmbedError::invalid_config(
                "Model validation failed: non-finite values in embedding",
            ));
        }

        tracing::debug!("Model validation passed for: {}", self.config.model_name);
        Ok(())
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedProvider {
    async fn embed_texts(&self, texts: &[String]) -> Result<EmbeddingResult> {
        if texts.is_empty() {
            return Ok(EmbeddingResult::new(vec![]));
        }

        let model = self.model.as_ref().ok_or_else(|| {
            EmbedError::invalid_config("Model not initialized. Call initialize() first.")
        })?;

        tracing::debug!("Generating embeddings for {} texts", texts.len());

        let mut all_embeddings = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(self.config.batch_size) {
            let chunk = chunk.to_vec();
            let model = Arc::clone(model);

            let mut batch = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
                let mut guard = model
                    .lock()
                    .map_err(|_| EmbedError::embedding_gen("embedding model lock poisoned"))?;
                guard.embed(chunk, None).map_err(EmbedError::embedding_gen)
            })
            .await??;

            if self.config.normalize {
                batch.iter_mut().for_each(|v| l2_normalize(v));
            }
            all_embeddings.extend(batch);
        }

        Ok(EmbeddingResult::new(all_embeddings))
    }

    fn embedding_dimension(&self) -> usize {
        self.config.dimension
    }

    fn provider_name(&self) -> &str {
        "fastembed"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_result() {
        let result = EmbeddingResult::new(vec![vec![0.1, 0.2, 0.3], vec![0.4, 0.5, 0.6]]);

        assert_eq!(result.len(), 2);
        assert_eq!(result.dimension, 3);
        assert!(!result.is_empty());

        let empty = EmbeddingResult::new(vec![]);
        assert!(empty.is_empty());
        assert_eq!(empty.dimension, 0);
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_builtin_model_names() {
        assert!(builtin_model("all-MiniLM-L6-v2").is_ok());
        assert!(builtin_model("multilingual-e5-small").is_ok());
        assert!(matches!(
            builtin_model("cc.en.300.bin"),
            Err(EmbedError::InvalidConfig { .. })
        ));
    }

    #[tokio::test]
    async fn test_uninitialized_provider_errors() {
        let provider = FastEmbedProvider::new(EmbedConfig::default());
        assert_eq!(provider.provider_name(), "fastembed");
        assert_eq!(provider.embedding_dimension(), 384);

        let err = provider.embed_text("hello").await.unwrap_err();
        assert!(err.to_string().contains("Model not initialized"));
    }

    #[tokio::test]
    async fn test_empty_batch_needs_no_model() {
        let provider = FastEmbedProvider::new(EmbedConfig::default());
        let result = provider.embed_texts(&[]).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    #[ignore] // Downloads a real model - run with: cargo test -p datapipe-embed -- --ignored
    async fn test_fastembed_download_and_embedding() -> Result<()> {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .try_init()
            .ok();

        let temp_dir = tempfile::tempdir()?;
        let config = EmbedConfig::default().with_cache_dir(temp_dir.path());
        let provider = FastEmbedProvider::create(config).await?;

        let a = provider.embed_text("the cat sat on the mat").await?;
        let b = provider.embed_text("the cat sat on the mat").await?;
        assert_eq!(a.len(), 384);
        assert_eq!(a, b, "identical input must embed identically");

        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-3);
        Ok(())
    }
}

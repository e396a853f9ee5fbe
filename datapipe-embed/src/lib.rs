//! # datapipe-embed
//!
//! Text embedding engines for the datapipe ingestion pipeline, behind one async
//! [`EmbeddingProvider`] trait.
//!
//! ## Providers
//!
//! - [`FastEmbedProvider`]: local ONNX models through fastembed, either one of
//!   the bundled models (downloaded into a cache directory on first use) or an
//!   exported model directory on disk
//! - [`HashingProvider`]: dependency-free feature hashing, deterministic and
//!   offline
//!
//! ## Quick Start
//!
//! ```no_run
//! use datapipe_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let provider = FastEmbedProvider::create(EmbedConfig::default()).await?;
//! let vector = provider.embed_text("Bonjour le monde").await?;
//! assert_eq!(vector.len(), provider.embedding_dimension());
//! # Ok(())
//! # }
//! ```
//!
//! Every provider reports a fixed [`EmbeddingProvider::embedding_dimension`];
//! [`FastEmbedProvider::initialize`] refuses to start when the loaded model
//! disagrees with the configured width.

pub mod config;
pub mod error;
pub mod hashing;
pub mod provider;

pub use config::{EmbedConfig, TokenizerConfig};
pub use error::{EmbedError, Result};
pub use hashing::HashingProvider;
pub use provider::{EmbeddingProvider, EmbeddingResult, FastEmbedProvider, builtin_model};

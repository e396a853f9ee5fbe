//! End-to-end scenarios for the ingestion pipeline
//!
//! These run the real loaders and the SQLite store (in memory) with stub
//! embedding and transcription engines:
//! - mixed directories with text, CSV and JSON inputs
//! - per-file failures that must not abort the batch
//! - vectorization bookkeeping (no-op reruns, index growth, failures)

use anyhow::Result;
use async_trait::async_trait;
use datapipe_embed::{EmbeddingProvider, EmbeddingResult};
use datapipe_ingest::storage::TextStore;
use datapipe_ingest::{
    ErrorKind, IngestError, IngestPipeline, LoadHints, LoaderRegistry, SqliteTextStore,
    Transcriber, VectorIndex, VectorIndexManager, VectorizeStatus,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

/// Returns zero vectors and counts how many texts it was asked to embed.
struct ZeroProvider {
    dimension: usize,
    calls: Arc<AtomicUsize>,
    fail_on: Option<&'static str>,
}

impl ZeroProvider {
    fn new(dimension: usize) -> Self {
        Self {
            dimension,
            calls: Arc::new(AtomicUsize::new(0)),
            fail_on: None,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for ZeroProvider {
    async fn embed_texts(&self, texts: &[String]) -> datapipe_embed::Result<EmbeddingResult> {
        self.calls.fetch_add(texts.len(), Ordering::SeqCst);
        if let Some(marker) = self.fail_on {
            if texts.iter().any(|t| t.contains(marker)) {
                return Err(datapipe_embed::EmbedError::embedding_gen("engine refused"));
            }
        }
        Ok(EmbeddingResult::new(
            texts.iter().map(|_| vec![0.0; self.dimension]).collect(),
        ))
    }

    fn embedding_dimension(&self) -> usize {
        self.dimension
    }

    fn provider_name(&self) -> &str {
        "zero"
    }
}

struct ScriptedTranscriber(&'static str);

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, _path: &Path) -> datapipe_ingest::Result<String> {
        Ok(self.0.to_string())
    }
}

struct Fixture {
    dir: TempDir,
    store: Arc<SqliteTextStore>,
    calls: Arc<AtomicUsize>,
    pipeline: IngestPipeline,
}

impl Fixture {
    async fn new() -> Result<Self> {
        Self::with_provider(ZeroProvider::new(4)).await
    }

    async fn with_provider(provider: ZeroProvider) -> Result<Self> {
        let dir = tempfile::tempdir()?;
        std::fs::create_dir_all(dir.path().join("input"))?;
        std::fs::create_dir_all(dir.path().join("transcripts"))?;

        let store = Arc::new(SqliteTextStore::open_memory().await?);
        let calls = Arc::clone(&provider.calls);
        let registry = LoaderRegistry::with_defaults(
            Arc::new(ScriptedTranscriber("hello from the recording")),
            Some(dir.path().join("transcripts")),
        );
        let index = VectorIndexManager::new(Arc::new(provider), dir.path().join("text.index"));
        let pipeline = IngestPipeline::new(store.clone(), registry, index);

        Ok(Self {
            dir,
            store,
            calls,
            pipeline,
        })
    }

    fn input(&self) -> PathBuf {
        self.dir.path().join("input")
    }

    fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.input().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }
}

#[tokio::test]
async fn test_text_and_csv_directory() -> Result<()> {
    let mut fx = Fixture::new().await?;
    fx.write("greeting.txt", "Bonjour le monde");
    fx.write("rows.csv", "text\na\nb\n");

    let hints = LoadHints {
        text_column: Some("text".to_string()),
        ..LoadHints::default()
    };
    let input = fx.input();
    let summary = fx.pipeline.run(&input, &hints).await?;

    assert_eq!(summary.ingest.success_count(), 2);
    assert_eq!(summary.ingest.failure_count(), 0);
    assert_eq!(summary.ingest.records_created(), 3);
    assert_eq!(summary.exit_code(), 0);

    assert_eq!(summary.vectorize.status, VectorizeStatus::Completed);
    assert_eq!(summary.vectorize.processed, 3);
    assert_eq!(summary.vectorize.index_size, 3);

    let stats = fx.store.stats().await?;
    assert_eq!(stats.total_texts, 3);
    assert_eq!(stats.pending_texts, 0);
    assert_eq!(stats.embeddings, 3);
    Ok(())
}

#[tokio::test]
async fn test_json_field_selection() -> Result<()> {
    let fx = Fixture::new().await?;
    let path = fx.write("doc.json", r#"{"title":"x","body":"hello"}"#);

    let hints = LoadHints {
        text_fields: vec!["body".to_string()],
        ..LoadHints::default()
    };
    let report = fx.pipeline.process_files(&[path.clone()], &hints).await;
    assert_eq!(report.success_count(), 1);

    let pending = fx.store.get_unprocessed_texts().await?;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].content, "hello");
    assert_eq!(pending[0].source_file, path.to_string_lossy());
    Ok(())
}

#[tokio::test]
async fn test_json_missing_field() -> Result<()> {
    let fx = Fixture::new().await?;
    let path = fx.write("doc.json", r#"{"title":"x","body":"hello"}"#);

    let hints = LoadHints {
        text_fields: vec!["missing".to_string()],
        ..LoadHints::default()
    };
    let report = fx.pipeline.process_files(&[path], &hints).await;

    assert_eq!(report.failure_count(), 1);
    let err = report.outcomes[0].result.as_ref().unwrap_err();
    assert_eq!(err.to_string(), "No text found in fields: ['missing']");
    assert_eq!(fx.store.stats().await?.total_texts, 0);
    Ok(())
}

#[tokio::test]
async fn test_failures_do_not_abort_batch() -> Result<()> {
    let mut fx = Fixture::new().await?;
    fx.write("blank.txt", "   \n\t");
    fx.write("image.png", "not text");
    fx.write("broken.csv", "text\nok\n  \n");
    fx.write("good.txt", "still ingested");

    let hints = LoadHints {
        text_column: Some("text".to_string()),
        ..LoadHints::default()
    };
    let input = fx.input();
    let summary = fx.pipeline.run(&input, &hints).await?;

    assert_eq!(summary.ingest.success_count(), 1);
    assert_eq!(summary.ingest.failure_count(), 3);
    assert_eq!(summary.exit_code(), 1);

    let kinds: Vec<(String, ErrorKind)> = summary
        .ingest
        .failed()
        .map(|o| {
            (
                o.path.file_name().unwrap().to_string_lossy().to_string(),
                o.error_kind().unwrap(),
            )
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("blank.txt".to_string(), ErrorKind::EmptyContent),
            ("broken.csv".to_string(), ErrorKind::EmptyContent),
            ("image.png".to_string(), ErrorKind::UnsupportedFormat),
        ]
    );

    // The half-valid CSV contributed nothing.
    let stats = fx.store.stats().await?;
    assert_eq!(stats.total_texts, 1);
    assert_eq!(summary.vectorize.processed, 1);
    Ok(())
}

#[tokio::test]
async fn test_audio_and_markup_inputs() -> Result<()> {
    let mut fx = Fixture::new().await?;
    fx.write("call.m4a", "fake audio bytes");
    fx.write("feed.xml", "<feed><title>First</title><title>Second</title></feed>");
    fx.write(
        "page.html",
        "<html><body><h1>Welcome</h1><p>ignored</p></body></html>",
    );

    let hints = LoadHints {
        text_tags: vec!["title".to_string(), "h1".to_string()],
        ..LoadHints::default()
    };
    let input = fx.input();
    let summary = fx.pipeline.run(&input, &hints).await?;

    assert_eq!(summary.ingest.failure_count(), 0);
    assert_eq!(summary.ingest.records_created(), 4);

    let transcript = std::fs::read_to_string(fx.dir.path().join("transcripts/call.txt"))?;
    assert_eq!(transcript, "hello from the recording");
    Ok(())
}

#[tokio::test]
async fn test_pending_records_are_vectorized_once() -> Result<()> {
    let mut fx = Fixture::new().await?;
    for (id, content) in [("t1", "alpha"), ("t2", "beta"), ("t3", "gamma")] {
        fx.store.save_text(id, "seed.txt", content, None).await?;
    }

    let first = fx.pipeline.vectorize_pending().await?;
    assert_eq!(first.status, VectorizeStatus::Completed);
    assert_eq!(first.processed, 3);
    assert_eq!(first.index_size, 3);
    assert_eq!(fx.calls.load(Ordering::SeqCst), 3);
    assert!(fx.store.get_unprocessed_texts().await?.is_empty());

    let second = fx.pipeline.vectorize_pending().await?;
    assert_eq!(second.status, VectorizeStatus::NoOp);
    assert_eq!(fx.calls.load(Ordering::SeqCst), 3);

    // Snapshot and metadata side-file were written once, with all three vectors.
    let snapshot = VectorIndex::load(&fx.dir.path().join("text.index"))?;
    assert_eq!(snapshot.len(), 3);
    let meta: Vec<Option<String>> =
        serde_json::from_slice(&std::fs::read(fx.dir.path().join("text.index.meta.json"))?)?;
    let mut ids: Vec<String> = meta.into_iter().flatten().collect();
    ids.sort();
    assert_eq!(ids, vec!["t1", "t2", "t3"]);
    Ok(())
}

#[tokio::test]
async fn test_failed_record_stays_pending() -> Result<()> {
    let provider = ZeroProvider {
        fail_on: Some("poison"),
        ..ZeroProvider::new(4)
    };
    let mut fx = Fixture::with_provider(provider).await?;
    fx.store.save_text("ok", "a.txt", "fine text", None).await?;
    fx.store.save_text("bad", "b.txt", "poison pill", None).await?;

    let report = fx.pipeline.vectorize_pending().await?;
    assert_eq!(report.processed, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].text_id, "bad");
    assert_eq!(report.index_size, 1);

    let pending = fx.store.get_unprocessed_texts().await?;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, "bad");
    Ok(())
}

#[tokio::test]
async fn test_empty_directory_is_normal() -> Result<()> {
    let mut fx = Fixture::new().await?;
    let input = fx.input();
    let summary = fx.pipeline.run(&input, &LoadHints::default()).await?;

    assert!(summary.ingest.outcomes.is_empty());
    assert_eq!(summary.vectorize.status, VectorizeStatus::NoOp);
    assert_eq!(summary.exit_code(), 0);
    assert_eq!(fx.calls.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn test_missing_input_directory() -> Result<()> {
    let mut fx = Fixture::new().await?;
    let missing = fx.dir.path().join("nope");
    let err = fx
        .pipeline
        .run(&missing, &LoadHints::default())
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::NotFound { .. }));
    Ok(())
}

#[tokio::test]
async fn test_provider_width_mismatch_is_record_failure() -> Result<()> {
    struct Liar;

    #[async_trait]
    impl EmbeddingProvider for Liar {
        async fn embed_texts(&self, texts: &[String]) -> datapipe_embed::Result<EmbeddingResult> {
            Ok(EmbeddingResult::new(
                texts.iter().map(|_| vec![0.0; 2]).collect(),
            ))
        }
        fn embedding_dimension(&self) -> usize {
            4
        }
        fn provider_name(&self) -> &str {
            "liar"
        }
    }

    let dir = tempfile::tempdir()?;
    let store = Arc::new(SqliteTextStore::open_memory().await?);
    store.save_text("t1", "a.txt", "text", None).await?;
    let registry = LoaderRegistry::with_defaults(Arc::new(ScriptedTranscriber("")), None);
    let index = VectorIndexManager::new(Arc::new(Liar), dir.path().join("text.index"));
    let mut pipeline = IngestPipeline::new(store.clone(), registry, index);

    let report = pipeline.vectorize_pending().await?;
    assert_eq!(report.failures.len(), 1);
    assert_eq!(
        report.failures[0].message,
        "Vector dimension mismatch. Expected 4, got 2"
    );
    assert_eq!(report.index_size, 0);
    assert_eq!(store.get_unprocessed_texts().await?.len(), 1);
    Ok(())
}

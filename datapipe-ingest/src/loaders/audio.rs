//! Audio files, turned into a single transcript fragment.

use super::{LoadHints, Loader, extension_of};
use crate::error::{IngestError, Result};
use crate::transcribe::Transcriber;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "mp4", "wav", "m4a"];

pub struct AudioLoader {
    transcriber: Arc<dyn Transcriber>,
    transcripts_dir: Option<PathBuf>,
}

impl AudioLoader {
    /// When `transcripts_dir` is set, every transcript is also written there as
    /// `<stem>.txt`.
    pub fn new(transcriber: Arc<dyn Transcriber>, transcripts_dir: Option<PathBuf>) -> Self {
        Self {
            transcriber,
            transcripts_dir,
        }
    }

    async fn save_transcript(&self, path: &Path, transcript: &str) -> Result<()> {
        let Some(dir) = &self.transcripts_dir else {
            return Ok(());
        };
        let stem = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "transcript".to_string());
        let output = dir.join(format!("{stem}.txt"));
        if tokio::fs::try_exists(&output).await? {
            tracing::warn!(
                "Overwriting transcript {} with the transcript of {}",
                output.display(),
                path.display()
            );
        }
        tokio::fs::write(&output, transcript).await?;
        tracing::info!("Transcript saved to: {}", output.display());
        Ok(())
    }
}

#[async_trait]
impl Loader for AudioLoader {
    fn name(&self) -> &'static str {
        "audio"
    }

    fn extensions(&self) -> &[&'static str] {
        AUDIO_EXTENSIONS
    }

    async fn extract(&self, path: &Path, _hints: &LoadHints) -> Result<Vec<String>> {
        if !tokio::fs::try_exists(path).await? {
            return Err(IngestError::NotFound {
                path: path.to_path_buf(),
            });
        }
        if !AUDIO_EXTENSIONS.contains(&extension_of(path).as_str()) {
            return Err(IngestError::UnsupportedFormat(
                "Unsupported audio format".to_string(),
            ));
        }

        tracing::info!("Transcribing: {}", path.display());
        let transcript = self.transcriber.transcribe(path).await?;
        if transcript.trim().is_empty() {
            tracing::warn!("No speech detected in {}", path.display());
            return Err(IngestError::EmptyContent(
                "No speech detected in audio".to_string(),
            ));
        }

        self.save_transcript(path, &transcript).await?;
        Ok(vec![transcript])
    }
}

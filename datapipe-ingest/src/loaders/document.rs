//! Plain text and PDF documents, each file yielding a single fragment.

use super::{LoadHints, Loader, extension_of};
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use std::path::Path;

pub struct DocumentLoader;

impl DocumentLoader {
    pub fn new() -> Self {
        Self
    }

    async fn load_txt(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        let text = String::from_utf8(bytes).map_err(|e| IngestError::parse("text", e))?;
        if text.trim().is_empty() {
            return Err(IngestError::EmptyContent("Empty text file".to_string()));
        }
        Ok(text)
    }

    async fn load_pdf(&self, path: &Path) -> Result<String> {
        let bytes = tokio::fs::read(path).await?;
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await?
            .map_err(|e| IngestError::parse("PDF", e))?;
        if text.trim().is_empty() {
            return Err(IngestError::EmptyContent(
                "No text content found in PDF".to_string(),
            ));
        }
        Ok(text)
    }
}

impl Default for DocumentLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Loader for DocumentLoader {
    fn name(&self) -> &'static str {
        "document"
    }

    fn extensions(&self) -> &[&'static str] {
        &["txt", "pdf"]
    }

    async fn extract(&self, path: &Path, _hints: &LoadHints) -> Result<Vec<String>> {
        tracing::debug!("Extracting document: {}", path.display());
        let text = match extension_of(path).as_str() {
            "txt" => self.load_txt(path).await?,
            "pdf" => self.load_pdf(path).await?,
            other => {
                return Err(IngestError::UnsupportedFormat(format!(
                    "Unsupported document format: .{other}"
                )));
            }
        };
        Ok(vec![text])
    }
}

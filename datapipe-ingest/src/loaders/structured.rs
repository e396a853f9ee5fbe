//! Tabular files: CSV through the `csv` crate, spreadsheets through `calamine`.
//!
//! The first row is the header. Every data row contributes the cell of the
//! hinted column as one fragment. A blank cell fails the whole file so that a
//! spreadsheet is either ingested completely or not at all.

use super::{LoadHints, Loader, extension_of};
use crate::error::{IngestError, Result};
use async_trait::async_trait;
use calamine::{Reader, open_workbook_auto};
use std::path::{Path, PathBuf};

pub struct StructuredLoader;

impl StructuredLoader {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StructuredLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Loader for StructuredLoader {
    fn name(&self) -> &'static str {
        "structured"
    }

    fn extensions(&self) -> &[&'static str] {
        &["csv", "xlsx", "xls"]
    }

    async fn extract(&self, path: &Path, hints: &LoadHints) -> Result<Vec<String>> {
        let ext = extension_of(path);
        let label = if ext == "csv" { "CSV" } else { "Excel" };
        let column = hints
            .text_column
            .clone()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| {
                IngestError::SchemaMismatch(format!("A text column is required for {label} files"))
            })?;

        if !tokio::fs::try_exists(path).await? {
            return Err(IngestError::NotFound {
                path: path.to_path_buf(),
            });
        }

        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || match ext.as_str() {
            "csv" => read_csv(&path, &column),
            _ => read_workbook(&path, &column),
        })
        .await?
    }
}

fn read_csv(path: &Path, column: &str) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(|e| IngestError::parse("CSV", e))?;

    let headers = reader
        .headers()
        .map_err(|e| IngestError::parse("CSV", e))?
        .clone();
    let index = headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| column_not_found(column, "CSV"))?;

    let mut fragments = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| IngestError::parse("CSV", e))?;
        let value = record.get(index).unwrap_or_default();
        fragments.push(non_blank(value, column, row + 1)?);
    }

    tracing::debug!("Read {} rows from {}", fragments.len(), path.display());
    Ok(fragments)
}

fn read_workbook(path: &Path, column: &str) -> Result<Vec<String>> {
    let mut workbook = open_workbook_auto(path).map_err(|e| IngestError::parse("Excel", e))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| IngestError::EmptyContent("Workbook has no worksheets".to_string()))?
        .map_err(|e| IngestError::parse("Excel", e))?;

    let mut rows = range.rows();
    let header = rows.next().ok_or_else(|| column_not_found(column, "Excel"))?;
    let index = header
        .iter()
        .position(|cell| cell.to_string() == column)
        .ok_or_else(|| column_not_found(column, "Excel"))?;

    let mut fragments = Vec::new();
    for (row, cells) in rows.enumerate() {
        let value = cells.get(index).map(|c| c.to_string()).unwrap_or_default();
        fragments.push(non_blank(&value, column, row + 1)?);
    }

    tracing::debug!("Read {} rows from {}", fragments.len(), path.display());
    Ok(fragments)
}

fn column_not_found(column: &str, label: &str) -> IngestError {
    IngestError::SchemaMismatch(format!("Column {column} not found in {label} file"))
}

fn non_blank(value: &str, column: &str, row: usize) -> Result<String> {
    if value.trim().is_empty() {
        return Err(IngestError::EmptyContent(format!(
            "Empty value in column {column} at row {row}"
        )));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn hints(column: &str) -> LoadHints {
        LoadHints {
            text_column: Some(column.to_string()),
            ..LoadHints::default()
        }
    }

    fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_csv_one_fragment_per_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "rows.csv", "id,text\n1,a\n2,b\n");

        let fragments = StructuredLoader::new()
            .extract(&path, &hints("text"))
            .await
            .unwrap();
        assert_eq!(fragments, vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_csv_quoted_multiline_cell() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "quoted.csv", "text\n\"hello, \"\"world\"\"\nagain\"\n");

        let fragments = StructuredLoader::new()
            .extract(&path, &hints("text"))
            .await
            .unwrap();
        assert_eq!(fragments, vec!["hello, \"world\"\nagain".to_string()]);
    }

    #[tokio::test]
    async fn test_csv_missing_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "rows.csv", "id,body\n1,a\n");

        let err = StructuredLoader::new()
            .extract(&path, &hints("text"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
        assert_eq!(err.to_string(), "Column text not found in CSV file");
    }

    #[tokio::test]
    async fn test_csv_blank_cell_names_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "rows.csv", "id,text\n1,a\n2,  \n");

        let err = StructuredLoader::new()
            .extract(&path, &hints("text"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyContent);
        assert!(err.to_string().contains("row 2"));
    }

    #[tokio::test]
    async fn test_column_hint_required() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "rows.csv", "text\na\n");

        let err = StructuredLoader::new()
            .extract(&path, &LoadHints::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    }

    #[tokio::test]
    async fn test_broken_workbook() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "sheet.xlsx", "this is not a zip archive");

        let err = StructuredLoader::new()
            .extract(&path, &hints("text"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Parse { format: "Excel", .. }));
    }

    #[tokio::test]
    async fn test_missing_file() {
        let err = StructuredLoader::new()
            .extract(Path::new("/nowhere/rows.csv"), &hints("text"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}

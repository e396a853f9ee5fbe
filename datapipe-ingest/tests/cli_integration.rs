//! Runs the `datapipe` binary and checks its exit codes and reports
//!
//! Every run uses the offline hashing embedder and a throwaway data directory,
//! so no model download or transcription server is needed.

use anyhow::Result;
use std::process::{Command, Output};
use tempfile::TempDir;

/// Run the CLI inside `temp_dir` with its data directory under `temp_dir/data`.
fn run_cli(temp_dir: &TempDir, args: &[&str]) -> Result<Output> {
    let output = Command::new(env!("CARGO_BIN_EXE_datapipe"))
        .current_dir(temp_dir.path())
        .args(args)
        .env("DATAPIPE_DATA_DIR", temp_dir.path().join("data"))
        .env("DATAPIPE_EMBEDDING_PROVIDER", "hashing")
        .env("DATAPIPE_EMBEDDING_DIMENSION", "256")
        .env("DATAPIPE_SHOW_PROGRESS", "false")
        .env("RUST_LOG", "error")
        .output()?;
    Ok(output)
}

fn input_dir(temp_dir: &TempDir, files: &[(&str, &str)]) -> Result<String> {
    let input = temp_dir.path().join("input");
    std::fs::create_dir_all(&input)?;
    for (name, contents) in files {
        std::fs::write(input.join(name), contents)?;
    }
    Ok(input.to_string_lossy().to_string())
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn test_clean_ingest_exits_zero() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let input = input_dir(&temp_dir, &[("greeting.txt", "Bonjour le monde")])?;

    let output = run_cli(&temp_dir, &["ingest", "--input-dir", &input])?;
    assert_eq!(
        output.status.code(),
        Some(0),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let out = stdout(&output);
    assert!(out.contains("Processed 1 files successfully"));
    assert!(out.contains("Records created: 1"));
    assert!(temp_dir.path().join("data/vectors/text.index").exists());

    let output = run_cli(&temp_dir, &["stats"])?;
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("Total texts: 1"));
    Ok(())
}

#[test]
fn test_unsupported_file_exits_one() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let input = input_dir(
        &temp_dir,
        &[("notes.txt", "still ingested"), ("photo.png", "not text")],
    )?;

    let output = run_cli(&temp_dir, &["ingest", "--input-dir", &input])?;
    assert_eq!(output.status.code(), Some(1));
    let out = stdout(&output);
    assert!(out.contains("Failed to process 1 files"));
    assert!(out.contains("Unsupported file type: .png"));
    assert!(out.contains("Records created: 1"));
    Ok(())
}

#[test]
fn test_empty_directory_exits_zero() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let input = input_dir(&temp_dir, &[])?;

    let output = run_cli(&temp_dir, &["ingest", "--input-dir", &input])?;
    assert_eq!(output.status.code(), Some(0));
    assert!(stdout(&output).contains("Processed 0 files successfully"));
    Ok(())
}

#[test]
fn test_missing_input_dir_exits_two() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let missing = temp_dir.path().join("nowhere");

    let output = run_cli(
        &temp_dir,
        &["ingest", "--input-dir", &missing.to_string_lossy()],
    )?;
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("does not exist"));
    Ok(())
}

#[test]
fn test_malformed_config_exits_two() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let input = input_dir(&temp_dir, &[("greeting.txt", "hello")])?;
    let config = temp_dir.path().join("broken.toml");
    std::fs::write(&config, "data_dir = [unclosed")?;

    let output = run_cli(
        &temp_dir,
        &[
            "--config",
            &config.to_string_lossy(),
            "ingest",
            "--input-dir",
            &input,
        ],
    )?;
    assert_eq!(output.status.code(), Some(2));
    Ok(())
}

#[test]
fn test_search_json_output() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let input = input_dir(
        &temp_dir,
        &[
            ("cats.txt", "cats purr on warm windowsills"),
            ("dogs.txt", "dogs bark at passing trucks"),
        ],
    )?;
    let output = run_cli(&temp_dir, &["ingest", "--input-dir", &input])?;
    assert_eq!(output.status.code(), Some(0));

    let output = run_cli(
        &temp_dir,
        &["search", "dogs bark", "-k", "1", "--format", "json"],
    )?;
    assert_eq!(output.status.code(), Some(0));
    let results: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    let results = results.as_array().expect("search output is a JSON array");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["rank"], 1);
    assert!(
        results[0]["source_file"]
            .as_str()
            .is_some_and(|s| s.ends_with("dogs.txt"))
    );
    Ok(())
}

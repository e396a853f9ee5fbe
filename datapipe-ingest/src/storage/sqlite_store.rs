//! SQLite-backed [`TextStore`].
//!
//! ```sql
//! CREATE TABLE text_data (
//!     id TEXT PRIMARY KEY,              -- uuid v4
//!     source_file TEXT NOT NULL,
//!     content TEXT NOT NULL,
//!     processed_content TEXT,           -- NULL while pending
//!     created_at TIMESTAMP NOT NULL,
//!     updated_at TIMESTAMP NOT NULL
//! );
//!
//! CREATE TABLE embeddings (
//!     id TEXT PRIMARY KEY,
//!     text_id TEXT NOT NULL REFERENCES text_data(id),
//!     vector_path TEXT NOT NULL,
//!     created_at TIMESTAMP NOT NULL
//! );
//! ```

use super::{EmbeddingRef, NewText, StoreStats, TextRecord, TextStore};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct SqliteTextStore {
    pool: SqlitePool,
}

impl SqliteTextStore {
    /// Open (or create) the database file and make sure the schema exists.
    pub async fn open(db_path: &Path, busy_timeout: Duration) -> Result<Self> {
        let pool = SqlitePool::connect_with(
            SqliteConnectOptions::new()
                .filename(db_path)
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .busy_timeout(busy_timeout)
                .foreign_keys(true)
                .create_if_missing(true),
        )
        .await?;
        Self::new_with_pool(pool).await
    }

    /// In-memory store for tests.
    pub async fn open_memory() -> Result<Self> {
        // Every connection to :memory: is a separate database, so keep exactly one alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(
                SqliteConnectOptions::new()
                    .in_memory(true)
                    .foreign_keys(true),
            )
            .await?;
        Self::new_with_pool(pool).await
    }

    async fn new_with_pool(pool: SqlitePool) -> Result<Self> {
        Self::create_tables(&pool).await?;
        Ok(Self { pool })
    }

    async fn create_tables(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS text_data (
                id TEXT PRIMARY KEY,
                source_file TEXT NOT NULL,
                content TEXT NOT NULL,
                processed_content TEXT,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS embeddings (
                id TEXT PRIMARY KEY,
                text_id TEXT NOT NULL,
                vector_path TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL,
                FOREIGN KEY (text_id) REFERENCES text_data(id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_text_data_pending ON text_data(processed_content) WHERE processed_content IS NULL")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_embeddings_text_id ON embeddings(text_id)")
            .execute(pool)
            .await?;

        Ok(())
    }

    /// Release the pool, flushing the WAL.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn record_from_row(row: &SqliteRow) -> TextRecord {
        TextRecord {
            id: row.get("id"),
            source_file: row.get("source_file"),
            content: row.get("content"),
            processed_content: row.get("processed_content"),
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
            updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
        }
    }
}

#[async_trait]
impl TextStore for SqliteTextStore {
    async fn save_text(
        &self,
        id: &str,
        source_file: &str,
        content: &str,
        processed_content: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO text_data (id, source_file, content, processed_content, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?5)
            "#,
        )
        .bind(id)
        .bind(source_file)
        .bind(content)
        .bind(processed_content)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_texts(&self, texts: &[NewText]) -> Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for text in texts {
            sqlx::query(
                r#"
                INSERT INTO text_data (id, source_file, content, processed_content, created_at, updated_at)
                VALUES (?1, ?2, ?3, NULL, ?4, ?4)
                "#,
            )
            .bind(&text.id)
            .bind(&text.source_file)
            .bind(&text.content)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!("Saved {} text records", texts.len());
        Ok(())
    }

    async fn set_processed_content(&self, id: &str, processed: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE text_data SET processed_content = ?1, updated_at = ?2
            WHERE id = ?3 AND processed_content IS NULL
            "#,
        )
        .bind(processed)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn get_unprocessed_texts(&self) -> Result<Vec<TextRecord>> {
        let rows = sqlx::query(
            "SELECT id, source_file, content, processed_content, created_at, updated_at
             FROM text_data WHERE processed_content IS NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(Self::record_from_row).collect())
    }

    async fn get_text(&self, id: &str) -> Result<Option<TextRecord>> {
        let row = sqlx::query(
            "SELECT id, source_file, content, processed_content, created_at, updated_at
             FROM text_data WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::record_from_row))
    }

    async fn save_embedding(&self, id: &str, text_id: &str, vector_path: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO embeddings (id, text_id, vector_path, created_at) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(id)
        .bind(text_id)
        .bind(vector_path)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_embeddings(&self, text_id: &str) -> Result<Vec<EmbeddingRef>> {
        let rows = sqlx::query(
            "SELECT id, text_id, vector_path, created_at FROM embeddings WHERE text_id = ?1",
        )
        .bind(text_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| EmbeddingRef {
                id: row.get("id"),
                text_id: row.get("text_id"),
                vector_path: row.get("vector_path"),
                created_at: row.get::<DateTime<Utc>, _>("created_at"),
            })
            .collect())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM text_data) AS total_texts,
                (SELECT COUNT(*) FROM text_data WHERE processed_content IS NULL) AS pending_texts,
                (SELECT COUNT(*) FROM embeddings) AS embeddings,
                (SELECT COUNT(DISTINCT source_file) FROM text_data) AS source_files
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreStats {
            total_texts: row.get::<i64, _>("total_texts") as usize,
            pending_texts: row.get::<i64, _>("pending_texts") as usize,
            embeddings: row.get::<i64, _>("embeddings") as usize,
            source_files: row.get::<i64, _>("source_files") as usize,
        })
    }
}

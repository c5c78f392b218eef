//! Post history
//!
//! After a publish the finished result set is handed to a [`PostHistory`].
//! The SQLite store keeps one row per post and one row per destination
//! result, in result order.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::path::Path;

use crate::error::{HistoryError, Result};
use crate::types::{AggregateOutcome, PlatformPostResult, Post};

/// Sink for finished publishes
#[async_trait]
pub trait PostHistory: Send + Sync {
    async fn record(
        &self,
        post: &Post,
        results: &[PlatformPostResult],
        outcome: AggregateOutcome,
    ) -> Result<()>;
}

/// A stored post with its destination results
#[derive(Debug, Clone, serde::Serialize)]
pub struct HistoryEntry {
    pub post_id: String,
    pub title: Option<String>,
    pub message: String,
    pub outcome: String,
    pub published_at: i64,
    pub results: Vec<RecordedResult>,
}

/// One stored destination result
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RecordedResult {
    pub platform: String,
    pub instance: Option<String>,
    pub handle: Option<String>,
    pub status: String,
    pub message: String,
    pub post_url: Option<String>,
    pub external_post_id: Option<String>,
}

#[derive(Clone)]
pub struct SqliteHistory {
    pool: SqlitePool,
}

impl SqliteHistory {
    /// Open (or create) the history database and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(HistoryError::IoError)?;
        }

        // mode=rwc creates the file on first use
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(HistoryError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(HistoryError::MigrationError)?;

        Ok(Self { pool })
    }

    /// Most recently published posts first
    pub async fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, message, outcome, published_at
            FROM posts
            ORDER BY published_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(HistoryError::SqlxError)?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let post_id: String = row.get("id");
            let results = self.results_for(&post_id).await?;
            entries.push(HistoryEntry {
                post_id,
                title: row.get("title"),
                message: row.get("message"),
                outcome: row.get("outcome"),
                published_at: row.get("published_at"),
                results,
            });
        }

        Ok(entries)
    }

    /// Stored results of one post, in their original order
    pub async fn results_for(&self, post_id: &str) -> Result<Vec<RecordedResult>> {
        let rows = sqlx::query(
            r#"
            SELECT platform, instance, handle, status, message, post_url, external_post_id
            FROM platform_posts
            WHERE post_id = ?
            ORDER BY position
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(HistoryError::SqlxError)?;

        Ok(rows
            .into_iter()
            .map(|r| RecordedResult {
                platform: r.get("platform"),
                instance: r.get("instance"),
                handle: r.get("handle"),
                status: r.get("status"),
                message: r.get("message"),
                post_url: r.get("post_url"),
                external_post_id: r.get("external_post_id"),
            })
            .collect())
    }
}

#[async_trait]
impl PostHistory for SqliteHistory {
    async fn record(
        &self,
        post: &Post,
        results: &[PlatformPostResult],
        outcome: AggregateOutcome,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(HistoryError::SqlxError)?;

        sqlx::query(
            r#"
            INSERT INTO posts (id, title, message, image_count, nsfw, link_url, created_at, published_at, outcome)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.title)
        .bind(&post.message)
        .bind(post.images.len() as i64)
        .bind(post.nsfw)
        .bind(&post.link_url)
        .bind(post.created_at)
        .bind(chrono::Utc::now().timestamp())
        .bind(outcome.as_str())
        .execute(&mut *tx)
        .await
        .map_err(HistoryError::SqlxError)?;

        for (position, result) in results.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO platform_posts
                    (post_id, position, platform, instance, handle, status, message, post_url, external_post_id)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&post.id)
            .bind(position as i64)
            .bind(result.platform())
            .bind(result.instance())
            .bind(result.handle())
            .bind(result.status().to_string())
            .bind(result.message())
            .bind(result.post_url())
            .bind(result.external_post_id())
            .execute(&mut *tx)
            .await
            .map_err(HistoryError::SqlxError)?;
        }

        tx.commit().await.map_err(HistoryError::SqlxError)?;
        Ok(())
    }
}

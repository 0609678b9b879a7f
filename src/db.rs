//! Download history persistence.
//! Works with raw SQL and primitive types only.

use chrono::Utc;
use sqlx::{Row, SqlitePool};

use crate::errors::BotResult;

/// Aggregated per-user numbers for /stats
#[derive(Debug, Clone, PartialEq)]
pub struct UserStats {
    pub total_downloads: i64,
    pub completed: i64,
    pub failed: i64,
    pub total_bytes: i64,
    /// Unix timestamp of the first /start
    pub member_since: Option<i64>,
}

#[derive(Clone)]
pub struct HistoryDb {
    pool: SqlitePool,
}

impl HistoryDb {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert_user(&self, chat_id: i64, username: Option<&str>) -> BotResult<()> {
        let now = Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO users (chat_id, username, first_seen, last_activity)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(chat_id) DO UPDATE SET
                username = excluded.username,
                last_activity = excluded.last_activity
            "#,
        )
        .bind(chat_id)
        .bind(username)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Record a terminal download outcome (`completed` or `failed`).
    pub async fn record_completion(
        &self,
        chat_id: i64,
        url: &str,
        title: &str,
        kind: &str,
        quality: Option<&str>,
        file_size: Option<i64>,
        status: &str,
    ) -> BotResult<()> {
        let now = Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO downloads (chat_id, url, title, kind, quality, file_size, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(chat_id)
        .bind(url)
        .bind(title)
        .bind(kind)
        .bind(quality)
        .bind(file_size)
        .bind(status)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn user_stats(&self, chat_id: i64) -> BotResult<UserStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(status = 'completed'), 0) AS completed,
                COALESCE(SUM(status = 'failed'), 0) AS failed,
                COALESCE(SUM(CASE WHEN status = 'completed' THEN file_size ELSE 0 END), 0) AS total_bytes
            FROM downloads WHERE chat_id = ?
            "#,
        )
        .bind(chat_id)
        .fetch_one(&self.pool)
        .await?;

        let member_since =
            sqlx::query_scalar::<_, Option<i64>>("SELECT first_seen FROM users WHERE chat_id = ?")
                .bind(chat_id)
                .fetch_optional(&self.pool)
                .await?
                .flatten();

        Ok(UserStats {
            total_downloads: row.get("total"),
            completed: row.get("completed"),
            failed: row.get("failed"),
            total_bytes: row.get("total_bytes"),
            member_since,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::run_migrations;

    async fn test_db() -> HistoryDb {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        HistoryDb::new(pool)
    }

    #[tokio::test]
    async fn upsert_user_is_idempotent() {
        let db = test_db().await;
        db.upsert_user(1, Some("alice")).await.unwrap();
        db.upsert_user(1, Some("alice_renamed")).await.unwrap();

        let stats = db.user_stats(1).await.unwrap();
        assert!(stats.member_since.is_some());
    }

    #[tokio::test]
    async fn stats_aggregate_outcomes() {
        let db = test_db().await;
        db.upsert_user(1, None).await.unwrap();
        db.record_completion(1, "u1", "t1", "media", Some("720p"), Some(1000), "completed")
            .await
            .unwrap();
        db.record_completion(1, "u2", "t2", "subtitle", None, Some(50), "completed")
            .await
            .unwrap();
        db.record_completion(1, "u3", "t3", "media", Some("480p"), None, "failed")
            .await
            .unwrap();
        // Another user's rows must not leak in
        db.record_completion(2, "u4", "t4", "media", None, Some(9999), "completed")
            .await
            .unwrap();

        let stats = db.user_stats(1).await.unwrap();
        assert_eq!(stats.total_downloads, 3);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.total_bytes, 1050);
    }

    #[tokio::test]
    async fn stats_for_unknown_user_are_empty() {
        let db = test_db().await;
        let stats = db.user_stats(42).await.unwrap();
        assert_eq!(stats.total_downloads, 0);
        assert_eq!(stats.member_since, None);
    }
}

//! Question history persisted in SQLite

use crate::error::{JournalError, Result};
use crate::history::HistoryStore;
use crate::types::HistoryItem;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Persistent `HistoryStore`; rows are ordered by insertion sequence
pub struct SqliteHistoryStore {
    pool: SqlitePool,
    limit: AtomicUsize,
}

impl std::fmt::Debug for SqliteHistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteHistoryStore")
            .field("pool", &"<SqlitePool>")
            .field("limit", &self.limit.load(Ordering::Relaxed))
            .finish()
    }
}

impl SqliteHistoryStore {
    /// Open (or create) `history.db` inside `data_dir`
    pub async fn open(data_dir: impl AsRef<Path>, limit: usize) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;

        let options = SqliteConnectOptions::new()
            .filename(data_dir.join("history.db"))
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options).await?;
        Self::with_pool(pool, limit).await
    }

    /// Wrap an existing pool, running migrations first
    pub async fn with_pool(pool: SqlitePool, limit: usize) -> Result<Self> {
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| JournalError::Migration(e.to_string()))?;

        let store = Self {
            pool,
            limit: AtomicUsize::new(limit.max(1)),
        };
        store.prune().await?;
        Ok(store)
    }

    /// Get a reference to the SQLite pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Delete everything but the newest `limit` rows
    async fn prune(&self) -> Result<u64> {
        let limit = self.limit.load(Ordering::SeqCst) as i64;
        let result = sqlx::query(
            r#"
            DELETE FROM question_history
            WHERE seq NOT IN (
                SELECT seq FROM question_history ORDER BY seq DESC LIMIT ?
            )
            "#,
        )
        .bind(limit)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() > 0 {
            tracing::debug!("Pruned {} history rows", result.rows_affected());
        }
        Ok(result.rows_affected())
    }
}

fn embedding_json(item: &HistoryItem) -> Option<String> {
    item.embedding
        .as_ref()
        .and_then(|e| serde_json::to_string(e).ok())
}

const INSERT_SQL: &str = r#"
    INSERT INTO question_history (id, text, embedding, theme, opening_word, prompt, created_at)
    VALUES (?, ?, ?, ?, ?, ?, ?)
"#;

#[async_trait]
impl HistoryStore for SqliteHistoryStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn limit(&self) -> usize {
        self.limit.load(Ordering::SeqCst)
    }

    async fn set_limit(&self, limit: usize) -> Result<()> {
        self.limit.store(limit.max(1), Ordering::SeqCst);
        self.prune().await?;
        Ok(())
    }

    async fn seed(&self, items: Vec<HistoryItem>) -> Result<()> {
        let limit = self.limit.load(Ordering::SeqCst);
        let skip = items.len().saturating_sub(limit);

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM question_history")
            .execute(&mut *tx)
            .await?;

        for item in items.iter().skip(skip) {
            sqlx::query(INSERT_SQL)
                .bind(&item.id)
                .bind(&item.text)
                .bind(embedding_json(item))
                .bind(&item.theme)
                .bind(&item.opening_word)
                .bind(&item.prompt)
                .bind(item.created_at)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn add(&self, item: HistoryItem) -> Result<()> {
        sqlx::query(INSERT_SQL)
            .bind(&item.id)
            .bind(&item.text)
            .bind(embedding_json(&item))
            .bind(&item.theme)
            .bind(&item.opening_word)
            .bind(&item.prompt)
            .bind(item.created_at)
            .execute(&self.pool)
            .await?;

        self.prune().await?;
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<HistoryItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, text, embedding, theme, opening_word, prompt, created_at
            FROM question_history
            ORDER BY seq ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_item).collect())
    }

    async fn len(&self) -> Result<usize> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM question_history")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as usize)
    }
}

fn row_to_item(row: &SqliteRow) -> HistoryItem {
    let embedding_json: Option<String> = row.try_get("embedding").ok().flatten();
    let embedding = embedding_json.and_then(|s| serde_json::from_str::<Vec<f32>>(&s).ok());

    HistoryItem {
        id: row.try_get("id").unwrap_or_default(),
        text: row.try_get("text").unwrap_or_default(),
        embedding,
        theme: row.try_get("theme").unwrap_or_default(),
        opening_word: row.try_get("opening_word").unwrap_or_default(),
        prompt: row.try_get("prompt").unwrap_or_default(),
        created_at: row
            .try_get("created_at")
            .unwrap_or_else(|_| chrono::Utc::now()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_store(dir: &tempfile::TempDir, limit: usize) -> SqliteHistoryStore {
        SqliteHistoryStore::open(dir.path(), limit).await.unwrap()
    }

    #[tokio::test]
    async fn test_add_and_evict() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, 3).await;

        for i in 0..5 {
            store.add(HistoryItem::new(format!("q{i}"))).await.unwrap();
        }

        let all = store.get_all().await.unwrap();
        let texts: Vec<_> = all.iter().map(|i| i.text.as_str()).collect();
        assert_eq!(texts, vec!["q2", "q3", "q4"]);
        assert_eq!(store.len().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_round_trips_fields() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, 10).await;

        let item = HistoryItem::new("Why does fear linger?")
            .with_theme("fear")
            .with_opening_word("Why")
            .with_prompt("Theme: fear | Start with: Why")
            .with_embedding(vec![0.5, 0.25]);
        store.add(item.clone()).await.unwrap();

        let loaded = store.get_all().await.unwrap().pop().unwrap();
        assert_eq!(loaded.id, item.id);
        assert_eq!(loaded.theme, "fear");
        assert_eq!(loaded.opening_word, "Why");
        assert_eq!(loaded.embedding, Some(vec![0.5, 0.25]));
        assert!((loaded.created_at - item.created_at).num_milliseconds().abs() < 1);
    }

    #[tokio::test]
    async fn test_seed_and_set_limit() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(&dir, 2).await;
        store.add(HistoryItem::new("stale")).await.unwrap();

        store
            .seed(vec![
                HistoryItem::new("a"),
                HistoryItem::new("b"),
                HistoryItem::new("c"),
            ])
            .await
            .unwrap();
        let texts: Vec<_> = store
            .get_all()
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.text)
            .collect();
        assert_eq!(texts, vec!["b", "c"]);

        store.set_limit(1).await.unwrap();
        let remaining = store.get_all().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].text, "c");
    }

    #[tokio::test]
    async fn test_history_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_store(&dir, 5).await;
            store.add(HistoryItem::new("persisted")).await.unwrap();
            store.pool().close().await;
        }

        let reopened = open_store(&dir, 5).await;
        assert_eq!(reopened.get_all().await.unwrap()[0].text, "persisted");
    }
}

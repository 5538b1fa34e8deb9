//! Append-only fragment store.
//!
//! Wraps a [`SqlitePool`] and exposes exactly four operations: insert,
//! list, search, and fetch-by-ids. There is no update or delete entry
//! point anywhere on this type; combined with the guard triggers created
//! by [`crate::migrate`], append-only holds structurally rather than by
//! caller discipline.

use sqlx::{Row, SqlitePool};

use crate::models::{Fragment, NewFragment, SourceType};

/// Store error taxonomy: validation is rejected before any write;
/// storage failures are fatal for that insert and propagate.
#[derive(Debug)]
pub enum StoreError {
    Validation(String),
    Storage(sqlx::Error),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Validation(msg) => write!(f, "validation failed: {}", msg),
            StoreError::Storage(e) => write!(f, "storage failure: {}", e),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Validation(_) => None,
            StoreError::Storage(e) => Some(e),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Storage(e)
    }
}

#[derive(Clone)]
pub struct FragmentStore {
    pool: SqlitePool,
}

impl FragmentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Append one fragment and return its assigned id. Each insert is
    /// independently atomic; concurrent ingestion calls never require a
    /// cross-row transaction.
    pub async fn insert(&self, fragment: NewFragment<'_>) -> Result<i64, StoreError> {
        if fragment.content.trim().is_empty() {
            return Err(StoreError::Validation(
                "fragment content must not be empty".to_string(),
            ));
        }

        let now = chrono::Utc::now().timestamp();
        let result = sqlx::query(
            r#"
            INSERT INTO fragments (content, created_at, source, source_type, source_page, ingestion_batch_id)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(fragment.content)
        .bind(now)
        .bind(fragment.source)
        .bind(fragment.source_type.map(|t| t.as_str()))
        .bind(fragment.source_page)
        .bind(fragment.ingestion_batch_id)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Most recent first, strictly by id descending.
    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Fragment>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, content, created_at, source, source_type, source_page, ingestion_batch_id
            FROM fragments
            ORDER BY id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_fragment).collect())
    }

    /// Literal substring containment on content only. SQLite LIKE semantics
    /// (ASCII case-insensitive); wildcard characters in the query are
    /// escaped so they match themselves.
    pub async fn search(
        &self,
        query: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Fragment>, StoreError> {
        let escaped = query
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        let pattern = format!("%{}%", escaped);

        let rows = sqlx::query(
            r#"
            SELECT id, content, created_at, source, source_type, source_page, ingestion_batch_id
            FROM fragments
            WHERE content LIKE ? ESCAPE '\'
            ORDER BY id DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(&pattern)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_fragment).collect())
    }

    /// Fetch exactly the given ids, ascending, silently omitting ids that
    /// do not exist. An empty input returns empty without touching storage.
    pub async fn get_by_ids(&self, ids: &[i64]) -> Result<Vec<Fragment>, StoreError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let sql = format!(
            "SELECT id, content, created_at, source, source_type, source_page, ingestion_batch_id \
             FROM fragments WHERE id IN ({}) ORDER BY id ASC",
            placeholders
        );

        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(id);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_fragment).collect())
    }

    pub async fn count(&self) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fragments")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn row_to_fragment(row: &sqlx::sqlite::SqliteRow) -> Fragment {
    let source_type: Option<String> = row.get("source_type");
    Fragment {
        id: row.get("id"),
        content: row.get("content"),
        created_at: row.get("created_at"),
        source: row.get("source"),
        source_type: source_type.as_deref().and_then(SourceType::parse),
        source_page: row.get("source_page"),
        ingestion_batch_id: row.get("ingestion_batch_id"),
    }
}

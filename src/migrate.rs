use anyhow::Result;

use crate::config::Config;
use crate::db;

/// Create the fragment table and its append-only guard triggers.
///
/// The schema is exactly one entity type. No concept, cluster, or hierarchy
/// table may ever be added here; similarity signals live in a standalone
/// log artifact, not in the database.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // AUTOINCREMENT keeps ids strictly increasing and never reused,
    // even after a rollback.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fragments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            content TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            source TEXT,
            source_type TEXT,
            source_page INTEGER,
            ingestion_batch_id TEXT
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Append-only is enforced structurally: the store exposes no update or
    // delete operation, and these triggers abort any path that bypasses it.
    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS fragments_no_update
        BEFORE UPDATE ON fragments
        BEGIN
            SELECT RAISE(ABORT, 'fragments are append-only');
        END
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TRIGGER IF NOT EXISTS fragments_no_delete
        BEFORE DELETE ON fragments
        BEGIN
            SELECT RAISE(ABORT, 'fragments are append-only');
        END
        "#,
    )
    .execute(&pool)
    .await?;

    pool.close().await;
    Ok(())
}

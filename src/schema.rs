//! Local store schema for `signal-mapper`.
//!
//! The client keeps its durable state in a small key-value table, one row
//! per well-known key. Applied once on startup from `main.rs`.

use anyhow::Result;
use sqlx::SqlitePool;

// ---

/// Create the key-value table if it does not exist (idempotent).
///
/// Errors are propagated if any SQL execution fails.
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    // ---
    let mut tx = pool.begin().await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS local_storage (
            key         TEXT PRIMARY KEY NOT NULL,
            value       TEXT NOT NULL,
            updated_at  INTEGER NOT NULL
        );
        "#,
    )
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(())
}

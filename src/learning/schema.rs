//! Database schema for the learning store
//!
//! One append-only table holds the full attempt log. Indexes cover the two
//! read paths: bucket scans (content type + context + accept flag) for the
//! sweet-spot analyzer, and per-item history.

use crate::error::{CalliopeError, Result};

/// Initialize the generation_attempts table and its indexes
///
/// Runs on the store's own connection so in-memory databases keep a single
/// coherent instance. Safe to call repeatedly (IF NOT EXISTS).
pub async fn init_attempts_table(conn: &libsql::Connection) -> Result<()> {
    conn.execute(
        r#"
        CREATE TABLE IF NOT EXISTS generation_attempts (
            id TEXT PRIMARY KEY,
            item_id TEXT NOT NULL,
            content_type TEXT NOT NULL,
            context_key TEXT NOT NULL,
            attempt_index INTEGER NOT NULL,
            parameters TEXT NOT NULL,
            generated_text TEXT NOT NULL,
            complete INTEGER NOT NULL DEFAULT 0,
            evaluations TEXT NOT NULL,
            diagnostics TEXT NOT NULL,
            composite_score REAL,
            effective_threshold REAL NOT NULL,
            accepted INTEGER NOT NULL DEFAULT 0,
            rejection TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
        libsql::params![],
    )
    .await
    .map_err(|e| {
        CalliopeError::Database(format!("Failed to create generation_attempts table: {}", e))
    })?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attempts_bucket \
         ON generation_attempts(content_type, context_key, accepted)",
        libsql::params![],
    )
    .await
    .map_err(|e| CalliopeError::Database(format!("Failed to create index: {}", e)))?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_attempts_item ON generation_attempts(item_id)",
        libsql::params![],
    )
    .await
    .map_err(|e| CalliopeError::Database(format!("Failed to create index: {}", e)))?;

    tracing::info!("Learning store schema initialized");
    Ok(())
}

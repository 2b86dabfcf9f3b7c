//! libsql-backed attempt store
//!
//! Holds one connection for the life of the store: writes serialize through
//! it, and in-memory databases stay coherent across operations. Appends are
//! single-statement inserts, so each record lands atomically or not at all.

use crate::error::{CalliopeError, Result};
use crate::learning::schema;
use crate::types::{
    AttemptId, ContentType, ContextKey, Diagnostic, EvaluatorResult, GenerationAttempt, ItemId,
    ParameterSet, RejectionReason,
};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::debug;

/// Where the store's database lives
#[derive(Debug, Clone)]
pub enum ConnectionMode {
    /// Persistent database file on disk
    Local(PathBuf),
    /// Isolated in-memory database, for tests
    InMemory,
}

/// Append-only store of generation attempts
pub struct AttemptStore {
    conn: libsql::Connection,
    // Keeps the database handle alive for the connection's lifetime
    _db: libsql::Database,
}

impl AttemptStore {
    /// Open the store and ensure its schema exists
    pub async fn open(mode: ConnectionMode) -> Result<Self> {
        let db = match &mode {
            ConnectionMode::Local(path) => libsql::Builder::new_local(path)
                .build()
                .await
                .map_err(|e| CalliopeError::Database(format!("Failed to open database: {}", e)))?,
            ConnectionMode::InMemory => libsql::Builder::new_local(":memory:")
                .build()
                .await
                .map_err(|e| CalliopeError::Database(format!("Failed to open database: {}", e)))?,
        };

        let conn = db
            .connect()
            .map_err(|e| CalliopeError::Database(format!("Failed to get connection: {}", e)))?;

        schema::init_attempts_table(&conn).await?;

        Ok(Self { conn, _db: db })
    }

    /// Append one attempt record
    ///
    /// A single INSERT, atomic per record. Nothing in the store ever
    /// updates or deletes rows from this table.
    pub async fn append(&self, attempt: &GenerationAttempt) -> Result<()> {
        debug!(
            item = %attempt.item_id,
            attempt = attempt.attempt_index,
            accepted = attempt.accepted,
            "Appending attempt record"
        );

        self.conn
            .execute(
                r#"
                INSERT INTO generation_attempts (
                    id, item_id, content_type, context_key, attempt_index,
                    parameters, generated_text, complete, evaluations, diagnostics,
                    composite_score, effective_threshold, accepted, rejection, created_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
                libsql::params![
                    attempt.id.to_string(),
                    attempt.item_id.to_string(),
                    attempt.content_type.as_str(),
                    attempt.context.as_str(),
                    attempt.attempt_index as i64,
                    serde_json::to_string(&attempt.parameters)?,
                    attempt.text.clone(),
                    attempt.complete as i64,
                    serde_json::to_string(&attempt.evaluations)?,
                    serde_json::to_string(&attempt.diagnostics)?,
                    attempt.composite_score,
                    attempt.effective_threshold,
                    attempt.accepted as i64,
                    attempt.rejection.map(|r| r.to_string()),
                    attempt.created_at.timestamp(),
                ],
            )
            .await
            .map_err(|e| CalliopeError::Database(format!("Failed to append attempt: {}", e)))?;

        Ok(())
    }

    /// All attempts for one item, in attempt order
    pub async fn attempts_for_item(&self, item_id: ItemId) -> Result<Vec<GenerationAttempt>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, item_id, content_type, context_key, attempt_index, \
                        parameters, generated_text, complete, evaluations, diagnostics, \
                        composite_score, effective_threshold, accepted, rejection, created_at \
                 FROM generation_attempts \
                 WHERE item_id = ? \
                 ORDER BY created_at ASC, attempt_index ASC",
                libsql::params![item_id.to_string()],
            )
            .await
            .map_err(|e| CalliopeError::Database(format!("Failed to query attempts: {}", e)))?;

        let mut attempts = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| CalliopeError::Database(format!("Failed to fetch attempt row: {}", e)))?
        {
            attempts.push(row_to_attempt(&row)?);
        }

        Ok(attempts)
    }

    /// Parameter sets of accepted attempts in one bucket
    pub async fn accepted_parameters(
        &self,
        content_type: &ContentType,
        context: &ContextKey,
    ) -> Result<Vec<ParameterSet>> {
        let mut rows = self
            .conn
            .query(
                "SELECT parameters FROM generation_attempts \
                 WHERE content_type = ? AND context_key = ? AND accepted = 1",
                libsql::params![content_type.as_str(), context.as_str()],
            )
            .await
            .map_err(|e| {
                CalliopeError::Database(format!("Failed to query accepted attempts: {}", e))
            })?;

        let mut sets = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| CalliopeError::Database(format!("Failed to fetch parameters: {}", e)))?
        {
            let json = row
                .get::<String>(0)
                .map_err(|e| CalliopeError::Database(format!("Failed to read column: {}", e)))?;
            sets.push(serde_json::from_str(&json)?);
        }

        Ok(sets)
    }

    /// Diagnostics from the newest attempts in one bucket, newest first
    pub async fn recent_diagnostics(
        &self,
        content_type: &ContentType,
        context: &ContextKey,
        limit: u32,
    ) -> Result<Vec<Diagnostic>> {
        let mut rows = self
            .conn
            .query(
                "SELECT diagnostics FROM generation_attempts \
                 WHERE content_type = ? AND context_key = ? \
                 ORDER BY created_at DESC, attempt_index DESC \
                 LIMIT ?",
                libsql::params![content_type.as_str(), context.as_str(), limit as i64],
            )
            .await
            .map_err(|e| {
                CalliopeError::Database(format!("Failed to query diagnostics: {}", e))
            })?;

        let mut diagnostics = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| CalliopeError::Database(format!("Failed to fetch diagnostics: {}", e)))?
        {
            let json = row
                .get::<String>(0)
                .map_err(|e| CalliopeError::Database(format!("Failed to read column: {}", e)))?;
            let batch: Vec<Diagnostic> = serde_json::from_str(&json)?;
            diagnostics.extend(batch);
        }

        Ok(diagnostics)
    }

    /// Total records in the log
    pub async fn count_attempts(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM generation_attempts", libsql::params![])
            .await
            .map_err(|e| CalliopeError::Database(format!("Failed to count attempts: {}", e)))?;

        let row = rows
            .next()
            .await
            .map_err(|e| CalliopeError::Database(format!("Failed to fetch count: {}", e)))?
            .ok_or_else(|| CalliopeError::Database("Count query returned no rows".to_string()))?;

        let count = row
            .get::<i64>(0)
            .map_err(|e| CalliopeError::Database(format!("Failed to read count: {}", e)))?;
        Ok(count.max(0) as u64)
    }
}

/// Decode one row back into an attempt record
fn row_to_attempt(row: &libsql::Row) -> Result<GenerationAttempt> {
    let get_text = |idx: i32| -> Result<String> {
        row.get::<String>(idx)
            .map_err(|e| CalliopeError::Database(format!("Failed to read column {}: {}", idx, e)))
    };

    let id = AttemptId::from_string(&get_text(0)?)
        .map_err(|e| CalliopeError::Database(format!("Invalid attempt id: {}", e)))?;
    let item_id = ItemId::from_string(&get_text(1)?)
        .map_err(|e| CalliopeError::Database(format!("Invalid item id: {}", e)))?;
    let content_type = ContentType::new(get_text(2)?);
    let context = ContextKey::new(get_text(3)?);

    let attempt_index = row
        .get::<i64>(4)
        .map_err(|e| CalliopeError::Database(format!("Failed to read column 4: {}", e)))?;

    let parameters: ParameterSet = serde_json::from_str(&get_text(5)?)?;
    let text = get_text(6)?;

    let complete = row
        .get::<i64>(7)
        .map_err(|e| CalliopeError::Database(format!("Failed to read column 7: {}", e)))?
        != 0;

    let evaluations: Vec<EvaluatorResult> = serde_json::from_str(&get_text(8)?)?;
    let diagnostics: Vec<Diagnostic> = serde_json::from_str(&get_text(9)?)?;

    let composite_score = match row
        .get_value(10)
        .map_err(|e| CalliopeError::Database(format!("Failed to read column 10: {}", e)))?
    {
        libsql::Value::Null => None,
        libsql::Value::Real(score) => Some(score),
        libsql::Value::Integer(score) => Some(score as f64),
        other => {
            return Err(CalliopeError::Database(format!(
                "Unexpected composite_score value: {:?}",
                other
            )))
        }
    };

    let effective_threshold = row
        .get::<f64>(11)
        .map_err(|e| CalliopeError::Database(format!("Failed to read column 11: {}", e)))?;

    let accepted = row
        .get::<i64>(12)
        .map_err(|e| CalliopeError::Database(format!("Failed to read column 12: {}", e)))?
        != 0;

    let rejection = match row
        .get_value(13)
        .map_err(|e| CalliopeError::Database(format!("Failed to read column 13: {}", e)))?
    {
        libsql::Value::Null => None,
        libsql::Value::Text(s) => RejectionReason::parse(&s),
        _ => None,
    };

    let created_secs = row
        .get::<i64>(14)
        .map_err(|e| CalliopeError::Database(format!("Failed to read column 14: {}", e)))?;
    let created_at = DateTime::<Utc>::from_timestamp(created_secs, 0)
        .ok_or_else(|| CalliopeError::Database("Invalid stored timestamp".to_string()))?;

    Ok(GenerationAttempt {
        id,
        item_id,
        content_type,
        context,
        attempt_index: attempt_index.max(0) as u32,
        parameters,
        text,
        complete,
        evaluations,
        diagnostics,
        composite_score,
        effective_threshold,
        accepted,
        rejection,
        created_at,
    })
}

//! Persistence side of the retry loop
//!
//! The integrator is the single write path into the attempt log: the engine
//! records every attempt through it, accepted or not, before moving on.
//! Decision logic lives elsewhere; this component only persists and reads.

use crate::error::Result;
use crate::learning::store::AttemptStore;
use crate::types::{ContentType, ContextKey, Diagnostic, GenerationAttempt, ItemId};
use std::sync::Arc;
use tracing::info;

/// Records attempts and serves the read paths derived from them
#[derive(Clone)]
pub struct LearningIntegrator {
    store: Arc<AttemptStore>,
}

impl LearningIntegrator {
    pub fn new(store: Arc<AttemptStore>) -> Self {
        Self { store }
    }

    /// Persist one attempt record
    ///
    /// Called exactly once per attempt, after scoring and deciding. The
    /// engine never proceeds to the next attempt until this returns.
    pub async fn record(&self, attempt: &GenerationAttempt) -> Result<()> {
        self.store.append(attempt).await?;

        info!(
            item = %attempt.item_id,
            content_type = %attempt.content_type,
            attempt = attempt.attempt_index,
            score = ?attempt.composite_score,
            threshold = attempt.effective_threshold,
            accepted = attempt.accepted,
            "Recorded generation attempt"
        );

        Ok(())
    }

    /// Recent diagnostics in a bucket, used to avoid repeating the same
    /// failure mode
    pub async fn recent_diagnostics(
        &self,
        content_type: &ContentType,
        context: &ContextKey,
        limit: u32,
    ) -> Result<Vec<Diagnostic>> {
        self.store
            .recent_diagnostics(content_type, context, limit)
            .await
    }

    /// Full attempt history for one item
    pub async fn history(&self, item_id: ItemId) -> Result<Vec<GenerationAttempt>> {
        self.store.attempts_for_item(item_id).await
    }
}

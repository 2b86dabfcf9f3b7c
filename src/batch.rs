//! Batch generation over a bounded worker pool
//!
//! Runs many items through the quality gate concurrently, bounded by a
//! semaphore so the generation service is never hit by more than the
//! configured number of in-flight items. Items are isolated: one item's
//! failure or exhaustion never aborts the rest of the batch.
//!
//! A stop request drains cleanly. Items that have not yet started report
//! [`CalliopeError::Cancelled`]; items already inside their retry loop run
//! to their next durable record before the pool winds down.

use crate::engine::{GenerationEngine, PromptAssembler};
use crate::error::{CalliopeError, Result};
use crate::types::{GateOutcome, ItemRequest};

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info};

/// Outcome of one item within a batch
#[derive(Debug)]
pub struct BatchItemResult {
    pub request: ItemRequest,
    pub outcome: Result<GateOutcome>,
}

/// Tally of terminal outcomes for one batch run
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct BatchSummary {
    /// Items that passed the quality gate
    pub accepted: usize,

    /// Items that consumed their full attempt budget
    pub exhausted: usize,

    /// Items aborted by an error or a stop request
    pub failed: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.accepted + self.exhausted + self.failed
    }
}

/// Drives a set of item requests through one shared engine
pub struct BatchRunner {
    engine: Arc<GenerationEngine>,
    max_concurrent: usize,
    stop: Arc<AtomicBool>,
}

impl BatchRunner {
    pub fn new(engine: Arc<GenerationEngine>, max_concurrent: usize) -> Self {
        Self {
            engine,
            max_concurrent: max_concurrent.max(1),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag checked by queued items; sharable with a signal handler
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Request an early stop; queued items drain as cancelled
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Run every request to a terminal outcome
    ///
    /// Results come back in request order. The summary counts panicked
    /// workers as failures even though they produce no per-item result.
    pub async fn run(
        &self,
        requests: Vec<ItemRequest>,
        assembler: Arc<dyn PromptAssembler>,
    ) -> (Vec<BatchItemResult>, BatchSummary) {
        let total = requests.len();
        info!(
            items = total,
            max_concurrent = self.max_concurrent,
            "Starting batch run"
        );

        let semaphore = Arc::new(Semaphore::new(self.max_concurrent));
        let mut handles = Vec::with_capacity(total);

        for request in requests {
            let engine = Arc::clone(&self.engine);
            let assembler = Arc::clone(&assembler);
            let semaphore = Arc::clone(&semaphore);
            let stop = Arc::clone(&self.stop);

            handles.push(tokio::spawn(async move {
                // Hold the permit for the item's whole retry loop
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return cancelled(request),
                };

                if stop.load(Ordering::SeqCst) {
                    return cancelled(request);
                }

                let outcome = engine
                    .generate_with_quality_gate(&request, assembler.as_ref())
                    .await;
                BatchItemResult { request, outcome }
            }));
        }

        let mut results = Vec::with_capacity(total);
        let mut summary = BatchSummary::default();

        for handle in handles {
            match handle.await {
                Ok(result) => {
                    match &result.outcome {
                        Ok(GateOutcome::Accepted { .. }) => summary.accepted += 1,
                        Ok(GateOutcome::Exhausted { .. }) => summary.exhausted += 1,
                        Err(e) => {
                            error!(
                                item_id = %result.request.item_id,
                                error = %e,
                                "Batch item failed"
                            );
                            summary.failed += 1;
                        }
                    }
                    results.push(result);
                }
                Err(e) => {
                    error!(error = %e, "Batch worker panicked");
                    summary.failed += 1;
                }
            }
        }

        info!(
            accepted = summary.accepted,
            exhausted = summary.exhausted,
            failed = summary.failed,
            "Batch run complete"
        );
        (results, summary)
    }
}

fn cancelled(request: ItemRequest) -> BatchItemResult {
    BatchItemResult {
        outcome: Err(CalliopeError::Cancelled(request.item_id.to_string())),
        request,
    }
}

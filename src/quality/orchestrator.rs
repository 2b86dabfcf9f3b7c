//! Composite scoring over the registered evaluators
//!
//! Runs every registered evaluator against a candidate text and combines
//! the normalized scores into one weighted composite. Evaluator failures
//! are recorded as unavailable, never folded into the score: weights are
//! renormalized over the evaluators that actually ran. Zero usable results
//! is an infrastructure fault, distinct from a low score.

use crate::config::EvaluatorConfig;
use crate::error::{CalliopeError, Result};
use crate::quality::Evaluator;
use crate::types::{ContextKey, QualityReport};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Weight for an evaluator registered without a configured entry
const DEFAULT_WEIGHT: f64 = 1.0;

/// Evaluator registry and composite scorer
pub struct QualityOrchestrator {
    evaluators: Vec<Arc<dyn Evaluator>>,
    weights: BTreeMap<String, f64>,
}

impl QualityOrchestrator {
    pub fn new(config: &EvaluatorConfig) -> Self {
        Self {
            evaluators: Vec::new(),
            weights: config.weights.clone(),
        }
    }

    /// Register an evaluator
    pub fn register(&mut self, evaluator: Arc<dyn Evaluator>) {
        if !self.weights.contains_key(evaluator.name()) {
            warn!(
                evaluator = evaluator.name(),
                weight = DEFAULT_WEIGHT,
                "Evaluator has no configured weight, using default"
            );
        }
        self.evaluators.push(evaluator);
    }

    pub fn evaluator_count(&self) -> usize {
        self.evaluators.len()
    }

    /// Score a candidate text with every registered evaluator
    ///
    /// Returns [`CalliopeError::EvaluationUnavailable`] when zero evaluators
    /// produced a result (including the zero-registered degenerate case);
    /// callers treat that as a retryable infrastructure fault, not a score.
    pub async fn evaluate(&self, text: &str, context: &ContextKey) -> Result<QualityReport> {
        if self.evaluators.is_empty() {
            return Err(CalliopeError::EvaluationUnavailable);
        }

        let mut results = Vec::new();
        let mut unavailable = Vec::new();

        for evaluator in &self.evaluators {
            match evaluator.score(text, context).await {
                Ok(result) => {
                    debug!(
                        evaluator = %result.evaluator,
                        raw = result.raw,
                        normalized = result.normalized,
                        "Evaluator scored candidate"
                    );
                    results.push(result);
                }
                Err(e) => {
                    warn!(
                        evaluator = evaluator.name(),
                        error = %e,
                        "Evaluator unavailable, redistributing its weight"
                    );
                    unavailable.push(evaluator.name().to_string());
                }
            }
        }

        if results.is_empty() {
            return Err(CalliopeError::EvaluationUnavailable);
        }

        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for result in &results {
            let weight = self
                .weights
                .get(&result.evaluator)
                .copied()
                .unwrap_or(DEFAULT_WEIGHT);
            weighted_sum += weight * result.normalized;
            weight_total += weight;
        }

        // Survivors may all carry a configured weight of 0.0; redistribute
        // uniformly rather than report a fabricated zero score
        let composite = if weight_total > 0.0 {
            (weighted_sum / weight_total).clamp(0.0, 1.0)
        } else {
            let sum: f64 = results.iter().map(|r| r.normalized).sum();
            (sum / results.len() as f64).clamp(0.0, 1.0)
        };

        debug!(
            composite,
            contributing = results.len(),
            unavailable = unavailable.len(),
            "Computed composite score"
        );

        Ok(QualityReport {
            composite,
            results,
            unavailable,
        })
    }
}

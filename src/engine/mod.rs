//! Quality-gated generation driver
//!
//! This module wires the full per-item retry loop:
//!
//! - Derive a fresh parameter set for the attempt (parameter manager)
//! - Assemble the prompt and call the generation service
//! - Validate completion, then score with every registered evaluator
//! - Accept, retry with adjusted parameters, or exhaust the budget
//! - Persist one attempt record per iteration, before moving on
//!
//! The engine owns sequencing and persistence ordering; all decision math
//! lives in [`controller`], which has no I/O of its own.

pub mod controller;

pub use controller::{Decision, RetryController};

use crate::config::EngineConfig;
use crate::error::{CalliopeError, Result};
use crate::generation::{CompletionValidator, GenerationClient};
use crate::learning::{AttemptStore, LearningIntegrator, SweetSpotAnalyzer};
use crate::params::{ParameterManager, ParameterStore};
use crate::quality::{
    AiLikelihoodEvaluator, QualityOrchestrator, RealismEvaluator, StructuralDiversityEvaluator,
};
use crate::types::{
    AttemptId, Diagnostic, GateOutcome, GenerationAttempt, ItemRequest, ParameterSet,
};

use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Extra retries when evaluation infrastructure is unavailable
///
/// An unavailable evaluator set is an infrastructure fault, so it is retried
/// here at the transport level and never consumes a quality-attempt slot.
const EVALUATION_RETRIES: u32 = 2;

/// Base delay between evaluation retries in milliseconds
const EVALUATION_BACKOFF_MS: u64 = 500;

/// Acceptable word count as a fraction of the target, low side
const LENGTH_BAND_LOW: f64 = 0.5;

/// Acceptable word count as a multiple of the target, high side
const LENGTH_BAND_HIGH: f64 = 1.6;

/// How many dominant failure categories an exhaustion report carries
const DOMINANT_LIMIT: usize = 3;

/// Builds the final prompt for one generation attempt
///
/// Prompt assembly is a caller concern; the engine only requires that the
/// assembled prompt reflect the attempt's parameters (length target, voice)
/// so that retries actually steer the output.
pub trait PromptAssembler: Send + Sync {
    fn assemble(&self, request: &ItemRequest, params: &ParameterSet) -> String;
}

/// Assembler that wraps one fixed instruction with the attempt's
/// length target
pub struct StaticPromptAssembler {
    instruction: String,
}

impl StaticPromptAssembler {
    pub fn new(instruction: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
        }
    }
}

impl PromptAssembler for StaticPromptAssembler {
    fn assemble(&self, request: &ItemRequest, params: &ParameterSet) -> String {
        format!(
            "Write a {} for this item. Aim for roughly {} words.\n\n{}",
            request.content_type, params.target_words, self.instruction
        )
    }
}

/// The quality-gated generation engine
///
/// One engine serves many items; all internal components are shared-state
/// safe, so the batch layer can drive it from concurrent tasks.
pub struct GenerationEngine {
    manager: ParameterManager,
    client: Arc<dyn GenerationClient>,
    validator: CompletionValidator,
    orchestrator: QualityOrchestrator,
    controller: RetryController,
    integrator: LearningIntegrator,
    analyzer: SweetSpotAnalyzer,
    diagnostics_window: u32,
}

impl GenerationEngine {
    /// Build an engine around an explicit evaluator set
    pub fn new(
        config: &EngineConfig,
        client: Arc<dyn GenerationClient>,
        orchestrator: QualityOrchestrator,
        store: Arc<AttemptStore>,
    ) -> Self {
        Self {
            manager: ParameterManager::new(ParameterStore::new(config)),
            client,
            validator: CompletionValidator::new(),
            orchestrator,
            controller: RetryController::new(&config.thresholds),
            integrator: LearningIntegrator::new(Arc::clone(&store)),
            analyzer: SweetSpotAnalyzer::new(store, config.learning.min_samples),
            diagnostics_window: config.learning.diagnostics_window,
        }
    }

    /// Build an engine with the standard evaluators registered: AI
    /// likelihood, LLM-judged realism, and structural diversity
    pub fn with_default_evaluators(
        config: &EngineConfig,
        client: Arc<dyn GenerationClient>,
        store: Arc<AttemptStore>,
    ) -> Self {
        let mut orchestrator = QualityOrchestrator::new(&config.evaluators);
        orchestrator.register(Arc::new(AiLikelihoodEvaluator::new()));
        orchestrator.register(Arc::new(RealismEvaluator::new(Arc::clone(&client))));
        orchestrator.register(Arc::new(StructuralDiversityEvaluator::new()));
        Self::new(config, client, orchestrator, store)
    }

    /// Run the full quality gate for one item
    ///
    /// Returns the terminal outcome: either an accepted text with its score,
    /// or an explicit exhaustion report. Every attempt, accepted or not, is
    /// persisted to the learning store before the run proceeds; a retry
    /// never starts until its predecessor's record is durable.
    ///
    /// Errors abort the item without a decision: configuration faults,
    /// transport faults that survive the client's own retry budget, and
    /// evaluation infrastructure that stays down past
    /// [`EVALUATION_RETRIES`].
    pub async fn generate_with_quality_gate(
        &self,
        request: &ItemRequest,
        assembler: &dyn PromptAssembler,
    ) -> Result<GateOutcome> {
        let recommendation = self
            .analyzer
            .recommend(&request.content_type, &request.context)
            .await?;
        let recent = self
            .integrator
            .recent_diagnostics(
                &request.content_type,
                &request.context,
                self.diagnostics_window,
            )
            .await?;

        let max_attempts = self.controller.max_attempts();
        let mut prior: Option<GenerationAttempt> = None;
        let mut category_counts: BTreeMap<String, u32> = BTreeMap::new();

        for attempt_index in 1..=max_attempts {
            let params = self.manager.derive(
                &request.content_type,
                &request.context,
                attempt_index,
                prior.as_ref(),
                recommendation.as_ref(),
                &recent,
            )?;
            let prompt = assembler.assemble(request, &params);

            debug!(
                item_id = %request.item_id,
                attempt = attempt_index,
                temperature = params.temperature,
                target_words = params.target_words,
                "Generating candidate"
            );

            let generated = self.client.generate(&prompt, &params).await?;

            let mut diagnostics = Vec::new();
            let mut evaluations = Vec::new();
            let mut composite = None;

            let complete = match self.validator.check(&generated.text) {
                Some(diag) => {
                    diagnostics.push(diag);
                    false
                }
                None => true,
            };

            // Truncated output skips scoring entirely; a score over a
            // fragment would poison the learning record
            if complete {
                if let Some(diag) = length_check(&generated.text, params.target_words) {
                    diagnostics.push(diag);
                }

                let report = self
                    .evaluate_with_retry(&generated.text, request)
                    .await?;
                composite = Some(report.composite);
                diagnostics.extend(report.diagnostics());
                evaluations = report.results;
            }

            for diag in &diagnostics {
                *category_counts
                    .entry(diag.category().to_string())
                    .or_insert(0) += 1;
            }

            let threshold = self.controller.effective_threshold(attempt_index);
            let decision = self.controller.decide(attempt_index, complete, composite);

            let attempt = GenerationAttempt {
                id: AttemptId::new(),
                item_id: request.item_id,
                content_type: request.content_type.clone(),
                context: request.context.clone(),
                attempt_index,
                parameters: params,
                text: generated.text,
                complete,
                evaluations,
                diagnostics,
                composite_score: composite,
                effective_threshold: threshold,
                accepted: matches!(decision, Decision::Accept),
                rejection: match decision {
                    Decision::Accept => None,
                    Decision::Retry(reason) | Decision::Exhaust(reason) => Some(reason),
                },
                created_at: Utc::now(),
            };

            // The record must be durable before the run proceeds
            self.integrator.record(&attempt).await?;

            match decision {
                Decision::Accept => {
                    let score = composite.ok_or_else(|| {
                        CalliopeError::Other(
                            "accepted attempt is missing a composite score".to_string(),
                        )
                    })?;
                    info!(
                        item_id = %request.item_id,
                        attempts = attempt_index,
                        score,
                        threshold,
                        "Quality gate passed"
                    );
                    return Ok(GateOutcome::Accepted {
                        text: attempt.text,
                        score,
                        threshold,
                        attempts: attempt_index,
                    });
                }
                Decision::Retry(reason) => {
                    debug!(
                        item_id = %request.item_id,
                        attempt = attempt_index,
                        reason = %reason,
                        score = ?composite,
                        threshold,
                        "Attempt rejected, retrying"
                    );
                    prior = Some(attempt);
                }
                Decision::Exhaust(reason) => {
                    let dominant = dominant_categories(&category_counts, DOMINANT_LIMIT);
                    warn!(
                        item_id = %request.item_id,
                        attempts = attempt_index,
                        reason = %reason,
                        last_score = ?composite,
                        dominant = ?dominant,
                        "Attempt budget exhausted"
                    );
                    return Ok(GateOutcome::Exhausted {
                        attempts: attempt_index,
                        last_score: composite,
                        threshold,
                        diagnostics: attempt.diagnostics,
                        dominant,
                    });
                }
            }
        }

        // Unreachable: max_attempts >= 1 is validated at config load and
        // the final iteration always returns through Accept or Exhaust
        Err(CalliopeError::Other(
            "quality gate ended without a decision".to_string(),
        ))
    }

    /// Score a candidate, retrying transient evaluation outages
    async fn evaluate_with_retry(
        &self,
        text: &str,
        request: &ItemRequest,
    ) -> Result<crate::types::QualityReport> {
        let mut retries = 0;
        loop {
            match self.orchestrator.evaluate(text, &request.context).await {
                Ok(report) => return Ok(report),
                Err(e) if e.is_retryable() && retries < EVALUATION_RETRIES => {
                    let backoff = EVALUATION_BACKOFF_MS * 2_u64.pow(retries);
                    warn!(
                        item_id = %request.item_id,
                        error = %e,
                        retry = retries + 1,
                        backoff_ms = backoff,
                        "Evaluation unavailable, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(backoff)).await;
                    retries += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Flag output whose word count misses the target band
fn length_check(text: &str, target_words: u32) -> Option<Diagnostic> {
    let actual = text.split_whitespace().count() as u32;
    let target = f64::from(target_words);
    let low = (target * LENGTH_BAND_LOW).floor() as u32;
    let high = (target * LENGTH_BAND_HIGH).ceil() as u32;

    if actual < low || actual > high {
        Some(Diagnostic::LengthOutOfRange {
            actual_words: actual,
            target_words,
        })
    } else {
        None
    }
}

/// Most frequent diagnostic categories, ties broken by name
fn dominant_categories(counts: &BTreeMap<String, u32>, limit: usize) -> Vec<String> {
    let mut entries: Vec<(&String, &u32)> = counts.iter().collect();
    entries.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    entries
        .into_iter()
        .take(limit)
        .map(|(name, _)| name.clone())
        .collect()
}

//! Quality evaluation for candidate text
//!
//! A registry of independent evaluators scores each candidate on one
//! dimension apiece, and the orchestrator combines their normalized scores
//! into a weighted composite:
//!
//! - **AiLikelihoodEvaluator**: lexical detector for AI-tendency phrasing
//!   (stock phrases, hedging density), raw scale 0-100 human-likelihood
//! - **RealismEvaluator**: subjective rubric scored by the generation
//!   service, raw scale 0-10
//! - **StructuralDiversityEvaluator**: sentence-shape analysis (openers,
//!   length variance), raw scale 0-1
//!
//! Each adapter owns its own raw-to-[0,1] normalization; nothing downstream
//! of the adapter boundary interprets any other scale. Adding an evaluator
//! is registering a new implementation, never branching on a name inside
//! the orchestrator.

pub mod ai_likelihood;
pub mod orchestrator;
pub mod realism;
pub mod structure;

use crate::error::Result;
use crate::types::{ContextKey, EvaluatorResult};
use async_trait::async_trait;

/// One pluggable quality dimension
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Registered name, matched against the configured weight table
    fn name(&self) -> &str;

    /// Score a candidate text
    ///
    /// The returned result carries both the evaluator-native raw score and
    /// its normalized [0, 1] form. An evaluator that cannot run returns an
    /// error, never a fabricated score.
    async fn score(&self, text: &str, context: &ContextKey) -> Result<EvaluatorResult>;
}

pub use ai_likelihood::AiLikelihoodEvaluator;
pub use orchestrator::QualityOrchestrator;
pub use realism::RealismEvaluator;
pub use structure::StructuralDiversityEvaluator;

//! Subjective realism evaluator
//!
//! Asks the generation service to judge the candidate against a short
//! rubric (authenticity, specificity, flow) and parses a structured
//! verdict. Raw scale is the rubric's 0-10; normalization to [0, 1] lives
//! here, at the adapter boundary. Transport failures propagate so the
//! orchestrator records this evaluator as unavailable rather than scoring
//! the outage.

use crate::error::{CalliopeError, Result};
use crate::generation::GenerationClient;
use crate::quality::Evaluator;
use crate::types::{ContextKey, Diagnostic, EvaluatorResult, ParameterSet};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Rubric ceiling; raw verdicts are 0-10
const RUBRIC_MAX: f64 = 10.0;

/// Dimensions scoring below this produce a diagnostic
const LOW_DIMENSION_FLOOR: f64 = 5.0;

/// Sampling temperature for rubric judging
const JUDGE_TEMPERATURE: f64 = 0.2;

/// Word budget for the judge's structured verdict
const JUDGE_TARGET_WORDS: u32 = 80;

/// Rubric dimensions, as (response field, diagnostic name) pairs
const DIMENSIONS: &[(&str, &str)] = &[
    ("AUTHENTICITY:", "authenticity"),
    ("SPECIFICITY:", "specificity"),
    ("FLOW:", "flow"),
];

/// Judges subjective realism via the generation service
pub struct RealismEvaluator {
    client: Arc<dyn GenerationClient>,
}

impl RealismEvaluator {
    pub fn new(client: Arc<dyn GenerationClient>) -> Self {
        Self { client }
    }

    /// Fixed low-temperature parameters for the judging call
    fn judge_params() -> ParameterSet {
        ParameterSet {
            temperature: JUDGE_TEMPERATURE,
            repetition_penalty: 1.0,
            novelty: 0.0,
            target_words: JUDGE_TARGET_WORDS,
            voice: BTreeMap::new(),
        }
    }

    fn build_prompt(text: &str, context: &ContextKey) -> String {
        format!(
            r#"You are judging a piece of catalog copy for how convincingly human it reads.

Copy under review:
{}

Product category: {}

Rate each dimension from 0 to 10, where 10 reads like an experienced human copywriter:
1. AUTHENTICITY - free of generic filler, sounds like a person who knows the product
2. SPECIFICITY - concrete details over vague superlatives
3. FLOW - natural rhythm when read aloud

Format your response EXACTLY as:
SCORE: <overall 0-10>
AUTHENTICITY: <0-10>
SPECIFICITY: <0-10>
FLOW: <0-10>
"#,
            text, context
        )
    }
}

#[async_trait]
impl Evaluator for RealismEvaluator {
    fn name(&self) -> &str {
        "realism"
    }

    async fn score(&self, text: &str, context: &ContextKey) -> Result<EvaluatorResult> {
        debug!("Requesting realism verdict from generation service");

        let prompt = Self::build_prompt(text, context);
        let generated = self
            .client
            .generate(&prompt, &Self::judge_params())
            .await?;

        parse_verdict(&generated.text)
    }
}

/// Parse the judge's structured verdict into a result
fn parse_verdict(response: &str) -> Result<EvaluatorResult> {
    let overall = extract_field(response, "SCORE:")?
        .parse::<f64>()
        .map_err(|_| {
            CalliopeError::Generation("Judge verdict has a non-numeric SCORE".to_string())
        })?
        .clamp(0.0, RUBRIC_MAX);

    let mut diagnostics = Vec::new();
    for (field, dimension) in DIMENSIONS {
        let Some(value) = extract_field(response, field)
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
        else {
            continue;
        };

        if value < LOW_DIMENSION_FLOOR {
            diagnostics.push(Diagnostic::LowRubricDimension {
                dimension: dimension.to_string(),
                score: value,
            });
        }
    }

    Ok(EvaluatorResult::new(
        "realism",
        overall,
        overall / RUBRIC_MAX,
        diagnostics,
    ))
}

/// Extract a field from the structured judge response
fn extract_field(response: &str, field: &str) -> Result<String> {
    response
        .lines()
        .map(str::trim_start)
        .find(|line| line.starts_with(field))
        .and_then(|line| line.strip_prefix(field))
        .map(|s| s.trim().to_string())
        .ok_or_else(|| {
            CalliopeError::Generation(format!("Judge response missing field: {}", field))
        })
}

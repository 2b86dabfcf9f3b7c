//! Core data types for the Calliope generation engine
//!
//! This module defines the fundamental data structures used throughout calliope,
//! including parameter sets, attempt records, evaluator verdicts, and gate
//! outcomes. Every attempt's configuration is reproducible from these records:
//! a [`ParameterSet`] is immutable once constructed and a fresh one is created
//! for each attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Unique identifier for catalog items
///
/// Wraps a UUID to provide type safety and prevent mixing item IDs with
/// other UUID-based identifiers in the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub Uuid);

impl ItemId {
    /// Create a new random item ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an item ID from a string
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for one generation attempt record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(pub Uuid);

impl AttemptId {
    /// Create a new random attempt ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse an attempt ID from a string
    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of text being generated (e.g. "description", "tagline")
///
/// Content types are configuration keys, not a hardcoded enum: the set of
/// valid types is whatever the configuration declares defaults for. Stored
/// in canonical lowercase form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentType(String);

impl ContentType {
    /// Create a content type, canonicalizing to lowercase
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Context bucket for parameter learning (e.g. item category "materials")
///
/// Attempts with the same (content-type, context) key share one sweet-spot
/// bucket. Items without a meaningful context fall into the "global" bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextKey(String);

impl ContextKey {
    /// Create a context key, canonicalizing to lowercase
    pub fn new(name: impl Into<String>) -> Self {
        let canonical = name.into().trim().to_lowercase();
        if canonical.is_empty() {
            Self::global()
        } else {
            Self(canonical)
        }
    }

    /// The catch-all bucket for items without a context
    pub fn global() -> Self {
        Self("global".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this is the catch-all bucket
    pub fn is_global(&self) -> bool {
        self.0 == "global"
    }
}

impl Default for ContextKey {
    fn default() -> Self {
        Self::global()
    }
}

impl std::fmt::Display for ContextKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Inclusive numeric range for one generation parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterRange {
    pub min: f64,
    pub max: f64,
}

impl ParameterRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Whether the value lies inside the range (inclusive)
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Clamp a value into the range
    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    pub fn midpoint(&self) -> f64 {
        (self.min + self.max) / 2.0
    }

    pub fn width(&self) -> f64 {
        self.max - self.min
    }
}

/// Complete set of generation knobs for one attempt
///
/// Immutable once constructed: a new ParameterSet is created for every
/// attempt, never mutated in place, so each attempt's configuration is
/// reproducible from the attempt log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    /// Sampling temperature
    pub temperature: f64,

    /// Penalty against verbatim repetition
    pub repetition_penalty: f64,

    /// Pressure toward novel phrasing (presence-style penalty)
    pub novelty: f64,

    /// Target output length in words
    pub target_words: u32,

    /// Named voice-intensity style knobs (zero or more)
    pub voice: BTreeMap<String, f64>,
}

impl ParameterSet {
    pub const TEMPERATURE: &'static str = "temperature";
    pub const REPETITION_PENALTY: &'static str = "repetition_penalty";
    pub const NOVELTY: &'static str = "novelty";
    pub const TARGET_WORDS: &'static str = "target_words";

    /// Prefix for voice knob names in the flat parameter namespace
    pub const VOICE_PREFIX: &'static str = "voice.";

    /// All parameters as (name, value) pairs in the flat namespace
    ///
    /// Voice knobs appear as `voice.<name>`. The sweet-spot analyzer and
    /// range validation iterate this view so they stay generic over knobs.
    pub fn named_values(&self) -> Vec<(String, f64)> {
        let mut values = vec![
            (Self::TEMPERATURE.to_string(), self.temperature),
            (Self::REPETITION_PENALTY.to_string(), self.repetition_penalty),
            (Self::NOVELTY.to_string(), self.novelty),
            (Self::TARGET_WORDS.to_string(), f64::from(self.target_words)),
        ];
        for (name, value) in &self.voice {
            values.push((format!("{}{}", Self::VOICE_PREFIX, name), *value));
        }
        values
    }

    /// Look up one parameter by its flat-namespace name
    pub fn value_of(&self, name: &str) -> Option<f64> {
        match name {
            Self::TEMPERATURE => Some(self.temperature),
            Self::REPETITION_PENALTY => Some(self.repetition_penalty),
            Self::NOVELTY => Some(self.novelty),
            Self::TARGET_WORDS => Some(f64::from(self.target_words)),
            _ => name
                .strip_prefix(Self::VOICE_PREFIX)
                .and_then(|knob| self.voice.get(knob).copied()),
        }
    }
}

/// One detected failure mode, produced by an evaluator or the completion
/// validator
///
/// Diagnostics, not evaluator identities, key the retry adjustments: the
/// parameter manager matches on these variants to pick the next attempt's
/// correction, so adding an evaluator never requires touching the manager.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Diagnostic {
    /// Stock AI-tendency phrases detected in the text
    StockPhrases { phrases: Vec<String> },

    /// Hedging constructions per hundred words above tolerance
    HedgingDensity { per_hundred_words: f64 },

    /// Multiple sentences opening with the same words
    RepeatedOpeners { openers: Vec<String> },

    /// Sentence lengths too uniform to read as human prose
    UniformSentences { mean_words: f64, std_dev: f64 },

    /// A rubric dimension scored poorly in subjective evaluation
    LowRubricDimension { dimension: String, score: f64 },

    /// Output length missed the target band
    LengthOutOfRange { actual_words: u32, target_words: u32 },

    /// Output cut off mid-thought
    Truncated { tail: String },
}

impl Diagnostic {
    /// Stable category name, used for dominant-failure reporting
    pub fn category(&self) -> &'static str {
        match self {
            Diagnostic::StockPhrases { .. } => "stock_phrases",
            Diagnostic::HedgingDensity { .. } => "hedging_density",
            Diagnostic::RepeatedOpeners { .. } => "repeated_openers",
            Diagnostic::UniformSentences { .. } => "uniform_sentences",
            Diagnostic::LowRubricDimension { .. } => "low_rubric_dimension",
            Diagnostic::LengthOutOfRange { .. } => "length_out_of_range",
            Diagnostic::Truncated { .. } => "truncated",
        }
    }
}

/// One evaluator's verdict on a candidate text
///
/// `raw` is in the evaluator's native scale; `normalized` is always in
/// [0, 1] with 1.0 best. Evaluators that cannot run produce no result at
/// all, never a fabricated score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorResult {
    /// Registered evaluator name
    pub evaluator: String,

    /// Score in the evaluator's native scale (e.g. 0-100 likelihood, 0-10 rubric)
    pub raw: f64,

    /// Score normalized to [0, 1], 1.0 = best
    pub normalized: f64,

    /// Structured failure-mode observations
    pub diagnostics: Vec<Diagnostic>,
}

impl EvaluatorResult {
    /// Build a result, enforcing the [0, 1] normalization invariant at the
    /// adapter boundary
    pub fn new(
        evaluator: impl Into<String>,
        raw: f64,
        normalized: f64,
        diagnostics: Vec<Diagnostic>,
    ) -> Self {
        Self {
            evaluator: evaluator.into(),
            raw,
            normalized: normalized.clamp(0.0, 1.0),
            diagnostics,
        }
    }
}

/// Combined evaluation of one candidate text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityReport {
    /// Weighted composite over available evaluators, in [0, 1]
    pub composite: f64,

    /// Verdicts from the evaluators that ran
    pub results: Vec<EvaluatorResult>,

    /// Names of registered evaluators that could not run
    pub unavailable: Vec<String>,
}

impl QualityReport {
    /// All diagnostics across contributing evaluators
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.results
            .iter()
            .flat_map(|r| r.diagnostics.iter().cloned())
            .collect()
    }
}

/// Why an attempt was rejected
///
/// Both kinds consume a quality-attempt slot; they differ in which
/// adjustment policy the next attempt receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// Output failed completion validation (truncated); scored attempts
    /// were skipped and the next attempt gets a longer length budget
    Incomplete,

    /// Scored below the effective threshold for this attempt index
    BelowThreshold,
}

impl RejectionReason {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "incomplete" => Some(RejectionReason::Incomplete),
            "below_threshold" => Some(RejectionReason::BelowThreshold),
            _ => None,
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectionReason::Incomplete => write!(f, "incomplete"),
            RejectionReason::BelowThreshold => write!(f, "below_threshold"),
        }
    }
}

/// Complete record of one generation attempt
///
/// Created immediately after scoring and never mutated afterwards; the
/// learning store retains these indefinitely as an append-only log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationAttempt {
    // === Identity ===
    /// Unique record identifier
    pub id: AttemptId,

    /// Item this attempt generated text for
    pub item_id: ItemId,

    /// Kind of text generated
    pub content_type: ContentType,

    /// Learning bucket
    pub context: ContextKey,

    /// 1-based attempt index within one quality-gate run
    pub attempt_index: u32,

    // === Configuration ===
    /// Exact knobs used for this attempt
    pub parameters: ParameterSet,

    // === Result ===
    /// Raw generated text
    pub text: String,

    /// Whether the text passed completion validation
    pub complete: bool,

    /// Verdicts from the evaluators that ran (empty when completion failed)
    pub evaluations: Vec<EvaluatorResult>,

    /// All failure-mode observations for this attempt, including
    /// completion-validator findings
    pub diagnostics: Vec<Diagnostic>,

    /// Weighted composite score; None when scoring was skipped
    pub composite_score: Option<f64>,

    /// Acceptance bar in force for this attempt index
    pub effective_threshold: f64,

    // === Decision ===
    /// Final accept/reject decision
    pub accepted: bool,

    /// Rejection kind when not accepted
    pub rejection: Option<RejectionReason>,

    /// When the attempt completed
    pub created_at: DateTime<Utc>,
}

/// Empirical parameter ranges mined from accepted attempts
///
/// Only produced when the qualifying sample count meets the configured
/// minimum; an under-sampled recommendation is worse than none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweetSpotRecommendation {
    pub content_type: ContentType,
    pub context: ContextKey,

    /// Recommended (min, max) per parameter in the flat namespace
    pub ranges: BTreeMap<String, ParameterRange>,

    /// Number of accepted attempts backing the recommendation
    pub sample_count: u32,
}

/// Token usage reported by the generation service
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Raw generation service output: text plus usage metadata
#[derive(Debug, Clone)]
pub struct GeneratedText {
    pub text: String,
    pub usage: Usage,
}

/// Caller-facing request: one item, one content type, one context bucket
#[derive(Debug, Clone)]
pub struct ItemRequest {
    pub item_id: ItemId,
    pub content_type: ContentType,
    pub context: ContextKey,
}

/// Terminal outcome of one quality-gate run
///
/// Exhaustion is an explicit result, never a silent best-effort save: the
/// caller always sees the score, the threshold it was judged against, and
/// (when exhausted) the dominant failure categories across attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum GateOutcome {
    /// An attempt met its effective threshold
    Accepted {
        /// The winning text
        text: String,

        /// Composite score of the winning attempt
        score: f64,

        /// Threshold the winning attempt was judged against
        threshold: f64,

        /// How many attempts were consumed
        attempts: u32,
    },

    /// All attempts were rejected; nothing was persisted as final content
    Exhausted {
        /// How many attempts were consumed
        attempts: u32,

        /// Composite score of the final attempt, if it was scored
        last_score: Option<f64>,

        /// Threshold the final attempt was judged against
        threshold: f64,

        /// Diagnostics from the final attempt
        diagnostics: Vec<Diagnostic>,

        /// Most frequent diagnostic categories across all attempts
        dominant: Vec<String>,
    },
}

impl GateOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, GateOutcome::Accepted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_id_creation() {
        let id1 = ItemId::new();
        let id2 = ItemId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_context_key_canonicalization() {
        assert_eq!(ContextKey::new(" Materials ").as_str(), "materials");
        assert_eq!(ContextKey::new("").as_str(), "global");
        assert!(ContextKey::default().is_global());
        assert!(!ContextKey::new("compounds").is_global());
    }

    #[test]
    fn test_parameter_set_named_values() {
        let mut voice = BTreeMap::new();
        voice.insert("warmth".to_string(), 0.6);

        let params = ParameterSet {
            temperature: 0.8,
            repetition_penalty: 1.1,
            novelty: 0.3,
            target_words: 120,
            voice,
        };

        let values = params.named_values();
        assert_eq!(values.len(), 5);
        assert_eq!(params.value_of("temperature"), Some(0.8));
        assert_eq!(params.value_of("target_words"), Some(120.0));
        assert_eq!(params.value_of("voice.warmth"), Some(0.6));
        assert_eq!(params.value_of("voice.missing"), None);
        assert_eq!(params.value_of("nonsense"), None);
    }

    #[test]
    fn test_evaluator_result_clamps_normalized() {
        let high = EvaluatorResult::new("test", 150.0, 1.5, vec![]);
        assert_eq!(high.normalized, 1.0);

        let low = EvaluatorResult::new("test", -3.0, -0.2, vec![]);
        assert_eq!(low.normalized, 0.0);
    }

    #[test]
    fn test_rejection_reason_round_trip() {
        for reason in [RejectionReason::Incomplete, RejectionReason::BelowThreshold] {
            assert_eq!(RejectionReason::parse(&reason.to_string()), Some(reason));
        }
        assert_eq!(RejectionReason::parse("garbage"), None);
    }

    #[test]
    fn test_parameter_range_ops() {
        let range = ParameterRange::new(0.2, 1.0);
        assert!(range.contains(0.2));
        assert!(range.contains(1.0));
        assert!(!range.contains(1.01));
        assert_eq!(range.clamp(2.0), 1.0);
        assert_eq!(range.clamp(0.0), 0.2);
        assert!((range.midpoint() - 0.6).abs() < f64::EPSILON);
    }

    #[test]
    fn test_diagnostic_serde_tagging() {
        let diag = Diagnostic::LengthOutOfRange {
            actual_words: 40,
            target_words: 120,
        };
        let json = serde_json::to_string(&diag).unwrap();
        assert!(json.contains("\"kind\":\"length_out_of_range\""));

        let back: Diagnostic = serde_json::from_str(&json).unwrap();
        assert_eq!(back.category(), "length_out_of_range");
    }
}

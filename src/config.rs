//! Configuration for the Calliope generation engine
//!
//! All knobs the engine consumes are declared here and supplied externally:
//! per content-type base parameters, per-parameter valid ranges, evaluator
//! weights, acceptance thresholds, attempt budgets, and service settings.
//! Nothing is defaulted silently at call sites; [`EngineConfig::validate`]
//! fail-fasts at load time on any out-of-range or missing definition.
//!
//! # Configuration File Format
//!
//! TOML, layered with `CALLIOPE`-prefixed environment overrides
//! (e.g. `CALLIOPE_THRESHOLDS__BASE=0.8`):
//!
//! ```toml
//! [thresholds]
//! base = 0.70
//! floor = 0.55
//! relaxation_step = 0.05
//! max_attempts = 5
//!
//! [generation]
//! endpoint = "https://api.anthropic.com/v1/messages"
//! model = "claude-3-5-haiku-20241022"
//! request_timeout_secs = 30
//! transport_max_retries = 3
//!
//! [learning]
//! min_samples = 10
//! diagnostics_window = 25
//!
//! [batch]
//! max_concurrent = 4
//!
//! [evaluators.weights]
//! ai_likelihood = 0.40
//! realism = 0.35
//! structural_diversity = 0.25
//!
//! [content_types.description]
//! temperature = 0.85
//! repetition_penalty = 1.15
//! novelty = 0.30
//! target_words = 120
//!
//! [content_types.description.voice]
//! warmth = 0.50
//! ```

use crate::error::{CalliopeError, Result};
use crate::types::{ContentType, ParameterRange, ParameterSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::Path;

/// Complete engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Acceptance thresholds and attempt budget
    #[serde(default)]
    pub thresholds: ThresholdConfig,

    /// Generation service settings
    #[serde(default)]
    pub generation: GenerationServiceConfig,

    /// Learning store and sweet-spot mining settings
    #[serde(default)]
    pub learning: LearningConfig,

    /// Batch worker pool settings
    #[serde(default)]
    pub batch: BatchConfig,

    /// Declared valid range per parameter
    #[serde(default)]
    pub ranges: RangeConfig,

    /// Evaluator weight table
    #[serde(default)]
    pub evaluators: EvaluatorConfig,

    /// Base parameters per content type; the set of keys defines which
    /// content types exist
    #[serde(default)]
    pub content_types: BTreeMap<String, BaseParameters>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            thresholds: ThresholdConfig::default(),
            generation: GenerationServiceConfig::default(),
            learning: LearningConfig::default(),
            batch: BatchConfig::default(),
            ranges: RangeConfig::default(),
            evaluators: EvaluatorConfig::default(),
            content_types: BTreeMap::new(),
        }
    }
}

/// Acceptance thresholds and the attempt budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Acceptance bar for attempt 1
    #[serde(default = "default_base_threshold")]
    pub base: f64,

    /// Relaxation never goes below this bar
    #[serde(default = "default_floor_threshold")]
    pub floor: f64,

    /// How much the bar drops per additional attempt
    #[serde(default = "default_relaxation_step")]
    pub relaxation_step: f64,

    /// Maximum generate/evaluate cycles per item
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            base: default_base_threshold(),
            floor: default_floor_threshold(),
            relaxation_step: default_relaxation_step(),
            max_attempts: default_max_attempts(),
        }
    }
}

/// Generation service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationServiceConfig {
    /// Messages endpoint URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// API key; defaults from CALLIOPE_API_KEY
    #[serde(default = "default_api_key")]
    pub api_key: String,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Transport-level retry budget (distinct from quality attempts)
    #[serde(default = "default_transport_retries")]
    pub transport_max_retries: u32,
}

impl Default for GenerationServiceConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: default_api_key(),
            model: default_model(),
            request_timeout_secs: default_timeout_secs(),
            transport_max_retries: default_transport_retries(),
        }
    }
}

/// Learning store and mining settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningConfig {
    /// Minimum accepted samples before a sweet-spot recommendation is issued
    #[serde(default = "default_min_samples")]
    pub min_samples: u32,

    /// How many recent attempts to consult for repeat-failure avoidance
    #[serde(default = "default_diagnostics_window")]
    pub diagnostics_window: u32,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            min_samples: default_min_samples(),
            diagnostics_window: default_diagnostics_window(),
        }
    }
}

/// Batch worker pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Upper bound on concurrently processed items, which also bounds
    /// concurrent external calls
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

/// Declared valid range per generation parameter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RangeConfig {
    #[serde(default = "default_temperature_range")]
    pub temperature: ParameterRange,

    #[serde(default = "default_repetition_range")]
    pub repetition_penalty: ParameterRange,

    #[serde(default = "default_novelty_range")]
    pub novelty: ParameterRange,

    #[serde(default = "default_target_words_range")]
    pub target_words: ParameterRange,

    /// Valid range per named voice knob; a knob used by any content type
    /// must be declared here
    #[serde(default)]
    pub voice: BTreeMap<String, ParameterRange>,
}

impl Default for RangeConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature_range(),
            repetition_penalty: default_repetition_range(),
            novelty: default_novelty_range(),
            target_words: default_target_words_range(),
            voice: BTreeMap::new(),
        }
    }
}

impl RangeConfig {
    /// Look up the declared range for a flat-namespace parameter name
    pub fn range_of(&self, name: &str) -> Option<ParameterRange> {
        match name {
            ParameterSet::TEMPERATURE => Some(self.temperature),
            ParameterSet::REPETITION_PENALTY => Some(self.repetition_penalty),
            ParameterSet::NOVELTY => Some(self.novelty),
            ParameterSet::TARGET_WORDS => Some(self.target_words),
            _ => name
                .strip_prefix(ParameterSet::VOICE_PREFIX)
                .and_then(|knob| self.voice.get(knob).copied()),
        }
    }
}

/// Evaluator weight table
///
/// Keys are registered evaluator names; weights are renormalized at scoring
/// time over the evaluators that actually ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    #[serde(default = "default_evaluator_weights")]
    pub weights: BTreeMap<String, f64>,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            weights: default_evaluator_weights(),
        }
    }
}

impl EvaluatorConfig {
    /// Weight for a named evaluator, if declared
    pub fn weight_of(&self, name: &str) -> Option<f64> {
        self.weights.get(name).copied()
    }
}

/// Base generation parameters for one content type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseParameters {
    pub temperature: f64,
    pub repetition_penalty: f64,
    pub novelty: f64,
    pub target_words: u32,

    /// Voice-intensity knobs this content type uses
    #[serde(default)]
    pub voice: BTreeMap<String, f64>,
}

impl BaseParameters {
    /// Build the attempt-1 ParameterSet from these defaults
    pub fn to_parameter_set(&self) -> ParameterSet {
        ParameterSet {
            temperature: self.temperature,
            repetition_penalty: self.repetition_penalty,
            novelty: self.novelty,
            target_words: self.target_words,
            voice: self.voice.clone(),
        }
    }
}

fn default_base_threshold() -> f64 {
    0.70
}

fn default_floor_threshold() -> f64 {
    0.55
}

fn default_relaxation_step() -> f64 {
    0.05
}

fn default_max_attempts() -> u32 {
    5
}

fn default_endpoint() -> String {
    "https://api.anthropic.com/v1/messages".to_string()
}

fn default_api_key() -> String {
    env::var("CALLIOPE_API_KEY").unwrap_or_default()
}

fn default_model() -> String {
    "claude-3-5-haiku-20241022".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_transport_retries() -> u32 {
    3
}

fn default_min_samples() -> u32 {
    10
}

fn default_diagnostics_window() -> u32 {
    25
}

fn default_max_concurrent() -> usize {
    4
}

fn default_temperature_range() -> ParameterRange {
    ParameterRange::new(0.0, 2.0)
}

fn default_repetition_range() -> ParameterRange {
    ParameterRange::new(1.0, 2.0)
}

fn default_novelty_range() -> ParameterRange {
    ParameterRange::new(0.0, 1.0)
}

fn default_target_words_range() -> ParameterRange {
    ParameterRange::new(20.0, 600.0)
}

fn default_evaluator_weights() -> BTreeMap<String, f64> {
    let mut weights = BTreeMap::new();
    weights.insert("ai_likelihood".to_string(), 0.40);
    weights.insert("realism".to_string(), 0.35);
    weights.insert("structural_diversity".to_string(), 0.25);
    weights
}

impl EngineConfig {
    /// Load configuration from an optional TOML file layered with
    /// `CALLIOPE`-prefixed environment overrides, then validate
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            tracing::info!("Loading configuration from {:?}", path);
            builder = builder.add_source(config::File::from(path));
        }

        let raw = builder
            .add_source(
                config::Environment::with_prefix("CALLIOPE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: EngineConfig = raw.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Look up base parameters for a content type
    pub fn base_parameters(&self, content_type: &ContentType) -> Result<&BaseParameters> {
        self.content_types
            .get(content_type.as_str())
            .ok_or_else(|| CalliopeError::UnknownContentType(content_type.to_string()))
    }

    /// Fail-fast validation of the whole configuration
    ///
    /// Out-of-range base parameters are configuration errors, never clamped;
    /// clamping only ever applies to incremental retry adjustments.
    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        if !(0.0..=1.0).contains(&t.base) || !(0.0..=1.0).contains(&t.floor) {
            return Err(config_error(format!(
                "thresholds must lie in [0, 1] (base = {}, floor = {})",
                t.base, t.floor
            )));
        }
        if t.floor > t.base {
            return Err(config_error(format!(
                "threshold floor {} exceeds base {}",
                t.floor, t.base
            )));
        }
        if t.relaxation_step < 0.0 {
            return Err(config_error(format!(
                "relaxation_step must be non-negative, got {}",
                t.relaxation_step
            )));
        }
        if t.max_attempts == 0 {
            return Err(config_error("max_attempts must be at least 1".to_string()));
        }

        if self.batch.max_concurrent == 0 {
            return Err(config_error(
                "batch.max_concurrent must be at least 1".to_string(),
            ));
        }

        if self.evaluators.weights.is_empty() {
            return Err(config_error(
                "at least one evaluator weight must be configured".to_string(),
            ));
        }
        for (name, weight) in &self.evaluators.weights {
            if *weight < 0.0 {
                return Err(config_error(format!(
                    "evaluator weight '{}' must be non-negative, got {}",
                    name, weight
                )));
            }
        }
        if self.evaluators.weights.values().sum::<f64>() <= 0.0 {
            return Err(config_error(
                "evaluator weights must not all be zero".to_string(),
            ));
        }

        if self.content_types.is_empty() {
            return Err(config_error(
                "at least one content type must be configured".to_string(),
            ));
        }
        for (name, base) in &self.content_types {
            self.check_base_parameters(name, base)?;
        }

        Ok(())
    }

    /// Range-check one content type's base parameters against the declared
    /// ranges
    fn check_base_parameters(&self, content_type: &str, base: &BaseParameters) -> Result<()> {
        let set = base.to_parameter_set();
        for (param, value) in set.named_values() {
            let range = self.ranges.range_of(&param).ok_or_else(|| {
                config_error(format!(
                    "content type '{}' uses parameter '{}' with no declared range",
                    content_type, param
                ))
            })?;
            if !range.contains(value) {
                return Err(CalliopeError::InvalidParameter {
                    name: format!("{}.{}", content_type, param),
                    value,
                    min: range.min,
                    max: range.max,
                });
            }
        }
        Ok(())
    }
}

fn config_error(message: String) -> CalliopeError {
    CalliopeError::Config(config::ConfigError::Message(message))
}

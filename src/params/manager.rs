//! Parameter derivation for one generation call
//!
//! Attempt 1 merges the content-type defaults with any sweet-spot
//! recommendation for the (content-type, context) bucket; a concrete value is
//! sampled uniformly within the recommended range so the exact knobs still
//! land in the attempt log. Attempts after the first start from the prior
//! attempt's parameters and apply directional adjustments keyed to the prior
//! attempt's diagnostics. Adjustments clamp to each parameter's declared
//! range; out-of-range base configuration was already rejected at load time.

use crate::error::Result;
use crate::params::store::ParameterStore;
use crate::types::{
    ContentType, ContextKey, Diagnostic, GenerationAttempt, ParameterSet, RejectionReason,
    SweetSpotRecommendation,
};
use rand::Rng;
use tracing::debug;

/// Repetition-penalty increase when stock phrasing or repeated openers recur
const REPETITION_STEP: f64 = 0.08;

/// Novelty-pressure increase for lexical AI tells (stock phrases, hedging)
const NOVELTY_STEP: f64 = 0.10;

/// Temperature increase when sentence structure reads too uniform
const TEMPERATURE_STEP: f64 = 0.10;

/// Temperature decrease when a subjective rubric dimension scored poorly
const RUBRIC_TEMPERATURE_STEP: f64 = 0.08;

/// Length-budget growth factor after a truncated attempt
const LENGTH_GROWTH: f64 = 1.25;

/// Step multiplier when the same failure category keeps recurring in the
/// bucket's recent history
const HISTORY_BOOST: f64 = 1.5;

/// Recent-history occurrences of a category before the boost kicks in
const REPEAT_FAILURE_MIN: usize = 2;

/// Temperature/novelty jitter when an attempt was rejected without any
/// actionable diagnostic
const EXPLORATION_JITTER: f64 = 0.05;

/// Derives the concrete [`ParameterSet`] for each attempt
#[derive(Debug, Clone)]
pub struct ParameterManager {
    store: ParameterStore,
}

impl ParameterManager {
    pub fn new(store: ParameterStore) -> Self {
        Self { store }
    }

    /// Produce a fresh parameter set for the given attempt index
    ///
    /// `recommendation` and `recent` carry the bucket's mined history; both
    /// are resolved by the caller so derivation itself stays synchronous and
    /// free of I/O. The returned set is always within declared ranges.
    pub fn derive(
        &self,
        content_type: &ContentType,
        context: &ContextKey,
        attempt_index: u32,
        prior: Option<&GenerationAttempt>,
        recommendation: Option<&SweetSpotRecommendation>,
        recent: &[Diagnostic],
    ) -> Result<ParameterSet> {
        match prior {
            None => self.derive_initial(content_type, context, recommendation),
            Some(prior) => Ok(self.derive_adjusted(content_type, attempt_index, prior, recent)),
        }
    }

    /// Attempt-1 parameters: defaults, overridden by a sweet-spot
    /// recommendation when one exists for the bucket
    fn derive_initial(
        &self,
        content_type: &ContentType,
        context: &ContextKey,
        recommendation: Option<&SweetSpotRecommendation>,
    ) -> Result<ParameterSet> {
        let mut params = self.store.base_for(content_type)?;

        if let Some(rec) = recommendation {
            debug!(
                content_type = %content_type,
                context = %context,
                samples = rec.sample_count,
                "Applying sweet-spot recommendation"
            );

            let mut rng = rand::thread_rng();
            for (name, recommended) in &rec.ranges {
                let Some(valid) = self.store.range_of(name) else {
                    continue;
                };
                let lo = valid.clamp(recommended.min);
                let hi = valid.clamp(recommended.max);
                if lo > hi {
                    continue;
                }
                let value = if lo == hi { lo } else { rng.gen_range(lo..=hi) };
                set_value(&mut params, name, value);
            }
        }

        Ok(params)
    }

    /// Retry parameters: the prior attempt's set plus directional
    /// adjustments keyed to its diagnostics, clamped to declared ranges
    fn derive_adjusted(
        &self,
        content_type: &ContentType,
        attempt_index: u32,
        prior: &GenerationAttempt,
        recent: &[Diagnostic],
    ) -> ParameterSet {
        let mut params = prior.parameters.clone();
        let mut adjusted = false;

        for category in distinct_categories(&prior.diagnostics) {
            let boost = self.history_boost(category, recent);

            match category {
                "stock_phrases" => {
                    self.bump(&mut params, ParameterSet::REPETITION_PENALTY, REPETITION_STEP * boost);
                    self.bump(&mut params, ParameterSet::NOVELTY, NOVELTY_STEP * boost);
                }
                "hedging_density" => {
                    self.bump(&mut params, ParameterSet::NOVELTY, NOVELTY_STEP * boost);
                }
                "repeated_openers" => {
                    self.bump(&mut params, ParameterSet::TEMPERATURE, TEMPERATURE_STEP * boost);
                    self.bump(&mut params, ParameterSet::REPETITION_PENALTY, REPETITION_STEP * boost);
                }
                "uniform_sentences" => {
                    self.bump(&mut params, ParameterSet::TEMPERATURE, TEMPERATURE_STEP * boost);
                }
                "low_rubric_dimension" => {
                    self.bump(&mut params, ParameterSet::TEMPERATURE, -RUBRIC_TEMPERATURE_STEP * boost);
                }
                "length_out_of_range" => {
                    if let Some(target) = length_correction(&prior.diagnostics) {
                        self.set_target_words(&mut params, target);
                    }
                }
                "truncated" => {
                    let grown = f64::from(params.target_words) * LENGTH_GROWTH;
                    self.set_target_words(&mut params, grown);
                }
                _ => continue,
            }
            adjusted = true;
        }

        // A truncation rejection always grows the length budget, even when
        // the validator produced no diagnostic payload
        if prior.rejection == Some(RejectionReason::Incomplete)
            && !has_category(&prior.diagnostics, "truncated")
        {
            let grown = f64::from(params.target_words) * LENGTH_GROWTH;
            self.set_target_words(&mut params, grown);
            adjusted = true;
        }

        // Rejected with nothing actionable: explore nearby settings rather
        // than regenerate with identical knobs
        if !adjusted {
            let mut rng = rand::thread_rng();
            let jitter = rng.gen_range(-EXPLORATION_JITTER..=EXPLORATION_JITTER);
            self.bump(&mut params, ParameterSet::TEMPERATURE, jitter);
            let jitter = rng.gen_range(-EXPLORATION_JITTER..=EXPLORATION_JITTER);
            self.bump(&mut params, ParameterSet::NOVELTY, jitter);
        }

        debug!(
            content_type = %content_type,
            attempt = attempt_index,
            temperature = params.temperature,
            repetition_penalty = params.repetition_penalty,
            novelty = params.novelty,
            target_words = params.target_words,
            "Derived retry parameters"
        );

        params
    }

    /// Multiplier for a step when the category keeps recurring in the
    /// bucket's recent attempts
    fn history_boost(&self, category: &str, recent: &[Diagnostic]) -> f64 {
        let occurrences = recent.iter().filter(|d| d.category() == category).count();
        if occurrences >= REPEAT_FAILURE_MIN {
            HISTORY_BOOST
        } else {
            1.0
        }
    }

    /// Add a delta to a named parameter, clamped to its declared range
    fn bump(&self, params: &mut ParameterSet, name: &str, delta: f64) {
        if let Some(current) = params.value_of(name) {
            set_value(params, name, self.store.clamp(name, current + delta));
        }
    }

    fn set_target_words(&self, params: &mut ParameterSet, target: f64) {
        let clamped = self.store.clamp(ParameterSet::TARGET_WORDS, target);
        params.target_words = clamped.round().max(1.0) as u32;
    }
}

/// Write a flat-namespace value back into the set
///
/// Voice knobs are only updated when the content type already carries them;
/// a recommendation never introduces a knob the type does not use.
fn set_value(params: &mut ParameterSet, name: &str, value: f64) {
    match name {
        ParameterSet::TEMPERATURE => params.temperature = value,
        ParameterSet::REPETITION_PENALTY => params.repetition_penalty = value,
        ParameterSet::NOVELTY => params.novelty = value,
        ParameterSet::TARGET_WORDS => params.target_words = value.round().max(1.0) as u32,
        _ => {
            if let Some(knob) = name.strip_prefix(ParameterSet::VOICE_PREFIX) {
                if params.voice.contains_key(knob) {
                    params.voice.insert(knob.to_string(), value);
                }
            }
        }
    }
}

/// Diagnostic categories in first-seen order, deduplicated
fn distinct_categories(diagnostics: &[Diagnostic]) -> Vec<&'static str> {
    let mut seen = Vec::new();
    for diag in diagnostics {
        let category = diag.category();
        if !seen.contains(&category) {
            seen.push(category);
        }
    }
    seen
}

fn has_category(diagnostics: &[Diagnostic], category: &str) -> bool {
    diagnostics.iter().any(|d| d.category() == category)
}

/// Damped length correction: move the request halfway toward compensating
/// the observed error
fn length_correction(diagnostics: &[Diagnostic]) -> Option<f64> {
    diagnostics.iter().find_map(|d| match d {
        Diagnostic::LengthOutOfRange {
            actual_words,
            target_words,
        } => {
            let target = f64::from(*target_words);
            let actual = f64::from(*actual_words);
            Some(target + (target - actual) / 2.0)
        }
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BaseParameters, EngineConfig};
    use crate::types::{AttemptId, ItemId, ParameterRange};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn test_manager() -> ParameterManager {
        let mut cfg = EngineConfig::default();
        cfg.content_types.insert(
            "description".to_string(),
            BaseParameters {
                temperature: 0.85,
                repetition_penalty: 1.15,
                novelty: 0.30,
                target_words: 120,
                voice: BTreeMap::new(),
            },
        );
        ParameterManager::new(ParameterStore::new(&cfg))
    }

    fn prior_attempt(
        params: ParameterSet,
        diagnostics: Vec<Diagnostic>,
        rejection: RejectionReason,
    ) -> GenerationAttempt {
        GenerationAttempt {
            id: AttemptId::new(),
            item_id: ItemId::new(),
            content_type: ContentType::new("description"),
            context: ContextKey::global(),
            attempt_index: 1,
            parameters: params,
            text: "Draft text.".to_string(),
            complete: rejection != RejectionReason::Incomplete,
            evaluations: vec![],
            diagnostics,
            composite_score: Some(0.5),
            effective_threshold: 0.7,
            accepted: false,
            rejection: Some(rejection),
            created_at: Utc::now(),
        }
    }

    fn base_params() -> ParameterSet {
        ParameterSet {
            temperature: 0.85,
            repetition_penalty: 1.15,
            novelty: 0.30,
            target_words: 120,
            voice: BTreeMap::new(),
        }
    }

    #[test]
    fn test_attempt_one_without_recommendation_uses_defaults() {
        let manager = test_manager();
        let params = manager
            .derive(
                &ContentType::new("description"),
                &ContextKey::global(),
                1,
                None,
                None,
                &[],
            )
            .unwrap();

        assert_eq!(params, base_params());
    }

    #[test]
    fn test_attempt_one_samples_within_recommended_range() {
        let manager = test_manager();
        let mut ranges = BTreeMap::new();
        ranges.insert(
            "temperature".to_string(),
            ParameterRange::new(0.60, 0.70),
        );
        let rec = SweetSpotRecommendation {
            content_type: ContentType::new("description"),
            context: ContextKey::global(),
            ranges,
            sample_count: 12,
        };

        for _ in 0..20 {
            let params = manager
                .derive(
                    &ContentType::new("description"),
                    &ContextKey::global(),
                    1,
                    None,
                    Some(&rec),
                    &[],
                )
                .unwrap();
            assert!(params.temperature >= 0.60 && params.temperature <= 0.70);
            // Parameters without a recommended range keep their defaults
            assert_eq!(params.target_words, 120);
        }
    }

    #[test]
    fn test_recommendation_clamped_to_declared_range() {
        let manager = test_manager();
        let mut ranges = BTreeMap::new();
        // Declared temperature range tops out at 2.0
        ranges.insert("temperature".to_string(), ParameterRange::new(1.9, 9.0));
        let rec = SweetSpotRecommendation {
            content_type: ContentType::new("description"),
            context: ContextKey::global(),
            ranges,
            sample_count: 15,
        };

        let params = manager
            .derive(
                &ContentType::new("description"),
                &ContextKey::global(),
                1,
                None,
                Some(&rec),
                &[],
            )
            .unwrap();
        assert!(params.temperature >= 1.9 && params.temperature <= 2.0);
    }

    #[test]
    fn test_stock_phrases_raise_repetition_and_novelty() {
        let manager = test_manager();
        let prior = prior_attempt(
            base_params(),
            vec![Diagnostic::StockPhrases {
                phrases: vec!["delve into".to_string()],
            }],
            RejectionReason::BelowThreshold,
        );

        let params = manager
            .derive(
                &ContentType::new("description"),
                &ContextKey::global(),
                2,
                Some(&prior),
                None,
                &[],
            )
            .unwrap();

        assert!(params.repetition_penalty > prior.parameters.repetition_penalty);
        assert!(params.novelty > prior.parameters.novelty);
        assert_eq!(params.temperature, prior.parameters.temperature);
    }

    #[test]
    fn test_truncation_grows_length_budget() {
        let manager = test_manager();
        let prior = prior_attempt(
            base_params(),
            vec![Diagnostic::Truncated {
                tail: "and the".to_string(),
            }],
            RejectionReason::Incomplete,
        );

        let params = manager
            .derive(
                &ContentType::new("description"),
                &ContextKey::global(),
                2,
                Some(&prior),
                None,
                &[],
            )
            .unwrap();

        assert_eq!(params.target_words, 150);
    }

    #[test]
    fn test_incomplete_rejection_without_diagnostic_still_grows_budget() {
        let manager = test_manager();
        let prior = prior_attempt(base_params(), vec![], RejectionReason::Incomplete);

        let params = manager
            .derive(
                &ContentType::new("description"),
                &ContextKey::global(),
                2,
                Some(&prior),
                None,
                &[],
            )
            .unwrap();

        assert_eq!(params.target_words, 150);
    }

    #[test]
    fn test_length_correction_is_damped() {
        let manager = test_manager();
        let prior = prior_attempt(
            base_params(),
            vec![Diagnostic::LengthOutOfRange {
                actual_words: 40,
                target_words: 120,
            }],
            RejectionReason::BelowThreshold,
        );

        let params = manager
            .derive(
                &ContentType::new("description"),
                &ContextKey::global(),
                2,
                Some(&prior),
                None,
                &[],
            )
            .unwrap();

        // 120 + (120 - 40) / 2
        assert_eq!(params.target_words, 160);
    }

    #[test]
    fn test_adjustments_clamp_at_range_edge() {
        let manager = test_manager();
        let mut at_max = base_params();
        at_max.temperature = 2.0;
        let prior = prior_attempt(
            at_max,
            vec![Diagnostic::UniformSentences {
                mean_words: 14.0,
                std_dev: 0.5,
            }],
            RejectionReason::BelowThreshold,
        );

        let params = manager
            .derive(
                &ContentType::new("description"),
                &ContextKey::global(),
                2,
                Some(&prior),
                None,
                &[],
            )
            .unwrap();

        assert_eq!(params.temperature, 2.0);
    }

    #[test]
    fn test_recurring_failure_boosts_step() {
        let manager = test_manager();
        let diag = Diagnostic::StockPhrases {
            phrases: vec!["in today's world".to_string()],
        };
        let prior = prior_attempt(
            base_params(),
            vec![diag.clone()],
            RejectionReason::BelowThreshold,
        );

        let plain = manager
            .derive(
                &ContentType::new("description"),
                &ContextKey::global(),
                2,
                Some(&prior),
                None,
                &[],
            )
            .unwrap();

        let boosted = manager
            .derive(
                &ContentType::new("description"),
                &ContextKey::global(),
                2,
                Some(&prior),
                None,
                &[diag.clone(), diag.clone()],
            )
            .unwrap();

        assert!(boosted.repetition_penalty > plain.repetition_penalty);
        assert!(boosted.novelty > plain.novelty);
    }

    #[test]
    fn test_rejection_without_diagnostics_jitters_exploration() {
        let manager = test_manager();
        let prior = prior_attempt(base_params(), vec![], RejectionReason::BelowThreshold);

        let params = manager
            .derive(
                &ContentType::new("description"),
                &ContextKey::global(),
                2,
                Some(&prior),
                None,
                &[],
            )
            .unwrap();

        // Jitter stays inside the declared ranges and near the prior values
        assert!((params.temperature - 0.85).abs() <= EXPLORATION_JITTER + 1e-9);
        assert!((params.novelty - 0.30).abs() <= EXPLORATION_JITTER + 1e-9);
        assert_eq!(params.target_words, 120);
    }
}

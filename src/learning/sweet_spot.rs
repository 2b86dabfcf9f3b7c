//! Sweet-spot mining over the attempt log
//!
//! For a (content-type, context) bucket, computes the parameter ranges that
//! historically accepted attempts used. Acceptance is the stored flag, i.e.
//! the threshold in force when each attempt was recorded, so recomputing
//! today never rewrites history. Range per parameter is mean plus/minus one
//! standard deviation of the qualifying values; min/max would chase
//! outliers, and a point estimate would overfit.

use crate::error::Result;
use crate::learning::store::AttemptStore;
use crate::types::{ContentType, ContextKey, ParameterRange, SweetSpotRecommendation};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Mines accepted attempts into parameter recommendations
#[derive(Clone)]
pub struct SweetSpotAnalyzer {
    store: Arc<AttemptStore>,
    min_samples: u32,
}

impl SweetSpotAnalyzer {
    pub fn new(store: Arc<AttemptStore>, min_samples: u32) -> Self {
        Self { store, min_samples }
    }

    /// Recommendation for a bucket, or None below the sample minimum
    ///
    /// An under-sampled recommendation is worse than none: callers fall
    /// back to configured defaults when this returns None.
    pub async fn recommend(
        &self,
        content_type: &ContentType,
        context: &ContextKey,
    ) -> Result<Option<SweetSpotRecommendation>> {
        let sets = self.store.accepted_parameters(content_type, context).await?;
        let sample_count = sets.len() as u32;

        if sample_count < self.min_samples {
            debug!(
                content_type = %content_type,
                context = %context,
                samples = sample_count,
                required = self.min_samples,
                "Too few accepted attempts for a recommendation"
            );
            return Ok(None);
        }

        // Parameter names come from the first qualifying set; all sets in a
        // bucket share one content type and therefore one knob shape
        let mut ranges = BTreeMap::new();
        for (name, _) in sets[0].named_values() {
            let values: Vec<f64> = sets.iter().filter_map(|s| s.value_of(&name)).collect();
            if values.is_empty() {
                continue;
            }

            let (mean, std_dev) = mean_and_std(&values);
            ranges.insert(name, ParameterRange::new(mean - std_dev, mean + std_dev));
        }

        debug!(
            content_type = %content_type,
            context = %context,
            samples = sample_count,
            parameters = ranges.len(),
            "Computed sweet-spot recommendation"
        );

        Ok(Some(SweetSpotRecommendation {
            content_type: content_type.clone(),
            context: context.clone(),
            ranges,
            sample_count,
        }))
    }
}

/// Mean and population standard deviation
fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::store::ConnectionMode;
    use crate::types::{
        AttemptId, EvaluatorResult, GenerationAttempt, ItemId, ParameterSet, RejectionReason,
    };
    use chrono::Utc;

    fn attempt(temperature: f64, accepted: bool) -> GenerationAttempt {
        GenerationAttempt {
            id: AttemptId::new(),
            item_id: ItemId::new(),
            content_type: ContentType::new("description"),
            context: ContextKey::new("materials"),
            attempt_index: 1,
            parameters: ParameterSet {
                temperature,
                repetition_penalty: 1.1,
                novelty: 0.3,
                target_words: 120,
                voice: std::collections::BTreeMap::new(),
            },
            text: "Copy.".to_string(),
            complete: true,
            evaluations: vec![EvaluatorResult::new("ai_likelihood", 80.0, 0.8, vec![])],
            diagnostics: vec![],
            composite_score: Some(if accepted { 0.8 } else { 0.5 }),
            effective_threshold: 0.7,
            accepted,
            rejection: if accepted {
                None
            } else {
                Some(RejectionReason::BelowThreshold)
            },
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_recommendation_gated_below_minimum() {
        let store = Arc::new(AttemptStore::open(ConnectionMode::InMemory).await.unwrap());
        let analyzer = SweetSpotAnalyzer::new(store.clone(), 10);

        for _ in 0..9 {
            store.append(&attempt(0.8, true)).await.unwrap();
        }

        let rec = analyzer
            .recommend(&ContentType::new("description"), &ContextKey::new("materials"))
            .await
            .unwrap();
        assert!(rec.is_none());
    }

    #[tokio::test]
    async fn test_recommendation_from_accepted_attempts_only() {
        let store = Arc::new(AttemptStore::open(ConnectionMode::InMemory).await.unwrap());
        let analyzer = SweetSpotAnalyzer::new(store.clone(), 10);

        // Accepted attempts cluster around 0.8
        for temperature in [0.75, 0.78, 0.80, 0.80, 0.82, 0.85, 0.79, 0.81, 0.77, 0.83] {
            store.append(&attempt(temperature, true)).await.unwrap();
        }
        // Rejected outliers must not widen the range
        store.append(&attempt(1.9, false)).await.unwrap();
        store.append(&attempt(0.1, false)).await.unwrap();

        let rec = analyzer
            .recommend(&ContentType::new("description"), &ContextKey::new("materials"))
            .await
            .unwrap()
            .expect("Should recommend with 10 accepted samples");

        assert_eq!(rec.sample_count, 10);

        let range = rec.ranges.get("temperature").expect("temperature range");
        assert!(range.min > 0.7 && range.min < 0.8);
        assert!(range.max > 0.8 && range.max < 0.9);

        // Fixed-value parameters collapse to a degenerate range
        let rep = rec.ranges.get("repetition_penalty").unwrap();
        assert!((rep.min - 1.1).abs() < 1e-9);
        assert!((rep.max - 1.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_buckets_are_independent() {
        let store = Arc::new(AttemptStore::open(ConnectionMode::InMemory).await.unwrap());
        let analyzer = SweetSpotAnalyzer::new(store.clone(), 2);

        for _ in 0..3 {
            store.append(&attempt(0.8, true)).await.unwrap();
        }

        let other = analyzer
            .recommend(&ContentType::new("description"), &ContextKey::new("compounds"))
            .await
            .unwrap();
        assert!(other.is_none());
    }

    #[test]
    fn test_mean_and_std() {
        let (mean, std_dev) = mean_and_std(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((mean - 5.0).abs() < 1e-9);
        assert!((std_dev - 2.0).abs() < 1e-9);
    }
}

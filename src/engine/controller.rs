//! Accept/retry/exhaust decision logic
//!
//! Pure state-machine decisions with no I/O: the threshold schedule and the
//! verdict for one scored attempt. Persistence lives in the learning
//! integrator so this logic unit-tests without a database.

use crate::config::ThresholdConfig;
use crate::types::RejectionReason;

/// Verdict for one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Attempt met its effective threshold
    Accept,

    /// Rejected with budget remaining; derive new parameters and loop
    Retry(RejectionReason),

    /// Rejected on the final attempt; surface exhaustion to the caller
    Exhaust(RejectionReason),
}

/// Threshold schedule and attempt budget
#[derive(Debug, Clone)]
pub struct RetryController {
    base: f64,
    floor: f64,
    relaxation_step: f64,
    max_attempts: u32,
}

impl RetryController {
    pub fn new(thresholds: &ThresholdConfig) -> Self {
        Self {
            base: thresholds.base,
            floor: thresholds.floor,
            relaxation_step: thresholds.relaxation_step,
            max_attempts: thresholds.max_attempts,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Acceptance bar for a 1-based attempt index
    ///
    /// Starts at the base threshold and relaxes by one step per later
    /// attempt, never dropping below the floor. Monotonically
    /// non-increasing in the attempt index.
    pub fn effective_threshold(&self, attempt_index: u32) -> f64 {
        let relaxed =
            self.base - self.relaxation_step * f64::from(attempt_index.saturating_sub(1));
        relaxed.max(self.floor)
    }

    /// Decide the verdict for one attempt
    ///
    /// Incomplete output is an automatic reject regardless of any score;
    /// otherwise accept iff the composite meets the effective threshold
    /// for this attempt index.
    pub fn decide(
        &self,
        attempt_index: u32,
        complete: bool,
        composite: Option<f64>,
    ) -> Decision {
        let threshold = self.effective_threshold(attempt_index);

        let rejection = if !complete {
            Some(RejectionReason::Incomplete)
        } else {
            match composite {
                Some(score) if score >= threshold => None,
                _ => Some(RejectionReason::BelowThreshold),
            }
        };

        match rejection {
            None => Decision::Accept,
            Some(reason) if attempt_index < self.max_attempts => Decision::Retry(reason),
            Some(reason) => Decision::Exhaust(reason),
        }
    }
}

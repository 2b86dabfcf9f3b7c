//! Lexical AI-likelihood detector
//!
//! Scores how human the candidate text reads, on a 0-100 likelihood scale,
//! by scanning for the phrasing tics of machine-generated copy:
//! - Stock phrases ("delve into", "rich tapestry", "look no further")
//! - Hedging density (qualifiers per hundred words above tolerance)
//!
//! Runs entirely locally; this evaluator is never unavailable.

use crate::error::Result;
use crate::quality::Evaluator;
use crate::types::{ContextKey, Diagnostic, EvaluatorResult};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

/// Points deducted per distinct stock phrase found
const STOCK_PHRASE_PENALTY: f64 = 12.0;

/// Hedging qualifiers per hundred words tolerated before deductions start
const HEDGE_TOLERANCE: f64 = 2.0;

/// Points deducted per excess hedge per hundred words
const HEDGE_PENALTY: f64 = 6.0;

/// Stock phrases characteristic of machine-generated copy
const STOCK_PHRASES: &[&str] = &[
    "delve into",
    "delves into",
    "rich tapestry",
    "a testament to",
    "in today's fast-paced",
    "it's important to note",
    "it is important to note",
    "in the ever-evolving",
    "unlock the potential",
    "unlock the full potential",
    "elevate your",
    "look no further",
    "in conclusion",
    "seamlessly blends",
    "game-changer",
    "revolutionize the way",
];

/// Single-word hedging qualifiers
const HEDGE_WORDS: &[&str] = &[
    "might", "perhaps", "possibly", "arguably", "somewhat", "relatively", "generally",
    "typically", "often", "usually", "likely", "maybe",
];

/// Detects AI-tendency phrasing in candidate text
pub struct AiLikelihoodEvaluator {
    word_boundary: &'static Regex,
}

impl AiLikelihoodEvaluator {
    pub fn new() -> Self {
        static WORD_BOUNDARY: Lazy<Regex> =
            Lazy::new(|| Regex::new(r"\b[\w']+\b").expect("Valid word boundary regex"));

        Self {
            word_boundary: &WORD_BOUNDARY,
        }
    }

    fn analyze(&self, text: &str) -> EvaluatorResult {
        let lower = text.to_lowercase();

        let word_count = self.word_boundary.find_iter(&lower).count();
        if word_count == 0 {
            return EvaluatorResult::new("ai_likelihood", 0.0, 0.0, vec![]);
        }

        let found: Vec<String> = STOCK_PHRASES
            .iter()
            .filter(|phrase| lower.contains(*phrase))
            .map(|phrase| phrase.to_string())
            .collect();

        let hedge_count = self
            .word_boundary
            .find_iter(&lower)
            .filter(|m| HEDGE_WORDS.contains(&m.as_str()))
            .count();
        let per_hundred_words = hedge_count as f64 / word_count as f64 * 100.0;

        let mut raw = 100.0;
        raw -= found.len() as f64 * STOCK_PHRASE_PENALTY;
        raw -= (per_hundred_words - HEDGE_TOLERANCE).max(0.0) * HEDGE_PENALTY;
        let raw = raw.clamp(0.0, 100.0);

        let mut diagnostics = Vec::new();
        if !found.is_empty() {
            diagnostics.push(Diagnostic::StockPhrases { phrases: found });
        }
        if per_hundred_words > HEDGE_TOLERANCE {
            diagnostics.push(Diagnostic::HedgingDensity { per_hundred_words });
        }

        EvaluatorResult::new("ai_likelihood", raw, raw / 100.0, diagnostics)
    }
}

impl Default for AiLikelihoodEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Evaluator for AiLikelihoodEvaluator {
    fn name(&self) -> &str {
        "ai_likelihood"
    }

    async fn score(&self, text: &str, _context: &ContextKey) -> Result<EvaluatorResult> {
        Ok(self.analyze(text))
    }
}

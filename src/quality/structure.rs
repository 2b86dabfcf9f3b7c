//! Structural diversity evaluator
//!
//! Measures whether the candidate's sentences vary the way human prose
//! does: different openers, uneven lengths. Native scale is already [0, 1].
//! Runs entirely locally; this evaluator is never unavailable.

use crate::error::Result;
use crate::quality::Evaluator;
use crate::types::{ContextKey, Diagnostic, EvaluatorResult};
use async_trait::async_trait;

/// Characters that end a sentence
const TERMINAL_CHARS: [char; 4] = ['.', '!', '?', '…'];

/// Below this many sentences diversity cannot be assessed; short texts
/// score trivially diverse
const MIN_SENTENCES: usize = 2;

/// Sentence-length coefficient of variation treated as fully varied
const CV_TARGET: f64 = 0.35;

/// Below this coefficient of variation, sentence lengths read as machined
const CV_FLOOR: f64 = 0.18;

/// Sentences needed before uniformity is diagnosed
const MIN_SENTENCES_FOR_UNIFORMITY: usize = 3;

/// Times an opening word must repeat before it is diagnosed
const REPEATED_OPENER_MIN: usize = 3;

/// Scores sentence-shape variety in candidate text
#[derive(Debug, Clone, Default)]
pub struct StructuralDiversityEvaluator;

impl StructuralDiversityEvaluator {
    pub fn new() -> Self {
        Self
    }

    fn analyze(&self, text: &str) -> EvaluatorResult {
        let sentences = split_sentences(text);
        if sentences.len() < MIN_SENTENCES {
            return EvaluatorResult::new("structural_diversity", 1.0, 1.0, vec![]);
        }

        let lengths: Vec<f64> = sentences
            .iter()
            .map(|s| s.split_whitespace().count() as f64)
            .collect();
        let mean = lengths.iter().sum::<f64>() / lengths.len() as f64;
        let variance =
            lengths.iter().map(|l| (l - mean).powi(2)).sum::<f64>() / lengths.len() as f64;
        let std_dev = variance.sqrt();
        let cv = if mean > 0.0 { std_dev / mean } else { 0.0 };

        let openers: Vec<String> = sentences
            .iter()
            .filter_map(|s| s.split_whitespace().next())
            .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|w| !w.is_empty())
            .collect();
        let mut distinct = openers.clone();
        distinct.sort();
        distinct.dedup();

        let opener_diversity = distinct.len() as f64 / openers.len().max(1) as f64;
        let length_variation = (cv / CV_TARGET).min(1.0);
        let raw = (opener_diversity + length_variation) / 2.0;

        let mut diagnostics = Vec::new();

        let repeated: Vec<String> = distinct
            .iter()
            .filter(|opener| {
                openers.iter().filter(|o| o == opener).count() >= REPEATED_OPENER_MIN
            })
            .cloned()
            .collect();
        if !repeated.is_empty() {
            diagnostics.push(Diagnostic::RepeatedOpeners { openers: repeated });
        }

        if sentences.len() >= MIN_SENTENCES_FOR_UNIFORMITY && cv < CV_FLOOR {
            diagnostics.push(Diagnostic::UniformSentences {
                mean_words: mean,
                std_dev,
            });
        }

        EvaluatorResult::new("structural_diversity", raw, raw, diagnostics)
    }
}

#[async_trait]
impl Evaluator for StructuralDiversityEvaluator {
    fn name(&self) -> &str {
        "structural_diversity"
    }

    async fn score(&self, text: &str, _context: &ContextKey) -> Result<EvaluatorResult> {
        Ok(self.analyze(text))
    }
}

/// Split text into sentences on terminal punctuation, keeping a trailing
/// unterminated fragment as a sentence
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    for c in text.chars() {
        if TERMINAL_CHARS.contains(&c) {
            let sentence = current.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_string());
            }
            current.clear();
        } else {
            current.push(c);
        }
    }

    let tail = current.trim();
    if !tail.is_empty() {
        sentences.push(tail.to_string());
    }

    sentences
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_varied_prose_scores_high() {
        let evaluator = StructuralDiversityEvaluator::new();
        let text = "Crews tried every coating on the market. Nothing held past a season \
                    until this formulation arrived. Third year now, zero flaking.";

        let result = evaluator.score(text, &ContextKey::global()).await.unwrap();
        assert!(result.normalized >= 0.7);
        assert!(result.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_machined_prose_scores_low() {
        let evaluator = StructuralDiversityEvaluator::new();
        let text = "It cleans fast. It dries clear. It lasts long.";

        let result = evaluator.score(text, &ContextKey::global()).await.unwrap();
        assert!(result.normalized < 0.3);

        assert!(result
            .diagnostics
            .iter()
            .any(|d| matches!(d, Diagnostic::UniformSentences { .. })));
        let openers = result
            .diagnostics
            .iter()
            .find_map(|d| match d {
                Diagnostic::RepeatedOpeners { openers } => Some(openers.clone()),
                _ => None,
            })
            .expect("Should flag the repeated opener");
        assert_eq!(openers, vec!["it".to_string()]);
    }

    #[tokio::test]
    async fn test_single_sentence_trivially_diverse() {
        let evaluator = StructuralDiversityEvaluator::new();
        let result = evaluator
            .score("Built tough.", &ContextKey::global())
            .await
            .unwrap();

        assert_eq!(result.normalized, 1.0);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn test_sentence_splitting() {
        let sentences = split_sentences("First here. Second there! Third where? Trailing tail");
        assert_eq!(sentences.len(), 4);
        assert_eq!(sentences[3], "Trailing tail");

        assert!(split_sentences("").is_empty());
        assert!(split_sentences("...").is_empty());
    }
}

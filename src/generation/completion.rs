//! Truncation detection for generated text
//!
//! Runs before any quality scoring: an incomplete result is an automatic
//! reject for the attempt, with a length-focused adjustment fed into the
//! next parameter derivation instead of a full evaluation pass.

use crate::types::Diagnostic;

/// Characters that end a sentence
const TERMINAL_CHARS: [char; 4] = ['.', '!', '?', '…'];

/// Closing marks that may legitimately follow terminal punctuation
const CLOSING_CHARS: [char; 6] = ['"', '\'', '\u{201d}', '\u{2019}', ')', ']'];

/// Final sentences shorter than this, in a multi-sentence text, read as an
/// emergency stop rather than an intentional short closer. Two-word closers
/// ("Ships today.") are a deliberate marketing register and stay valid.
const MIN_FINAL_SENTENCE_WORDS: usize = 2;

/// How many trailing words the truncation diagnostic carries
const TAIL_WORDS: usize = 8;

/// Detects truncated or abruptly cut-off output
#[derive(Debug, Clone, Default)]
pub struct CompletionValidator;

impl CompletionValidator {
    pub fn new() -> Self {
        Self
    }

    /// Whether the text reads as a finished piece of prose
    ///
    /// Incomplete when the text does not end in terminal punctuation, or
    /// when a multi-sentence text closes with an implausibly short final
    /// sentence. A single short sentence is never flagged; taglines are
    /// intentionally terse.
    pub fn is_complete(&self, text: &str) -> bool {
        let trimmed = strip_closing(text.trim_end());
        if trimmed.is_empty() {
            return false;
        }

        let Some(last) = trimmed.chars().last() else {
            return false;
        };
        if !TERMINAL_CHARS.contains(&last) {
            return false;
        }

        // Text within the final terminal mark
        let body = trimmed.trim_end_matches(|c| TERMINAL_CHARS.contains(&c));
        match body.rfind(|c| TERMINAL_CHARS.contains(&c)) {
            Some(idx) => {
                let final_sentence = &body[idx + last_char_len(body, idx)..];
                word_count(final_sentence) >= MIN_FINAL_SENTENCE_WORDS
            }
            // Single sentence: an intentional short closer, not a cutoff
            None => true,
        }
    }

    /// Truncation diagnostic for an incomplete text, carrying the tail that
    /// was cut off
    pub fn check(&self, text: &str) -> Option<Diagnostic> {
        if self.is_complete(text) {
            return None;
        }

        Some(Diagnostic::Truncated {
            tail: trailing_words(text, TAIL_WORDS),
        })
    }
}

/// Strip trailing quote/bracket marks so `he said."` reads as terminal
fn strip_closing(text: &str) -> &str {
    text.trim_end_matches(|c| CLOSING_CHARS.contains(&c))
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Byte length of the char starting at `idx`
fn last_char_len(text: &str, idx: usize) -> usize {
    text[idx..].chars().next().map_or(1, |c| c.len_utf8())
}

/// The last `limit` whitespace-separated words of the text
fn trailing_words(text: &str, limit: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    let start = words.len().saturating_sub(limit);
    words[start..].join(" ")
}

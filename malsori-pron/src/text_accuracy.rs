//! Word-level accuracy between an expected sentence and a transcript
//!
//! A coarser measure than phoneme scoring, used when the acoustic model
//! is unavailable but a speech-to-text transcript exists.

use serde::Serialize;

use crate::scoring::{accuracy_percent, edit_distance, round_to, traceback_ops, EditCounts};

/// Hesitation sounds dropped when `ignore_fillers` is set
pub const FILLER_WORDS: [&str; 7] = ["음", "어", "아", "그", "저", "음음", "어어"];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordAccuracy {
    /// 0-100, one decimal place
    pub accuracy: f64,
    /// Word error rate, four decimal places
    pub wer: f64,
    pub matches: usize,
    pub substitutions: usize,
    pub insertions: usize,
    pub deletions: usize,
    pub expected_words: Vec<String>,
    pub spoken_words: Vec<String>,
}

/// Lower-cased, punctuation-free whitespace tokens
pub fn normalize_words(text: &str, ignore_fillers: bool) -> Vec<String> {
    text.split_whitespace()
        .map(|token| {
            token
                .chars()
                .filter(|c| c.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .filter(|word| !(ignore_fillers && FILLER_WORDS.contains(&word.as_str())))
        .collect()
}

/// Compare `spoken_text` to `expected_text` word by word
pub fn word_accuracy(expected_text: &str, spoken_text: &str, ignore_fillers: bool) -> WordAccuracy {
    let expected = normalize_words(expected_text, ignore_fillers);
    let spoken = normalize_words(spoken_text, ignore_fillers);

    let counts = EditCounts::from_ops(&traceback_ops(&expected, &spoken));
    let wer = edit_distance(&expected, &spoken) as f64 / expected.len().max(1) as f64;

    WordAccuracy {
        accuracy: accuracy_percent(wer),
        wer: round_to(wer, 4),
        matches: counts.matches,
        substitutions: counts.substitutions,
        insertions: counts.insertions,
        deletions: counts.deletions,
        expected_words: expected,
        spoken_words: spoken,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_identical_after_normalisation() {
        let result = word_accuracy("안녕하세요, 반갑습니다!", "안녕하세요 반갑습니다", false);
        assert_abs_diff_eq!(result.accuracy, 100.0);
        assert_eq!(result.matches, 2);
        assert_eq!(normalize_words("Hello, WORLD", false), vec!["hello", "world"]);
    }

    #[test]
    fn test_fillers_ignored() {
        let with = word_accuracy("저는 학생입니다", "음 저는 어 학생입니다", true);
        assert_abs_diff_eq!(with.accuracy, 100.0);

        let without = word_accuracy("저는 학생입니다", "음 저는 어 학생입니다", false);
        assert_eq!(without.insertions, 2);
        assert_abs_diff_eq!(without.accuracy, 0.0);
    }

    #[test]
    fn test_substitution_and_deletion() {
        let result = word_accuracy("나는 사과를 먹어요", "나는 배를", false);
        assert_eq!(result.matches, 1);
        assert_eq!(result.substitutions, 1);
        assert_eq!(result.deletions, 1);
        assert_abs_diff_eq!(result.wer, 0.6667);
        assert_abs_diff_eq!(result.accuracy, 33.3);
    }

    #[test]
    fn test_empty_expected() {
        let result = word_accuracy("", "뭐라고", false);
        assert_abs_diff_eq!(result.wer, 1.0);
        assert_abs_diff_eq!(result.accuracy, 0.0);
    }
}

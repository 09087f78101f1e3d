//! Scoring result records

use serde::Serialize;

use crate::phoneme::{Phoneme, PhonemeCategory};

/// Edit operation turning the expected sequence into the predicted one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EditKind {
    Match,
    Substitution,
    /// Extra predicted symbol
    Insertion,
    /// Expected symbol that was not produced
    Deletion,
}

/// One step of the expected/predicted alignment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlignedPhoneme {
    /// Index into the expected sequence this step is anchored at; an
    /// insertion uses the index of the next expected symbol.
    pub position: usize,
    pub expected: Option<Phoneme>,
    pub predicted: Option<Phoneme>,
    pub category: PhonemeCategory,
    pub kind: EditKind,
}

impl AlignedPhoneme {
    pub fn is_error(&self) -> bool {
        self.kind != EditKind::Match
    }
}

/// A substituted phoneme, `expected` heard as `predicted`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhonemePair {
    pub expected: Phoneme,
    pub predicted: Phoneme,
}

/// Non-matching alignment steps per syllable slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategoryErrors {
    pub initial: usize,
    pub vowel: usize,
    #[serde(rename = "final")]
    pub final_: usize,
}

impl CategoryErrors {
    pub fn total(&self) -> usize {
        self.initial + self.vowel + self.final_
    }
}

/// Per-word breakdown over a span of the expected phonemes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WordScore {
    pub word: String,
    pub index: usize,
    /// Span `[start, end)` in the expected phoneme sequence
    pub start: usize,
    pub end: usize,
    /// Local error rate over the span
    pub per: f64,
    pub mispronounced: bool,
}

/// Outcome of comparing a recognised phoneme sequence with the target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PronunciationResult {
    /// 0-100, one decimal place
    pub phoneme_accuracy: f64,
    /// Phoneme error rate, four decimal places; may exceed 1
    pub per: f64,
    pub overall_score: f64,
    pub expected_phonemes: Vec<Phoneme>,
    pub predicted_phonemes: Vec<Phoneme>,
    pub wrong_phonemes: Vec<PhonemePair>,
    pub wrong_words: Vec<String>,
    pub matches: usize,
    pub substitutions: usize,
    pub insertions: usize,
    pub deletions: usize,
    pub alignment: Vec<AlignedPhoneme>,
    pub category_errors: CategoryErrors,
    pub word_scores: Vec<WordScore>,
    /// False when the expected text produced no phonemes
    pub has_target: bool,
}

impl PronunciationResult {
    pub fn is_perfect(&self) -> bool {
        self.has_target && self.per == 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_field_names() {
        let errors = CategoryErrors {
            initial: 1,
            vowel: 2,
            final_: 3,
        };
        let json = serde_json::to_value(errors).unwrap();
        assert_eq!(json["final"], 3);
        assert_eq!(errors.total(), 6);

        let step = AlignedPhoneme {
            position: 0,
            expected: Some(Phoneme::Jamo("ㄱ")),
            predicted: None,
            category: PhonemeCategory::Initial,
            kind: EditKind::Deletion,
        };
        let json = serde_json::to_value(&step).unwrap();
        assert_eq!(json["kind"], "deletion");
        assert_eq!(json["category"], "initial");
        assert_eq!(json["expected"], "ㄱ");
        assert!(json["predicted"].is_null());
        assert!(step.is_error());
    }
}

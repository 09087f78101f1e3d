//! Phoneme sequence alignment and pronunciation scoring
//!
//! The error rate is always the Levenshtein distance between the expected
//! and predicted sequences. How that distance is broken down into
//! matches/substitutions/insertions/deletions, and how errors are pinned to
//! words, is configurable through [`ScoringConfig`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::g2p::{decompose, decompose_words, strip_boundaries};
use crate::phoneme::{Phoneme, PhonemeCategory};
use crate::result::{
    AlignedPhoneme, CategoryErrors, EditKind, PhonemePair, PronunciationResult, WordScore,
};

/// How the edit distance is decomposed into operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentStrategy {
    /// Backtrack through the distance table for exact operations
    #[default]
    Traceback,
    /// Compare index by index; surplus symbols are insertions or deletions
    Positional,
}

/// How expected words are mapped onto phoneme spans
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WordSpanStrategy {
    /// Equal share of the expected sequence per word, same slice of the
    /// predicted sequence
    #[default]
    EvenSplit,
    /// Each word spans its own jamo; errors come from the alignment
    Aligned,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub alignment: AlignmentStrategy,
    pub word_spans: WordSpanStrategy,
    /// A word is flagged when its local error rate is above this
    pub word_error_threshold: f64,
    pub max_reported_substitutions: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            alignment: AlignmentStrategy::Traceback,
            word_spans: WordSpanStrategy::EvenSplit,
            word_error_threshold: 0.2,
            max_reported_substitutions: 10,
        }
    }
}

/// One alignment step with indices into the compared sequences
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditOp {
    pub kind: EditKind,
    pub expected: Option<usize>,
    pub predicted: Option<usize>,
}

/// Operation totals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EditCounts {
    pub matches: usize,
    pub substitutions: usize,
    pub insertions: usize,
    pub deletions: usize,
}

impl EditCounts {
    pub fn from_ops(ops: &[EditOp]) -> Self {
        let mut counts = Self::default();
        for op in ops {
            match op.kind {
                EditKind::Match => counts.matches += 1,
                EditKind::Substitution => counts.substitutions += 1,
                EditKind::Insertion => counts.insertions += 1,
                EditKind::Deletion => counts.deletions += 1,
            }
        }
        counts
    }

    pub fn errors(&self) -> usize {
        self.substitutions + self.insertions + self.deletions
    }
}

/// Full Levenshtein table, rows over `a`, columns over `b`
fn distance_table<T: PartialEq>(a: &[T], b: &[T]) -> Vec<Vec<usize>> {
    let mut d = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for (i, row) in d.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=b.len() {
        d[0][j] = j;
    }
    for i in 1..=a.len() {
        for j in 1..=b.len() {
            d[i][j] = if a[i - 1] == b[j - 1] {
                d[i - 1][j - 1]
            } else {
                1 + d[i - 1][j].min(d[i][j - 1]).min(d[i - 1][j - 1])
            };
        }
    }
    d
}

/// Levenshtein distance with unit costs
pub fn edit_distance<T: PartialEq>(a: &[T], b: &[T]) -> usize {
    distance_table(a, b)[a.len()][b.len()]
}

/// Exact operations from the distance table
///
/// Ties prefer the diagonal, then an insertion (extra predicted symbol),
/// then a deletion.
pub fn traceback_ops<T: PartialEq>(expected: &[T], predicted: &[T]) -> Vec<EditOp> {
    let d = distance_table(expected, predicted);
    let (mut i, mut j) = (expected.len(), predicted.len());
    let mut ops = Vec::with_capacity(i.max(j));

    while i > 0 || j > 0 {
        if i > 0 && j > 0 {
            let same = expected[i - 1] == predicted[j - 1];
            let cost = if same { 0 } else { 1 };
            if d[i][j] == d[i - 1][j - 1] + cost {
                ops.push(EditOp {
                    kind: if same {
                        EditKind::Match
                    } else {
                        EditKind::Substitution
                    },
                    expected: Some(i - 1),
                    predicted: Some(j - 1),
                });
                i -= 1;
                j -= 1;
                continue;
            }
        }
        if j > 0 && d[i][j] == d[i][j - 1] + 1 {
            ops.push(EditOp {
                kind: EditKind::Insertion,
                expected: None,
                predicted: Some(j - 1),
            });
            j -= 1;
        } else {
            ops.push(EditOp {
                kind: EditKind::Deletion,
                expected: Some(i - 1),
                predicted: None,
            });
            i -= 1;
        }
    }

    ops.reverse();
    ops
}

/// Index-by-index comparison
pub fn positional_ops<T: PartialEq>(expected: &[T], predicted: &[T]) -> Vec<EditOp> {
    let shared = expected.len().min(predicted.len());
    let mut ops: Vec<EditOp> = (0..shared)
        .map(|i| EditOp {
            kind: if expected[i] == predicted[i] {
                EditKind::Match
            } else {
                EditKind::Substitution
            },
            expected: Some(i),
            predicted: Some(i),
        })
        .collect();
    ops.extend((shared..predicted.len()).map(|j| EditOp {
        kind: EditKind::Insertion,
        expected: None,
        predicted: Some(j),
    }));
    ops.extend((shared..expected.len()).map(|i| EditOp {
        kind: EditKind::Deletion,
        expected: Some(i),
        predicted: None,
    }));
    ops
}

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

/// `(1 - error_rate) * 100`, clamped to 0..=100 and rounded to one decimal
pub fn accuracy_percent(error_rate: f64) -> f64 {
    round_to(((1.0 - error_rate) * 100.0).clamp(0.0, 100.0), 1)
}

fn build_alignment(
    ops: &[EditOp],
    expected: &[Phoneme],
    predicted: &[Phoneme],
) -> Vec<AlignedPhoneme> {
    let mut consumed = 0;
    ops.iter()
        .map(|op| {
            let exp = op.expected.map(|i| expected[i].clone());
            let pred = op.predicted.map(|j| predicted[j].clone());
            let position = op.expected.unwrap_or(consumed);
            if op.expected.is_some() {
                consumed += 1;
            }
            let category = exp
                .as_ref()
                .or(pred.as_ref())
                .map(Phoneme::category)
                .unwrap_or(PhonemeCategory::Other);
            AlignedPhoneme {
                position,
                expected: exp,
                predicted: pred,
                category,
                kind: op.kind,
            }
        })
        .collect()
}

fn category_errors(alignment: &[AlignedPhoneme]) -> CategoryErrors {
    let mut errors = CategoryErrors::default();
    for step in alignment.iter().filter(|s| s.is_error()) {
        match step.category {
            PhonemeCategory::Initial => errors.initial += 1,
            PhonemeCategory::Vowel => errors.vowel += 1,
            PhonemeCategory::Final => errors.final_ += 1,
            PhonemeCategory::Other => {}
        }
    }
    errors
}

fn even_split_words(
    expected: &[Phoneme],
    predicted: &[Phoneme],
    expected_text: &str,
    threshold: f64,
) -> Vec<WordScore> {
    let words: Vec<&str> = expected_text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }
    let per_word = expected.len() as f64 / words.len() as f64;

    words
        .iter()
        .enumerate()
        .map(|(index, word)| {
            let start = (index as f64 * per_word) as usize;
            let end = (((index + 1) as f64 * per_word) as usize).min(expected.len());
            let exp = &expected[start.min(end)..end];
            let pred: &[Phoneme] = if start < predicted.len() {
                &predicted[start..end.min(predicted.len()).max(start)]
            } else {
                &[]
            };

            let per = if exp.is_empty() {
                0.0
            } else {
                edit_distance(exp, pred) as f64 / exp.len() as f64
            };
            WordScore {
                word: word.to_string(),
                index,
                start,
                end,
                per: round_to(per, 4),
                mispronounced: !exp.is_empty() && per > threshold,
            }
        })
        .collect()
}

fn aligned_words(
    expected: &[Phoneme],
    alignment: &[AlignedPhoneme],
    expected_text: &str,
    threshold: f64,
) -> Option<Vec<WordScore>> {
    let words = decompose_words(expected_text);
    let mut spans = Vec::with_capacity(words.len());
    let mut start = 0;
    for (word, phonemes) in words {
        let len = strip_boundaries(&phonemes).len();
        spans.push((word, start, start + len));
        start += len;
    }
    if start != expected.len() {
        return None;
    }

    let mut errors = vec![0usize; spans.len()];
    for step in alignment.iter().filter(|s| s.is_error()) {
        // Insertions past the last symbol belong to the last word
        let owner = spans
            .iter()
            .position(|&(_, s, e)| step.position >= s && step.position < e)
            .or_else(|| spans.len().checked_sub(1));
        if let Some(owner) = owner {
            errors[owner] += 1;
        }
    }

    Some(
        spans
            .into_iter()
            .zip(errors)
            .enumerate()
            .map(|(index, ((word, start, end), errors))| {
                let len = end - start;
                let per = if len == 0 {
                    0.0
                } else {
                    errors as f64 / len as f64
                };
                WordScore {
                    word,
                    index,
                    start,
                    end,
                    per: round_to(per, 4),
                    mispronounced: len > 0 && per > threshold,
                }
            })
            .collect(),
    )
}

/// Score `predicted` against `expected`
///
/// Both sequences must already be free of `<sp>`/`<blank>`. `expected_text`
/// is only used to split the result into words.
pub fn score(
    expected: &[Phoneme],
    predicted: &[Phoneme],
    expected_text: &str,
    config: &ScoringConfig,
) -> PronunciationResult {
    let ops = match config.alignment {
        AlignmentStrategy::Traceback => traceback_ops(expected, predicted),
        AlignmentStrategy::Positional => positional_ops(expected, predicted),
    };
    let counts = EditCounts::from_ops(&ops);
    let alignment = build_alignment(&ops, expected, predicted);

    let wrong_phonemes: Vec<PhonemePair> = alignment
        .iter()
        .filter(|s| s.kind == EditKind::Substitution)
        .filter_map(|s| match (&s.expected, &s.predicted) {
            (Some(e), Some(p)) => Some(PhonemePair {
                expected: e.clone(),
                predicted: p.clone(),
            }),
            _ => None,
        })
        .take(config.max_reported_substitutions)
        .collect();

    let has_target = !expected.is_empty();
    let (per, accuracy, word_scores) = if has_target {
        let distance = edit_distance(expected, predicted);
        let per = distance as f64 / expected.len() as f64;
        let word_scores = match config.word_spans {
            WordSpanStrategy::EvenSplit => even_split_words(
                expected,
                predicted,
                expected_text,
                config.word_error_threshold,
            ),
            WordSpanStrategy::Aligned => {
                aligned_words(expected, &alignment, expected_text, config.word_error_threshold)
                    .unwrap_or_else(|| {
                        debug!("Word spans do not cover the expected phonemes, splitting evenly");
                        even_split_words(
                            expected,
                            predicted,
                            expected_text,
                            config.word_error_threshold,
                        )
                    })
            }
        };
        (round_to(per, 4), accuracy_percent(per), word_scores)
    } else {
        let per = edit_distance(expected, predicted) as f64 / expected.len().max(1) as f64;
        (round_to(per, 4), 0.0, Vec::new())
    };

    let wrong_words = word_scores
        .iter()
        .filter(|w| w.mispronounced)
        .map(|w| w.word.clone())
        .collect();

    PronunciationResult {
        phoneme_accuracy: accuracy,
        per,
        overall_score: accuracy,
        expected_phonemes: expected.to_vec(),
        predicted_phonemes: predicted.to_vec(),
        wrong_phonemes,
        wrong_words,
        matches: counts.matches,
        substitutions: counts.substitutions,
        insertions: counts.insertions,
        deletions: counts.deletions,
        category_errors: category_errors(&alignment),
        alignment,
        word_scores,
        has_target,
    }
}

/// Decompose `expected_text`, strip sentinels from both sides, then score
pub fn score_text(
    expected_text: &str,
    predicted: &[Phoneme],
    config: &ScoringConfig,
) -> PronunciationResult {
    let expected = strip_boundaries(&decompose(expected_text));
    let predicted = strip_boundaries(predicted);
    score(&expected, &predicted, expected_text, config)
}

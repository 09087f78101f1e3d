//! Hangul grapheme-to-phoneme decomposition
//!
//! Precomposed syllables (U+AC00..=U+D7A3) are split arithmetically into
//! lead, vowel and optional tail jamo. Spaces become `<sp>`; every other
//! character passes through as its own token.

use crate::phoneme::{Phoneme, LEADS, TAILS, VOWELS};

/// First precomposed syllable (가)
const SYLLABLE_BASE: u32 = 0xAC00;
/// Last precomposed syllable (힣)
const SYLLABLE_LAST: u32 = 0xD7A3;

const VOWEL_COUNT: u32 = 21;
const TAIL_COUNT: u32 = 28;
/// Syllables sharing one lead: 21 vowels x 28 tails
const LEAD_STRIDE: u32 = VOWEL_COUNT * TAIL_COUNT;

/// Split a precomposed syllable into (lead, vowel, tail) indices
pub fn syllable_indices(c: char) -> Option<(usize, usize, usize)> {
    let code = c as u32;
    if !(SYLLABLE_BASE..=SYLLABLE_LAST).contains(&code) {
        return None;
    }
    let offset = code - SYLLABLE_BASE;
    Some((
        (offset / LEAD_STRIDE) as usize,
        ((offset % LEAD_STRIDE) / TAIL_COUNT) as usize,
        (offset % TAIL_COUNT) as usize,
    ))
}

fn push_char(out: &mut Vec<Phoneme>, c: char) {
    if let Some((lead, vowel, tail)) = syllable_indices(c) {
        out.push(Phoneme::Jamo(LEADS[lead]));
        out.push(Phoneme::Jamo(VOWELS[vowel]));
        if let Some(jamo) = TAILS[tail] {
            out.push(Phoneme::Jamo(jamo));
        }
    } else if c == ' ' {
        out.push(Phoneme::WordBoundary);
    } else {
        out.push(Phoneme::from_char(c));
    }
}

/// Decompose text into a flat phoneme sequence
///
/// Leading and trailing whitespace is trimmed first, so only interior
/// spaces produce `<sp>`. Total over all input; never fails.
pub fn decompose(text: &str) -> Vec<Phoneme> {
    let text = text.trim();
    let mut out = Vec::with_capacity(text.chars().count() * 3);
    for c in text.chars() {
        push_char(&mut out, c);
    }
    out
}

/// Decompose each whitespace-separated word on its own
pub fn decompose_words(text: &str) -> Vec<(String, Vec<Phoneme>)> {
    text.split_whitespace()
        .map(|word| (word.to_string(), decompose(word)))
        .collect()
}

/// Drop `<sp>` and `<blank>` tokens
pub fn strip_boundaries(sequence: &[Phoneme]) -> Vec<Phoneme> {
    sequence
        .iter()
        .filter(|p| !p.is_sentinel())
        .cloned()
        .collect()
}

/// Space-separated IPA rendering of a phoneme sequence
///
/// Symbols without an IPA form are shown as-is.
pub fn ipa_string(sequence: &[Phoneme]) -> String {
    sequence
        .iter()
        .map(|p| p.ipa().unwrap_or_else(|| p.as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

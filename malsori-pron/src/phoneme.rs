//! Jamo symbols, the fixed jamo inventories and their feedback categories

use std::fmt;

use serde::{Serialize, Serializer};

/// Leading consonants (초성), in Unicode syllable order.
pub const LEADS: [&str; 19] = [
    "ㄱ", "ㄲ", "ㄴ", "ㄷ", "ㄸ", "ㄹ", "ㅁ", "ㅂ", "ㅃ", "ㅅ", "ㅆ", "ㅇ", "ㅈ", "ㅉ", "ㅊ", "ㅋ",
    "ㅌ", "ㅍ", "ㅎ",
];

/// Vowels (중성), in Unicode syllable order.
pub const VOWELS: [&str; 21] = [
    "ㅏ", "ㅐ", "ㅑ", "ㅒ", "ㅓ", "ㅔ", "ㅕ", "ㅖ", "ㅗ", "ㅘ", "ㅙ", "ㅚ", "ㅛ", "ㅜ", "ㅝ", "ㅞ",
    "ㅟ", "ㅠ", "ㅡ", "ㅢ", "ㅣ",
];

/// Trailing consonants (종성). Index 0 means "no tail".
pub const TAILS: [Option<&str>; 28] = [
    None,
    Some("ㄱ"),
    Some("ㄲ"),
    Some("ㄳ"),
    Some("ㄴ"),
    Some("ㄵ"),
    Some("ㄶ"),
    Some("ㄷ"),
    Some("ㄹ"),
    Some("ㄺ"),
    Some("ㄻ"),
    Some("ㄼ"),
    Some("ㄽ"),
    Some("ㄾ"),
    Some("ㄿ"),
    Some("ㅀ"),
    Some("ㅁ"),
    Some("ㅂ"),
    Some("ㅄ"),
    Some("ㅅ"),
    Some("ㅆ"),
    Some("ㅇ"),
    Some("ㅈ"),
    Some("ㅊ"),
    Some("ㅋ"),
    Some("ㅌ"),
    Some("ㅍ"),
    Some("ㅎ"),
];

pub const WORD_BOUNDARY: &str = "<sp>";
pub const BLANK: &str = "<blank>";
pub const UNKNOWN: &str = "<unk>";

/// One Korean phonological unit, or one of the sentinel tokens.
///
/// Equality is symbol identity: `ㄱ` and `ㄲ` are simply different.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Phoneme {
    /// A compatibility-jamo letter from [`LEADS`], [`VOWELS`] or [`TAILS`]
    Jamo(&'static str),
    /// `<sp>`, emitted for spaces
    WordBoundary,
    /// CTC blank class; never produced by the decomposer
    Blank,
    /// Any other character, kept verbatim
    Other(String),
}

/// Where a jamo sits in a syllable, as surfaced in feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PhonemeCategory {
    Initial,
    Vowel,
    Final,
    Other,
}

fn inventory_lookup(symbol: &str) -> Option<&'static str> {
    LEADS
        .iter()
        .chain(VOWELS.iter())
        .chain(TAILS.iter().flatten())
        .find(|&&jamo| jamo == symbol)
        .copied()
}

impl Phoneme {
    /// Parse a symbol as stored in a phoneme table
    pub fn from_symbol(symbol: &str) -> Self {
        match symbol {
            WORD_BOUNDARY => Self::WordBoundary,
            BLANK | "<blk>" => Self::Blank,
            s => match inventory_lookup(s) {
                Some(jamo) => Self::Jamo(jamo),
                None => Self::Other(s.to_string()),
            },
        }
    }

    /// Token for a single input character
    pub fn from_char(c: char) -> Self {
        let mut buf = [0u8; 4];
        match inventory_lookup(c.encode_utf8(&mut buf)) {
            Some(jamo) => Self::Jamo(jamo),
            None => Self::Other(c.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Jamo(s) => s,
            Self::WordBoundary => WORD_BOUNDARY,
            Self::Blank => BLANK,
            Self::Other(s) => s,
        }
    }

    /// True for `<sp>` and `<blank>`
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Self::WordBoundary | Self::Blank)
    }

    /// Category by set membership; leads win over tails for shared consonants.
    pub fn category(&self) -> PhonemeCategory {
        let symbol = self.as_str();
        if LEADS.contains(&symbol) {
            PhonemeCategory::Initial
        } else if VOWELS.contains(&symbol) {
            PhonemeCategory::Vowel
        } else if TAILS.iter().flatten().any(|&t| t == symbol) {
            PhonemeCategory::Final
        } else {
            PhonemeCategory::Other
        }
    }

    /// Broad IPA rendering of the symbol
    pub fn ipa(&self) -> Option<&'static str> {
        let ipa = match self.as_str() {
            "ㄱ" => "k",
            "ㄲ" => "kk",
            "ㄴ" => "n",
            "ㄷ" => "t",
            "ㄸ" => "tt",
            "ㄹ" => "r/l",
            "ㅁ" => "m",
            "ㅂ" => "p",
            "ㅃ" => "pp",
            "ㅅ" => "s",
            "ㅆ" => "ss",
            "ㅇ" => "ŋ",
            "ㅈ" => "tɕ",
            "ㅉ" => "ttɕ",
            "ㅊ" => "tɕʰ",
            "ㅋ" => "kʰ",
            "ㅌ" => "tʰ",
            "ㅍ" => "pʰ",
            "ㅎ" => "h",
            "ㅏ" => "a",
            "ㅐ" => "æ",
            "ㅑ" => "ja",
            "ㅒ" => "jæ",
            "ㅓ" => "ʌ",
            "ㅔ" => "e",
            "ㅕ" => "jʌ",
            "ㅖ" => "je",
            "ㅗ" => "o",
            "ㅘ" => "wa",
            "ㅙ" => "wæ",
            "ㅚ" => "ø",
            "ㅛ" => "jo",
            "ㅜ" => "u",
            "ㅝ" => "wʌ",
            "ㅞ" => "we",
            "ㅟ" => "wi",
            "ㅠ" => "ju",
            "ㅡ" => "ɯ",
            "ㅢ" => "ɯi",
            "ㅣ" => "i",
            "ㄳ" => "ks",
            "ㄵ" => "ntɕ",
            "ㄶ" => "nh",
            "ㄺ" => "lk",
            "ㄻ" => "lm",
            "ㄼ" => "lp",
            "ㄽ" => "ls",
            "ㄾ" => "ltʰ",
            "ㄿ" => "lpʰ",
            "ㅀ" => "lh",
            "ㅄ" => "ps",
            WORD_BOUNDARY => WORD_BOUNDARY,
            UNKNOWN => UNKNOWN,
            _ => return None,
        };
        Some(ipa)
    }
}

impl fmt::Display for Phoneme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Phoneme {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// Every distinct jamo across the three inventories
pub fn all_jamo() -> Vec<&'static str> {
    let mut jamo: Vec<&'static str> = LEADS
        .iter()
        .chain(VOWELS.iter())
        .chain(TAILS.iter().flatten())
        .copied()
        .collect();
    jamo.sort_unstable();
    jamo.dedup();
    jamo
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inventory_sizes() {
        assert_eq!(LEADS.len(), 19);
        assert_eq!(VOWELS.len(), 21);
        assert_eq!(TAILS.iter().flatten().count(), 27);
        // 19 leads + 11 clusters only found in tails + 21 vowels
        assert_eq!(all_jamo().len(), 51);
    }

    #[test]
    fn test_symbol_parsing() {
        assert_eq!(Phoneme::from_symbol("ㄱ"), Phoneme::Jamo("ㄱ"));
        assert_eq!(Phoneme::from_symbol("<sp>"), Phoneme::WordBoundary);
        assert_eq!(Phoneme::from_symbol("<blank>"), Phoneme::Blank);
        assert_eq!(Phoneme::from_symbol("<blk>"), Phoneme::Blank);
        assert_eq!(Phoneme::from_symbol("x"), Phoneme::Other("x".into()));
        assert_eq!(Phoneme::from_char('ㅢ'), Phoneme::Jamo("ㅢ"));
        assert_eq!(Phoneme::from_char('!'), Phoneme::Other("!".into()));
    }

    #[test]
    fn test_categories() {
        assert_eq!(Phoneme::Jamo("ㄱ").category(), PhonemeCategory::Initial);
        assert_eq!(Phoneme::Jamo("ㅘ").category(), PhonemeCategory::Vowel);
        assert_eq!(Phoneme::Jamo("ㄺ").category(), PhonemeCategory::Final);
        assert_eq!(Phoneme::WordBoundary.category(), PhonemeCategory::Other);
        assert_eq!(Phoneme::Other("a".into()).category(), PhonemeCategory::Other);
    }

    #[test]
    fn test_ipa() {
        assert_eq!(Phoneme::Jamo("ㅇ").ipa(), Some("ŋ"));
        assert_eq!(Phoneme::Jamo("ㅓ").ipa(), Some("ʌ"));
        assert_eq!(Phoneme::Jamo("ㄳ").ipa(), Some("ks"));
        assert_eq!(Phoneme::WordBoundary.ipa(), Some("<sp>"));
        assert_eq!(Phoneme::Other("?".into()).ipa(), None);
    }

    #[test]
    fn test_serializes_as_string() {
        let json = serde_json::to_string(&vec![Phoneme::Jamo("ㅏ"), Phoneme::WordBoundary]).unwrap();
        assert_eq!(json, r#"["ㅏ","<sp>"]"#);
    }
}

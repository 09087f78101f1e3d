//! Phoneme class table: symbol <-> classifier output index

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::{info, warn};

use crate::error::{PronError, Result};
use crate::phoneme::{all_jamo, Phoneme, WORD_BOUNDARY};

/// Bidirectional mapping between phoneme symbols and class IDs
#[derive(Debug, Clone)]
pub struct PhonemeTable {
    /// Class ID to symbol
    symbols: Vec<Phoneme>,
    /// Symbol to class ID
    ids: HashMap<Phoneme, usize>,
    /// CTC blank class
    blank_id: usize,
}

impl PhonemeTable {
    /// Build from explicit `(symbol, id)` pairs
    ///
    /// IDs must be exactly `0..n` with no gaps or duplicates.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (S, usize)>,
        S: AsRef<str>,
    {
        let pairs: Vec<(Phoneme, usize)> = pairs
            .into_iter()
            .map(|(s, id)| (Phoneme::from_symbol(s.as_ref()), id))
            .collect();

        if pairs.is_empty() {
            return Err(PronError::phoneme_table("Phoneme table is empty"));
        }

        let n = pairs.len();
        let mut slots: Vec<Option<Phoneme>> = vec![None; n];
        for (phoneme, id) in pairs {
            let slot = slots.get_mut(id).ok_or_else(|| {
                PronError::phoneme_table(format!("ID {} out of range for {} classes", id, n))
            })?;
            if let Some(existing) = slot {
                return Err(PronError::phoneme_table(format!(
                    "ID {} assigned to both '{}' and '{}'",
                    id, existing, phoneme
                )));
            }
            *slot = Some(phoneme);
        }

        // Every slot is filled: n distinct ids all < n
        let symbols: Vec<Phoneme> = slots.into_iter().flatten().collect();

        let mut ids = HashMap::with_capacity(n);
        for (id, phoneme) in symbols.iter().enumerate() {
            if ids.insert(phoneme.clone(), id).is_some() {
                return Err(PronError::phoneme_table(format!(
                    "Symbol '{}' appears more than once",
                    phoneme
                )));
            }
        }

        let blank_id = match ids.get(&Phoneme::Blank) {
            Some(&id) => id,
            None => {
                warn!("Phoneme table has no blank symbol, assuming class 0");
                0
            }
        };

        Ok(Self {
            symbols,
            ids,
            blank_id,
        })
    }

    /// Load a flat JSON object `{"symbol": id, ...}`
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            PronError::phoneme_table(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let map: HashMap<String, usize> = serde_json::from_str(&content)?;
        let table = Self::from_pairs(map)?;

        info!(
            "Loaded phoneme table: {} classes (blank_id: {})",
            table.len(),
            table.blank_id
        );
        Ok(table)
    }

    /// Table used when no `p2id.json` ships with the model
    ///
    /// Blank is class 0; every distinct jamo plus `<sp>`, sorted by code
    /// point, follows from 1.
    pub fn fallback() -> Self {
        let mut symbols: Vec<&str> = all_jamo();
        symbols.push(WORD_BOUNDARY);
        symbols.sort_unstable();

        let mut table = vec![Phoneme::Blank];
        table.extend(symbols.into_iter().map(Phoneme::from_symbol));

        let ids = table
            .iter()
            .enumerate()
            .map(|(id, p)| (p.clone(), id))
            .collect();

        Self {
            symbols: table,
            ids,
            blank_id: 0,
        }
    }

    /// Load `path` if it exists, otherwise use [`PhonemeTable::fallback`]
    pub fn load_or_fallback<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_json_file(path)
        } else {
            warn!(
                "Phoneme table {} not found, using built-in jamo table",
                path.display()
            );
            Ok(Self::fallback())
        }
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn blank_id(&self) -> usize {
        self.blank_id
    }

    pub fn symbol(&self, id: usize) -> Option<&Phoneme> {
        self.symbols.get(id)
    }

    pub fn id(&self, phoneme: &Phoneme) -> Option<usize> {
        self.ids.get(phoneme).copied()
    }

    pub fn symbols(&self) -> &[Phoneme] {
        &self.symbols
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_fallback_layout() {
        let table = PhonemeTable::fallback();
        // blank + 51 jamo + <sp>
        assert_eq!(table.len(), 53);
        assert_eq!(table.blank_id(), 0);
        assert_eq!(table.symbol(0), Some(&Phoneme::Blank));
        // '<' sorts before every Hangul code point
        assert_eq!(table.symbol(1), Some(&Phoneme::WordBoundary));
        assert_eq!(table.symbol(2), Some(&Phoneme::Jamo("ㄱ")));
        assert_eq!(table.id(&Phoneme::Jamo("ㅣ")), Some(52));
        // <sp> is one class, never split into its characters
        for c in ["<", "s", "p", ">"] {
            assert_eq!(table.id(&Phoneme::from_symbol(c)), None);
        }
    }

    #[test]
    fn test_from_json_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"<blank>": 2, "ㄱ": 0, "ㅏ": 1}}"#).unwrap();

        let table = PhonemeTable::from_json_file(file.path()).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.blank_id(), 2);
        assert_eq!(table.symbol(0), Some(&Phoneme::Jamo("ㄱ")));
        assert_eq!(table.id(&Phoneme::Jamo("ㅏ")), Some(1));
    }

    #[test]
    fn test_blank_alias_and_default() {
        let table = PhonemeTable::from_pairs([("ㄱ", 0), ("<blk>", 1)]).unwrap();
        assert_eq!(table.blank_id(), 1);

        let table = PhonemeTable::from_pairs([("ㄱ", 0), ("ㅏ", 1)]).unwrap();
        assert_eq!(table.blank_id(), 0);
    }

    #[test]
    fn test_sparse_or_duplicate_ids_rejected() {
        assert!(PhonemeTable::from_pairs([("ㄱ", 0), ("ㅏ", 2)]).is_err());
        assert!(PhonemeTable::from_pairs([("ㄱ", 0), ("ㅏ", 0)]).is_err());
        assert!(PhonemeTable::from_pairs(Vec::<(&str, usize)>::new()).is_err());
    }

    #[test]
    fn test_missing_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let table = PhonemeTable::load_or_fallback(dir.path().join("p2id.json")).unwrap();
        assert_eq!(table.len(), PhonemeTable::fallback().len());
    }
}

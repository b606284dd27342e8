use std::collections::HashMap;
use std::path::Path;

use crate::error::DecodeError;

/// Index <-> entry mapping for the decoder's output classes, with the
/// designated blank and space indices. Immutable once built; shared
/// read-only between workers.
#[derive(Debug, Clone)]
pub struct Alphabet {
    entries: Vec<String>,
    index: HashMap<String, usize>,
    blank: usize,
    space: usize,
}

#[derive(Debug, serde::Deserialize)]
struct AlphabetFile {
    labels: Vec<String>,
    blank_index: usize,
    space_index: usize,
}

impl Alphabet {
    pub fn new(
        entries: Vec<String>,
        blank_index: usize,
        space_index: usize,
    ) -> Result<Self, DecodeError> {
        if blank_index >= entries.len() || space_index >= entries.len() {
            return Err(DecodeError::invalid_argument(format!(
                "blank_index {blank_index} / space_index {space_index} out of range for {} entries",
                entries.len()
            )));
        }
        if blank_index == space_index {
            return Err(DecodeError::invalid_argument(
                "blank_index and space_index must be distinct",
            ));
        }
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.clone(), i))
            .collect();
        Ok(Self {
            entries,
            index,
            blank: blank_index,
            space: space_index,
        })
    }

    /// Loads `{"labels": [...], "blank_index": n, "space_index": m}`.
    pub fn from_json_file(path: &Path) -> Result<Self, DecodeError> {
        let data = std::fs::read_to_string(path)
            .map_err(|e| DecodeError::io("read alphabet json", e))?;
        let raw: AlphabetFile = serde_json::from_str(&data)
            .map_err(|e| DecodeError::format("parse alphabet json", e.to_string()))?;
        Self::new(raw.labels, raw.blank_index, raw.space_index)
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn blank_index(&self) -> usize {
        self.blank
    }

    pub fn space_index(&self) -> usize {
        self.space
    }

    /// Entry string for a token index. Callers pass indices in `[0, size)`.
    pub fn entry(&self, token: usize) -> &str {
        &self.entries[token]
    }

    pub fn index_of(&self, entry: &str) -> Option<usize> {
        self.index.get(entry).copied()
    }

    pub fn map_indices_to_entries(&self, tokens: &[usize]) -> Vec<String> {
        tokens.iter().map(|&t| self.entries[t].clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn letters() -> Vec<String> {
        ["_", " ", "a", "b", "c"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn alphabet_lookup() {
        let alphabet = Alphabet::new(letters(), 0, 1).unwrap();
        assert_eq!(alphabet.size(), 5);
        assert_eq!(alphabet.blank_index(), 0);
        assert_eq!(alphabet.space_index(), 1);
        assert_eq!(alphabet.entry(3), "b");
        assert_eq!(alphabet.index_of("c"), Some(4));
        assert_eq!(alphabet.index_of("z"), None);
        assert_eq!(
            alphabet.map_indices_to_entries(&[2, 3]),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn alphabet_rejects_identical_blank_and_space() {
        assert!(matches!(
            Alphabet::new(letters(), 1, 1),
            Err(DecodeError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn alphabet_rejects_out_of_range_indices() {
        assert!(Alphabet::new(letters(), 9, 1).is_err());
        assert!(Alphabet::new(letters(), 0, 9).is_err());
    }

    #[test]
    fn alphabet_from_json_file() {
        let dir = std::env::temp_dir().join(format!(
            "ctc-beam-alphabet-test-{}",
            std::process::id()
        ));
        std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
        let path = dir.join("labels.json");
        std::fs::write(
            &path,
            r#"{"labels": ["_", " ", "a", "b"], "blank_index": 0, "space_index": 1}"#,
        )
        .expect("temp file should be writable");

        let alphabet = Alphabet::from_json_file(&path).unwrap();
        assert_eq!(alphabet.size(), 4);
        assert_eq!(alphabet.entry(2), "a");

        std::fs::remove_dir_all(&dir).ok();
    }
}

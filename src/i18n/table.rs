//! The full translation table of the active language.

use std::collections::HashMap;

/// Parse `key=value` lines.
///
/// The first `=` splits key from value and both sides are trimmed. Lines
/// without `=` or with an empty key (section headers, blank lines,
/// comments) are skipped.
pub fn parse_entries(text: &str) -> impl Iterator<Item = (&str, &str)> {
    text.lines().filter_map(|line| {
        let (key, value) = line.split_once('=')?;
        let key = key.trim();
        (!key.is_empty()).then(|| (key, value.trim()))
    })
}

/// Translation key → translated text for one language.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalizationTable {
    entries: HashMap<String, String>,
}

impl LocalizationTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `key=value` text. Later lines override earlier ones.
    pub fn parse(text: &str) -> Self {
        let mut table = Self::new();
        table.merge_text(text);
        table
    }

    /// Merge `key=value` text into the table. Returns the number of
    /// entries applied.
    pub fn merge_text(&mut self, text: &str) -> usize {
        let mut applied = 0;
        for (key, value) in parse_entries(text) {
            self.entries.insert(key.to_string(), value.to_string());
            applied += 1;
        }
        applied
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Named tree patterns under development.

use crate::error::TredevError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A tree regular expression and the label it targets
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternEntry {
    /// Tree regular expression, passed verbatim to the matcher
    pub pattern: String,
    pub label: String,
    #[serde(default)]
    pub comment: String,
}

/// Patterns keyed by unique name. Entries are immutable once added.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PatternTable {
    entries: BTreeMap<String, PatternEntry>,
}

impl PatternTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        name: &str,
        pattern: &str,
        label: &str,
        comment: &str,
    ) -> crate::Result<()> {
        if self.entries.contains_key(name) {
            return Err(TredevError::DuplicateName(name.to_string()));
        }
        self.entries.insert(
            name.to_string(),
            PatternEntry {
                pattern: pattern.to_string(),
                label: label.to_string(),
                comment: comment.to_string(),
            },
        );
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> crate::Result<PatternEntry> {
        self.entries
            .remove(name)
            .ok_or_else(|| TredevError::UnknownName(name.to_string()))
    }

    pub fn get(&self, name: &str) -> crate::Result<&PatternEntry> {
        self.entries
            .get(name)
            .ok_or_else(|| TredevError::UnknownName(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PatternEntry)> {
        self.entries.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Patterns targeting `label`
    pub fn with_label<'a>(
        &'a self,
        label: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a PatternEntry)> + 'a {
        self.iter().filter(move |(_, entry)| entry.label == label)
    }
}

impl FromIterator<(String, PatternEntry)> for PatternTable {
    fn from_iter<I: IntoIterator<Item = (String, PatternEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NP_INCREASE: &str = "NP > (PP <<in > (NP <<increase))";

    #[test]
    fn add_and_get() {
        let mut table = PatternTable::new();
        table.add("p1", NP_INCREASE, "increase", "").unwrap();
        let entry = table.get("p1").unwrap();
        assert_eq!(entry.pattern, NP_INCREASE);
        assert_eq!(entry.label, "increase");
        assert_eq!(entry.comment, "");
    }

    #[test]
    fn duplicate_name_leaves_table_unchanged() {
        let mut table = PatternTable::new();
        table.add("p1", NP_INCREASE, "increase", "first").unwrap();
        let before = table.clone();

        let err = table.add("p1", "VP", "change", "second").unwrap_err();
        assert!(matches!(err, TredevError::DuplicateName(ref n) if n == "p1"));
        assert_eq!(table.len(), 1);
        assert_eq!(table, before);
    }

    #[test]
    fn remove_unknown_name_fails() {
        let mut table = PatternTable::new();
        table.add("p1", NP_INCREASE, "increase", "").unwrap();
        assert!(matches!(
            table.remove("p2"),
            Err(TredevError::UnknownName(_))
        ));
        assert_eq!(table.remove("p1").unwrap().label, "increase");
        assert!(table.is_empty());
    }

    #[test]
    fn remove_then_readd_replaces_pattern() {
        let mut table = PatternTable::new();
        table.add("p1", "NP", "increase", "").unwrap();
        table.remove("p1").unwrap();
        table.add("p1", "VP", "decrease", "rewritten").unwrap();
        assert_eq!(table.get("p1").unwrap().pattern, "VP");
    }

    #[test]
    fn filter_by_label() {
        let mut table = PatternTable::new();
        table.add("a", "NP", "increase", "").unwrap();
        table.add("b", "VP", "decrease", "").unwrap();
        table.add("c", "PP", "increase", "").unwrap();
        let names: Vec<&str> = table.with_label("increase").map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "c"]);
    }
}

//! Manual gold annotations: one value per (node, label).

use crate::error::TredevError;
use crate::nodes::{NodeId, NodeStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Gold value of a node for one label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Annotation {
    Positive,
    Unknown,
    Negative,
    Ignore,
}

impl Annotation {
    /// Compact integer code used for storage.
    pub fn as_int(self) -> i8 {
        match self {
            Self::Positive => 1,
            Self::Unknown => 0,
            Self::Negative => -1,
            Self::Ignore => -2,
        }
    }

    pub fn from_int(value: i8) -> Option<Self> {
        match value {
            1 => Some(Self::Positive),
            0 => Some(Self::Unknown),
            -1 => Some(Self::Negative),
            -2 => Some(Self::Ignore),
            _ => None,
        }
    }
}

impl std::fmt::Display for Annotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Positive => "True",
            Self::Unknown => "Unknown",
            Self::Negative => "False",
            Self::Ignore => "Ignore",
        };
        f.write_str(name)
    }
}

/// Gold values of every node for a single label, in node id order.
pub type GoldColumn = Vec<(NodeId, Annotation)>;

/// Annotation values for every node and every label.
///
/// Labels are treated as mutually exclusive: marking a node positive for one
/// label marks it negative for all others. Conflicting earlier positives are
/// overwritten without notice.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnnotationTable {
    labels: Vec<String>,
    rows: BTreeMap<NodeId, Vec<Annotation>>,
}

impl AnnotationTable {
    /// Table over `node_ids` with every value unknown.
    pub fn new(node_ids: impl IntoIterator<Item = NodeId>, labels: &[String]) -> Self {
        let mut unique: Vec<String> = Vec::with_capacity(labels.len());
        for label in labels {
            if !unique.contains(label) {
                unique.push(label.clone());
            }
        }
        let width = unique.len();
        let rows = node_ids
            .into_iter()
            .map(|id| (id, vec![Annotation::Unknown; width]))
            .collect();
        Self {
            labels: unique,
            rows,
        }
    }

    pub fn from_nodes(nodes: &NodeStore, labels: &[String]) -> Self {
        Self::new(nodes.ids(), labels)
    }

    /// Rebuild a table from persisted rows. Callers check that every row has
    /// one value per label.
    pub fn from_rows(
        labels: Vec<String>,
        rows: impl IntoIterator<Item = (NodeId, Vec<Annotation>)>,
    ) -> Self {
        Self {
            labels,
            rows: rows.into_iter().collect(),
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = (NodeId, &[Annotation])> {
        self.rows.iter().map(|(&id, values)| (id, values.as_slice()))
    }

    fn label_index(&self, label: &str) -> crate::Result<usize> {
        self.labels
            .iter()
            .position(|l| l == label)
            .ok_or_else(|| TredevError::InvalidLabel(label.to_string()))
    }

    fn row_mut(&mut self, node_id: NodeId) -> crate::Result<&mut Vec<Annotation>> {
        self.rows
            .get_mut(&node_id)
            .ok_or(TredevError::UnknownNode(node_id))
    }

    pub fn get(&self, node_id: NodeId, label: &str) -> crate::Result<Annotation> {
        let idx = self.label_index(label)?;
        let row = self
            .rows
            .get(&node_id)
            .ok_or(TredevError::UnknownNode(node_id))?;
        Ok(row[idx])
    }

    fn set(&mut self, node_id: NodeId, label: &str, value: Annotation) -> crate::Result<()> {
        let idx = self.label_index(label)?;
        self.row_mut(node_id)?[idx] = value;
        Ok(())
    }

    /// Mark `label` positive and every other label of the node negative.
    pub fn set_positive(&mut self, node_id: NodeId, label: &str) -> crate::Result<()> {
        let idx = self.label_index(label)?;
        let row = self.row_mut(node_id)?;
        row.fill(Annotation::Negative);
        row[idx] = Annotation::Positive;
        Ok(())
    }

    pub fn set_negative(&mut self, node_id: NodeId, label: &str) -> crate::Result<()> {
        self.set(node_id, label, Annotation::Negative)
    }

    pub fn set_unknown(&mut self, node_id: NodeId, label: &str) -> crate::Result<()> {
        self.set(node_id, label, Annotation::Unknown)
    }

    pub fn set_ignore(&mut self, node_id: NodeId, label: &str) -> crate::Result<()> {
        self.set(node_id, label, Annotation::Ignore)
    }

    pub fn is_positive(&self, node_id: NodeId, label: &str) -> crate::Result<bool> {
        Ok(self.get(node_id, label)? == Annotation::Positive)
    }

    pub fn is_negative(&self, node_id: NodeId, label: &str) -> crate::Result<bool> {
        Ok(self.get(node_id, label)? == Annotation::Negative)
    }

    pub fn is_unknown(&self, node_id: NodeId, label: &str) -> crate::Result<bool> {
        Ok(self.get(node_id, label)? == Annotation::Unknown)
    }

    pub fn is_ignore(&self, node_id: NodeId, label: &str) -> crate::Result<bool> {
        Ok(self.get(node_id, label)? == Annotation::Ignore)
    }

    /// Gold values of all nodes for `label`.
    pub fn column(&self, label: &str) -> crate::Result<GoldColumn> {
        let idx = self.label_index(label)?;
        Ok(self
            .rows
            .iter()
            .map(|(&id, values)| (id, values[idx]))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn starts_unknown_everywhere() {
        let table = AnnotationTable::new([1, 2, 3], &labels(&["X"]));
        for id in 1..=3 {
            assert!(table.is_unknown(id, "X").unwrap());
        }
    }

    #[test]
    fn set_positive_on_single_label() {
        let mut table = AnnotationTable::new([1, 2, 3], &labels(&["X"]));
        table.set_positive(2, "X").unwrap();
        assert!(!table.is_unknown(2, "X").unwrap());
        assert!(table.is_positive(2, "X").unwrap());
        assert!(table.is_unknown(1, "X").unwrap());
        assert!(table.is_unknown(3, "X").unwrap());
    }

    #[test]
    fn set_positive_forces_other_labels_negative() {
        let names = labels(&["change", "increase", "decrease"]);
        let mut table = AnnotationTable::new([1001, 1002], &names);
        table.set_ignore(1001, "change").unwrap();
        table.set_positive(1001, "increase").unwrap();

        assert!(table.is_positive(1001, "increase").unwrap());
        assert!(table.is_negative(1001, "change").unwrap());
        assert!(table.is_negative(1001, "decrease").unwrap());
        assert!(table.is_unknown(1002, "change").unwrap());
    }

    #[test]
    fn set_negative_leaves_other_labels_alone() {
        let names = labels(&["increase", "decrease"]);
        let mut table = AnnotationTable::new([1], &names);
        table.set_positive(1, "increase").unwrap();
        table.set_negative(1, "increase").unwrap();
        table.set_unknown(1, "decrease").unwrap();

        assert!(table.is_negative(1, "increase").unwrap());
        assert!(table.is_unknown(1, "decrease").unwrap());

        table.set_ignore(1, "increase").unwrap();
        assert!(table.is_ignore(1, "increase").unwrap());
    }

    #[test]
    fn invalid_label_and_node_leave_table_unchanged() {
        let mut table = AnnotationTable::new([1], &labels(&["X"]));
        let before = table.clone();

        assert!(matches!(
            table.set_positive(1, "Y"),
            Err(TredevError::InvalidLabel(_))
        ));
        assert!(matches!(
            table.set_positive(9, "X"),
            Err(TredevError::UnknownNode(9))
        ));
        assert!(matches!(table.is_unknown(9, "X"), Err(TredevError::UnknownNode(9))));
        assert_eq!(table, before);
    }

    #[test]
    fn column_follows_node_order() {
        let mut table = AnnotationTable::new([3, 1, 2], &labels(&["X", "Y"]));
        table.set_positive(1, "X").unwrap();
        table.set_negative(3, "X").unwrap();
        assert_eq!(
            table.column("X").unwrap(),
            vec![
                (1, Annotation::Positive),
                (2, Annotation::Unknown),
                (3, Annotation::Negative),
            ]
        );
        assert_eq!(table.column("Y").unwrap()[0], (1, Annotation::Negative));
    }

    #[test]
    fn int_codes_round_trip() {
        for value in [
            Annotation::Positive,
            Annotation::Unknown,
            Annotation::Negative,
            Annotation::Ignore,
        ] {
            assert_eq!(Annotation::from_int(value.as_int()), Some(value));
        }
        assert_eq!(Annotation::from_int(5), None);
    }

    #[test]
    fn duplicate_labels_collapse() {
        let table = AnnotationTable::new([1], &labels(&["X", "X", "Y"]));
        assert_eq!(table.labels(), ["X".to_string(), "Y".to_string()]);
    }
}

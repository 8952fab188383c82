//! Pattern scoring against manual annotations.
//!
//! A pattern predicts positive for every node it matches and negative for
//! every other node. Precision and recall only count nodes whose gold value
//! is positive or negative; unknown nodes are tallied separately
//! (`unk_pos`/`unk_neg`) and ignored nodes not at all. A ratio with a zero
//! denominator is undefined (`None`) rather than zero.

use crate::annotations::Annotation;
use crate::error::TredevError;
use crate::matcher::MatchId;
use crate::nodes::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use tracing::warn;

/// Scores and confusion counts of one pattern for one label
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Scores {
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f_score: Option<f64>,
    pub pred_pos: usize,
    pub pred_neg: usize,
    pub gold_pos: usize,
    pub gold_neg: usize,
    pub gold_unk: usize,
    pub gold_ign: usize,
    pub true_pos: usize,
    pub false_pos: usize,
    pub true_neg: usize,
    pub false_neg: usize,
    pub unk_pos: usize,
    pub unk_neg: usize,
}

/// Score one match set against the gold column of its target label.
///
/// Matches that fall outside the column (nodes the table does not know)
/// cannot be scored and are skipped with a warning.
pub fn score(gold: &[(NodeId, Annotation)], matches: &[MatchId]) -> Scores {
    let predicted: HashSet<NodeId> = matches.iter().map(|m| m.node_id()).collect();
    let known: HashSet<NodeId> = gold.iter().map(|(id, _)| *id).collect();
    let outside = predicted.difference(&known).count();
    if outside > 0 {
        warn!(outside, "matches outside the node table were not scored");
    }

    let mut s = Scores::default();
    for (id, value) in gold {
        let hit = predicted.contains(id);
        if hit {
            s.pred_pos += 1;
        } else {
            s.pred_neg += 1;
        }
        match (value, hit) {
            (Annotation::Positive, true) => s.true_pos += 1,
            (Annotation::Positive, false) => s.false_neg += 1,
            (Annotation::Negative, true) => s.false_pos += 1,
            (Annotation::Negative, false) => s.true_neg += 1,
            (Annotation::Unknown, true) => s.unk_pos += 1,
            (Annotation::Unknown, false) => s.unk_neg += 1,
            (Annotation::Ignore, _) => {}
        }
        match value {
            Annotation::Positive => s.gold_pos += 1,
            Annotation::Negative => s.gold_neg += 1,
            Annotation::Unknown => s.gold_unk += 1,
            Annotation::Ignore => s.gold_ign += 1,
        }
    }

    s.precision = percentage(s.true_pos, s.true_pos + s.false_pos);
    s.recall = percentage(s.true_pos, s.true_pos + s.false_neg);
    s.f_score = harmonic_mean(s.precision, s.recall);
    s
}

fn percentage(numerator: usize, denominator: usize) -> Option<f64> {
    (denominator > 0).then(|| numerator as f64 / denominator as f64 * 100.0)
}

fn harmonic_mean(precision: Option<f64>, recall: Option<f64>) -> Option<f64> {
    let (p, r) = (precision?, recall?);
    let sum = p + r;
    (sum > 0.0).then(|| 2.0 * p * r / sum)
}

/// Render a possibly undefined score with two decimals.
pub fn format_score(value: Option<f64>) -> String {
    match value {
        Some(v) => format!("{v:.2}"),
        None => "NaN".to_string(),
    }
}

/// Columns of a score row, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScoreColumn {
    Precision,
    Recall,
    FScore,
    PredPos,
    PredNeg,
    GoldPos,
    GoldNeg,
    GoldUnk,
    GoldIgn,
    TruePos,
    FalsePos,
    TrueNeg,
    FalseNeg,
    UnkPos,
    UnkNeg,
}

impl ScoreColumn {
    pub const ALL: [ScoreColumn; 15] = [
        Self::Precision,
        Self::Recall,
        Self::FScore,
        Self::PredPos,
        Self::PredNeg,
        Self::GoldPos,
        Self::GoldNeg,
        Self::GoldUnk,
        Self::GoldIgn,
        Self::TruePos,
        Self::FalsePos,
        Self::TrueNeg,
        Self::FalseNeg,
        Self::UnkPos,
        Self::UnkNeg,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Precision => "precision",
            Self::Recall => "recall",
            Self::FScore => "f_score",
            Self::PredPos => "#pred_pos",
            Self::PredNeg => "#pred_neg",
            Self::GoldPos => "#gold_pos",
            Self::GoldNeg => "#gold_neg",
            Self::GoldUnk => "#gold_unk",
            Self::GoldIgn => "#gold_ign",
            Self::TruePos => "#true_pos",
            Self::FalsePos => "#false_pos",
            Self::TrueNeg => "#true_neg",
            Self::FalseNeg => "#false_neg",
            Self::UnkPos => "#unk_pos",
            Self::UnkNeg => "#unk_neg",
        }
    }

    pub fn is_ratio(self) -> bool {
        matches!(self, Self::Precision | Self::Recall | Self::FScore)
    }
}

impl FromStr for ScoreColumn {
    type Err = TredevError;

    /// Accepts column names with or without the leading `#`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().trim_start_matches('#');
        Self::ALL
            .into_iter()
            .find(|c| c.name().trim_start_matches('#') == wanted)
            .ok_or_else(|| TredevError::UnknownColumn(s.to_string()))
    }
}

impl Scores {
    /// Value of one column; counts are always defined.
    pub fn value(&self, column: ScoreColumn) -> Option<f64> {
        let count = match column {
            ScoreColumn::Precision => return self.precision,
            ScoreColumn::Recall => return self.recall,
            ScoreColumn::FScore => return self.f_score,
            ScoreColumn::PredPos => self.pred_pos,
            ScoreColumn::PredNeg => self.pred_neg,
            ScoreColumn::GoldPos => self.gold_pos,
            ScoreColumn::GoldNeg => self.gold_neg,
            ScoreColumn::GoldUnk => self.gold_unk,
            ScoreColumn::GoldIgn => self.gold_ign,
            ScoreColumn::TruePos => self.true_pos,
            ScoreColumn::FalsePos => self.false_pos,
            ScoreColumn::TrueNeg => self.true_neg,
            ScoreColumn::FalseNeg => self.false_neg,
            ScoreColumn::UnkPos => self.unk_pos,
            ScoreColumn::UnkNeg => self.unk_neg,
        };
        Some(count as f64)
    }

    /// Cell text for one column.
    pub fn cell(&self, column: ScoreColumn) -> String {
        if column.is_ratio() {
            format_score(self.value(column))
        } else {
            self.value(column).map(|v| v as usize).unwrap_or(0).to_string()
        }
    }
}

impl std::fmt::Display for Scores {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for column in ScoreColumn::ALL {
            writeln!(f, "{:12} : {}", column.name(), self.cell(column))?;
        }
        Ok(())
    }
}

/// Latest scores per pattern name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreTable {
    rows: BTreeMap<String, Scores>,
}

impl ScoreTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Score a match set; with a name, store the row, replacing any previous one.
    pub fn score_pattern(
        &mut self,
        gold: &[(NodeId, Annotation)],
        matches: &[MatchId],
        name: Option<&str>,
    ) -> Scores {
        let scores = score(gold, matches);
        if let Some(name) = name {
            self.rows.insert(name.to_string(), scores);
        }
        scores
    }

    pub fn get(&self, name: &str) -> Option<&Scores> {
        self.rows.get(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Scores> {
        self.rows.remove(name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Scores)> {
        self.rows.iter().map(|(name, scores)| (name.as_str(), scores))
    }
}

impl FromIterator<(String, Scores)> for ScoreTable {
    fn from_iter<I: IntoIterator<Item = (String, Scores)>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

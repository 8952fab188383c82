//! A pattern development session: node, annotation, pattern and score tables
//! over one corpus, plus the matcher used to evaluate patterns.

use crate::annotations::AnnotationTable;
use crate::config::Config;
use crate::corpus::Corpus;
use crate::error::TredevError;
use crate::matcher::{MatchId, Matcher, TregexMatcher};
use crate::nodes::NodeStore;
use crate::patterns::PatternTable;
use crate::scoring::{ScoreColumn, ScoreTable, Scores};
use crate::store::{self, SnapshotPaths};
use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use std::path::Path;
use tracing::{info, warn};

/// Which patterns an operation applies to
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Scope {
    #[default]
    All,
    Label(String),
    Name(String),
}

/// Result of a batch rescore: patterns whose rows were updated, and the
/// ones whose matcher run failed (their previous rows are kept).
#[derive(Debug, Default)]
pub struct RescoreOutcome {
    pub scored: Vec<String>,
    pub failed: Vec<(String, TredevError)>,
}

/// One line of a score report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub name: String,
    pub pattern: String,
    pub label: String,
    #[serde(flatten)]
    pub scores: Scores,
    pub comment: String,
}

pub struct Session {
    nodes: NodeStore,
    annots: AnnotationTable,
    patterns: PatternTable,
    scores: ScoreTable,
    corpus: Corpus,
    matcher: Box<dyn Matcher>,
    nodes_saved: bool,
}

impl Session {
    /// Start a new session: parse the corpus and mark every node unknown for every label.
    pub fn from_corpus(corpus_dir: &Path, labels: &[String], config: &Config) -> crate::Result<Self> {
        if labels.is_empty() {
            return Err(TredevError::NoLabels);
        }
        let corpus = Corpus::new(corpus_dir, &config.corpus.ignore)?;
        let nodes = NodeStore::from_corpus(&corpus)?;
        let annots = AnnotationTable::from_nodes(&nodes, labels);
        Ok(Self {
            nodes,
            annots,
            patterns: PatternTable::new(),
            scores: ScoreTable::new(),
            corpus,
            matcher: Box::new(TregexMatcher::from_config(&config.matcher)),
            nodes_saved: false,
        })
    }

    /// Resume a saved session.
    ///
    /// A corpus that changed since the node table was saved is reported but
    /// not fatal: tables still load, though new matches may not line up.
    pub fn load(prefix: &Path, corpus_dir: &Path, config: &Config) -> crate::Result<Self> {
        let paths = SnapshotPaths::new(prefix);
        let (nodes, digest) = store::load_nodes(&paths.nodes)?;
        let annots = store::load_annotations(&paths.annots)?;
        let patterns = store::load_patterns(&paths.patterns)?;
        let scores = store::load_scores(&paths.scores)?;
        let corpus = Corpus::new(corpus_dir, &config.corpus.ignore)?;

        let session = Self {
            nodes,
            annots,
            patterns,
            scores,
            corpus,
            matcher: Box::new(TregexMatcher::from_config(&config.matcher)),
            nodes_saved: true,
        };
        if let Some(saved) = digest {
            if let Err(e) = session.check_corpus(&saved) {
                warn!(error = %e, "loaded session may be out of date");
            }
        }
        info!(
            nodes = session.nodes.len(),
            patterns = session.patterns.len(),
            "loaded session"
        );
        Ok(session)
    }

    /// Replace the matcher (for tests or alternative matching engines).
    pub fn with_matcher(mut self, matcher: impl Matcher + 'static) -> Self {
        self.matcher = Box::new(matcher);
        self
    }

    /// Verify the corpus on disk still has the digest recorded at save time.
    pub fn check_corpus(&self, saved_digest: &str) -> crate::Result<()> {
        if self.corpus.digest()? != saved_digest {
            return Err(TredevError::CorpusMismatch(self.corpus.root().to_path_buf()));
        }
        Ok(())
    }

    /// Write all tables under `prefix`. The node table never changes during
    /// a session, so it is only written if it is not on disk yet.
    pub fn save(&mut self, prefix: &Path) -> crate::Result<()> {
        let paths = SnapshotPaths::new(prefix);
        if !self.nodes_saved || !paths.nodes.exists() {
            store::save_nodes(&paths.nodes, &self.nodes, &self.corpus.digest()?)?;
            self.nodes_saved = true;
        }
        store::save_annotations(&paths.annots, &self.annots)?;
        store::save_patterns(&paths.patterns, &self.patterns)?;
        store::save_scores(&paths.scores, &self.scores)?;
        info!(prefix = %prefix.display(), "saved session");
        Ok(())
    }

    pub fn nodes(&self) -> &NodeStore {
        &self.nodes
    }

    pub fn annotations(&self) -> &AnnotationTable {
        &self.annots
    }

    pub fn annotations_mut(&mut self) -> &mut AnnotationTable {
        &mut self.annots
    }

    pub fn patterns(&self) -> &PatternTable {
        &self.patterns
    }

    pub fn scores(&self) -> &ScoreTable {
        &self.scores
    }

    pub fn corpus_dir(&self) -> &Path {
        self.corpus.root()
    }

    /// Unique matches of `pattern` over the corpus.
    pub fn matches(&self, pattern: &str) -> crate::Result<Vec<MatchId>> {
        self.matcher.matches(pattern, self.corpus.root())
    }

    /// Score a match set for `label` without storing it.
    pub fn evaluate(&self, label: &str, matches: &[MatchId]) -> crate::Result<Scores> {
        let gold = self.annots.column(label)?;
        Ok(crate::scoring::score(&gold, matches))
    }

    fn require_label(&self, label: &str) -> crate::Result<()> {
        if self.annots.has_label(label) {
            Ok(())
        } else {
            Err(TredevError::InvalidLabel(label.to_string()))
        }
    }

    /// Add a named pattern and store its score.
    ///
    /// The matcher runs before anything is inserted, so a failed run leaves
    /// both the pattern and score tables untouched.
    pub fn add(
        &mut self,
        name: &str,
        pattern: &str,
        label: &str,
        comment: &str,
    ) -> crate::Result<Scores> {
        self.require_label(label)?;
        if self.patterns.contains(name) {
            return Err(TredevError::DuplicateName(name.to_string()));
        }
        let matches = self.matches(pattern)?;
        let gold = self.annots.column(label)?;

        self.patterns.add(name, pattern, label, comment)?;
        Ok(self.scores.score_pattern(&gold, &matches, Some(name)))
    }

    /// Remove a pattern and its score row.
    pub fn remove(&mut self, name: &str) -> crate::Result<()> {
        self.patterns.remove(name)?;
        self.scores.remove(name);
        Ok(())
    }

    fn select(&self, scope: &Scope) -> crate::Result<Vec<(String, String, String)>> {
        let jobs = match scope {
            Scope::All => self
                .patterns
                .iter()
                .map(|(name, e)| (name.to_string(), e.pattern.clone(), e.label.clone()))
                .collect(),
            Scope::Label(label) => {
                self.require_label(label)?;
                self.patterns
                    .with_label(label)
                    .map(|(name, e)| (name.to_string(), e.pattern.clone(), e.label.clone()))
                    .collect()
            }
            Scope::Name(name) => {
                let e = self.patterns.get(name)?;
                vec![(name.clone(), e.pattern.clone(), e.label.clone())]
            }
        };
        Ok(jobs)
    }

    /// Recompute scores for the patterns in `scope`.
    ///
    /// Matcher runs are independent and execute in parallel; a failed run
    /// is recorded in the outcome and does not stop the others.
    pub fn rescore(&mut self, scope: &Scope) -> crate::Result<RescoreOutcome> {
        let jobs = self.select(scope)?;
        let matcher = self.matcher.as_ref();
        let corpus = self.corpus.root();

        let runs: Vec<_> = jobs
            .into_par_iter()
            .map(|(name, pattern, label)| {
                let matches = matcher.matches(&pattern, corpus);
                (name, label, matches)
            })
            .collect();

        let mut outcome = RescoreOutcome::default();
        for (name, label, matches) in runs {
            let result = matches.and_then(|matches| {
                let gold = self.annots.column(&label)?;
                Ok(self.scores.score_pattern(&gold, &matches, Some(&name)))
            });
            match result {
                Ok(_) => outcome.scored.push(name),
                Err(e) => {
                    warn!(pattern = %name, error = %e, "rescoring failed");
                    outcome.failed.push((name, e));
                }
            }
        }
        Ok(outcome)
    }

    /// Patterns joined with their scores, filtered by `scope` and sorted by
    /// `column` in descending order. Undefined values sort last.
    pub fn report(&self, scope: &Scope, column: ScoreColumn) -> crate::Result<Vec<ReportRow>> {
        match scope {
            Scope::All => {}
            Scope::Label(label) => self.require_label(label)?,
            Scope::Name(name) => {
                self.patterns.get(name)?;
            }
        }

        let mut rows: Vec<ReportRow> = self
            .patterns
            .iter()
            .filter(|(name, entry)| match scope {
                Scope::All => true,
                Scope::Label(label) => &entry.label == label,
                Scope::Name(wanted) => *name == wanted.as_str(),
            })
            .filter_map(|(name, entry)| {
                self.scores.get(name).map(|scores| ReportRow {
                    name: name.to_string(),
                    pattern: entry.pattern.clone(),
                    label: entry.label.clone(),
                    scores: *scores,
                    comment: entry.comment.clone(),
                })
            })
            .collect();

        rows.sort_by(|a, b| {
            match (a.scores.value(column), b.scores.value(column)) {
                (Some(x), Some(y)) => y.total_cmp(&x),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            }
        });
        Ok(rows)
    }
}

/// Plain-text table of report rows; the comment column comes last.
pub fn render_report(rows: &[ReportRow]) -> String {
    let mut header: Vec<String> = vec!["name".into(), "pattern".into(), "label".into()];
    header.extend(ScoreColumn::ALL.iter().map(|c| c.name().to_string()));
    header.push("comment".into());

    let body: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            let mut cells = vec![row.name.clone(), row.pattern.clone(), row.label.clone()];
            cells.extend(ScoreColumn::ALL.iter().map(|&c| row.scores.cell(c)));
            cells.push(row.comment.clone());
            cells
        })
        .collect();

    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for cells in &body {
        for (w, cell) in widths.iter_mut().zip(cells) {
            *w = (*w).max(cell.chars().count());
        }
    }

    // Name, pattern and label are left aligned, scores right aligned.
    let numeric = |i: usize| (3..3 + ScoreColumn::ALL.len()).contains(&i);
    let line = |cells: &[String]| -> String {
        let padded: Vec<String> = cells
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let last = i + 1 == cells.len();
                if numeric(i) {
                    format!("{:>width$}", cell, width = widths[i])
                } else if last {
                    cell.clone()
                } else {
                    format!("{:<width$}", cell, width = widths[i])
                }
            })
            .collect();
        padded.join("  ").trim_end().to_string()
    };

    let mut out = line(&header);
    out.push('\n');
    for cells in &body {
        out.push_str(&line(cells));
        out.push('\n');
    }
    out
}

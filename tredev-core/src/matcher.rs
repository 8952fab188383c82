//! External tree matcher (e.g. Tregex) invocation.

use crate::config::MatcherConfig;
use crate::error::TredevError;
use crate::nodes::{node_id, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use tracing::debug;

/// A matched node as reported by the matcher: `<tree>:<node>`, both 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatchId {
    pub tree: u64,
    pub node: u64,
}

impl MatchId {
    pub fn new(tree: u64, node: u64) -> Self {
        Self { tree, node }
    }

    pub fn node_id(self) -> NodeId {
        node_id(self.tree, self.node)
    }
}

impl FromStr for MatchId {
    type Err = TredevError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || TredevError::MatchParse(s.to_string());
        let (tree, node) = s.split_once(':').ok_or_else(bad)?;
        Ok(Self {
            tree: tree.parse().map_err(|_| bad())?,
            node: node.parse().map_err(|_| bad())?,
        })
    }
}

impl std::fmt::Display for MatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.tree, self.node)
    }
}

/// Parse whitespace-separated `<tree>:<node>` tokens.
///
/// The matcher can report the same node more than once, so duplicates are
/// dropped, keeping the first occurrence.
pub fn parse_matches(output: &str) -> crate::Result<Vec<MatchId>> {
    let mut seen = HashSet::new();
    let mut matches = Vec::new();
    for token in output.split_whitespace() {
        let m: MatchId = token.parse()?;
        if seen.insert(m) {
            matches.push(m);
        }
    }
    Ok(matches)
}

/// Source of pattern matches over a corpus.
pub trait Matcher: Send + Sync {
    /// Unique matches of `pattern` in the corpus at `corpus`, in reported order.
    fn matches(&self, pattern: &str, corpus: &Path) -> crate::Result<Vec<MatchId>>;
}

/// Runs an external matcher as `<exec_path> <options...> <pattern> <corpus>`.
#[derive(Debug, Clone)]
pub struct TregexMatcher {
    exec_path: PathBuf,
    options: Vec<String>,
}

impl TregexMatcher {
    pub fn new(exec_path: impl Into<PathBuf>, options: Vec<String>) -> Self {
        Self {
            exec_path: exec_path.into(),
            options,
        }
    }

    pub fn from_config(config: &MatcherConfig) -> Self {
        Self::new(config.exec_path.clone(), config.options.clone())
    }

    /// Raw stdout of one matcher run.
    pub fn call(&self, pattern: &str, corpus: &Path) -> crate::Result<String> {
        debug!(
            exec = %self.exec_path.display(),
            pattern,
            corpus = %corpus.display(),
            "running matcher"
        );

        let output = Command::new(&self.exec_path)
            .args(&self.options)
            .arg(pattern)
            .arg(corpus)
            .output()
            .map_err(|source| TredevError::MatcherSpawn {
                exec_path: self.exec_path.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(TredevError::MatcherFailed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Matcher for TregexMatcher {
    fn matches(&self, pattern: &str, corpus: &Path) -> crate::Result<Vec<MatchId>> {
        let matches = parse_matches(&self.call(pattern, corpus)?)?;
        debug!(pattern, count = matches.len(), "matcher finished");
        Ok(matches)
    }
}

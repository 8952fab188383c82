//! Configuration for tredev

use crate::TredevError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration as TOML
pub const DEFAULT_CONFIG: &str = r#"# tredev configuration

[session]
# Common path prefix for the four data files
# (<prefix>_nodes.db, <prefix>_annots.db, <prefix>_patterns.db, <prefix>_scores.db)
prefix = "tredev"
# Directory with files containing one bracketed parse tree per line
corpus_dir = "parses"
# Annotation labels (targets for patterns); assumed mutually exclusive
labels = []

[matcher]
# External tree matcher, invoked as: <exec_path> <options...> <pattern> <corpus_dir>
exec_path = "tregex.sh"
# "-x" makes tregex print <tree>:<node> identifiers of matched nodes
options = ["-x"]

[corpus]
# File name patterns skipped while reading the corpus directory
ignore = [
    ".DS_Store",
    "._*",
    "Thumbs.db",
    "desktop.ini",
]

[report]
# Score column used for sorting reports (descending)
sort_by = "precision"
"#;

/// tredev configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub report: ReportConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_corpus_dir")]
    pub corpus_dir: PathBuf,
    #[serde(default)]
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    #[serde(default = "default_exec_path")]
    pub exec_path: PathBuf,
    #[serde(default = "default_matcher_options")]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    #[serde(default = "default_ignore_patterns")]
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_sort_by")]
    pub sort_by: String,
}

// Default value functions
fn default_prefix() -> String {
    "tredev".to_string()
}
fn default_corpus_dir() -> PathBuf {
    PathBuf::from("parses")
}
fn default_exec_path() -> PathBuf {
    PathBuf::from("tregex.sh")
}
fn default_matcher_options() -> Vec<String> {
    vec!["-x".to_string()]
}
fn default_ignore_patterns() -> Vec<String> {
    vec![
        ".DS_Store".to_string(),
        "._*".to_string(),
        "Thumbs.db".to_string(),
        "desktop.ini".to_string(),
    ]
}
fn default_sort_by() -> String {
    "precision".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            corpus_dir: default_corpus_dir(),
            labels: Vec::new(),
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            exec_path: default_exec_path(),
            options: default_matcher_options(),
        }
    }
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            ignore: default_ignore_patterns(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            sort_by: default_sort_by(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse config from TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        toml::from_str(content).map_err(|e| TredevError::ConfigParse(e.to_string()))
    }

    /// Write the commented default config to `path`, refusing to overwrite.
    pub fn write_default(path: &Path) -> crate::Result<()> {
        if path.exists() {
            return Err(TredevError::ConfigExists(path.to_path_buf()));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, DEFAULT_CONFIG)?;
        Ok(())
    }
}

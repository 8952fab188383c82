//! Error types for tredev operations

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum TredevError {
    #[error("invalid label \"{0}\"")]
    InvalidLabel(String),

    #[error("pattern with name '{0}' already exists")]
    DuplicateName(String),

    #[error("unknown name \"{0}\"")]
    UnknownName(String),

    #[error("unknown node id {0}")]
    UnknownNode(u64),

    #[error("tree {tree} in {} has more than {max} nodes", .path.display())]
    TreeTooLarge {
        path: PathBuf,
        tree: u64,
        max: u64,
    },

    #[error("unparsable match identifier \"{0}\" (expected <tree>:<node>)")]
    MatchParse(String),

    #[error("failed to run matcher {}: {source}", .exec_path.display())]
    MatcherSpawn {
        exec_path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("matcher exited with {status}: {stderr}")]
    MatcherFailed { status: String, stderr: String },

    #[error("corpus at {} no longer matches the saved node table (reparse required)", .0.display())]
    CorpusMismatch(PathBuf),

    #[error("Corpus directory not found: {}", .0.display())]
    CorpusNotFound(PathBuf),

    #[error("Snapshot not found: {}", .0.display())]
    SnapshotNotFound(PathBuf),

    #[error("Schema version mismatch in {}: file is v{found}, expected v{expected}", .path.display())]
    SchemaVersionMismatch {
        path: PathBuf,
        found: i32,
        expected: i32,
    },

    #[error("Corrupt snapshot {}: node {node_id}: {reason}", .path.display())]
    CorruptSnapshot {
        path: PathBuf,
        node_id: u64,
        reason: String,
    },

    #[error("no annotation labels given (use --labels or [session] labels)")]
    NoLabels,

    #[error("Session already exists at {} (remove its files to start over)", .0.display())]
    SessionExists(PathBuf),

    #[error("Config already exists at {}", .0.display())]
    ConfigExists(PathBuf),

    #[error("Config parse error: {0}")]
    ConfigParse(String),

    #[error("Glob pattern error: {0}")]
    GlobPattern(String),

    #[error("unknown score column \"{0}\"")]
    UnknownColumn(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TredevError {
    /// Validation errors are reported to the user and the session continues.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidLabel(_)
                | Self::DuplicateName(_)
                | Self::UnknownName(_)
                | Self::UnknownNode(_)
                | Self::UnknownColumn(_)
                | Self::NoLabels
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_classified() {
        assert!(TredevError::DuplicateName("p1".into()).is_validation());
        assert!(TredevError::UnknownNode(1001).is_validation());
        assert!(!TredevError::MatcherFailed {
            status: "exit status: 1".into(),
            stderr: String::new(),
        }
        .is_validation());
    }

    #[test]
    fn messages_name_the_offender() {
        let err = TredevError::InvalidLabel("increse".into());
        assert_eq!(err.to_string(), "invalid label \"increse\"");
        let err = TredevError::DuplicateName("p1".into());
        assert_eq!(err.to_string(), "pattern with name 'p1' already exists");
    }
}

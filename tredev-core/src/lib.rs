//! Tredev Core - Tree pattern development against annotated treebanks
//!
//! This library parses bracketed constituency trees into a node table,
//! keeps gold annotations per node and label, runs tree patterns through
//! an external matcher, and scores the matches against the gold standard.

pub mod annotate;
pub mod annotations;
pub mod config;
pub mod corpus;
pub mod error;
pub mod matcher;
pub mod nodes;
pub mod patterns;
pub mod scoring;
pub mod session;
pub mod store;

pub use annotate::{annotate, reannotate, AnnotationLoop, Command, CommandSource, LineCommands};
pub use annotations::{Annotation, AnnotationTable};
pub use config::Config;
pub use corpus::Corpus;
pub use error::TredevError;
pub use matcher::{MatchId, Matcher, TregexMatcher};
pub use nodes::{Node, NodeId, NodeStore};
pub use patterns::{PatternEntry, PatternTable};
pub use scoring::{ScoreColumn, ScoreTable, Scores};
pub use session::{render_report, ReportRow, RescoreOutcome, Scope, Session};
pub use store::SnapshotPaths;

/// Result type alias for tredev operations
pub type Result<T> = std::result::Result<T, TredevError>;

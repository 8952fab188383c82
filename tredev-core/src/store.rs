//! SQLite snapshots of the four session tables.
//!
//! Each table lives in its own database file next to the others:
//! `<prefix>_nodes.db`, `<prefix>_annots.db`, `<prefix>_patterns.db` and
//! `<prefix>_scores.db`. A save replaces the whole table in one transaction;
//! there is no recovery across files if a save is interrupted halfway.

use crate::annotations::{Annotation, AnnotationTable};
use crate::error::TredevError;
use crate::nodes::{Node, NodeId, NodeStore};
use crate::patterns::{PatternEntry, PatternTable};
use crate::scoring::{ScoreTable, Scores};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use std::path::{Path, PathBuf};
use tracing::debug;

const SCHEMA_VERSION: i32 = 1;

/// File locations of the four tables for one path prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotPaths {
    pub nodes: PathBuf,
    pub annots: PathBuf,
    pub patterns: PathBuf,
    pub scores: PathBuf,
}

impl SnapshotPaths {
    pub fn new(prefix: impl AsRef<Path>) -> Self {
        let prefix = prefix.as_ref().as_os_str().to_string_lossy().into_owned();
        let with = |suffix: &str| PathBuf::from(format!("{prefix}_{suffix}.db"));
        Self {
            nodes: with("nodes"),
            annots: with("annots"),
            patterns: with("patterns"),
            scores: with("scores"),
        }
    }

    pub fn exist(&self) -> bool {
        [&self.nodes, &self.annots, &self.patterns, &self.scores]
            .iter()
            .all(|p| p.exists())
    }
}

fn open(path: &Path, schema: &str) -> crate::Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA synchronous = NORMAL;")?;

    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version != 0 && version != SCHEMA_VERSION {
        return Err(TredevError::SchemaVersionMismatch {
            path: path.to_path_buf(),
            found: version,
            expected: SCHEMA_VERSION,
        });
    }
    if version == 0 {
        conn.execute_batch(schema)?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    }
    Ok(conn)
}

/// Open a saved table read-only. Files without the current schema version
/// are rejected rather than upgraded in place.
fn open_existing(path: &Path) -> crate::Result<Connection> {
    if !path.exists() {
        return Err(TredevError::SnapshotNotFound(path.to_path_buf()));
    }
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    if version != SCHEMA_VERSION {
        return Err(TredevError::SchemaVersionMismatch {
            path: path.to_path_buf(),
            found: version,
            expected: SCHEMA_VERSION,
        });
    }
    Ok(conn)
}

fn set_meta(conn: &Connection, key: &str, value: &str) -> crate::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)",
        params![key, value],
    )?;
    Ok(())
}

fn get_meta(conn: &Connection, key: &str) -> crate::Result<Option<String>> {
    Ok(conn
        .query_row("SELECT value FROM meta WHERE key = ?", params![key], |row| {
            row.get(0)
        })
        .optional()?)
}

const NODES_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS nodes (
        node_id INTEGER PRIMARY KEY,
        label TEXT NOT NULL,
        parent INTEGER NOT NULL,
        children TEXT NOT NULL
    );
";

/// Write the node table together with the digest of the corpus it came from.
pub fn save_nodes(path: &Path, nodes: &NodeStore, corpus_digest: &str) -> crate::Result<()> {
    let mut conn = open(path, NODES_SCHEMA)?;
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM nodes", [])?;
    {
        let mut stmt =
            tx.prepare("INSERT INTO nodes (node_id, label, parent, children) VALUES (?, ?, ?, ?)")?;
        for node in nodes.iter() {
            stmt.execute(params![
                node.id as i64,
                node.label,
                node.parent.unwrap_or(0) as i64,
                serde_json::to_string(&node.children)?,
            ])?;
        }
    }
    set_meta(&tx, "corpus_digest", corpus_digest)?;
    tx.commit()?;
    debug!(path = %path.display(), nodes = nodes.len(), "saved node table");
    Ok(())
}

/// Read the node table and the corpus digest recorded with it.
pub fn load_nodes(path: &Path) -> crate::Result<(NodeStore, Option<String>)> {
    let conn = open_existing(path)?;
    let mut stmt =
        conn.prepare("SELECT node_id, label, parent, children FROM nodes ORDER BY node_id")?;
    let rows = stmt.query_map([], |row| {
        let id: i64 = row.get(0)?;
        let label: String = row.get(1)?;
        let parent: i64 = row.get(2)?;
        let children: String = row.get(3)?;
        Ok((id, label, parent, children))
    })?;

    let mut nodes = Vec::new();
    for row in rows {
        let (id, label, parent, children) = row?;
        nodes.push(Node {
            id: id as NodeId,
            label,
            parent: (parent != 0).then_some(parent as NodeId),
            children: serde_json::from_str(&children)?,
        });
    }
    let digest = get_meta(&conn, "corpus_digest")?;
    Ok((NodeStore::from_nodes(nodes), digest))
}

const ANNOTS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS meta (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS annotations (
        node_id INTEGER PRIMARY KEY,
        vals TEXT NOT NULL
    );
";

/// Write the annotation table; values are stored as integer codes, one per label.
pub fn save_annotations(path: &Path, annots: &AnnotationTable) -> crate::Result<()> {
    let mut conn = open(path, ANNOTS_SCHEMA)?;
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM annotations", [])?;
    {
        let mut stmt = tx.prepare("INSERT INTO annotations (node_id, vals) VALUES (?, ?)")?;
        for (id, values) in annots.rows() {
            let codes: Vec<i8> = values.iter().map(|v| v.as_int()).collect();
            stmt.execute(params![id as i64, serde_json::to_string(&codes)?])?;
        }
    }
    set_meta(&tx, "labels", &serde_json::to_string(annots.labels())?)?;
    tx.commit()?;
    debug!(path = %path.display(), rows = annots.len(), "saved annotation table");
    Ok(())
}

pub fn load_annotations(path: &Path) -> crate::Result<AnnotationTable> {
    let conn = open_existing(path)?;
    let labels: Vec<String> = match get_meta(&conn, "labels")? {
        Some(json) => serde_json::from_str(&json)?,
        None => Vec::new(),
    };

    let mut stmt = conn.prepare("SELECT node_id, vals FROM annotations ORDER BY node_id")?;
    let rows = stmt.query_map([], |row| {
        let id: i64 = row.get(0)?;
        let vals: String = row.get(1)?;
        Ok((id, vals))
    })?;

    let mut table_rows = Vec::new();
    for row in rows {
        let (id, vals) = row?;
        let node_id = id as NodeId;
        let corrupt = |reason: String| TredevError::CorruptSnapshot {
            path: path.to_path_buf(),
            node_id,
            reason,
        };

        let codes: Vec<i8> = serde_json::from_str(&vals)?;
        if codes.len() != labels.len() {
            return Err(corrupt(format!(
                "{} values for {} labels",
                codes.len(),
                labels.len()
            )));
        }
        let values = codes
            .into_iter()
            .map(|c| Annotation::from_int(c).ok_or_else(|| corrupt(format!("annotation code {c}"))))
            .collect::<crate::Result<Vec<_>>>()?;
        table_rows.push((node_id, values));
    }
    Ok(AnnotationTable::from_rows(labels, table_rows))
}

const PATTERNS_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS patterns (
        name TEXT PRIMARY KEY,
        pattern TEXT NOT NULL,
        label TEXT NOT NULL,
        comment TEXT NOT NULL DEFAULT ''
    );
";

pub fn save_patterns(path: &Path, patterns: &PatternTable) -> crate::Result<()> {
    let mut conn = open(path, PATTERNS_SCHEMA)?;
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM patterns", [])?;
    {
        let mut stmt = tx
            .prepare("INSERT INTO patterns (name, pattern, label, comment) VALUES (?, ?, ?, ?)")?;
        for (name, entry) in patterns.iter() {
            stmt.execute(params![name, entry.pattern, entry.label, entry.comment])?;
        }
    }
    tx.commit()?;
    debug!(path = %path.display(), rows = patterns.len(), "saved pattern table");
    Ok(())
}

pub fn load_patterns(path: &Path) -> crate::Result<PatternTable> {
    let conn = open_existing(path)?;
    let mut stmt = conn.prepare("SELECT name, pattern, label, comment FROM patterns")?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, String>(0)?,
            PatternEntry {
                pattern: row.get(1)?,
                label: row.get(2)?,
                comment: row.get(3)?,
            },
        ))
    })?;
    Ok(rows.collect::<Result<PatternTable, _>>()?)
}

const SCORES_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS scores (
        name TEXT PRIMARY KEY,
        precision REAL,
        recall REAL,
        f_score REAL,
        pred_pos INTEGER NOT NULL,
        pred_neg INTEGER NOT NULL,
        gold_pos INTEGER NOT NULL,
        gold_neg INTEGER NOT NULL,
        gold_unk INTEGER NOT NULL,
        gold_ign INTEGER NOT NULL,
        true_pos INTEGER NOT NULL,
        false_pos INTEGER NOT NULL,
        true_neg INTEGER NOT NULL,
        false_neg INTEGER NOT NULL,
        unk_pos INTEGER NOT NULL,
        unk_neg INTEGER NOT NULL
    );
";

/// Write the score table; undefined ratios are stored as NULL.
pub fn save_scores(path: &Path, scores: &ScoreTable) -> crate::Result<()> {
    let mut conn = open(path, SCORES_SCHEMA)?;
    let tx = conn.transaction()?;
    tx.execute("DELETE FROM scores", [])?;
    {
        let mut stmt = tx.prepare(
            "INSERT INTO scores
             (name, precision, recall, f_score, pred_pos, pred_neg, gold_pos, gold_neg,
              gold_unk, gold_ign, true_pos, false_pos, true_neg, false_neg, unk_pos, unk_neg)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;
        for (name, s) in scores.iter() {
            stmt.execute(params![
                name,
                s.precision,
                s.recall,
                s.f_score,
                s.pred_pos as i64,
                s.pred_neg as i64,
                s.gold_pos as i64,
                s.gold_neg as i64,
                s.gold_unk as i64,
                s.gold_ign as i64,
                s.true_pos as i64,
                s.false_pos as i64,
                s.true_neg as i64,
                s.false_neg as i64,
                s.unk_pos as i64,
                s.unk_neg as i64,
            ])?;
        }
    }
    tx.commit()?;
    debug!(path = %path.display(), rows = scores.len(), "saved score table");
    Ok(())
}

pub fn load_scores(path: &Path) -> crate::Result<ScoreTable> {
    let conn = open_existing(path)?;
    let mut stmt = conn.prepare(
        "SELECT name, precision, recall, f_score, pred_pos, pred_neg, gold_pos, gold_neg,
                gold_unk, gold_ign, true_pos, false_pos, true_neg, false_neg, unk_pos, unk_neg
         FROM scores",
    )?;
    let rows = stmt.query_map([], |row| {
        let count = |idx: usize| -> rusqlite::Result<usize> { Ok(row.get::<_, i64>(idx)? as usize) };
        Ok((
            row.get::<_, String>(0)?,
            Scores {
                precision: row.get(1)?,
                recall: row.get(2)?,
                f_score: row.get(3)?,
                pred_pos: count(4)?,
                pred_neg: count(5)?,
                gold_pos: count(6)?,
                gold_neg: count(7)?,
                gold_unk: count(8)?,
                gold_ign: count(9)?,
                true_pos: count(10)?,
                false_pos: count(11)?,
                true_neg: count(12)?,
                false_neg: count(13)?,
                unk_pos: count(14)?,
                unk_neg: count(15)?,
            },
        ))
    })?;
    Ok(rows.collect::<Result<ScoreTable, _>>()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::MatchId;
    use tempfile::TempDir;

    fn sample_nodes() -> NodeStore {
        let mut nodes = NodeStore::default();
        nodes
            .parse_text(
                "(S (NP (DT The) (NN cat)) (VP (VBD sat)))\n(S (-LRB- -LRB-) (X y))",
                Path::new("t.mrg"),
            )
            .unwrap();
        nodes
    }

    #[test]
    fn paths_share_prefix() {
        let paths = SnapshotPaths::new("data/sample");
        assert_eq!(paths.nodes, PathBuf::from("data/sample_nodes.db"));
        assert_eq!(paths.annots, PathBuf::from("data/sample_annots.db"));
        assert_eq!(paths.patterns, PathBuf::from("data/sample_patterns.db"));
        assert_eq!(paths.scores, PathBuf::from("data/sample_scores.db"));
    }

    #[test]
    fn nodes_survive_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s_nodes.db");
        let nodes = sample_nodes();
        save_nodes(&path, &nodes, "abc123").unwrap();

        let (loaded, digest) = load_nodes(&path).unwrap();
        assert_eq!(loaded, nodes);
        assert_eq!(digest.as_deref(), Some("abc123"));
        assert_eq!(loaded.sentence(2003).unwrap(), "( y");
    }

    #[test]
    fn annotations_keep_labels_and_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s_annots.db");
        let labels = vec!["increase".to_string(), "decrease".to_string()];
        let mut annots = AnnotationTable::from_nodes(&sample_nodes(), &labels);
        annots.set_positive(1002, "increase").unwrap();
        annots.set_ignore(1003, "decrease").unwrap();
        save_annotations(&path, &annots).unwrap();

        // A second save replaces rather than appends.
        annots.set_unknown(1003, "decrease").unwrap();
        save_annotations(&path, &annots).unwrap();

        let loaded = load_annotations(&path).unwrap();
        assert_eq!(loaded, annots);
        assert!(loaded.is_negative(1002, "decrease").unwrap());
    }

    #[test]
    fn patterns_and_scores_with_undefined_values() {
        let dir = TempDir::new().unwrap();
        let paths = SnapshotPaths::new(dir.path().join("s"));

        let mut patterns = PatternTable::new();
        patterns.add("p1", "NP < DT", "increase", "determiners").unwrap();
        patterns.add("p2", "VP", "decrease", "").unwrap();
        save_patterns(&paths.patterns, &patterns).unwrap();
        assert_eq!(load_patterns(&paths.patterns).unwrap(), patterns);

        let gold = vec![(1001, Annotation::Positive), (1002, Annotation::Unknown)];
        let mut scores = ScoreTable::new();
        scores.score_pattern(&gold, &[MatchId::new(1, 1)], Some("p1"));
        scores.score_pattern(&gold, &[], Some("p2"));
        assert_eq!(scores.get("p2").unwrap().precision, None);
        save_scores(&paths.scores, &scores).unwrap();

        let loaded = load_scores(&paths.scores).unwrap();
        assert_eq!(loaded, scores);
        assert_eq!(loaded.get("p1").unwrap().precision, Some(100.0));
        assert_eq!(loaded.get("p2").unwrap().f_score, None);
    }

    #[test]
    fn corrupt_annotation_rows_fail_to_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s_annots.db");
        let labels = vec!["increase".to_string(), "decrease".to_string()];
        let annots = AnnotationTable::from_nodes(&sample_nodes(), &labels);
        save_annotations(&path, &annots).unwrap();

        let conn = Connection::open(&path).unwrap();
        conn.execute("UPDATE annotations SET vals = '[1,7]' WHERE node_id = 1001", [])
            .unwrap();
        drop(conn);
        let err = load_annotations(&path).unwrap_err();
        assert!(matches!(
            err,
            TredevError::CorruptSnapshot { node_id: 1001, .. }
        ));

        let conn = Connection::open(&path).unwrap();
        conn.execute("UPDATE annotations SET vals = '[1]' WHERE node_id = 1001", [])
            .unwrap();
        drop(conn);
        let err = load_annotations(&path).unwrap_err();
        assert!(matches!(
            err,
            TredevError::CorruptSnapshot { node_id: 1001, .. }
        ));
    }

    #[test]
    fn unversioned_file_is_rejected_and_left_untouched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s_patterns.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE other (x INTEGER);").unwrap();
        drop(conn);

        let err = load_patterns(&path).unwrap_err();
        assert!(matches!(
            err,
            TredevError::SchemaVersionMismatch { found: 0, .. }
        ));

        let conn = Connection::open(&path).unwrap();
        let version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, 0);
        let tables: i64 = conn
            .query_row("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[test]
    fn loading_missing_snapshot_fails_without_creating_it() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing_scores.db");
        assert!(matches!(
            load_scores(&path),
            Err(TredevError::SnapshotNotFound(_))
        ));
        assert!(!path.exists());
    }
}

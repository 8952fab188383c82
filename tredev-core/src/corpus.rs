//! Corpus discovery: parse files in a directory, minus OS artifacts.

use crate::error::TredevError;
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A directory of parse-tree files.
///
/// Files are visited in file-name order so tree numbering is stable and
/// agrees with the external matcher walking the same directory.
#[derive(Debug, Clone)]
pub struct Corpus {
    root: PathBuf,
    ignore_set: GlobSet,
}

impl Corpus {
    pub fn new(root: &Path, ignore_patterns: &[String]) -> crate::Result<Self> {
        if !root.is_dir() {
            return Err(TredevError::CorpusNotFound(root.to_path_buf()));
        }

        let mut builder = GlobSetBuilder::new();
        for pattern in ignore_patterns {
            builder.add(Glob::new(pattern).map_err(|e| TredevError::GlobPattern(e.to_string()))?);
        }
        let ignore_set = builder
            .build()
            .map_err(|e| TredevError::GlobPattern(e.to_string()))?;

        Ok(Self {
            root: root.to_path_buf(),
            ignore_set,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List corpus files (non-recursive), sorted by file name.
    pub fn files(&self) -> crate::Result<Vec<PathBuf>> {
        let mut builder = WalkBuilder::new(&self.root);
        builder.max_depth(Some(1));
        builder.standard_filters(false);
        builder.follow_links(true);
        builder.sort_by_file_name(|a, b| a.cmp(b));

        let mut files = Vec::new();

        for entry in builder.build() {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!(error = %e, "skipping unreadable corpus entry");
                    continue;
                }
            };

            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }

            let name = entry.file_name();
            if self.ignore_set.is_match(Path::new(name)) {
                debug!(file = %entry.path().display(), "skipping OS artifact");
                continue;
            }

            files.push(entry.path().to_path_buf());
        }

        Ok(files)
    }

    /// Content digest over file names and contents, in walk order.
    pub fn digest(&self) -> crate::Result<String> {
        let mut hasher = Sha256::new();
        for path in self.files()? {
            let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
            hasher.update(name.unwrap_or_default().as_bytes());
            hasher.update([0u8]);
            hasher.update(std::fs::read(&path)?);
            hasher.update([0u8]);
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CorpusConfig;
    use std::fs;

    #[test]
    fn lists_files_sorted_and_skips_artifacts() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join("b.mrg"), "(S (X b))\n").unwrap();
        fs::write(dir.path().join("a.mrg"), "(S (X a))\n").unwrap();
        fs::write(dir.path().join(".DS_Store"), "junk").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c.mrg"), "(S (X c))\n").unwrap();

        let corpus = Corpus::new(dir.path(), &CorpusConfig::default().ignore).unwrap();
        let names: Vec<String> = corpus
            .files()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.mrg", "b.mrg"]);
    }

    #[test]
    fn digest_tracks_content_changes() {
        let dir = tempfile::TempDir::new().unwrap();
        fs::write(dir.path().join("a.mrg"), "(S (X a))\n").unwrap();
        let corpus = Corpus::new(dir.path(), &[]).unwrap();
        let before = corpus.digest().unwrap();
        assert_eq!(before, corpus.digest().unwrap());

        fs::write(dir.path().join("a.mrg"), "(S (X b))\n").unwrap();
        assert_ne!(before, corpus.digest().unwrap());
    }

    #[test]
    fn missing_directory_is_reported() {
        let err = Corpus::new(Path::new("/definitely/not/here"), &[]).unwrap_err();
        assert!(matches!(err, TredevError::CorpusNotFound(_)));
    }

    #[test]
    fn bad_ignore_glob_is_reported() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = Corpus::new(dir.path(), &["[".to_string()]).unwrap_err();
        assert!(matches!(err, TredevError::GlobPattern(_)));
    }
}

//! Run a directory of held-out images through a [`FaceChecker`].
//!
//! Files directly under the directory are only reported. Files inside a
//! subdirectory are expected to contain the identity named by that
//! subdirectory, and count as a hit when they do.

use crate::analyzer::FaceAnalyzer;
use crate::pipeline::{FaceChecker, PipelineError};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("validation directory {path} unreadable: {source}")]
    Dir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Result for a single validation image.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationOutcome {
    pub path: PathBuf,
    /// Label implied by the parent directory, if any.
    pub expected: Option<String>,
    /// Matched labels, in detection order.
    pub matched: Vec<String>,
}

impl ValidationOutcome {
    pub fn is_hit(&self) -> bool {
        self.expected
            .as_ref()
            .is_some_and(|label| self.matched.iter().any(|m| m == label))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub outcomes: Vec<ValidationOutcome>,
    /// Files that could not be decoded.
    pub unreadable: usize,
}

impl ValidationReport {
    /// Images with an expected label.
    pub fn labelled(&self) -> usize {
        self.outcomes.iter().filter(|o| o.expected.is_some()).count()
    }

    /// Labelled images that contained their expected label.
    pub fn hits(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_hit()).count()
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), ValidationError> {
    let entries = fs::read_dir(dir)
        .map_err(|source| ValidationError::Dir { path: dir.to_path_buf(), source })?;
    let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok().map(|e| e.path())).collect();
    paths.sort();

    for path in paths {
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if path.is_file() {
            out.push(path);
        }
    }
    Ok(())
}

fn expected_label(root: &Path, file: &Path) -> Option<String> {
    let parent = file.parent()?;
    if parent == root {
        return None;
    }
    parent.file_name()?.to_str().map(str::to_string)
}

/// Check every file under `dir`, recursively, in sorted order.
///
/// The encodings must load before any file is read; a file that cannot be
/// decoded is logged and counted, not fatal.
pub fn validate_dir<A: FaceAnalyzer>(
    checker: &mut FaceChecker<A>,
    dir: &Path,
) -> Result<ValidationReport, ValidationError> {
    checker.load_known()?;

    let mut files = Vec::new();
    collect_files(dir, &mut files)?;

    let mut report = ValidationReport::default();
    for path in files {
        let recognition = match checker.check_file(&path) {
            Ok(r) => r,
            Err(PipelineError::Image { path, source }) => {
                tracing::warn!(path = %path.display(), error = %source, "skipping unreadable validation file");
                report.unreadable += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let outcome = ValidationOutcome {
            expected: expected_label(dir, &path),
            matched: recognition.matched_labels().into_iter().map(str::to_string).collect(),
            path,
        };
        tracing::info!(
            path = %outcome.path.display(),
            expected = outcome.expected.as_deref().unwrap_or("-"),
            matched = ?outcome.matched,
            faces = recognition.faces.len(),
            "validated"
        );
        report.outcomes.push(outcome);
    }

    tracing::info!(
        images = report.outcomes.len(),
        labelled = report.labelled(),
        hits = report.hits(),
        unreadable = report.unreadable,
        "validation complete"
    );
    Ok(report)
}

//! Persisted known-face encodings.
//!
//! The set is stored as one JSON record with two parallel arrays:
//! `{"model_version": ..., "names": [...], "encodings": [[...], ...]}`.

use crate::types::Embedding;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("encodings not found at {0} — run `facechecker train` first")]
    NotFound(PathBuf),
    #[error("encodings at {path} unreadable: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("encodings at {path} corrupt: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("encodings corrupt: {names} names but {encodings} encodings")]
    LengthMismatch { names: usize, encodings: usize },
    #[error("encoding {index} has {actual} dimensions, expected {expected}")]
    DimensionMismatch { index: usize, expected: usize, actual: usize },
    #[error("encodings were produced by model '{found}', current recognizer is '{expected}' — retrain")]
    IncompatibleModel { expected: String, found: String },
}

/// Ordered (label, encoding) pairs, kept as two parallel collections.
///
/// Invariants: `names.len() == encodings.len()` and every encoding has the
/// same dimensionality.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnownEncodingSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    model_version: Option<String>,
    names: Vec<String>,
    encodings: Vec<Vec<f32>>,
}

impl KnownEncodingSet {
    pub fn new(model_version: Option<String>) -> Self {
        Self { model_version, names: Vec::new(), encodings: Vec::new() }
    }

    /// Append one pair, enforcing constant dimensionality.
    pub fn push(&mut self, label: impl Into<String>, encoding: &Embedding) -> Result<(), StoreError> {
        if let Some(expected) = self.dim() {
            if encoding.dim() != expected {
                return Err(StoreError::DimensionMismatch {
                    index: self.encodings.len(),
                    expected,
                    actual: encoding.dim(),
                });
            }
        }
        self.names.push(label.into());
        self.encodings.push(encoding.values.clone());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Dimensionality of the stored encodings, `None` when empty.
    pub fn dim(&self) -> Option<usize> {
        self.encodings.first().map(Vec::len)
    }

    pub fn model_version(&self) -> Option<&str> {
        self.model_version.as_deref()
    }

    pub fn labels(&self) -> &[String] {
        &self.names
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[f32])> {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.encodings.iter().map(Vec::as_slice))
    }

    /// Distinct labels in first-seen order.
    pub fn identities(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for name in self.labels() {
            if !seen.contains(&name.as_str()) {
                seen.push(name);
            }
        }
        seen
    }

    /// Check the parallel-collection invariants.
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.names.len() != self.encodings.len() {
            return Err(StoreError::LengthMismatch {
                names: self.names.len(),
                encodings: self.encodings.len(),
            });
        }
        if let Some(expected) = self.dim() {
            if let Some((index, e)) =
                self.encodings.iter().enumerate().find(|(_, e)| e.len() != expected)
            {
                return Err(StoreError::DimensionMismatch { index, expected, actual: e.len() });
            }
        }
        Ok(())
    }

    /// Reject a set produced by a different recognizer than `expected`.
    /// Sets without a recorded version are accepted.
    pub fn ensure_model(&self, expected: Option<&str>) -> Result<(), StoreError> {
        match (expected, self.model_version.as_deref()) {
            (Some(expected), Some(found)) if expected != found => Err(StoreError::IncompatibleModel {
                expected: expected.to_string(),
                found: found.to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Load and validate a persisted set.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let bytes = fs::read(path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => StoreError::NotFound(path.to_path_buf()),
            _ => StoreError::Io { path: path.to_path_buf(), source },
        })?;

        let set: Self = serde_json::from_slice(&bytes)
            .map_err(|source| StoreError::Parse { path: path.to_path_buf(), source })?;
        set.validate()?;

        tracing::debug!(path = %path.display(), entries = set.len(), "loaded known encodings");
        Ok(set)
    }

    /// Persist the set, replacing any previous version.
    ///
    /// Written to a sibling temp file and renamed into place, so a reader
    /// never observes a half-written file.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io { path: path.to_path_buf(), source };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let bytes = serde_json::to_vec(self)
            .map_err(|source| StoreError::Parse { path: path.to_path_buf(), source })?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, bytes).map_err(io_err)?;
        fs::rename(&tmp, path).map_err(io_err)?;

        tracing::info!(path = %path.display(), entries = self.len(), "saved known encodings");
        Ok(())
    }
}

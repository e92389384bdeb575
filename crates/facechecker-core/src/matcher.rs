//! Nearest-known-face decision.

use crate::store::KnownEncodingSet;
use crate::types::{euclidean_distance, Embedding, FaceMatch};
use thiserror::Error;

/// Distance below which a face is accepted as a known identity.
///
/// 0.4 suits 128-d dlib-style encodings. Unit-length 512-d ArcFace
/// encodings of the same person usually lie 0.9 to 1.2 apart
/// (`d = sqrt(2 - 2 cos)`), so at 0.4 only near-identical images match;
/// around 1.1 is a practical setting for the ONNX analyzer.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.4;

#[derive(Error, Debug, PartialEq)]
pub enum MatchError {
    #[error("no known identities — the encodings file is empty")]
    NoKnownIdentities,
    #[error("probe encoding has {probe} dimensions, known encodings have {known}")]
    DimensionMismatch { probe: usize, known: usize },
}

/// Strategy for comparing a probe encoding against the known set.
pub trait Matcher {
    fn compare(
        &self,
        probe: &Embedding,
        known: &KnownEncodingSet,
        threshold: f32,
    ) -> Result<FaceMatch, MatchError>;
}

/// Linear scan over every known encoding, picking the minimum Euclidean
/// distance. The first entry wins ties.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(
        &self,
        probe: &Embedding,
        known: &KnownEncodingSet,
        threshold: f32,
    ) -> Result<FaceMatch, MatchError> {
        let dim = known.dim().ok_or(MatchError::NoKnownIdentities)?;
        if probe.dim() != dim {
            return Err(MatchError::DimensionMismatch { probe: probe.dim(), known: dim });
        }

        let mut best_idx = 0;
        let mut best_dist = f32::INFINITY;
        let mut distances = Vec::with_capacity(known.len());

        for (i, (_, encoding)) in known.iter().enumerate() {
            let dist = euclidean_distance(&probe.values, encoding);
            distances.push(dist);
            if dist < best_dist {
                best_dist = dist;
                best_idx = i;
            }
        }

        let label = if best_dist < threshold {
            known.label(best_idx).map(str::to_string)
        } else {
            None
        };

        tracing::debug!(
            ?distances,
            best_index = best_idx,
            best_distance = best_dist,
            threshold,
            label = label.as_deref().unwrap_or("<unknown>"),
            "compared face against known encodings"
        );

        Ok(FaceMatch { label, distance: best_dist, index: best_idx })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known(entries: Vec<(&str, Vec<f32>)>) -> KnownEncodingSet {
        let mut set = KnownEncodingSet::default();
        for (label, values) in entries {
            set.push(label, &Embedding::new(values)).expect("push");
        }
        set
    }

    fn probe(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    #[test]
    fn test_nearest_below_threshold_is_labelled() {
        let set = known(vec![("alice", vec![1.0, 0.0]), ("bob", vec![0.0, 1.0])]);
        let result = EuclideanMatcher.compare(&probe(&[0.1, 0.9]), &set, 0.4).expect("compare");
        assert_eq!(result.label.as_deref(), Some("bob"));
        assert_eq!(result.index, 1);
        assert!((result.distance - 0.02f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_scans_whole_set() {
        // Best match is the last entry.
        let set = known(vec![
            ("decoy1", vec![0.0, 1.0, 0.0]),
            ("decoy2", vec![0.0, 0.0, 1.0]),
            ("match", vec![1.0, 0.0, 0.0]),
        ]);
        let result = EuclideanMatcher.compare(&probe(&[1.0, 0.0, 0.0]), &set, 0.4).expect("compare");
        assert_eq!(result.label.as_deref(), Some("match"));
        assert_eq!(result.index, 2);
        assert!(result.distance.abs() < 1e-6);
    }

    #[test]
    fn test_nearest_at_threshold_is_unmatched() {
        let set = known(vec![("alice", vec![0.0, 0.0])]);
        let result = EuclideanMatcher.compare(&probe(&[0.4, 0.0]), &set, 0.4).expect("compare");
        assert_eq!(result.label, None);
        assert_eq!(result.index, 0);
        assert!((result.distance - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_nearest_above_threshold_is_unmatched() {
        let set = known(vec![("alice", vec![1.0, 0.0]), ("bob", vec![0.0, 1.0])]);
        let result = EuclideanMatcher.compare(&probe(&[-1.0, 0.0]), &set, 0.4).expect("compare");
        assert_eq!(result.label, None);
        assert_eq!(result.index, 1);
    }

    #[test]
    fn test_tie_goes_to_first_occurrence() {
        let set = known(vec![("first", vec![1.0, 0.0]), ("second", vec![1.0, 0.0])]);
        let result = EuclideanMatcher.compare(&probe(&[1.0, 0.1]), &set, 0.4).expect("compare");
        assert_eq!(result.label.as_deref(), Some("first"));
        assert_eq!(result.index, 0);
    }

    #[test]
    fn test_custom_threshold() {
        let set = known(vec![("alice", vec![0.0, 0.0])]);
        let result = EuclideanMatcher.compare(&probe(&[0.5, 0.0]), &set, 0.6).expect("compare");
        assert_eq!(result.label.as_deref(), Some("alice"));
    }

    #[test]
    fn test_empty_known_set_fails() {
        let err = EuclideanMatcher
            .compare(&probe(&[1.0, 0.0]), &KnownEncodingSet::default(), 0.4)
            .unwrap_err();
        assert_eq!(err, MatchError::NoKnownIdentities);
    }

    #[test]
    fn test_dimension_mismatch_fails() {
        let set = known(vec![("alice", vec![1.0, 0.0])]);
        let err = EuclideanMatcher.compare(&probe(&[1.0, 0.0, 0.0]), &set, 0.4).unwrap_err();
        assert_eq!(err, MatchError::DimensionMismatch { probe: 3, known: 2 });
    }
}

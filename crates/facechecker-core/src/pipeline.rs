//! Per-frame recognition: analyze, match every face, annotate the matches.

use crate::analyzer::{AnalyzerError, FaceAnalyzer};
use crate::annotate::annotate;
use crate::matcher::{EuclideanMatcher, MatchError, Matcher, DEFAULT_MATCH_THRESHOLD};
use crate::store::{KnownEncodingSet, StoreError};
use crate::types::RecognizedFace;
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Analyzer(#[from] AnalyzerError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error("cannot read image {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Everything decided about one frame.
#[derive(Debug, Clone)]
pub struct Recognition {
    pub faces: Vec<RecognizedFace>,
    /// Annotated copy of the frame; `None` when no face matched.
    pub annotated: Option<RgbImage>,
}

impl Recognition {
    /// Labels of matched faces, in detection order (may repeat).
    pub fn matched_labels(&self) -> Vec<&str> {
        self.faces
            .iter()
            .filter_map(|f| f.result.label.as_deref())
            .collect()
    }
}

/// Match every face in `frame` against `known` and annotate the matches.
///
/// Fails with [`MatchError::NoKnownIdentities`] on an empty set, even when
/// the frame holds no faces.
pub fn recognize_faces(
    frame: &RgbImage,
    known: &KnownEncodingSet,
    analyzer: &mut dyn FaceAnalyzer,
    matcher: &dyn Matcher,
    threshold: f32,
) -> Result<Recognition, PipelineError> {
    if known.is_empty() {
        return Err(MatchError::NoKnownIdentities.into());
    }

    let detected = analyzer.analyze(frame)?;
    let mut faces = Vec::with_capacity(detected.len());
    for face in detected {
        let result = matcher.compare(&face.encoding, known, threshold)?;
        faces.push(RecognizedFace { face, result });
    }

    let annotated = annotate(frame, &faces);
    Ok(Recognition { faces, annotated })
}

/// Load an image file as an RGB frame.
pub fn load_image_file(path: &Path) -> Result<RgbImage, PipelineError> {
    image::open(path)
        .map(|img| img.to_rgb8())
        .map_err(|source| PipelineError::Image { path: path.to_path_buf(), source })
}

/// Analyzer + matcher bound to a persisted encodings file.
///
/// The encodings are re-read on every call, so a concurrent retrain is
/// picked up on the next frame.
pub struct FaceChecker<A> {
    analyzer: A,
    matcher: EuclideanMatcher,
    encodings_path: PathBuf,
    threshold: f32,
}

impl<A: FaceAnalyzer> FaceChecker<A> {
    pub fn new(analyzer: A, encodings_path: impl Into<PathBuf>) -> Self {
        Self {
            analyzer,
            matcher: EuclideanMatcher,
            encodings_path: encodings_path.into(),
            threshold: DEFAULT_MATCH_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn encodings_path(&self) -> &Path {
        &self.encodings_path
    }

    /// Load the persisted set and check it against the analyzer's model.
    pub fn load_known(&self) -> Result<KnownEncodingSet, PipelineError> {
        let known = KnownEncodingSet::load(&self.encodings_path)?;
        known.ensure_model(self.analyzer.model_version())?;
        Ok(known)
    }

    pub fn check(&mut self, frame: &RgbImage) -> Result<Recognition, PipelineError> {
        let known = self.load_known()?;
        recognize_faces(frame, &known, &mut self.analyzer, &self.matcher, self.threshold)
    }

    pub fn check_file(&mut self, path: &Path) -> Result<Recognition, PipelineError> {
        let frame = load_image_file(path)?;
        self.check(&frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::stub::{face_image, StubAnalyzer};
    use crate::encoder::train;
    use crate::types::Embedding;
    use std::fs;

    fn known(entries: Vec<(&str, Vec<f32>)>) -> KnownEncodingSet {
        let mut set = KnownEncodingSet::default();
        for (label, values) in entries {
            set.push(label, &Embedding::new(values)).expect("push");
        }
        set
    }

    #[test]
    fn test_frame_without_faces_has_no_result() {
        let set = known(vec![("amy", vec![1.0, 0.0, 0.0])]);
        let frame = RgbImage::new(64, 64);
        let rec = recognize_faces(&frame, &set, &mut StubAnalyzer, &EuclideanMatcher, 0.4)
            .expect("recognize");
        assert!(rec.faces.is_empty());
        assert!(rec.annotated.is_none());
    }

    #[test]
    fn test_unmatched_face_has_no_result() {
        let set = known(vec![("amy", vec![1.0, 0.0, 0.0])]);
        let rec = recognize_faces(&face_image([0, 0, 255]), &set, &mut StubAnalyzer, &EuclideanMatcher, 0.4)
            .expect("recognize");
        assert_eq!(rec.faces.len(), 1);
        assert_eq!(rec.faces[0].result.label, None);
        assert!(rec.faces[0].result.distance >= 0.4);
        assert!(rec.annotated.is_none());
        assert!(rec.matched_labels().is_empty());
    }

    #[test]
    fn test_matched_face_is_annotated() {
        let set = known(vec![("bob", vec![0.0, 1.0, 0.0]), ("amy", vec![0.9, 0.1, 0.0])]);
        let frame = face_image([255, 0, 0]);
        let rec = recognize_faces(&frame, &set, &mut StubAnalyzer, &EuclideanMatcher, 0.4)
            .expect("recognize");
        assert_eq!(rec.matched_labels(), vec!["amy"]);
        assert_eq!(rec.faces[0].result.index, 1);
        let annotated = rec.annotated.expect("annotated frame");
        assert_eq!(annotated.dimensions(), frame.dimensions());
        assert_ne!(annotated, frame);
    }

    #[test]
    fn test_empty_known_set_is_an_error() {
        let err = recognize_faces(
            &RgbImage::new(8, 8),
            &KnownEncodingSet::default(),
            &mut StubAnalyzer,
            &EuclideanMatcher,
            0.4,
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::Match(MatchError::NoKnownIdentities)));
    }

    #[test]
    fn test_checker_missing_encodings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut checker = FaceChecker::new(StubAnalyzer, dir.path().join("encodings.json"));
        let err = checker.check(&RgbImage::new(8, 8)).unwrap_err();
        assert!(matches!(err, PipelineError::Store(StoreError::NotFound(_))));
    }

    #[test]
    fn test_train_then_check_identical_image() {
        let dir = tempfile::tempdir().expect("tempdir");
        let training = dir.path().join("training");
        let encodings = dir.path().join("output/encodings.json");
        fs::create_dir_all(training.join("amy")).expect("mkdir");
        let image_path = training.join("amy/portrait.png");
        face_image([200, 120, 40]).save(&image_path).expect("save");

        train(&training, &encodings, &mut StubAnalyzer).expect("train");

        let mut checker = FaceChecker::new(StubAnalyzer, &encodings);
        let rec = checker.check_file(&image_path).expect("check");
        assert_eq!(rec.faces.len(), 1);
        assert_eq!(rec.faces[0].result.label.as_deref(), Some("amy"));
        assert!(rec.faces[0].result.distance < 1e-6);
        assert!(rec.annotated.is_some());
    }

    #[test]
    fn test_checker_rereads_encodings_each_call() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("encodings.json");
        known(vec![("amy", vec![1.0, 0.0, 0.0])]).save(&path).expect("save");

        let mut checker = FaceChecker::new(StubAnalyzer, &path);
        let frame = face_image([0, 255, 0]);
        assert!(checker.check(&frame).expect("check").annotated.is_none());

        known(vec![("gus", vec![0.0, 1.0, 0.0])]).save(&path).expect("save");
        let rec = checker.check(&frame).expect("check");
        assert_eq!(rec.matched_labels(), vec!["gus"]);
    }

    #[test]
    fn test_checker_threshold_override() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("encodings.json");
        known(vec![("amy", vec![0.5, 0.0, 0.0])]).save(&path).expect("save");

        let frame = face_image([255, 0, 0]);
        let mut strict = FaceChecker::new(StubAnalyzer, &path);
        assert!(strict.check(&frame).expect("check").annotated.is_none());

        let mut loose = FaceChecker::new(StubAnalyzer, &path).with_threshold(0.6);
        assert_eq!(loose.threshold(), 0.6);
        assert!(loose.check(&frame).expect("check").annotated.is_some());
    }

    #[test]
    fn test_check_file_unreadable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("encodings.json");
        known(vec![("amy", vec![1.0, 0.0, 0.0])]).save(&path).expect("save");
        let mut checker = FaceChecker::new(StubAnalyzer, &path);
        let err = checker.check_file(&dir.path().join("missing.png")).unwrap_err();
        assert!(matches!(err, PipelineError::Image { .. }));
    }
}

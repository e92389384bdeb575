//! Face analysis: detection followed by encoding of every detected face.

use crate::detector::{DetectorError, DetectorModel, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError, ARCFACE_MODEL_VERSION};
use crate::types::DetectedFace;
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Finds every face in a frame and computes its encoding.
pub trait FaceAnalyzer {
    fn analyze(&mut self, frame: &RgbImage) -> Result<Vec<DetectedFace>, AnalyzerError>;

    /// Version tag of the encodings this analyzer produces.
    fn model_version(&self) -> Option<&str> {
        None
    }
}

/// SCRFD detection + ArcFace encoding.
pub struct OnnxAnalyzer {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxAnalyzer {
    pub fn load(model_dir: &Path, model: DetectorModel) -> Result<Self, AnalyzerError> {
        let detector = FaceDetector::load(model_dir, model)?;
        let recognizer = FaceRecognizer::load(model_dir)?;
        Ok(Self { detector, recognizer })
    }
}

impl FaceAnalyzer for OnnxAnalyzer {
    fn analyze(&mut self, frame: &RgbImage) -> Result<Vec<DetectedFace>, AnalyzerError> {
        let (width, height) = frame.dimensions();
        let boxes = self.detector.detect(frame)?;

        let mut faces = Vec::with_capacity(boxes.len());
        for bbox in &boxes {
            let encoding = self.recognizer.encode(frame, bbox)?;
            faces.push(DetectedFace {
                location: bbox.location(width, height),
                confidence: bbox.confidence,
                encoding,
            });
        }
        Ok(faces)
    }

    fn model_version(&self) -> Option<&str> {
        Some(ARCFACE_MODEL_VERSION)
    }
}

#[cfg(test)]
pub(crate) mod stub {
    use super::*;
    use crate::types::{Embedding, FaceLocation};

    /// Deterministic stand-in for the ONNX pipeline.
    ///
    /// Any non-black pixel counts as part of one "face": its location is the
    /// bounding rectangle of the non-black pixels and its encoding is the mean
    /// colour of that rectangle, scaled to [0, 1]. An all-black frame has no
    /// faces. Identical images therefore encode identically.
    pub(crate) struct StubAnalyzer;

    impl FaceAnalyzer for StubAnalyzer {
        fn analyze(&mut self, frame: &RgbImage) -> Result<Vec<DetectedFace>, AnalyzerError> {
            let lit: Vec<(u32, u32)> = frame
                .enumerate_pixels()
                .filter(|(_, _, p)| p.0 != [0, 0, 0])
                .map(|(x, y, _)| (x, y))
                .collect();
            if lit.is_empty() {
                return Ok(Vec::new());
            }

            let left = lit.iter().map(|p| p.0).min().unwrap_or(0);
            let right = lit.iter().map(|p| p.0).max().unwrap_or(0);
            let top = lit.iter().map(|p| p.1).min().unwrap_or(0);
            let bottom = lit.iter().map(|p| p.1).max().unwrap_or(0);

            let mut sum = [0.0f32; 3];
            let mut n = 0.0f32;
            for y in top..=bottom {
                for x in left..=right {
                    let p = frame.get_pixel(x, y);
                    for c in 0..3 {
                        sum[c] += p[c] as f32 / 255.0;
                    }
                    n += 1.0;
                }
            }

            Ok(vec![DetectedFace {
                location: FaceLocation { top, right, bottom, left },
                confidence: 1.0,
                encoding: Embedding::new(sum.iter().map(|s| s / n).collect()),
            }])
        }
    }

    /// Draw a filled square "face" of `colour` onto a black canvas.
    pub(crate) fn face_image(colour: [u8; 3]) -> RgbImage {
        let mut img = RgbImage::new(64, 64);
        for y in 16..48 {
            for x in 16..48 {
                img.put_pixel(x, y, image::Rgb(colour));
            }
        }
        img
    }

    #[test]
    fn test_stub_black_frame_has_no_faces() {
        let faces = StubAnalyzer.analyze(&RgbImage::new(32, 32)).expect("analyze");
        assert!(faces.is_empty());
    }

    #[test]
    fn test_stub_face_location_and_encoding() {
        let faces = StubAnalyzer.analyze(&face_image([255, 0, 0])).expect("analyze");
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].location, FaceLocation { top: 16, right: 47, bottom: 47, left: 16 });
        assert_eq!(faces[0].encoding.values, vec![1.0, 0.0, 0.0]);
    }
}

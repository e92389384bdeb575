use serde::{Deserialize, Serialize};

/// Raw detector output for one face, in frame pixel space (floats, unclamped).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Clamp the box into a `frame_width` × `frame_height` frame and convert it
    /// to integer `(top, right, bottom, left)` coordinates.
    pub fn location(&self, frame_width: u32, frame_height: u32) -> FaceLocation {
        let max_x = frame_width.saturating_sub(1) as f32;
        let max_y = frame_height.saturating_sub(1) as f32;
        let clamp = |v: f32, max: f32| -> u32 {
            if v.is_finite() {
                v.round().clamp(0.0, max) as u32
            } else {
                0
            }
        };

        FaceLocation {
            top: clamp(self.y, max_y),
            right: clamp(self.x + self.width, max_x),
            bottom: clamp(self.y + self.height, max_y),
            left: clamp(self.x, max_x),
        }
    }
}

/// Integer face rectangle in frame coordinates, inclusive on all edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceLocation {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

/// Face encoding vector (512-dimensional, L2-normalized, for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, model_version: None }
    }

    pub fn dim(&self) -> usize {
        self.values.len()
    }
}

/// Euclidean distance; lies in [0, 2] for unit-length ArcFace encodings.
pub(crate) fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f32>()
        .sqrt()
}

/// A face found in a frame, together with its encoding.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub location: FaceLocation,
    pub confidence: f32,
    pub encoding: Embedding,
}

/// Outcome of comparing one probe encoding against the known set.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceMatch {
    /// Label of the nearest known encoding, present only when its distance
    /// passed the threshold.
    pub label: Option<String>,
    /// Distance to the nearest known encoding.
    pub distance: f32,
    /// Index of the nearest known encoding (first occurrence on ties).
    pub index: usize,
}

/// A detected face and the decision made for it.
#[derive(Debug, Clone)]
pub struct RecognizedFace {
    pub face: DetectedFace,
    pub result: FaceMatch,
}

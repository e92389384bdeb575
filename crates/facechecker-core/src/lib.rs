//! facechecker-core — known-face encoding, matching and annotation.
//!
//! Uses SCRFD for face detection and ArcFace for face encoding, both running
//! via ONNX Runtime on the CPU. Encodings of labelled training images are
//! persisted once; every frame is then matched against them by nearest
//! Euclidean distance, and matched faces are drawn onto a copy of the frame.

pub mod alignment;
pub mod analyzer;
pub mod annotate;
pub mod config;
pub mod detector;
pub mod encoder;
pub mod gallery;
pub mod matcher;
pub mod pipeline;
pub mod recognizer;
pub mod store;
pub mod types;
pub mod validation;

pub use analyzer::{AnalyzerError, FaceAnalyzer, OnnxAnalyzer};
pub use config::{Config, ConfigError};
pub use detector::DetectorModel;
pub use encoder::{encode_known_faces, train, EncodeError, EncodeSummary};
pub use gallery::GalleryError;
pub use matcher::{EuclideanMatcher, MatchError, Matcher, DEFAULT_MATCH_THRESHOLD};
pub use pipeline::{load_image_file, recognize_faces, FaceChecker, PipelineError, Recognition};
pub use store::{KnownEncodingSet, StoreError};
pub use types::{BoundingBox, DetectedFace, Embedding, FaceLocation, FaceMatch, RecognizedFace};
pub use validation::{validate_dir, ValidationError, ValidationOutcome, ValidationReport};

//! Build the known-encoding set from a labelled training directory.
//!
//! Layout: `<training_dir>/<label>/<image>`. Every face found in every image
//! contributes one (label, encoding) pair; the result replaces whatever was
//! persisted before.

use crate::analyzer::{AnalyzerError, FaceAnalyzer};
use crate::store::{KnownEncodingSet, StoreError};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("training directory {path} unreadable: {source}")]
    TrainingDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("face analysis failed on {path}: {source}")]
    Analyzer {
        path: PathBuf,
        #[source]
        source: AnalyzerError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What one training run did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodeSummary {
    /// Images decoded and analyzed.
    pub images: usize,
    /// Files that could not be decoded, or held no face.
    pub skipped: usize,
    /// (label, encoding) pairs written.
    pub encodings: usize,
    /// Distinct labels with at least one encoding.
    pub labels: usize,
}

fn dir_err(path: &Path) -> impl FnOnce(std::io::Error) -> EncodeError {
    let path = path.to_path_buf();
    move |source| EncodeError::TrainingDir { path, source }
}

/// Every `(label, file)` pair under `training_dir`, sorted.
fn training_images(training_dir: &Path) -> Result<Vec<(String, PathBuf)>, EncodeError> {
    let mut label_dirs: Vec<PathBuf> = fs::read_dir(training_dir)
        .map_err(dir_err(training_dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_dir())
        .collect();
    label_dirs.sort();

    let mut images = Vec::new();
    for dir in label_dirs {
        let Some(label) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
            tracing::warn!(path = %dir.display(), "skipping label directory with non-UTF-8 name");
            continue;
        };

        let mut files: Vec<PathBuf> = fs::read_dir(&dir)
            .map_err(dir_err(&dir))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .collect();
        files.sort();

        if files.is_empty() {
            tracing::warn!(%label, "label directory has no files");
        }
        images.extend(files.into_iter().map(|f| (label.clone(), f)));
    }
    Ok(images)
}

/// Analyze every training image and collect the resulting encodings.
pub fn encode_known_faces(
    training_dir: &Path,
    analyzer: &mut dyn FaceAnalyzer,
) -> Result<(KnownEncodingSet, EncodeSummary), EncodeError> {
    let mut set = KnownEncodingSet::new(analyzer.model_version().map(str::to_string));
    let mut summary = EncodeSummary::default();

    for (label, path) in training_images(training_dir)? {
        let image = match image::open(&path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping undecodable training file");
                summary.skipped += 1;
                continue;
            }
        };
        summary.images += 1;

        let faces = analyzer
            .analyze(&image)
            .map_err(|source| EncodeError::Analyzer { path: path.clone(), source })?;

        if faces.is_empty() {
            tracing::info!(path = %path.display(), %label, "no face found, skipping");
            summary.skipped += 1;
            continue;
        }

        tracing::debug!(path = %path.display(), %label, faces = faces.len(), "encoded training image");
        for face in &faces {
            set.push(label.as_str(), &face.encoding)?;
        }
    }

    summary.encodings = set.len();
    summary.labels = set.identities().len();
    Ok((set, summary))
}

/// Full rebuild: encode `training_dir` and overwrite `encodings_path`.
pub fn train(
    training_dir: &Path,
    encodings_path: &Path,
    analyzer: &mut dyn FaceAnalyzer,
) -> Result<EncodeSummary, EncodeError> {
    let (set, summary) = encode_known_faces(training_dir, analyzer)?;
    set.save(encodings_path)?;

    tracing::info!(
        images = summary.images,
        skipped = summary.skipped,
        encodings = summary.encodings,
        labels = summary.labels,
        path = %encodings_path.display(),
        "training complete"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::stub::{face_image, StubAnalyzer};
    use image::RgbImage;

    fn write_image(dir: &Path, label: &str, name: &str, img: &RgbImage) {
        let label_dir = dir.join(label);
        fs::create_dir_all(&label_dir).expect("mkdir");
        img.save(label_dir.join(name)).expect("save image");
    }

    #[test]
    fn test_encodes_every_label_in_sorted_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_image(dir.path(), "zed", "1.png", &face_image([0, 255, 0]));
        write_image(dir.path(), "amy", "b.png", &face_image([255, 0, 0]));
        write_image(dir.path(), "amy", "a.png", &face_image([0, 0, 255]));

        let (set, summary) = encode_known_faces(dir.path(), &mut StubAnalyzer).expect("encode");
        assert_eq!(set.labels(), &["amy".to_string(), "amy".to_string(), "zed".to_string()]);
        let encodings: Vec<&[f32]> = set.iter().map(|(_, e)| e).collect();
        assert_eq!(encodings[0], &[0.0, 0.0, 1.0]);
        assert_eq!(encodings[1], &[1.0, 0.0, 0.0]);
        assert_eq!(summary, EncodeSummary { images: 3, skipped: 0, encodings: 3, labels: 2 });
    }

    #[test]
    fn test_faceless_and_undecodable_files_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_image(dir.path(), "amy", "face.png", &face_image([255, 0, 0]));
        write_image(dir.path(), "amy", "empty.png", &RgbImage::new(16, 16));
        fs::write(dir.path().join("amy/notes.txt"), "not an image").expect("write");
        // Files in the root are not labelled and are ignored.
        face_image([255, 255, 255]).save(dir.path().join("stray.png")).expect("save");
        // A label with only faceless images is allowed.
        write_image(dir.path(), "ghost", "blank.png", &RgbImage::new(16, 16));

        let (set, summary) = encode_known_faces(dir.path(), &mut StubAnalyzer).expect("encode");
        assert_eq!(set.labels(), &["amy".to_string()]);
        assert_eq!(summary, EncodeSummary { images: 3, skipped: 3, encodings: 1, labels: 1 });
    }

    #[test]
    fn test_missing_training_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = encode_known_faces(&dir.path().join("absent"), &mut StubAnalyzer).unwrap_err();
        assert!(matches!(err, EncodeError::TrainingDir { .. }));
    }

    #[test]
    fn test_train_overwrites_and_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let training = dir.path().join("training");
        let encodings = dir.path().join("output/encodings.json");

        write_image(&training, "amy", "a.png", &face_image([255, 0, 0]));
        train(&training, &encodings, &mut StubAnalyzer).expect("first train");

        fs::remove_dir_all(training.join("amy")).expect("rm");
        write_image(&training, "bob", "b.png", &face_image([0, 255, 0]));
        let summary = train(&training, &encodings, &mut StubAnalyzer).expect("second train");
        assert_eq!(summary.encodings, 1);

        let (expected, _) = encode_known_faces(&training, &mut StubAnalyzer).expect("encode");
        let loaded = KnownEncodingSet::load(&encodings).expect("load");
        assert_eq!(loaded, expected);
        assert_eq!(loaded.labels(), &["bob".to_string()]);
    }
}

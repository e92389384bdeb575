//! Saved match images: naming, writing, listing and deleting.

use chrono::{DateTime, Local, NaiveDateTime};
use image::RgbImage;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "bmp"];
const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("output directory {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot write {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("invalid image name '{0}'")]
    InvalidName(String),
    #[error("no saved image named '{0}'")]
    NotFound(String),
}

fn sanitize(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// File stem for a saved match: distinct labels joined by `+`, then the
/// local timestamp, e.g. `amy+bob_20240131-235959`.
pub fn match_file_stem(labels: &[&str], at: DateTime<Local>) -> String {
    let mut distinct: Vec<String> = Vec::new();
    for label in labels.iter().map(|l| sanitize(l)) {
        if !label.is_empty() && !distinct.contains(&label) {
            distinct.push(label);
        }
    }
    let prefix = if distinct.is_empty() { "match".to_string() } else { distinct.join("+") };
    format!("{prefix}_{}", at.format(TIMESTAMP_FORMAT))
}

/// Write an annotated frame into `dir` as PNG and return its path.
///
/// A `-N` suffix is added when a file for the same labels and second
/// already exists.
pub fn save_match(
    dir: &Path,
    image: &RgbImage,
    labels: &[&str],
    at: DateTime<Local>,
) -> Result<PathBuf, GalleryError> {
    fs::create_dir_all(dir).map_err(|source| GalleryError::Io { path: dir.to_path_buf(), source })?;

    let stem = match_file_stem(labels, at);
    let mut path = dir.join(format!("{stem}.png"));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("{stem}-{n}.png"));
        n += 1;
    }

    image
        .save(&path)
        .map_err(|source| GalleryError::Encode { path: path.clone(), source })?;
    Ok(path)
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Capture time and collision counter encoded in a saved file name
/// (`<labels>_<YYYYmmdd-HHMMSS>[-N].<ext>`).
fn saved_at(path: &Path) -> Option<(NaiveDateTime, u32)> {
    let stem = path.file_stem()?.to_str()?;
    let (_, stamp) = stem.rsplit_once('_')?;
    let (time, counter) = match stamp.match_indices('-').nth(1) {
        Some((i, _)) => (&stamp[..i], stamp[i + 1..].parse().ok()?),
        None => (stamp, 0),
    };
    let at = NaiveDateTime::parse_from_str(time, TIMESTAMP_FORMAT).ok()?;
    Some((at, counter))
}

/// Saved images in `dir`, oldest first by the timestamp in their names.
/// Files without a timestamp follow, by name. A missing directory is empty.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>, GalleryError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(GalleryError::Io { path: dir.to_path_buf(), source }),
    };

    let mut images: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_image(p))
        .collect();
    images.sort_by_cached_key(|p| {
        let at = saved_at(p);
        (at.is_none(), at, p.clone())
    });
    Ok(images)
}

/// Delete one saved image by file name.
pub fn delete_image(dir: &Path, name: &str) -> Result<PathBuf, GalleryError> {
    let is_plain_name = Path::new(name).file_name().and_then(|n| n.to_str()) == Some(name);
    if name.is_empty() || !is_plain_name || name.contains(['/', '\\']) {
        return Err(GalleryError::InvalidName(name.to_string()));
    }

    let path = dir.join(name);
    if !is_image(&path) {
        return Err(GalleryError::InvalidName(name.to_string()));
    }

    fs::remove_file(&path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => GalleryError::NotFound(name.to_string()),
        _ => GalleryError::Io { path: path.clone(), source },
    })?;
    tracing::info!(path = %path.display(), "deleted saved image");
    Ok(path)
}

use crate::detector::DetectorModel;
use crate::matcher::DEFAULT_MATCH_THRESHOLD;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming an optional TOML config file.
pub const CONFIG_ENV: &str = "FACECHECKER_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file {path} unreadable: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config file {path} invalid: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("match threshold must be a positive finite distance, got {0}")]
    InvalidThreshold(f32),
}

/// Runtime configuration: defaults, then an optional TOML file, then
/// `FACECHECKER_*` environment variables.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Labelled training images, one subdirectory per identity.
    pub training_dir: PathBuf,
    /// Images for `validate`, optionally grouped by expected label.
    pub validation_dir: PathBuf,
    /// Persisted known encodings.
    pub encodings_path: PathBuf,
    /// Where annotated matches are written.
    pub output_dir: PathBuf,
    /// Directory containing the ONNX model files.
    pub model_dir: PathBuf,
    pub detector: DetectorModel,
    /// Distance below which a face counts as a known identity. The 0.4
    /// default is strict for ArcFace encodings; raise it to about 1.1 to
    /// match the same person across different photos.
    pub match_threshold: f32,
    /// Pause between capture iterations.
    pub capture_interval_ms: u64,
    /// Index into the monitor list (0 = first monitor).
    pub monitor: usize,
    /// Skip frames that are almost entirely black (locked screen, no permission).
    pub skip_blank_frames: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            training_dir: PathBuf::from("training"),
            validation_dir: PathBuf::from("validation"),
            encodings_path: PathBuf::from("output/encodings.json"),
            output_dir: PathBuf::from("images"),
            model_dir: PathBuf::from("models"),
            detector: DetectorModel::default(),
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            capture_interval_ms: 1000,
            monitor: 0,
            skip_blank_frames: true,
        }
    }
}

impl Config {
    /// Load configuration. `file` (or `$FACECHECKER_CONFIG`) must exist when given.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let file = file
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let config = match file {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        let config = config.with_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        let config: Self = toml::from_str(&text)
            .map_err(|source| ConfigError::Parse { path: path.to_path_buf(), source })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Apply `FACECHECKER_*` overrides read through `lookup`.
    /// Unparseable values keep the current setting.
    fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(&format!("FACECHECKER_{name}"));

        if let Some(v) = var("TRAINING_DIR") {
            self.training_dir = v.into();
        }
        if let Some(v) = var("VALIDATION_DIR") {
            self.validation_dir = v.into();
        }
        if let Some(v) = var("ENCODINGS_PATH") {
            self.encodings_path = v.into();
        }
        if let Some(v) = var("OUTPUT_DIR") {
            self.output_dir = v.into();
        }
        if let Some(v) = var("MODEL_DIR") {
            self.model_dir = v.into();
        }
        if let Some(v) = var("DETECTOR").and_then(|v| v.parse().ok()) {
            self.detector = v;
        }
        if let Some(v) = parse_env(var("MATCH_THRESHOLD")) {
            self.match_threshold = v;
        }
        if let Some(v) = parse_env(var("CAPTURE_INTERVAL_MS")) {
            self.capture_interval_ms = v;
        }
        if let Some(v) = parse_env(var("MONITOR")) {
            self.monitor = v;
        }
        if let Some(v) = var("SKIP_BLANK_FRAMES") {
            self.skip_blank_frames = v.trim() != "0";
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.match_threshold.is_finite() || self.match_threshold <= 0.0 {
            return Err(ConfigError::InvalidThreshold(self.match_threshold));
        }
        Ok(())
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }
}

fn parse_env<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.trim().parse().ok())
}

use chrono::Local;
use facechecker_capture::{CaptureError, Frame, ScreenCapture};
use facechecker_core::gallery::{self, GalleryError};
use facechecker_core::{FaceAnalyzer, FaceChecker, PipelineError};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("cannot save match: {0}")]
    Gallery(#[from] GalleryError),
    #[error("frame worker died: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

/// Anything that yields frames to watch.
pub trait FrameSource: Send + 'static {
    fn next_frame(&mut self) -> Result<Frame, CaptureError>;
}

impl FrameSource for ScreenCapture {
    fn next_frame(&mut self) -> Result<Frame, CaptureError> {
        self.capture_frame()
    }
}

/// What happened to one frame.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    Blank,
    NoMatch { faces: usize },
    Saved(PathBuf),
}

/// Counters for one watch session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchStats {
    pub frames: u64,
    pub blank: u64,
    pub saved: u64,
    pub errors: u64,
}

pub struct WatcherSettings {
    pub output_dir: PathBuf,
    pub interval: Duration,
    pub skip_blank: bool,
}

/// Capture → match → annotate → save, one frame at a time.
pub struct Watcher<A, S> {
    checker: FaceChecker<A>,
    source: S,
    settings: WatcherSettings,
}

impl<A, S> Watcher<A, S>
where
    A: FaceAnalyzer + Send + 'static,
    S: FrameSource,
{
    /// Build a watcher. Fails fast when the stored encodings cannot be
    /// loaded, so a missing `train` is reported before the loop starts.
    pub fn new(checker: FaceChecker<A>, source: S, settings: WatcherSettings) -> Result<Self, WatchError> {
        let known = checker.load_known()?;
        tracing::info!(
            encodings = known.len(),
            labels = known.identities().len(),
            model = known.model_version().unwrap_or("unknown"),
            threshold = checker.threshold(),
            path = %checker.encodings_path().display(),
            "known encodings loaded"
        );
        Ok(Self { checker, source, settings })
    }

    /// Process a single frame synchronously.
    pub fn process_frame(&mut self) -> Result<FrameOutcome, WatchError> {
        let frame = self.source.next_frame()?;
        if self.settings.skip_blank && frame.is_blank {
            tracing::debug!(sequence = frame.sequence, "blank frame, skipping");
            return Ok(FrameOutcome::Blank);
        }

        let recognition = self.checker.check(&frame.image)?;
        let Some(annotated) = &recognition.annotated else {
            tracing::debug!(sequence = frame.sequence, faces = recognition.faces.len(), "no match");
            return Ok(FrameOutcome::NoMatch { faces: recognition.faces.len() });
        };

        let labels = recognition.matched_labels();
        let path = gallery::save_match(&self.settings.output_dir, annotated, &labels, Local::now())?;
        tracing::info!(sequence = frame.sequence, labels = ?labels, path = %path.display(), "saved match");
        Ok(FrameOutcome::Saved(path))
    }

    /// Run until `token` is cancelled.
    ///
    /// Each frame is processed on the blocking pool and awaited before the
    /// next one starts. Per-frame errors are logged and the frame skipped;
    /// cancellation is observed between frames.
    pub async fn run(self, token: CancellationToken) -> Result<WatchStats, WatchError> {
        let mut stats = WatchStats::default();
        let interval = self.settings.interval;
        let mut watcher = self;

        while !token.is_cancelled() {
            let (returned, result) = tokio::task::spawn_blocking(move || {
                let result = watcher.process_frame();
                (watcher, result)
            })
            .await?;
            watcher = returned;

            stats.frames += 1;
            match result {
                Ok(FrameOutcome::Blank) => stats.blank += 1,
                Ok(FrameOutcome::Saved(_)) => stats.saved += 1,
                Ok(FrameOutcome::NoMatch { .. }) => {}
                Err(e) => {
                    stats.errors += 1;
                    tracing::warn!(error = %e, "frame skipped");
                }
            }

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        tracing::info!(
            frames = stats.frames,
            saved = stats.saved,
            blank = stats.blank,
            errors = stats.errors,
            "watcher stopped"
        );
        Ok(stats)
    }
}

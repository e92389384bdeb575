//! Monitor capture via the `xcap` crate.

use crate::frame::{self, Frame, FrameError};
use std::time::Instant;
use thiserror::Error;
use xcap::Monitor;

/// Share of near-black pixels above which a frame is considered blank.
const BLANK_THRESHOLD: f32 = 0.95;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("no monitors found")]
    NoMonitors,
    #[error("monitor {index} not found ({available} available)")]
    MonitorNotFound { index: usize, available: usize },
    #[error("capture failed: {0} (on macOS, grant Screen Recording permission to the terminal)")]
    CaptureFailed(String),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Captures one monitor, identified by its position in the monitor list.
///
/// Monitors are re-enumerated on every capture so hot-plugging a display
/// between frames does not leave a stale handle behind.
pub struct ScreenCapture {
    monitor_index: usize,
    sequence: u32,
}

impl ScreenCapture {
    /// Check that `monitor_index` exists and prepare to capture it.
    pub fn open(monitor_index: usize) -> Result<Self, CaptureError> {
        let available = monitors()?.len();
        if monitor_index >= available {
            return Err(CaptureError::MonitorNotFound { index: monitor_index, available });
        }

        tracing::info!(monitor = monitor_index, available, "screen capture ready");
        Ok(Self { monitor_index, sequence: 0 })
    }

    /// Grab the monitor once and convert the screenshot into an RGB frame.
    pub fn capture_frame(&mut self) -> Result<Frame, CaptureError> {
        let all = monitors()?;
        let available = all.len();
        let monitor = all.into_iter().nth(self.monitor_index).ok_or(
            CaptureError::MonitorNotFound { index: self.monitor_index, available },
        )?;

        let start = Instant::now();
        let shot = monitor
            .capture_image()
            .map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;
        let (width, height) = (shot.width(), shot.height());
        if width == 0 || height == 0 {
            return Err(CaptureError::CaptureFailed("captured an empty screenshot".into()));
        }

        let image = frame::rgba_to_rgb(&shot.into_raw(), width, height)?;
        let is_blank = frame::is_blank_frame(&image, BLANK_THRESHOLD);

        self.sequence = self.sequence.wrapping_add(1);
        tracing::debug!(
            sequence = self.sequence,
            width,
            height,
            is_blank,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "captured screen"
        );

        Ok(Frame { image, sequence: self.sequence, is_blank })
    }
}

fn monitors() -> Result<Vec<Monitor>, CaptureError> {
    let all = Monitor::all().map_err(|e| CaptureError::CaptureFailed(e.to_string()))?;
    if all.is_empty() {
        return Err(CaptureError::NoMonitors);
    }
    Ok(all)
}

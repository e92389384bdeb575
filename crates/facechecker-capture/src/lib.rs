//! facechecker-capture — screen capture into RGB frames.
//!
//! Grabs one monitor via `xcap` and converts the RGBA screenshot into the
//! RGB frame the recognizer consumes.

pub mod frame;
pub mod screen;

pub use frame::{Frame, FrameError};
pub use screen::{CaptureError, ScreenCapture};

//! streamview
//!
//! Open a video stream, show every decoded frame in a window, stop on a key.
//!
//! # Module Structure
//!
//! - `capture`: frame sources (`Capture` trait, `CaptureSource` with
//!   synthetic, GStreamer, FFmpeg and OpenCV backends)
//! - `display`: frame sinks (`Display` trait, headless and highgui windows)
//! - `viewer`: the read → show → poll-key loop and its exit conditions
//! - `frame`: decoded RGB24 frames
//! - `config`: file / env / command-line configuration
//! - `source_url`: source classification and credential redaction
//! - `ui`: startup progress on the terminal

pub mod capture;
pub mod config;
pub mod display;
pub mod frame;
pub mod source_url;
pub mod ui;
pub mod viewer;

pub use capture::{BackendPreference, Capture, CaptureConfig, CaptureSource, CaptureStats};
pub use config::{ConfigOverrides, ViewerConfig};
pub use display::{open_display, Display, DisplayPreference, HeadlessDisplay, Key};
pub use frame::Frame;
pub use viewer::{ExitReason, RunSummary, Viewer, ViewerSettings};

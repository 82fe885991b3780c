//! Frame capture sources.
//!
//! `CaptureSource` opens a stream address and hands out decoded `Frame`s.
//! The decode work happens in a native backend chosen at open time:
//! - `stub://` URLs: synthetic test pattern (always compiled)
//! - GStreamer (feature: capture-gstreamer)
//! - FFmpeg (feature: capture-ffmpeg)
//! - OpenCV videoio (feature: capture-opencv)
//!
//! Backends never hand back placeholder frames. A read that produced nothing
//! usable returns `Ok(None)`; a backend that hit end-of-stream or a fatal
//! pipeline error reports `is_opened() == false` from then on.

#[cfg(feature = "capture-ffmpeg")]
mod ffmpeg;
#[cfg(feature = "capture-gstreamer")]
mod gstreamer;
#[cfg(feature = "capture-opencv")]
mod opencv;
pub mod synthetic;

use anyhow::{anyhow, bail, Result};
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

use crate::frame::Frame;
use crate::source_url::{self, SourceKind};

#[cfg(feature = "capture-ffmpeg")]
use self::ffmpeg::FfmpegCapture;
#[cfg(feature = "capture-gstreamer")]
use self::gstreamer::GstreamerCapture;
#[cfg(feature = "capture-opencv")]
use self::opencv::OpencvCapture;
pub use self::synthetic::{SyntheticCapture, SyntheticConfig};

/// A source of decoded frames.
pub trait Capture {
    /// True until the source is released, reaches end-of-stream, or fails fatally.
    fn is_opened(&self) -> bool;

    /// Read the next frame. `Ok(None)` means no frame was available this time.
    fn read(&mut self) -> Result<Option<Frame>>;

    /// Stop decoding and free native resources. Safe to call more than once.
    fn release(&mut self);

    fn stats(&self) -> CaptureStats;
}

/// Counters for a capture source.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames_read: u64,
    pub failed_reads: u64,
    /// Source address with credentials redacted.
    pub url: String,
}

/// Which native backend to use for non-stub sources.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    #[default]
    Auto,
    Gstreamer,
    Ffmpeg,
    Opencv,
}

impl FromStr for BackendPreference {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "gstreamer" | "gst" => Ok(Self::Gstreamer),
            "ffmpeg" => Ok(Self::Ffmpeg),
            "opencv" => Ok(Self::Opencv),
            other => Err(anyhow!(
                "unknown capture backend '{}' (expected auto, gstreamer, ffmpeg or opencv)",
                other
            )),
        }
    }
}

impl BackendPreference {
    /// Backends compiled into this build, in `Auto` preference order.
    pub fn compiled() -> Vec<BackendPreference> {
        let mut backends = Vec::new();
        if cfg!(feature = "capture-gstreamer") {
            backends.push(BackendPreference::Gstreamer);
        }
        if cfg!(feature = "capture-ffmpeg") {
            backends.push(BackendPreference::Ffmpeg);
        }
        if cfg!(feature = "capture-opencv") {
            backends.push(BackendPreference::Opencv);
        }
        backends
    }

    fn resolve(self) -> Result<BackendPreference> {
        let compiled = Self::compiled();
        match self {
            BackendPreference::Auto => compiled.first().copied().ok_or_else(|| {
                anyhow!(
                    "no capture backend compiled in; enable one of the \
                     capture-gstreamer, capture-ffmpeg or capture-opencv features"
                )
            }),
            wanted if compiled.contains(&wanted) => Ok(wanted),
            wanted => Err(anyhow!(
                "capture backend {:?} is not compiled in (enable the capture-{} feature)",
                wanted,
                format!("{:?}", wanted).to_lowercase()
            )),
        }
    }
}

/// Configuration for a capture source.
#[derive(Clone, Debug)]
pub struct CaptureConfig {
    /// Stream address (e.g. "rtsp://0.0.0.0:8554/stream", "clip.mp4", "stub://cam").
    pub url: String,
    pub backend: BackendPreference,
    /// How long a single read may block before it counts as an empty read.
    pub read_timeout: Duration,
    /// Frame width for synthetic sources.
    pub width: u32,
    /// Frame height for synthetic sources.
    pub height: u32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            url: "rtsp://0.0.0.0:8554/stream".to_string(),
            backend: BackendPreference::Auto,
            read_timeout: Duration::from_millis(2_000),
            width: 640,
            height: 480,
        }
    }
}

/// Capture source with a backend picked from the URL and build features.
pub struct CaptureSource {
    backend: CaptureBackend,
}

enum CaptureBackend {
    Synthetic(SyntheticCapture),
    #[cfg(feature = "capture-gstreamer")]
    Gstreamer(GstreamerCapture),
    #[cfg(feature = "capture-ffmpeg")]
    Ffmpeg(FfmpegCapture),
    #[cfg(feature = "capture-opencv")]
    Opencv(OpencvCapture),
}

impl CaptureSource {
    /// Open the source. Network backends start streaming immediately.
    pub fn open(config: &CaptureConfig) -> Result<Self> {
        let kind = SourceKind::classify(&config.url)?;
        if kind == SourceKind::Stub {
            let synthetic = SyntheticConfig::from_url(&config.url, config.width, config.height)?;
            return Ok(Self {
                backend: CaptureBackend::Synthetic(SyntheticCapture::new(synthetic)),
            });
        }

        let backend = config.backend.resolve()?;
        log::debug!(
            "opening {} with {:?} backend",
            source_url::redact(&config.url),
            backend
        );
        match backend {
            #[cfg(feature = "capture-gstreamer")]
            BackendPreference::Gstreamer => Ok(Self {
                backend: CaptureBackend::Gstreamer(GstreamerCapture::open(config, kind)?),
            }),
            #[cfg(feature = "capture-ffmpeg")]
            BackendPreference::Ffmpeg => Ok(Self {
                backend: CaptureBackend::Ffmpeg(FfmpegCapture::open(config, kind)?),
            }),
            #[cfg(feature = "capture-opencv")]
            BackendPreference::Opencv => Ok(Self {
                backend: CaptureBackend::Opencv(OpencvCapture::open(config, kind)?),
            }),
            other => bail!("capture backend {:?} is not available", other),
        }
    }

    /// Name of the backend serving this source.
    pub fn backend_name(&self) -> &'static str {
        match &self.backend {
            CaptureBackend::Synthetic(_) => "synthetic",
            #[cfg(feature = "capture-gstreamer")]
            CaptureBackend::Gstreamer(_) => "gstreamer",
            #[cfg(feature = "capture-ffmpeg")]
            CaptureBackend::Ffmpeg(_) => "ffmpeg",
            #[cfg(feature = "capture-opencv")]
            CaptureBackend::Opencv(_) => "opencv",
        }
    }
}

impl Capture for CaptureSource {
    fn is_opened(&self) -> bool {
        match &self.backend {
            CaptureBackend::Synthetic(source) => source.is_opened(),
            #[cfg(feature = "capture-gstreamer")]
            CaptureBackend::Gstreamer(source) => source.is_opened(),
            #[cfg(feature = "capture-ffmpeg")]
            CaptureBackend::Ffmpeg(source) => source.is_opened(),
            #[cfg(feature = "capture-opencv")]
            CaptureBackend::Opencv(source) => source.is_opened(),
        }
    }

    fn read(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            CaptureBackend::Synthetic(source) => source.read(),
            #[cfg(feature = "capture-gstreamer")]
            CaptureBackend::Gstreamer(source) => source.read(),
            #[cfg(feature = "capture-ffmpeg")]
            CaptureBackend::Ffmpeg(source) => source.read(),
            #[cfg(feature = "capture-opencv")]
            CaptureBackend::Opencv(source) => source.read(),
        }
    }

    fn release(&mut self) {
        match &mut self.backend {
            CaptureBackend::Synthetic(source) => source.release(),
            #[cfg(feature = "capture-gstreamer")]
            CaptureBackend::Gstreamer(source) => source.release(),
            #[cfg(feature = "capture-ffmpeg")]
            CaptureBackend::Ffmpeg(source) => source.release(),
            #[cfg(feature = "capture-opencv")]
            CaptureBackend::Opencv(source) => source.release(),
        }
    }

    fn stats(&self) -> CaptureStats {
        match &self.backend {
            CaptureBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "capture-gstreamer")]
            CaptureBackend::Gstreamer(source) => source.stats(),
            #[cfg(feature = "capture-ffmpeg")]
            CaptureBackend::Ffmpeg(source) => source.stats(),
            #[cfg(feature = "capture-opencv")]
            CaptureBackend::Opencv(source) => source.stats(),
        }
    }
}

/// Read timeout shared by the network backends, floored at 100ms.
#[cfg(any(
    feature = "capture-gstreamer",
    feature = "capture-ffmpeg",
    feature = "capture-opencv"
))]
pub(crate) fn effective_timeout(config: &CaptureConfig) -> Duration {
    config.read_timeout.max(Duration::from_millis(100))
}

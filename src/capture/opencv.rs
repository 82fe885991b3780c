//! OpenCV videoio capture backend.
//!
//! `VideoCapture` picks its own decoder (usually FFmpeg or GStreamer inside
//! OpenCV). Frames arrive as BGR `Mat`s and are converted to RGB.

use anyhow::{anyhow, Context, Result};
use opencv::core::{Mat, Vector, CV_8UC3};
use opencv::prelude::*;
use opencv::videoio;

use super::{effective_timeout, CaptureConfig, CaptureStats};
use crate::frame::Frame;
use crate::source_url::{self, SourceKind};

pub(crate) struct OpencvCapture {
    url: String,
    kind: SourceKind,
    capture: videoio::VideoCapture,
    frames_read: u64,
    failed_reads: u64,
    released: bool,
}

impl OpencvCapture {
    pub(crate) fn open(config: &CaptureConfig, kind: SourceKind) -> Result<Self> {
        let url = source_url::redact(&config.url);
        let target = match kind {
            SourceKind::File => source_url::file_path(&config.url)?,
            _ => config.url.clone(),
        };
        let params: Vector<i32> = timeout_params(kind, effective_timeout(config))
            .into_iter()
            .collect();
        let capture =
            videoio::VideoCapture::from_file_with_params(&target, videoio::CAP_ANY, &params)
                .with_context(|| format!("failed to open '{}' with opencv", url))?;
        if !capture.is_opened().context("query opencv capture state")? {
            return Err(anyhow!("opencv could not open '{}'", url));
        }
        log::info!("OpencvCapture: opened {}", url);
        Ok(Self {
            url,
            kind,
            capture,
            frames_read: 0,
            failed_reads: 0,
            released: false,
        })
    }

    pub(crate) fn is_opened(&self) -> bool {
        !self.released && self.capture.is_opened().unwrap_or(false)
    }

    pub(crate) fn read(&mut self) -> Result<Option<Frame>> {
        if !self.is_opened() {
            return Ok(None);
        }

        let mut mat = Mat::default();
        let grabbed = self.capture.read(&mut mat).context("read opencv frame")?;
        if !grabbed || mat.empty() {
            self.failed_reads += 1;
            // A file that stops yielding frames has ended; a network stream may recover.
            if self.kind == SourceKind::File {
                log::info!("OpencvCapture: end of file {}", self.url);
                self.release();
            }
            return Ok(None);
        }
        if mat.typ() != CV_8UC3 {
            self.failed_reads += 1;
            log::warn!("OpencvCapture: unexpected frame type {}", mat.typ());
            return Ok(None);
        }

        let width = mat.cols() as u32;
        let height = mat.rows() as u32;
        let bgr = if mat.is_continuous() {
            mat.data_bytes().context("borrow frame bytes")?.to_vec()
        } else {
            mat.try_clone()
                .context("copy non-continuous frame")?
                .data_bytes()
                .context("borrow frame bytes")?
                .to_vec()
        };
        let frame = Frame::from_bgr(bgr, width, height, self.frames_read + 1)?;
        self.frames_read += 1;
        Ok(Some(frame))
    }

    pub(crate) fn release(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.capture.release() {
            log::warn!("OpencvCapture: release failed: {}", e);
        }
        log::debug!("OpencvCapture: released {}", self.url);
        self.released = true;
    }

    pub(crate) fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_read: self.frames_read,
            failed_reads: self.failed_reads,
            url: self.url.clone(),
        }
    }
}

/// `VideoCapture` open parameters bounding how long network opens and reads block.
fn timeout_params(kind: SourceKind, timeout: std::time::Duration) -> Vec<i32> {
    if !kind.is_network() {
        return Vec::new();
    }
    let ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
    vec![
        videoio::CAP_PROP_OPEN_TIMEOUT_MSEC,
        ms,
        videoio::CAP_PROP_READ_TIMEOUT_MSEC,
        ms,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn network_sources_get_read_timeouts() {
        let params = timeout_params(SourceKind::Rtsp, Duration::from_millis(2_000));
        assert_eq!(
            params,
            vec![
                videoio::CAP_PROP_OPEN_TIMEOUT_MSEC,
                2_000,
                videoio::CAP_PROP_READ_TIMEOUT_MSEC,
                2_000
            ]
        );
        assert!(timeout_params(SourceKind::File, Duration::from_millis(2_000)).is_empty());
    }
}

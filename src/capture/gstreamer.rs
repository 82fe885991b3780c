//! GStreamer capture backend.
//!
//! RTSP sources use `rtspsrc`, everything else goes through `uridecodebin`.
//! Both end in `videoconvert ! appsink` negotiated to packed RGB.

use anyhow::{anyhow, Context, Result};
use gstreamer::prelude::*;
use std::time::Duration;

use super::{effective_timeout, CaptureConfig, CaptureStats};
use crate::frame::Frame;
use crate::source_url::{self, SourceKind};

pub(crate) struct GstreamerCapture {
    url: String,
    pipeline: gstreamer::Pipeline,
    appsink: gstreamer_app::AppSink,
    read_timeout: Duration,
    frames_read: u64,
    failed_reads: u64,
    opened: bool,
    last_error: Option<String>,
}

impl GstreamerCapture {
    pub(crate) fn open(config: &CaptureConfig, kind: SourceKind) -> Result<Self> {
        gstreamer::init().context("initialize gstreamer")?;

        let description = pipeline_description(&config.url, kind)?;
        let pipeline = gstreamer::parse::launch(&description)
            .context("build capture pipeline")?
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| anyhow!("capture pipeline is not a Pipeline"))?;

        let appsink = pipeline
            .by_name("sink")
            .context("appsink element missing from pipeline")?
            .downcast::<gstreamer_app::AppSink>()
            .map_err(|_| anyhow!("appsink element has unexpected type"))?;

        let caps = gstreamer::Caps::builder("video/x-raw")
            .field("format", "RGB")
            .build();
        appsink.set_caps(Some(&caps));
        appsink.set_max_buffers(1);
        appsink.set_drop(true);
        appsink.set_sync(false);

        pipeline
            .set_state(gstreamer::State::Playing)
            .context("set capture pipeline to Playing")?;

        let url = source_url::redact(&config.url);
        log::info!("GstreamerCapture: opened {}", url);

        Ok(Self {
            url,
            pipeline,
            appsink,
            read_timeout: effective_timeout(config),
            frames_read: 0,
            failed_reads: 0,
            opened: true,
            last_error: None,
        })
    }

    pub(crate) fn is_opened(&self) -> bool {
        self.opened
    }

    pub(crate) fn read(&mut self) -> Result<Option<Frame>> {
        self.poll_bus();
        if !self.opened {
            return Ok(None);
        }

        let timeout = gstreamer::ClockTime::from_mseconds(self.read_timeout.as_millis() as u64);
        let Some(sample) = self.appsink.try_pull_sample(timeout) else {
            if self.appsink.is_eos() {
                self.close("end of stream");
            } else {
                self.failed_reads += 1;
                log::debug!(
                    "GstreamerCapture: no sample within {}ms",
                    self.read_timeout.as_millis()
                );
            }
            return Ok(None);
        };

        match sample_to_frame(&sample, self.frames_read + 1) {
            Ok(frame) => {
                self.frames_read += 1;
                Ok(Some(frame))
            }
            Err(e) => {
                self.failed_reads += 1;
                log::warn!("GstreamerCapture: dropping undecodable sample: {:#}", e);
                Ok(None)
            }
        }
    }

    pub(crate) fn release(&mut self) {
        if let Err(e) = self.pipeline.set_state(gstreamer::State::Null) {
            log::warn!("GstreamerCapture: failed to stop pipeline: {}", e);
        }
        if self.opened {
            log::debug!("GstreamerCapture: released {}", self.url);
        }
        self.opened = false;
    }

    pub(crate) fn stats(&self) -> CaptureStats {
        CaptureStats {
            frames_read: self.frames_read,
            failed_reads: self.failed_reads,
            url: self.url.clone(),
        }
    }

    fn close(&mut self, reason: &str) {
        if self.opened {
            log::warn!("GstreamerCapture: {} closed: {}", self.url, reason);
        }
        self.opened = false;
        self.last_error = Some(reason.to_string());
    }

    fn poll_bus(&mut self) {
        let Some(bus) = self.pipeline.bus() else {
            return;
        };
        while let Some(message) = bus.pop() {
            use gstreamer::MessageView;
            match message.view() {
                MessageView::Error(err) => {
                    let reason = format!(
                        "gstreamer error from {:?}: {}",
                        err.src().map(|s| s.path_string()),
                        err.error()
                    );
                    self.close(&reason);
                }
                MessageView::Eos(..) => self.close("end of stream"),
                MessageView::Warning(warning) => {
                    log::warn!("GstreamerCapture: {}", warning.error());
                }
                _ => {}
            }
        }
    }
}

impl Drop for GstreamerCapture {
    fn drop(&mut self) {
        if self.opened {
            let _ = self.pipeline.set_state(gstreamer::State::Null);
        }
        if let Some(err) = &self.last_error {
            log::debug!("GstreamerCapture: last error for {}: {}", self.url, err);
        }
    }
}

fn pipeline_description(url: &str, kind: SourceKind) -> Result<String> {
    let sink = "videoconvert ! video/x-raw,format=RGB ! \
                appsink name=sink sync=false max-buffers=1 drop=true";
    let description = match kind {
        SourceKind::Rtsp => format!(
            "rtspsrc location=\"{}\" latency=0 ! decodebin ! {}",
            url, sink
        ),
        SourceKind::Network => format!("uridecodebin uri=\"{}\" ! {}", url, sink),
        SourceKind::File => {
            let path = std::path::PathBuf::from(source_url::file_path(url)?);
            let path = path
                .canonicalize()
                .with_context(|| format!("resolve video file {}", path.display()))?;
            let uri = url::Url::from_file_path(&path)
                .map_err(|()| anyhow!("cannot build file URI for {}", path.display()))?;
            format!("uridecodebin uri=\"{}\" ! {}", uri, sink)
        }
        SourceKind::Stub => return Err(anyhow!("stub sources do not use gstreamer")),
    };
    Ok(description)
}

fn sample_to_frame(sample: &gstreamer::Sample, seq: u64) -> Result<Frame> {
    let buffer = sample.buffer().context("sample missing buffer")?;
    let caps = sample.caps().context("sample missing caps")?;
    let info = gstreamer_video::VideoInfo::from_caps(caps).context("parse caps as video info")?;

    let map = buffer.map_readable().context("map sample buffer")?;
    Frame::from_strided(
        map.as_slice(),
        info.width(),
        info.height(),
        info.stride()[0] as usize,
        seq,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rtsp_sources_use_rtspsrc() -> Result<()> {
        let description = pipeline_description("rtsp://0.0.0.0:8554/stream", SourceKind::Rtsp)?;
        assert!(description.starts_with("rtspsrc location=\"rtsp://0.0.0.0:8554/stream\""));
        assert!(description.contains("appsink name=sink"));
        Ok(())
    }

    #[test]
    fn network_sources_use_uridecodebin() -> Result<()> {
        let description = pipeline_description("http://cam/video", SourceKind::Network)?;
        assert!(description.starts_with("uridecodebin uri=\"http://cam/video\""));
        Ok(())
    }
}

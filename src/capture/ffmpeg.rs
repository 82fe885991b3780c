//! FFmpeg capture backend.
//!
//! Opens network streams and local files through libavformat, decodes the
//! best video track and scales every frame to RGB24. RTSP is forced onto TCP
//! interleaving so lossy networks produce stalls rather than smeared frames.

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;

use super::{effective_timeout, CaptureConfig, CaptureStats};
use crate::frame::Frame;
use crate::source_url::{self, SourceKind};

pub(crate) struct FfmpegCapture {
    url: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    frames_read: u64,
    failed_reads: u64,
    opened: bool,
    /// End of input reached; the decoder is handing back its delayed frames.
    draining: bool,
}

impl FfmpegCapture {
    pub(crate) fn open(config: &CaptureConfig, kind: SourceKind) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let url = source_url::redact(&config.url);

        let target = match kind {
            SourceKind::File => source_url::file_path(&config.url)?,
            _ => config.url.clone(),
        };
        let mut options = ffmpeg::Dictionary::new();
        if kind == SourceKind::Rtsp {
            options.set("rtsp_transport", "tcp");
        }
        if kind.is_network() {
            // Socket timeout in microseconds.
            let timeout_us = effective_timeout(config).as_micros().to_string();
            options.set("timeout", &timeout_us);
        }

        let input = ffmpeg::format::input_with_dictionary(&target, options)
            .with_context(|| format!("failed to open '{}' with ffmpeg", url))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("'{}' has no video track", url))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = rgb_scaler(decoder.format(), decoder.width(), decoder.height())
            .context("create ffmpeg scaler")?;

        log::info!(
            "FfmpegCapture: opened {} ({}x{})",
            url,
            decoder.width(),
            decoder.height()
        );

        Ok(Self {
            url,
            input,
            stream_index,
            decoder,
            scaler,
            frames_read: 0,
            failed_reads: 0,
            opened: true,
            draining: false,
        })
    }

    pub(crate) fn is_opened(&self) -> bool {
        self.opened
    }

    pub(crate) fn read(&mut self) -> Result<Option<Frame>> {
        if !self.opened {
            return Ok(None);
        }

        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            // Drain before sending so `send_packet` never sees a full decoder.
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => return self.convert(&decoded),
                Err(ffmpeg::Error::Eof) => {
                    log::info!("FfmpegCapture: end of stream for {}", self.url);
                    self.opened = false;
                    return Ok(None);
                }
                Err(_) if self.draining => {
                    self.opened = false;
                    return Ok(None);
                }
                Err(_) => {}
            }

            let mut packet = ffmpeg::Packet::empty();
            if let Err(e) = packet.read(&mut self.input) {
                match classify_read_error(&e) {
                    ReadFailure::EndOfInput => {
                        if let Err(e) = self.decoder.send_eof() {
                            log::warn!("FfmpegCapture: failed to flush decoder: {}", e);
                            self.opened = false;
                            return Ok(None);
                        }
                        self.draining = true;
                        continue;
                    }
                    ReadFailure::Stalled => {
                        self.failed_reads += 1;
                        log::debug!("FfmpegCapture: no packet from {}: {}", self.url, e);
                        return Ok(None);
                    }
                }
            }
            if packet.stream() != self.stream_index {
                continue;
            }

            if let Err(e) = self.decoder.send_packet(&packet) {
                self.failed_reads += 1;
                log::debug!("FfmpegCapture: decoder rejected packet: {}", e);
                return Ok(None);
            }
        }
    }

    fn convert(&mut self, decoded: &ffmpeg::frame::Video) -> Result<Option<Frame>> {
        // Stream resolution can change mid-stream (camera profile switch).
        if decoded.width() != self.scaler.input().width
            || decoded.height() != self.scaler.input().height
        {
            log::info!(
                "FfmpegCapture: stream resized to {}x{}",
                decoded.width(),
                decoded.height()
            );
            self.scaler = rgb_scaler(decoded.format(), decoded.width(), decoded.height())
                .context("rebuild ffmpeg scaler")?;
        }

        let mut rgb_frame = ffmpeg::frame::Video::empty();
        if let Err(e) = self.scaler.run(decoded, &mut rgb_frame) {
            self.failed_reads += 1;
            log::warn!("FfmpegCapture: failed to scale frame to RGB: {}", e);
            return Ok(None);
        }
        let frame = Frame::from_strided(
            rgb_frame.data(0),
            rgb_frame.width(),
            rgb_frame.height(),
            rgb_frame.stride(0),
            self.frames_read + 1,
        )?;
        self.frames_read += 1;
        Ok(Some(frame))
    }

    pub(crate) fn release(&mut self) {
        if self.opened {
            log::debug!("FfmpegCapture: released {}", self.url);
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
}

#[derive(Debug, PartialEq, Eq)]
enum ReadFailure {
    /// No more packets. Flush the decoder, then close.
    EndOfInput,
    /// Socket timeout or a transient demuxer error. The source stays open.
    Stalled,
}

fn classify_read_error(err: &ffmpeg::Error) -> ReadFailure {
    match err {
        ffmpeg::Error::Eof => ReadFailure::EndOfInput,
        _ => ReadFailure::Stalled,
    }
}

fn rgb_scaler(
    format: ffmpeg::util::format::pixel::Pixel,
    width: u32,
    height: u32,
) -> Result<ffmpeg::software::scaling::Context, ffmpeg::Error> {
    ffmpeg::software::scaling::context::Context::get(
        format,
        width,
        height,
        ffmpeg::util::format::pixel::Pixel::RGB24,
        width,
        height,
        ffmpeg::software::scaling::flag::Flags::BILINEAR,
    )
}

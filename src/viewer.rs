//! The display loop.
//!
//! `Viewer::run` drives one capture into one display until something ends the
//! session: the quit key, the source closing, Ctrl-C, a frame limit, or too
//! many consecutive reads without a frame.
//!
//! Frames that fail `Frame::is_valid` are never handed to the display. The
//! capture is released and the display destroyed exactly once per run,
//! including when a read or render returns an error.

use anyhow::Result;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::capture::Capture;
use crate::display::{Display, Key};

/// Loop behaviour.
#[derive(Clone, Debug)]
pub struct ViewerSettings {
    pub quit_key: char,
    pub quit_on_escape: bool,
    /// How long each iteration waits for a key press.
    pub key_wait: Duration,
    /// Stop after this many rendered frames.
    pub max_frames: Option<u64>,
    /// Stop after this many consecutive reads without a frame (0 = never).
    pub max_empty_reads: u32,
    pub stats_interval: Duration,
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            quit_key: 'q',
            quit_on_escape: false,
            key_wait: Duration::from_millis(1),
            max_frames: None,
            max_empty_reads: 0,
            stats_interval: Duration::from_secs(5),
        }
    }
}

/// Why a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitReason {
    QuitKey,
    SourceClosed,
    Interrupted,
    FrameLimit,
    ReadFailures,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ExitReason::QuitKey => "quit key pressed",
            ExitReason::SourceClosed => "source closed",
            ExitReason::Interrupted => "interrupted",
            ExitReason::FrameLimit => "frame limit reached",
            ExitReason::ReadFailures => "too many empty reads",
        };
        f.write_str(text)
    }
}

/// Outcome of a run.
#[derive(Clone, Debug)]
pub struct RunSummary {
    pub reason: ExitReason,
    pub frames_shown: u64,
    pub empty_reads: u64,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn fps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= f64::EPSILON {
            return 0.0;
        }
        self.frames_shown as f64 / secs
    }
}

/// Owns the release/destroy pair for one run.
struct Session<'a, C: Capture + ?Sized, D: Display + ?Sized> {
    capture: &'a mut C,
    display: &'a mut D,
    closed: bool,
}

impl<'a, C: Capture + ?Sized, D: Display + ?Sized> Session<'a, C, D> {
    fn new(capture: &'a mut C, display: &'a mut D) -> Self {
        Self {
            capture,
            display,
            closed: false,
        }
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.capture.release();
        self.display.destroy();
    }
}

impl<C: Capture + ?Sized, D: Display + ?Sized> Drop for Session<'_, C, D> {
    fn drop(&mut self) {
        self.close();
    }
}

pub struct Viewer {
    settings: ViewerSettings,
}

impl Viewer {
    pub fn new(settings: ViewerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ViewerSettings {
        &self.settings
    }

    /// Run until an exit condition is met. `stop` is polled once per iteration.
    pub fn run<C, D>(
        &self,
        capture: &mut C,
        display: &mut D,
        stop: &AtomicBool,
    ) -> Result<RunSummary>
    where
        C: Capture + ?Sized,
        D: Display + ?Sized,
    {
        let mut session = Session::new(capture, display);
        let result = self.drive(&mut session, stop);
        session.close();

        if let Ok(summary) = &result {
            log::info!(
                "viewer stopped: {} ({} frames shown, {} empty reads, {:.1} fps)",
                summary.reason,
                summary.frames_shown,
                summary.empty_reads,
                summary.fps()
            );
        }
        result
    }

    fn drive<C, D>(&self, session: &mut Session<'_, C, D>, stop: &AtomicBool) -> Result<RunSummary>
    where
        C: Capture + ?Sized,
        D: Display + ?Sized,
    {
        let started = Instant::now();
        let mut last_stats = Instant::now();
        let mut frames_shown = 0u64;
        let mut empty_reads = 0u64;
        let mut consecutive_empty = 0u32;

        let reason = loop {
            if !session.capture.is_opened() {
                break ExitReason::SourceClosed;
            }
            if stop.load(Ordering::SeqCst) {
                break ExitReason::Interrupted;
            }

            match session.capture.read()? {
                Some(frame) if frame.is_valid() => {
                    session.display.show(&frame)?;
                    frames_shown += 1;
                    consecutive_empty = 0;
                }
                Some(frame) => {
                    log::debug!(
                        "skipping invalid frame #{} ({}x{}, {} bytes)",
                        frame.seq,
                        frame.width,
                        frame.height,
                        frame.byte_len()
                    );
                    empty_reads += 1;
                    consecutive_empty = consecutive_empty.saturating_add(1);
                }
                None => {
                    log::debug!("read returned no frame");
                    empty_reads += 1;
                    consecutive_empty = consecutive_empty.saturating_add(1);
                }
            }

            let max_empty = self.settings.max_empty_reads;
            if max_empty > 0 && consecutive_empty >= max_empty {
                log::warn!("{} consecutive reads without a frame", consecutive_empty);
                break ExitReason::ReadFailures;
            }

            if let Some(key) = session.display.poll_key(self.settings.key_wait)? {
                if self.is_quit_key(key) {
                    break ExitReason::QuitKey;
                }
                log::trace!("ignoring key {:?}", key);
            }

            if let Some(max) = self.settings.max_frames {
                if frames_shown >= max {
                    break ExitReason::FrameLimit;
                }
            }

            if last_stats.elapsed() >= self.settings.stats_interval {
                let stats = session.capture.stats();
                log::info!(
                    "source={} frames_read={} failed_reads={} shown={}",
                    stats.url,
                    stats.frames_read,
                    stats.failed_reads,
                    frames_shown
                );
                last_stats = Instant::now();
            }
        };

        Ok(RunSummary {
            reason,
            frames_shown,
            empty_reads,
            elapsed: started.elapsed(),
        })
    }

    fn is_quit_key(&self, key: Key) -> bool {
        match key {
            Key::Char(c) => c == self.settings.quit_key,
            Key::Escape => self.settings.quit_on_escape,
            Key::Other(_) => false,
        }
    }
}

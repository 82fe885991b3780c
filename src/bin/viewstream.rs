//! viewstream - show a video stream in a window
//!
//! 1. Resolves configuration (file, env, flags)
//! 2. Opens the capture source (RTSP by default)
//! 3. Opens the window titled "frame"
//! 4. Shows frames until `q`, end of stream, or Ctrl-C
//! 5. Releases the source and closes the window

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use streamview::{
    capture::BackendPreference,
    display::DisplayPreference,
    source_url,
    ui::{Ui, UiMode},
    open_display, Capture, CaptureSource, ConfigOverrides, Viewer, ViewerConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Show a video stream (RTSP, file, stub://) in a window")]
struct Args {
    /// Stream address, e.g. rtsp://0.0.0.0:8554/stream
    #[arg(value_name = "URL")]
    url: Option<String>,

    /// JSON configuration file.
    #[arg(long, env = "STREAMVIEW_CONFIG")]
    config: Option<PathBuf>,

    /// Window title.
    #[arg(long)]
    title: Option<String>,

    /// Key that closes the viewer.
    #[arg(long)]
    quit_key: Option<char>,

    /// Also close the viewer on Escape.
    #[arg(long)]
    quit_on_escape: bool,

    /// Milliseconds to wait for a key press per frame.
    #[arg(long)]
    key_wait_ms: Option<u64>,

    /// Capture backend: auto, gstreamer, ffmpeg or opencv.
    #[arg(long)]
    backend: Option<BackendPreference>,

    /// Display: auto, window or headless.
    #[arg(long)]
    display: Option<DisplayPreference>,

    /// Stop after showing this many frames.
    #[arg(long)]
    max_frames: Option<u64>,

    /// Stop after this many consecutive reads without a frame (0 = never).
    #[arg(long)]
    max_empty_reads: Option<u32>,

    /// Startup progress style: auto, plain or pretty.
    #[arg(long)]
    ui: Option<String>,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            config_path: self.config.clone(),
            url: self.url.clone(),
            title: self.title.clone(),
            quit_key: self.quit_key,
            quit_on_escape: self.quit_on_escape,
            key_wait_ms: self.key_wait_ms,
            backend: self.backend,
            display: self.display,
            max_frames: self.max_frames,
            max_empty_reads: self.max_empty_reads,
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = ViewerConfig::load_with(&args.overrides())?;
    let plain_requested =
        std::env::var_os("NO_COLOR").is_some() || std::env::var_os("STREAMVIEW_PLAIN").is_some();
    let ui = Ui::new(
        UiMode::parse(args.ui.as_deref()),
        std::io::stderr().is_terminal(),
        plain_requested,
    );

    let stop = Arc::new(AtomicBool::new(false));
    let handler_stop = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        handler_stop.store(true, Ordering::SeqCst);
    })
    .context("install Ctrl-C handler")?;

    let redacted = source_url::redact(&cfg.url);
    let step = ui.step(&format!("open {}", redacted));
    let mut source = CaptureSource::open(&cfg.capture_config())
        .with_context(|| format!("failed to open {}", redacted))?;
    step.done();
    log::info!("capturing {} via {}", redacted, source.backend_name());

    let mut display = release_on_error(&mut source, || {
        open_display(cfg.window.display, &cfg.window.title)
    })?;
    log::info!(
        "showing '{}'; press '{}' to quit",
        cfg.window.title,
        cfg.window.quit_key
    );

    let viewer = Viewer::new(cfg.viewer_settings());
    let summary = viewer.run(&mut source, display.as_mut(), &stop)?;
    log::debug!("run summary: {:?}", summary);
    Ok(())
}

/// Run `open`, releasing `source` if it fails so the stream is not left open.
fn release_on_error<C, T>(source: &mut C, open: impl FnOnce() -> Result<T>) -> Result<T>
where
    C: Capture + ?Sized,
{
    open().inspect_err(|_| source.release())
}

//! Frame display sinks.
//!
//! A `Display` renders frames and reports key presses. The viewer polls it
//! once per loop iteration, the same way OpenCV's `waitKey` pumps the GUI.
//!
//! - `HeadlessDisplay`: no window; logs what it would have shown.
//! - `HighguiDisplay`: OpenCV highgui window (feature: display-highgui).

#[cfg(feature = "display-highgui")]
mod highgui;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

use crate::frame::Frame;

#[cfg(feature = "display-highgui")]
pub use self::highgui::HighguiDisplay;

/// A key reported by a display.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Escape,
    Other(i32),
}

impl Key {
    /// Decode an OpenCV-style key code (already masked to the low byte).
    pub fn from_code(code: i32) -> Option<Key> {
        match code {
            c if c < 0 => None,
            27 => Some(Key::Escape),
            c => match u8::try_from(c) {
                Ok(byte) if byte.is_ascii() && !byte.is_ascii_control() => {
                    Some(Key::Char(byte as char))
                }
                _ => Some(Key::Other(c)),
            },
        }
    }
}

/// A sink that shows frames and reports key presses.
pub trait Display {
    /// Render one frame. Callers only pass frames with `is_valid() == true`.
    fn show(&mut self, frame: &Frame) -> Result<()>;

    /// Wait up to `wait` for a key press.
    fn poll_key(&mut self, wait: Duration) -> Result<Option<Key>>;

    /// Close every window this display opened.
    fn destroy(&mut self);
}

/// Which display to open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayPreference {
    /// Window when compiled in, headless otherwise.
    #[default]
    Auto,
    Window,
    Headless,
}

impl FromStr for DisplayPreference {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "window" => Ok(Self::Window),
            "headless" | "none" => Ok(Self::Headless),
            other => Err(anyhow!(
                "unknown display '{}' (expected auto, window or headless)",
                other
            )),
        }
    }
}

/// Open the display named by `preference`, titled `title`.
pub fn open_display(preference: DisplayPreference, title: &str) -> Result<Box<dyn Display>> {
    match preference {
        DisplayPreference::Headless => Ok(Box::new(HeadlessDisplay::new(title))),
        DisplayPreference::Window => open_window(title),
        DisplayPreference::Auto => {
            if cfg!(feature = "display-highgui") {
                open_window(title)
            } else {
                log::warn!("built without display-highgui; running headless");
                Ok(Box::new(HeadlessDisplay::new(title)))
            }
        }
    }
}

#[cfg(feature = "display-highgui")]
fn open_window(title: &str) -> Result<Box<dyn Display>> {
    Ok(Box::new(HighguiDisplay::open(title)?))
}

#[cfg(not(feature = "display-highgui"))]
fn open_window(_title: &str) -> Result<Box<dyn Display>> {
    Err(anyhow!("window display requires the display-highgui feature"))
}

/// Display without a window. Never reports a key.
pub struct HeadlessDisplay {
    title: String,
    frames_shown: u64,
    last_size: Option<(u32, u32)>,
}

impl HeadlessDisplay {
    pub fn new(title: &str) -> Self {
        Self {
            title: title.to_string(),
            frames_shown: 0,
            last_size: None,
        }
    }

    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }
}

impl Display for HeadlessDisplay {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        self.frames_shown += 1;
        let size = (frame.width, frame.height);
        if self.last_size != Some(size) {
            log::info!("[{}] frame size {}x{}", self.title, size.0, size.1);
            self.last_size = Some(size);
        }
        log::trace!("[{}] frame #{}", self.title, frame.seq);
        Ok(())
    }

    fn poll_key(&mut self, wait: Duration) -> Result<Option<Key>> {
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
        Ok(None)
    }

    fn destroy(&mut self) {
        log::debug!("[{}] headless display closed after {} frames", self.title, self.frames_shown);
    }
}

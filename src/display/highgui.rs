//! OpenCV highgui window.

use anyhow::{Context, Result};
use opencv::core::Mat;
use opencv::highgui;
use opencv::prelude::*;
use std::time::Duration;

use super::{Display, Key};
use crate::frame::{Frame, BYTES_PER_PIXEL};

/// A single named highgui window.
pub struct HighguiDisplay {
    title: String,
}

impl HighguiDisplay {
    pub fn open(title: &str) -> Result<Self> {
        highgui::named_window(title, highgui::WINDOW_AUTOSIZE)
            .with_context(|| format!("create window '{}'", title))?;
        log::debug!("HighguiDisplay: window '{}' created", title);
        Ok(Self {
            title: title.to_string(),
        })
    }
}

impl Display for HighguiDisplay {
    fn show(&mut self, frame: &Frame) -> Result<()> {
        let bgr = frame.to_bgr();
        let mat = Mat::from_slice(&bgr)
            .context("wrap frame bytes")?
            .reshape(BYTES_PER_PIXEL as i32, frame.height as i32)
            .context("reshape frame to image")?
            .try_clone()
            .context("copy frame into Mat")?;
        highgui::imshow(&self.title, &mat).context("imshow")?;
        Ok(())
    }

    fn poll_key(&mut self, wait: Duration) -> Result<Option<Key>> {
        // wait_key(0) blocks until a key arrives.
        let millis = wait.as_millis().clamp(1, i32::MAX as u128) as i32;
        let code = highgui::wait_key(millis).context("wait_key")?;
        if code < 0 {
            return Ok(None);
        }
        Ok(Key::from_code(code & 0xFF))
    }

    fn destroy(&mut self) {
        if let Err(e) = highgui::destroy_all_windows() {
            log::warn!("HighguiDisplay: failed to destroy windows: {}", e);
        }
        log::debug!("HighguiDisplay: window '{}' destroyed", self.title);
    }
}

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::capture::{BackendPreference, CaptureConfig};
use crate::display::DisplayPreference;
use crate::viewer::ViewerSettings;

pub const DEFAULT_URL: &str = "rtsp://0.0.0.0:8554/stream";
pub const DEFAULT_WINDOW_TITLE: &str = "frame";
const DEFAULT_QUIT_KEY: char = 'q';
const DEFAULT_KEY_WAIT_MS: u64 = 1;
const DEFAULT_READ_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const DEFAULT_STATS_INTERVAL_SECS: u64 = 5;

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ViewerConfigFile {
    url: Option<String>,
    window: Option<WindowConfigFile>,
    capture: Option<CaptureConfigFile>,
    limits: Option<LimitsConfigFile>,
    stats_interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct WindowConfigFile {
    title: Option<String>,
    quit_key: Option<char>,
    quit_on_escape: Option<bool>,
    key_wait_ms: Option<u64>,
    display: Option<DisplayPreference>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CaptureConfigFile {
    backend: Option<BackendPreference>,
    read_timeout_ms: Option<u64>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct LimitsConfigFile {
    max_frames: Option<u64>,
    max_empty_reads: Option<u32>,
}

/// Fully resolved viewer configuration.
#[derive(Debug, Clone)]
pub struct ViewerConfig {
    pub url: String,
    pub window: WindowSettings,
    pub capture: CaptureSettings,
    pub max_frames: Option<u64>,
    pub max_empty_reads: u32,
    pub stats_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct WindowSettings {
    pub title: String,
    pub quit_key: char,
    pub quit_on_escape: bool,
    pub key_wait: Duration,
    pub display: DisplayPreference,
}

#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub backend: BackendPreference,
    pub read_timeout: Duration,
    pub width: u32,
    pub height: u32,
}

/// Values given explicitly on the command line. They win over file and env.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_path: Option<PathBuf>,
    pub url: Option<String>,
    pub title: Option<String>,
    pub quit_key: Option<char>,
    pub quit_on_escape: bool,
    pub key_wait_ms: Option<u64>,
    pub backend: Option<BackendPreference>,
    pub display: Option<DisplayPreference>,
    pub max_frames: Option<u64>,
    pub max_empty_reads: Option<u32>,
}

impl ViewerConfig {
    /// Defaults, then the config file (`STREAMVIEW_CONFIG`), then env vars.
    pub fn load() -> Result<Self> {
        Self::load_with(&ConfigOverrides::default())
    }

    /// Like `load`, with command-line overrides applied last.
    pub fn load_with(overrides: &ConfigOverrides) -> Result<Self> {
        let config_path = overrides
            .config_path
            .clone()
            .or_else(|| env_nonempty("STREAMVIEW_CONFIG").map(PathBuf::from));
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.apply_overrides(overrides);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ViewerConfigFile) -> Self {
        let window = file.window.unwrap_or_default();
        let capture = file.capture.unwrap_or_default();
        let limits = file.limits.unwrap_or_default();
        Self {
            url: file.url.unwrap_or_else(|| DEFAULT_URL.to_string()),
            window: WindowSettings {
                title: window
                    .title
                    .unwrap_or_else(|| DEFAULT_WINDOW_TITLE.to_string()),
                quit_key: window.quit_key.unwrap_or(DEFAULT_QUIT_KEY),
                quit_on_escape: window.quit_on_escape.unwrap_or(false),
                key_wait: Duration::from_millis(window.key_wait_ms.unwrap_or(DEFAULT_KEY_WAIT_MS)),
                display: window.display.unwrap_or_default(),
            },
            capture: CaptureSettings {
                backend: capture.backend.unwrap_or_default(),
                read_timeout: Duration::from_millis(
                    capture.read_timeout_ms.unwrap_or(DEFAULT_READ_TIMEOUT_MS),
                ),
                width: capture.width.unwrap_or(DEFAULT_WIDTH),
                height: capture.height.unwrap_or(DEFAULT_HEIGHT),
            },
            max_frames: limits.max_frames,
            max_empty_reads: limits.max_empty_reads.unwrap_or(0),
            stats_interval: Duration::from_secs(
                file.stats_interval_secs
                    .unwrap_or(DEFAULT_STATS_INTERVAL_SECS),
            ),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(url) = env_nonempty("STREAMVIEW_URL") {
            self.url = url;
        }
        if let Some(title) = env_nonempty("STREAMVIEW_TITLE") {
            self.window.title = title;
        }
        if let Some(backend) = env_nonempty("STREAMVIEW_BACKEND") {
            self.capture.backend = backend.parse()?;
        }
        if let Some(display) = env_nonempty("STREAMVIEW_DISPLAY") {
            self.window.display = display.parse()?;
        }
        if let Some(max) = env_nonempty("STREAMVIEW_MAX_EMPTY_READS") {
            self.max_empty_reads = max.parse().map_err(|_| {
                anyhow!("STREAMVIEW_MAX_EMPTY_READS must be a non-negative integer")
            })?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(url) = &overrides.url {
            self.url = url.clone();
        }
        if let Some(title) = &overrides.title {
            self.window.title = title.clone();
        }
        if let Some(key) = overrides.quit_key {
            self.window.quit_key = key;
        }
        if overrides.quit_on_escape {
            self.window.quit_on_escape = true;
        }
        if let Some(ms) = overrides.key_wait_ms {
            self.window.key_wait = Duration::from_millis(ms);
        }
        if let Some(backend) = overrides.backend {
            self.capture.backend = backend;
        }
        if let Some(display) = overrides.display {
            self.window.display = display;
        }
        if overrides.max_frames.is_some() {
            self.max_frames = overrides.max_frames;
        }
        if let Some(max) = overrides.max_empty_reads {
            self.max_empty_reads = max;
        }
    }

    fn validate(&mut self) -> Result<()> {
        self.url = self.url.trim().to_string();
        crate::source_url::SourceKind::classify(&self.url)?;

        if self.window.title.trim().is_empty() {
            return Err(anyhow!("window title must not be empty"));
        }
        // The window reports keys as single bytes.
        if !self.window.quit_key.is_ascii_graphic() {
            return Err(anyhow!(
                "quit key must be a printable ASCII character, got {:?}",
                self.window.quit_key
            ));
        }
        if self.window.key_wait.is_zero() {
            return Err(anyhow!("key wait must be at least 1ms"));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(anyhow!("capture width and height must be greater than zero"));
        }
        if self.max_frames == Some(0) {
            return Err(anyhow!("max_frames must be greater than zero when set"));
        }
        if self.stats_interval.is_zero() {
            return Err(anyhow!("stats interval must be greater than zero"));
        }
        Ok(())
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            url: self.url.clone(),
            backend: self.capture.backend,
            read_timeout: self.capture.read_timeout,
            width: self.capture.width,
            height: self.capture.height,
        }
    }

    pub fn viewer_settings(&self) -> ViewerSettings {
        ViewerSettings {
            quit_key: self.window.quit_key,
            quit_on_escape: self.window.quit_on_escape,
            key_wait: self.window.key_wait,
            max_frames: self.max_frames,
            max_empty_reads: self.max_empty_reads,
            stats_interval: self.stats_interval,
        }
    }
}

fn read_config_file(path: &Path) -> Result<ViewerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_plain_viewer() -> Result<()> {
        let mut cfg = ViewerConfig::from_file(ViewerConfigFile::default());
        cfg.validate()?;
        assert_eq!(cfg.url, DEFAULT_URL);
        assert_eq!(cfg.window.title, "frame");
        assert_eq!(cfg.window.quit_key, 'q');
        assert!(!cfg.window.quit_on_escape);
        assert_eq!(cfg.window.key_wait, Duration::from_millis(1));
        assert_eq!(cfg.max_empty_reads, 0);
        assert_eq!(cfg.max_frames, None);
        Ok(())
    }

    #[test]
    fn overrides_win_over_file_values() -> Result<()> {
        let file: ViewerConfigFile = serde_json::from_str(
            r#"{ "url": "rtsp://cam-a/stream", "window": { "title": "lobby" } }"#,
        )?;
        let mut cfg = ViewerConfig::from_file(file);
        cfg.apply_overrides(&ConfigOverrides {
            url: Some("rtsp://cam-b/stream".to_string()),
            max_frames: Some(10),
            ..ConfigOverrides::default()
        });
        cfg.validate()?;
        assert_eq!(cfg.url, "rtsp://cam-b/stream");
        assert_eq!(cfg.window.title, "lobby");
        assert_eq!(cfg.max_frames, Some(10));
        Ok(())
    }

    #[test]
    fn rejects_unknown_fields() {
        let parsed: std::result::Result<ViewerConfigFile, _> =
            serde_json::from_str(r#"{ "uri": "rtsp://cam" }"#);
        assert!(parsed.is_err());
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = ViewerConfig::from_file(ViewerConfigFile::default());
        cfg.window.key_wait = Duration::ZERO;
        assert!(cfg.validate().is_err());

        let mut cfg = ViewerConfig::from_file(ViewerConfigFile::default());
        cfg.window.quit_key = '\n';
        assert!(cfg.validate().is_err());

        let mut cfg = ViewerConfig::from_file(ViewerConfigFile::default());
        cfg.window.quit_key = 'é';
        assert!(cfg.validate().is_err());

        let mut cfg = ViewerConfig::from_file(ViewerConfigFile::default());
        cfg.window.quit_key = ' ';
        assert!(cfg.validate().is_err());

        let mut cfg = ViewerConfig::from_file(ViewerConfigFile::default());
        cfg.url = "  ".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = ViewerConfig::from_file(ViewerConfigFile::default());
        cfg.max_frames = Some(0);
        assert!(cfg.validate().is_err());
    }
}

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::ConfigError;
use crate::types::CaptureMode;

pub const MIN_FRAME_INTERVAL: u32 = 60;
pub const MAX_FRAME_INTERVAL: u32 = 300;
pub const FRAME_INTERVAL_STEP: u32 = 15;
/// Capture interval at the finest frame-interval setting.
pub const BASE_INTERVAL_MS: u64 = 67;

pub const MIN_SCROLLS_PER_CAPTURE: u32 = 1;
pub const MAX_SCROLLS_PER_CAPTURE: u32 = 10;

pub const MIN_INITIAL_DELAY_MS: u64 = 1_000;
pub const MAX_INITIAL_DELAY_MS: u64 = 5_000;
pub const INITIAL_DELAY_STEP_MS: u64 = 500;

// MARK: - ScrollMethod

/// Which actuator backend performs scroll gestures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ScrollMethod {
    /// Synthetic pointer gesture (uinput virtual device).
    #[default]
    Gesture,
    /// Privileged shell command (`input swipe …`).
    Shell,
}

impl ScrollMethod {
    /// Parse a stored key. Unknown keys fall back to `Gesture`.
    pub fn from_key(key: &str) -> Self {
        match key.trim().to_ascii_lowercase().as_str() {
            "shell" | "shizuku" => Self::Shell,
            _ => Self::Gesture,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gesture => "gesture",
            Self::Shell => "shell",
        }
    }
}

impl std::fmt::Display for ScrollMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ScrollMethod {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ScrollMethod {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let key = String::deserialize(d)?;
        Ok(Self::from_key(&key))
    }
}

// MARK: - CaptureSettings

/// Read-only capture configuration consumed by a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub mode: CaptureMode,
    /// Manual-mode frame interval setting (60–300 in steps of 15).
    #[serde(alias = "frameInterval")]
    pub frame_interval: u32,
    /// Informational hint; the auto-scroll loop is content-driven.
    #[serde(alias = "scrollsPerCapture")]
    pub scrolls_per_capture: u32,
    #[serde(alias = "initialDelayMs")]
    pub initial_delay_ms: u64,
    #[serde(alias = "scrollMethod")]
    pub scroll_method: ScrollMethod,
    /// When false, manual sessions capture on demand only.
    #[serde(alias = "motionTrigger")]
    pub motion_trigger: bool,
    /// Rows of fixed chrome (status bar) excluded from scrollbar scanning.
    #[serde(alias = "topMargin")]
    pub top_margin: u32,
    /// Rows of fixed chrome (navigation bar) excluded from scrollbar scanning.
    #[serde(alias = "bottomMargin")]
    pub bottom_margin: u32,
    /// Give up waiting for a scrollbar after this long and rely on content
    /// comparison alone. `None` waits forever.
    #[serde(alias = "detectTimeoutMs")]
    pub detect_timeout_ms: Option<u64>,
    #[serde(alias = "maxScrolls")]
    pub max_scrolls: u32,
    /// Consecutive unchanged scrolls that end an auto-scroll session.
    #[serde(alias = "noChangeThreshold")]
    pub no_change_threshold: u32,
    /// Command template for the shell actuator.
    #[serde(alias = "shellCommand")]
    pub shell_command: Option<String>,
    /// Wheel notches per scroll for the gesture actuator.
    #[serde(alias = "wheelNotches")]
    pub wheel_notches: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            mode: CaptureMode::Auto,
            frame_interval: MIN_FRAME_INTERVAL,
            scrolls_per_capture: 4,
            initial_delay_ms: 2_000,
            scroll_method: ScrollMethod::Gesture,
            motion_trigger: true,
            top_margin: 0,
            bottom_margin: 0,
            detect_timeout_ms: Some(10_000),
            max_scrolls: 200,
            no_change_threshold: 1,
            shell_command: None,
            wheel_notches: 3,
        }
    }
}

impl CaptureSettings {
    /// Parse settings from JSON (camelCase or snake_case keys) and normalise.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_json::from_str(json)?;
        Ok(settings.normalized())
    }

    /// Load settings from a JSON file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Clamp every field into its supported range.
    pub fn normalized(mut self) -> Self {
        self.frame_interval = quantize_frame_interval(self.frame_interval);
        self.scrolls_per_capture = self
            .scrolls_per_capture
            .clamp(MIN_SCROLLS_PER_CAPTURE, MAX_SCROLLS_PER_CAPTURE);
        let delay = self.initial_delay_ms.clamp(MIN_INITIAL_DELAY_MS, MAX_INITIAL_DELAY_MS);
        self.initial_delay_ms = delay - (delay - MIN_INITIAL_DELAY_MS) % INITIAL_DELAY_STEP_MS;
        self.max_scrolls = self.max_scrolls.max(1);
        self.no_change_threshold = self.no_change_threshold.max(1);
        self.wheel_notches = self.wheel_notches.max(1);
        self
    }

    /// Minimum spacing between motion-triggered saves.
    pub fn capture_interval(&self) -> Duration {
        let setting = quantize_frame_interval(self.frame_interval);
        let multiplier = setting as f64 / MIN_FRAME_INTERVAL as f64;
        let ms = (BASE_INTERVAL_MS as f64 * multiplier).round() as u64;
        Duration::from_millis(ms.max(BASE_INTERVAL_MS))
    }

    /// Stillness that ends an active manual burst.
    pub fn pause_threshold(&self) -> Duration {
        self.capture_interval() * 2
    }

    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn detect_timeout(&self) -> Option<Duration> {
        self.detect_timeout_ms.map(Duration::from_millis)
    }
}

/// Clamp to [60, 300] and floor to a multiple of the 15 step.
pub fn quantize_frame_interval(value: u32) -> u32 {
    let clamped = value.clamp(MIN_FRAME_INTERVAL, MAX_FRAME_INTERVAL);
    (clamped - clamped % FRAME_INTERVAL_STEP).max(MIN_FRAME_INTERVAL)
}

/// Every selectable frame-interval setting.
pub fn frame_interval_options() -> Vec<u32> {
    (MIN_FRAME_INTERVAL..=MAX_FRAME_INTERVAL)
        .step_by(FRAME_INTERVAL_STEP as usize)
        .collect()
}

use std::time::Instant;

use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::FrameError;

// MARK: - Frame

/// One full-resolution captured screen image.
///
/// Pixels are tightly packed RGBA8 (`width * 4` bytes per row, no padding).
/// Backends that deliver padded or BGR-ordered buffers must convert before
/// constructing a `Frame`. Cloning is cheap: the pixel payload is shared.
#[derive(Clone)]
pub struct Frame {
    pixels:      Bytes,
    width:       u32,
    height:      u32,
    captured_at: Instant,
}

impl Frame {
    pub const BYTES_PER_PIXEL: usize = 4;

    /// Wrap a tightly packed RGBA8 buffer.
    pub fn from_rgba(width: u32, height: u32, pixels: impl Into<Bytes>) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::InvalidDimensions { width, height });
        }
        let pixels = pixels.into();
        let expected = width as usize * height as usize * Self::BYTES_PER_PIXEL;
        if pixels.len() != expected {
            return Err(FrameError::LengthMismatch { expected, actual: pixels.len() });
        }
        Ok(Self { pixels, width, height, captured_at: Instant::now() })
    }

    /// A frame filled with a single colour.
    pub fn solid(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let count = width.max(1) as usize * height.max(1) as usize;
        let mut data = Vec::with_capacity(count * Self::BYTES_PER_PIXEL);
        for _ in 0..count {
            data.extend_from_slice(&rgba);
        }
        Self {
            pixels: Bytes::from(data),
            width: width.max(1),
            height: height.max(1),
            captured_at: Instant::now(),
        }
    }

    /// Override the capture timestamp.
    pub fn with_timestamp(mut self, captured_at: Instant) -> Self {
        self.captured_at = captured_at;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    pub fn into_bytes(self) -> Bytes {
        self.pixels
    }

    /// RGBA value at (x, y). Panics when out of bounds.
    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * Self::BYTES_PER_PIXEL;
        [self.pixels[i], self.pixels[i + 1], self.pixels[i + 2], self.pixels[i + 3]]
    }

    /// Same dimensions as `other`.
    pub fn same_size(&self, other: &Frame) -> bool {
        self.width == other.width && self.height == other.height
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("size", &self.pixels.len())
            .finish()
    }
}

// MARK: - Viewport

/// Native geometry of the mirrored display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Viewport {
    pub width:       u32,
    pub height:      u32,
    pub density_dpi: u32,
}

impl Viewport {
    pub fn new(width: u32, height: u32, density_dpi: u32) -> Self {
        Self { width, height, density_dpi }
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}×{}@{}dpi", self.width, self.height, self.density_dpi)
    }
}

// MARK: - ScrollbarInfo

/// A scrollbar thumb found on one frame. Rows are frame coordinates;
/// `track_bottom` is exclusive, `thumb_bottom` is the last thumb row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScrollbarInfo {
    pub track_top:    u32,
    pub track_bottom: u32,
    pub thumb_top:    u32,
    pub thumb_bottom: u32,
    /// Column the thumb was found in.
    pub x:            u32,
    pub at_bottom:    bool,
}

impl ScrollbarInfo {
    pub fn track_height(&self) -> u32 {
        self.track_bottom.saturating_sub(self.track_top)
    }

    pub fn thumb_height(&self) -> u32 {
        self.thumb_bottom.saturating_sub(self.thumb_top) + 1
    }
}

// MARK: - CaptureMode

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CaptureMode {
    /// Motion-triggered and on-demand capture.
    Manual,
    /// Actuator-driven scrolling capture.
    #[default]
    Auto,
}

impl CaptureMode {
    /// Parse a stored key. Unknown keys fall back to `Auto`; `"scroll"` is
    /// the legacy name of `Auto`.
    pub fn from_key(key: &str) -> Self {
        match key.trim().to_ascii_lowercase().as_str() {
            "manual" => Self::Manual,
            _ => Self::Auto,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Auto => "auto",
        }
    }
}

impl std::fmt::Display for CaptureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for CaptureMode {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CaptureMode {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let key = String::deserialize(d)?;
        Ok(Self::from_key(&key))
    }
}

// MARK: - OrchestratorState

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorState {
    #[default]
    Idle,
    Starting,
    Detecting,
    Active,
    Completed,
    Error,
}

impl OrchestratorState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle      => "Idle",
            Self::Starting  => "Starting…",
            Self::Detecting => "Detecting scrollbar",
            Self::Active    => "Capturing",
            Self::Completed => "Completed",
            Self::Error     => "Error",
        }
    }

    /// `Completed` and `Error` end a session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl std::fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

// MARK: - SessionToken

/// Permission grant that identifies one capture session.
///
/// `code` is the platform result code, `grant` the opaque grant payload
/// (for the PipeWire backend: a portal restore token, empty for a fresh
/// permission prompt).
#[derive(Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SessionToken {
    pub code:  i32,
    pub grant: String,
}

impl SessionToken {
    pub fn new(code: i32, grant: impl Into<String>) -> Self {
        Self { code, grant: grant.into() }
    }

    pub fn has_grant(&self) -> bool {
        !self.grant.is_empty()
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // never print the grant
        f.debug_struct("SessionToken")
            .field("code", &self.code)
            .field("grant", &if self.has_grant() { "<set>" } else { "<none>" })
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_wrong_length() {
        let err = Frame::from_rgba(2, 2, vec![0u8; 15]).unwrap_err();
        assert!(matches!(err, FrameError::LengthMismatch { expected: 16, actual: 15 }));
        assert!(Frame::from_rgba(0, 2, Vec::new()).is_err());
    }

    #[test]
    fn frame_pixel_addressing() {
        let mut data = vec![0u8; 3 * 2 * 4];
        // (2, 1) → index (1*3 + 2) * 4 = 20
        data[20..24].copy_from_slice(&[1, 2, 3, 4]);
        let frame = Frame::from_rgba(3, 2, data).unwrap();
        assert_eq!(frame.pixel(2, 1), [1, 2, 3, 4]);
        assert_eq!(frame.pixel(0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn capture_mode_keys() {
        assert_eq!(CaptureMode::from_key("manual"), CaptureMode::Manual);
        assert_eq!(CaptureMode::from_key("scroll"), CaptureMode::Auto);
        assert_eq!(CaptureMode::from_key("bogus"), CaptureMode::Auto);
        let json = serde_json::to_string(&CaptureMode::Manual).unwrap();
        assert_eq!(json, "\"manual\"");
    }

    #[test]
    fn token_debug_hides_grant() {
        let token = SessionToken::new(-1, "secret-restore-token");
        let dbg = format!("{token:?}");
        assert!(!dbg.contains("secret"));
    }
}

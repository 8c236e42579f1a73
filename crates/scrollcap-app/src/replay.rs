//! Offline runs: replay a directory of screenshots as the screen.
//!
//! In auto mode the [`ReplayActuator`] moves the replay cursor one image per
//! scroll, so a folder of page screenshots behaves like a scrollable view.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use scrollcap_actuator::{ActuatorError, ScrollActuator};
use scrollcap_capture::{MemorySource, SharedCursor};
use scrollcap_core::Frame;
use tracing::{debug, info};

/// PNG files in `dir`, sorted by file name.
fn image_paths(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        let is_png = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("png"));
        if is_png {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

pub fn load_frames(dir: &Path) -> Result<Vec<Frame>> {
    let paths = image_paths(dir)?;
    if paths.is_empty() {
        bail!("no PNG files in {}", dir.display());
    }
    let mut frames = Vec::with_capacity(paths.len());
    for path in &paths {
        let rgba = image::open(path)
            .with_context(|| format!("decoding {}", path.display()))?
            .to_rgba8();
        let (width, height) = rgba.dimensions();
        let frame = Frame::from_rgba(width, height, rgba.into_raw())
            .with_context(|| format!("converting {}", path.display()))?;
        debug!("[Replay] Loaded {} ({}x{})", path.display(), width, height);
        frames.push(frame);
    }
    info!("[Replay] {} frame(s) from {}", frames.len(), dir.display());
    Ok(frames)
}

/// Memory source over the images in `dir`. Manual sessions play the images
/// back on their own; auto sessions wait for the actuator.
pub fn source(dir: &Path, interval: Duration, autoplay: bool) -> Result<MemorySource> {
    Ok(MemorySource::new(load_frames(dir)?, interval).autoplay(autoplay))
}

/// "Scrolls" by showing the next replayed image.
pub struct ReplayActuator {
    cursor: SharedCursor,
}

impl ReplayActuator {
    pub fn new(cursor: SharedCursor) -> Self {
        Self { cursor }
    }
}

#[async_trait]
impl ScrollActuator for ReplayActuator {
    fn is_available(&self) -> bool {
        !self.cursor.is_empty()
    }

    async fn scroll_down(&mut self, _viewport_width: u32, _viewport_height: u32) -> Result<(), ActuatorError> {
        let index = self.cursor.advance();
        debug!("[Replay] Showing image {}/{}", index + 1, self.cursor.len());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}

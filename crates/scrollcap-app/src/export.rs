use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use scrollcap_core::Frame;
use tracing::info;

/// Write `frames` as `frame_000.png`, `frame_001.png`, … into `dir`.
pub fn write_frames(dir: &Path, frames: &[Frame]) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let mut written = Vec::with_capacity(frames.len());
    for (index, frame) in frames.iter().enumerate() {
        let path = dir.join(format!("frame_{:03}.png", index));
        let image = image::RgbaImage::from_raw(frame.width(), frame.height(), frame.as_bytes().to_vec())
            .with_context(|| format!("frame {} has an inconsistent buffer", index))?;
        image.save(&path).with_context(|| format!("writing {}", path.display()))?;
        written.push(path);
    }
    info!("[Export] Wrote {} frame(s) to {}", written.len(), dir.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_numbered_pngs() {
        let dir = std::env::temp_dir().join(format!("scrollcap-export-{}", std::process::id()));
        let frames = vec![Frame::solid(4, 3, [1, 2, 3, 255]), Frame::solid(4, 3, [9, 8, 7, 255])];

        let paths = write_frames(&dir, &frames).unwrap();
        assert_eq!(paths.len(), 2);
        assert!(paths[1].ends_with("frame_001.png"));

        let back = image::open(&paths[1]).unwrap().to_rgba8();
        std::fs::remove_dir_all(&dir).ok();
        assert_eq!(back.dimensions(), (4, 3));
        assert_eq!(back.get_pixel(0, 0).0, [9, 8, 7, 255]);
    }

    #[test]
    fn no_frames_writes_nothing() {
        let dir = std::env::temp_dir().join(format!("scrollcap-export-empty-{}", std::process::id()));
        assert!(write_frames(&dir, &[]).unwrap().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }
}

//! Coarse content comparison between two frames.
//!
//! Used by the auto-scroll loop to notice that a scroll moved nothing. Only
//! the central region is compared so sticky headers, footers and the
//! scrollbar itself do not count.

use scrollcap_core::Frame;

/// Horizontal comparison window, percent of width.
pub const REGION_X_PERCENT: (u32, u32) = (20, 80);
/// Vertical comparison window, percent of height.
pub const REGION_Y_PERCENT: (u32, u32) = (30, 70);
/// Grid step in pixels, both axes.
pub const GRID_STEP: usize = 20;
/// Similarity above which two frames count as unchanged.
pub const SIMILARITY_THRESHOLD: f32 = 0.95;

/// Fraction of grid points with byte-identical RGBA.
///
/// `None` when the frames differ in size or the grid is empty.
pub fn frame_similarity(a: &Frame, b: &Frame) -> Option<f32> {
    if !a.same_size(b) {
        return None;
    }
    let (w, h) = (a.width(), a.height());
    let x0 = w * REGION_X_PERCENT.0 / 100;
    let x1 = w * REGION_X_PERCENT.1 / 100;
    let y0 = h * REGION_Y_PERCENT.0 / 100;
    let y1 = h * REGION_Y_PERCENT.1 / 100;

    let mut total = 0u32;
    let mut same = 0u32;
    for y in (y0..y1).step_by(GRID_STEP) {
        for x in (x0..x1).step_by(GRID_STEP) {
            total += 1;
            if a.pixel(x, y) == b.pixel(x, y) {
                same += 1;
            }
        }
    }
    if total == 0 {
        return None;
    }
    Some(same as f32 / total as f32)
}

/// True when a scroll apparently changed nothing.
pub fn frames_similar(a: &Frame, b: &Frame) -> bool {
    frame_similarity(a, b).is_some_and(|s| s > SIMILARITY_THRESHOLD)
}

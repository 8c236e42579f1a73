//! Vertical scrollbar thumb detection.
//!
//! The thumb is the longest run of neutral mid-gray pixels in one column of
//! the right-hand edge band. Its position relative to the scan band (the
//! "track") tells the auto-scroll loop how far down the content is, which is
//! more robust than pixel diffing when the page contains animations.
//!
//! All ratios are evaluated in integer percent so boundaries are exact.

use scrollcap_core::{Frame, ScrollbarInfo};
use tracing::{debug, warn};

/// Width of the scanned edge band, percent of frame width.
pub const SCAN_WIDTH_PERCENT: u32 = 5;
/// Columns at the very edge that are never scanned.
pub const EDGE_EXCLUSION: u32 = 2;
pub const MIN_THUMB_PERCENT: u32 = 8;
pub const MAX_THUMB_PERCENT: u32 = 60;
pub const GRAY_TOLERANCE: u8 = 50;
pub const MIN_GRAY: u32 = 80;
pub const MAX_GRAY: u32 = 200;
pub const BOTTOM_TOLERANCE_PERCENT: u32 = 5;
pub const MIN_BOTTOM_TOLERANCE_PX: u32 = 50;

/// Neutral mid-gray as drawn by typical overlay scrollbars.
#[inline]
pub fn is_scrollbar_gray(px: [u8; 4]) -> bool {
    let [r, g, b, _] = px;
    let max_diff = r.abs_diff(g).max(g.abs_diff(b)).max(r.abs_diff(b));
    if max_diff > GRAY_TOLERANCE {
        return false;
    }
    let avg = (r as u32 + g as u32 + b as u32) / 3;
    (MIN_GRAY..=MAX_GRAY).contains(&avg)
}

/// Gap allowed between thumb and track bottom that still counts as "at bottom".
pub fn bottom_tolerance(track_height: u32) -> u32 {
    (track_height * BOTTOM_TOLERANCE_PERCENT / 100).max(MIN_BOTTOM_TOLERANCE_PX)
}

#[derive(Debug, Clone, Copy)]
struct Run {
    start: u32,
    /// Last row of the run (inclusive).
    end:   u32,
}

impl Run {
    fn len(&self) -> u32 {
        self.end - self.start + 1
    }
}

/// Longest gray run in column `x` between `top` and `bottom` (exclusive).
fn longest_gray_run(frame: &Frame, x: u32, top: u32, bottom: u32) -> Option<Run> {
    let mut best: Option<Run> = None;
    let mut current: Option<Run> = None;
    for y in top..bottom {
        if is_scrollbar_gray(frame.pixel(x, y)) {
            current = Some(match current {
                Some(run) => Run { end: y, ..run },
                None => Run { start: y, end: y },
            });
        } else if let Some(run) = current.take() {
            if best.map_or(true, |b| run.len() > b.len()) {
                best = Some(run);
            }
        }
    }
    if let Some(run) = current {
        if best.map_or(true, |b| run.len() > b.len()) {
            best = Some(run);
        }
    }
    best
}

/// Locate a scrollbar thumb in the right edge band of `frame`.
///
/// `top_margin` / `bottom_margin` exclude fixed chrome such as status and
/// navigation bars. Returns `None` when no column holds a run between 8%
/// and 60% of the scan height; a run longer than that means the content
/// fits on one screen.
pub fn detect_scrollbar(frame: &Frame, top_margin: u32, bottom_margin: u32) -> Option<ScrollbarInfo> {
    let (width, height) = (frame.width(), frame.height());
    let scan_top = top_margin;
    let scan_bottom = height.saturating_sub(bottom_margin);
    if scan_bottom <= scan_top {
        warn!("Scrollbar scan area empty (top={}, bottom={})", scan_top, scan_bottom);
        return None;
    }

    let scan_height = scan_bottom - scan_top;
    let min_len = scan_height * MIN_THUMB_PERCENT / 100;
    let max_len = scan_height * MAX_THUMB_PERCENT / 100;
    let scan_start_x = width * (100 - SCAN_WIDTH_PERCENT) / 100;
    let scan_end_x = width.saturating_sub(EDGE_EXCLUSION);

    let mut best: Option<(u32, Run)> = None;
    for x in scan_start_x..scan_end_x {
        let Some(run) = longest_gray_run(frame, x, scan_top, scan_bottom) else { continue };
        if run.len() < min_len || run.len() > max_len {
            continue;
        }
        if best.map_or(true, |(_, b)| run.len() > b.len()) {
            best = Some((x, run));
        }
    }

    let Some((x, run)) = best else {
        debug!("No scrollbar found");
        return None;
    };

    let gap = scan_bottom - run.end;
    let at_bottom = gap <= bottom_tolerance(scan_height);
    debug!(
        "Scrollbar found: x={} thumb={}..={} gap={} at_bottom={}",
        x, run.start, run.end, gap, at_bottom
    );

    Some(ScrollbarInfo {
        track_top: scan_top,
        track_bottom: scan_bottom,
        thumb_top: run.start,
        thumb_bottom: run.end,
        x,
        at_bottom,
    })
}

/// Fraction of the scrollable travel already covered, in `[0, 1]`.
pub fn scroll_progress(info: Option<&ScrollbarInfo>) -> f32 {
    let Some(info) = info else { return 0.0 };
    let travel = info.track_height() as i64 - info.thumb_height() as i64;
    if travel <= 0 {
        return 1.0;
    }
    let position = info.thumb_top as i64 - info.track_top as i64;
    (position as f32 / travel as f32).clamp(0.0, 1.0)
}

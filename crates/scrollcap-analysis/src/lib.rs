//! scrollcap-analysis: stateless visual analysis over captured frames.
//!
//! | Function | Used by | Purpose |
//! |----------|---------|---------|
//! | [`Sample::from_frame`] + [`has_meaningful_change`] | manual capture | cheap motion detection on a 64×64 thumbnail |
//! | [`detect_scrollbar`] | auto-scroll | locate the scrollbar thumb and decide "at bottom" |
//! | [`frames_similar`] | auto-scroll | fallback end-of-content signal when no thumb is visible |
//!
//! Everything here takes borrowed frames and keeps no state, so it can run
//! on any thread.

pub mod motion;
pub mod scrollbar;
pub mod similarity;

pub use motion::{average_distance, has_meaningful_change, Sample};
pub use scrollbar::{detect_scrollbar, scroll_progress};
pub use similarity::{frame_similarity, frames_similar};

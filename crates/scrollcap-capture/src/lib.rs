//! scrollcap-capture: frame sources and the consumer-side frame feed.
//!
//! # Backends
//!
//! | Backend | Platform | Notes |
//! |---------|----------|-------|
//! | [`MemorySource`] | any | replays frames; cursor driven by autoplay or a replay actuator |
//! | `PipeWireSource` | Linux, feature `pipewire` | XDG ScreenCast portal + GStreamer appsink |
//!
//! # Data flow
//!
//! ```text
//! backend thread ──push──► FrameQueue (bounded, drop-oldest) ──notify──► session worker
//!                                                                  FrameFeed::next_frame()
//! ```
//!
//! Backends deliver [`RawImage`]s in whatever layout they get from the
//! platform; [`FrameFeed`] crops row padding and normalises to RGBA on the
//! worker thread.

pub mod feed;
pub mod memory;
pub mod queue;
pub mod raw;
pub mod source;

#[cfg(all(target_os = "linux", feature = "pipewire"))]
pub mod pipewire;

pub use feed::FrameFeed;
pub use memory::{MemorySource, SharedCursor, SourceProbe};
pub use queue::{FrameQueue, FrameSink, AUTO_QUEUE_DEPTH, MANUAL_QUEUE_DEPTH};
pub use raw::{PixelFormat, RawImage};
pub use source::{CaptureError, FrameSource};

#[cfg(all(target_os = "linux", feature = "pipewire"))]
pub use pipewire::PipeWireSource;

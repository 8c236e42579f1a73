//! scrollcap-session: capture orchestration.
//!
//! | Mode | Machine | Ends with |
//! |------|---------|-----------|
//! | manual | [`ManualCapture`]: motion bursts + on-demand capture | `finish()` (deliver) or `stop()` (discard) |
//! | auto | [`AutoScroll`]: scroll, settle, capture, check | bottom reached, content unchanged, or scroll cap |
//!
//! Both machines are pure and clock-injected; [`Session`] drives one of them
//! on a single worker, and [`Capturer`] runs sessions one at a time on a
//! dedicated thread.

pub mod auto_scroll;
pub mod capturer;
pub mod error;
pub mod events;
pub mod handle;
pub mod manual;
pub mod session;

pub use auto_scroll::{AutoScroll, Continuation, Step};
pub use capturer::Capturer;
pub use error::SessionError;
pub use events::SessionEvent;
pub use handle::{SessionControl, SessionHandle, CAPTURE_NOW_TIMEOUT};
pub use manual::{CaptureNow, ManualCapture};
pub use session::{Session, SessionParts};

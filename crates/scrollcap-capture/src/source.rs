use async_trait::async_trait;
use scrollcap_core::{SessionToken, Viewport};
use thiserror::Error;

use crate::queue::FrameSink;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Screen capture permission denied: {0}")]
    PermissionDenied(String),

    #[error("Capture resources unavailable: {0}")]
    Unavailable(String),

    #[error("Frame source already started")]
    AlreadyStarted,

    #[error("Capture backend error: {0:#}")]
    Backend(#[from] anyhow::Error),
}

/// A screen-mirroring backend.
///
/// `start` acquires mirroring resources and begins pushing images into
/// `sink` from whatever thread the backend uses. `stop` must be idempotent,
/// safe after a failed `start`, and must not panic.
#[async_trait]
pub trait FrameSource: Send + 'static {
    /// Begin mirroring at native resolution; returns the display geometry.
    async fn start(&mut self, token: &SessionToken, sink: FrameSink) -> Result<Viewport, CaptureError>;

    async fn stop(&mut self);

    fn name(&self) -> &'static str;
}

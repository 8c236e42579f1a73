use std::future::Future;
use std::sync::Arc;

use scrollcap_core::{Frame, SessionToken, Viewport};
use tracing::{debug, info, warn};

use crate::queue::FrameQueue;
use crate::source::{CaptureError, FrameSource};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedState {
    Idle,
    Running,
    Released,
}

/// Consumer side of a frame source, owned by the session worker.
///
/// Couples a [`FrameSource`] with its queue and exposes the three capture
/// primitives the orchestrators use: `start`, non-blocking `next_frame`, and
/// idempotent `release`.
pub struct FrameFeed {
    source:        Box<dyn FrameSource>,
    queue:         Arc<FrameQueue>,
    state:         FeedState,
    viewport:      Option<Viewport>,
    lost_reported: bool,
}

impl FrameFeed {
    pub fn new(source: Box<dyn FrameSource>, depth: usize) -> Self {
        Self {
            source,
            queue: FrameQueue::new(depth),
            state: FeedState::Idle,
            viewport: None,
            lost_reported: false,
        }
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.viewport
    }

    pub fn is_running(&self) -> bool {
        self.state == FeedState::Running
    }

    /// Acquire mirroring resources. On failure the caller must still call
    /// [`release`](Self::release).
    pub async fn start(&mut self, token: &SessionToken) -> Result<Viewport, CaptureError> {
        if self.state == FeedState::Running {
            return Err(CaptureError::AlreadyStarted);
        }
        self.queue.reset();
        self.lost_reported = false;
        // counts as running even on failure so release still stops the backend
        self.state = FeedState::Running;
        let viewport = self.source.start(token, self.queue.clone()).await?;
        info!("[Feed] {} started at {}", self.source.name(), viewport);
        self.viewport = Some(viewport);
        Ok(viewport)
    }

    /// Most recent undelivered frame, if any. Never blocks.
    pub fn next_frame(&mut self) -> Option<Frame> {
        if self.state != FeedState::Running {
            return None;
        }
        let raw = self.queue.take_latest()?;
        match raw.to_frame() {
            Ok(frame) => Some(frame),
            Err(e) => {
                debug!("[Feed] Skipping undecodable image {:?}: {}", raw, e);
                None
            }
        }
    }

    /// Resolves when a new image may be available or the source was lost.
    /// The future does not borrow the feed.
    pub fn changed(&self) -> impl Future<Output = ()> + Send + 'static {
        let queue = self.queue.clone();
        async move { queue.changed().await }
    }

    /// One-shot: true the first time the backend is seen to have stopped.
    pub fn take_lost(&mut self) -> bool {
        if self.lost_reported || self.state != FeedState::Running || !self.queue.is_lost() {
            return false;
        }
        warn!("[Feed] {} stopped by the platform", self.source.name());
        self.lost_reported = true;
        true
    }

    /// Stop the backend and drop queued images. Safe to call repeatedly.
    pub async fn release(&mut self) {
        if self.state != FeedState::Running {
            self.state = FeedState::Released;
            return;
        }
        self.state = FeedState::Released;
        self.source.stop().await;
        self.queue.reset();
        info!("[Feed] {} released", self.source.name());
    }

    /// Hand the backend back to its owner.
    pub fn into_source(self) -> Box<dyn FrameSource> {
        self.source
    }
}

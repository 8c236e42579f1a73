use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::Notify;
use tracing::{debug, info};

use crate::raw::RawImage;

/// Image queue depth for manual sessions.
pub const MANUAL_QUEUE_DEPTH: usize = 5;
/// Image queue depth for auto-scroll sessions.
pub const AUTO_QUEUE_DEPTH: usize = 3;

/// Producer handle given to a [`FrameSource`](crate::FrameSource).
pub type FrameSink = Arc<FrameQueue>;

/// Bounded drop-oldest hand-off between a backend thread and the session
/// worker.
///
/// Backends push from any thread; the single consumer takes the newest
/// image and discards the rest. Every push and the lost signal wake the
/// consumer through a stored [`Notify`] permit, so a wake-up that happens
/// before the consumer awaits is not missed.
pub struct FrameQueue {
    state:    Mutex<QueueState>,
    notify:   Notify,
    capacity: usize,
}

#[derive(Default)]
struct QueueState {
    images:  VecDeque<RawImage>,
    lost:    bool,
    dropped: u64,
}

impl FrameQueue {
    pub fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            capacity: capacity.max(1),
        })
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // poisoned by a panicking producer: keep going
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Images discarded on overflow or by acquire-latest.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    /// Enqueue an image, evicting the oldest when full.
    pub fn push(&self, image: RawImage) {
        {
            let mut state = self.lock();
            if state.lost {
                return;
            }
            while state.images.len() >= self.capacity {
                state.images.pop_front();
                state.dropped += 1;
            }
            state.images.push_back(image);
        }
        self.notify.notify_one();
    }

    /// Newest queued image; older ones are discarded.
    pub fn take_latest(&self) -> Option<RawImage> {
        let mut state = self.lock();
        let latest = state.images.pop_back();
        let stale = state.images.len() as u64;
        if stale > 0 {
            debug!("[Queue] Discarding {} stale image(s)", stale);
            state.images.clear();
            state.dropped += stale;
        }
        latest
    }

    /// Signal that the platform stopped the stream. Later pushes are ignored.
    pub fn mark_lost(&self) {
        {
            let mut state = self.lock();
            if state.lost {
                return;
            }
            info!("[Queue] Source lost");
            state.lost = true;
        }
        self.notify.notify_one();
    }

    pub fn is_lost(&self) -> bool {
        self.lock().lost
    }

    /// Drop everything queued and reset the lost flag.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.images.clear();
        state.lost = false;
    }

    /// Resolve once an image was pushed or the source was lost.
    pub async fn changed(&self) {
        self.notify.notified().await;
    }
}

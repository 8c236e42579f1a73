use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use scrollcap_core::{Frame, SessionToken, Viewport};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::queue::FrameSink;
use crate::raw::RawImage;
use crate::source::{CaptureError, FrameSource};

const DEFAULT_DENSITY_DPI: u32 = 160;

// ── SharedCursor ─────────────────────────────────────────────────────────────

/// Index of the frame a [`MemorySource`] is currently "showing".
///
/// Clones share the index, so a replay actuator can move the picture while
/// the source keeps producing it.
#[derive(Debug, Clone)]
pub struct SharedCursor {
    index: Arc<AtomicUsize>,
    len:   usize,
}

impl SharedCursor {
    fn new(len: usize) -> Self {
        Self { index: Arc::new(AtomicUsize::new(0)), len }
    }

    pub fn get(&self) -> usize {
        self.index.load(Ordering::Acquire)
    }

    pub fn set(&self, index: usize) {
        self.index.store(index.min(self.len.saturating_sub(1)), Ordering::Release);
    }

    /// Step forward, stopping at the last frame. Returns the new index.
    pub fn advance(&self) -> usize {
        let last = self.len.saturating_sub(1);
        let prev = self
            .index
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |i| Some((i + 1).min(last)))
            .unwrap_or(last);
        (prev + 1).min(last)
    }

    pub fn is_at_end(&self) -> bool {
        self.get() + 1 >= self.len
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

// ── SourceProbe ──────────────────────────────────────────────────────────────

/// Observes a [`MemorySource`] after it has been moved into a session.
#[derive(Debug, Clone, Default)]
pub struct SourceProbe {
    running: Arc<AtomicBool>,
    starts:  Arc<AtomicUsize>,
    stops:   Arc<AtomicUsize>,
    pushed:  Arc<AtomicUsize>,
}

impl SourceProbe {
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn start_calls(&self) -> usize {
        self.starts.load(Ordering::Acquire)
    }

    pub fn stop_calls(&self) -> usize {
        self.stops.load(Ordering::Acquire)
    }

    pub fn images_pushed(&self) -> usize {
        self.pushed.load(Ordering::Acquire)
    }
}

// ── MemorySource ─────────────────────────────────────────────────────────────

/// Replays a fixed list of frames at a fixed rate.
///
/// Every tick pushes the frame at the cursor. With `autoplay` the cursor
/// advances after each push; otherwise something else (a replay actuator,
/// a test) moves it.
pub struct MemorySource {
    frames:      Arc<Vec<Frame>>,
    cursor:      SharedCursor,
    interval:    Duration,
    autoplay:    bool,
    fail_start:  bool,
    lose_after:  Option<usize>,
    density_dpi: u32,
    probe:       SourceProbe,
    task:        Option<(oneshot::Sender<()>, JoinHandle<()>)>,
}

impl MemorySource {
    pub fn new(frames: Vec<Frame>, interval: Duration) -> Self {
        let cursor = SharedCursor::new(frames.len());
        Self {
            frames: Arc::new(frames),
            cursor,
            interval: interval.max(Duration::from_millis(1)),
            autoplay: false,
            fail_start: false,
            lose_after: None,
            density_dpi: DEFAULT_DENSITY_DPI,
            probe: SourceProbe::default(),
            task: None,
        }
    }

    /// Advance the cursor after every produced frame.
    pub fn autoplay(mut self, enabled: bool) -> Self {
        self.autoplay = enabled;
        self
    }

    /// Refuse to start, as if mirroring resources could not be allocated.
    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    /// Raise the lost signal after `count` images.
    pub fn lose_after(mut self, count: usize) -> Self {
        self.lose_after = Some(count);
        self
    }

    pub fn with_density(mut self, density_dpi: u32) -> Self {
        self.density_dpi = density_dpi;
        self
    }

    pub fn cursor(&self) -> SharedCursor {
        self.cursor.clone()
    }

    pub fn probe(&self) -> SourceProbe {
        self.probe.clone()
    }
}

fn push_current(frames: &[Frame], cursor: &SharedCursor, sink: &FrameSink, probe: &SourceProbe) {
    let Some(frame) = frames.get(cursor.get()) else { return };
    let mut raw = RawImage::from_frame(frame);
    raw.captured_at = tokio::time::Instant::now().into_std();
    sink.push(raw);
    probe.pushed.fetch_add(1, Ordering::AcqRel);
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn start(&mut self, _token: &SessionToken, sink: FrameSink) -> Result<Viewport, CaptureError> {
        self.probe.starts.fetch_add(1, Ordering::AcqRel);
        if self.task.is_some() {
            return Err(CaptureError::AlreadyStarted);
        }
        if self.fail_start {
            return Err(CaptureError::Unavailable("memory source configured to fail".into()));
        }
        let Some(first) = self.frames.first() else {
            return Err(CaptureError::Unavailable("no frames to replay".into()));
        };
        let viewport = Viewport::new(first.width(), first.height(), self.density_dpi);

        let frames = self.frames.clone();
        let cursor = self.cursor.clone();
        let probe = self.probe.clone();
        let interval = self.interval;
        let autoplay = self.autoplay;
        let lose_after = self.lose_after;

        self.probe.running.store(true, Ordering::Release);
        push_current(&frames, &cursor, &sink, &probe);
        let mut produced = 1usize;
        if autoplay {
            cursor.advance();
        }

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            loop {
                if lose_after.is_some_and(|n| produced >= n) {
                    sink.mark_lost();
                    break;
                }
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = tokio::time::sleep(interval) => {
                        push_current(&frames, &cursor, &sink, &probe);
                        produced += 1;
                        if autoplay {
                            cursor.advance();
                        }
                    }
                }
            }
            debug!("[MemorySource] Producer exited after {} frame(s)", produced);
        });
        self.task = Some((stop_tx, handle));

        info!("[MemorySource] Replaying {} frame(s) every {:?}", self.frames.len(), interval);
        Ok(viewport)
    }

    async fn stop(&mut self) {
        self.probe.stops.fetch_add(1, Ordering::AcqRel);
        if let Some((stop_tx, handle)) = self.task.take() {
            let _ = stop_tx.send(());
            let _ = handle.await;
        }
        self.probe.running.store(false, Ordering::Release);
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::FrameQueue;

    fn shades(n: u8) -> Vec<Frame> {
        (0..n).map(|i| Frame::solid(2, 2, [i, i, i, 255])).collect()
    }

    #[test]
    fn cursor_stops_at_last_frame() {
        let cursor = SharedCursor::new(3);
        assert_eq!(cursor.advance(), 1);
        assert_eq!(cursor.advance(), 2);
        assert_eq!(cursor.advance(), 2);
        assert!(cursor.is_at_end());
        cursor.set(10);
        assert_eq!(cursor.get(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn autoplay_walks_frames() {
        let mut source = MemorySource::new(shades(3), Duration::from_millis(10)).autoplay(true);
        let probe = source.probe();
        let queue = FrameQueue::new(8);
        source.start(&SessionToken::default(), queue.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(35)).await;
        source.stop().await;

        assert_eq!(probe.images_pushed(), 4);
        assert!(!probe.is_running());
        // 0, 1, 2, 2 were pushed; the newest is the last frame
        assert_eq!(queue.take_latest().unwrap().data[0], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_source_cannot_start() {
        let mut source = MemorySource::new(Vec::new(), Duration::from_millis(10));
        let err = source.start(&SessionToken::default(), FrameQueue::new(3)).await.unwrap_err();
        assert!(matches!(err, CaptureError::Unavailable(_)));
        source.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn lose_after_marks_queue_lost() {
        let mut source = MemorySource::new(shades(1), Duration::from_millis(10)).lose_after(2);
        let queue = FrameQueue::new(3);
        source.start(&SessionToken::default(), queue.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(queue.is_lost());
        source.stop().await;
    }
}

//! Motion-triggered capture with on-demand "capture now".
//!
//! Pure state machine: the worker feeds it frames and the current time and
//! forwards the events it queues. Nothing here sleeps or spawns.

use std::time::{Duration, Instant};

use scrollcap_analysis::{has_meaningful_change, Sample};
use scrollcap_core::{CaptureSettings, Frame, OrchestratorState};
use tracing::debug;

use crate::events::SessionEvent;

/// On-demand requests closer together than this collapse into one.
pub const CAPTURE_NOW_DEBOUNCE: Duration = Duration::from_millis(120);

/// Result of one on-demand capture request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureNow {
    Saved(usize),
    /// Within the debounce window of the previous accepted request.
    Debounced(usize),
    /// No frame has been produced yet.
    NoFrame(usize),
}

impl CaptureNow {
    pub fn count(&self) -> usize {
        match *self {
            Self::Saved(n) | Self::Debounced(n) | Self::NoFrame(n) => n,
        }
    }
}

pub struct ManualCapture {
    interval:        Duration,
    pause_threshold: Duration,
    motion_trigger:  bool,
    active:          bool,
    previous_sample: Option<Sample>,
    last_saved:      Option<Instant>,
    still_since:     Option<Instant>,
    last_request:    Option<Instant>,
    latest:          Option<Frame>,
    frames:          Vec<Frame>,
    events:          Vec<SessionEvent>,
}

impl ManualCapture {
    pub fn new(settings: &CaptureSettings) -> Self {
        Self {
            interval: settings.capture_interval(),
            pause_threshold: settings.pause_threshold(),
            motion_trigger: settings.motion_trigger,
            active: false,
            previous_sample: None,
            last_saved: None,
            still_since: None,
            last_request: None,
            latest: None,
            frames: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> OrchestratorState {
        if self.active {
            OrchestratorState::Active
        } else {
            OrchestratorState::Idle
        }
    }

    pub fn captured_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn latest(&self) -> Option<&Frame> {
        self.latest.as_ref()
    }

    /// Events queued since the last call.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    /// End the session, handing over every captured frame.
    pub fn finish(&mut self) -> Vec<Frame> {
        self.active = false;
        std::mem::take(&mut self.frames)
    }

    fn save(&mut self, frame: Frame) {
        self.frames.push(frame);
        debug!("[Manual] Captured frames={}", self.frames.len());
        self.events.push(SessionEvent::FrameCount(self.frames.len()));
    }

    /// Process one frame observed at `now`.
    pub fn on_frame(&mut self, frame: Frame, now: Instant) {
        self.latest = Some(frame.clone());
        if !self.motion_trigger {
            return;
        }

        let sample = Sample::from_frame(&frame);
        let moved = has_meaningful_change(self.previous_sample.as_ref(), &sample);
        self.previous_sample = Some(sample);

        if !self.active {
            if !moved {
                return;
            }
            self.active = true;
            self.still_since = None;
            self.last_saved = None;
            self.events.push(SessionEvent::ScrollDetected);
            self.events.push(SessionEvent::StateChanged(OrchestratorState::Active));
        } else if !moved {
            let since = *self.still_since.get_or_insert(now);
            if now.saturating_duration_since(since) >= self.pause_threshold {
                debug!("[Manual] Still for {:?}, pausing", self.pause_threshold);
                self.active = false;
                self.still_since = None;
                self.events.push(SessionEvent::CapturePaused);
                self.events.push(SessionEvent::StateChanged(OrchestratorState::Idle));
            }
            return;
        } else {
            self.still_since = None;
        }

        let due = self
            .last_saved
            .map_or(true, |at| now.saturating_duration_since(at) >= self.interval);
        if due {
            self.save(frame);
            self.last_saved = Some(now);
        }
    }

    /// Append the most recent frame regardless of state.
    ///
    /// `fresh` is used when no frame has been buffered yet.
    pub fn capture_now(&mut self, requested_at: Instant, fresh: Option<Frame>) -> CaptureNow {
        if let Some(last) = self.last_request {
            if requested_at.saturating_duration_since(last) < CAPTURE_NOW_DEBOUNCE {
                debug!("[Manual] Capture request debounced");
                return CaptureNow::Debounced(self.frames.len());
            }
        }
        self.last_request = Some(requested_at);

        if let Some(frame) = fresh {
            self.latest = Some(frame);
        }
        let Some(frame) = self.latest.clone() else {
            return CaptureNow::NoFrame(self.frames.len());
        };
        self.save(frame);
        CaptureNow::Saved(self.frames.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_millis(67);

    fn settings() -> CaptureSettings {
        CaptureSettings { frame_interval: 60, ..Default::default() }
    }

    fn shade(v: u8) -> Frame {
        Frame::solid(64, 64, [v, v, v, 255])
    }

    /// Baseline plus one moving frame at `t0`.
    fn activated(t0: Instant) -> ManualCapture {
        let mut m = ManualCapture::new(&settings());
        m.on_frame(shade(0), t0);
        m.on_frame(shade(100), t0);
        m
    }

    #[test]
    fn baseline_frame_saves_nothing() {
        let mut m = ManualCapture::new(&settings());
        m.on_frame(shade(0), Instant::now());
        assert_eq!(m.state(), OrchestratorState::Idle);
        assert_eq!(m.captured_count(), 0);
        assert!(m.take_events().is_empty());
    }

    #[test]
    fn motion_activates_and_saves_immediately() {
        let t0 = Instant::now();
        let mut m = activated(t0);
        assert_eq!(m.state(), OrchestratorState::Active);
        assert_eq!(m.captured_count(), 1);
        assert_eq!(
            m.take_events(),
            vec![
                SessionEvent::ScrollDetected,
                SessionEvent::StateChanged(OrchestratorState::Active),
                SessionEvent::FrameCount(1),
            ]
        );
    }

    #[test]
    fn saves_at_most_once_per_interval() {
        let t0 = Instant::now();
        let mut m = activated(t0);
        m.on_frame(shade(200), t0 + Duration::from_millis(30));
        assert_eq!(m.captured_count(), 1);
        m.on_frame(shade(0), t0 + INTERVAL);
        assert_eq!(m.captured_count(), 2);
    }

    #[test]
    fn stillness_pauses_at_exactly_twice_interval() {
        let t0 = Instant::now();
        let mut m = activated(t0);
        m.take_events();

        let t1 = t0 + Duration::from_millis(10);
        m.on_frame(shade(100), t1);
        m.on_frame(shade(100), t1 + 2 * INTERVAL - Duration::from_millis(1));
        assert_eq!(m.state(), OrchestratorState::Active);

        m.on_frame(shade(100), t1 + 2 * INTERVAL);
        assert_eq!(m.state(), OrchestratorState::Idle);
        assert_eq!(m.captured_count(), 1, "still frames are never saved");
        assert_eq!(
            m.take_events(),
            vec![SessionEvent::CapturePaused, SessionEvent::StateChanged(OrchestratorState::Idle)]
        );
    }

    #[test]
    fn motion_resets_stillness_timer() {
        let t0 = Instant::now();
        let mut m = activated(t0);
        m.on_frame(shade(100), t0 + Duration::from_millis(100));
        m.on_frame(shade(0), t0 + Duration::from_millis(200));
        m.on_frame(shade(0), t0 + Duration::from_millis(300));
        assert_eq!(m.state(), OrchestratorState::Active);
    }

    #[test]
    fn scroll_detected_once_per_active_period() {
        let t0 = Instant::now();
        let mut m = activated(t0);
        m.on_frame(shade(0), t0 + Duration::from_millis(5));
        let detected = m.take_events().iter().filter(|e| **e == SessionEvent::ScrollDetected).count();
        assert_eq!(detected, 1);

        m.on_frame(shade(0), t0 + Duration::from_millis(10));
        m.on_frame(shade(0), t0 + Duration::from_millis(500));
        assert_eq!(m.state(), OrchestratorState::Idle);
        m.take_events();

        m.on_frame(shade(100), t0 + Duration::from_millis(600));
        assert!(m.take_events().contains(&SessionEvent::ScrollDetected));
    }

    #[test]
    fn capture_now_debounces_within_window() {
        let t0 = Instant::now();
        let mut m = ManualCapture::new(&settings());
        m.on_frame(shade(0), t0);

        assert_eq!(m.capture_now(t0, None), CaptureNow::Saved(1));
        assert_eq!(m.capture_now(t0 + Duration::from_millis(119), None), CaptureNow::Debounced(1));
        assert_eq!(m.capture_now(t0 + CAPTURE_NOW_DEBOUNCE, None), CaptureNow::Saved(2));
    }

    #[test]
    fn capture_now_uses_fresh_frame_when_nothing_buffered() {
        let mut m = ManualCapture::new(&settings());
        let t0 = Instant::now();
        assert_eq!(m.capture_now(t0, None), CaptureNow::NoFrame(0));
        let later = t0 + Duration::from_millis(200);
        assert_eq!(m.capture_now(later, Some(shade(9))), CaptureNow::Saved(1));
        assert_eq!(m.frames()[0].pixel(0, 0), [9, 9, 9, 255]);
    }

    #[test]
    fn on_demand_only_without_motion_trigger() {
        let mut m = ManualCapture::new(&CaptureSettings { motion_trigger: false, ..settings() });
        let t0 = Instant::now();
        m.on_frame(shade(0), t0);
        m.on_frame(shade(200), t0 + Duration::from_millis(100));
        assert_eq!(m.captured_count(), 0);
        assert_eq!(m.state(), OrchestratorState::Idle);
        assert_eq!(m.capture_now(t0, None), CaptureNow::Saved(1));
        assert_eq!(m.frames()[0].pixel(0, 0), [200, 200, 200, 255]);
    }

    #[test]
    fn finish_hands_over_frames() {
        let mut m = activated(Instant::now());
        let frames = m.finish();
        assert_eq!(frames.len(), 1);
        assert_eq!(m.captured_count(), 0);
    }
}

//! Actuator-driven scrolling capture.
//!
//! Modelled as an explicit state machine: every entry point returns the
//! [`Step`] the worker must take next (sleep then resume, scroll, or end).
//! Timers live in the worker, so a `stop` simply never resumes the machine.
//!
//! ```text
//! begin ─initial delay─► DETECTING ─500ms─► detect ──(no frame: 100ms, no thumb: 200ms)─┐
//!                                             │ ◄───────────────────────────────────────┘
//!                                             ▼ thumb found / detect timeout
//!                                          ACTIVE: capture first frame
//!                                             │ at bottom ─────────────────► COMPLETED
//!                                             ▼
//!                         scroll ─800ms─► capture ─300ms─► check ─► scroll …
//! ```

use std::time::{Duration, Instant};

use scrollcap_analysis::{detect_scrollbar, frames_similar, scroll_progress};
use scrollcap_core::{CaptureSettings, Frame, OrchestratorState, ScrollbarInfo};
use tracing::{debug, info, warn};

use crate::events::SessionEvent;

pub const BASELINE_DELAY: Duration = Duration::from_millis(500);
pub const NO_FRAME_RETRY: Duration = Duration::from_millis(100);
pub const NO_SCROLLBAR_RETRY: Duration = Duration::from_millis(200);
pub const SETTLE_DELAY: Duration = Duration::from_millis(800);
pub const CHECK_DELAY: Duration = Duration::from_millis(300);
/// Upper bound on one actuator call.
pub const SCROLL_TIMEOUT: Duration = Duration::from_secs(2);

/// Where to pick up after a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuation {
    EnterDetecting,
    Detect,
    CaptureAfterScroll,
    Check,
}

/// What the worker must do next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Wait(Duration, Continuation),
    Scroll,
    Complete,
    Fail(String),
}

pub struct AutoScroll {
    initial_delay:       Duration,
    detect_timeout:      Option<Duration>,
    top_margin:          u32,
    bottom_margin:       u32,
    max_scrolls:         u32,
    no_change_threshold: u32,

    state:          OrchestratorState,
    detect_started: Option<Instant>,
    reference:      Option<Frame>,
    frames:         Vec<Frame>,
    scrolls:        u32,
    no_change:      u32,
    events:         Vec<SessionEvent>,
}

impl AutoScroll {
    pub fn new(settings: &CaptureSettings) -> Self {
        debug!(
            "[AutoScroll] scrolls_per_capture hint={} (content-driven loop ignores it)",
            settings.scrolls_per_capture
        );
        Self {
            initial_delay: settings.initial_delay(),
            detect_timeout: settings.detect_timeout(),
            top_margin: settings.top_margin,
            bottom_margin: settings.bottom_margin,
            max_scrolls: settings.max_scrolls.max(1),
            no_change_threshold: settings.no_change_threshold.max(1),
            state: OrchestratorState::Starting,
            detect_started: None,
            reference: None,
            frames: Vec::new(),
            scrolls: 0,
            no_change: 0,
            events: Vec::new(),
        }
    }

    pub fn state(&self) -> OrchestratorState {
        self.state
    }

    pub fn captured_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn scrolls(&self) -> u32 {
        self.scrolls
    }

    pub fn take_frames(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.frames)
    }

    /// Events queued since the last call.
    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.events)
    }

    fn set_state(&mut self, state: OrchestratorState) {
        if self.state != state {
            info!("[AutoScroll] {} → {}", self.state.label(), state.label());
            self.state = state;
            self.events.push(SessionEvent::StateChanged(state));
        }
    }

    fn capture(&mut self, frame: &Frame) {
        self.frames.push(frame.clone());
        debug!("[AutoScroll] Captured frames={}", self.frames.len());
        self.events.push(SessionEvent::FrameCount(self.frames.len()));
    }

    fn scrollbar(&mut self, frame: &Frame) -> Option<ScrollbarInfo> {
        let info = detect_scrollbar(frame, self.top_margin, self.bottom_margin);
        if info.is_some() {
            self.events.push(SessionEvent::Progress(scroll_progress(info.as_ref())));
        }
        info
    }

    fn complete(&mut self) -> Step {
        self.set_state(OrchestratorState::Completed);
        info!("[AutoScroll] Completed: {} frame(s) after {} scroll(s)", self.frames.len(), self.scrolls);
        Step::Complete
    }

    /// First step after the frame source started.
    pub fn begin(&mut self) -> Step {
        Step::Wait(self.initial_delay, Continuation::EnterDetecting)
    }

    /// Continue after a wait. `frame` is the newest frame seen so far.
    pub fn resume(&mut self, continuation: Continuation, frame: Option<&Frame>, now: Instant) -> Step {
        match continuation {
            Continuation::EnterDetecting => {
                self.set_state(OrchestratorState::Detecting);
                self.detect_started = Some(now);
                Step::Wait(BASELINE_DELAY, Continuation::Detect)
            }
            Continuation::Detect => self.detect(frame, now),
            Continuation::CaptureAfterScroll => {
                match frame {
                    Some(frame) => self.capture(frame),
                    None => warn!("[AutoScroll] No frame to capture after scroll"),
                }
                Step::Wait(CHECK_DELAY, Continuation::Check)
            }
            Continuation::Check => match frame {
                Some(frame) => self.check(frame),
                None => Step::Wait(NO_FRAME_RETRY, Continuation::Check),
            },
        }
    }

    fn detect_timed_out(&self, now: Instant) -> bool {
        match (self.detect_timeout, self.detect_started) {
            (Some(timeout), Some(started)) => now.saturating_duration_since(started) >= timeout,
            _ => false,
        }
    }

    fn detect(&mut self, frame: Option<&Frame>, now: Instant) -> Step {
        let Some(frame) = frame else {
            debug!("[AutoScroll] No frame yet, retrying");
            return Step::Wait(NO_FRAME_RETRY, Continuation::Detect);
        };
        let info = self.scrollbar(frame);
        if info.is_none() {
            if !self.detect_timed_out(now) {
                return Step::Wait(NO_SCROLLBAR_RETRY, Continuation::Detect);
            }
            warn!("[AutoScroll] No scrollbar found, relying on content comparison");
        }

        self.set_state(OrchestratorState::Active);
        self.capture(frame);
        self.reference = Some(frame.clone());
        if info.is_some_and(|i| i.at_bottom) {
            info!("[AutoScroll] Already at bottom");
            return self.complete();
        }
        Step::Scroll
    }

    /// Report the outcome of the actuator call requested by [`Step::Scroll`].
    pub fn scroll_finished(&mut self, result: Result<(), String>) -> Step {
        match result {
            Ok(()) => {
                self.scrolls += 1;
                Step::Wait(SETTLE_DELAY, Continuation::CaptureAfterScroll)
            }
            Err(message) => {
                warn!("[AutoScroll] Scroll failed after {} scroll(s): {}", self.scrolls, message);
                self.set_state(OrchestratorState::Error);
                self.events.push(SessionEvent::Error(message.clone()));
                Step::Fail(message)
            }
        }
    }

    fn check(&mut self, frame: &Frame) -> Step {
        let info = self.scrollbar(frame);
        let unchanged = self.reference.as_ref().is_some_and(|r| frames_similar(r, frame));
        self.reference = Some(frame.clone());

        if unchanged {
            self.no_change += 1;
            debug!("[AutoScroll] Content unchanged ({}/{})", self.no_change, self.no_change_threshold);
            if self.no_change >= self.no_change_threshold {
                let keep = self.frames.len().saturating_sub(self.no_change as usize);
                self.frames.truncate(keep);
                self.events.push(SessionEvent::FrameCount(self.frames.len()));
                return self.complete();
            }
        } else {
            self.no_change = 0;
        }

        if info.is_some_and(|i| i.at_bottom) {
            return self.complete();
        }
        if self.scrolls >= self.max_scrolls {
            warn!("[AutoScroll] Reached max_scrolls={}", self.max_scrolls);
            return self.complete();
        }
        Step::Scroll
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const W: u32 = 100;
    const H: u32 = 1000;

    /// Page whose content colour is `shade` with a thumb of `len` rows at
    /// `top` (or no thumb).
    fn page(shade: u8, thumb: Option<(u32, u32)>) -> Frame {
        let mut data = Vec::with_capacity((W * H * 4) as usize);
        for y in 0..H {
            for x in 0..W {
                let in_thumb = thumb.is_some_and(|(top, len)| x == 96 && y >= top && y < top + len);
                let px = if in_thumb { [128, 128, 128, 255] } else { [shade, 255 - shade, 40, 255] };
                data.extend_from_slice(&px);
            }
        }
        Frame::from_rgba(W, H, data).unwrap()
    }

    fn settings() -> CaptureSettings {
        CaptureSettings { initial_delay_ms: 1_000, ..Default::default() }
    }

    /// Drive the machine up to the first detect with `frame`.
    fn detect_with(machine: &mut AutoScroll, frame: Option<&Frame>, t0: Instant) -> Step {
        assert_eq!(machine.begin(), Step::Wait(Duration::from_secs(1), Continuation::EnterDetecting));
        assert_eq!(
            machine.resume(Continuation::EnterDetecting, None, t0),
            Step::Wait(BASELINE_DELAY, Continuation::Detect)
        );
        machine.resume(Continuation::Detect, frame, t0 + BASELINE_DELAY)
    }

    /// One scroll → settle capture → check on `frame`.
    fn scroll_step(machine: &mut AutoScroll, frame: &Frame, now: Instant) -> Step {
        assert_eq!(
            machine.scroll_finished(Ok(())),
            Step::Wait(SETTLE_DELAY, Continuation::CaptureAfterScroll)
        );
        assert_eq!(
            machine.resume(Continuation::CaptureAfterScroll, Some(frame), now),
            Step::Wait(CHECK_DELAY, Continuation::Check)
        );
        machine.resume(Continuation::Check, Some(frame), now + CHECK_DELAY)
    }

    #[test]
    fn retries_until_frame_and_scrollbar() {
        let t0 = Instant::now();
        let mut m = AutoScroll::new(&settings());
        assert_eq!(detect_with(&mut m, None, t0), Step::Wait(NO_FRAME_RETRY, Continuation::Detect));
        assert_eq!(m.state(), OrchestratorState::Detecting);

        let blank = page(10, None);
        assert_eq!(
            m.resume(Continuation::Detect, Some(&blank), t0 + Duration::from_secs(1)),
            Step::Wait(NO_SCROLLBAR_RETRY, Continuation::Detect)
        );
        assert_eq!(m.captured_count(), 0);

        let top = page(10, Some((0, 200)));
        assert_eq!(m.resume(Continuation::Detect, Some(&top), t0 + Duration::from_secs(2)), Step::Scroll);
        assert_eq!(m.state(), OrchestratorState::Active);
        assert_eq!(m.captured_count(), 1);
    }

    #[test]
    fn scrollbar_walk_captures_steps_plus_one() {
        let t0 = Instant::now();
        let mut m = AutoScroll::new(&settings());
        let pages = [
            page(0, Some((0, 200))),
            page(30, Some((300, 200))),
            page(60, Some((600, 200))),
            page(90, Some((800, 200))),
        ];
        assert_eq!(detect_with(&mut m, Some(&pages[0]), t0), Step::Scroll);
        assert_eq!(scroll_step(&mut m, &pages[1], t0), Step::Scroll);
        assert_eq!(scroll_step(&mut m, &pages[2], t0), Step::Scroll);
        assert_eq!(scroll_step(&mut m, &pages[3], t0), Step::Complete);

        assert_eq!(m.scrolls(), 3);
        assert_eq!(m.captured_count(), 4);
        assert_eq!(m.state(), OrchestratorState::Completed);
        let events = m.take_events();
        assert!(events.contains(&SessionEvent::Progress(1.0)));
    }

    #[test]
    fn identical_frames_trim_threshold_count() {
        let t0 = Instant::now();
        let mut m = AutoScroll::new(&CaptureSettings { detect_timeout_ms: Some(0), ..settings() });
        let a = page(0, None);
        let b = page(50, None);
        assert_eq!(detect_with(&mut m, Some(&a), t0), Step::Scroll);
        assert_eq!(scroll_step(&mut m, &b, t0), Step::Scroll);
        assert_eq!(scroll_step(&mut m, &b, t0), Step::Complete);

        let frames = m.take_frames();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].pixel(10, 500), b.pixel(10, 500));
    }

    #[test]
    fn higher_threshold_trims_more() {
        let t0 = Instant::now();
        let mut m = AutoScroll::new(&CaptureSettings {
            detect_timeout_ms: Some(0),
            no_change_threshold: 2,
            ..settings()
        });
        let a = page(0, None);
        let b = page(50, None);
        detect_with(&mut m, Some(&a), t0);
        assert_eq!(scroll_step(&mut m, &b, t0), Step::Scroll);
        assert_eq!(scroll_step(&mut m, &b, t0), Step::Scroll);
        assert_eq!(scroll_step(&mut m, &b, t0), Step::Complete);
        assert_eq!(m.captured_count(), 2);
    }

    #[test]
    fn first_frame_at_bottom_is_captured_once() {
        let mut m = AutoScroll::new(&settings());
        let bottom = page(0, Some((800, 200)));
        assert_eq!(detect_with(&mut m, Some(&bottom), Instant::now()), Step::Complete);
        assert_eq!(m.captured_count(), 1);
    }

    #[test]
    fn detect_timeout_falls_back_to_similarity() {
        let t0 = Instant::now();
        let mut m = AutoScroll::new(&settings());
        let blank = page(10, None);
        assert_eq!(
            detect_with(&mut m, Some(&blank), t0),
            Step::Wait(NO_SCROLLBAR_RETRY, Continuation::Detect)
        );
        assert_eq!(
            m.resume(Continuation::Detect, Some(&blank), t0 + Duration::from_secs(10)),
            Step::Scroll
        );
        assert_eq!(m.state(), OrchestratorState::Active);
    }

    #[test]
    fn unbounded_detect_never_gives_up() {
        let t0 = Instant::now();
        let mut m = AutoScroll::new(&CaptureSettings { detect_timeout_ms: None, ..settings() });
        let blank = page(10, None);
        detect_with(&mut m, Some(&blank), t0);
        assert_eq!(
            m.resume(Continuation::Detect, Some(&blank), t0 + Duration::from_secs(3600)),
            Step::Wait(NO_SCROLLBAR_RETRY, Continuation::Detect)
        );
    }

    #[test]
    fn actuator_failure_keeps_frames() {
        let mut m = AutoScroll::new(&settings());
        detect_with(&mut m, Some(&page(0, Some((0, 200)))), Instant::now());
        assert_eq!(m.scroll_finished(Err("boom".into())), Step::Fail("boom".into()));
        assert_eq!(m.state(), OrchestratorState::Error);
        assert_eq!(m.captured_count(), 1);
        assert!(m.take_events().contains(&SessionEvent::Error("boom".into())));
    }

    #[test]
    fn max_scrolls_caps_the_loop() {
        let t0 = Instant::now();
        let mut m = AutoScroll::new(&CaptureSettings { max_scrolls: 2, ..settings() });
        detect_with(&mut m, Some(&page(0, Some((0, 200)))), t0);
        assert_eq!(scroll_step(&mut m, &page(20, Some((100, 200))), t0), Step::Scroll);
        assert_eq!(scroll_step(&mut m, &page(40, Some((200, 200))), t0), Step::Complete);
        assert_eq!(m.captured_count(), 3);
    }
}

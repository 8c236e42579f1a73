//! One capture run: owns the frame feed and drives a state machine.
//!
//! [`Session::run`] is the body of the worker thread. All frame
//! consumption, timers and actuation happen inside it; other threads only
//! talk to it through [`SessionHandle`](crate::SessionHandle).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use scrollcap_actuator::ScrollActuator;
use scrollcap_capture::{FrameFeed, FrameSource, AUTO_QUEUE_DEPTH, MANUAL_QUEUE_DEPTH};
use scrollcap_core::{CaptureMode, CaptureSettings, Frame, OrchestratorState, SessionToken, Viewport};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::auto_scroll::{AutoScroll, Continuation, Step, SCROLL_TIMEOUT};
use crate::events::{EventSink, SessionEvent};
use crate::handle::SessionHandle;
use crate::manual::ManualCapture;

/// Time as seen by the session. Follows tokio's clock so paused-time tests
/// drive timers and decisions consistently.
pub(crate) fn clock_now() -> Instant {
    tokio::time::Instant::now().into_std()
}

pub(crate) enum Command {
    CaptureNow { requested_at: Instant, reply: oneshot::Sender<usize> },
    Finish,
    Stop,
}

/// State readable from any thread while the worker runs.
pub(crate) struct Shared {
    stopping:            AtomicBool,
    pub(crate) count:    AtomicUsize,
    pub(crate) state:    Mutex<OrchestratorState>,
    pub(crate) partial:  Mutex<Option<Vec<Frame>>>,
    /// Held while raising `stopping` and while handing frames to the
    /// completion sink, so a returned `stop()` never races a delivery.
    delivery:            Mutex<()>,
}

impl Shared {
    fn new() -> Self {
        Self {
            stopping: AtomicBool::new(false),
            count: AtomicUsize::new(0),
            state: Mutex::new(OrchestratorState::Idle),
            partial: Mutex::new(None),
            delivery: Mutex::new(()),
        }
    }

    pub(crate) fn state(&self) -> OrchestratorState {
        *self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn set_state(&self, state: OrchestratorState) {
        *self.state.lock().unwrap_or_else(|p| p.into_inner()) = state;
    }

    pub(crate) fn take_partial(&self) -> Option<Vec<Frame>> {
        self.partial.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    fn set_partial(&self, frames: Vec<Frame>) {
        *self.partial.lock().unwrap_or_else(|p| p.into_inner()) = Some(frames);
    }

    pub(crate) fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    /// Raise the stopping flag. True only for the first caller.
    pub(crate) fn begin_stop(&self) -> bool {
        let _gate = self.delivery.lock().unwrap_or_else(|p| p.into_inner());
        !self.stopping.swap(true, Ordering::AcqRel)
    }
}

/// Backends handed back when a session ends.
pub struct SessionParts {
    pub source:   Box<dyn FrameSource>,
    pub actuator: Option<Box<dyn ScrollActuator>>,
}

/// How a run ended.
enum Outcome {
    /// Deliver these frames to the completion sink.
    Deliver(Vec<Frame>),
    /// Source lost: deliver what was captured so far.
    Lost(Vec<Frame>),
    /// Actuation failed: keep frames for the caller, deliver nothing.
    Failed(String, Vec<Frame>),
    Cancelled,
}

enum ScrollEnd {
    Done(Result<(), String>),
    Interrupted(Outcome),
}

enum Wake {
    Command(Option<Command>),
    Frame,
    Timer,
}

pub struct Session {
    mode:     CaptureMode,
    settings: CaptureSettings,
    token:    SessionToken,
    feed:     FrameFeed,
    actuator: Option<Box<dyn ScrollActuator>>,
    viewport: Option<Viewport>,
    commands: mpsc::UnboundedReceiver<Command>,
    shared:   Arc<Shared>,
    events:   EventSink,
    done:     Option<oneshot::Sender<Vec<Frame>>>,
}

impl Session {
    /// Prepare a session and the handle that controls it. Nothing runs until
    /// [`run`](Self::run) is polled.
    pub fn new(
        parts: SessionParts,
        settings: CaptureSettings,
        token: SessionToken,
        events: Option<mpsc::Sender<SessionEvent>>,
    ) -> (Self, SessionHandle) {
        let mode = settings.mode;
        let depth = match mode {
            CaptureMode::Manual => MANUAL_QUEUE_DEPTH,
            CaptureMode::Auto => AUTO_QUEUE_DEPTH,
        };
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();
        let shared = Arc::new(Shared::new());

        let session = Self {
            mode,
            settings,
            token,
            feed: FrameFeed::new(parts.source, depth),
            actuator: parts.actuator,
            viewport: None,
            commands: cmd_rx,
            shared: shared.clone(),
            events: EventSink::new(events),
            done: Some(done_tx),
        };
        (session, SessionHandle::new(cmd_tx, shared, done_rx))
    }

    fn emit(&self, event: SessionEvent) {
        match &event {
            SessionEvent::StateChanged(state) => self.shared.set_state(*state),
            SessionEvent::FrameCount(n) => self.shared.count.store(*n, Ordering::Release),
            _ => {}
        }
        self.events.emit(event);
    }

    fn set_state(&self, state: OrchestratorState) {
        self.emit(SessionEvent::StateChanged(state));
    }

    /// Publish state-machine events. Dropped once the session is stopping.
    fn forward(&self, events: Vec<SessionEvent>) {
        if self.shared.is_stopping() {
            return;
        }
        for event in events {
            self.emit(event);
        }
    }

    /// Drive the session to its end and hand the backends back.
    pub async fn run(mut self) -> SessionParts {
        info!("[Session] Starting {} session with {} source", self.mode, self.feed.source_name());
        self.set_state(OrchestratorState::Starting);

        let outcome = match self.acquire().await {
            Ok(()) => match self.mode {
                CaptureMode::Manual => self.run_manual().await,
                CaptureMode::Auto => self.run_auto().await,
            },
            Err(message) => {
                error!("[Session] Start failed: {}", message);
                self.feed.release().await;
                if !self.shared.is_stopping() {
                    self.set_state(OrchestratorState::Error);
                    self.emit(SessionEvent::Error(message));
                }
                self.set_state(OrchestratorState::Idle);
                return self.into_parts();
            }
        };

        self.feed.release().await;
        self.finish(outcome);
        self.into_parts()
    }

    async fn acquire(&mut self) -> Result<(), String> {
        if self.mode == CaptureMode::Auto {
            match &self.actuator {
                Some(actuator) if actuator.is_available() => {}
                Some(actuator) => return Err(format!("scroll actuator '{}' is not available", actuator.name())),
                None => return Err("no scroll actuator configured".into()),
            }
        }
        let viewport = self.feed.start(&self.token).await.map_err(|e| e.to_string())?;
        self.viewport = Some(viewport);
        Ok(())
    }

    fn finish(&mut self, outcome: Outcome) {
        let outcome = match outcome {
            Outcome::Cancelled => Outcome::Cancelled,
            _ if self.shared.is_stopping() => {
                debug!("[Session] Stopped during teardown, discarding result");
                Outcome::Cancelled
            }
            other => other,
        };
        match outcome {
            Outcome::Deliver(frames) => self.deliver(frames),
            Outcome::Lost(frames) => {
                self.emit(SessionEvent::SourceLost);
                self.deliver(frames);
            }
            Outcome::Failed(message, frames) => {
                warn!("[Session] Failed with {} frame(s) retained: {}", frames.len(), message);
                self.shared.set_partial(frames);
            }
            Outcome::Cancelled => {
                info!("[Session] Cancelled");
                self.set_state(OrchestratorState::Idle);
            }
        }
    }

    fn deliver(&mut self, frames: Vec<Frame>) {
        let count = frames.len();
        let delivered = {
            let shared = self.shared.clone();
            let _gate = shared.delivery.lock().unwrap_or_else(|p| p.into_inner());
            if shared.is_stopping() {
                false
            } else {
                if shared.state() != OrchestratorState::Completed {
                    self.set_state(OrchestratorState::Completed);
                }
                if let Some(done) = self.done.take() {
                    if done.send(frames).is_err() {
                        debug!("[Session] Completion receiver dropped");
                    }
                }
                true
            }
        };
        if delivered {
            info!("[Session] Delivered {} frame(s)", count);
        } else {
            info!("[Session] Cancelled");
        }
        self.set_state(OrchestratorState::Idle);
    }

    pub(crate) fn into_parts(self) -> SessionParts {
        SessionParts { source: self.feed.into_source(), actuator: self.actuator }
    }

    /// Wait for the next command, frame signal, or `deadline`.
    async fn wake(&mut self, deadline: Option<tokio::time::Instant>) -> Wake {
        let timer = async move {
            match deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            biased;
            cmd = self.commands.recv() => Wake::Command(cmd),
            _ = timer => Wake::Timer,
            _ = self.feed.changed() => Wake::Frame,
        }
    }

    // MARK: - Manual

    async fn run_manual(&mut self) -> Outcome {
        let mut machine = ManualCapture::new(&self.settings);
        self.set_state(machine.state());

        loop {
            if self.shared.is_stopping() {
                return Outcome::Cancelled;
            }
            match self.wake(None).await {
                Wake::Command(None) | Wake::Command(Some(Command::Stop)) => return Outcome::Cancelled,
                Wake::Command(Some(Command::Finish)) => {
                    self.forward(machine.take_events());
                    return Outcome::Deliver(machine.finish());
                }
                Wake::Command(Some(Command::CaptureNow { requested_at, reply })) => {
                    let fresh = if machine.latest().is_none() { self.feed.next_frame() } else { None };
                    let result = machine.capture_now(requested_at, fresh);
                    self.forward(machine.take_events());
                    let _ = reply.send(result.count());
                }
                Wake::Frame => {
                    if self.feed.take_lost() {
                        self.forward(machine.take_events());
                        return Outcome::Lost(machine.finish());
                    }
                    if let Some(frame) = self.feed.next_frame() {
                        machine.on_frame(frame, clock_now());
                        self.forward(machine.take_events());
                    }
                }
                Wake::Timer => {}
            }
        }
    }

    // MARK: - Auto-scroll

    async fn run_auto(&mut self) -> Outcome {
        let mut machine = AutoScroll::new(&self.settings);
        let mut latest: Option<Frame> = None;
        let mut step = machine.begin();

        loop {
            if self.shared.is_stopping() {
                return Outcome::Cancelled;
            }
            self.forward(machine.take_events());
            step = match step {
                Step::Wait(delay, continuation) => {
                    let deadline = tokio::time::Instant::now() + delay;
                    if let Some(outcome) = self.sleep_serving(deadline, &mut machine).await {
                        return outcome;
                    }
                    if let Some(frame) = self.feed.next_frame() {
                        latest = Some(frame);
                    }
                    machine.resume(continuation, latest.as_ref(), clock_now())
                }
                Step::Scroll => match self.scroll_serving(&mut machine).await {
                    ScrollEnd::Done(result) => machine.scroll_finished(result),
                    ScrollEnd::Interrupted(outcome) => return outcome,
                },
                Step::Complete => return Outcome::Deliver(machine.take_frames()),
                Step::Fail(message) => return Outcome::Failed(message, machine.take_frames()),
            };
            if let Step::Wait(_, Continuation::CaptureAfterScroll) = step {
                debug!("[Session] Scroll {} dispatched, settling", machine.scrolls());
            }
        }
    }

    /// Sleep until `deadline` while answering commands and watching for a
    /// lost source. Returns early with an outcome when the run must end.
    async fn sleep_serving(&mut self, deadline: tokio::time::Instant, machine: &mut AutoScroll) -> Option<Outcome> {
        loop {
            match self.wake(Some(deadline)).await {
                Wake::Timer => return None,
                Wake::Command(None) | Wake::Command(Some(Command::Stop)) => return Some(Outcome::Cancelled),
                Wake::Command(Some(Command::Finish)) => {
                    info!("[Session] Finished early by request");
                    return Some(Outcome::Deliver(machine.take_frames()));
                }
                Wake::Command(Some(Command::CaptureNow { reply, .. })) => {
                    let _ = reply.send(machine.captured_count());
                }
                Wake::Frame => {
                    if self.feed.take_lost() {
                        return Some(Outcome::Lost(machine.take_frames()));
                    }
                }
            }
            if self.shared.is_stopping() {
                return Some(Outcome::Cancelled);
            }
        }
    }

    /// Run one scroll gesture, bounded by [`SCROLL_TIMEOUT`], while
    /// answering commands. A stop drops the in-flight gesture.
    async fn scroll_serving(&mut self, machine: &mut AutoScroll) -> ScrollEnd {
        let viewport = self.viewport.unwrap_or_else(|| Viewport::new(0, 0, 0));
        let Some(actuator) = self.actuator.as_mut() else {
            return ScrollEnd::Done(Err("no scroll actuator configured".into()));
        };
        let name = actuator.name();
        let scroll = tokio::time::timeout(SCROLL_TIMEOUT, actuator.scroll_down(viewport.width, viewport.height));
        tokio::pin!(scroll);

        loop {
            tokio::select! {
                biased;
                cmd = self.commands.recv() => match cmd {
                    None | Some(Command::Stop) => {
                        debug!("[Session] Stop during {} scroll, dropping it", name);
                        return ScrollEnd::Interrupted(Outcome::Cancelled);
                    }
                    Some(Command::Finish) => {
                        info!("[Session] Finished early by request");
                        return ScrollEnd::Interrupted(Outcome::Deliver(machine.take_frames()));
                    }
                    Some(Command::CaptureNow { reply, .. }) => {
                        let _ = reply.send(machine.captured_count());
                    }
                },
                result = &mut scroll => {
                    return ScrollEnd::Done(match result {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(e)) => Err(e.to_string()),
                        Err(_) => Err(format!("{} scroll timed out after {:?}", name, SCROLL_TIMEOUT)),
                    });
                }
            }
        }
    }
}

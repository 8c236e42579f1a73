use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use scrollcap_core::{Frame, OrchestratorState};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::session::{clock_now, Command, Shared};

/// Bound on waiting for the worker to answer an on-demand capture.
pub const CAPTURE_NOW_TIMEOUT: Duration = Duration::from_millis(500);

/// Cloneable control surface of a running session, usable from any thread.
#[derive(Clone)]
pub struct SessionControl {
    commands: mpsc::UnboundedSender<Command>,
    shared:   Arc<Shared>,
}

impl SessionControl {
    /// Append the newest frame now. Returns the captured count, or the last
    /// known count when the worker does not answer within 500 ms.
    pub async fn capture_now(&self) -> usize {
        let (reply, answer) = oneshot::channel();
        let command = Command::CaptureNow { requested_at: clock_now(), reply };
        if self.commands.send(command).is_err() {
            return self.captured_count();
        }
        match tokio::time::timeout(CAPTURE_NOW_TIMEOUT, answer).await {
            Ok(Ok(count)) => count,
            _ => {
                debug!("[Session] capture_now unanswered, using snapshot");
                self.captured_count()
            }
        }
    }

    /// Cancel the session. Idempotent. Once this returns, the completion
    /// sink has either already fired or never will.
    pub fn stop(&self) {
        if !self.shared.begin_stop() {
            return;
        }
        let _ = self.commands.send(Command::Stop);
    }

    /// End the session and deliver the frames captured so far.
    pub fn finish(&self) {
        let _ = self.commands.send(Command::Finish);
    }

    /// Snapshot of the number of captured frames.
    pub fn captured_count(&self) -> usize {
        self.shared.count.load(Ordering::Acquire)
    }

    /// Last state published by the worker.
    pub fn state(&self) -> OrchestratorState {
        self.shared.state()
    }

    /// Frames kept after an actuation failure. Returns them once.
    pub fn take_partial_frames(&self) -> Option<Vec<Frame>> {
        self.shared.take_partial()
    }
}

/// Owner-side handle: control plus the completion sink.
pub struct SessionHandle {
    control: SessionControl,
    done:    Option<oneshot::Receiver<Vec<Frame>>>,
}

impl SessionHandle {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<Command>,
        shared: Arc<Shared>,
        done: oneshot::Receiver<Vec<Frame>>,
    ) -> Self {
        Self { control: SessionControl { commands, shared }, done: Some(done) }
    }

    /// A cloneable control for other tasks (stdin reader, signal handler).
    pub fn control(&self) -> SessionControl {
        self.control.clone()
    }

    /// See [`SessionControl::capture_now`].
    pub async fn capture_now(&self) -> usize {
        self.control.capture_now().await
    }

    /// See [`SessionControl::stop`].
    pub fn stop(&self) {
        self.control.stop();
    }

    /// Deliver what has been captured so far.
    pub fn finish(&self) {
        self.control.finish();
    }

    /// Snapshot of the number of captured frames.
    pub fn captured_count(&self) -> usize {
        self.control.captured_count()
    }

    /// Last state published by the worker.
    pub fn state(&self) -> OrchestratorState {
        self.control.state()
    }

    /// Frames kept after an actuation failure, at most once.
    pub fn take_partial_frames(&self) -> Option<Vec<Frame>> {
        self.control.take_partial_frames()
    }

    /// Wait for the completion sink. `None` when the session ended without
    /// delivering (cancelled, failed, or never started). Only the first call
    /// can return frames.
    pub async fn wait(&mut self) -> Option<Vec<Frame>> {
        let done = self.done.take()?;
        done.await.ok()
    }
}

//! `Capturer`: owns the capture backends and runs one session at a time.
//!
//! ```text
//! Capturer::start ──► std::thread "scrollcap-worker"
//!                        └─ tokio current-thread runtime
//!                              └─ Session::run ──► SessionParts (source + actuator back)
//! ```
//!
//! The backends move into the worker for the lifetime of a session and come
//! back through the thread's join handle, so a second session cannot start
//! until the first has fully torn down. The thread is spawned before the
//! backends leave the `Capturer`; a failed spawn leaves them in place.

use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;

use scrollcap_actuator::ScrollActuator;
use scrollcap_capture::FrameSource;
use scrollcap_core::{CaptureMode, CaptureSettings, SessionToken};
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::error::SessionError;
use crate::events::SessionEvent;
use crate::handle::SessionHandle;
use crate::session::{Session, SessionParts};

const WORKER_THREAD_NAME: &str = "scrollcap-worker";

type WorkerBody = Box<dyn FnOnce() -> Option<SessionParts> + Send>;

pub struct Capturer {
    source:   Option<Box<dyn FrameSource>>,
    actuator: Option<Box<dyn ScrollActuator>>,
    settings: CaptureSettings,
    events:   Option<mpsc::Sender<SessionEvent>>,
    worker:   Option<JoinHandle<Option<SessionParts>>>,
}

impl Capturer {
    pub fn new(
        source: Box<dyn FrameSource>,
        actuator: Option<Box<dyn ScrollActuator>>,
        settings: CaptureSettings,
    ) -> Self {
        Self { source: Some(source), actuator, settings, events: None, worker: None }
    }

    /// Send progress events of every future session to `tx`.
    pub fn with_events(mut self, tx: mpsc::Sender<SessionEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn settings(&self) -> &CaptureSettings {
        &self.settings
    }

    /// Replace the configuration used by the next session.
    pub fn set_settings(&mut self, settings: CaptureSettings) {
        self.settings = settings;
    }

    /// True while a worker thread is alive.
    pub fn is_active(&self) -> bool {
        self.worker.as_ref().is_some_and(|w| !w.is_finished())
    }

    fn restore(&mut self, worker: JoinHandle<Option<SessionParts>>) {
        match worker.join() {
            Ok(Some(parts)) => self.put_back(parts),
            Ok(None) => {}
            Err(_) => error!("[Capturer] Worker thread panicked; backends lost"),
        }
    }

    fn put_back(&mut self, parts: SessionParts) {
        self.source = Some(parts.source);
        self.actuator = parts.actuator;
    }

    /// Start a session on a dedicated worker thread.
    pub fn start(&mut self, token: SessionToken) -> Result<SessionHandle, SessionError> {
        self.start_with(token, |body| std::thread::Builder::new().name(WORKER_THREAD_NAME.into()).spawn(body))
    }

    fn start_with<S>(&mut self, token: SessionToken, spawn: S) -> Result<SessionHandle, SessionError>
    where
        S: FnOnce(WorkerBody) -> std::io::Result<JoinHandle<Option<SessionParts>>>,
    {
        if let Some(worker) = self.worker.take() {
            if !worker.is_finished() {
                self.worker = Some(worker);
                return Err(SessionError::AlreadyActive);
            }
            self.restore(worker);
        }
        if self.settings.mode == CaptureMode::Auto && self.actuator.is_none() {
            return Err(SessionError::NoActuator);
        }
        if self.source.is_none() {
            return Err(SessionError::SourceUnavailable);
        }
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        let (session_tx, session_rx) = std_mpsc::sync_channel::<Session>(0);
        let worker = spawn(Box::new(move || {
            let session = session_rx.recv().ok()?;
            Some(runtime.block_on(session.run()))
        }))?;

        let Some(source) = self.source.take() else {
            return Err(SessionError::SourceUnavailable);
        };
        let parts = SessionParts { source, actuator: self.actuator.take() };
        let (session, handle) = Session::new(parts, self.settings.clone(), token, self.events.clone());
        if let Err(std_mpsc::SendError(session)) = session_tx.send(session) {
            error!("[Capturer] Worker exited before receiving its session");
            self.put_back(session.into_parts());
            let _ = worker.join();
            return Err(SessionError::WorkerExited);
        }
        info!("[Capturer] {} session worker started", self.settings.mode);
        self.worker = Some(worker);
        Ok(handle)
    }

    /// Block until the current worker (if any) has exited and reclaim the
    /// backends. Call after `stop`/`finish` to reuse the capturer right away.
    pub fn join(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.restore(worker);
        }
    }

    /// Whether the backends are home (no session owns them).
    pub fn is_idle(&self) -> bool {
        self.worker.is_none() && self.source.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scrollcap_capture::MemorySource;
    use scrollcap_core::Frame;
    use std::time::Duration;

    fn capturer() -> Capturer {
        let source = MemorySource::new(vec![Frame::solid(8, 8, [1, 2, 3, 255])], Duration::from_millis(10));
        let settings = CaptureSettings { mode: CaptureMode::Manual, ..Default::default() };
        Capturer::new(Box::new(source), None, settings)
    }

    #[test]
    fn failed_spawn_keeps_backends() {
        let mut capturer = capturer();
        let err = capturer
            .start_with(SessionToken::default(), |_| Err(std::io::Error::other("thread limit reached")))
            .err();
        assert!(matches!(err, Some(SessionError::Spawn(_))));
        assert!(capturer.is_idle());

        let handle = capturer.start(SessionToken::default()).unwrap();
        handle.stop();
        capturer.join();
        assert!(capturer.is_idle());
    }

    #[test]
    fn worker_gone_before_handoff_returns_backends() {
        let mut capturer = capturer();
        // the body is dropped unrun, which closes the session channel
        let err = capturer
            .start_with(SessionToken::default(), |body| {
                drop(body);
                std::thread::Builder::new().spawn(|| None)
            })
            .err();
        assert!(matches!(err, Some(SessionError::WorkerExited)));
        assert!(capturer.is_idle());
    }
}

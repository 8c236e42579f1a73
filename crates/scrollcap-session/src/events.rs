use scrollcap_core::OrchestratorState;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::debug;

/// Observational progress notification. Never required for correctness.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SessionEvent {
    StateChanged(OrchestratorState),
    /// Motion started a manual capture burst.
    ScrollDetected,
    /// Stillness ended a manual capture burst.
    CapturePaused,
    FrameCount(usize),
    /// Scroll progress in `[0, 1]` from the scrollbar thumb.
    Progress(f32),
    Error(String),
    SourceLost,
}

/// Non-blocking sender side of the progress sink.
#[derive(Clone, Default)]
pub(crate) struct EventSink {
    tx: Option<mpsc::Sender<SessionEvent>>,
}

impl EventSink {
    pub(crate) fn new(tx: Option<mpsc::Sender<SessionEvent>>) -> Self {
        Self { tx }
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        let Some(tx) = &self.tx else { return };
        match tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => debug!("[Session] Event dropped (consumer lagging): {:?}", event),
            Err(TrySendError::Closed(_)) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_tagged() {
        let json = serde_json::to_string(&SessionEvent::StateChanged(OrchestratorState::Active)).unwrap();
        assert_eq!(json, r#"{"type":"state_changed","value":"active"}"#);
        let json = serde_json::to_string(&SessionEvent::SourceLost).unwrap();
        assert_eq!(json, r#"{"type":"source_lost"}"#);
    }

    #[test]
    fn full_channel_drops_instead_of_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        let sink = EventSink::new(Some(tx));
        sink.emit(SessionEvent::FrameCount(1));
        sink.emit(SessionEvent::FrameCount(2));
        assert_eq!(rx.try_recv().unwrap(), SessionEvent::FrameCount(1));
        assert!(rx.try_recv().is_err());
    }
}

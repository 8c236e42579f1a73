use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("A capture session is already active")]
    AlreadyActive,

    #[error("Frame source is not available (previous session still owns it)")]
    SourceUnavailable,

    #[error("Auto-scroll needs a scroll actuator")]
    NoActuator,

    #[error("Session worker exited before it could run")]
    WorkerExited,

    #[error("Failed to spawn session worker: {0}")]
    Spawn(#[from] std::io::Error),
}

pub mod config;
pub mod errors;
pub mod types;

pub use config::{CaptureSettings, ScrollMethod};
pub use errors::{ConfigError, FrameError};
pub use types::*;

//! scrollcap-actuator: pluggable "scroll the content down" backends.
//!
//! | Method | Backend | Mechanism |
//! |--------|---------|-----------|
//! | `gesture` | [`UinputActuator`] (Linux) | virtual pointer emitting wheel notches through `/dev/uinput` |
//! | `shell` | [`ShellActuator`] | privileged command template, `input swipe …` by default |
//!
//! The session never cares how a scroll is injected; it only calls
//! [`ScrollActuator::scroll_down`] and bounds the call with its own timeout.

use async_trait::async_trait;
use scrollcap_core::{CaptureSettings, ScrollMethod};
use thiserror::Error;
use tracing::info;

pub mod shell;
#[cfg(target_os = "linux")]
pub mod uinput;

pub use shell::{ShellActuator, SwipeGeometry, DEFAULT_SWIPE_TEMPLATE};
#[cfg(target_os = "linux")]
pub use uinput::UinputActuator;

#[derive(Error, Debug)]
pub enum ActuatorError {
    #[error("Scroll actuator unavailable: {0}")]
    Unavailable(String),

    #[error("Scroll command failed: {0}")]
    CommandFailed(String),

    #[error("Virtual input device error: {0:#}")]
    Device(#[source] anyhow::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Performs one downward scroll of the mirrored content.
#[async_trait]
pub trait ScrollActuator: Send + 'static {
    /// Whether this backend can currently scroll at all.
    fn is_available(&self) -> bool;

    /// Scroll down by roughly one gesture. `Ok` means the gesture was
    /// dispatched; the caller verifies the effect from frames.
    async fn scroll_down(&mut self, viewport_width: u32, viewport_height: u32) -> Result<(), ActuatorError>;

    fn name(&self) -> &'static str;
}

/// Build the actuator selected by `settings.scroll_method`.
pub fn build_actuator(settings: &CaptureSettings) -> Box<dyn ScrollActuator> {
    let shell = || {
        let template = settings
            .shell_command
            .clone()
            .unwrap_or_else(|| DEFAULT_SWIPE_TEMPLATE.to_string());
        Box::new(ShellActuator::new(template)) as Box<dyn ScrollActuator>
    };

    let actuator = match settings.scroll_method {
        ScrollMethod::Shell => shell(),
        #[cfg(target_os = "linux")]
        ScrollMethod::Gesture => Box::new(UinputActuator::new(settings.wheel_notches)) as Box<dyn ScrollActuator>,
        #[cfg(not(target_os = "linux"))]
        ScrollMethod::Gesture => {
            tracing::warn!("Gesture scrolling needs uinput (Linux only), using shell actuator");
            shell()
        }
    };
    info!("Scroll actuator: {} (method={})", actuator.name(), settings.scroll_method);
    actuator
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_method_builds_shell_actuator() {
        let settings = CaptureSettings {
            scroll_method: ScrollMethod::Shell,
            shell_command: Some("true".into()),
            ..Default::default()
        };
        assert_eq!(build_actuator(&settings).name(), "shell");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn gesture_method_builds_uinput_actuator() {
        let settings = CaptureSettings { scroll_method: ScrollMethod::Gesture, ..Default::default() };
        assert_eq!(build_actuator(&settings).name(), "uinput");
    }
}

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::{ActuatorError, ScrollActuator};

/// Swipe from 70% to 50% of the height along the horizontal centre.
pub const DEFAULT_SWIPE_TEMPLATE: &str = "input swipe {x} {start_y} {x} {end_y} {duration_ms}";

const SWIPE_DURATION_MS: u32 = 600;

/// Coordinates substituted into a command template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwipeGeometry {
    pub x:           u32,
    pub start_y:     u32,
    pub end_y:       u32,
    pub duration_ms: u32,
}

impl SwipeGeometry {
    pub fn for_viewport(width: u32, height: u32) -> Self {
        Self {
            x: width / 2,
            start_y: height * 70 / 100,
            end_y: height * 50 / 100,
            duration_ms: SWIPE_DURATION_MS,
        }
    }
}

/// Runs a privileged shell command per scroll (`sh -c <rendered template>`).
///
/// Placeholders: `{x}`, `{start_y}`, `{end_y}`, `{duration_ms}`,
/// `{width}`, `{height}`.
#[derive(Debug, Clone)]
pub struct ShellActuator {
    template: String,
}

impl ShellActuator {
    pub fn new(template: impl Into<String>) -> Self {
        Self { template: template.into() }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Executable the template starts with.
    pub fn program(&self) -> Option<&str> {
        self.template.split_whitespace().next()
    }

    pub fn render(&self, width: u32, height: u32) -> String {
        let g = SwipeGeometry::for_viewport(width, height);
        self.template
            .replace("{x}", &g.x.to_string())
            .replace("{start_y}", &g.start_y.to_string())
            .replace("{end_y}", &g.end_y.to_string())
            .replace("{duration_ms}", &g.duration_ms.to_string())
            .replace("{width}", &width.to_string())
            .replace("{height}", &height.to_string())
    }
}

impl Default for ShellActuator {
    fn default() -> Self {
        Self::new(DEFAULT_SWIPE_TEMPLATE)
    }
}

#[async_trait]
impl ScrollActuator for ShellActuator {
    fn is_available(&self) -> bool {
        match self.program() {
            Some(program) => which::which(program).is_ok(),
            None => false,
        }
    }

    async fn scroll_down(&mut self, viewport_width: u32, viewport_height: u32) -> Result<(), ActuatorError> {
        let command = self.render(viewport_width, viewport_height);
        debug!("[Shell] {}", command);

        let output = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .kill_on_drop(true)
            .output()
            .await?;

        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!("[Shell] `{}` exited with {}: {}", command, output.status, stderr.trim());
        Err(ActuatorError::CommandFailed(format!("`{}` exited with {}", command, output.status)))
    }

    fn name(&self) -> &'static str {
        "shell"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_default_swipe() {
        let actuator = ShellActuator::default();
        assert_eq!(actuator.render(1080, 2400), "input swipe 540 1680 540 1200 600");
    }

    #[test]
    fn renders_custom_placeholders() {
        let actuator = ShellActuator::new("xdotool-scroll --size {width}x{height} --at {x},{start_y}");
        assert_eq!(actuator.render(100, 200), "xdotool-scroll --size 100x200 --at 50,140");
    }

    #[test]
    fn availability_follows_program_lookup() {
        assert!(!ShellActuator::new("").is_available());
        assert!(!ShellActuator::new("scrollcap-no-such-program-4242 {x}").is_available());
        #[cfg(unix)]
        assert!(ShellActuator::new("sh -c true").is_available());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_status_decides_success() {
        let mut ok = ShellActuator::new("true {x} {end_y}");
        assert!(ok.scroll_down(100, 100).await.is_ok());

        let mut failing = ShellActuator::new("false");
        let err = failing.scroll_down(100, 100).await.unwrap_err();
        assert!(matches!(err, ActuatorError::CommandFailed(_)));
    }
}

//! Wheel scrolling through a `/dev/uinput` virtual pointer (evdev).
//!
//! # Requirements
//!
//! - The process must have write access to `/dev/uinput`.
//!   Either run as root or add the user to the `input` group:
//!   ```text
//!   sudo usermod -aG input $USER
//!   sudo chmod 0660 /dev/uinput
//!   ```
//! - Kernel module must be loaded: `sudo modprobe uinput`
//!
//! The wheel event lands wherever the pointer is, so the pointer must rest
//! over the content to scroll.

use std::fs::OpenOptions;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AttributeSet, EventType, InputEvent, Key, RelativeAxisType};
use tracing::{debug, info};

use crate::{ActuatorError, ScrollActuator};

const UINPUT_PATH: &str = "/dev/uinput";
/// One wheel notch in hi-res units.
const HI_RES_PER_NOTCH: i32 = 120;
const NOTCH_PAUSE: Duration = Duration::from_millis(16);
/// Compositors need a moment to pick up a freshly created device.
const DEVICE_SETTLE: Duration = Duration::from_millis(200);

/// Virtual "scrollcap Pointer" emitting `REL_WHEEL` notches.
pub struct UinputActuator {
    device:  Option<VirtualDevice>,
    notches: u32,
}

impl UinputActuator {
    pub fn new(notches: u32) -> Self {
        Self { device: None, notches: notches.max(1) }
    }

    pub fn notches(&self) -> u32 {
        self.notches
    }

    fn create_device() -> anyhow::Result<VirtualDevice> {
        let mut keys = AttributeSet::<Key>::new();
        keys.insert(Key::BTN_LEFT);
        keys.insert(Key::BTN_RIGHT);
        keys.insert(Key::BTN_MIDDLE);

        let mut rel_axes = AttributeSet::<RelativeAxisType>::new();
        rel_axes.insert(RelativeAxisType::REL_X);
        rel_axes.insert(RelativeAxisType::REL_Y);
        rel_axes.insert(RelativeAxisType::REL_WHEEL);
        rel_axes.insert(RelativeAxisType::REL_WHEEL_HI_RES);

        let device = VirtualDeviceBuilder::new()
            .context("Opening /dev/uinput")?
            .name("scrollcap Pointer")
            .with_keys(&keys)
            .context("Registering pointer buttons")?
            .with_relative_axes(&rel_axes)
            .context("Registering wheel axes")?
            .build()
            .context("Creating virtual pointer")?;
        Ok(device)
    }
}

/// Events for one downward notch, terminated by `SYN_REPORT`.
fn notch_events() -> [InputEvent; 3] {
    [
        InputEvent::new(EventType::RELATIVE, RelativeAxisType::REL_WHEEL.0, -1),
        InputEvent::new(EventType::RELATIVE, RelativeAxisType::REL_WHEEL_HI_RES.0, -HI_RES_PER_NOTCH),
        InputEvent::new(EventType::SYNCHRONIZATION, 0, 0),
    ]
}

#[async_trait]
impl ScrollActuator for UinputActuator {
    fn is_available(&self) -> bool {
        if self.device.is_some() {
            return true;
        }
        Path::new(UINPUT_PATH).exists() && OpenOptions::new().write(true).open(UINPUT_PATH).is_ok()
    }

    async fn scroll_down(&mut self, viewport_width: u32, viewport_height: u32) -> Result<(), ActuatorError> {
        if self.device.is_none() {
            let device = Self::create_device().map_err(ActuatorError::Device)?;
            info!("[uinput] Virtual pointer ready ({} notch(es) per scroll)", self.notches);
            self.device = Some(device);
            tokio::time::sleep(DEVICE_SETTLE).await;
        }
        debug!("[uinput] Scrolling {} notch(es) on {}x{}", self.notches, viewport_width, viewport_height);

        for i in 0..self.notches {
            let device = self
                .device
                .as_mut()
                .ok_or_else(|| ActuatorError::Unavailable("virtual pointer closed".into()))?;
            device.emit(&notch_events())?;
            if i + 1 < self.notches {
                tokio::time::sleep(NOTCH_PAUSE).await;
            }
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "uinput"
    }
}

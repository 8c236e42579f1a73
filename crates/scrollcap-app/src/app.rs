//! Command flow:
//! 1. Resolve settings (file → env → flags)
//! 2. Pick backends: replay directory or the live screen, plus the actuator
//! 3. Run one session on the capturer's worker thread
//! 4. Forward session events to the log (or stdout as JSON lines)
//! 5. Export the delivered (or partial) frames as PNG files

use std::time::Duration;

use anyhow::Result;
use scrollcap_actuator::{build_actuator, ScrollActuator};
use scrollcap_capture::FrameSource;
use scrollcap_core::{CaptureMode, CaptureSettings, Frame, SessionToken};
use scrollcap_session::{Capturer, SessionEvent, SessionHandle};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::cli::{Cli, RunArgs};
use crate::replay::{self, ReplayActuator};
use crate::{export, settings};

const EVENT_BUFFER: usize = 256;

type Backends = (Box<dyn FrameSource>, Option<Box<dyn ScrollActuator>>);

pub async fn run(cli: Cli) -> Result<()> {
    let mode = cli.command.mode();
    let args = cli.command.args().clone();
    let settings = settings::resolve(mode, &args)?;
    info!(
        "[App] {} mode: frame_interval={} initial_delay={}ms method={}",
        mode, settings.frame_interval, settings.initial_delay_ms, settings.scroll_method
    );

    let (source, actuator) = backends(mode, &args, &settings)?;
    let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
    let reporter = tokio::spawn(report_events(event_rx, cli.json));

    let mut capturer = Capturer::new(source, actuator, settings).with_events(event_tx);
    let mut handle = capturer.start(session_token())?;

    let delivered = match mode {
        CaptureMode::Manual => drive_manual(&mut handle).await?,
        CaptureMode::Auto => drive_auto(&mut handle).await,
    };
    let frames = match delivered {
        Some(frames) => frames,
        None => match handle.take_partial_frames() {
            Some(partial) => {
                warn!("[App] Session failed, exporting {} partial frame(s)", partial.len());
                partial
            }
            None => Vec::new(),
        },
    };

    // the worker owns the last event sender; joining it closes the channel
    tokio::task::spawn_blocking(move || capturer.join()).await?;
    reporter.await?;

    if frames.is_empty() {
        info!("[App] No frames captured");
        return Ok(());
    }
    export::write_frames(&args.out, &frames)?;
    Ok(())
}

fn session_token() -> SessionToken {
    let grant = std::env::var("SCROLLCAP_RESTORE_TOKEN").unwrap_or_default();
    SessionToken::new(0, grant)
}

fn backends(mode: CaptureMode, args: &RunArgs, settings: &CaptureSettings) -> Result<Backends> {
    if let Some(dir) = &args.replay {
        let interval = Duration::from_millis(args.replay_interval_ms.max(1));
        let source = replay::source(dir, interval, mode == CaptureMode::Manual)?;
        let actuator = match mode {
            CaptureMode::Auto => Some(Box::new(ReplayActuator::new(source.cursor())) as Box<dyn ScrollActuator>),
            CaptureMode::Manual => None,
        };
        return Ok((Box::new(source), actuator));
    }
    let actuator = (mode == CaptureMode::Auto).then(|| build_actuator(settings));
    Ok((screen_source()?, actuator))
}

#[cfg(all(target_os = "linux", feature = "pipewire"))]
fn screen_source() -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(scrollcap_capture::PipeWireSource::new()))
}

#[cfg(not(all(target_os = "linux", feature = "pipewire")))]
fn screen_source() -> Result<Box<dyn FrameSource>> {
    anyhow::bail!("live screen capture needs a Linux build with the `pipewire` feature; use --replay <dir>")
}

// ── Session driving ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ManualKey {
    Capture,
    Finish,
    Cancel,
}

fn parse_key(line: &str) -> Option<ManualKey> {
    match line.trim().to_ascii_lowercase().as_str() {
        "" | "c" => Some(ManualKey::Capture),
        "q" => Some(ManualKey::Finish),
        "x" => Some(ManualKey::Cancel),
        _ => None,
    }
}

/// Lines from stdin on a detached thread. A blocking read cannot be
/// cancelled, so the thread is never joined.
fn stdin_lines() -> Result<mpsc::UnboundedReceiver<String>> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::Builder::new().name("scrollcap-stdin".into()).spawn(move || {
        for line in std::io::stdin().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    })?;
    Ok(rx)
}

async fn drive_manual(handle: &mut SessionHandle) -> Result<Option<Vec<Frame>>> {
    let control = handle.control();
    let mut lines = stdin_lines()?;
    let mut stdin_open = true;
    info!("[App] Scroll the content. Enter/c = capture now, q = finish, x = cancel");

    let wait = handle.wait();
    tokio::pin!(wait);
    loop {
        tokio::select! {
            frames = &mut wait => return Ok(frames),
            line = lines.recv(), if stdin_open => match line {
                None => {
                    debug!("[App] stdin closed, finishing");
                    stdin_open = false;
                    control.finish();
                }
                Some(line) => match parse_key(&line) {
                    Some(ManualKey::Capture) => {
                        let count = control.capture_now().await;
                        info!("[App] {} frame(s) captured", count);
                    }
                    Some(ManualKey::Finish) => control.finish(),
                    Some(ManualKey::Cancel) => control.stop(),
                    None => warn!("[App] Unknown command {:?}", line.trim()),
                },
            },
            _ = tokio::signal::ctrl_c() => {
                info!("[App] Interrupted, cancelling");
                control.stop();
            }
        }
    }
}

async fn drive_auto(handle: &mut SessionHandle) -> Option<Vec<Frame>> {
    let control = handle.control();
    let wait = handle.wait();
    tokio::pin!(wait);
    loop {
        tokio::select! {
            frames = &mut wait => return frames,
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!("[App] Cannot listen for Ctrl-C: {}", e);
                    return wait.await;
                }
                info!("[App] Interrupted, stopping");
                control.stop();
            }
        }
    }
}

async fn report_events(mut rx: mpsc::Receiver<SessionEvent>, json: bool) {
    while let Some(event) = rx.recv().await {
        if json {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{}", line),
                Err(e) => warn!("[App] Unserialisable event {:?}: {}", event, e),
            }
            continue;
        }
        match event {
            SessionEvent::StateChanged(state) => info!("[Session] {}", state.label()),
            SessionEvent::ScrollDetected => info!("[Session] Scrolling detected, capturing"),
            SessionEvent::CapturePaused => info!("[Session] Scrolling stopped, paused"),
            SessionEvent::FrameCount(n) => info!("[Session] {} frame(s)", n),
            SessionEvent::Progress(p) => debug!("[Session] Scroll position {:.0}%", p * 100.0),
            SessionEvent::Error(message) => warn!("[Session] {}", message),
            SessionEvent::SourceLost => warn!("[Session] Screen capture stopped by the system"),
        }
    }
}

//! PipeWire screen capture through the XDG ScreenCast portal.
//!
//! ```text
//! ashpd portal ──► PipeWire node_id + remote fd
//!                          │
//!                          ▼
//!            pipewiresrc(fd=X, path=Y)
//!                          │
//!                    videoconvert
//!                          │
//!                video/x-raw,format=RGBA
//!                          │
//!                       appsink ─────► FrameQueue (drop-oldest)
//! ```
//!
//! The session token's grant is passed to the portal as a restore token so a
//! previously approved monitor is reused without a new prompt.

use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Context;
use ashpd::desktop::screencast::{CursorMode, Screencast, SourceType};
use ashpd::desktop::{PersistMode, Session};
use ashpd::WindowIdentifier;
use async_trait::async_trait;
use gstreamer::prelude::*;
use gstreamer_app::{AppSink, AppSinkCallbacks};
use scrollcap_core::{SessionToken, Viewport};
use tracing::{debug, error, info, warn};

use crate::queue::FrameSink;
use crate::raw::{PixelFormat, RawImage};
use crate::source::{CaptureError, FrameSource};

const DESKTOP_DENSITY_DPI: u32 = 96;

struct Running {
    pipeline:    gstreamer::Pipeline,
    session:     Session<'static, Screencast<'static>>,
    _remote:     OwnedFd,
    bus_stop:    Arc<AtomicBool>,
    bus_watcher: tokio::task::JoinHandle<()>,
}

/// Captures one monitor picked through the desktop portal.
#[derive(Default)]
pub struct PipeWireSource {
    running:       Option<Running>,
    restore_token: Option<String>,
}

impl PipeWireSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore token handed out by the portal for the current grant. Store it
    /// as the next session's grant to skip the permission prompt.
    pub fn restore_token(&self) -> Option<&str> {
        self.restore_token.as_deref()
    }
}

#[async_trait]
impl FrameSource for PipeWireSource {
    async fn start(&mut self, token: &SessionToken, sink: FrameSink) -> Result<Viewport, CaptureError> {
        if self.running.is_some() {
            return Err(CaptureError::AlreadyStarted);
        }
        gstreamer::init().context("GStreamer init")?;

        let portal = negotiate_portal(token).await?;
        info!(
            "[PipeWire] Portal ok: node_id={} fd={} size={}x{}",
            portal.node_id,
            portal.remote.as_raw_fd(),
            portal.width,
            portal.height
        );
        self.restore_token = portal.restore_token.clone();

        let pipeline = build_pipeline(portal.remote.as_raw_fd(), portal.node_id, sink.clone())?;
        pipeline
            .set_state(gstreamer::State::Playing)
            .context("GStreamer set Playing")?;

        let bus = pipeline.bus().context("GStreamer pipeline has no bus")?;
        let bus_stop = Arc::new(AtomicBool::new(false));
        let bus_watcher = tokio::task::spawn_blocking({
            let bus_stop = bus_stop.clone();
            move || watch_bus(bus, sink, bus_stop)
        });

        self.running = Some(Running {
            pipeline,
            session: portal.session,
            _remote: portal.remote,
            bus_stop,
            bus_watcher,
        });
        Ok(Viewport::new(portal.width, portal.height, DESKTOP_DENSITY_DPI))
    }

    async fn stop(&mut self) {
        let Some(running) = self.running.take() else { return };
        running.bus_stop.store(true, Ordering::Release);
        if let Err(e) = running.pipeline.set_state(gstreamer::State::Null) {
            warn!("[PipeWire] Failed to stop pipeline: {}", e);
        }
        let _ = running.bus_watcher.await;
        if let Err(e) = running.session.close().await {
            debug!("[PipeWire] Portal session close: {}", e);
        }
        info!("[PipeWire] Capture stopped");
    }

    fn name(&self) -> &'static str {
        "pipewire"
    }
}

// ── Portal negotiation ───────────────────────────────────────────────────────

struct PortalStream {
    session:       Session<'static, Screencast<'static>>,
    remote:        OwnedFd,
    node_id:       u32,
    width:         u32,
    height:        u32,
    restore_token: Option<String>,
}

async fn negotiate_portal(token: &SessionToken) -> Result<PortalStream, CaptureError> {
    let proxy = Screencast::new().await.context("ScreenCast portal")?;
    let session = proxy.create_session().await.context("create_session")?;

    let restore = token.has_grant().then_some(token.grant.as_str());
    proxy
        .select_sources(
            &session,
            CursorMode::Hidden,
            SourceType::Monitor.into(),
            false,
            restore,
            PersistMode::ExplicitlyRevoked,
        )
        .await
        .context("select_sources")?;

    let response = proxy
        .start(&session, &WindowIdentifier::default())
        .await
        .context("portal start")?
        .response()
        .map_err(|e| CaptureError::PermissionDenied(e.to_string()))?;

    let stream = response
        .streams()
        .first()
        .ok_or_else(|| CaptureError::Unavailable("portal returned no PipeWire streams".into()))?;
    let node_id = stream.pipe_wire_node_id();
    let (width, height) = stream
        .size()
        .map(|(w, h)| (w.max(1) as u32, h.max(1) as u32))
        .unwrap_or((1, 1));
    let restore_token = response.restore_token().map(str::to_owned);

    let remote = proxy
        .open_pipe_wire_remote(&session)
        .await
        .context("open_pipe_wire_remote")?;

    Ok(PortalStream { session, remote, node_id, width, height, restore_token })
}

// ── GStreamer pipeline ───────────────────────────────────────────────────────

fn build_pipeline(fd: i32, node_id: u32, sink: FrameSink) -> anyhow::Result<gstreamer::Pipeline> {
    let desc = format!(
        "pipewiresrc fd={fd} path={node_id} do-timestamp=true \
         ! videoconvert \
         ! video/x-raw,format=RGBA \
         ! appsink name=sink max-buffers=2 drop=true sync=false emit-signals=false"
    );
    debug!("[PipeWire] GStreamer pipeline: {}", desc);

    let pipeline = gstreamer::parse::launch(&desc)
        .context("Parsing GStreamer pipeline")?
        .downcast::<gstreamer::Pipeline>()
        .map_err(|_| anyhow::anyhow!("Expected Pipeline element"))?;

    let appsink: AppSink = pipeline
        .by_name("sink")
        .context("Finding appsink 'sink'")?
        .downcast::<AppSink>()
        .map_err(|_| anyhow::anyhow!("Expected AppSink"))?;

    appsink.set_callbacks(
        AppSinkCallbacks::builder()
            .new_sample(move |appsink| {
                let sample = appsink.pull_sample().map_err(|_| gstreamer::FlowError::Eos)?;
                let caps = sample.caps().ok_or(gstreamer::FlowError::NotNegotiated)?;
                let info = gstreamer_video::VideoInfo::from_caps(caps)
                    .map_err(|_| gstreamer::FlowError::NotNegotiated)?;
                let buffer = sample.buffer().ok_or(gstreamer::FlowError::Error)?;
                let map = buffer.map_readable().map_err(|_| gstreamer::FlowError::Error)?;

                let stride = info.stride().first().copied().unwrap_or(0).max(0) as usize;
                let image = RawImage::packed(info.width(), info.height(), PixelFormat::Rgba, map.as_slice().to_vec())
                    .with_stride(stride);
                sink.push(image);
                Ok(gstreamer::FlowSuccess::Ok)
            })
            .build(),
    );

    Ok(pipeline)
}

/// Blocks until EOS, an error, or `stop`. EOS and errors raise source lost.
fn watch_bus(bus: gstreamer::Bus, sink: FrameSink, stop: Arc<AtomicBool>) {
    while !stop.load(Ordering::Acquire) {
        let Some(msg) = bus.timed_pop(gstreamer::ClockTime::from_mseconds(200)) else { continue };
        match msg.view() {
            gstreamer::MessageView::Eos(_) => {
                info!("[PipeWire] Pipeline EOS");
                sink.mark_lost();
                break;
            }
            gstreamer::MessageView::Error(e) => {
                error!("[PipeWire] GStreamer error: {}", e.error());
                sink.mark_lost();
                break;
            }
            _ => {}
        }
    }
}

//! scrollcap: capture a long scrollable view as a sequence of frames.
//!
//! ```text
//! frame source ──► session worker ──► frames ──► out/frame_000.png …
//!  (PipeWire or     (manual / auto)
//!   --replay dir)        ▲
//!                        │ scroll_down
//!                  scroll actuator
//! ```
//!
//! Use `RUST_LOG=debug` for per-frame decisions, `GST_DEBUG=3` for the
//! PipeWire pipeline.

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app;
mod cli;
mod export;
mod replay;
mod settings;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    info!("scrollcap v{}", env!("CARGO_PKG_VERSION"));

    match app::run(cli).await {
        Ok(()) => Ok(()),
        Err(e) => {
            error!("Fatal error: {:#}", e);
            Err(e)
        }
    }
}

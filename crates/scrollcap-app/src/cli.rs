use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use scrollcap_core::CaptureMode;

/// scrollcap - scrolling screen capture
#[derive(Parser, Debug)]
#[command(name = "scrollcap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Print session events to stdout as JSON lines
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scroll the content automatically and capture each page
    Auto(RunArgs),
    /// Capture while you scroll; stdin: Enter/`c` capture now, `q` finish, `x` cancel
    Manual(RunArgs),
}

impl Commands {
    pub fn mode(&self) -> CaptureMode {
        match self {
            Self::Auto(_) => CaptureMode::Auto,
            Self::Manual(_) => CaptureMode::Manual,
        }
    }

    pub fn args(&self) -> &RunArgs {
        match self {
            Self::Auto(args) | Self::Manual(args) => args,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct RunArgs {
    /// Settings file (JSON). Defaults to the platform config dir
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Directory for the exported PNG frames
    #[arg(short, long, default_value = "scrollcap-out")]
    pub out: PathBuf,

    /// Replay PNG files from a directory instead of capturing the screen
    #[arg(long)]
    pub replay: Option<PathBuf>,

    /// Milliseconds between replayed frames
    #[arg(long, default_value_t = 50)]
    pub replay_interval_ms: u64,

    /// Scroll method: gesture or shell
    #[arg(short, long)]
    pub method: Option<String>,

    /// Manual-mode frame interval (60-300, steps of 15)
    #[arg(long)]
    pub frame_interval: Option<u32>,

    /// Auto-mode delay before the first capture (1000-5000 ms)
    #[arg(long)]
    pub initial_delay_ms: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_auto_with_overrides() {
        let cli = Cli::try_parse_from([
            "scrollcap",
            "auto",
            "--method",
            "shell",
            "--initial-delay-ms",
            "3000",
            "--out",
            "/tmp/pages",
        ])
        .unwrap();
        assert_eq!(cli.command.mode(), CaptureMode::Auto);
        let args = cli.command.args();
        assert_eq!(args.method.as_deref(), Some("shell"));
        assert_eq!(args.initial_delay_ms, Some(3000));
        assert_eq!(args.out, PathBuf::from("/tmp/pages"));
        assert!(args.replay.is_none());
    }

    #[test]
    fn parse_manual_defaults() {
        let cli = Cli::try_parse_from(["scrollcap", "manual", "--json"]).unwrap();
        assert!(cli.json);
        assert_eq!(cli.command.mode(), CaptureMode::Manual);
        let args = cli.command.args();
        assert_eq!(args.out, PathBuf::from("scrollcap-out"));
        assert_eq!(args.replay_interval_ms, 50);
        assert!(args.frame_interval.is_none());
    }

    #[test]
    fn rejects_unknown_subcommand() {
        assert!(Cli::try_parse_from(["scrollcap", "record"]).is_err());
    }
}

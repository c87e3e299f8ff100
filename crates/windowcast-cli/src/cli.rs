use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use windowcast_core::PixelFormat;

#[derive(Parser, Debug)]
#[command(name = "windowcast", version, about = "Persistent per-window capture streams")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List capturable windows.
    Windows {
        /// Only show windows whose application name contains this.
        #[arg(long)]
        app: Option<String>,
    },
    /// Report whether capture works here and what it would cost.
    Probe,
    /// Stream frames from one or more windows to disk.
    Capture(CaptureArgs),
}

#[derive(Args, Debug)]
pub struct CaptureArgs {
    /// Window id to capture; repeatable.
    #[arg(long = "window")]
    pub windows: Vec<u32>,
    /// Application name (case-insensitive substring); repeatable.
    #[arg(long = "app")]
    pub apps: Vec<String>,
    /// Title filter applied to every `--app` query.
    #[arg(long)]
    pub title: Option<String>,
    /// Frames to write per stream.
    #[arg(long, default_value_t = 30)]
    pub frames: usize,
    /// Payload format: raw, jpeg or png. Raw frames are written as PNG.
    #[arg(long, default_value = "png")]
    pub format: PixelFormat,
    /// Overrides the configured target frame rate.
    #[arg(long)]
    pub fps: Option<u32>,
    /// Output directory; one subdirectory per stream.
    #[arg(long, default_value = "frames")]
    pub out: PathBuf,
    /// Manager configuration (JSON).
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Give up on a stream after this long without a frame.
    #[arg(long, default_value_t = 5_000)]
    pub idle_timeout_ms: u64,
}

impl CaptureArgs {
    pub fn has_targets(&self) -> bool {
        !self.windows.is_empty() || !self.apps.is_empty()
    }
}

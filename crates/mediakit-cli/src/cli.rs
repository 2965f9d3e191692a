use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::BackendKind;

#[derive(Parser, Debug)]
#[command(name = "mediakit", about = "Media playback and camera capture sessions")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "mediakit.toml")]
    pub config: String,

    /// Graph backend (overrides config)
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play a URI or file, printing notifications as JSON lines
    Play(PlayArgs),
    /// Prepare a source and report its duration
    Probe {
        /// URI or filesystem path
        uri: String,
    },
    /// Open the camera, optionally taking a snapshot or recording
    Camera(CameraArgs),
    /// List capture devices
    Cameras,
}

#[derive(clap::Args, Debug)]
pub struct PlayArgs {
    /// URI or filesystem path
    pub uri: String,

    /// Restart at end of stream
    #[arg(long = "loop")]
    pub looping: bool,

    #[arg(long)]
    pub rate: Option<f64>,

    /// Linear volume, 0.0 to 1.0
    #[arg(long)]
    pub volume: Option<f64>,

    /// Stereo balance, -1.0 (left) to 1.0 (right)
    #[arg(long, allow_hyphen_values = true)]
    pub balance: Option<f64>,

    /// Start position in milliseconds
    #[arg(long)]
    pub seek: Option<u64>,

    /// Stop after this many seconds
    #[arg(long)]
    pub max_seconds: Option<u64>,
}

#[derive(clap::Args, Debug)]
pub struct CameraArgs {
    /// Write a still image; relative paths land in the snapshot directory
    #[arg(long)]
    pub snapshot: Option<PathBuf>,

    /// Record video for `--seconds`
    #[arg(long, conflicts_with = "snapshot")]
    pub record: Option<PathBuf>,

    #[arg(long)]
    pub zoom: Option<f32>,

    /// Preview or recording length
    #[arg(long, default_value = "3")]
    pub seconds: u64,
}

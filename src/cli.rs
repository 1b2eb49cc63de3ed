use clap::{Parser, Subcommand};
use std::path::PathBuf;

use ffsqueeze::engine::core::{AudioPolicy, Backend, Codec, PresetTier};

#[derive(Parser)]
#[command(name = "ffsqueeze")]
#[command(about = "Compress a video to a target file size (two-pass FFmpeg)", long_about = None)]
pub struct Cli {
    /// Video file to compress
    #[arg(value_name = "INPUT")]
    pub input: Option<PathBuf>,

    /// Output file (defaults to <input stem>_compressed.mp4 beside the input)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Target output size in MB (overrides the stored default)
    #[arg(short = 's', long, value_name = "MB", global = true)]
    pub target_mb: Option<f64>,

    /// Codec: h264, h265 or av1
    #[arg(long, global = true)]
    pub codec: Option<Codec>,

    /// Encoder backend: software, nvidia, amd or intel
    #[arg(long, global = true)]
    pub backend: Option<Backend>,

    /// Effort tier: standard or efficient
    #[arg(long, global = true)]
    pub preset: Option<PresetTier>,

    /// Audio handling: copy or reencode
    #[arg(long, global = true)]
    pub audio: Option<AudioPolicy>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Check if ffmpeg and ffprobe are installed
    CheckFfmpeg,

    /// Run capability trials and list the hardware encoders that work here
    DetectHw,

    /// Probe a video file for duration and audio bitrate
    Probe {
        /// Path to the video file
        file: PathBuf,
    },

    /// Show the ffmpeg commands for a job without executing them
    DryRun {
        /// Video file the job would compress
        input: PathBuf,
    },

    /// Show config status and location, or create default config if missing
    InitConfig,
}

pub fn parse() -> Cli {
    Cli::parse()
}

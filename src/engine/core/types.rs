use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use uuid::Uuid;

/// Target codec for the compressed output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    #[default]
    H264,
    H265,
    Av1,
}

impl Codec {
    pub const ALL: [Codec; 3] = [Codec::H264, Codec::H265, Codec::Av1];

    /// User-facing codec name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::H264 => "H.264",
            Self::H265 => "H.265",
            Self::Av1 => "AV1",
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Codec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "h264" | "h.264" | "avc" => Ok(Self::H264),
            "h265" | "h.265" | "hevc" => Ok(Self::H265),
            "av1" => Ok(Self::Av1),
            _ => Err(format!("unknown codec '{}' (expected h264, h265 or av1)", s)),
        }
    }
}

/// Encoder backend. Hardware backends are selectable only after a successful
/// capability trial this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Software,
    Nvidia,
    Amd,
    Intel,
}

impl Backend {
    pub const HARDWARE: [Backend; 3] = [Backend::Nvidia, Backend::Amd, Backend::Intel];

    pub fn is_hardware(&self) -> bool {
        !matches!(self, Self::Software)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Software => "Software",
            Self::Nvidia => "NVIDIA",
            Self::Amd => "AMD",
            Self::Intel => "Intel",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "software" | "sw" | "cpu" => Ok(Self::Software),
            "nvidia" | "nvenc" => Ok(Self::Nvidia),
            "amd" | "amf" => Ok(Self::Amd),
            "intel" | "qsv" => Ok(Self::Intel),
            _ => Err(format!(
                "unknown backend '{}' (expected software, nvidia, amd or intel)",
                s
            )),
        }
    }
}

/// Get the FFmpeg encoder name for a codec/backend pair
pub fn encoder_name(codec: Codec, backend: Backend) -> &'static str {
    match (codec, backend) {
        (Codec::H264, Backend::Software) => "libx264",
        (Codec::H264, Backend::Nvidia) => "h264_nvenc",
        (Codec::H264, Backend::Amd) => "h264_amf",
        (Codec::H264, Backend::Intel) => "h264_qsv",
        (Codec::H265, Backend::Software) => "libx265",
        (Codec::H265, Backend::Nvidia) => "hevc_nvenc",
        (Codec::H265, Backend::Amd) => "hevc_amf",
        (Codec::H265, Backend::Intel) => "hevc_qsv",
        (Codec::Av1, Backend::Software) => "libaom-av1",
        (Codec::Av1, Backend::Nvidia) => "av1_nvenc",
        (Codec::Av1, Backend::Amd) => "av1_amf",
        (Codec::Av1, Backend::Intel) => "av1_qsv",
    }
}

/// What to do with the source audio stream in pass 2
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioPolicy {
    /// Copy the source stream untouched; its probed bitrate is deducted from
    /// the budget.
    #[default]
    Copy,
    /// Re-encode to AAC at the fixed re-encode bitrate.
    Reencode,
}

impl fmt::Display for AudioPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Copy => f.write_str("copy"),
            Self::Reencode => f.write_str("reencode"),
        }
    }
}

impl FromStr for AudioPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "copy" => Ok(Self::Copy),
            "reencode" | "re-encode" | "aac" => Ok(Self::Reencode),
            _ => Err(format!(
                "unknown audio policy '{}' (expected copy or reencode)",
                s
            )),
        }
    }
}

/// Encoder effort tier, mapped onto FFmpeg's `-preset` scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresetTier {
    #[default]
    Standard,
    /// Slower analysis for better quality per bit
    Efficient,
}

impl PresetTier {
    pub fn ffmpeg_preset(&self) -> &'static str {
        match self {
            Self::Standard => "medium",
            Self::Efficient => "slow",
        }
    }
}

impl fmt::Display for PresetTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => f.write_str("standard"),
            Self::Efficient => f.write_str("efficient"),
        }
    }
}

impl FromStr for PresetTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "efficient" => Ok(Self::Efficient),
            _ => Err(format!(
                "unknown preset tier '{}' (expected standard or efficient)",
                s
            )),
        }
    }
}

/// One compression job. Immutable for the duration of the run; cancellation
/// travels separately as a [`CancelToken`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodeJob {
    pub id: Uuid,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub target_bytes: u64,
    pub codec: Codec,
    pub backend: Backend,
    pub preset: PresetTier,
    pub audio: AudioPolicy,
}

impl EncodeJob {
    pub fn new(
        input_path: PathBuf,
        output_path: PathBuf,
        target_bytes: u64,
        codec: Codec,
        backend: Backend,
        preset: PresetTier,
        audio: AudioPolicy,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            input_path,
            output_path,
            target_bytes,
            codec,
            backend,
            preset,
            audio,
        }
    }

    /// FFmpeg encoder this job maps to
    pub fn encoder(&self) -> &'static str {
        encoder_name(self.codec, self.backend)
    }
}

/// Cooperative cancellation flag. Single writer (the controller), single
/// reader (the executing thread); plain atomic visibility is sufficient.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Last-reported progress fraction, shared between the executing thread and
/// observers. Last write wins; monotonic only within a single pass.
#[derive(Debug, Clone, Default)]
pub struct SharedProgress(Arc<AtomicU64>);

impl SharedProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, fraction: f64) {
        self.0.store(fraction.to_bits(), Ordering::Relaxed);
    }

    pub fn get(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }
}

/// Terminal status of one job
#[derive(Debug, Clone, PartialEq)]
pub enum TerminalStatus {
    Success,
    Failed(String),
    Canceled,
}

/// How a single pass ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    Success,
    Failed,
    Canceled,
}

/// Result of running one encoding pass
#[derive(Debug, Clone)]
pub struct PassResult {
    pub outcome: PassOutcome,
    /// Trailing diagnostic lines from the encoder, for failure reporting
    pub tail: Vec<String>,
    /// Progress fraction at child exit, in [0,1]
    pub final_fraction: f64,
}

/// Event stream pushed from the executing thread to observers
#[derive(Debug, Clone)]
pub enum JobEvent {
    /// Raw line of encoder/pipeline output
    Log(String),
    /// An encoding pass began (1 or 2)
    PassStarted { pass: u8 },
    /// Throttled progress update
    Progress {
        fraction: f64,
        speed: Option<f64>,
        status: String,
    },
    /// Exactly one per job, last event on the stream
    Finished(TerminalStatus),
}

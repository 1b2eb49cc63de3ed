use thiserror::Error;

/// Why a job could not run to completion. Cancellation is deliberately not
/// represented here: a canceled job is a terminal state, not an error.
#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("media probe failed: {0}")]
    Probe(String),

    #[error("target size {target_bytes} bytes is not below the source size {source_bytes} bytes")]
    TargetTooLarge { target_bytes: u64, source_bytes: u64 },

    #[error("encoder {encoder} is unavailable: {reason}")]
    EncoderUnavailable { encoder: String, reason: String },

    #[error(
        "insufficient bitrate budget: {video_bits} bits remain for video after audio deduction"
    )]
    InsufficientBudget { video_bits: i64 },

    #[error("pass {pass} failed: {detail}")]
    PassFailure { pass: u8, detail: String },

    #[error("another job is already running")]
    AlreadyRunning,
}

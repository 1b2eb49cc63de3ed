use super::error::EncodeError;

/// Smallest video budget (total bits) worth handing to the encoder
pub const MIN_VIDEO_BITS: u64 = 200_000;

/// Audio bitrate used when the policy re-encodes the audio stream
pub const REENCODE_AUDIO_KBPS: u32 = 192;

/// Audio bitrate assumed when the source bitrate cannot be probed
pub const FALLBACK_AUDIO_KBPS: u32 = 128;

/// Bit budget for one job, derived from target size and duration.
///
/// Bitrates are whole kbps so they can be passed to the encoder as `<n>k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitratePlan {
    pub video_kbps: u32,
    pub audio_kbps: u32,
}

impl BitratePlan {
    /// Derive the plan from the target size, the source duration and the
    /// audio bitrate the policy resolved to.
    ///
    /// ```text
    /// total_bits           = target_bytes * 8
    /// audio_bits           = audio_kbps * 1000 * duration
    /// video_bits_available = total_bits - audio_bits
    /// video_bitrate_bps    = video_bits_available / duration
    /// ```
    ///
    /// Duration must already be known and positive; absence is a probe
    /// failure raised upstream.
    pub fn compute(
        target_bytes: u64,
        duration_s: f64,
        audio_kbps: u32,
    ) -> Result<Self, EncodeError> {
        debug_assert!(duration_s > 0.0);

        let total_bits = target_bytes as f64 * 8.0;
        let audio_bits = audio_kbps as f64 * 1000.0 * duration_s;
        let video_bits = total_bits - audio_bits;

        if video_bits <= MIN_VIDEO_BITS as f64 {
            return Err(EncodeError::InsufficientBudget {
                video_bits: video_bits as i64,
            });
        }

        let video_bps = video_bits / duration_s;

        Ok(Self {
            video_kbps: (video_bps / 1000.0) as u32,
            audio_kbps,
        })
    }

    /// Video bitrate formatted as an FFmpeg `-b:v` argument
    pub fn video_bitrate_arg(&self) -> String {
        format!("{}k", self.video_kbps)
    }

    /// Audio bitrate formatted as an FFmpeg `-b:a` argument
    pub fn audio_bitrate_arg(&self) -> String {
        format!("{}k", self.audio_kbps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifty_mb_two_minutes_copy_audio() {
        // 50 MB target, 120 s source, 128 kbps copied audio:
        // total = 419,430,400 bits, audio = 15,360,000 bits,
        // video = 404,070,400 bits -> 3,367,253 bps -> 3367 kbps
        let plan = BitratePlan::compute(50 * 1024 * 1024, 120.0, 128).unwrap();
        assert_eq!(plan.video_kbps, 3367);
        assert_eq!(plan.audio_kbps, 128);
        assert_eq!(plan.video_bitrate_arg(), "3367k");
    }

    #[test]
    fn collapsed_budget_is_rejected() {
        // 1 s of 192 kbps audio already exceeds a 20 kB target
        let err = BitratePlan::compute(20_000, 1.0, 192).unwrap_err();
        assert!(matches!(err, EncodeError::InsufficientBudget { .. }));
    }

    #[test]
    fn budget_at_floor_is_rejected() {
        // Exactly MIN_VIDEO_BITS left for video: still rejected (floor is
        // exclusive). 10 s, no audio, target sized to the floor.
        let target_bytes = MIN_VIDEO_BITS / 8;
        let err = BitratePlan::compute(target_bytes, 10.0, 0).unwrap_err();
        assert!(matches!(err, EncodeError::InsufficientBudget { .. }));
    }

    #[test]
    fn rounds_down_to_whole_kbps() {
        // 1,000,999 bytes over 8 s with no audio: 1,000,999 bps -> 1000 kbps
        let plan = BitratePlan::compute(1_000_999, 8.0, 0).unwrap();
        assert_eq!(plan.video_kbps, 1000);
    }

    #[test]
    fn compute_is_deterministic() {
        let a = BitratePlan::compute(75 * 1024 * 1024, 307.5, 160).unwrap();
        let b = BitratePlan::compute(75 * 1024 * 1024, 307.5, 160).unwrap();
        assert_eq!(a, b);
    }
}

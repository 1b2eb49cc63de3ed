mod error;
mod ffmpeg_cmd;
mod ffmpeg_info;
mod orchestrate;
mod pipeline;
mod plan;
mod progress;
mod types;

pub use error::EncodeError;
pub use ffmpeg_cmd::{
    build_pass_cmd, build_trial_cmd, clean_rate_control_artifacts, format_ffmpeg_cmd,
    null_output_target, two_pass_log_prefix,
};
pub use ffmpeg_info::{
    ffmpeg_version, ffprobe_version, parse_audio_bitrate_kbps, parse_ffprobe_duration,
    probe_audio_bitrate_kbps, probe_duration,
};
pub use orchestrate::{resolve_audio_kbps, run_job};
pub use pipeline::{CANCEL_POLL, PassExecutor, PassState, TAIL_LINES};
pub use plan::{BitratePlan, FALLBACK_AUDIO_KBPS, MIN_VIDEO_BITS, REENCODE_AUDIO_KBPS};
pub use progress::{PROGRESS_INTERVAL, ProgressEvent, ProgressThrottle, StatusParser};
pub use types::{
    AudioPolicy, Backend, CancelToken, Codec, EncodeJob, JobEvent, PassOutcome, PassResult,
    PresetTier, SharedProgress, TerminalStatus, encoder_name,
};

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn job(codec: Codec, backend: Backend) -> EncodeJob {
        EncodeJob::new(
            PathBuf::from("clip.mp4"),
            PathBuf::from("clip_compressed.mp4"),
            50 * 1024 * 1024,
            codec,
            backend,
            PresetTier::Efficient,
            AudioPolicy::Reencode,
        )
    }

    fn arg_after(cmd: &std::process::Command, flag: &str) -> Option<String> {
        let args: Vec<String> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .cloned()
    }

    #[test]
    fn two_pass_consistency_for_every_backend() {
        for codec in Codec::ALL {
            for backend in [Backend::Software, Backend::Nvidia, Backend::Amd, Backend::Intel] {
                let job = job(codec, backend);
                let plan = BitratePlan::compute(job.target_bytes, 90.0, 192).unwrap();

                let pass1 = build_pass_cmd(&job, &plan, 1);
                let pass2 = build_pass_cmd(&job, &plan, 2);

                assert_eq!(arg_after(&pass1, "-c:v"), arg_after(&pass2, "-c:v"));
                assert_eq!(arg_after(&pass1, "-b:v"), arg_after(&pass2, "-b:v"));
                assert_eq!(arg_after(&pass1, "-preset"), arg_after(&pass2, "-preset"));
                assert_eq!(arg_after(&pass1, "-c:v").unwrap(), job.encoder());
            }
        }
    }

    #[test]
    fn progress_stays_in_bounds_over_a_stream() {
        let mut parser = StatusParser::new(60.0);
        let mut last = 0.0;
        let stream = [
            "ffmpeg version 7.1 Copyright (c) 2000-2024",
            "frame=  100 fps=50 time=00:00:04.00 speed=2.0x",
            "frame=  400 fps=50 time=00:00:16.00 speed=2.0x",
            "frame=  300 fps=50 time=00:00:12.00 speed=2.0x",
            "frame= 1500 fps=50 time=00:01:00.00 speed=2.0x",
            "frame= 1501 fps=50 time=00:01:00.04 speed=2.0x",
        ];

        for line in stream {
            if let Some(event) = parser.parse_line(line) {
                assert!((0.0..=1.0).contains(&event.fraction));
                assert!(event.fraction >= last);
                last = event.fraction;
            }
        }
        assert_eq!(last, 1.0);
    }
}

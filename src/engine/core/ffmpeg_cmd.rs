use std::fs;
use std::path::PathBuf;
use std::process::Command;

use super::plan::BitratePlan;
use super::types::{AudioPolicy, EncodeJob};

/// Platform discard sink for outputs whose bytes are irrelevant
pub fn null_output_target() -> &'static str {
    if cfg!(windows) { "NUL" } else { "/dev/null" }
}

/// Prefix for the rate-control statistics files written by pass 1 and read
/// by pass 2. Lives in a per-job temp directory so parallel tools never
/// collide and cleanup is a single directory removal.
pub fn two_pass_log_prefix(job: &EncodeJob) -> PathBuf {
    std::env::temp_dir()
        .join("ffsqueeze_2pass")
        .join(job.id.to_string())
        .join("ffmpeg2pass")
}

/// Remove the job's rate-control artifacts. Called before a job starts and
/// after any terminal outcome; missing files are fine.
pub fn clean_rate_control_artifacts(job: &EncodeJob) {
    if let Some(dir) = two_pass_log_prefix(job).parent() {
        let _ = fs::remove_dir_all(dir);
    }
}

/// Build the bounded trial encode used by capability probing: one second of
/// synthetic input through the candidate encoder into the discard sink.
pub fn build_trial_cmd(encoder: &str) -> Command {
    let mut cmd = Command::new("ffmpeg");
    cmd.args(["-hide_banner", "-v", "error"]);
    cmd.args(["-f", "lavfi", "-i", "color=c=black:s=128x72:r=30:d=1"]);
    cmd.args(["-an", "-sn"]);
    cmd.arg("-c:v").arg(encoder);
    cmd.args(["-b:v", "500k"]);
    cmd.args(["-t", "1"]);
    cmd.args(["-f", "mp4", null_output_target()]);
    cmd
}

/// Build one encoding pass.
///
/// Pass 1 analyzes with audio disabled and discards its output; pass 2 writes
/// the real file with audio per policy. Encoder, bitrate and preset arguments
/// are identical across both passes so the rate-control statistics stay
/// coherent.
pub fn build_pass_cmd(job: &EncodeJob, plan: &BitratePlan, pass: u8) -> Command {
    debug_assert!(pass == 1 || pass == 2);

    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-y");
    cmd.arg("-i").arg(&job.input_path);

    cmd.arg("-c:v").arg(job.encoder());
    cmd.arg("-b:v").arg(plan.video_bitrate_arg());
    cmd.arg("-pass").arg(pass.to_string());
    cmd.arg("-passlogfile").arg(two_pass_log_prefix(job));
    cmd.arg("-preset").arg(job.preset.ffmpeg_preset());

    if pass == 1 {
        cmd.arg("-an");
        cmd.args(["-f", "mp4", null_output_target()]);
    } else {
        match job.audio {
            AudioPolicy::Copy => {
                cmd.args(["-c:a", "copy"]);
            }
            AudioPolicy::Reencode => {
                cmd.args(["-c:a", "aac"]);
                cmd.arg("-b:a").arg(plan.audio_bitrate_arg());
            }
        }
        cmd.arg(&job.output_path);
    }

    cmd
}

/// Render a command as a copy-pasteable shell line
pub fn format_ffmpeg_cmd(cmd: &Command) -> String {
    let parts: Vec<String> = std::iter::once(cmd.get_program())
        .chain(cmd.get_args())
        .map(|s| s.to_string_lossy().into_owned())
        .collect();

    shlex::try_join(parts.iter().map(String::as_str))
        .unwrap_or_else(|_| parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::core::types::{Backend, Codec, PresetTier};
    use std::path::PathBuf;

    fn test_job(audio: AudioPolicy) -> EncodeJob {
        EncodeJob::new(
            PathBuf::from("/tmp/input.mp4"),
            PathBuf::from("/tmp/input_compressed.mp4"),
            50 * 1024 * 1024,
            Codec::H264,
            Backend::Software,
            PresetTier::Standard,
            audio,
        )
    }

    fn args_of(cmd: &Command) -> String {
        cmd.get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn pass1_disables_audio_and_discards_output() {
        let job = test_job(AudioPolicy::Copy);
        let plan = BitratePlan {
            video_kbps: 3367,
            audio_kbps: 128,
        };

        let args = args_of(&build_pass_cmd(&job, &plan, 1));
        assert!(args.contains("-an"));
        assert!(args.contains("-pass 1"));
        assert!(args.ends_with(&format!("-f mp4 {}", null_output_target())));
        assert!(!args.contains("input_compressed"));
    }

    #[test]
    fn pass2_applies_audio_policy() {
        let plan = BitratePlan {
            video_kbps: 3367,
            audio_kbps: 192,
        };

        let copy = args_of(&build_pass_cmd(&test_job(AudioPolicy::Copy), &plan, 2));
        assert!(copy.contains("-c:a copy"));
        assert!(!copy.contains("-b:a"));

        let reencode = args_of(&build_pass_cmd(&test_job(AudioPolicy::Reencode), &plan, 2));
        assert!(reencode.contains("-c:a aac"));
        assert!(reencode.contains("-b:a 192k"));
        assert!(reencode.ends_with("input_compressed.mp4"));
    }

    #[test]
    fn passes_share_encoder_and_bitrate_arguments() {
        let job = test_job(AudioPolicy::Reencode);
        let plan = BitratePlan {
            video_kbps: 1500,
            audio_kbps: 192,
        };

        let pass1 = args_of(&build_pass_cmd(&job, &plan, 1));
        let pass2 = args_of(&build_pass_cmd(&job, &plan, 2));
        for fragment in ["-c:v libx264", "-b:v 1500k", "-preset medium"] {
            assert!(pass1.contains(fragment), "pass 1 missing {}", fragment);
            assert!(pass2.contains(fragment), "pass 2 missing {}", fragment);
        }
    }

    #[test]
    fn trial_cmd_is_short_and_discarded() {
        let args = args_of(&build_trial_cmd("h264_nvenc"));
        assert!(args.contains("-c:v h264_nvenc"));
        assert!(args.contains("lavfi"));
        assert!(args.contains("-t 1"));
        assert!(args.ends_with(null_output_target()));
    }

    #[test]
    fn artifact_cleanup_removes_passlog_dir() {
        let job = test_job(AudioPolicy::Copy);
        let prefix = two_pass_log_prefix(&job);
        let dir = prefix.parent().unwrap();

        fs::create_dir_all(dir).unwrap();
        fs::write(prefix.with_extension("log"), b"stats").unwrap();
        fs::write(prefix.with_extension("log.mbtree"), b"stats").unwrap();
        assert!(dir.exists());

        clean_rate_control_artifacts(&job);
        assert!(!dir.exists());

        // Cleaning again is a no-op
        clean_rate_control_artifacts(&job);
    }

    #[test]
    fn formats_command_for_shell() {
        let mut cmd = Command::new("ffmpeg");
        cmd.args(["-i", "my file.mp4", "-c:v", "libx264"]);
        let rendered = format_ffmpeg_cmd(&cmd);
        assert!(rendered.starts_with("ffmpeg"));
        assert!(rendered.contains("'my file.mp4'"));
    }
}

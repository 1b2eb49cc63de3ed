use std::fs;
use std::path::Path;

use tracing::{debug, info};

use crate::engine::capability::CapabilityMatrix;

use super::error::EncodeError;
use super::ffmpeg_cmd::{build_pass_cmd, clean_rate_control_artifacts, format_ffmpeg_cmd};
use super::ffmpeg_info::{probe_audio_bitrate_kbps, probe_duration};
use super::pipeline::PassExecutor;
use super::plan::{BitratePlan, FALLBACK_AUDIO_KBPS, REENCODE_AUDIO_KBPS};
use super::progress::StatusParser;
use super::types::{
    AudioPolicy, Backend, CancelToken, Codec, EncodeJob, JobEvent, PassOutcome, TerminalStatus,
};

enum Completion {
    Finished,
    Canceled,
}

/// Audio bitrate a policy resolves to: the probed source bitrate for copy
/// (fixed fallback when undeterminable), or the fixed re-encode bitrate.
pub fn resolve_audio_kbps(policy: AudioPolicy, input: &Path) -> u32 {
    match policy {
        AudioPolicy::Copy => probe_audio_bitrate_kbps(input).unwrap_or(FALLBACK_AUDIO_KBPS),
        AudioPolicy::Reencode => REENCODE_AUDIO_KBPS,
    }
}

/// Run one job start to finish: validate → probe → plan → pass 1 → pass 2.
///
/// Emits log lines and progress over `sink`, ending with exactly one
/// `JobEvent::Finished`. Rate-control artifacts are cleaned on every exit
/// path. After any non-`Success` status the output path must be treated as
/// invalid: pass 2 may already have written partial bytes to it.
pub fn run_job(
    job: &EncodeJob,
    caps: &CapabilityMatrix,
    cancel: &CancelToken,
    sink: &mut dyn FnMut(JobEvent),
) -> TerminalStatus {
    let status = match execute(job, caps, cancel, sink) {
        Ok(Completion::Finished) => TerminalStatus::Success,
        Ok(Completion::Canceled) => TerminalStatus::Canceled,
        Err(e) => TerminalStatus::Failed(e.to_string()),
    };

    clean_rate_control_artifacts(job);
    info!(job = %job.id, ?status, "job finished");
    sink(JobEvent::Finished(status.clone()));
    status
}

fn execute(
    job: &EncodeJob,
    caps: &CapabilityMatrix,
    cancel: &CancelToken,
    sink: &mut dyn FnMut(JobEvent),
) -> Result<Completion, EncodeError> {
    // Target must undercut the source; checked before any probe or spawn
    let source_bytes = fs::metadata(&job.input_path)
        .map_err(|e| EncodeError::Probe(format!("cannot stat {}: {}", job.input_path.display(), e)))?
        .len();
    if job.target_bytes >= source_bytes {
        return Err(EncodeError::TargetTooLarge {
            target_bytes: job.target_bytes,
            source_bytes,
        });
    }

    ensure_backend_usable(job, caps)?;

    sink(JobEvent::Log(format!(
        "Probing duration of {}",
        job.input_path.display()
    )));
    let duration_s = probe_duration(&job.input_path).map_err(|e| EncodeError::Probe(format!("{:#}", e)))?;
    if duration_s <= 0.0 {
        return Err(EncodeError::Probe(format!(
            "source reports non-positive duration ({} s)",
            duration_s
        )));
    }
    sink(JobEvent::Log(format!("Source duration: {:.2} s", duration_s)));

    let audio_kbps = resolve_audio_kbps(job.audio, &job.input_path);
    sink(JobEvent::Log(format!(
        "Audio budget: {} kbps ({})",
        audio_kbps, job.audio
    )));

    let plan = BitratePlan::compute(job.target_bytes, duration_s, audio_kbps)?;
    sink(JobEvent::Log(format!(
        "Bitrate plan: video {} kbps, audio {} kbps ({})",
        plan.video_kbps, plan.audio_kbps, job.encoder()
    )));

    // Stale stats from an aborted earlier run would poison pass 2
    clean_rate_control_artifacts(job);

    let mut executor = PassExecutor::new();
    for pass in 1..=2u8 {
        sink(JobEvent::PassStarted { pass });
        sink(JobEvent::Log(format!("=== Pass {} of 2 ===", pass)));

        let cmd = build_pass_cmd(job, &plan, pass);
        debug!(pass, cmd = %format_ffmpeg_cmd(&cmd), "running encoder pass");

        // Fresh parser per pass: the fraction restarts from zero
        let mut parser = StatusParser::new(duration_s);
        let result = executor.run(pass, cmd, &mut parser, cancel, sink)?;

        match result.outcome {
            PassOutcome::Success => {}
            PassOutcome::Canceled => return Ok(Completion::Canceled),
            PassOutcome::Failed => {
                let detail = result
                    .tail
                    .iter()
                    .rev()
                    .find(|line| !line.trim().is_empty())
                    .cloned()
                    .unwrap_or_else(|| "encoder exited with a non-zero status".to_string());
                return Err(EncodeError::PassFailure { pass, detail });
            }
        }
    }

    Ok(Completion::Finished)
}

/// Up-front rejection of combinations that can never run: policy-disallowed
/// codec paths and hardware backends not proven by this session's trials.
fn ensure_backend_usable(job: &EncodeJob, caps: &CapabilityMatrix) -> Result<(), EncodeError> {
    // libaom-av1 is prohibitively slow in two-pass target-size mode
    if job.codec == Codec::Av1 && job.backend == Backend::Software {
        return Err(EncodeError::EncoderUnavailable {
            encoder: job.encoder().to_string(),
            reason: "software AV1 is not supported in target-size mode (encode cost is prohibitive)"
                .to_string(),
        });
    }

    if !job.backend.is_hardware() {
        return Ok(());
    }

    match caps.status(job.codec, job.backend) {
        Some(status) if status.available => Ok(()),
        Some(status) => Err(EncodeError::EncoderUnavailable {
            encoder: job.encoder().to_string(),
            reason: status
                .detail
                .clone()
                .unwrap_or_else(|| "failed this session's capability trial".to_string()),
        }),
        None => Err(EncodeError::EncoderUnavailable {
            encoder: job.encoder().to_string(),
            reason: "backend was not probed this session".to_string(),
        }),
    }
}

//! Runtime hardware encoder detection.
//!
//! Encoder availability is never assumed from the platform: an FFmpeg build
//! may list `h264_nvenc` while the machine has no NVIDIA runtime at all. The
//! only trustworthy signal is a real trial encode, so the matrix is built by
//! actually running each candidate encoder against a second of synthetic
//! input, bounded by a per-trial timeout.

use std::collections::HashMap;
use std::io::{BufRead, BufReader};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::debug;

use super::core::{Backend, Codec, build_trial_cmd, encoder_name};

/// Per-trial wall-clock budget. A hung driver counts as unavailable.
pub const TRIAL_TIMEOUT: Duration = Duration::from_secs(8);

const TRIAL_POLL: Duration = Duration::from_millis(50);

/// Outcome of one capability trial
#[derive(Debug, Clone)]
pub struct BackendStatus {
    pub available: bool,
    /// Diagnostic reason when unavailable (last trial output line, timeout,
    /// or spawn error)
    pub detail: Option<String>,
}

/// Which (codec, hardware backend) pairs were proven to work this session.
///
/// Built once at session start and read-only afterwards until an explicit
/// re-probe. Software backends are always selectable and never probed.
#[derive(Debug, Clone, Default)]
pub struct CapabilityMatrix {
    entries: HashMap<(Codec, Backend), BackendStatus>,
}

impl CapabilityMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run the full set of trials sequentially. Worst case this takes
    /// [`TRIAL_TIMEOUT`] per absent backend, so callers should do it once
    /// per session and cache the result.
    pub fn probe() -> Self {
        let mut matrix = Self::default();

        for codec in Codec::ALL {
            for backend in Backend::HARDWARE {
                let encoder = encoder_name(codec, backend);
                let status = run_trial(build_trial_cmd(encoder), TRIAL_TIMEOUT);
                debug!(
                    encoder,
                    available = status.available,
                    detail = status.detail.as_deref().unwrap_or(""),
                    "capability trial finished"
                );
                matrix.record(codec, backend, status);
            }
        }

        matrix
    }

    pub fn record(&mut self, codec: Codec, backend: Backend, status: BackendStatus) {
        self.entries.insert((codec, backend), status);
    }

    pub fn status(&self, codec: Codec, backend: Backend) -> Option<&BackendStatus> {
        self.entries.get(&(codec, backend))
    }

    /// Whether the pair is selectable. Software is always selectable;
    /// hardware only after a successful trial this session.
    pub fn is_available(&self, codec: Codec, backend: Backend) -> bool {
        if !backend.is_hardware() {
            return true;
        }
        self.status(codec, backend).is_some_and(|s| s.available)
    }

    /// Selectable backends for a codec, software first
    pub fn available_backends(&self, codec: Codec) -> Vec<Backend> {
        let mut backends = vec![Backend::Software];
        backends.extend(
            Backend::HARDWARE
                .into_iter()
                .filter(|backend| self.is_available(codec, *backend)),
        );
        backends
    }
}

/// Run one bounded trial to completion.
///
/// Available only on a zero exit status. A timeout or spawn failure is an
/// unavailability reason, never an error.
fn run_trial(mut cmd: Command, timeout: Duration) -> BackendStatus {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::piped());

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return BackendStatus {
                available: false,
                detail: Some(format!("failed to spawn ffmpeg: {}", e)),
            };
        }
    };

    // Drain stderr off-thread so a chatty encoder cannot block on a full pipe
    let last_line = child.stderr.take().map(|stderr| {
        thread::spawn(move || {
            BufReader::new(stderr)
                .lines()
                .map_while(Result::ok)
                .filter(|line| !line.trim().is_empty())
                .last()
        })
    });

    let status = wait_timeout(&mut child, timeout);

    let last_line = last_line
        .and_then(|handle| handle.join().ok())
        .flatten();

    match status {
        Some(status) if status.success() => BackendStatus {
            available: true,
            detail: None,
        },
        Some(status) => BackendStatus {
            available: false,
            detail: Some(
                last_line.unwrap_or_else(|| format!("ffmpeg exited with status {}", status)),
            ),
        },
        None => BackendStatus {
            available: false,
            detail: Some(format!("trial timed out after {} s", timeout.as_secs())),
        },
    }
}

/// Poll `try_wait` until exit or deadline. On deadline the child is killed
/// and reaped; returns `None`.
fn wait_timeout(child: &mut Child, timeout: Duration) -> Option<ExitStatus> {
    let deadline = Instant::now() + timeout;

    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Some(status),
            Ok(None) => {}
            Err(_) => break,
        }
        if Instant::now() >= deadline {
            break;
        }
        thread::sleep(TRIAL_POLL);
    }

    let _ = child.kill();
    let _ = child.wait();
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn software_is_always_selectable() {
        let matrix = CapabilityMatrix::new();
        for codec in Codec::ALL {
            assert!(matrix.is_available(codec, Backend::Software));
        }
    }

    #[test]
    fn unprobed_hardware_is_not_selectable() {
        let matrix = CapabilityMatrix::new();
        assert!(!matrix.is_available(Codec::H264, Backend::Nvidia));
        assert!(matrix.status(Codec::H264, Backend::Nvidia).is_none());
    }

    #[test]
    fn recorded_trials_drive_selectability() {
        let mut matrix = CapabilityMatrix::new();
        matrix.record(
            Codec::H264,
            Backend::Nvidia,
            BackendStatus {
                available: true,
                detail: None,
            },
        );
        matrix.record(
            Codec::H264,
            Backend::Amd,
            BackendStatus {
                available: false,
                detail: Some("No capable devices found".to_string()),
            },
        );

        assert!(matrix.is_available(Codec::H264, Backend::Nvidia));
        assert!(!matrix.is_available(Codec::H264, Backend::Amd));
        assert_eq!(
            matrix.available_backends(Codec::H264),
            vec![Backend::Software, Backend::Nvidia]
        );
    }

    #[cfg(unix)]
    mod trials {
        use super::super::*;

        #[test]
        fn zero_exit_yields_available() {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", "exit 0"]);
            let status = run_trial(cmd, Duration::from_secs(5));
            assert!(status.available);
            assert!(status.detail.is_none());
        }

        #[test]
        fn nonzero_exit_reports_last_diagnostic_line() {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", "echo first >&2; echo 'Cannot load libcuda' >&2; exit 1"]);
            let status = run_trial(cmd, Duration::from_secs(5));
            assert!(!status.available);
            assert_eq!(status.detail.as_deref(), Some("Cannot load libcuda"));
        }

        #[test]
        fn silent_failure_reports_exit_status() {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", "exit 3"]);
            let status = run_trial(cmd, Duration::from_secs(5));
            assert!(!status.available);
            assert!(status.detail.unwrap().contains("exited with status"));
        }

        #[test]
        fn timeout_is_unavailable_not_an_error() {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", "sleep 30"]);
            let started = Instant::now();
            let status = run_trial(cmd, Duration::from_millis(300));
            assert!(started.elapsed() < Duration::from_secs(10));
            assert!(!status.available);
            assert!(status.detail.unwrap().contains("timed out"));
        }

        #[test]
        fn spawn_failure_reports_reason() {
            let cmd = Command::new("/nonexistent/ffsqueeze-trial-binary");
            let status = run_trial(cmd, Duration::from_secs(1));
            assert!(!status.available);
            assert!(status.detail.unwrap().contains("failed to spawn"));
        }
    }
}

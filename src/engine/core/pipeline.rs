use std::collections::VecDeque;
use std::io::{BufRead, BufReader};
use std::process::{Command, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use tracing::debug;

use super::error::EncodeError;
use super::progress::{ProgressThrottle, StatusParser};
use super::types::{CancelToken, JobEvent, PassOutcome, PassResult};

/// Upper bound on cancellation latency: the executor re-checks the cancel
/// token at least this often while the child is quiet.
pub const CANCEL_POLL: Duration = Duration::from_millis(100);

/// How many trailing encoder lines are kept for failure reporting
pub const TAIL_LINES: usize = 12;

/// Lifecycle of one pass execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PassState {
    #[default]
    Idle,
    Starting,
    Running,
    Completed(bool),
    Canceled,
}

/// Runs one encoding pass as a supervised child process.
///
/// The encoder's status stream (stderr) is drained by a reader thread into a
/// channel; the executor consumes it with a bounded `recv_timeout` so the
/// loop sleeps when the child is quiet and still observes cancellation within
/// [`CANCEL_POLL`]. Every line is forwarded to the observer as raw log text;
/// lines the [`StatusParser`] recognizes additionally produce throttled
/// progress updates. Blocks the caller until the child exits.
#[derive(Debug, Default)]
pub struct PassExecutor {
    state: PassState,
}

impl PassExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PassState {
        self.state
    }

    /// Run `cmd` to completion, cancellation or failure.
    ///
    /// Cancellation kills the child and yields `PassOutcome::Canceled`; it is
    /// not an error. `Err` is reserved for the process layer itself (spawn or
    /// wait failing).
    pub fn run(
        &mut self,
        pass: u8,
        mut cmd: Command,
        parser: &mut StatusParser,
        cancel: &CancelToken,
        sink: &mut dyn FnMut(JobEvent),
    ) -> Result<PassResult, EncodeError> {
        self.state = PassState::Starting;

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| EncodeError::PassFailure {
            pass,
            detail: format!("failed to spawn encoder: {}", e),
        })?;
        debug!(pass, pid = child.id(), "encoder pass spawned");

        let stderr = child.stderr.take().ok_or_else(|| EncodeError::PassFailure {
            pass,
            detail: "failed to capture encoder output".to_string(),
        })?;

        let (tx, rx) = mpsc::channel::<String>();
        let reader_thread = thread::spawn(move || {
            let reader = BufReader::new(stderr);
            for line in reader.lines().map_while(Result::ok) {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        self.state = PassState::Running;

        let mut tail: VecDeque<String> = VecDeque::with_capacity(TAIL_LINES);
        let mut throttle = ProgressThrottle::new();
        let mut canceled = false;

        loop {
            // Observed between line reads; latency bounded by CANCEL_POLL
            if cancel.is_canceled() {
                canceled = true;
                break;
            }

            match rx.recv_timeout(CANCEL_POLL) {
                Ok(line) => {
                    if tail.len() == TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line.clone());

                    if let Some(event) = parser.parse_line(&line) {
                        if throttle.ready() {
                            sink(JobEvent::Progress {
                                fraction: event.fraction,
                                speed: event.speed,
                                status: format!(
                                    "Pass {} of 2: {:.1}%",
                                    pass,
                                    event.fraction * 100.0
                                ),
                            });
                        }
                    }

                    sink(JobEvent::Log(line));
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        if canceled {
            debug!(pass, "cancel observed, terminating encoder");
            let _ = child.kill();
            let _ = child.wait();
            self.state = PassState::Canceled;
            // Reader thread is left to finish on its own: it ends when the
            // pipe closes, and joining here could block on a straggler
            // holding the write end.
            return Ok(PassResult {
                outcome: PassOutcome::Canceled,
                tail: tail.into(),
                final_fraction: parser.last_fraction(),
            });
        }

        let status = child.wait().map_err(|e| EncodeError::PassFailure {
            pass,
            detail: format!("failed to wait for encoder: {}", e),
        })?;
        debug!(pass, %status, "encoder pass exited");
        let _ = reader_thread.join();

        self.state = PassState::Completed(status.success());
        Ok(PassResult {
            outcome: if status.success() {
                PassOutcome::Success
            } else {
                PassOutcome::Failed
            },
            tail: tail.into(),
            final_fraction: parser.last_fraction(),
        })
    }
}

// Exclusive job slot and worker thread for the encode pipeline

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use tracing::info;

use super::capability::CapabilityMatrix;
use super::core::{CancelToken, EncodeError, EncodeJob, JobEvent, SharedProgress, run_job};

/// Owns the single job slot.
///
/// A job runs on its own thread so the interactive surface stays responsive;
/// the thread streams [`JobEvent`]s back over an mpsc channel and the stream
/// ends with `JobEvent::Finished`. Starting a second job while one is in
/// flight is rejected with [`EncodeError::AlreadyRunning`].
pub struct JobController {
    tx: Sender<JobEvent>,
    rx: Receiver<JobEvent>,
    active: Arc<AtomicBool>,
    cancel: CancelToken,
    progress: SharedProgress,
}

impl Default for JobController {
    fn default() -> Self {
        Self::new()
    }
}

impl JobController {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            tx,
            rx,
            active: Arc::new(AtomicBool::new(false)),
            cancel: CancelToken::new(),
            progress: SharedProgress::new(),
        }
    }

    /// Receiver for the event stream of the running (or last) job
    pub fn events(&self) -> &Receiver<JobEvent> {
        &self.rx
    }

    /// Last progress fraction reported by the executing thread
    pub fn progress(&self) -> f64 {
        self.progress.get()
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Request cooperative cancellation of the running job
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Start `job` on a dedicated thread.
    ///
    /// The capability matrix is the session's; the orchestrator trusts it
    /// without re-probing.
    pub fn start(&mut self, job: EncodeJob, caps: CapabilityMatrix) -> Result<(), EncodeError> {
        let job_id = job.id;
        self.spawn(move |cancel, sink: &mut dyn FnMut(JobEvent)| {
            info!(job = %job_id, "job started");
            run_job(&job, &caps, &cancel, sink);
        })
    }

    fn spawn(
        &mut self,
        work: impl FnOnce(CancelToken, &mut dyn FnMut(JobEvent)) + Send + 'static,
    ) -> Result<(), EncodeError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(EncodeError::AlreadyRunning);
        }

        // Fresh token per job so an old cancel request cannot leak forward
        self.cancel = CancelToken::new();
        self.progress.set(0.0);

        let cancel = self.cancel.clone();
        let tx = self.tx.clone();
        let active = Arc::clone(&self.active);
        let progress = self.progress.clone();

        thread::spawn(move || {
            let mut sink = |event: JobEvent| {
                if let JobEvent::Progress { fraction, .. } = &event {
                    progress.set(*fraction);
                }
                let _ = tx.send(event);
            };
            work(cancel, &mut sink);
            active.store(false, Ordering::SeqCst);
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::core::TerminalStatus;
    use std::time::Duration;

    #[test]
    fn slot_is_exclusive_while_work_runs() {
        let mut controller = JobController::new();

        controller
            .spawn(|_cancel, sink: &mut dyn FnMut(JobEvent)| {
                thread::sleep(Duration::from_millis(200));
                sink(JobEvent::Finished(TerminalStatus::Success));
            })
            .unwrap();

        assert!(controller.is_running());
        let second = controller.spawn(|_cancel, _sink: &mut dyn FnMut(JobEvent)| {});
        assert!(matches!(second, Err(EncodeError::AlreadyRunning)));

        // First job finishes and frees the slot
        match controller.events().recv_timeout(Duration::from_secs(5)) {
            Ok(JobEvent::Finished(TerminalStatus::Success)) => {}
            other => panic!("unexpected event: {:?}", other),
        }
        while controller.is_running() {
            thread::sleep(Duration::from_millis(10));
        }
        controller
            .spawn(|_cancel, _sink: &mut dyn FnMut(JobEvent)| {})
            .unwrap();
    }

    #[test]
    fn cancel_reaches_the_worker_token() {
        let mut controller = JobController::new();
        let (done_tx, done_rx) = mpsc::channel();

        controller
            .spawn(move |cancel, _sink: &mut dyn FnMut(JobEvent)| {
                while !cancel.is_canceled() {
                    thread::sleep(Duration::from_millis(10));
                }
                done_tx.send(()).unwrap();
            })
            .unwrap();

        controller.cancel();
        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("worker should observe cancellation");
    }

    #[test]
    fn progress_events_update_shared_cell() {
        let mut controller = JobController::new();

        controller
            .spawn(|_cancel, sink: &mut dyn FnMut(JobEvent)| {
                sink(JobEvent::Progress {
                    fraction: 0.42,
                    speed: Some(1.0),
                    status: "Pass 1 of 2: 42.0%".to_string(),
                });
            })
            .unwrap();

        match controller.events().recv_timeout(Duration::from_secs(5)) {
            Ok(JobEvent::Progress { fraction, .. }) => assert_eq!(fraction, 0.42),
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(controller.progress(), 0.42);
    }
}

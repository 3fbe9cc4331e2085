//! Background work for asynchronous processors.
//!
//! # Architecture
//!
//! ```text
//!   network thread                         worker pool (tokio blocking threads)
//!   ──────────────                         ────────────────────────────────────
//!   process() ──ctx.dispatch(job)──► submit ──► job(&StopToken) -> JobResult
//!                                                         │
//!   process_completions() ◄──── FrontQueue ◄── Completion ┘
//!         │                  (crossbeam channel; dropped if the
//!         ▼                   processor's liveness token is revoked)
//!   commit outputs, reset, scoped pass
//! ```
//!
//! Jobs never touch the network. Everything they produce crosses back through
//! the [`FrontQueue`] and is applied on the network thread.

use super::context::OutputBuffer;
use super::error::ProcessorError;
use super::id::ProcessorId;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::runtime::{Builder, Runtime};

pub type JobResult = Result<OutputBuffer, ProcessorError>;

/// Work handed off by `ProcessContext::dispatch`.
pub type Job = Box<dyn FnOnce(&StopToken) -> JobResult + Send + 'static>;

/// Shared between a processor slot and every job it dispatched. Revoked when
/// the processor leaves the network.
#[derive(Debug, Clone)]
pub struct LivenessToken(Arc<AtomicBool>);

impl LivenessToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_alive(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub(crate) fn revoke(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for LivenessToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Cooperative cancellation for a running job. Set when the job is
/// superseded by a newer dispatch or its processor is removed.
#[derive(Debug, Clone)]
pub struct StopToken {
    stop: Arc<AtomicBool>,
    liveness: LivenessToken,
}

impl StopToken {
    pub(crate) fn new(liveness: LivenessToken) -> Self {
        Self {
            stop: Arc::new(AtomicBool::new(false)),
            liveness,
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire) || !self.liveness.is_alive()
    }

    pub(crate) fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub(crate) fn liveness(&self) -> &LivenessToken {
        &self.liveness
    }
}

/// Identifies one dispatched job.
#[derive(Debug, Clone)]
pub(crate) struct JobTicket {
    pub processor: ProcessorId,
    pub epoch: u64,
    pub stop: StopToken,
}

/// Result of a job, waiting to be applied on the network thread.
pub struct Completion {
    pub(crate) processor: ProcessorId,
    pub(crate) epoch: u64,
    pub(crate) liveness: LivenessToken,
    pub(crate) result: JobResult,
}

impl Completion {
    pub fn processor(&self) -> ProcessorId {
        self.processor
    }

    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("processor", &self.processor)
            .field("epoch", &self.epoch)
            .field("alive", &self.liveness.is_alive())
            .field("ok", &self.result.is_ok())
            .finish()
    }
}

// ==================== FrontQueue ====================

/// Channel from the workers back to the network thread.
pub struct FrontQueue {
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
}

impl FrontQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> Sender<Completion> {
        self.tx.clone()
    }

    /// Everything queued so far, without blocking.
    pub fn drain(&self) -> Vec<Completion> {
        self.rx.try_iter().collect()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Completion> {
        match self.rx.recv_timeout(timeout) {
            Ok(completion) => Some(completion),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for FrontQueue {
    fn default() -> Self {
        Self::new()
    }
}

// ==================== WorkerPool ====================

/// Runs jobs on tokio's blocking thread pool. The runtime is built on first
/// use, so networks that never dispatch never spawn threads.
pub struct WorkerPool {
    threads: usize,
    thread_name: String,
    runtime: OnceLock<Option<Runtime>>,
    in_flight: Arc<AtomicUsize>,
    /// Signalled each time a job ends. Capacity one: a pending signal
    /// already means "re-check the counter".
    finished_tx: Sender<()>,
    finished_rx: Receiver<()>,
}

impl WorkerPool {
    pub fn new(threads: usize, thread_name: impl Into<String>) -> Self {
        let (finished_tx, finished_rx) = bounded(1);
        Self {
            threads: threads.max(1),
            thread_name: thread_name.into(),
            runtime: OnceLock::new(),
            in_flight: Arc::new(AtomicUsize::new(0)),
            finished_tx,
            finished_rx,
        }
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Jobs submitted but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    fn runtime(&self) -> Option<&Runtime> {
        self.runtime
            .get_or_init(|| {
                Builder::new_multi_thread()
                    .worker_threads(1)
                    .max_blocking_threads(self.threads)
                    .thread_name(self.thread_name.clone())
                    .build()
                    .map_err(|e| tracing::error!("Failed to start worker pool: {}", e))
                    .ok()
            })
            .as_ref()
    }

    pub(crate) fn submit(
        &self,
        job: Job,
        ticket: JobTicket,
        completions: Sender<Completion>,
    ) -> Result<(), ProcessorError> {
        let runtime = self
            .runtime()
            .ok_or_else(|| ProcessorError::failed("worker pool unavailable"))?;

        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let in_flight = InFlight {
            count: Arc::clone(&self.in_flight),
            finished: self.finished_tx.clone(),
        };

        runtime.spawn_blocking(move || {
            let _in_flight = in_flight;
            let JobTicket {
                processor,
                epoch,
                stop,
            } = ticket;

            if stop.is_stopped() {
                tracing::trace!("Job {} for {} stopped before start", epoch, processor);
                return;
            }

            let result = panic::catch_unwind(AssertUnwindSafe(|| job(&stop)))
                .unwrap_or_else(|payload| Err(ProcessorError::from_panic(payload.as_ref())));

            let liveness = stop.liveness().clone();
            if !liveness.is_alive() {
                tracing::trace!("Dropping completion for removed processor {}", processor);
                return;
            }

            let _ = completions.send(Completion {
                processor,
                epoch,
                liveness,
                result,
            });
        });

        Ok(())
    }

    /// Blocks until no job is running or `timeout` elapses.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.in_flight() > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            // Woken by a finishing job; the counter is checked again either way.
            let _ = self.finished_rx.recv_timeout(deadline - now);
        }
        true
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(Some(runtime)) = self.runtime.take() {
            runtime.shutdown_timeout(Duration::from_secs(1));
        }
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("threads", &self.threads)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

/// Decrements the in-flight counter when a job ends, however it ends, then
/// wakes a waiter in `wait_idle`.
struct InFlight {
    count: Arc<AtomicUsize>,
    finished: Sender<()>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
        let _ = self.finished.try_send(());
    }
}

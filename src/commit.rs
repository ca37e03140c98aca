//! Commit/Flush Scheduler
//!
//! Batches commits and turns every N-th one into a full flush.
//!
//! ## Ordering
//! All commit requests go through one channel drained by one worker thread,
//! so counter updates and flushes happen strictly in request order and two
//! flushes triggered by commits never overlap.
//!
//! ## Failure Handling
//! A failed flush leaves the counter at or above the threshold, so the next
//! commit retries it. Fire-and-forget commits log the failure; a caller
//! waiting on `commit()` receives it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{bounded, unbounded, Receiver, Sender};

use crate::error::{FolioError, Result};

/// Something that can persist the full state and clear the log
pub trait Flusher: Send + Sync + 'static {
    fn flush(&self) -> Result<()>;
}

enum CommitRequest {
    /// Count one write; flush at the threshold
    Commit { reply: Option<Sender<Result<bool>>> },

    /// Acknowledge once every earlier request has been processed
    Barrier { reply: Sender<()> },
}

/// Single ordered commit queue backed by a worker thread
pub struct CommitScheduler {
    sender: Option<Sender<CommitRequest>>,
    worker: Option<JoinHandle<()>>,
    pending: Arc<AtomicUsize>,
    threshold: usize,
}

impl CommitScheduler {
    /// Spawn the worker thread
    pub fn spawn<F: Flusher>(flusher: Arc<F>, threshold: usize) -> Result<Self> {
        if threshold == 0 {
            return Err(FolioError::Config(
                "commit threshold must be at least 1".to_string(),
            ));
        }

        let (sender, receiver) = unbounded();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker_pending = Arc::clone(&pending);

        let worker = thread::Builder::new()
            .name("folio-commit".to_string())
            .spawn(move || Self::run_worker(flusher, receiver, worker_pending, threshold))?;

        Ok(Self {
            sender: Some(sender),
            worker: Some(worker),
            pending,
            threshold,
        })
    }

    /// Queue a commit without waiting for it
    pub fn enqueue(&self) -> Result<()> {
        self.send(CommitRequest::Commit { reply: None })
    }

    /// Queue a commit and wait for its outcome.
    /// Returns true if this commit triggered a flush.
    pub fn commit(&self) -> Result<bool> {
        let (reply, outcome) = bounded(1);
        self.send(CommitRequest::Commit { reply: Some(reply) })?;
        outcome
            .recv()
            .map_err(|_| FolioError::Scheduler("commit worker exited".to_string()))?
    }

    /// Block until every request queued so far has been processed
    pub fn wait_idle(&self) -> Result<()> {
        let (reply, done) = bounded(1);
        self.send(CommitRequest::Barrier { reply })?;
        done.recv()
            .map_err(|_| FolioError::Scheduler("commit worker exited".to_string()))
    }

    /// Commits counted since the last successful flush
    pub fn pending_writes(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Process everything already queued, then stop the worker
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn send(&self, request: CommitRequest) -> Result<()> {
        match &self.sender {
            Some(sender) => sender
                .send(request)
                .map_err(|_| FolioError::Scheduler("commit queue is closed".to_string())),
            None => Err(FolioError::Scheduler("commit queue is closed".to_string())),
        }
    }

    fn stop(&mut self) -> Result<()> {
        // Closing the channel ends the worker's receive loop
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            worker
                .join()
                .map_err(|_| FolioError::Scheduler("commit worker panicked".to_string()))?;
        }
        Ok(())
    }

    fn run_worker<F: Flusher>(
        flusher: Arc<F>,
        receiver: Receiver<CommitRequest>,
        pending: Arc<AtomicUsize>,
        threshold: usize,
    ) {
        for request in receiver.iter() {
            match request {
                CommitRequest::Commit { reply } => {
                    let outcome = Self::process_commit(flusher.as_ref(), &pending, threshold);
                    match reply {
                        Some(reply) => {
                            // The caller may have given up waiting
                            let _ = reply.send(outcome);
                        }
                        None => {
                            if let Err(e) = outcome {
                                tracing::error!(error = %e, "Background flush failed, will retry on next commit");
                            }
                        }
                    }
                }
                CommitRequest::Barrier { reply } => {
                    let _ = reply.send(());
                }
            }
        }
        tracing::debug!("Commit worker stopped");
    }

    fn process_commit<F: Flusher>(flusher: &F, pending: &AtomicUsize, threshold: usize) -> Result<bool> {
        // Only the worker thread writes the counter
        let writes = pending.load(Ordering::SeqCst) + 1;
        pending.store(writes, Ordering::SeqCst);

        if writes < threshold {
            return Ok(false);
        }

        tracing::debug!(writes, threshold, "Commit threshold reached, flushing");
        flusher.flush()?;
        pending.store(0, Ordering::SeqCst);
        Ok(true)
    }
}

impl Drop for CommitScheduler {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::error!(error = %e, "Failed to stop commit worker");
        }
    }
}

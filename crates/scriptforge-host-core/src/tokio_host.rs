//! Tokio-backed reference implementation of the host scheduling primitives.
//!
//! Hosts that already have a main thread (game servers, editors) implement
//! [`HostAdapter`](crate::HostAdapter) against their own loop. Standalone
//! deployments and tests use [`TokioScheduler`]: a spawned task drains an
//! mpsc channel as the "main context", delayed work rides `tokio::time::sleep`,
//! and async work goes to the blocking pool.

use crate::host::{CancelHandle, Runnable};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Scheduling primitives backed by a tokio runtime.
///
/// Must be created from within a runtime. Dropping the scheduler (or calling
/// [`shutdown`](TokioScheduler::shutdown)) stops the main-context loop after
/// it drains queued work.
pub struct TokioScheduler {
    main_tx: Option<mpsc::UnboundedSender<Runnable>>,
    main_loop: Option<JoinHandle<()>>,
}

impl TokioScheduler {
    /// Spawn the main-context loop and return the scheduler.
    pub fn start() -> Self {
        let (main_tx, mut main_rx) = mpsc::unbounded_channel::<Runnable>();

        let main_loop = tokio::spawn(async move {
            while let Some(work) = main_rx.recv().await {
                // Script work may block; keep it off the reactor threads.
                let result = tokio::task::spawn_blocking(work).await;
                if let Err(e) = result {
                    warn!("main-context work panicked: {}", e);
                }
            }
            debug!("main-context loop stopped");
        });

        Self {
            main_tx: Some(main_tx),
            main_loop: Some(main_loop),
        }
    }

    /// Queue work onto the main context.
    pub fn run_on_main(&self, work: Runnable) {
        match &self.main_tx {
            Some(tx) if tx.send(work).is_ok() => {}
            _ => warn!("main context is shut down; dropping work"),
        }
    }

    /// Run work after `delay` on a timer task.
    pub fn schedule_delayed(&self, work: Runnable, delay: Duration) -> Box<dyn CancelHandle> {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            work();
        });
        Box::new(AbortOnCancel(handle.abort_handle()))
    }

    /// Run work on the shared worker pool.
    pub fn spawn_async(&self, work: Runnable) {
        tokio::task::spawn_blocking(work);
    }

    /// Stop the main-context loop. Queued work already sent is still drained.
    pub fn shutdown(&mut self) {
        // Closing the sender ends the recv loop after the queue drains.
        self.main_tx.take();
        if let Some(handle) = self.main_loop.take() {
            drop(handle);
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct AbortOnCancel(tokio::task::AbortHandle);

impl CancelHandle for AbortOnCancel {
    fn cancel(&self) {
        // Abort lands at the sleep await point, so the work closure either
        // runs to completion or never starts.
        self.0.abort();
    }
}

//! Trigger scheduling for the sync engine.
//!
//! A cycle starts (a) once at service start if connectivity is present,
//! (b) on a connectivity-restored signal, after a jittered delay so a
//! fleet of clients does not stampede a freshly reachable server, and
//! (c) on a fixed periodic timer. The engine itself coalesces triggers,
//! so the tasks here fire freely.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sync_core::backoff::reconnect_delay;
use sync_store::RecordStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::engine::{CycleOutcome, SyncEngine};
use crate::transport::SyncTransport;

/// Owns the spawned trigger tasks and cancels them on teardown.
///
/// Every timer the sync service arms lives in a task registered here, so
/// shutting the scheduler down is sufficient to stop all future triggers.
#[derive(Debug, Default)]
pub struct Scheduler {
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Create an empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a task under this scheduler's lifetime.
    pub fn spawn(&mut self, task: impl Future<Output = ()> + Send + 'static) {
        self.handles.push(tokio::spawn(task));
    }

    /// Number of tasks currently owned.
    pub fn task_count(&self) -> usize {
        self.handles.len()
    }

    /// Abort every owned task.
    pub fn shutdown(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The running sync service: an engine plus its trigger tasks.
///
/// Constructed explicitly by the application's composition root and torn
/// down with [`shutdown`](SyncService::shutdown) - there is no implicit
/// process-wide instance.
pub struct SyncService {
    scheduler: Scheduler,
}

impl SyncService {
    /// Start the trigger tasks for an engine.
    ///
    /// `connectivity` carries the host's online/offline signal: `true`
    /// while the network is reachable. The service only reads it; probing
    /// connectivity is the host's concern.
    pub fn start<S, T>(
        engine: Arc<SyncEngine<S, T>>,
        interval: Duration,
        connectivity: watch::Receiver<bool>,
    ) -> Self
    where
        S: RecordStore + 'static,
        T: SyncTransport + 'static,
    {
        let mut scheduler = Scheduler::new();

        // Startup trigger + connectivity transitions.
        {
            let engine = Arc::clone(&engine);
            let mut connectivity = connectivity.clone();
            scheduler.spawn(async move {
                if *connectivity.borrow() {
                    engine.run_cycle().await;
                } else {
                    engine.note_offline();
                }

                let mut attempt: u32 = 0;
                loop {
                    if connectivity.changed().await.is_err() {
                        return; // host dropped the signal
                    }
                    if !*connectivity.borrow() {
                        engine.note_offline();
                        continue;
                    }

                    tracing::info!("connectivity restored, scheduling sync");
                    tokio::time::sleep(reconnect_delay(attempt)).await;

                    match engine.run_cycle().await {
                        CycleOutcome::Failed { .. } => attempt = attempt.saturating_add(1),
                        CycleOutcome::Coalesced => {}
                        _ => attempt = 0,
                    }
                }
            });
        }

        // Periodic trigger.
        {
            let engine = Arc::clone(&engine);
            let connectivity = connectivity;
            scheduler.spawn(async move {
                tracing::info!("periodic sync started (interval: {:?})", interval);
                let mut timer = tokio::time::interval(interval);
                timer.tick().await; // immediate first tick; startup task covers it

                loop {
                    timer.tick().await;
                    if *connectivity.borrow() {
                        engine.run_cycle().await;
                    } else {
                        tracing::debug!("periodic sync skipped while offline");
                    }
                }
            });
        }

        Self { scheduler }
    }

    /// Stop every trigger task. In-flight store writes are not interrupted
    /// mid-transaction by abort points inside sqlx, and a half-finished
    /// cycle is safe to lose: the next start simply re-collects.
    pub fn shutdown(mut self) {
        self.scheduler.shutdown();
    }
}

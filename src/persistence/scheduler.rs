//! Periodic persistence scheduling.
//!
//! # Responsibilities
//! - Fire a save hook every interval, starting one interval after spawn
//! - Run each save as a detached, monitored task
//! - Stop promptly on shutdown or explicit cancellation
//!
//! # Design Decisions
//! - Cancellation is checked before ticks (`biased` select)
//! - A failing or panicking save is logged; the schedule continues
//! - Late ticks are delayed, never bunched
//! - Lifecycle is published on a watch channel

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::error::SaveError;
use crate::observability::metrics;

pub type SaveFuture = Pin<Box<dyn Future<Output = Result<(), SaveError>> + Send + 'static>>;

/// Work performed on every scheduled fire.
pub trait SaveHook: Send + Sync + 'static {
    fn save(&self) -> SaveFuture;
}

impl<F, Fut> SaveHook for F
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), SaveError>> + Send + 'static,
{
    fn save(&self) -> SaveFuture {
        Box::pin(self())
    }
}

/// Scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Started,
    Ticking { fires: u64 },
    Cancelled,
}

const MIN_INTERVAL: Duration = Duration::from_millis(1);
const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

pub struct PersistenceScheduler {
    interval: Duration,
    hook: Arc<dyn SaveHook>,
}

impl PersistenceScheduler {
    pub fn new(interval: Duration, hook: Arc<dyn SaveHook>) -> Self {
        Self {
            interval: interval.clamp(MIN_INTERVAL, MAX_INTERVAL),
            hook,
        }
    }

    /// Effective interval, clamped to between one millisecond and one day.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start the schedule. It stops when `shutdown` fires or the handle
    /// is cancelled or dropped.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> SchedulerHandle {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(SchedulerState::Idle);
        let fires = Arc::new(AtomicU64::new(0));

        let task = tokio::spawn(self.run(shutdown, cancel_rx, state_tx, fires.clone()));

        SchedulerHandle {
            cancel: Some(cancel_tx),
            task: Some(task),
            state: state_rx,
            fires,
        }
    }

    async fn run(
        self,
        mut shutdown: broadcast::Receiver<()>,
        mut cancel: oneshot::Receiver<()>,
        state: watch::Sender<SchedulerState>,
        fires: Arc<AtomicU64>,
    ) {
        tracing::info!(interval = ?self.interval, "Persistence scheduler starting");
        state.send_replace(SchedulerState::Started);

        let Some(first) = Instant::now().checked_add(self.interval) else {
            tracing::error!(interval = ?self.interval, "Persistence interval out of range, scheduler not started");
            state.send_replace(SchedulerState::Cancelled);
            return;
        };
        let mut ticker = time::interval_at(first, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("Persistence scheduler received shutdown signal, exiting loop");
                    break;
                }
                _ = &mut cancel => {
                    tracing::info!("Persistence scheduler cancelled");
                    break;
                }
                _ = ticker.tick() => {
                    let fire = fires.fetch_add(1, Ordering::SeqCst) + 1;
                    state.send_replace(SchedulerState::Ticking { fires: fire });
                    self.fire(fire);
                }
            }
        }

        state.send_replace(SchedulerState::Cancelled);
    }

    fn fire(&self, fire: u64) {
        let hook = self.hook.clone();
        let save = tokio::spawn(async move { hook.save().await });

        tokio::spawn(async move {
            match save.await {
                Ok(Ok(())) => {
                    metrics::record_persistence_save("ok");
                    tracing::debug!(fire, "Persistence save completed");
                }
                Ok(Err(e)) => {
                    metrics::record_persistence_save("error");
                    tracing::warn!(fire, error = %e, "Persistence save failed");
                }
                Err(e) if e.is_panic() => {
                    metrics::record_persistence_save("panic");
                    tracing::error!(fire, "Persistence save panicked");
                }
                Err(_) => {
                    metrics::record_persistence_save("cancelled");
                    tracing::debug!(fire, "Persistence save cancelled");
                }
            }
        });
    }
}

/// Control over a running schedule. Dropping it cancels the schedule.
#[derive(Debug)]
pub struct SchedulerHandle {
    cancel: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    state: watch::Receiver<SchedulerState>,
    fires: Arc<AtomicU64>,
}

impl SchedulerHandle {
    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.clone()
    }

    /// Number of fires so far.
    pub fn fires(&self) -> u64 {
        self.fires.load(Ordering::SeqCst)
    }

    /// Request cancellation without waiting.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
    }

    /// Cancel and wait for the loop to exit. No fire starts after this returns.
    pub async fn shutdown(mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Persistence scheduler task failed");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;

    fn counting_hook() -> (Arc<AtomicU64>, Arc<dyn SaveHook>) {
        let count = Arc::new(AtomicU64::new(0));
        let hook_count = count.clone();
        let hook = move || {
            let count = hook_count.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        };
        let hook: Arc<dyn SaveHook> = Arc::new(hook);
        (count, hook)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_fire_after_one_interval() {
        let shutdown = Shutdown::new();
        let (count, hook) = counting_hook();
        let handle = PersistenceScheduler::new(Duration::from_secs(1), hook).spawn(shutdown.subscribe());

        time::sleep(Duration::from_millis(999)).await;
        assert_eq!(handle.fires(), 0);

        time::sleep(Duration::from_millis(501)).await;
        assert_eq!(handle.fires(), 1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(handle.state(), SchedulerState::Ticking { fires: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_fire_after_cancellation() {
        let shutdown = Shutdown::new();
        let (count, hook) = counting_hook();
        let handle = PersistenceScheduler::new(Duration::from_secs(1), hook).spawn(shutdown.subscribe());

        time::sleep(Duration::from_millis(2500)).await;
        let before = handle.fires();
        assert_eq!(before, 2);

        let mut state = handle.subscribe();
        handle.shutdown().await;
        assert_eq!(*state.borrow_and_update(), SchedulerState::Cancelled);

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_broadcast_stops_schedule() {
        let shutdown = Shutdown::new();
        let (count, hook) = counting_hook();
        let handle = PersistenceScheduler::new(Duration::from_secs(1), hook).spawn(shutdown.subscribe());
        let mut state = handle.subscribe();

        shutdown.trigger();
        state
            .wait_for(|s| *s == SchedulerState::Cancelled)
            .await
            .unwrap();

        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_and_panics_do_not_stop_schedule() {
        let shutdown = Shutdown::new();
        let calls = Arc::new(AtomicU64::new(0));
        let hook_calls = calls.clone();
        let hook = move || {
            let n = hook_calls.fetch_add(1, Ordering::SeqCst);
            async move {
                match n {
                    0 => Err(SaveError::Other("disk full".into())),
                    1 => panic!("save exploded"),
                    _ => Ok(()),
                }
            }
        };
        let handle =
            PersistenceScheduler::new(Duration::from_secs(1), Arc::new(hook)).spawn(shutdown.subscribe());

        time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(handle.fires(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_interval_is_clamped() {
        let shutdown = Shutdown::new();
        let (count, hook) = counting_hook();
        let scheduler = PersistenceScheduler::new(Duration::MAX, hook);
        assert_eq!(scheduler.interval(), MAX_INTERVAL);

        let handle = scheduler.spawn(shutdown.subscribe());
        let mut state = handle.subscribe();
        state
            .wait_for(|s| *s == SchedulerState::Started)
            .await
            .unwrap();

        time::sleep(MAX_INTERVAL + Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        handle.shutdown().await;
        assert_eq!(*state.borrow_and_update(), SchedulerState::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_cancels() {
        let shutdown = Shutdown::new();
        let (count, hook) = counting_hook();
        let handle = PersistenceScheduler::new(Duration::from_secs(1), hook).spawn(shutdown.subscribe());
        let mut state = handle.subscribe();

        drop(handle);
        state
            .wait_for(|s| *s == SchedulerState::Cancelled)
            .await
            .unwrap();
        time::sleep(Duration::from_secs(3)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}

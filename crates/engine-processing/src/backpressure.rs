//! Bounds the number of asynchronous write batches a partition keeps in flight.

use crate::config::{BackpressureConfig, BackpressureMode};
use std::sync::{
    Arc, Mutex, MutexGuard,
    atomic::{AtomicUsize, Ordering},
};
use tokio::{
    sync::{OwnedSemaphorePermit, Semaphore},
    task::{JoinError, JoinHandle},
};
use tracing::{debug, trace};

/// Outstanding write tasks of one partition.
///
/// The in-flight count is maintained by [`InFlight`] guards moved into each
/// task, so it drops as soon as a task finishes whatever its outcome. Finished
/// handles are only removed on [`PendingWriteSet::reap`] and
/// [`PendingWriteSet::drain`].
#[derive(Debug, Default)]
pub struct PendingWriteSet {
    handles: Mutex<Vec<JoinHandle<()>>>,
    in_flight: Arc<AtomicUsize>,
    peak: AtomicUsize,
}

/// Decrements the in-flight count when dropped.
#[derive(Debug)]
pub struct InFlight {
    counter: Arc<AtomicUsize>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

impl PendingWriteSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts a write as in flight. Call before spawning the task that owns
    /// the returned guard.
    pub fn begin(&self) -> InFlight {
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak.fetch_max(now, Ordering::Relaxed);
        InFlight {
            counter: Arc::clone(&self.in_flight),
        }
    }

    pub fn track(&self, handle: JoinHandle<()>) {
        self.handles().push(handle);
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Highest in-flight count observed so far.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::Relaxed)
    }

    /// Handles still held, finished or not.
    pub fn tracked(&self) -> usize {
        self.handles().len()
    }

    /// Drops handles of finished tasks and returns how many were removed.
    pub fn reap(&self) -> usize {
        let mut handles = self.handles();
        let before = handles.len();
        handles.retain(|h| !h.is_finished());
        before - handles.len()
    }

    /// Waits for every tracked task. All tasks are awaited even when one of
    /// them failed; the first failure is returned.
    pub async fn drain(&self) -> Result<usize, JoinError> {
        let mut joined = 0;
        let mut first_error = None;

        loop {
            let handles = std::mem::take(&mut *self.handles());
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                joined += 1;
                if let Err(e) = handle.await {
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(joined),
        }
    }

    fn handles(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Admission control in front of asynchronous dispatch.
///
/// `soft` waits a bounded time for a free slot and then lets the write through
/// without one, so the ceiling can be exceeded under sustained load. `hard`
/// waits until a slot frees.
#[derive(Debug)]
pub struct BackpressureGate {
    slots: Arc<Semaphore>,
    max_pending: usize,
    config: BackpressureConfig,
    pending: PendingWriteSet,
}

impl BackpressureGate {
    pub fn new(max_pending: usize, config: BackpressureConfig) -> Self {
        let max_pending = max_pending.max(1);
        Self {
            slots: Arc::new(Semaphore::new(max_pending)),
            max_pending,
            config,
            pending: PendingWriteSet::new(),
        }
    }

    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    pub fn pending(&self) -> &PendingWriteSet {
        &self.pending
    }

    /// Waits for room to dispatch one more write. The returned permit, when
    /// present, must live as long as the write it admits.
    pub async fn admit(&self) -> Option<OwnedSemaphorePermit> {
        let reaped = self.pending.reap();
        if reaped > 0 {
            trace!(reaped, "Reaped completed writes");
        }

        if let Ok(permit) = Arc::clone(&self.slots).try_acquire_owned() {
            return Some(permit);
        }

        debug!(
            in_flight = self.pending.in_flight(),
            max_pending = self.max_pending,
            mode = ?self.config.mode,
            "Backpressure engaged"
        );

        match self.config.mode {
            BackpressureMode::Hard => Arc::clone(&self.slots).acquire_owned().await.ok(),
            BackpressureMode::Soft => {
                let budget = self.config.wait_budget();
                match tokio::time::timeout(budget, Arc::clone(&self.slots).acquire_owned()).await
                {
                    Ok(permit) => permit.ok(),
                    Err(_) => {
                        self.pending.reap();
                        debug!(
                            wait_ms = budget.as_millis() as u64,
                            in_flight = self.pending.in_flight(),
                            "Backpressure wait exhausted, dispatching over the limit"
                        );
                        None
                    }
                }
            }
        }
    }

    pub async fn drain(&self) -> Result<usize, JoinError> {
        self.pending.drain().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn soft(retries: u32, delay_ms: u64) -> BackpressureConfig {
        BackpressureConfig {
            mode: BackpressureMode::Soft,
            max_retries: retries,
            retry_delay: Duration::from_millis(delay_ms),
        }
    }

    #[tokio::test]
    async fn in_flight_follows_task_completion() {
        let set = PendingWriteSet::new();
        let (tx, rx) = oneshot::channel::<()>();

        let guard = set.begin();
        set.track(tokio::spawn(async move {
            let _guard = guard;
            let _ = rx.await;
        }));
        assert_eq!(set.in_flight(), 1);

        tx.send(()).unwrap();
        assert_eq!(set.drain().await.unwrap(), 1);
        assert_eq!(set.in_flight(), 0);
        assert_eq!(set.tracked(), 0);
        assert_eq!(set.peak_in_flight(), 1);
    }

    #[tokio::test]
    async fn failed_task_still_releases_in_flight() {
        let set = PendingWriteSet::new();
        let guard = set.begin();
        set.track(tokio::spawn(async move {
            let _guard = guard;
            panic!("write exploded");
        }));

        assert!(set.drain().await.is_err());
        assert_eq!(set.in_flight(), 0);
    }

    #[tokio::test]
    async fn reap_removes_only_finished() {
        let set = PendingWriteSet::new();
        let (tx, rx) = oneshot::channel::<()>();

        set.track(tokio::spawn(async {}));
        set.track(tokio::spawn(async move {
            let _ = rx.await;
        }));
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(set.reap(), 1);
        assert_eq!(set.tracked(), 1);
        tx.send(()).unwrap();
        set.drain().await.unwrap();
    }

    #[tokio::test]
    async fn soft_gate_gives_up_after_budget() {
        let gate = BackpressureGate::new(1, soft(3, 10));
        let held = gate.admit().await;
        assert!(held.is_some());

        let started = std::time::Instant::now();
        let second = gate.admit().await;
        assert!(second.is_none());
        assert!(started.elapsed() >= Duration::from_millis(25));
    }

    #[tokio::test]
    async fn hard_gate_waits_for_release() {
        let gate = Arc::new(BackpressureGate::new(
            1,
            BackpressureConfig {
                mode: BackpressureMode::Hard,
                ..BackpressureConfig::default()
            },
        ));
        let held = gate.admit().await.unwrap();

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.admit().await.is_some() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        assert!(waiter.await.unwrap());
    }
}

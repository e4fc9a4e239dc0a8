//! Background cache warmup
//!
//! Pre-fetches a fixed matrix of sessions into the provider cache once per
//! process, on a pool of workers pulling from a shared queue. The caller gets
//! control back immediately; per-task failures are logged and collected, never
//! propagated.

use crate::error::{ErrorKind, WarmupError};
use crate::event::{DashboardEvent, EventBus};
use crate::fetch::SessionFetcher;
use crate::models::{LoadOptions, SessionKey, SessionKind};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// Observer of warmup progress. Errors and panics are swallowed.
pub type ProgressCallback = Arc<dyn Fn(WarmupProgress) -> anyhow::Result<()> + Send + Sync>;

/// Tasks finished so far out of the batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WarmupProgress {
    pub completed: usize,
    pub total: usize,
}

/// Configuration for the warmup scheduler
#[derive(Debug, Clone)]
pub struct WarmupConfig {
    /// Worker pool size
    pub max_parallel: usize,

    /// Time budget of a single session fetch
    pub per_task_timeout: Duration,

    /// Pause before the first fetch, so the caller gets going first
    pub start_delay: Duration,

    /// Abort a fetch that ran out of time instead of leaving it running
    pub abort_on_timeout: bool,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            max_parallel: 6,
            per_task_timeout: Duration::from_secs(60),
            start_delay: Duration::ZERO,
            abort_on_timeout: false,
        }
    }
}

/// A key picked up by a worker
#[derive(Debug, Clone)]
pub struct FetchTask {
    pub key: SessionKey,
    pub slot: usize,
}

/// Result of one task, written once by the worker that ran it
#[derive(Debug)]
pub struct TaskOutcome {
    pub key: SessionKey,
    pub slot: usize,
    pub result: Result<(), WarmupError>,
    pub elapsed: Duration,
}

/// Summary of a drained batch
#[derive(Debug, Default)]
pub struct WarmupReport {
    pub total: usize,
    pub succeeded: usize,
    pub failures: Vec<WarmupError>,
    /// Progress notifications the observer failed or panicked on
    pub observer_failures: usize,
}

impl WarmupReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed_keys(&self) -> impl Iterator<Item = &SessionKey> {
        self.failures.iter().map(|e| e.key())
    }
}

/// Handle on a running batch
///
/// Dropping it leaves the batch running.
#[derive(Debug)]
pub struct WarmupHandle {
    total: usize,
    inner: JoinHandle<WarmupReport>,
}

impl WarmupHandle {
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Stop the batch driver and its workers
    ///
    /// Fetches already spawned keep running to completion.
    pub fn abort(&self) {
        self.inner.abort();
    }

    /// Wait for the batch to drain
    pub async fn wait(self) -> Result<WarmupReport, JoinError> {
        self.inner.await
    }
}

/// Cartesian product of seasons and rounds for one session kind
pub fn season_matrix<S, R>(seasons: S, rounds: R, kind: SessionKind) -> Vec<SessionKey>
where
    S: IntoIterator<Item = i32>,
    R: IntoIterator<Item = u32> + Clone,
{
    seasons
        .into_iter()
        .flat_map(|season| {
            rounds
                .clone()
                .into_iter()
                .map(move |round| SessionKey::new(season, round, kind))
        })
        .collect()
}

/// Submits the warmup batch, at most once per guard
pub struct WarmupScheduler {
    fetcher: SessionFetcher,
    config: WarmupConfig,
    started: Arc<AtomicBool>,
    observer: Option<ProgressCallback>,
    events: EventBus,
}

impl WarmupScheduler {
    pub fn new(fetcher: SessionFetcher, config: WarmupConfig) -> Self {
        Self {
            fetcher,
            config,
            started: Arc::new(AtomicBool::new(false)),
            observer: None,
            events: EventBus::default_capacity(),
        }
    }

    /// Share a one-shot guard with other schedulers
    pub fn with_guard(mut self, started: Arc<AtomicBool>) -> Self {
        self.started = started;
        self
    }

    pub fn with_observer(mut self, observer: ProgressCallback) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn config(&self) -> &WarmupConfig {
        &self.config
    }

    /// Whether the guard has been consumed
    pub fn has_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Submit `keys` with the configured pool size and timeout
    pub fn start(&self, keys: Vec<SessionKey>) -> Option<WarmupHandle> {
        self.start_warmup(keys, self.config.max_parallel, self.config.per_task_timeout)
    }

    /// Submit the batch and return immediately
    ///
    /// Returns `None` when the guard was already consumed, the batch is empty,
    /// or no tokio runtime is available (the guard is released in that case).
    pub fn start_warmup(
        &self,
        keys: Vec<SessionKey>,
        max_parallel: usize,
        per_task_timeout: Duration,
    ) -> Option<WarmupHandle> {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Warmup already started, ignoring");
            return None;
        }

        if keys.is_empty() {
            debug!("Empty warmup batch");
            return None;
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(error = %e, "No async runtime, warmup skipped");
                self.started.store(false, Ordering::SeqCst);
                return None;
            }
        };

        let max_parallel = if max_parallel == 0 {
            warn!("Warmup max_parallel of 0, using 1");
            1
        } else {
            max_parallel
        };

        let per_task_timeout = if per_task_timeout.is_zero() {
            warn!(
                default_secs = self.config.per_task_timeout.as_secs_f64(),
                "Warmup timeout of 0, using default"
            );
            self.config.per_task_timeout
        } else {
            per_task_timeout
        };

        let total = keys.len();
        let workers = max_parallel.min(total);
        info!(
            total,
            workers,
            timeout_secs = per_task_timeout.as_secs_f64(),
            "Starting cache warmup"
        );
        self.events.publish(DashboardEvent::WarmupStarted { total });

        let batch = Batch {
            keys,
            workers,
            per_task_timeout,
            start_delay: self.config.start_delay,
            abort_on_timeout: self.config.abort_on_timeout,
            fetcher: self.fetcher.clone(),
            observer: self.observer.clone(),
            events: self.events.clone(),
        };

        Some(WarmupHandle {
            total,
            inner: runtime.spawn(batch.run()),
        })
    }
}

/// Everything the detached batch driver owns
struct Batch {
    keys: Vec<SessionKey>,
    workers: usize,
    per_task_timeout: Duration,
    start_delay: Duration,
    abort_on_timeout: bool,
    fetcher: SessionFetcher,
    observer: Option<ProgressCallback>,
    events: EventBus,
}

impl Batch {
    async fn run(self) -> WarmupReport {
        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }

        let total = self.keys.len();
        let queue = Arc::new(Mutex::new(self.keys.into_iter().collect::<VecDeque<_>>()));
        let (tx, mut rx) = mpsc::unbounded_channel();

        // Dropped with the driver, which aborts the workers
        let mut workers = JoinSet::new();
        for slot in 0..self.workers {
            workers.spawn(run_worker(
                slot,
                queue.clone(),
                self.fetcher.clone(),
                self.per_task_timeout,
                self.abort_on_timeout,
                tx.clone(),
            ));
        }
        drop(tx);

        let mut report = WarmupReport {
            total,
            ..Default::default()
        };
        let mut completed = 0;

        while let Some(outcome) = rx.recv().await {
            completed += 1;

            match outcome.result {
                Ok(()) => {
                    report.succeeded += 1;
                    debug!(
                        key = %outcome.key,
                        slot = outcome.slot,
                        elapsed_ms = outcome.elapsed.as_millis() as u64,
                        "Warmup task done"
                    );
                }
                Err(e) => {
                    warn!(
                        key = %outcome.key,
                        slot = outcome.slot,
                        kind = ?e.kind(),
                        error = %e,
                        "Warmup task failed"
                    );
                    self.events.publish(DashboardEvent::WarmupTaskFailed {
                        key: outcome.key,
                        message: e.to_string(),
                    });
                    report.failures.push(e);
                }
            }

            let progress = WarmupProgress { completed, total };
            if notify(self.observer.as_ref(), progress) == Some(ErrorKind::Callback) {
                report.observer_failures += 1;
            }
            self.events.publish(DashboardEvent::WarmupProgress { completed, total });
        }

        while workers.join_next().await.is_some() {}

        info!(
            total,
            succeeded = report.succeeded,
            failed = report.failed(),
            observer_failures = report.observer_failures,
            "Cache warmup finished"
        );
        self.events.publish(DashboardEvent::WarmupFinished {
            succeeded: report.succeeded,
            failed: report.failed(),
        });

        report
    }
}

async fn run_worker(
    slot: usize,
    queue: Arc<Mutex<VecDeque<SessionKey>>>,
    fetcher: SessionFetcher,
    per_task_timeout: Duration,
    abort_on_timeout: bool,
    tx: mpsc::UnboundedSender<TaskOutcome>,
) {
    loop {
        let Some(key) = queue.lock().pop_front() else {
            break;
        };

        let outcome = run_task(
            &fetcher,
            FetchTask { key, slot },
            per_task_timeout,
            abort_on_timeout,
        )
        .await;

        if tx.send(outcome).is_err() {
            break;
        }
    }
}

async fn run_task(
    fetcher: &SessionFetcher,
    task: FetchTask,
    per_task_timeout: Duration,
    abort_on_timeout: bool,
) -> TaskOutcome {
    let start = Instant::now();

    // Own task, so a panic or a hang stays contained
    let mut fetch = {
        let fetcher = fetcher.clone();
        let key = task.key.clone();
        tokio::spawn(async move {
            fetcher
                .fetch(&key, LoadOptions::results_only())
                .await
                .map(|_| ())
        })
    };

    let result = match tokio::time::timeout(per_task_timeout, &mut fetch).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(e))) => Err(WarmupError::Fetch(e)),
        Ok(Err(e)) => Err(WarmupError::Panicked {
            key: task.key.clone(),
            message: panic_message(e),
        }),
        Err(_) => {
            if abort_on_timeout {
                fetch.abort();
            }
            Err(WarmupError::Timeout {
                key: task.key.clone(),
                after: per_task_timeout,
            })
        }
    };

    TaskOutcome {
        key: task.key,
        slot: task.slot,
        result,
        elapsed: start.elapsed(),
    }
}

fn panic_message(error: JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    let payload = error.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Run the observer, containing its failures; returns the failure class if any
fn notify(observer: Option<&ProgressCallback>, progress: WarmupProgress) -> Option<ErrorKind> {
    let observer = observer?;

    match std::panic::catch_unwind(AssertUnwindSafe(|| observer(progress))) {
        Ok(Ok(())) => None,
        Ok(Err(e)) => {
            debug!(kind = ?ErrorKind::Callback, error = %e, "Warmup progress callback failed");
            Some(ErrorKind::Callback)
        }
        Err(_) => {
            debug!(kind = ?ErrorKind::Callback, "Warmup progress callback panicked");
            Some(ErrorKind::Callback)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_season_matrix() {
        let keys = season_matrix([2021, 2022], 1..=3, SessionKind::Race);

        assert_eq!(keys.len(), 6);
        assert_eq!(keys[0], SessionKey::race(2021, 1));
        assert_eq!(keys[5], SessionKey::race(2022, 3));
        assert!(season_matrix(Vec::new(), 1..=3, SessionKind::Race).is_empty());
    }

    #[test]
    fn test_default_config() {
        let config = WarmupConfig::default();
        assert_eq!(config.max_parallel, 6);
        assert_eq!(config.per_task_timeout, Duration::from_secs(60));
        assert!(!config.abort_on_timeout);
    }

    #[test]
    fn test_notify_swallows_failures() {
        let failing: ProgressCallback =
            Arc::new(|_: WarmupProgress| -> anyhow::Result<()> { anyhow::bail!("display gone") });
        let panicking: ProgressCallback =
            Arc::new(|_: WarmupProgress| -> anyhow::Result<()> { panic!("observer bug") });
        let progress = WarmupProgress {
            completed: 1,
            total: 2,
        };

        let fine: ProgressCallback = Arc::new(|_: WarmupProgress| -> anyhow::Result<()> { Ok(()) });

        assert_eq!(notify(Some(&failing), progress), Some(ErrorKind::Callback));
        assert_eq!(notify(Some(&panicking), progress), Some(ErrorKind::Callback));
        assert_eq!(notify(Some(&fine), progress), None);
        assert_eq!(notify(None, progress), None);
    }

    #[tokio::test]
    async fn test_panic_message() {
        let err = tokio::spawn(async { panic!("boom") }).await.unwrap_err();
        assert_eq!(panic_message(err), "boom");

        let err = tokio::spawn(async { panic!("{}", String::from("formatted")) })
            .await
            .unwrap_err();
        assert_eq!(panic_message(err), "formatted");
    }
}

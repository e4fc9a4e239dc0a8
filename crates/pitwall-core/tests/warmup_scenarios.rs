//! Warmup batch behaviour against a scripted remote

mod common;

use common::{cached_provider, uncached_provider, FakeRemote};
use parking_lot::Mutex;
use pitwall_core::cache::{BundlePart, SessionCoord};
use pitwall_core::warmup::{season_matrix, ProgressCallback, WarmupConfig};
use pitwall_core::{
    DashboardEvent, ErrorKind, EventBus, SessionFetcher, SessionKey, SessionKind, WarmupError,
    WarmupProgress, WarmupScheduler,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::tempdir;

fn races(rounds: std::ops::RangeInclusive<u32>) -> Vec<SessionKey> {
    season_matrix([2024], rounds, SessionKind::Race)
}

fn scheduler_for(remote: &Arc<FakeRemote>) -> WarmupScheduler {
    WarmupScheduler::new(
        SessionFetcher::new(uncached_provider(remote)),
        WarmupConfig::default(),
    )
}

#[tokio::test(start_paused = true)]
async fn test_start_returns_while_every_fetch_hangs() {
    let remote = Arc::new(FakeRemote::new().hanging(1).hanging(2).hanging(3));
    let scheduler = scheduler_for(&remote);

    let started = Instant::now();
    let handle = scheduler
        .start_warmup(races(1..=3), 2, Duration::from_secs(5))
        .expect("batch submitted");
    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(!handle.is_finished());
    assert_eq!(handle.total(), 3);

    let report = handle.wait().await.unwrap();
    assert_eq!(report.succeeded, 0);
    assert_eq!(report.failed(), 3);
    for failure in &report.failures {
        assert_eq!(failure.kind(), ErrorKind::Timeout);
        assert!(matches!(
            failure,
            WarmupError::Timeout { after, .. } if *after == Duration::from_secs(5)
        ));
    }
}

#[tokio::test]
async fn test_repeated_start_submits_one_batch() {
    let remote = Arc::new(FakeRemote::new());
    let scheduler = scheduler_for(&remote);

    let handles: Vec<_> = (0..5)
        .filter_map(|_| scheduler.start_warmup(races(1..=3), 3, Duration::from_secs(5)))
        .collect();
    assert_eq!(handles.len(), 1);

    for handle in handles {
        handle.wait().await.unwrap();
    }
    // Uncached provider: any second batch would have hit the remote again
    assert_eq!(remote.result_calls(), 3);
}

#[tokio::test]
async fn test_shared_guard_spans_schedulers() {
    let remote = Arc::new(FakeRemote::new());
    let guard = Arc::new(AtomicBool::new(false));
    let first = scheduler_for(&remote).with_guard(guard.clone());
    let second = scheduler_for(&remote).with_guard(guard.clone());

    let handle = first.start(races(1..=2)).expect("first batch");
    assert!(second.start(races(3..=4)).is_none());
    assert!(second.has_started());

    handle.wait().await.unwrap();
    assert_eq!(remote.calls_for(3), 0);
}

#[tokio::test]
async fn test_failing_task_does_not_affect_siblings() {
    let remote = Arc::new(FakeRemote::new().failing(3));
    let scheduler = scheduler_for(&remote);

    let report = scheduler
        .start_warmup(races(1..=5), 2, Duration::from_secs(5))
        .expect("batch submitted")
        .wait()
        .await
        .unwrap();

    assert_eq!(report.total, 5);
    assert_eq!(report.succeeded, 4);
    let failed: Vec<_> = report.failed_keys().cloned().collect();
    assert_eq!(failed, vec![SessionKey::race(2024, 3)]);
    assert_eq!(report.failures[0].kind(), ErrorKind::Load);
    // No retry
    assert_eq!(remote.calls_for(3), 1);
}

#[tokio::test]
async fn test_unresolvable_round_fails_alone_and_others_are_cached() {
    // Round 2 is not on the calendar
    let remote = Arc::new(FakeRemote::new().with_rounds(&[1, 3]));
    let dir = tempdir().unwrap();
    let (provider, cache) = cached_provider(&remote, dir.path());
    let scheduler = WarmupScheduler::new(SessionFetcher::new(provider), WarmupConfig::default());

    let started = Instant::now();
    let handle = scheduler.start_warmup(
        vec![SessionKey::race(2024, 1), SessionKey::race(2024, 2)],
        2,
        Duration::from_secs(5),
    );
    assert!(started.elapsed() < Duration::from_millis(500));

    let report = handle.expect("batch submitted").wait().await.unwrap();
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed(), 1);
    assert_eq!(report.failures[0].key(), &SessionKey::race(2024, 2));
    assert_eq!(report.failures[0].kind(), ErrorKind::Resolution);

    let round = |r| SessionCoord::new(2024, r, SessionKind::Race);
    assert!(cache.contains(round(1), BundlePart::Results).unwrap());
    assert!(!cache.contains(round(2), BundlePart::Results).unwrap());
}

#[tokio::test]
async fn test_panicking_fetch_is_contained() {
    let remote = Arc::new(FakeRemote::new().panicking(2));
    let scheduler = scheduler_for(&remote);

    let report = scheduler
        .start_warmup(races(1..=3), 3, Duration::from_secs(5))
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(report.succeeded, 2);
    match &report.failures[..] {
        [WarmupError::Panicked { key, message }] => {
            assert_eq!(key, &SessionKey::race(2024, 2));
            assert!(message.contains("parser blew up"));
        }
        other => panic!("unexpected failures: {:?}", other),
    }
}

#[tokio::test]
async fn test_observer_failures_are_swallowed() {
    let remote = Arc::new(FakeRemote::new());
    let seen = Arc::new(Mutex::new(Vec::new()));

    let observer: ProgressCallback = {
        let seen = seen.clone();
        Arc::new(move |progress: WarmupProgress| {
            seen.lock().push(progress.completed);
            match progress.completed {
                2 => panic!("progress widget gone"),
                n if n % 2 == 1 => anyhow::bail!("display closed"),
                _ => Ok(()),
            }
        })
    };

    let scheduler = scheduler_for(&remote).with_observer(observer);
    let report = scheduler
        .start_warmup(races(1..=5), 2, Duration::from_secs(5))
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert_eq!(report.succeeded, 5);
    assert!(report.is_clean());
    // Strictly increasing, one call per task
    assert_eq!(*seen.lock(), vec![1, 2, 3, 4, 5]);
    // 1, 3, 5 errored and 2 panicked
    assert_eq!(report.observer_failures, 4);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_leaves_fetch_running_unless_aborting() {
    for abort_on_timeout in [false, true] {
        let remote = Arc::new(FakeRemote::new().hanging(2));
        let provider = uncached_provider(&remote);
        let config = WarmupConfig {
            abort_on_timeout,
            ..WarmupConfig::default()
        };
        let scheduler = WarmupScheduler::new(SessionFetcher::new(provider.clone()), config);

        let report = scheduler
            .start_warmup(races(1..=3), 3, Duration::from_secs(2))
            .unwrap()
            .wait()
            .await
            .unwrap();

        assert_eq!(report.succeeded, 2);
        assert!(matches!(report.failures[..], [WarmupError::Timeout { .. }]));

        // Let the runtime reap aborted tasks
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Test + scheduler, plus the detached fetch when not aborted
        let expected = if abort_on_timeout { 2 } else { 3 };
        assert_eq!(Arc::strong_count(&provider), expected);
    }
}

#[tokio::test(start_paused = true)]
async fn test_zero_timeout_falls_back_to_configured_default() {
    let remote = Arc::new(FakeRemote::new().hanging(1));
    let config = WarmupConfig {
        per_task_timeout: Duration::from_secs(30),
        ..WarmupConfig::default()
    };
    let scheduler = WarmupScheduler::new(SessionFetcher::new(uncached_provider(&remote)), config);

    let report = scheduler
        .start_warmup(races(1..=1), 0, Duration::ZERO)
        .unwrap()
        .wait()
        .await
        .unwrap();

    assert!(matches!(
        &report.failures[..],
        [WarmupError::Timeout { after, .. }] if *after == Duration::from_secs(30)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_start_delay_runs_in_background() {
    let remote = Arc::new(FakeRemote::new());
    let config = WarmupConfig {
        start_delay: Duration::from_secs(3),
        ..WarmupConfig::default()
    };
    let scheduler = WarmupScheduler::new(SessionFetcher::new(uncached_provider(&remote)), config);

    let handle = scheduler.start(races(1..=2)).unwrap();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(remote.result_calls(), 0);

    let report = handle.wait().await.unwrap();
    assert_eq!(report.succeeded, 2);
    assert_eq!(remote.result_calls(), 2);
}

#[tokio::test]
async fn test_empty_batch_consumes_guard() {
    let remote = Arc::new(FakeRemote::new());
    let scheduler = scheduler_for(&remote);

    assert!(scheduler.start(Vec::new()).is_none());
    assert!(scheduler.has_started());
    assert!(scheduler.start(races(1..=2)).is_none());
    assert_eq!(remote.result_calls(), 0);
}

#[test]
fn test_without_runtime_nothing_is_submitted() {
    let remote = Arc::new(FakeRemote::new());
    let scheduler = scheduler_for(&remote);

    assert!(scheduler.start(races(1..=2)).is_none());
    // Guard released, a later call from inside a runtime may still start
    assert!(!scheduler.has_started());
}

#[tokio::test]
async fn test_progress_events_published() {
    let remote = Arc::new(FakeRemote::new().failing(2));
    let events = EventBus::default_capacity();
    let mut rx = events.subscribe();
    let finished = Arc::new(AtomicUsize::new(0));

    let scheduler = scheduler_for(&remote).with_events(events);
    scheduler
        .start_warmup(races(1..=3), 2, Duration::from_secs(5))
        .unwrap()
        .wait()
        .await
        .unwrap();

    let mut progress = Vec::new();
    while let Ok(event) = rx.try_recv() {
        match event {
            DashboardEvent::WarmupStarted { total } => assert_eq!(total, 3),
            DashboardEvent::WarmupProgress { completed, .. } => progress.push(completed),
            DashboardEvent::WarmupTaskFailed { key, .. } => {
                assert_eq!(key, SessionKey::race(2024, 2))
            }
            DashboardEvent::WarmupFinished { succeeded, failed } => {
                assert_eq!((succeeded, failed), (2, 1));
                finished.fetch_add(1, Ordering::SeqCst);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    assert_eq!(progress, vec![1, 2, 3]);
    assert_eq!(finished.load(Ordering::SeqCst), 1);
}

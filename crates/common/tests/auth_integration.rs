//! Integration tests for the session layer
//!
//! Covers credential persistence, single-flight refresh under real
//! parallelism, and the proactive expiry monitor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use routelink_common::auth::{
    CredentialBackend, CredentialStore, FileBackend, RefreshCoordinator, RefreshSettings,
    RefreshState, SessionEvent, TickOutcome,
};
use routelink_common::testing::{fixtures, poll_until, MemoryBackend, MockClock, MockRefresher};
use routelink_common::ClientError;

/// Route client logs to the test harness output.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn settings() -> RefreshSettings {
    RefreshSettings {
        max_retries: 2,
        base_delay: Duration::from_millis(1),
        proactive_window: Duration::from_secs(5 * 60),
        monitor_interval: Duration::from_millis(10),
    }
}

/// Verifies the store round trip through the durable record.
///
/// # Test Steps
/// 1. `set` a token set and read it back
/// 2. Reopen a second store on the same file and read it again
/// 3. `clear` twice; only the first clear notifies
#[tokio::test]
async fn test_credential_store_round_trip() {
    init_tracing();
    let dir = tempfile::tempdir().expect("tempdir");
    let backend: Arc<dyn CredentialBackend> = Arc::new(FileBackend::new(dir.path().join("session.json")));
    let clock = MockClock::new();
    let tokens = fixtures::session(&clock, "access-0", Duration::from_secs(3600));

    let store = CredentialStore::open(Arc::clone(&backend)).await.expect("open");
    store.set(tokens.clone()).await.expect("set");
    assert_eq!(store.get(), Some(tokens.clone()));

    let reopened = CredentialStore::open(Arc::clone(&backend)).await.expect("reopen");
    assert_eq!(reopened.get(), Some(tokens));

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&events);
    let _subscription = reopened.subscribe(move |event| sink.lock().push(event.clone()));

    assert!(reopened.clear().await.expect("first clear"));
    assert!(!reopened.clear().await.expect("second clear"));
    assert_eq!(reopened.get(), None);
    assert_eq!(*events.lock(), vec![SessionEvent::Cleared]);
    assert!(backend.load().await.expect("load").is_none());
}

/// Verifies that N parallel callers collapse into one refresh call.
///
/// Runs on the multi-threaded runtime so callers race for real.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_ensure_fresh_is_single_flight() {
    init_tracing();
    let clock = MockClock::new();
    let store = Arc::new(CredentialStore::in_memory());
    store
        .set(fixtures::session(&clock, "access-0", Duration::from_secs(3600)))
        .await
        .expect("set");
    let refresher = Arc::new(MockRefresher::new());
    refresher.set_latency(Duration::from_millis(50));
    let coordinator =
        RefreshCoordinator::with_clock(store, refresher.clone(), settings(), Arc::new(clock));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let coordinator = coordinator.clone();
        handles.push(tokio::spawn(async move { coordinator.ensure_fresh().await }));
    }

    for handle in handles {
        let tokens = handle.await.expect("join").expect("refresh");
        assert_eq!(tokens.access_token(), "refreshed-token-1");
    }
    assert_eq!(refresher.calls(), 1);
    assert_eq!(coordinator.state(), RefreshState::Idle);
}

/// Verifies that a refresh after a completed one starts a new operation.
#[tokio::test]
async fn test_sequential_refreshes_each_hit_network() {
    init_tracing();
    let clock = MockClock::new();
    let store = Arc::new(CredentialStore::in_memory());
    store
        .set(fixtures::session(&clock, "access-0", Duration::from_secs(3600)))
        .await
        .expect("set");
    let refresher = Arc::new(MockRefresher::new());
    let coordinator =
        RefreshCoordinator::with_clock(Arc::clone(&store), refresher.clone(), settings(), Arc::new(clock));

    coordinator.ensure_fresh().await.expect("first");
    let second = coordinator.ensure_fresh().await.expect("second");

    assert_eq!(second.access_token(), "refreshed-token-2");
    assert_eq!(refresher.last_refresh_token().as_deref(), Some("refresh-token-1"));
    assert_eq!(refresher.calls(), 2);
}

/// Verifies the expiry monitor contract.
///
/// # Test Steps
/// 1. Store a token expiring in 4 minutes with a 5 minute window
/// 2. Tick several times while the refresh is still in flight
/// 3. Exactly one refresh call is observed
#[tokio::test]
async fn test_tick_inside_window_refreshes_once() {
    init_tracing();
    let clock = MockClock::new();
    let store = Arc::new(CredentialStore::in_memory());
    store
        .set(fixtures::session(&clock, "access-0", Duration::from_secs(4 * 60)))
        .await
        .expect("set");
    let refresher = Arc::new(MockRefresher::new());
    refresher.set_latency(Duration::from_millis(30));
    let coordinator =
        RefreshCoordinator::with_clock(Arc::clone(&store), refresher.clone(), settings(), Arc::new(clock));

    let outcomes = futures::future::join_all((0..4).map(|_| coordinator.tick())).await;

    assert_eq!(refresher.calls(), 1);
    assert_eq!(outcomes.iter().filter(|o| **o == TickOutcome::Refreshed).count(), 1);
    assert_eq!(outcomes.iter().filter(|o| **o == TickOutcome::InFlight).count(), 3);
    assert_eq!(store.access_token().as_deref(), Some("refreshed-token-1"));
    assert_eq!(coordinator.tick().await, TickOutcome::Fresh);
}

/// Verifies the background monitor clears an expired, unrefreshable session
/// exactly once.
#[tokio::test]
async fn test_monitor_expires_session_once() {
    init_tracing();
    let clock = MockClock::new();
    let backend = Arc::new(MemoryBackend::new());
    let store = Arc::new(CredentialStore::open(backend.clone()).await.expect("open"));
    store
        .set(fixtures::session_without_refresh(&clock, "access-0", Duration::from_secs(60)))
        .await
        .expect("set");
    let cleared = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&cleared);
    let _subscription = store.subscribe(move |event| {
        if *event == SessionEvent::Cleared {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });
    let refresher = Arc::new(MockRefresher::new());
    let coordinator = RefreshCoordinator::with_clock(
        Arc::clone(&store),
        refresher.clone(),
        settings(),
        Arc::new(clock.clone()),
    );

    clock.advance(Duration::from_secs(61));
    let monitor = coordinator.spawn_monitor();

    let expired = poll_until(Duration::from_secs(1), Duration::from_millis(5), || {
        let store = Arc::clone(&store);
        async move { !store.is_authenticated() }
    })
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    monitor.shutdown().await;

    assert!(expired);
    assert_eq!(cleared.load(Ordering::SeqCst), 1);
    assert_eq!(backend.deletes(), 1);
    assert_eq!(refresher.calls(), 0);
}

/// Verifies that a failed refresh is terminal for the session and the next
/// login starts cleanly.
#[tokio::test]
async fn test_failed_refresh_then_new_login() {
    init_tracing();
    let clock = MockClock::new();
    let store = Arc::new(CredentialStore::in_memory());
    store
        .set(fixtures::session(&clock, "access-0", Duration::from_secs(3600)))
        .await
        .expect("set");
    let refresher = Arc::new(MockRefresher::new());
    refresher.push_result(Err(ClientError::HttpStatus { status: 401, body: "revoked".into() }));
    let coordinator =
        RefreshCoordinator::with_clock(Arc::clone(&store), refresher.clone(), settings(), Arc::new(clock.clone()));

    assert_eq!(coordinator.ensure_fresh().await, Err(ClientError::Unauthenticated));
    assert!(!store.is_authenticated());
    assert_eq!(coordinator.state(), RefreshState::Idle);

    store
        .set(fixtures::session(&clock, "access-1", Duration::from_secs(3600)))
        .await
        .expect("login");
    let tokens = coordinator.ensure_fresh().await.expect("refresh after login");

    assert_eq!(tokens.access_token(), "refreshed-token-2");
    assert_eq!(refresher.calls(), 2);
}

//! Integration tests for Store effect execution, broadcasting and cancellation.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use std::time::Duration;
use tokio::sync::oneshot;
use wopi_auth_core::effect::{Effect, EffectId};
use wopi_auth_core::reducer::Reducer;
use wopi_auth_core::{SmallVec, smallvec};
use wopi_auth_runtime::{Store, StoreConfig, StoreError};

// ============================================================================
// Test Fixtures
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum TestAction {
    /// Start work that finishes after `delay_ms`
    Start { id: u64, delay_ms: u64 },
    /// Work finished
    Finished { id: u64 },
    /// Abort work
    Abort { id: u64 },
    /// Start work that waits for an external trigger
    Hold { id: u64 },
    /// Synchronous ping producing a pong
    Ping,
    Pong,
}

#[derive(Debug, Clone, Default)]
struct TestState {
    finished: Vec<u64>,
    aborted: Vec<u64>,
    /// Completions reduced after their effect was aborted
    late: Vec<u64>,
    pongs: u32,
}

#[derive(Clone)]
struct TestEnvironment {
    gate: std::sync::Arc<tokio::sync::Mutex<Option<oneshot::Receiver<()>>>>,
}

impl TestEnvironment {
    fn new() -> Self {
        Self {
            gate: std::sync::Arc::new(tokio::sync::Mutex::new(None)),
        }
    }
}

#[derive(Clone)]
struct TestReducer;

impl Reducer for TestReducer {
    type State = TestState;
    type Action = TestAction;
    type Environment = TestEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            TestAction::Start { id, delay_ms } => {
                smallvec![Effect::cancellable(EffectId::new(id), async move {
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    Some(TestAction::Finished { id })
                })]
            },
            TestAction::Hold { id } => {
                let gate = env.gate.clone();
                smallvec![Effect::cancellable(EffectId::new(id), async move {
                    let rx = gate.lock().await.take();
                    if let Some(rx) = rx {
                        let _ = rx.await;
                    }
                    Some(TestAction::Finished { id })
                })]
            },
            TestAction::Finished { id } => {
                if state.aborted.contains(&id) {
                    state.late.push(id);
                }
                state.finished.push(id);
                smallvec![Effect::None]
            },
            TestAction::Abort { id } => {
                state.aborted.push(id);
                smallvec![Effect::Cancel(EffectId::new(id))]
            },
            TestAction::Ping => smallvec![Effect::Future(Box::pin(async { Some(TestAction::Pong) }))],
            TestAction::Pong => {
                state.pongs += 1;
                smallvec![Effect::None]
            },
        }
    }
}

fn store() -> Store<TestState, TestAction, TestEnvironment, TestReducer> {
    Store::new(TestState::default(), TestReducer, TestEnvironment::new())
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn send_and_wait_for_sees_state_already_updated() {
    let store = store();

    let result = store
        .send_and_wait_for(
            TestAction::Ping,
            |a| matches!(a, TestAction::Pong),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert_eq!(result, TestAction::Pong);
    assert_eq!(store.state(|s| s.pongs).await, 1);
}

#[tokio::test]
async fn cancellable_effect_completes_when_not_cancelled() {
    let store = store();

    let finished = store
        .send_and_wait_for(
            TestAction::Start { id: 1, delay_ms: 5 },
            |a| matches!(a, TestAction::Finished { .. }),
            Duration::from_secs(1),
        )
        .await
        .unwrap();

    assert_eq!(finished, TestAction::Finished { id: 1 });
    assert_eq!(store.state(|s| s.finished.clone()).await, vec![1]);
}

#[tokio::test]
async fn cancelled_effect_never_reaches_reducer() {
    let store = store();

    let mut handle = store.send(TestAction::Start { id: 7, delay_ms: 50 }).await.unwrap();
    assert_eq!(store.live_cancellables(), 1);

    store.send(TestAction::Abort { id: 7 }).await.unwrap();
    handle.wait_with_timeout(Duration::from_secs(1)).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(store.state(|s| s.finished.is_empty()).await);
    assert_eq!(store.live_cancellables(), 0);
}

#[tokio::test]
async fn completion_racing_a_cancel_is_discarded() {
    let store = store();
    let (tx, rx) = oneshot::channel();
    *store.environment().gate.lock().await = Some(rx);

    let mut observer = store.subscribe_actions();
    store.send(TestAction::Hold { id: 3 }).await.unwrap();

    // Release the work and cancel it back to back.
    tx.send(()).unwrap();
    store.send(TestAction::Abort { id: 3 }).await.unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    let finished = store.state(|s| s.finished.clone()).await;
    if finished.is_empty() {
        assert!(observer.try_recv().is_err());
    } else {
        // The completion won the race and was processed before the cancel.
        assert_eq!(finished, vec![3]);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn no_completion_is_reduced_or_broadcast_after_its_cancel() {
    let store = Store::with_config(
        TestState::default(),
        TestReducer,
        TestEnvironment::new(),
        StoreConfig::default().with_broadcast_capacity(512),
    );
    let mut observer = store.subscribe_actions();

    for id in 100..300 {
        store.send(TestAction::Start { id, delay_ms: 0 }).await.unwrap();
        tokio::task::yield_now().await;
        store.send(TestAction::Abort { id }).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;

    let (finished, late) = store.state(|s| (s.finished.clone(), s.late.clone())).await;
    assert!(late.is_empty(), "completions reduced after cancel: {late:?}");

    let mut broadcast = Vec::new();
    while let Ok(action) = observer.try_recv() {
        if let TestAction::Finished { id } = action {
            broadcast.push(id);
        }
    }
    broadcast.sort_unstable();
    let mut expected = finished;
    expected.sort_unstable();
    assert_eq!(broadcast, expected);
    assert_eq!(store.live_cancellables(), 0);
}

#[tokio::test]
async fn restarting_an_id_cancels_previous_work() {
    let store = store();

    store.send(TestAction::Start { id: 2, delay_ms: 80 }).await.unwrap();
    store.send(TestAction::Start { id: 2, delay_ms: 5 }).await.unwrap();

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(store.state(|s| s.finished.clone()).await, vec![2]);
}

#[tokio::test]
async fn shutdown_cancels_live_work_and_rejects_new_actions() {
    let store = store();
    store.send(TestAction::Start { id: 4, delay_ms: 10_000 }).await.unwrap();

    store.shutdown(Duration::from_secs(1)).await.unwrap();

    assert_eq!(store.pending_effects(), 0);
    let rejected = store.send(TestAction::Ping).await;
    assert!(matches!(rejected, Err(StoreError::ShutdownInProgress)));
}

#[tokio::test]
async fn wait_for_times_out_without_matching_action() {
    let store = store();
    let result = store
        .wait_for(|a| matches!(a, TestAction::Pong), Duration::from_millis(20))
        .await;
    assert!(matches!(result, Err(StoreError::Timeout)));
}

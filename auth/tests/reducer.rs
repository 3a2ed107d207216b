//! Single-step reducer tests. Effects are inspected, or driven by hand
//! with `tokio_test::block_on`, without a store.

use std::sync::Arc;

use wopi_auth::mocks::endpoints::sample_bootstrap;
use wopi_auth::mocks::{MockSignInSurface, MockWopiEndpoints, RecordingLog};
use wopi_auth::reducers::{FlowReducer, MaintenanceReducer};
use wopi_auth::state::{ActiveOperation, OperationKind};
use wopi_auth::{
    FlowAction, FlowConfig, FlowEnvironment, FlowError, FlowPhase, FlowState, MemoryPreferences,
    ProviderConfig, Stage, StageStatus,
};
use wopi_auth_core::effect::{Effect, EffectId};
use wopi_auth_core::reducer::Reducer;
use wopi_auth_testing::{ReducerTest, assertions, test_clock};

type Env = FlowEnvironment<MockWopiEndpoints, MockSignInSurface, MemoryPreferences>;
type Flow = FlowReducer<MockWopiEndpoints, MockSignInSurface, MemoryPreferences>;
type Maintenance = MaintenanceReducer<MockWopiEndpoints, MockSignInSurface, MemoryPreferences>;

fn environment(endpoints: MockWopiEndpoints) -> Env {
    FlowEnvironment::new(
        endpoints,
        MockSignInSurface::abandoned(),
        MemoryPreferences::new(),
        FlowConfig::new(),
        Arc::new(RecordingLog::new()),
        Arc::new(test_clock()),
    )
}

fn provider() -> ProviderConfig {
    ProviderConfig::new(
        "Contoso",
        "https://wopi.contoso.com/wopibootstrapper",
        "client-1",
        "secret-1",
        "https://app.contoso.com/redirect",
    )
}

#[test]
fn start_begins_the_bootstrap_stage() {
    ReducerTest::new(Flow::new())
        .with_env(environment(MockWopiEndpoints::new()))
        .given_state(FlowState::new())
        .when_action(FlowAction::StartFlow {
            provider: provider(),
        })
        .then_state(|s| {
            assert_eq!(s.phase, FlowPhase::Bootstrapping);
            assert_eq!(s.stages.get(Stage::Bootstrap), StageStatus::Running);
            assert!(s.is_active(EffectId::new(1)));
        })
        .then_effects(|effects| {
            assertions::assert_effects_count(effects, 1);
            assertions::assert_starts(effects, EffectId::new(1));
            assert_eq!(assertions::count_futures(effects), 1);
        })
        .run();
}

#[test]
fn cancel_cancels_the_active_operation() {
    let mut state = FlowState::new();
    state.phase = FlowPhase::SigningIn;
    state.active = Some(ActiveOperation {
        id: EffectId::new(2),
        kind: OperationKind::Flow(Stage::SignIn),
    });

    ReducerTest::new(Flow::new())
        .with_env(environment(MockWopiEndpoints::new()))
        .given_state(state)
        .when_action(FlowAction::Cancel)
        .then_state(|s| {
            assert_eq!(s.phase, FlowPhase::Canceled);
            assert_eq!(s.stages.get(Stage::SignIn), StageStatus::Canceled);
            assert!(s.active.is_none());
        })
        .then_effects(|effects| assertions::assert_cancels(effects, EffectId::new(2)))
        .run();
}

#[test]
fn completion_for_another_operation_is_dropped() {
    let mut state = FlowState::new();
    state.phase = FlowPhase::Bootstrapping;
    state.active = Some(ActiveOperation {
        id: EffectId::new(5),
        kind: OperationKind::Flow(Stage::Bootstrap),
    });

    ReducerTest::new(Flow::new())
        .with_env(environment(MockWopiEndpoints::new()))
        .given_state(state.clone())
        .when_action(FlowAction::BootstrapCompleted {
            operation: EffectId::new(4),
            result: Ok(sample_bootstrap()),
        })
        .then_state(move |s| assert_eq!(*s, state))
        .then_effects(|effects| assertions::assert_no_effects(effects))
        .run();
}

#[test]
fn commit_result_is_applied_only_to_its_own_flow() {
    let mut state = FlowState::new();
    state.phase = FlowPhase::Succeeded;
    state.pending_commit = Some(EffectId::new(8));

    ReducerTest::new(Flow::new())
        .with_env(environment(MockWopiEndpoints::new()))
        .given_state(state.clone())
        .when_action(FlowAction::ConnectionCommitted {
            operation: EffectId::new(4),
            result: Err(FlowError::Storage("disk full".to_string())),
        })
        .then_state(move |s| assert_eq!(*s, state))
        .then_effects(|effects| assertions::assert_no_effects(effects))
        .run();

    let mut state = FlowState::new();
    state.phase = FlowPhase::Succeeded;
    state.pending_commit = Some(EffectId::new(8));

    ReducerTest::new(Flow::new())
        .with_env(environment(MockWopiEndpoints::new()))
        .given_state(state)
        .when_action(FlowAction::ConnectionCommitted {
            operation: EffectId::new(8),
            result: Ok(()),
        })
        .then_state(|s| {
            assert!(s.committed);
            assert!(s.pending_commit.is_none());
            assert!(s.is_settled());
        })
        .run();
}

#[test]
fn maintenance_cancel_without_operation_does_nothing() {
    ReducerTest::new(Maintenance::new())
        .with_env(environment(MockWopiEndpoints::new()))
        .given_state(FlowState::new())
        .when_action(FlowAction::Cancel)
        .then_effects(|effects| assertions::assert_no_effects(effects))
        .run();
}

#[test]
fn bootstrap_effect_reports_its_operation() {
    let endpoints = MockWopiEndpoints::new().with_bootstrap(Ok(sample_bootstrap()));
    let env = environment(endpoints.clone());
    let reducer = Flow::new();
    let mut state = FlowState::new();

    let mut effects = reducer.reduce(
        &mut state,
        FlowAction::StartFlow {
            provider: provider(),
        },
        &env,
    );

    let Some(Effect::Cancellable { id, effect }) = effects.pop() else {
        panic!("expected a cancellable bootstrap effect");
    };
    let Effect::Future(future) = *effect else {
        panic!("expected a future");
    };
    let action = tokio_test::block_on(future);

    assert_eq!(
        action,
        Some(FlowAction::BootstrapCompleted {
            operation: id,
            result: Ok(sample_bootstrap()),
        })
    );
    assert_eq!(endpoints.call_count(), 1);
}

#[test]
fn unscripted_endpoint_fails_the_stage() {
    let env = environment(MockWopiEndpoints::new());
    let reducer = Flow::new();
    let mut state = FlowState::new();

    let mut effects = reducer.reduce(
        &mut state,
        FlowAction::StartFlow {
            provider: provider(),
        },
        &env,
    );
    let Some(Effect::Cancellable { effect, .. }) = effects.pop() else {
        panic!("expected a cancellable bootstrap effect");
    };
    let Effect::Future(future) = *effect else {
        panic!("expected a future");
    };
    let completion = tokio_test::block_on(future).expect("bootstrap completion");

    reducer.reduce(&mut state, completion, &env);
    assert_eq!(state.phase, FlowPhase::Failed);
    assert!(matches!(state.last_error, Some(FlowError::Transport(_))));
}

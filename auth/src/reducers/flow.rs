//! The four-stage authentication flow.
//!
//! ```text
//! Idle ─▶ Bootstrapping ─▶ SigningIn ─▶ ExchangingTokens ─▶ FetchingProfile ─▶ Succeeded
//!              │               │               │                   │
//!              └───────────────┴───────┬───────┴───────────────────┘
//!                                      ▼
//!                              Failed / Canceled
//! ```
//!
//! Each stage runs as one cancellable effect. Its completion action is
//! accepted only while the stage's operation is still the active one.

use crate::actions::FlowAction;
use crate::catalog::ProviderCatalog;
use crate::connection::ConnectionBuilder;
use crate::constants::messages;
use crate::environment::FlowEnvironment;
use crate::error::{FlowError, Result};
use crate::fetchers::{BootstrapFetcher, ProfileFetcher, TokenFetcher};
use crate::provider::ProviderConfig;
use crate::providers::{PreferenceStore, SignInSurface, WopiEndpoints};
use crate::redirect::AuthResult;
use crate::sign_in::{RedirectWatcher, build_sign_in_url};
use crate::state::{ActiveOperation, FlowPhase, FlowState, OperationKind, Stage, StageStatus};
use std::marker::PhantomData;
use wopi_auth_core::effect::{Effect, EffectId};
use wopi_auth_core::reducer::Reducer;
use wopi_auth_core::{SmallVec, smallvec};

type Effects = SmallVec<[Effect<FlowAction>; 4]>;

/// Runs the full flow.
#[derive(Debug)]
pub struct FlowReducer<W, S, P> {
    _collaborators: PhantomData<fn() -> (W, S, P)>,
}

impl<W, S, P> FlowReducer<W, S, P> {
    /// Create the reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _collaborators: PhantomData,
        }
    }
}

impl<W, S, P> Default for FlowReducer<W, S, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W, S, P> Clone for FlowReducer<W, S, P> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<W, S, P> FlowReducer<W, S, P>
where
    W: WopiEndpoints + Clone + 'static,
    S: SignInSurface + Clone + 'static,
    P: PreferenceStore + Clone + 'static,
{
    fn start(
        &self,
        state: &mut FlowState,
        provider: ProviderConfig,
        env: &FlowEnvironment<W, S, P>,
    ) -> Effects {
        if state.is_busy() {
            env.log
                .warning("An operation is already in progress; start request ignored");
            return smallvec![Effect::None];
        }

        state.phase = FlowPhase::Idle;
        state.stages.reset();
        state.connection = None;
        state.record = None;
        state.last_error = None;
        state.committed = false;
        state.commit_error = None;
        state.pending_commit = None;
        let provider = provider.trimmed();
        env.log.info(messages::FLOW_START);
        env.log.info(&format!("Provider: {provider}"));

        if let Err(error) = provider.validate() {
            state.provider = Some(provider);
            return self.fail_stage(state, Stage::Bootstrap, error, env);
        }

        state.connection = Some(ConnectionBuilder::new(provider.provider_name.clone()));
        state.provider = Some(provider);
        self.begin_stage(state, Stage::Bootstrap, env)
    }

    fn begin_stage(
        &self,
        state: &mut FlowState,
        stage: Stage,
        env: &FlowEnvironment<W, S, P>,
    ) -> Effects {
        env.log.info(&format!("Starting {stage}"));
        state.phase = stage.phase();
        state.stages.set(stage, StageStatus::Running);

        let id = state.next_operation_id();
        match Self::stage_effect(state, stage, id, env) {
            Ok(effect) => {
                state.active = Some(ActiveOperation {
                    id,
                    kind: OperationKind::Flow(stage),
                });
                tracing::debug!(operation = %id, %stage, "stage started");
                smallvec![effect]
            }
            Err(error) => self.fail_stage(state, stage, error, env),
        }
    }

    fn stage_effect(
        state: &FlowState,
        stage: Stage,
        id: EffectId,
        env: &FlowEnvironment<W, S, P>,
    ) -> Result<Effect<FlowAction>> {
        let (Some(provider), Some(builder)) = (state.provider.as_ref(), state.connection.as_ref())
        else {
            return Err(FlowError::validation("No flow in progress."));
        };

        let effect = match stage {
            Stage::Bootstrap => {
                let fetcher = BootstrapFetcher::new(provider.bootstrapper.as_str())
                    .with_user_agent(env.config.bootstrap_user_agent.clone());
                let endpoints = env.endpoints.clone();
                Effect::cancellable(id, async move {
                    Some(FlowAction::BootstrapCompleted {
                        operation: id,
                        result: endpoints.bootstrap(fetcher).await,
                    })
                })
            }
            Stage::SignIn => {
                let bootstrap = builder
                    .bootstrap()
                    .ok_or_else(|| FlowError::validation("Sign-in requires bootstrap data."))?;
                let url = build_sign_in_url(bootstrap, provider, &env.config.client_info)?;
                let watcher =
                    RedirectWatcher::new(&provider.parsed_redirect_url()?, env.log.clone());
                env.log.info(&format!("Sign-in URL: {url}"));
                let surface = env.sign_in.clone();
                Effect::cancellable(id, async move {
                    Some(FlowAction::SignInCompleted {
                        operation: id,
                        result: surface.sign_in(url, watcher).await,
                    })
                })
            }
            Stage::Tokens => {
                let endpoint = builder
                    .token_endpoint()
                    .ok_or_else(|| FlowError::validation("Token exchange requires bootstrap data."))?;
                env.log.info(endpoint.describe());
                endpoint.validate()?;
                let fetcher = TokenFetcher::authorization_code(
                    endpoint.url(),
                    provider.client_id.clone(),
                    provider.client_secret.clone(),
                    builder.auth_code(),
                    provider.redirect_url.clone(),
                )
                .with_session_context(builder.session_context())
                .with_user_agent(env.config.service_user_agent.clone());
                let endpoints = env.endpoints.clone();
                Effect::cancellable(id, async move {
                    Some(FlowAction::TokensCompleted {
                        operation: id,
                        result: endpoints.tokens(fetcher).await,
                    })
                })
            }
            Stage::Profile => {
                let fetcher =
                    ProfileFetcher::new(provider.bootstrapper.as_str(), builder.access_token())
                        .with_session_context(builder.session_context())
                        .with_user_agent(env.config.service_user_agent.clone());
                let endpoints = env.endpoints.clone();
                Effect::cancellable(id, async move {
                    Some(FlowAction::ProfileCompleted {
                        operation: id,
                        result: endpoints.profile(fetcher).await,
                    })
                })
            }
        };
        Ok(effect)
    }

    fn complete_stage(state: &mut FlowState, stage: Stage, env: &FlowEnvironment<W, S, P>) {
        state.stages.set(stage, StageStatus::Succeeded);
        env.log.info(&format!("Completed {stage}"));
    }

    fn fail_stage(
        &self,
        state: &mut FlowState,
        stage: Stage,
        error: FlowError,
        env: &FlowEnvironment<W, S, P>,
    ) -> Effects {
        state.active = None;
        if error.is_cancellation() {
            env.log.warning(messages::USER_CANCELLED);
            state.stages.set(stage, StageStatus::Canceled);
            state.phase = FlowPhase::Canceled;
        } else {
            env.log.error(&error.to_string());
            env.log.error(&format!(
                "FAILURE: WOPI client authentication flow during {stage} phase."
            ));
            state.stages.set(stage, StageStatus::Failed);
            state.phase = FlowPhase::Failed;
            state.last_error = Some(error);
        }
        smallvec![Effect::None]
    }

    /// Accept a completion for `stage` if its operation is still active.
    fn accept(state: &mut FlowState, operation: EffectId, stage: Stage) -> bool {
        let expected = OperationKind::Flow(stage);
        match state.active {
            Some(active) if active.id == operation && active.kind == expected => {
                state.active = None;
                true
            }
            _ => {
                tracing::debug!(%operation, %stage, "dropping stale completion");
                false
            }
        }
    }

    fn advance<T>(
        &self,
        state: &mut FlowState,
        stage: Stage,
        result: Result<T>,
        env: &FlowEnvironment<W, S, P>,
        attach: impl FnOnce(&mut ConnectionBuilder, T, &FlowEnvironment<W, S, P>) -> Result<()>,
    ) -> Effects {
        let attached = result.and_then(|value| match state.connection.as_mut() {
            Some(builder) => attach(builder, value, env),
            None => Err(FlowError::validation("No flow in progress.")),
        });
        if let Err(error) = attached {
            return self.fail_stage(state, stage, error, env);
        }

        Self::complete_stage(state, stage, env);
        match stage {
            Stage::Bootstrap => self.begin_stage(state, Stage::SignIn, env),
            Stage::SignIn => self.begin_stage(state, Stage::Tokens, env),
            Stage::Tokens => self.begin_stage(state, Stage::Profile, env),
            Stage::Profile => self.succeed(state, env),
        }
    }

    fn succeed(&self, state: &mut FlowState, env: &FlowEnvironment<W, S, P>) -> Effects {
        let built = state
            .connection
            .as_ref()
            .ok_or_else(|| FlowError::validation("No flow in progress."))
            .and_then(ConnectionBuilder::build);
        let record = match built {
            Ok(record) => record,
            Err(error) => return self.fail_stage(state, Stage::Profile, error, env),
        };

        state.phase = FlowPhase::Succeeded;
        state.record = Some(record.clone());
        env.log.info(&format!("Connection: {record}"));
        env.log.info(messages::FLOW_SUCCESS);

        let operation = state.next_operation_id();
        state.pending_commit = Some(operation);
        let catalog = ProviderCatalog::new(env.preferences.clone());
        smallvec![Effect::Future(Box::pin(async move {
            Some(FlowAction::ConnectionCommitted {
                operation,
                result: catalog.add_connection(record),
            })
        }))]
    }

    fn committed(
        state: &mut FlowState,
        operation: EffectId,
        result: Result<()>,
        env: &FlowEnvironment<W, S, P>,
    ) -> Effects {
        if state.pending_commit != Some(operation) {
            tracing::debug!(%operation, "dropping commit result of an earlier flow");
            return smallvec![Effect::None];
        }
        state.pending_commit = None;
        match result {
            Ok(()) => {
                state.committed = true;
                env.log.info("Connection saved");
            }
            Err(error) => {
                env.log.error(&format!("Unable to save connection: {error}"));
                state.commit_error = Some(error);
            }
        }
        smallvec![Effect::None]
    }

    /// Abort the running stage.
    fn cancel(&self, state: &mut FlowState, env: &FlowEnvironment<W, S, P>) -> Effects {
        let Some(active) = state.active else {
            env.log.warning("Nothing to cancel");
            return smallvec![Effect::None];
        };
        let OperationKind::Flow(stage) = active.kind else {
            return smallvec![Effect::None];
        };
        self.fail_stage(state, stage, FlowError::UserCanceled, env);
        smallvec![Effect::Cancel(active.id)]
    }
}

impl<W, S, P> Reducer for FlowReducer<W, S, P>
where
    W: WopiEndpoints + Clone + 'static,
    S: SignInSurface + Clone + 'static,
    P: PreferenceStore + Clone + 'static,
{
    type State = FlowState;
    type Action = FlowAction;
    type Environment = FlowEnvironment<W, S, P>;

    fn reduce(&self, state: &mut FlowState, action: FlowAction, env: &Self::Environment) -> Effects {
        match action {
            // ═══════════════════════════════════════════════════════════════
            // Commands
            // ═══════════════════════════════════════════════════════════════
            FlowAction::StartFlow { provider } => self.start(state, provider, env),

            FlowAction::Cancel => self.cancel(state, env),

            // ═══════════════════════════════════════════════════════════════
            // Stage completions
            // ═══════════════════════════════════════════════════════════════
            FlowAction::BootstrapCompleted { operation, result } => {
                if !Self::accept(state, operation, Stage::Bootstrap) {
                    return smallvec![Effect::None];
                }
                self.advance(state, Stage::Bootstrap, result, env, |builder, info, env| {
                    if let Some(provider_id) = &info.provider_id {
                        env.log.info(&format!("Provider ID: {provider_id}"));
                    }
                    info.validate()?;
                    builder.set_bootstrap(info);
                    Ok(())
                })
            }

            FlowAction::SignInCompleted { operation, result } => {
                if !Self::accept(state, operation, Stage::SignIn) {
                    return smallvec![Effect::None];
                }
                let result = result.and_then(AuthResult::into_outcome);
                self.advance(state, Stage::SignIn, result, env, |builder, auth, _| {
                    builder.set_sign_in(auth);
                    Ok(())
                })
            }

            FlowAction::TokensCompleted { operation, result } => {
                if !Self::accept(state, operation, Stage::Tokens) {
                    return smallvec![Effect::None];
                }
                self.advance(state, Stage::Tokens, result, env, |builder, tokens, env| {
                    builder.set_tokens(tokens, env.clock.now())
                })
            }

            FlowAction::ProfileCompleted { operation, result } => {
                if !Self::accept(state, operation, Stage::Profile) {
                    return smallvec![Effect::None];
                }
                self.advance(state, Stage::Profile, result, env, |builder, profile, _| {
                    builder.set_profile(profile);
                    Ok(())
                })
            }

            // ═══════════════════════════════════════════════════════════════
            // Persistence
            // ═══════════════════════════════════════════════════════════════
            FlowAction::ConnectionCommitted { operation, result } => {
                Self::committed(state, operation, result, env)
            }

            FlowAction::RefreshTokens { .. }
            | FlowAction::RefreshProfile { .. }
            | FlowAction::RefreshCompleted { .. }
            | FlowAction::ReprofileCompleted { .. }
            | FlowAction::ConnectionUpdated { .. } => smallvec![Effect::None],
        }
    }
}

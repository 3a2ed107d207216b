//! Refresh and re-profile of saved connections.

use crate::actions::FlowAction;
use crate::catalog::ProviderCatalog;
use crate::connection::ConnectionRecord;
use crate::environment::FlowEnvironment;
use crate::error::{FlowError, Result};
use crate::fetchers::{ProfileFetcher, TokenFetcher};
use crate::provider::ProviderConfig;
use crate::providers::{PreferenceStore, SignInSurface, WopiEndpoints};
use crate::results::{ProfileResult, TokenResult};
use crate::state::{ActiveOperation, FlowState, MaintenanceKind, MaintenanceState, MaintenanceStatus};
use std::marker::PhantomData;
use wopi_auth_core::effect::{Effect, EffectId};
use wopi_auth_core::reducer::Reducer;
use wopi_auth_core::{SmallVec, smallvec};

type Effects = SmallVec<[Effect<FlowAction>; 4]>;

/// Runs standalone refresh and re-profile operations.
///
/// Both require an idle store, a valid provider owning the connection,
/// and their own precondition on the connection.
#[derive(Debug)]
pub struct MaintenanceReducer<W, S, P> {
    _collaborators: PhantomData<fn() -> (W, S, P)>,
}

impl<W, S, P> MaintenanceReducer<W, S, P> {
    /// Create the reducer.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _collaborators: PhantomData,
        }
    }
}

impl<W, S, P> Default for MaintenanceReducer<W, S, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W, S, P> Clone for MaintenanceReducer<W, S, P> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<W, S, P> MaintenanceReducer<W, S, P>
where
    W: WopiEndpoints + Clone + 'static,
    S: SignInSurface + Clone + 'static,
    P: PreferenceStore + Clone + 'static,
{
    fn check(
        state: &FlowState,
        kind: MaintenanceKind,
        provider: &ProviderConfig,
        connection: &ConnectionRecord,
    ) -> Result<()> {
        if state.is_busy() {
            return Err(FlowError::NotPermitted(
                "Another operation is in progress.".to_string(),
            ));
        }
        provider.validate()?;
        if provider.provider_name != connection.provider_name {
            return Err(FlowError::NotPermitted(format!(
                "Connection belongs to \"{}\", not \"{}\".",
                connection.provider_name, provider.provider_name
            )));
        }
        let enabled = match kind {
            MaintenanceKind::Refresh => connection.can_refresh(),
            MaintenanceKind::Reprofile => connection.can_reprofile(),
        };
        if !enabled {
            return Err(FlowError::NotPermitted(match kind {
                MaintenanceKind::Refresh => {
                    "Refresh is not enabled: the connection has no expiring token and refresh token."
                }
                MaintenanceKind::Reprofile => {
                    "Profile refresh is not enabled: the connection has no access token."
                }
            }
            .to_string()));
        }
        Ok(())
    }

    fn reject(
        state: &mut FlowState,
        kind: MaintenanceKind,
        provider: ProviderConfig,
        connection: ConnectionRecord,
        error: FlowError,
        env: &FlowEnvironment<W, S, P>,
    ) -> Effects {
        env.log.warning(&error.to_string());
        // A busy store keeps the running operation's bookkeeping.
        if !state.is_busy() {
            state.maintenance = MaintenanceState {
                status: MaintenanceStatus::Rejected,
                kind: Some(kind),
                provider: Some(provider),
                target: Some(connection),
                last_error: Some(error),
                ..MaintenanceState::default()
            };
        }
        smallvec![Effect::None]
    }

    fn begin(
        state: &mut FlowState,
        kind: MaintenanceKind,
        provider: ProviderConfig,
        connection: ConnectionRecord,
        env: &FlowEnvironment<W, S, P>,
    ) -> Effects {
        let provider = provider.trimmed();
        if let Err(error) = Self::check(state, kind, &provider, &connection) {
            return Self::reject(state, kind, provider, connection, error, env);
        }

        let id = state.next_operation_id();
        let endpoints = env.endpoints.clone();
        let effect = match kind {
            MaintenanceKind::Refresh => {
                let endpoint = connection.token_endpoint();
                env.log.info(endpoint.describe());
                if let Err(error) = endpoint.validate() {
                    return Self::reject(state, kind, provider, connection, error, env);
                }
                let fetcher = TokenFetcher::refresh(
                    endpoint.url(),
                    provider.client_id.clone(),
                    provider.client_secret.clone(),
                    connection.refresh_token.clone(),
                )
                .with_session_context(connection.session_context.clone())
                .with_user_agent(env.config.service_user_agent.clone());
                env.log.info(&format!("Refreshing tokens for {}", connection.user_id));
                Effect::cancellable(id, async move {
                    Some(FlowAction::RefreshCompleted {
                        operation: id,
                        result: endpoints.tokens(fetcher).await,
                    })
                })
            }
            MaintenanceKind::Reprofile => {
                let fetcher =
                    ProfileFetcher::new(provider.bootstrapper.as_str(), connection.access_token.clone())
                        .with_session_context(connection.session_context.clone())
                        .with_user_agent(env.config.service_user_agent.clone());
                env.log.info(&format!("Refreshing profile for {}", connection.user_id));
                Effect::cancellable(id, async move {
                    Some(FlowAction::ReprofileCompleted {
                        operation: id,
                        result: endpoints.profile(fetcher).await,
                    })
                })
            }
        };

        state.active = Some(ActiveOperation {
            id,
            kind: kind.operation(),
        });
        state.maintenance = MaintenanceState {
            status: MaintenanceStatus::Running,
            kind: Some(kind),
            provider: Some(provider),
            target: Some(connection),
            ..MaintenanceState::default()
        };
        smallvec![effect]
    }

    fn accept(state: &mut FlowState, operation: EffectId, kind: MaintenanceKind) -> bool {
        match state.active {
            Some(active) if active.id == operation && active.kind == kind.operation() => {
                state.active = None;
                true
            }
            _ => {
                tracing::debug!(%operation, ?kind, "dropping stale completion");
                false
            }
        }
    }

    fn finish<T>(
        state: &mut FlowState,
        result: Result<T>,
        success: &str,
        env: &FlowEnvironment<W, S, P>,
        apply: impl FnOnce(&mut ConnectionRecord, T) -> Result<()>,
    ) -> Effects {
        let target = state
            .maintenance
            .target
            .clone()
            .ok_or_else(|| FlowError::validation("No connection to update."));

        let outcome = result
            .and_then(|value| target.map(|record| (record, value)))
            .and_then(|(previous, value)| {
                let mut updated = previous.clone();
                apply(&mut updated, value)?;
                Ok((previous, updated))
            });

        match outcome {
            Ok((previous, updated)) => {
                env.log.info(success);
                env.log.info(&format!("Connection: {updated}"));
                state.maintenance.status = MaintenanceStatus::Succeeded;
                state.maintenance.updated = Some(updated.clone());

                let operation = state.next_operation_id();
                state.maintenance.pending_update = Some(operation);
                let catalog = ProviderCatalog::new(env.preferences.clone());
                smallvec![Effect::Future(Box::pin(async move {
                    Some(FlowAction::ConnectionUpdated {
                        operation,
                        result: catalog.update_connection(&previous.user_id, updated),
                    })
                }))]
            }
            Err(error) => {
                env.log.error(&error.to_string());
                state.maintenance.status = MaintenanceStatus::Failed;
                state.maintenance.last_error = Some(error);
                smallvec![Effect::None]
            }
        }
    }

    /// Abort the running refresh or re-profile.
    fn cancel(state: &mut FlowState, env: &FlowEnvironment<W, S, P>) -> Effects {
        let Some(active) = state.active.take() else {
            return smallvec![Effect::None];
        };
        env.log.warning(crate::constants::messages::USER_CANCELLED);
        state.maintenance.status = MaintenanceStatus::Canceled;
        state.maintenance.last_error = Some(FlowError::UserCanceled);
        smallvec![Effect::Cancel(active.id)]
    }
}

impl<W, S, P> Reducer for MaintenanceReducer<W, S, P>
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
            FlowAction::RefreshTokens {
                provider,
                connection,
            } => Self::begin(state, MaintenanceKind::Refresh, provider, connection, env),

            FlowAction::RefreshProfile {
                provider,
                connection,
            } => Self::begin(state, MaintenanceKind::Reprofile, provider, connection, env),

            FlowAction::Cancel => Self::cancel(state, env),

            FlowAction::RefreshCompleted { operation, result } => {
                if !Self::accept(state, operation, MaintenanceKind::Refresh) {
                    return smallvec![Effect::None];
                }
                let now = env.clock.now();
                Self::finish(
                    state,
                    result,
                    "Successful exchange of Refresh Token",
                    env,
                    |record, tokens: TokenResult| record.apply_tokens(&tokens, now),
                )
            }

            FlowAction::ReprofileCompleted { operation, result } => {
                if !Self::accept(state, operation, MaintenanceKind::Reprofile) {
                    return smallvec![Effect::None];
                }
                Self::finish(
                    state,
                    result,
                    "Successful authenticated profile call",
                    env,
                    |record, profile: ProfileResult| {
                        record.apply_profile(&profile);
                        Ok(())
                    },
                )
            }

            FlowAction::ConnectionUpdated { operation, result } => {
                if state.maintenance.pending_update != Some(operation) {
                    tracing::debug!(%operation, "dropping update result of an earlier operation");
                    return smallvec![Effect::None];
                }
                state.maintenance.pending_update = None;
                match result {
                    Ok(()) => {
                        state.maintenance.persisted = true;
                        env.log.info("Connection updated");
                    }
                    Err(error) => {
                        env.log.error(&format!("Unable to update connection: {error}"));
                        state.maintenance.persist_error = Some(error);
                    }
                }
                smallvec![Effect::None]
            }

            FlowAction::StartFlow { .. }
            | FlowAction::BootstrapCompleted { .. }
            | FlowAction::SignInCompleted { .. }
            | FlowAction::TokensCompleted { .. }
            | FlowAction::ProfileCompleted { .. }
            | FlowAction::ConnectionCommitted { .. } => smallvec![Effect::None],
        }
    }
}

//! Subcommand implementations.
//!
//! Catalog commands are synchronous and generic over the preference store.
//! Flow, refresh and re-profile drive a [`FlowStore`] until it settles.

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use wopi_auth::providers::{HttpWopiEndpoints, JsonFilePreferences, PreferenceStore};
use wopi_auth::state::{MaintenanceKind, MaintenanceStatus};
use wopi_auth::{
    ConnectionRecord, FlowAction, FlowConfig, FlowEnvironment, FlowPhase, FlowState, FlowStore,
    ProviderCatalog, ProviderConfig, StageStatus, TracingFlowLog, WopiReducer,
};
use wopi_auth_core::environment::SystemClock;

use crate::terminal::TerminalSignIn;

type TerminalStore = FlowStore<HttpWopiEndpoints, TerminalSignIn, JsonFilePreferences>;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

// ═══════════════════════════════════════════════════════════════════════
// Catalog
// ═══════════════════════════════════════════════════════════════════════

/// One line per provider; the selected one is starred.
pub fn provider_lines<P: PreferenceStore>(catalog: &ProviderCatalog<P>) -> anyhow::Result<Vec<String>> {
    let selected = catalog.selected()?.map(|p| p.provider_name);
    Ok(catalog
        .providers()?
        .iter()
        .map(|provider| {
            let marker = if selected.as_deref() == Some(provider.provider_name.as_str()) {
                '*'
            } else {
                ' '
            };
            format!("{marker} {provider}")
        })
        .collect())
}

/// One line per connection, optionally limited to one provider.
pub fn connection_lines<P: PreferenceStore>(
    catalog: &ProviderCatalog<P>,
    provider: Option<&str>,
) -> anyhow::Result<Vec<String>> {
    let connections = match provider {
        Some(name) => catalog.connections_for(name)?,
        None => catalog.connections()?,
    };
    Ok(connections.iter().map(describe_connection).collect())
}

/// Human-readable summary of a connection. Tokens stay masked.
pub fn describe_connection(record: &ConnectionRecord) -> String {
    let expiry = record
        .expires_at
        .map_or_else(|| "never".to_string(), |at| at.to_rfc3339());
    format!(
        "{} / {} ({}, \"{}\") expires {} refresh {}",
        record.provider_name,
        record.user_id,
        record.user_name,
        record.friendly_name,
        expiry,
        if record.can_refresh() { "available" } else { "unavailable" },
    )
}

/// Add a provider, optionally selecting it.
pub fn add_provider<P: PreferenceStore>(
    catalog: &ProviderCatalog<P>,
    config: ProviderConfig,
    select: bool,
) -> anyhow::Result<ProviderConfig> {
    let added = catalog.add_provider(config)?;
    if select {
        catalog.select_provider(&added.provider_name)?;
    }
    Ok(added)
}

/// The named provider, or the selected one when no name is given.
pub fn resolve_provider<P: PreferenceStore>(
    catalog: &ProviderCatalog<P>,
    name: Option<&str>,
) -> anyhow::Result<ProviderConfig> {
    match name {
        Some(name) => catalog
            .provider(name)?
            .ok_or_else(|| anyhow!("No provider named \"{name}\"")),
        None => catalog
            .selected()?
            .ok_or_else(|| anyhow!("No provider selected; pass --provider or run `select`")),
    }
}

/// A provider together with one of its connections.
pub fn resolve_connection<P: PreferenceStore>(
    catalog: &ProviderCatalog<P>,
    provider: &str,
    user: &str,
) -> anyhow::Result<(ProviderConfig, ConnectionRecord)> {
    let config = resolve_provider(catalog, Some(provider))?;
    let record = catalog
        .connection(provider, user)?
        .ok_or_else(|| anyhow!("No connection for user \"{user}\" on \"{provider}\""))?;
    Ok((config, record))
}

// ═══════════════════════════════════════════════════════════════════════
// Flow and maintenance
// ═══════════════════════════════════════════════════════════════════════

fn terminal_store(preferences: JsonFilePreferences) -> anyhow::Result<TerminalStore> {
    let config = FlowConfig::from_env()?;
    let log = TracingFlowLog::shared();
    let endpoints = HttpWopiEndpoints::new(&config, log.clone())?;
    let environment = FlowEnvironment::new(
        endpoints,
        TerminalSignIn,
        preferences,
        config,
        log,
        Arc::new(SystemClock),
    );
    Ok(FlowStore::new(FlowState::new(), WopiReducer::new(), environment))
}

/// Send `action` and wait until nothing is outstanding. The first Ctrl-C
/// cancels the running operation.
async fn run_until_settled(store: &TerminalStore, action: FlowAction) -> anyhow::Result<FlowState> {
    store.send(action).await?;

    let mut interrupt = pin!(tokio::signal::ctrl_c());
    let mut cancel_sent = false;
    while !store.state(FlowState::is_settled).await {
        tokio::select! {
            signal = &mut interrupt, if !cancel_sent => {
                signal.context("Unable to listen for Ctrl-C")?;
                tracing::info!("Cancellation requested");
                store.send(FlowAction::Cancel).await?;
                cancel_sent = true;
            }
            () = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }

    store.shutdown_default().await?;
    Ok(store.state(Clone::clone).await)
}

/// Run the full flow and save the resulting connection.
pub async fn run_flow(preferences: JsonFilePreferences, provider: Option<&str>) -> anyhow::Result<()> {
    let provider = resolve_provider(&ProviderCatalog::new(preferences.clone()), provider)?;
    let store = terminal_store(preferences)?;

    let state = run_until_settled(&store, FlowAction::StartFlow { provider }).await?;
    match state.phase {
        FlowPhase::Succeeded => {
            if let Some(record) = &state.record {
                println!("Signed in: {}", describe_connection(record));
            }
            if let Some(error) = state.commit_error {
                bail!("Connection could not be saved: {error}");
            }
            Ok(())
        }
        FlowPhase::Canceled => bail!("Authentication flow cancelled"),
        phase => {
            let stage = state
                .stages
                .iter()
                .find(|(_, status)| *status == StageStatus::Failed)
                .map_or_else(String::new, |(stage, _)| format!(" during {stage}"));
            match state.last_error {
                Some(error) => bail!("Authentication flow failed{stage}: {error}"),
                None => bail!("Authentication flow stopped in phase {phase:?}"),
            }
        }
    }
}

/// Refresh tokens or re-profile one saved connection.
pub async fn run_maintenance(
    preferences: JsonFilePreferences,
    kind: MaintenanceKind,
    provider: &str,
    user: &str,
) -> anyhow::Result<()> {
    let (provider, connection) =
        resolve_connection(&ProviderCatalog::new(preferences.clone()), provider, user)?;
    let store = terminal_store(preferences)?;

    let action = match kind {
        MaintenanceKind::Refresh => FlowAction::RefreshTokens {
            provider,
            connection,
        },
        MaintenanceKind::Reprofile => FlowAction::RefreshProfile {
            provider,
            connection,
        },
    };
    let maintenance = run_until_settled(&store, action).await?.maintenance;

    match maintenance.status {
        MaintenanceStatus::Succeeded => {
            if let Some(record) = &maintenance.updated {
                println!("Updated: {}", describe_connection(record));
            }
            match maintenance.persist_error {
                Some(error) => bail!("Connection could not be saved: {error}"),
                None => Ok(()),
            }
        }
        MaintenanceStatus::Canceled => bail!("Operation cancelled"),
        status => match maintenance.last_error {
            Some(error) => bail!("{error}"),
            None => bail!("Operation ended as {status:?}"),
        },
    }
}

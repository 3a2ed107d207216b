//! `wopi-auth`: run and inspect the WOPI client authentication flow from a
//! terminal.
//!
//! Providers and saved connections live in a JSON preference file
//! (`--store`, `WOPI_AUTH_STORE`). A `.env` file in the working directory
//! is read first.

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use wopi_auth::state::MaintenanceKind;
use wopi_auth::{JsonFilePreferences, ProviderCatalog, ProviderConfig};

mod commands;
mod terminal;

#[derive(Parser)]
#[command(name = "wopi-auth", about = "WOPI client authentication flow diagnostics", version)]
struct Cli {
    /// Preference file holding providers and connections
    #[arg(long, global = true, env = "WOPI_AUTH_STORE", default_value = "wopi-auth.json")]
    store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// List configured providers
    Providers,
    /// Add a provider
    AddProvider {
        /// Unique provider name
        #[arg(long)]
        name: String,
        /// Bootstrapper URL (https)
        #[arg(long)]
        bootstrapper: String,
        /// OAuth client id
        #[arg(long)]
        client_id: String,
        /// OAuth client secret
        #[arg(long, env = "WOPI_AUTH_CLIENT_SECRET", hide_env_values = true)]
        client_secret: String,
        /// Redirect URL registered with the provider (https)
        #[arg(long)]
        redirect_url: String,
        /// Scope sent on sign-in
        #[arg(long)]
        scope: Option<String>,
        /// Also select the new provider
        #[arg(long)]
        select: bool,
    },
    /// Remove a provider and its connections
    RemoveProvider {
        /// Provider name
        name: String,
    },
    /// Select the provider used by `flow`
    Select {
        /// Provider name
        name: String,
    },
    /// List saved connections
    Connections {
        /// Only this provider's connections
        #[arg(long)]
        provider: Option<String>,
    },
    /// Run the full authentication flow and save the connection
    Flow {
        /// Provider to use instead of the selected one
        #[arg(long)]
        provider: Option<String>,
    },
    /// Exchange a connection's refresh token for new tokens
    Refresh {
        /// Provider name
        #[arg(long)]
        provider: String,
        /// User id of the connection
        #[arg(long)]
        user: String,
    },
    /// Repeat the profile call for a connection
    Profile {
        /// Provider name
        #[arg(long)]
        provider: String,
        /// User id of the connection
        #[arg(long)]
        user: String,
    },
    /// Delete a saved connection
    DeleteConnection {
        /// Provider name
        #[arg(long)]
        provider: String,
        /// User id of the connection
        #[arg(long)]
        user: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    run(cli).await
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let preferences = JsonFilePreferences::new(&cli.store);
    let catalog = ProviderCatalog::new(preferences.clone());

    match cli.command {
        Commands::Providers => {
            for line in commands::provider_lines(&catalog)? {
                println!("{line}");
            }
        }
        Commands::AddProvider {
            name,
            bootstrapper,
            client_id,
            client_secret,
            redirect_url,
            scope,
            select,
        } => {
            let mut config =
                ProviderConfig::new(name, bootstrapper, client_id, client_secret, redirect_url);
            config.scope = scope;
            let added = commands::add_provider(&catalog, config, select)?;
            println!("Added {added}");
        }
        Commands::RemoveProvider { name } => {
            catalog.remove_provider(&name)?;
            println!("Removed \"{name}\"");
        }
        Commands::Select { name } => {
            let selected = catalog.select_provider(&name)?;
            println!("Selected {selected}");
        }
        Commands::Connections { provider } => {
            for line in commands::connection_lines(&catalog, provider.as_deref())? {
                println!("{line}");
            }
        }
        Commands::Flow { provider } => {
            commands::run_flow(preferences, provider.as_deref()).await?;
        }
        Commands::Refresh { provider, user } => {
            commands::run_maintenance(preferences, MaintenanceKind::Refresh, &provider, &user)
                .await?;
        }
        Commands::Profile { provider, user } => {
            commands::run_maintenance(preferences, MaintenanceKind::Reprofile, &provider, &user)
                .await?;
        }
        Commands::DeleteConnection { provider, user } => {
            catalog.remove_connection(&provider, &user)?;
            println!("Deleted connection \"{user}\" on \"{provider}\"");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn cli_parse_store_default() {
        let cli = Cli::parse_from(["wopi-auth", "providers"]);
        assert_eq!(cli.store, PathBuf::from("wopi-auth.json"));
        assert!(matches!(cli.command, Commands::Providers));
    }

    #[test]
    fn cli_parse_store_after_subcommand() {
        let cli = Cli::parse_from(["wopi-auth", "connections", "--store", "/tmp/prefs.json"]);
        assert_eq!(cli.store, PathBuf::from("/tmp/prefs.json"));
        match cli.command {
            Commands::Connections { provider } => assert!(provider.is_none()),
            _ => panic!("expected Connections command"),
        }
    }

    #[test]
    fn cli_parse_add_provider() {
        let cli = Cli::parse_from([
            "wopi-auth",
            "add-provider",
            "--name",
            "Contoso",
            "--bootstrapper",
            "https://wopi.contoso.com/wopibootstrapper",
            "--client-id",
            "client-1",
            "--client-secret",
            "secret-1",
            "--redirect-url",
            "https://app.contoso.com/redirect",
            "--select",
        ]);
        match cli.command {
            Commands::AddProvider {
                name,
                client_secret,
                scope,
                select,
                ..
            } => {
                assert_eq!(name, "Contoso");
                assert_eq!(client_secret, "secret-1");
                assert!(scope.is_none());
                assert!(select);
            }
            _ => panic!("expected AddProvider command"),
        }
    }

    #[test]
    fn cli_parse_flow_with_provider() {
        let cli = Cli::parse_from(["wopi-auth", "flow", "--provider", "Contoso"]);
        match cli.command {
            Commands::Flow { provider } => assert_eq!(provider.as_deref(), Some("Contoso")),
            _ => panic!("expected Flow command"),
        }
    }

    #[test]
    fn cli_parse_refresh_requires_user() {
        assert!(Cli::try_parse_from(["wopi-auth", "refresh", "--provider", "Contoso"]).is_err());

        let cli = Cli::parse_from(["wopi-auth", "refresh", "--provider", "Contoso", "--user", "u1"]);
        match cli.command {
            Commands::Refresh { provider, user } => {
                assert_eq!(provider, "Contoso");
                assert_eq!(user, "u1");
            }
            _ => panic!("expected Refresh command"),
        }
    }

    #[test]
    fn cli_parse_delete_connection() {
        let cli = Cli::parse_from([
            "wopi-auth",
            "delete-connection",
            "--provider",
            "Contoso",
            "--user",
            "u1",
        ]);
        assert!(matches!(cli.command, Commands::DeleteConnection { .. }));
    }

    #[tokio::test]
    async fn add_then_remove_provider_round_trips_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        let store = path.to_str().unwrap();

        run(Cli::parse_from([
            "wopi-auth",
            "--store",
            store,
            "add-provider",
            "--name",
            "Contoso",
            "--bootstrapper",
            "https://wopi.contoso.com/wopibootstrapper",
            "--client-id",
            "client-1",
            "--client-secret",
            "secret-1",
            "--redirect-url",
            "https://app.contoso.com/redirect",
            "--select",
        ]))
        .await
        .unwrap();

        let catalog = ProviderCatalog::new(JsonFilePreferences::new(&path));
        assert_eq!(catalog.selected().unwrap().unwrap().provider_name, "Contoso");

        run(Cli::parse_from(["wopi-auth", "--store", store, "remove-provider", "Contoso"]))
            .await
            .unwrap();
        assert!(catalog.providers().unwrap().is_empty());
        assert!(catalog.selected().unwrap().is_none());
    }
}

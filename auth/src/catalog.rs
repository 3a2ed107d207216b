//! Provider and connection management on top of a [`PreferenceStore`].
//!
//! Connections belong to a provider by name, so renaming or removing a
//! provider removes its connections too.

use crate::connection::ConnectionRecord;
use crate::error::{FlowError, Result};
use crate::provider::ProviderConfig;
use crate::providers::PreferenceStore;

/// Edits providers, the selection and saved connections.
#[derive(Debug, Clone)]
pub struct ProviderCatalog<P> {
    store: P,
}

impl<P: PreferenceStore> ProviderCatalog<P> {
    /// Catalog over `store`.
    #[must_use]
    pub const fn new(store: P) -> Self {
        Self { store }
    }

    /// The underlying store.
    #[must_use]
    pub const fn store(&self) -> &P {
        &self.store
    }

    /// All providers.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub fn providers(&self) -> Result<Vec<ProviderConfig>> {
        self.store.providers()
    }

    /// Look up a provider by name.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub fn provider(&self, name: &str) -> Result<Option<ProviderConfig>> {
        Ok(self
            .store
            .providers()?
            .into_iter()
            .find(|p| p.provider_name == name))
    }

    /// Whether `name` is free, ignoring the provider currently named `except`.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub fn is_name_available(&self, name: &str, except: Option<&str>) -> Result<bool> {
        Ok(!self
            .store
            .providers()?
            .iter()
            .any(|p| p.provider_name == name && Some(p.provider_name.as_str()) != except))
    }

    /// Add a provider. Fields are trimmed before validation.
    ///
    /// # Errors
    ///
    /// [`FlowError::Validation`] if the config is invalid or the name is taken.
    pub fn add_provider(&self, config: ProviderConfig) -> Result<ProviderConfig> {
        let config = config.trimmed();
        config.validate()?;
        if !self.is_name_available(&config.provider_name, None)? {
            return Err(duplicate_name(&config.provider_name));
        }

        let mut providers = self.store.providers()?;
        providers.push(config.clone());
        self.store.set_providers(providers)?;
        tracing::info!(provider = %config.provider_name, "provider added");
        Ok(config)
    }

    /// Replace the provider named `original_name`.
    ///
    /// A rename removes the provider's connections and follows the
    /// selection.
    ///
    /// # Errors
    ///
    /// [`FlowError::Validation`] if the config is invalid, the new name is
    /// taken or no provider is named `original_name`.
    pub fn update_provider(&self, original_name: &str, config: ProviderConfig) -> Result<ProviderConfig> {
        let config = config.trimmed();
        config.validate()?;
        if !self.is_name_available(&config.provider_name, Some(original_name))? {
            return Err(duplicate_name(&config.provider_name));
        }

        self.store.transact(|doc| {
            let slot = doc
                .providers
                .iter_mut()
                .find(|p| p.provider_name == original_name)
                .ok_or_else(|| unknown_provider(original_name))?;
            *slot = config.clone();

            if config.provider_name != original_name {
                drop_connections_of(&mut doc.connections, original_name);
            }
            if doc
                .selected_provider
                .as_ref()
                .is_some_and(|p| p.provider_name == original_name)
            {
                doc.selected_provider = Some(config.clone());
            }
            Ok(())
        })?;
        Ok(config)
    }

    /// Remove a provider and its connections. Clears the selection if it
    /// pointed at the provider.
    ///
    /// # Errors
    ///
    /// [`FlowError::Validation`] if no provider has that name.
    pub fn remove_provider(&self, name: &str) -> Result<()> {
        self.store.transact(|doc| {
            let before = doc.providers.len();
            doc.providers.retain(|p| p.provider_name != name);
            if doc.providers.len() == before {
                return Err(unknown_provider(name));
            }
            drop_connections_of(&mut doc.connections, name);
            if doc
                .selected_provider
                .as_ref()
                .is_some_and(|p| p.provider_name == name)
            {
                doc.selected_provider = None;
            }
            Ok(())
        })?;
        tracing::info!(provider = %name, "provider removed");
        Ok(())
    }

    /// Select the provider for the next flow.
    ///
    /// # Errors
    ///
    /// [`FlowError::Validation`] if no provider has that name.
    pub fn select_provider(&self, name: &str) -> Result<ProviderConfig> {
        let provider = self.provider(name)?.ok_or_else(|| unknown_provider(name))?;
        self.store.set_selected_provider(Some(provider.clone()))?;
        Ok(provider)
    }

    /// The selected provider.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub fn selected(&self) -> Result<Option<ProviderConfig>> {
        self.store.selected_provider()
    }

    /// All connections.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub fn connections(&self) -> Result<Vec<ConnectionRecord>> {
        self.store.connections()
    }

    /// Connections belonging to `provider_name`.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub fn connections_for(&self, provider_name: &str) -> Result<Vec<ConnectionRecord>> {
        let mut connections = self.store.connections()?;
        connections.retain(|c| c.provider_name == provider_name);
        Ok(connections)
    }

    /// Find one connection.
    ///
    /// # Errors
    ///
    /// Storage failures.
    pub fn connection(&self, provider_name: &str, user_id: &str) -> Result<Option<ConnectionRecord>> {
        Ok(self
            .store
            .connections()?
            .into_iter()
            .find(|c| c.is(provider_name, user_id)))
    }

    /// Save a new connection, replacing any with the same provider and user.
    ///
    /// # Errors
    ///
    /// [`FlowError::Validation`] if the record is invalid.
    pub fn add_connection(&self, record: ConnectionRecord) -> Result<()> {
        record.validate()?;
        let mut connections = self.store.connections()?;
        connections.retain(|c| !c.is(&record.provider_name, &record.user_id));
        connections.push(record);
        self.store.set_connections(connections)
    }

    /// Replace the connection that was stored under `previous_user_id`.
    ///
    /// # Errors
    ///
    /// [`FlowError::Validation`] if the record is invalid or no such
    /// connection exists.
    pub fn update_connection(&self, previous_user_id: &str, record: ConnectionRecord) -> Result<()> {
        record.validate()?;
        let mut connections = self.store.connections()?;
        let index = connections
            .iter()
            .position(|c| c.is(&record.provider_name, previous_user_id))
            .ok_or_else(|| unknown_connection(&record.provider_name, previous_user_id))?;

        connections.remove(index);
        connections.retain(|c| !c.is(&record.provider_name, &record.user_id));
        connections.insert(index.min(connections.len()), record);
        self.store.set_connections(connections)
    }

    /// Delete one connection.
    ///
    /// # Errors
    ///
    /// [`FlowError::Validation`] if no such connection exists.
    pub fn remove_connection(&self, provider_name: &str, user_id: &str) -> Result<()> {
        let mut connections = self.store.connections()?;
        let before = connections.len();
        connections.retain(|c| !c.is(provider_name, user_id));
        if connections.len() == before {
            return Err(unknown_connection(provider_name, user_id));
        }
        self.store.set_connections(connections)
    }
}

fn drop_connections_of(connections: &mut Vec<ConnectionRecord>, provider_name: &str) {
    let before = connections.len();
    connections.retain(|c| c.provider_name != provider_name);
    if connections.len() != before {
        tracing::info!(
            provider = %provider_name,
            removed = before - connections.len(),
            "connections removed with provider"
        );
    }
}

fn duplicate_name(name: &str) -> FlowError {
    FlowError::validation(format!("Provider Name \"{name}\" is already in use."))
}

fn unknown_provider(name: &str) -> FlowError {
    FlowError::validation(format!("No provider named \"{name}\"."))
}

fn unknown_connection(provider_name: &str, user_id: &str) -> FlowError {
    FlowError::validation(format!(
        "No connection for user \"{user_id}\" on provider \"{provider_name}\"."
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::BootstrapInfo;
    use crate::providers::{MemoryPreferences, PreferenceDocument};

    fn provider(name: &str) -> ProviderConfig {
        ProviderConfig::new(
            name,
            "https://wopi.contoso.com/b",
            "id",
            "secret",
            "https://localhost/r",
        )
    }

    fn record(provider: &str, user: &str) -> ConnectionRecord {
        ConnectionRecord {
            provider_name: provider.into(),
            user_id: user.into(),
            user_name: String::new(),
            friendly_name: String::new(),
            post_auth_token_issuance_url: String::new(),
            session_context: String::new(),
            access_token: "at".into(),
            token_expiration: 0,
            expires_at: None,
            refresh_token: String::new(),
            bootstrap_info: BootstrapInfo {
                authorization_url: "https://login.contoso.com/a".into(),
                token_issuance_url: "https://login.contoso.com/t".into(),
                provider_id: None,
            },
        }
    }

    fn catalog() -> ProviderCatalog<MemoryPreferences> {
        ProviderCatalog::new(MemoryPreferences::new())
    }

    #[test]
    fn add_trims_and_rejects_duplicates() {
        let catalog = catalog();
        let added = catalog.add_provider(provider(" Contoso ")).unwrap();
        assert_eq!(added.provider_name, "Contoso");

        let error = catalog.add_provider(provider("Contoso")).unwrap_err();
        assert_eq!(error.to_string(), "Provider Name \"Contoso\" is already in use.");
    }

    #[test]
    fn invalid_config_is_not_saved() {
        let catalog = catalog();
        let mut config = provider("Contoso");
        config.client_secret.clear();
        assert!(catalog.add_provider(config).is_err());
        assert!(catalog.providers().unwrap().is_empty());
    }

    #[test]
    fn rename_cascades_and_follows_selection() {
        let catalog = catalog();
        catalog.add_provider(provider("Contoso")).unwrap();
        catalog.select_provider("Contoso").unwrap();
        catalog.add_connection(record("Contoso", "u1")).unwrap();

        catalog.update_provider("Contoso", provider("Fabrikam")).unwrap();

        assert!(catalog.connections().unwrap().is_empty());
        assert_eq!(catalog.selected().unwrap().unwrap().provider_name, "Fabrikam");
    }

    #[test]
    fn edit_without_rename_keeps_connections() {
        let catalog = catalog();
        catalog.add_provider(provider("Contoso")).unwrap();
        catalog.add_connection(record("Contoso", "u1")).unwrap();

        catalog
            .update_provider("Contoso", provider("Contoso").with_scope("wopi"))
            .unwrap();
        assert_eq!(catalog.connections_for("Contoso").unwrap().len(), 1);
    }

    #[test]
    fn remove_cascades_and_clears_selection() {
        let catalog = catalog();
        catalog.add_provider(provider("Contoso")).unwrap();
        catalog.add_provider(provider("Fabrikam")).unwrap();
        catalog.select_provider("Contoso").unwrap();
        catalog.add_connection(record("Contoso", "u1")).unwrap();
        catalog.add_connection(record("Fabrikam", "u2")).unwrap();

        catalog.remove_provider("Contoso").unwrap();

        assert_eq!(catalog.connections().unwrap(), vec![record("Fabrikam", "u2")]);
        assert_eq!(catalog.selected().unwrap(), None);
        assert!(catalog.remove_provider("Contoso").is_err());
    }

    /// Accepts only whole-document transactions.
    struct TransactOnly(MemoryPreferences);

    impl PreferenceStore for TransactOnly {
        fn providers(&self) -> Result<Vec<ProviderConfig>> {
            self.0.providers()
        }

        fn set_providers(&self, _: Vec<ProviderConfig>) -> Result<()> {
            Err(FlowError::Storage("separate write".into()))
        }

        fn connections(&self) -> Result<Vec<ConnectionRecord>> {
            self.0.connections()
        }

        fn set_connections(&self, _: Vec<ConnectionRecord>) -> Result<()> {
            Err(FlowError::Storage("separate write".into()))
        }

        fn selected_provider(&self) -> Result<Option<ProviderConfig>> {
            self.0.selected_provider()
        }

        fn set_selected_provider(&self, _: Option<ProviderConfig>) -> Result<()> {
            Err(FlowError::Storage("separate write".into()))
        }

        fn transact<T>(
            &self,
            change: impl FnOnce(&mut PreferenceDocument) -> Result<T>,
        ) -> Result<T> {
            self.0.transact(change)
        }
    }

    fn transact_only() -> ProviderCatalog<TransactOnly> {
        ProviderCatalog::new(TransactOnly(MemoryPreferences::with_document(PreferenceDocument {
            providers: vec![provider("Contoso"), provider("Fabrikam")],
            selected_provider: Some(provider("Contoso")),
            connections: vec![record("Contoso", "u1"), record("Fabrikam", "u2")],
            ..PreferenceDocument::default()
        })))
    }

    #[test]
    fn cascading_edits_are_one_write() {
        let catalog = transact_only();
        catalog.remove_provider("Contoso").unwrap();
        let doc = catalog.store().0.snapshot();
        assert_eq!(doc.providers, vec![provider("Fabrikam")]);
        assert_eq!(doc.connections, vec![record("Fabrikam", "u2")]);
        assert_eq!(doc.selected_provider, None);

        let catalog = transact_only();
        catalog.update_provider("Contoso", provider("Northwind")).unwrap();
        let doc = catalog.store().0.snapshot();
        assert_eq!(doc.providers[0].provider_name, "Northwind");
        assert_eq!(doc.connections, vec![record("Fabrikam", "u2")]);
        assert_eq!(doc.selected_provider.unwrap().provider_name, "Northwind");
    }

    #[test]
    fn unknown_provider_leaves_the_document_alone() {
        let catalog = transact_only();
        let before = catalog.store().0.snapshot();
        assert!(catalog.remove_provider("Northwind").is_err());
        assert!(catalog.update_provider("Northwind", provider("Tailspin")).is_err());
        assert_eq!(catalog.store().0.snapshot(), before);
    }

    #[test]
    fn same_user_replaces_connection() {
        let catalog = catalog();
        catalog.add_connection(record("Contoso", "u1")).unwrap();
        let mut again = record("Contoso", "u1");
        again.access_token = "newer".into();
        catalog.add_connection(again).unwrap();

        let connections = catalog.connections().unwrap();
        assert_eq!(connections.len(), 1);
        assert_eq!(connections[0].access_token, "newer");
    }

    #[test]
    fn update_connection_handles_user_id_change() {
        let catalog = catalog();
        catalog.add_connection(record("Contoso", "u1")).unwrap();
        catalog.add_connection(record("Contoso", "u2")).unwrap();

        catalog.update_connection("u1", record("Contoso", "u3")).unwrap();

        let ids: Vec<_> = catalog
            .connections()
            .unwrap()
            .into_iter()
            .map(|c| c.user_id)
            .collect();
        assert_eq!(ids, vec!["u3", "u2"]);
        assert!(catalog.update_connection("gone", record("Contoso", "u9")).is_err());
    }

    #[test]
    fn remove_connection_requires_match() {
        let catalog = catalog();
        catalog.add_connection(record("Contoso", "u1")).unwrap();
        catalog.remove_connection("Contoso", "u1").unwrap();
        assert!(catalog.remove_connection("Contoso", "u1").is_err());
    }
}

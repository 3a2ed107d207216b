//! Preference stores.

use super::PreferenceStore;
use crate::connection::ConnectionRecord;
use crate::error::{FlowError, Result};
use crate::provider::ProviderConfig;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Current preference file version.
pub const DOCUMENT_VERSION: u32 = 1;

/// Everything the preference store holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferenceDocument {
    /// File format version.
    pub version: u32,
    /// Configured providers.
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    /// Provider selected for the next flow.
    #[serde(default)]
    pub selected_provider: Option<ProviderConfig>,
    /// Saved connections.
    #[serde(default)]
    pub connections: Vec<ConnectionRecord>,
}

impl Default for PreferenceDocument {
    fn default() -> Self {
        Self {
            version: DOCUMENT_VERSION,
            providers: Vec::new(),
            selected_provider: None,
            connections: Vec::new(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryPreferences {
    document: Arc<Mutex<PreferenceDocument>>,
}

impl MemoryPreferences {
    /// Empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with `document`.
    #[must_use]
    pub fn with_document(document: PreferenceDocument) -> Self {
        Self {
            document: Arc::new(Mutex::new(document)),
        }
    }

    /// Copy of the current contents.
    #[must_use]
    pub fn snapshot(&self) -> PreferenceDocument {
        lock(&self.document).clone()
    }
}

impl PreferenceStore for MemoryPreferences {
    fn providers(&self) -> Result<Vec<ProviderConfig>> {
        Ok(lock(&self.document).providers.clone())
    }

    fn set_providers(&self, providers: Vec<ProviderConfig>) -> Result<()> {
        lock(&self.document).providers = providers;
        Ok(())
    }

    fn connections(&self) -> Result<Vec<ConnectionRecord>> {
        Ok(lock(&self.document).connections.clone())
    }

    fn set_connections(&self, connections: Vec<ConnectionRecord>) -> Result<()> {
        lock(&self.document).connections = connections;
        Ok(())
    }

    fn selected_provider(&self) -> Result<Option<ProviderConfig>> {
        Ok(lock(&self.document).selected_provider.clone())
    }

    fn set_selected_provider(&self, provider: Option<ProviderConfig>) -> Result<()> {
        lock(&self.document).selected_provider = provider;
        Ok(())
    }

    fn transact<T>(&self, change: impl FnOnce(&mut PreferenceDocument) -> Result<T>) -> Result<T> {
        let mut document = lock(&self.document);
        let mut draft = document.clone();
        let value = change(&mut draft)?;
        *document = draft;
        Ok(value)
    }
}

/// JSON file store.
///
/// Every accessor reads the file; every mutator rewrites it through a
/// temporary file and a rename. A missing file reads as empty.
#[derive(Debug, Clone)]
pub struct JsonFilePreferences {
    path: PathBuf,
    guard: Arc<Mutex<()>>,
}

impl JsonFilePreferences {
    /// Store backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Arc::new(Mutex::new(())),
        }
    }

    /// The backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the whole document.
    ///
    /// # Errors
    ///
    /// [`FlowError::Storage`] if the file cannot be read or parsed, or has an
    /// unsupported version.
    pub fn load(&self) -> Result<PreferenceDocument> {
        let _held = lock(&self.guard);
        self.read()
    }

    fn read(&self) -> Result<PreferenceDocument> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Ok(PreferenceDocument::default());
            }
            Err(error) => return Err(error.into()),
        };
        let document: PreferenceDocument = serde_json::from_slice(&bytes)?;
        if document.version != DOCUMENT_VERSION {
            return Err(FlowError::Storage(format!(
                "Unsupported preference file version: {}",
                document.version
            )));
        }
        Ok(document)
    }

    fn write(&self, document: &PreferenceDocument) -> Result<()> {
        let json = serde_json::to_vec_pretty(document)?;
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(&json)?;
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|error| error.error)?;
        tracing::debug!(path = %self.path.display(), "preferences saved");
        Ok(())
    }

    fn update(&self, change: impl FnOnce(&mut PreferenceDocument)) -> Result<()> {
        self.transact(|document| {
            change(document);
            Ok(())
        })
    }
}

impl PreferenceStore for JsonFilePreferences {
    fn providers(&self) -> Result<Vec<ProviderConfig>> {
        Ok(self.load()?.providers)
    }

    fn set_providers(&self, providers: Vec<ProviderConfig>) -> Result<()> {
        self.update(|doc| doc.providers = providers)
    }

    fn connections(&self) -> Result<Vec<ConnectionRecord>> {
        Ok(self.load()?.connections)
    }

    fn set_connections(&self, connections: Vec<ConnectionRecord>) -> Result<()> {
        self.update(|doc| doc.connections = connections)
    }

    fn selected_provider(&self) -> Result<Option<ProviderConfig>> {
        Ok(self.load()?.selected_provider)
    }

    fn set_selected_provider(&self, provider: Option<ProviderConfig>) -> Result<()> {
        self.update(|doc| doc.selected_provider = provider)
    }

    fn transact<T>(&self, change: impl FnOnce(&mut PreferenceDocument) -> Result<T>) -> Result<T> {
        let _held = lock(&self.guard);
        let mut document = self.read()?;
        let value = change(&mut document)?;
        self.write(&document)?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contoso() -> ProviderConfig {
        ProviderConfig::new(
            "Contoso",
            "https://wopi.contoso.com/b",
            "id",
            "secret",
            "https://localhost/r",
        )
    }

    #[test]
    fn memory_store_keeps_values() {
        let store = MemoryPreferences::new();
        store.set_providers(vec![contoso()]).unwrap();
        store.set_selected_provider(Some(contoso())).unwrap();
        assert_eq!(store.providers().unwrap(), vec![contoso()]);
        assert_eq!(store.snapshot().selected_provider, Some(contoso()));
        assert!(store.connections().unwrap().is_empty());
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFilePreferences::new(dir.path().join("absent.json"));
        assert_eq!(store.load().unwrap(), PreferenceDocument::default());
    }

    #[test]
    fn file_store_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        let store = JsonFilePreferences::new(&path);

        store.set_providers(vec![contoso()]).unwrap();
        store.set_selected_provider(Some(contoso())).unwrap();

        let reopened = JsonFilePreferences::new(&path);
        assert_eq!(reopened.providers().unwrap(), vec![contoso()]);
        assert_eq!(reopened.selected_provider().unwrap(), Some(contoso()));

        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert_eq!(raw["providers"][0]["providerName"], "Contoso");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("prefs.json")]);
    }

    #[test]
    fn unsupported_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, r#"{"version":2,"providers":[]}"#).unwrap();

        let error = JsonFilePreferences::new(&path).load().unwrap_err();
        assert_eq!(
            error,
            FlowError::Storage("Unsupported preference file version: 2".into())
        );
    }

    #[test]
    fn failed_transaction_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        let file = JsonFilePreferences::new(&path);
        file.set_providers(vec![contoso()]).unwrap();
        let memory = MemoryPreferences::new();
        memory.set_providers(vec![contoso()]).unwrap();

        let abort = |doc: &mut PreferenceDocument| -> Result<()> {
            doc.providers.clear();
            Err(FlowError::validation("abort"))
        };
        assert!(file.transact(abort).is_err());
        assert!(memory.transact(abort).is_err());

        assert_eq!(file.providers().unwrap(), vec![contoso()]);
        assert_eq!(memory.providers().unwrap(), vec![contoso()]);
    }

    #[test]
    fn separate_handles_can_write_the_same_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let store = JsonFilePreferences::new(&path);
                scope.spawn(move || {
                    for _ in 0..25 {
                        store.set_providers(vec![contoso()]).unwrap();
                    }
                });
            }
        });

        assert_eq!(JsonFilePreferences::new(&path).providers().unwrap(), vec![contoso()]);
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            JsonFilePreferences::new(&path).providers(),
            Err(FlowError::Storage(_))
        ));
    }
}

use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::gateway::Gateway;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("gateway {0} is not supported")]
    UnsupportedGateway(String),
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("credential write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Armazenamento chave/valor local (equivalente ao localStorage do PDV).
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CredentialError>;
    fn set(&self, key: &str, value: &str) -> Result<(), CredentialError>;
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, CredentialError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// A single JSON object file holding every namespaced entry.
pub struct JsonFileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, CredentialError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, CredentialError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        let _guard = self.write_lock.lock();
        let mut entries = self.read_all()?;
        entries.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        // Escreve num arquivo temporário e renomeia para não corromper o original
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

/// Credenciais por gateway, compartilhadas pelo processo.
///
/// Escritores são serializados por `writer` e persistem fora do `RwLock`;
/// leitores do dispatch só esperam a troca do mapa. Vale a última escrita.
pub struct CredentialStore {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
    keys: RwLock<BTreeMap<Gateway, String>>,
    writer: Mutex<()>,
}

impl CredentialStore {
    pub fn load(store: Arc<dyn KeyValueStore>, namespace: impl Into<String>) -> Self {
        let credentials = Self {
            store,
            namespace: namespace.into(),
            keys: RwLock::new(BTreeMap::new()),
            writer: Mutex::new(()),
        };
        credentials.reload();
        credentials
    }

    pub fn in_memory() -> Self {
        Self::load(Arc::new(MemoryStore::new()), "payment_gateway_config")
    }

    fn defaults() -> BTreeMap<Gateway, String> {
        Gateway::SUPPORTED
            .into_iter()
            .map(|gateway| (gateway, String::new()))
            .collect()
    }

    /// Re-reads the persisted namespace and merges it over the defaults.
    pub fn reload(&self) {
        let _writer = self.writer.lock();
        let mut merged = Self::defaults();

        match self.store.get(&self.namespace) {
            Ok(Some(raw)) => match serde_json::from_str::<BTreeMap<String, String>>(&raw) {
                Ok(persisted) => {
                    for (name, key) in persisted {
                        let gateway = Gateway::from(name);
                        if gateway.is_supported() {
                            merged.insert(gateway, key);
                        } else {
                            warn!("Ignoring stored credential for unknown gateway {}", gateway);
                        }
                    }
                }
                Err(e) => warn!("Ignoring malformed credential store entry: {}", e),
            },
            Ok(None) => {}
            Err(e) => warn!("Failed to read credential store: {}", e),
        }

        *self.keys.write() = merged;
    }

    pub fn save(&self) -> Result<(), CredentialError> {
        let snapshot = self.keys.read().clone();
        self.persist(&snapshot)
    }

    fn persist(&self, keys: &BTreeMap<Gateway, String>) -> Result<(), CredentialError> {
        let serialized: BTreeMap<&str, &str> = keys
            .iter()
            .map(|(gateway, key)| (gateway.as_str(), key.as_str()))
            .collect();
        self.store
            .set(&self.namespace, &serde_json::to_string(&serialized)?)
    }

    /// Grava a chave e reescreve o namespace inteiro. Se a persistência falhar,
    /// o estado em memória não muda.
    pub fn set_api_key(&self, gateway: &Gateway, key: &str) -> Result<(), CredentialError> {
        if !gateway.is_supported() {
            return Err(CredentialError::UnsupportedGateway(gateway.to_string()));
        }

        let _writer = self.writer.lock();
        let mut updated = self.keys.read().clone();
        updated.insert(gateway.clone(), key.to_string());
        self.persist(&updated)?;
        *self.keys.write() = updated;

        info!("Credential updated for gateway {}", gateway);
        Ok(())
    }

    pub fn remove_api_key(&self, gateway: &Gateway) -> Result<(), CredentialError> {
        self.set_api_key(gateway, "")
    }

    pub fn api_key(&self, gateway: &Gateway) -> Option<String> {
        self.keys
            .read()
            .get(gateway)
            .filter(|key| !key.is_empty())
            .cloned()
    }

    pub fn is_configured(&self, gateway: &Gateway) -> bool {
        self.keys
            .read()
            .get(gateway)
            .map_or(false, |key| !key.is_empty())
    }

    pub fn configured(&self) -> BTreeSet<Gateway> {
        self.keys
            .read()
            .iter()
            .filter(|(_, key)| !key.is_empty())
            .map(|(gateway, _)| gateway.clone())
            .collect()
    }
}

//! Persisted connection parameters.
//!
//! The store maps server names to the parameters needed to reach them and
//! keeps the names in a stable order. That order is what ordinal addressing
//! (`#1`, `#2`, ...) resolves against, so entries are never reordered:
//! re-appending an existing name updates it in place.

use crate::error::StoreError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::info;

/// How to reach a server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "transport", rename_all = "snake_case")]
pub enum ConnectionParams {
    /// Remote console on the controller's configured host.
    Rcon { port: u16, password: String },
    /// The backend dials in; only its declared type is remembered.
    Socket {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server_type: Option<String>,
    },
}

/// A named entry in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub name: String,
    pub params: ConnectionParams,
}

/// Storage for connection parameters.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// All entries, in ordinal order.
    async fn servers(&self) -> Vec<ServerEntry>;

    /// Names in ordinal order.
    async fn ordered_names(&self) -> Vec<String> {
        self.servers().await.into_iter().map(|entry| entry.name).collect()
    }

    /// Adds `name`, or replaces its parameters if it is already present.
    async fn append(&self, name: &str, params: ConnectionParams) -> Result<(), StoreError>;

    /// Flushes pending changes.
    async fn save(&self) -> Result<(), StoreError>;
}

fn upsert(entries: &mut Vec<ServerEntry>, name: &str, params: ConnectionParams) {
    match entries.iter_mut().find(|entry| entry.name == name) {
        Some(entry) => entry.params = params,
        None => entries.push(ServerEntry {
            name: name.to_string(),
            params,
        }),
    }
}

/// A store that lives only in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<Vec<ServerEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: Vec<ServerEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }
}

#[async_trait]
impl ConnectionStore for MemoryStore {
    async fn servers(&self) -> Vec<ServerEntry> {
        self.entries.read().await.clone()
    }

    async fn append(&self, name: &str, params: ConnectionParams) -> Result<(), StoreError> {
        upsert(&mut *self.entries.write().await, name, params);
        Ok(())
    }

    async fn save(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    #[serde(default)]
    servers: Vec<ServerEntry>,
}

/// A store backed by a TOML file.
///
/// Entries are held in memory; [`save`](ConnectionStore::save) rewrites the
/// whole file.
///
/// ```toml
/// [[servers]]
/// name = "survival"
///
/// [servers.params]
/// transport = "rcon"
/// port = 25575
/// password = "secret"
/// ```
#[derive(Debug)]
pub struct TomlFileStore {
    path: PathBuf,
    entries: RwLock<Vec<ServerEntry>>,
}

impl TomlFileStore {
    /// Loads the store at `path`. A missing file yields an empty store.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            let content = tokio::fs::read_to_string(&path).await?;
            toml::from_str::<StoreFile>(&content)?.servers
        } else {
            info!("Connection store {} not found, starting empty", path.display());
            Vec::new()
        };
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ConnectionStore for TomlFileStore {
    async fn servers(&self) -> Vec<ServerEntry> {
        self.entries.read().await.clone()
    }

    async fn append(&self, name: &str, params: ConnectionParams) -> Result<(), StoreError> {
        upsert(&mut *self.entries.write().await, name, params);
        Ok(())
    }

    async fn save(&self) -> Result<(), StoreError> {
        let file = StoreFile {
            servers: self.entries.read().await.clone(),
        };
        let content = toml::to_string_pretty(&file)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, content).await?;
        Ok(())
    }
}

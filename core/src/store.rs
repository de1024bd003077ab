use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use kernelscout_protocol::KernelConnection;
use serde::Deserialize;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::warn;

/// Persisted cache payload: the candidate list plus the schema version of
/// the writer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedCandidates {
    pub schema_version: String,
    pub candidates: Vec<KernelConnection>,
}

impl CachedCandidates {
    pub fn new(schema_version: impl Into<String>, candidates: Vec<KernelConnection>) -> Self {
        Self {
            schema_version: schema_version.into(),
            candidates,
        }
    }

    /// The candidates, or empty when written by a different schema version.
    /// Stale-format entries are discarded rather than migrated.
    pub fn take_if_version(self, schema_version: &str) -> Vec<KernelConnection> {
        if self.schema_version == schema_version {
            self.candidates
        } else {
            warn!(
                "discarding kernel cache written by version {}, current is {schema_version}",
                self.schema_version
            );
            Vec::new()
        }
    }
}

/// Keyed storage for cached candidates. One key per remote server.
#[async_trait]
pub trait CandidateStore: Send + Sync {
    async fn read(&self, key: &str) -> anyhow::Result<Option<CachedCandidates>>;
    async fn write(&self, key: &str, entry: &CachedCandidates) -> anyhow::Result<()>;
}

/// Process-local store, the default for hosts that persist nothing.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, CachedCandidates>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CandidateStore for MemoryStore {
    async fn read(&self, key: &str) -> anyhow::Result<Option<CachedCandidates>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn write(&self, key: &str, entry: &CachedCandidates) -> anyhow::Result<()> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), entry.clone());
        Ok(())
    }
}

/// One JSON file per key under a directory. An unreadable file is treated
/// as absent so a corrupt cache never blocks discovery.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl CandidateStore for JsonFileStore {
    async fn read(&self, key: &str) -> anyhow::Result<Option<CachedCandidates>> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(entry) => Ok(Some(entry)),
            Err(err) => {
                warn!("kernel cache at {path:?} is unreadable ({err}); discarding");
                if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                    warn!("failed to remove corrupted kernel cache {path:?}: {remove_err}");
                }
                Ok(None)
            }
        }
    }

    async fn write(&self, key: &str, entry: &CachedCandidates) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(key);
        let tmp_path = self.dir.join(format!("{key}.json.tmp"));
        let data = serde_json::to_vec_pretty(entry)?;
        {
            let mut file = tokio::fs::File::create(&tmp_path).await?;
            file.write_all(&data).await?;
            file.sync_all().await?;
        }
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }
}

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::Mutex;

/// Small string key-value store used to remember upstream versions between runs.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, String>;
    async fn set(&self, key: &str, value: String) -> Result<(), String>;
}

/// Keeps every entry in a single pretty-printed JSON object on disk.
pub struct FileStore {
    path: PathBuf,
    // Serialises read-modify-write cycles of the backing file.
    lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, String> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(BTreeMap::new());
            }
            Err(err) => return Err(format!("failed to read version cache: {err}")),
        };
        serde_json::from_slice(&bytes).map_err(|e| format!("failed to parse version cache: {e}"))
    }

    async fn save(&self, entries: &BTreeMap<String, String>) -> Result<(), String> {
        let bytes = serde_json::to_vec_pretty(entries)
            .map_err(|e| format!("failed to serialize version cache: {e}"))?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| format!("unable to create cache dir: {e}"))?;
        }
        fs::write(&self.path, &bytes)
            .await
            .map_err(|e| format!("failed to write version cache: {e}"))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>, String> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: String) -> Result<(), String> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_owned(), value);
        self.save(&entries).await
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, String> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: String) -> Result<(), String> {
        self.entries.lock().await.insert(key.to_owned(), value);
        Ok(())
    }
}

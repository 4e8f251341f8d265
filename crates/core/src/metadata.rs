use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::DateTime;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::error::Result;

const STORES_FILE: &str = "stores.json";
const FILES_FILE: &str = "files.json";
const POINTER_FILE: &str = "store.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreRecord {
    pub name: String,
    pub display_name: String,
    /// Milliseconds since the Unix epoch; 0 when the remote did not report one.
    pub create_time: i64,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    pub store_name: String,
    pub file_name: String,
    pub display_name: String,
}

#[derive(Debug, Clone)]
pub struct NewStore {
    pub name: String,
    pub display_name: String,
    pub create_time: i64,
}

impl NewStore {
    /// Builds a record from remote fields; `create_time` is an RFC 3339 timestamp.
    pub fn from_remote(name: &str, display_name: Option<&str>, create_time: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.unwrap_or_default().to_string(),
            create_time: create_time
                .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
                .map(|value| value.timestamp_millis())
                .unwrap_or(0),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoresDocument {
    #[serde(default)]
    stores: Vec<StoreRecord>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct FilesDocument {
    #[serde(default)]
    files: Vec<FileRecord>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PointerDocument {
    #[serde(default)]
    store_name: Option<String>,
}

/// JSON-file mirror of the stores and documents known to this installation.
///
/// Every mutation is a whole-file read-modify-write. All clones share one lock, so in-process
/// writers are serialized; separate processes pointed at the same directory are not.
#[derive(Clone)]
pub struct MetadataStore {
    dir: PathBuf,
    lock: Arc<Mutex<()>>,
}

impl MetadataStore {
    pub fn open<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    fn stores_path(&self) -> PathBuf {
        self.dir.join(STORES_FILE)
    }

    fn files_path(&self) -> PathBuf {
        self.dir.join(FILES_FILE)
    }

    fn pointer_path(&self) -> PathBuf {
        self.dir.join(POINTER_FILE)
    }

    pub async fn list_stores(&self) -> Result<Vec<StoreRecord>> {
        let _guard = self.lock.lock().await;
        let doc: StoresDocument = read_document(&self.stores_path()).await?;
        Ok(doc.stores)
    }

    /// Appends a store record. The first record ever stored becomes the active one.
    pub async fn insert_store(&self, store: NewStore) -> Result<StoreRecord> {
        let _guard = self.lock.lock().await;
        let path = self.stores_path();
        let mut doc: StoresDocument = read_document(&path).await?;
        let record = StoreRecord {
            name: store.name,
            display_name: store.display_name,
            create_time: store.create_time,
            active: doc.stores.is_empty(),
        };
        doc.stores.push(record.clone());
        write_document(&path, &doc).await?;
        info!(store = %record.name, active = record.active, "recorded store");
        Ok(record)
    }

    /// Removes every record named `name`. An active record is not replaced.
    pub async fn delete_store(&self, name: &str) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let path = self.stores_path();
        let mut doc: StoresDocument = read_document(&path).await?;
        let before = doc.stores.len();
        doc.stores.retain(|store| store.name != name);
        let removed = before - doc.stores.len();
        write_document(&path, &doc).await?;
        info!(store = %name, removed, "removed store records");
        Ok(removed)
    }

    /// Marks `name` active and every other record inactive. Returns whether `name` matched.
    pub async fn set_active_store(&self, name: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let path = self.stores_path();
        let mut doc: StoresDocument = read_document(&path).await?;
        let mut matched = false;
        for store in &mut doc.stores {
            store.active = store.name == name;
            matched |= store.active;
        }
        write_document(&path, &doc).await?;
        if matched {
            info!(store = %name, "activated store");
        } else {
            warn!(store = %name, "no such store recorded; no store is active now");
        }
        Ok(matched)
    }

    pub async fn active_store_name(&self) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        let doc: StoresDocument = read_document(&self.stores_path()).await?;
        Ok(doc
            .stores
            .into_iter()
            .find(|store| store.active)
            .map(|store| store.name))
    }

    /// Explicit name (if non-blank), then `override_name`, then the active store.
    pub async fn resolve_store(
        &self,
        explicit: Option<&str>,
        override_name: Option<&str>,
    ) -> Result<Option<String>> {
        let pick = |value: Option<&str>| {
            value
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        if let Some(name) = pick(explicit).or_else(|| pick(override_name)) {
            return Ok(Some(name));
        }
        self.active_store_name().await
    }

    pub async fn insert_file(&self, file: FileRecord) -> Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.files_path();
        let mut doc: FilesDocument = read_document(&path).await?;
        info!(store = %file.store_name, file = %file.file_name, "recorded file");
        doc.files.push(file);
        write_document(&path, &doc).await
    }

    pub async fn delete_files_of_store(&self, store_name: &str) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let path = self.files_path();
        let mut doc: FilesDocument = read_document(&path).await?;
        let before = doc.files.len();
        doc.files.retain(|file| file.store_name != store_name);
        let removed = before - doc.files.len();
        write_document(&path, &doc).await?;
        info!(store = %store_name, removed, "removed file records");
        Ok(removed)
    }

    pub async fn list_files(&self, store_name: Option<&str>) -> Result<Vec<FileRecord>> {
        let _guard = self.lock.lock().await;
        let doc: FilesDocument = read_document(&self.files_path()).await?;
        Ok(match store_name {
            Some(name) => doc
                .files
                .into_iter()
                .filter(|file| file.store_name == name)
                .collect(),
            None => doc.files,
        })
    }

    pub async fn save_last_created(&self, store_name: &str) -> Result<()> {
        let _guard = self.lock.lock().await;
        write_document(
            &self.pointer_path(),
            &PointerDocument {
                store_name: Some(store_name.to_string()),
            },
        )
        .await
    }

    pub async fn last_created(&self) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        let doc: PointerDocument = read_document(&self.pointer_path()).await?;
        Ok(doc.store_name)
    }

    /// Clears the last-created pointer if it refers to `store_name`.
    pub async fn forget_last_created(&self, store_name: &str) -> Result<bool> {
        let _guard = self.lock.lock().await;
        let path = self.pointer_path();
        let doc: PointerDocument = read_document(&path).await?;
        if doc.store_name.as_deref() != Some(store_name) {
            return Ok(false);
        }
        write_document(&path, &PointerDocument::default()).await?;
        Ok(true)
    }
}

/// Reads a JSON document, creating it with the default value when it does not exist yet.
async fn read_document<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned + Default + Serialize,
{
    match fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            let doc = T::default();
            write_document(path, &doc).await?;
            Ok(doc)
        }
        Err(err) => Err(err.into()),
    }
}

async fn write_document<T: Serialize>(path: &Path, doc: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut bytes = serde_json::to_vec_pretty(doc)?;
    bytes.push(b'\n');
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, &bytes).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

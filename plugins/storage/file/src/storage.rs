use std::collections::HashMap;
use std::future::Future;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tokio::sync::Mutex;

use bridge_api::{DocumentCollection, DocumentId, DocumentStore, PluginError, now_ms};

use super::config::{DiskDocument, FileStoreConfig};

// ════════════════════════════════════════════════════════════════
//  FileCollection
// ════════════════════════════════════════════════════════════════

/// Коллекция в одном JSONL файле, только append.
pub struct FileCollection {
    name: String,
    path: PathBuf,
    next_id: AtomicU64,
    write_lock: Mutex<()>,
    closed: Arc<AtomicBool>,
}

impl FileCollection {
    fn open(name: &str, path: PathBuf, closed: Arc<AtomicBool>) -> Result<Self, PluginError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PluginError::io(format!("mkdir {}: {e}", parent.display())))?;
        }
        // id продолжают нумерацию существующего файла
        let existing = count_lines(&path)?;
        Ok(Self {
            name: name.to_string(),
            path,
            next_id: AtomicU64::new(existing + 1),
            write_lock: Mutex::new(()),
            closed,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Прочитать все документы коллекции.
    pub fn read_all(&self) -> Result<Vec<serde_json::Value>, PluginError> {
        let f = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PluginError::io(format!("open {}: {e}", self.path.display()))),
        };
        let mut docs = Vec::new();
        for line in std::io::BufReader::new(f).lines() {
            let line = line.map_err(|e| PluginError::io(format!("read line: {e}")))?;
            if line.is_empty() {
                continue;
            }
            let disk: DiskDocument = serde_json::from_str(&line)
                .map_err(|e| PluginError::format_err(format!("parse json: {e}")))?;
            docs.push(disk.document);
        }
        Ok(docs)
    }

    fn append_line(&self, line: &str) -> Result<(), PluginError> {
        let mut f = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| PluginError::io(format!("open {}: {e}", self.path.display())))?;
        writeln!(f, "{line}").map_err(|e| PluginError::io(format!("write: {e}")))
    }
}

fn count_lines(path: &Path) -> Result<u64, PluginError> {
    match std::fs::File::open(path) {
        Ok(f) => {
            let mut n = 0;
            for line in std::io::BufReader::new(f).lines() {
                let line = line.map_err(|e| PluginError::io(format!("read line: {e}")))?;
                if !line.is_empty() {
                    n += 1;
                }
            }
            Ok(n)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(PluginError::io(format!("open {}: {e}", path.display()))),
    }
}

impl DocumentCollection for FileCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn insert_one(
        &self,
        document: serde_json::Value,
    ) -> Pin<Box<dyn Future<Output = Result<DocumentId, PluginError>> + Send + '_>> {
        Box::pin(async move {
            if self.closed.load(Ordering::Acquire) {
                return Err(PluginError::closed("document store"));
            }
            let _guard = self.write_lock.lock().await;
            let id = format!("{:024x}", self.next_id.fetch_add(1, Ordering::Relaxed));
            let line = serde_json::to_string(&DiskDocument {
                id: id.clone(),
                ts_ms: now_ms(),
                document,
            })
            .map_err(|e| PluginError::format_err(format!("json serialize: {e}")))?;
            self.append_line(&line)?;
            Ok(DocumentId(id))
        })
    }
}

// ════════════════════════════════════════════════════════════════
//  FileDocumentStore
// ════════════════════════════════════════════════════════════════

pub struct FileDocumentStore {
    data_dir: PathBuf,
    collections: Mutex<HashMap<(String, String), Arc<FileCollection>>>,
    closed: Arc<AtomicBool>,
}

impl FileDocumentStore {
    pub fn new(config: &FileStoreConfig) -> Self {
        Self {
            data_dir: PathBuf::from(&config.data_dir),
            collections: Mutex::new(HashMap::new()),
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    fn collection_path(&self, db: &str, name: &str) -> PathBuf {
        self.data_dir.join(db).join(format!("{name}.jsonl"))
    }

    /// Конкретный тип коллекции (открывает файл при первом обращении).
    pub async fn file_collection(&self, db: &str, name: &str) -> Result<Arc<FileCollection>, PluginError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PluginError::closed("document store"));
        }
        let mut collections = self.collections.lock().await;
        let key = (db.to_string(), name.to_string());
        if let Some(c) = collections.get(&key) {
            return Ok(c.clone());
        }
        let path = self.collection_path(db, name);
        let collection = Arc::new(FileCollection::open(name, path, self.closed.clone())?);
        tracing::info!(db = %db, collection = %name, path = %collection.path().display(), "opened file collection");
        collections.insert(key, collection.clone());
        Ok(collection)
    }
}

impl DocumentStore for FileDocumentStore {
    fn collection(
        &self,
        db: &str,
        name: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Arc<dyn DocumentCollection>, PluginError>> + Send + '_>> {
        let db = db.to_string();
        let name = name.to_string();
        Box::pin(async move {
            let collection: Arc<dyn DocumentCollection> = self.file_collection(&db, &name).await?;
            Ok(collection)
        })
    }

    fn close(&self) -> Pin<Box<dyn Future<Output = Result<(), PluginError>> + Send + '_>> {
        Box::pin(async move {
            self.closed.store(true, Ordering::Release);
            Ok(())
        })
    }
}

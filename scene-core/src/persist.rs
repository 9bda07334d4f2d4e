//! Persistence of the narrative, layout and session documents.
//!
//! The core only needs two operations from storage: save a named JSON blob
//! and load one (absent if missing). Writes go through a per-name debounce
//! so bursts of edits collapse into one save.

use crate::session::PlaySession;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Errors from persistence operations.
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid document name: {0}")]
    InvalidName(String),
}

/// Storage for named JSON documents.
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    async fn save(&self, name: &str, data: Value) -> Result<(), PersistError>;

    /// Load a document, `None` when nothing is stored under `name`.
    async fn load(&self, name: &str) -> Result<Option<Value>, PersistError>;
}

/// Suffix of the narrative document name.
pub const GAME_DATA_SUFFIX: &str = "gamedata.json";

/// Suffix of the layout document name.
pub const EDITOR_DATA_SUFFIX: &str = "editordata.json";

/// Suffix of the play session entry.
pub const SESSION_SUFFIX: &str = "play-session";

fn document_name(game: Option<&str>, suffix: &str) -> String {
    match game.filter(|g| !g.is_empty()) {
        Some(game) => format!("{game}-{suffix}"),
        None => suffix.to_string(),
    }
}

/// Name of the narrative document for an optional game selector.
pub fn game_data_name(game: Option<&str>) -> String {
    document_name(game, GAME_DATA_SUFFIX)
}

/// Name of the layout document for an optional game selector.
pub fn editor_data_name(game: Option<&str>) -> String {
    document_name(game, EDITOR_DATA_SUFFIX)
}

/// Name of the play session entry for an optional game selector.
pub fn session_name(game: Option<&str>) -> String {
    document_name(game, SESSION_SUFFIX)
}

/// Documents stored as pretty-printed JSON files in one directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    dir: PathBuf,
}

impl DirectoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, PersistError> {
        let plain = !name.is_empty()
            && !name.contains(['/', '\\'])
            && name != "."
            && name != "..";
        if !plain {
            return Err(PersistError::InvalidName(name.to_string()));
        }
        Ok(self.dir.join(name))
    }
}

#[async_trait]
impl PersistenceGateway for DirectoryStore {
    async fn save(&self, name: &str, data: Value) -> Result<(), PersistError> {
        let path = self.path_for(name)?;
        fs::create_dir_all(&self.dir).await?;
        let content = serde_json::to_string_pretty(&data)?;
        fs::write(&path, content).await?;
        info!(path = %path.display(), "document saved");
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<Option<Value>, PersistError> {
        let path = self.path_for(name)?;
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        debug!(path = %path.display(), "document loaded");
        Ok(Some(serde_json::from_str(&content)?))
    }
}

/// In-process store, mostly for tests and previews.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, Value>>,
    writes: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document without counting it as a write.
    pub fn insert(&self, name: impl Into<String>, data: Value) {
        if let Ok(mut documents) = self.documents.lock() {
            documents.insert(name.into(), data);
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.documents.lock().ok()?.get(name).cloned()
    }

    /// Number of `save` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.lock().map(|w| *w).unwrap_or_default()
    }
}

#[async_trait]
impl PersistenceGateway for MemoryStore {
    async fn save(&self, name: &str, data: Value) -> Result<(), PersistError> {
        if let Ok(mut writes) = self.writes.lock() {
            *writes += 1;
        }
        self.insert(name, data);
        Ok(())
    }

    async fn load(&self, name: &str) -> Result<Option<Value>, PersistError> {
        Ok(self.get(name))
    }
}

/// One pending delayed task per key.
///
/// Scheduling a key that already has a pending task aborts that task and
/// starts the delay over. Requires a tokio runtime.
#[derive(Debug, Default)]
pub struct Debouncer {
    pending: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn debounce<F>(&self, key: impl Into<String>, delay: Duration, action: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let key = key.into();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await;
        });

        let Ok(mut pending) = self.pending.lock() else {
            return;
        };
        pending.retain(|_, handle| !handle.is_finished());
        if let Some(previous) = pending.insert(key, task) {
            previous.abort();
        }
    }

    /// Whether any task is still waiting or running.
    pub fn has_pending(&self) -> bool {
        self.pending
            .lock()
            .map(|pending| pending.values().any(|handle| !handle.is_finished()))
            .unwrap_or(false)
    }
}

/// Debounced writer on top of a gateway.
///
/// Failures are logged and not retried; the next mutation schedules a new
/// save anyway.
#[derive(Clone)]
pub struct DebouncedSaver {
    gateway: Arc<dyn PersistenceGateway>,
    debouncer: Arc<Debouncer>,
    delay: Duration,
}

impl DebouncedSaver {
    pub fn new(gateway: Arc<dyn PersistenceGateway>, delay: Duration) -> Self {
        Self {
            gateway,
            debouncer: Arc::new(Debouncer::new()),
            delay,
        }
    }

    pub fn gateway(&self) -> &Arc<dyn PersistenceGateway> {
        &self.gateway
    }

    /// Save after the quiet period, superseding any pending save of `name`.
    pub fn save(&self, name: impl Into<String>, data: Value) {
        self.save_after(name, data, self.delay);
    }

    /// Like [`save`](Self::save) with an explicit delay.
    pub fn save_after(&self, name: impl Into<String>, data: Value, delay: Duration) {
        let name = name.into();
        let gateway = Arc::clone(&self.gateway);
        let key = name.clone();
        self.debouncer.debounce(key, delay, async move {
            if let Err(err) = gateway.save(&name, data).await {
                error!(name = %name, error = %err, "failed to save document");
            }
        });
    }

    pub fn has_pending(&self) -> bool {
        self.debouncer.has_pending()
    }
}

/// Load a document and deserialize it, `None` when absent.
pub async fn load_document<T>(
    gateway: &dyn PersistenceGateway,
    name: &str,
) -> Result<Option<T>, PersistError>
where
    T: serde::de::DeserializeOwned,
{
    match gateway.load(name).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Load the play session, falling back to a fresh one on any problem.
pub async fn load_session(gateway: &dyn PersistenceGateway, name: &str) -> PlaySession {
    match load_document::<PlaySession>(gateway, name).await {
        Ok(Some(session)) => session,
        Ok(None) => PlaySession::default(),
        Err(err) => {
            warn!(name = %name, error = %err, "discarding unreadable play session");
            PlaySession::default()
        }
    }
}

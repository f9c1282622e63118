//! Persisting the in-flight batch so monitoring survives a restart.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use thiserror::Error;

use crate::model::BatchStatus;
use crate::stream::BatchBackend;

pub const BATCH_ID_KEY: &str = "bizenrich.batchId";
pub const STATUS_KEY: &str = "bizenrich.status";

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("failed to write session file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode session: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("unknown application status '{0}'")]
    UnknownStatus(String),
}

/// Minimal string key-value storage.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str) -> Result<(), SessionError>;
    fn remove(&mut self, key: &str) -> Result<(), SessionError>;
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for Box<S> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), SessionError> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), SessionError> {
        (**self).remove(key)
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), SessionError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), SessionError> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Key-value store backed by a JSON object on disk. Every write rewrites
/// the file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStore {
    /// Open the store at `path`. A missing file is an empty store; an
    /// unreadable or corrupt one is logged and treated as empty too, since a
    /// broken snapshot must never keep the application from starting.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(entries) => entries,
                Err(e) => {
                    log::warn!("ignoring corrupt session file {}: {e}", path.display());
                    BTreeMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                log::warn!("cannot read session file {}: {e}", path.display());
                BTreeMap::new()
            }
        };
        Self { path, entries }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<(), SessionError> {
        let write_err = |source| SessionError::Write {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let content = serde_json::to_string_pretty(&self.entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(write_err)?;
        std::fs::rename(&tmp, &self.path).map_err(write_err)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), SessionError> {
        if self.entries.get(key).is_some_and(|v| v == value) {
            return Ok(());
        }
        self.entries.insert(key.to_string(), value.to_string());
        self.flush()
    }

    fn remove(&mut self, key: &str) -> Result<(), SessionError> {
        if self.entries.remove(key).is_none() {
            return Ok(());
        }
        self.flush()
    }
}

/// Coarse application status, persisted next to the batch id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AppStatus {
    #[default]
    Idle,
    Uploading,
    Processing,
    Complete,
    Error,
}

impl AppStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Uploading => "uploading",
            Self::Processing => "processing",
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppStatus {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(Self::Idle),
            "uploading" => Ok(Self::Uploading),
            "processing" => Ok(Self::Processing),
            "complete" => Ok(Self::Complete),
            "error" => Ok(Self::Error),
            other => Err(SessionError::UnknownStatus(other.to_string())),
        }
    }
}

/// A batch that was still processing when the last session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeTicket {
    pub batch_id: String,
}

/// What to do with a resumable batch after asking the backend about it.
#[derive(Debug, Clone, PartialEq)]
pub enum ResumeOutcome {
    /// Still running: attach the stream client, seeded with this snapshot.
    Monitor { batch_id: String, status: BatchStatus },
    /// Finished while nobody was watching: show these results directly.
    Finished(BatchStatus),
    /// The batch cannot be resumed; start at the upload view.
    Fresh { reason: String },
}

/// Session snapshot on top of a [`KeyValueStore`].
#[derive(Debug)]
pub struct SessionStore<S> {
    store: S,
}

impl<S: KeyValueStore> SessionStore<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Record the current batch id and status. Both keys are removed once
    /// the application is idle with no batch.
    pub fn save(&mut self, batch_id: Option<&str>, status: AppStatus) -> Result<(), SessionError> {
        if batch_id.is_none() && status == AppStatus::Idle {
            return self.clear();
        }
        match batch_id {
            Some(id) => self.store.set(BATCH_ID_KEY, id)?,
            None => self.store.remove(BATCH_ID_KEY)?,
        }
        self.store.set(STATUS_KEY, status.as_str())
    }

    pub fn clear(&mut self) -> Result<(), SessionError> {
        self.store.remove(BATCH_ID_KEY)?;
        self.store.remove(STATUS_KEY)
    }

    /// The batch to resume, if the last session was processing one.
    pub fn load(&self) -> Option<ResumeTicket> {
        let status = self.store.get(STATUS_KEY)?;
        if status.parse::<AppStatus>().ok()? != AppStatus::Processing {
            log::debug!("persisted status '{status}' is not resumable");
            return None;
        }
        let batch_id = self.store.get(BATCH_ID_KEY).filter(|id| !id.trim().is_empty());
        if batch_id.is_none() {
            log::debug!("persisted processing status has no batch id");
        }
        batch_id.map(|batch_id| ResumeTicket { batch_id })
    }

    /// Load the snapshot and resume it against `backend`. A batch that
    /// cannot be resumed has its snapshot cleared.
    pub async fn restore<B: BatchBackend>(&mut self, backend: &B) -> Option<ResumeOutcome> {
        let ticket = self.load()?;
        let outcome = resume(backend, &ticket).await;
        if let ResumeOutcome::Fresh { reason } = &outcome {
            log::warn!("not resuming batch {}: {reason}", ticket.batch_id);
            if let Err(e) = self.clear() {
                log::warn!("failed to clear session: {e}");
            }
        }
        Some(outcome)
    }

    pub fn store(&self) -> &S {
        &self.store
    }
}

/// One authoritative status fetch decides how to resume.
pub async fn resume<B: BatchBackend>(backend: &B, ticket: &ResumeTicket) -> ResumeOutcome {
    match backend.fetch_status(&ticket.batch_id).await {
        Ok(status) if status.status.is_terminal() => {
            log::info!(
                "batch {} finished while detached ({} results)",
                ticket.batch_id,
                status.results.len()
            );
            ResumeOutcome::Finished(status)
        }
        Ok(status) => {
            log::info!(
                "resuming batch {} at {}/{}",
                ticket.batch_id,
                status.progress.completed,
                status.expected_total()
            );
            ResumeOutcome::Monitor {
                batch_id: ticket.batch_id.clone(),
                status,
            }
        }
        Err(e) => ResumeOutcome::Fresh {
            reason: e.to_string(),
        },
    }
}

//! Access to the user-chosen sync folder.
//!
//! A [`FolderHandle`] names a directory the user picked once and granted
//! write access to. The handle is remembered in a small JSON handle store,
//! separate from the card database, so a later session can pick the folder
//! up again without asking.
//!
//! [`FsFolderAccess`] is the filesystem implementation. Folder selection is
//! delegated to a [`FolderPrompt`]: [`FixedFolder`] for a path given on the
//! command line, [`StdinPrompt`] for an interactive answer.
//! [`MemoryFolder`] keeps files in memory and counts writes, for tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{SyncError, SyncResult};

/// Reference to the chosen sync folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderHandle {
    pub path: PathBuf,
    /// Display name: the last path component.
    pub label: String,
}

impl FolderHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let label = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { path, label }
    }
}

/// Cached answer of a write-permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
}

/// Folder-picker and permission abstraction used by the sync orchestrator.
#[async_trait]
pub trait FolderAccess: Send + Sync {
    /// Ask the user for a folder. `Ok(None)` means the user cancelled.
    async fn request_access(&self) -> SyncResult<Option<FolderHandle>>;

    /// Whether the folder can currently be written. Uses the cached grant
    /// when one exists.
    async fn verify_writable(&self, handle: &FolderHandle) -> bool;

    async fn persist_handle(&self, handle: &FolderHandle) -> SyncResult<()>;

    /// The remembered handle, or `None` when the store is missing,
    /// unreadable, malformed, or the folder is no longer writable.
    async fn load_persisted_handle(&self) -> Option<FolderHandle>;

    async fn clear_persisted_handle(&self) -> SyncResult<()>;

    /// Contents of `name` inside the folder, `None` if the file is absent.
    async fn read_file(&self, handle: &FolderHandle, name: &str) -> SyncResult<Option<String>>;

    /// Create or replace `name` inside the folder.
    async fn write_file(&self, handle: &FolderHandle, name: &str, content: &str)
        -> SyncResult<()>;
}

/// Source of the folder the user wants to sync into.
pub trait FolderPrompt: Send + Sync {
    /// `None` when the user cancels.
    fn choose_folder(&self) -> Option<PathBuf>;
}

/// Answers every prompt with the same path (or always cancels).
pub struct FixedFolder {
    path: Option<PathBuf>,
}

impl FixedFolder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
        }
    }

    pub fn cancelled() -> Self {
        Self { path: None }
    }
}

impl FolderPrompt for FixedFolder {
    fn choose_folder(&self) -> Option<PathBuf> {
        self.path.clone()
    }
}

/// Reads the folder path from stdin. An empty line cancels.
pub struct StdinPrompt;

impl FolderPrompt for StdinPrompt {
    fn choose_folder(&self) -> Option<PathBuf> {
        eprint!("Sync folder (empty to cancel): ");
        let _ = std::io::stderr().flush();

        let mut line = String::new();
        if std::io::stdin().lock().read_line(&mut line).is_err() {
            return None;
        }
        let answer = line.trim();
        if answer.is_empty() {
            None
        } else {
            Some(PathBuf::from(answer))
        }
    }
}

#[derive(Serialize, Deserialize)]
struct HandleRecord {
    handle: FolderHandle,
    saved_at: DateTime<Utc>,
}

/// Filesystem folder access.
pub struct FsFolderAccess {
    prompt: Box<dyn FolderPrompt>,
    handle_store: PathBuf,
    grants: Mutex<HashMap<PathBuf, PermissionState>>,
}

impl FsFolderAccess {
    pub fn new(prompt: Box<dyn FolderPrompt>, handle_store: impl Into<PathBuf>) -> Self {
        Self {
            prompt,
            handle_store: handle_store.into(),
            grants: Mutex::new(HashMap::new()),
        }
    }

    pub fn handle_store_path(&self) -> &Path {
        &self.handle_store
    }

    fn cached_grant(&self, path: &Path) -> Option<PermissionState> {
        self.grants.lock().unwrap().get(path).copied()
    }

    fn record_grant(&self, path: &Path, state: PermissionState) {
        self.grants.lock().unwrap().insert(path.to_path_buf(), state);
    }

    async fn check_and_cache(&self, path: &Path) -> Result<(), String> {
        let result = check_access(path).await;
        let state = if result.is_ok() {
            PermissionState::Granted
        } else {
            PermissionState::Denied
        };
        self.record_grant(path, state);
        result
    }
}

/// Directory-existence and access-mode check, finishing with a probe write.
async fn check_access(path: &Path) -> Result<(), String> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| format!("{}: {}", path.display(), e))?;
    if !meta.is_dir() {
        return Err(format!("{} is not a directory", path.display()));
    }
    if meta.permissions().readonly() {
        return Err(format!("{} is read-only", path.display()));
    }

    let probe = path.join(format!(".cardsync-probe-{}", uuid::Uuid::new_v4()));
    tokio::fs::write(&probe, b"")
        .await
        .map_err(|e| format!("cannot write to {}: {}", path.display(), e))?;
    let _ = tokio::fs::remove_file(&probe).await;
    Ok(())
}

/// Write `bytes` to a sibling temporary file, then rename it over `target`.
async fn write_atomic(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let file_name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = target.with_file_name(format!(".{}.tmp", file_name));

    if let Err(e) = tokio::fs::write(&temp_path, bytes).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&temp_path, target).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(e);
    }
    Ok(())
}

#[async_trait]
impl FolderAccess for FsFolderAccess {
    async fn request_access(&self) -> SyncResult<Option<FolderHandle>> {
        let Some(path) = self.prompt.choose_folder() else {
            debug!("Folder selection cancelled");
            return Ok(None);
        };

        self.check_and_cache(&path)
            .await
            .map_err(SyncError::permission_denied)?;

        Ok(Some(FolderHandle::new(path)))
    }

    async fn verify_writable(&self, handle: &FolderHandle) -> bool {
        match self.cached_grant(&handle.path) {
            Some(state) => state == PermissionState::Granted,
            None => match self.check_and_cache(&handle.path).await {
                Ok(()) => true,
                Err(reason) => {
                    debug!(folder = %handle.path.display(), %reason, "Folder not writable");
                    false
                }
            },
        }
    }

    async fn persist_handle(&self, handle: &FolderHandle) -> SyncResult<()> {
        if let Some(parent) = self.handle_store.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| SyncError::io(format!("{}: {}", parent.display(), e)))?;
            }
        }

        let record = HandleRecord {
            handle: handle.clone(),
            saved_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&record)
            .map_err(|e| SyncError::io(format!("failed to encode handle: {}", e)))?;

        write_atomic(&self.handle_store, &json)
            .await
            .map_err(|e| SyncError::io(format!("{}: {}", self.handle_store.display(), e)))
    }

    async fn load_persisted_handle(&self) -> Option<FolderHandle> {
        let bytes = match tokio::fs::read(&self.handle_store).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(store = %self.handle_store.display(), error = %e, "Handle store unreadable");
                return None;
            }
        };

        let record: HandleRecord = match serde_json::from_slice(&bytes) {
            Ok(record) => record,
            Err(e) => {
                warn!(store = %self.handle_store.display(), error = %e, "Handle store malformed");
                return None;
            }
        };

        if !self.verify_writable(&record.handle).await {
            warn!(folder = %record.handle.path.display(), "Remembered sync folder is no longer writable");
            return None;
        }

        Some(record.handle)
    }

    async fn clear_persisted_handle(&self) -> SyncResult<()> {
        match tokio::fs::remove_file(&self.handle_store).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SyncError::io(format!(
                "{}: {}",
                self.handle_store.display(),
                e
            ))),
        }
    }

    async fn read_file(&self, handle: &FolderHandle, name: &str) -> SyncResult<Option<String>> {
        let path = handle.path.join(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::io(format!("{}: {}", path.display(), e))),
        }
    }

    async fn write_file(
        &self,
        handle: &FolderHandle,
        name: &str,
        content: &str,
    ) -> SyncResult<()> {
        let path = handle.path.join(name);
        match write_atomic(&path, content.as_bytes()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
                self.record_grant(&handle.path, PermissionState::Denied);
                Err(SyncError::permission_denied(format!("{}: {}", path.display(), e)))
            }
            Err(e) => Err(SyncError::io(format!("{}: {}", path.display(), e))),
        }
    }
}

#[derive(Default)]
struct MemoryFolderState {
    choice: Option<FolderHandle>,
    writable: bool,
    persisted: Option<FolderHandle>,
    files: HashMap<(PathBuf, String), String>,
    writes: usize,
    fail_next_write: Option<SyncError>,
    write_delay: Duration,
    writes_in_flight: usize,
    max_writes_in_flight: usize,
}

/// In-memory folder access for tests.
///
/// Files are keyed by folder path and name. Every successful
/// [`write_file`](FolderAccess::write_file) increments [`writes`](MemoryFolder::writes).
/// Writes can be slowed down with [`set_write_delay`](MemoryFolder::set_write_delay)
/// (tokio time, so paused-clock tests stay instant) or made to fail once
/// with [`fail_next_write`](MemoryFolder::fail_next_write).
pub struct MemoryFolder {
    state: Mutex<MemoryFolderState>,
}

impl MemoryFolder {
    /// A writable folder that `request_access` will hand out.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            state: Mutex::new(MemoryFolderState {
                choice: Some(FolderHandle::new(path)),
                writable: true,
                ..MemoryFolderState::default()
            }),
        }
    }

    /// A folder whose selection is always cancelled.
    pub fn cancelled() -> Self {
        Self {
            state: Mutex::new(MemoryFolderState {
                writable: true,
                ..MemoryFolderState::default()
            }),
        }
    }

    pub fn set_writable(&self, writable: bool) {
        self.state.lock().unwrap().writable = writable;
    }

    pub fn writes(&self) -> usize {
        self.state.lock().unwrap().writes
    }

    /// The next `write_file` returns `err` instead of writing.
    pub fn fail_next_write(&self, err: SyncError) {
        self.state.lock().unwrap().fail_next_write = Some(err);
    }

    pub fn set_write_delay(&self, delay: Duration) {
        self.state.lock().unwrap().write_delay = delay;
    }

    /// Highest number of writes that were in progress at the same time.
    pub fn max_writes_in_flight(&self) -> usize {
        self.state.lock().unwrap().max_writes_in_flight
    }

    pub fn persisted(&self) -> Option<FolderHandle> {
        self.state.lock().unwrap().persisted.clone()
    }

    /// Content of `name` in the folder `request_access` hands out.
    pub fn file(&self, name: &str) -> Option<String> {
        let st = self.state.lock().unwrap();
        let path = st.choice.as_ref()?.path.clone();
        st.files.get(&(path, name.to_string())).cloned()
    }

    /// Place a file in the folder `request_access` hands out, as another
    /// device would.
    pub fn put_file(&self, name: &str, content: impl Into<String>) {
        let mut st = self.state.lock().unwrap();
        if let Some(path) = st.choice.as_ref().map(|h| h.path.clone()) {
            st.files.insert((path, name.to_string()), content.into());
        }
    }
}

#[async_trait]
impl FolderAccess for MemoryFolder {
    async fn request_access(&self) -> SyncResult<Option<FolderHandle>> {
        let st = self.state.lock().unwrap();
        match &st.choice {
            None => Ok(None),
            Some(_) if !st.writable => Err(SyncError::permission_denied("folder is read-only")),
            Some(handle) => Ok(Some(handle.clone())),
        }
    }

    async fn verify_writable(&self, _handle: &FolderHandle) -> bool {
        self.state.lock().unwrap().writable
    }

    async fn persist_handle(&self, handle: &FolderHandle) -> SyncResult<()> {
        self.state.lock().unwrap().persisted = Some(handle.clone());
        Ok(())
    }

    async fn load_persisted_handle(&self) -> Option<FolderHandle> {
        let st = self.state.lock().unwrap();
        if st.writable {
            st.persisted.clone()
        } else {
            None
        }
    }

    async fn clear_persisted_handle(&self) -> SyncResult<()> {
        self.state.lock().unwrap().persisted = None;
        Ok(())
    }

    async fn read_file(&self, handle: &FolderHandle, name: &str) -> SyncResult<Option<String>> {
        let st = self.state.lock().unwrap();
        Ok(st
            .files
            .get(&(handle.path.clone(), name.to_string()))
            .cloned())
    }

    async fn write_file(
        &self,
        handle: &FolderHandle,
        name: &str,
        content: &str,
    ) -> SyncResult<()> {
        let delay = {
            let mut st = self.state.lock().unwrap();
            if !st.writable {
                return Err(SyncError::permission_denied("folder is read-only"));
            }
            if let Some(err) = st.fail_next_write.take() {
                return Err(err);
            }
            st.writes_in_flight += 1;
            st.max_writes_in_flight = st.max_writes_in_flight.max(st.writes_in_flight);
            st.write_delay
        };

        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut st = self.state.lock().unwrap();
        st.writes_in_flight -= 1;
        st.files
            .insert((handle.path.clone(), name.to_string()), content.to_string());
        st.writes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn access_for(dir: &Path, store: &Path) -> FsFolderAccess {
        FsFolderAccess::new(Box::new(FixedFolder::new(dir)), store)
    }

    #[tokio::test]
    async fn request_access_returns_handle_for_writable_dir() {
        let tmp = TempDir::new().unwrap();
        let folder = tmp.path().join("Backups");
        std::fs::create_dir(&folder).unwrap();
        let access = access_for(&folder, &tmp.path().join("handle.json"));

        let handle = access.request_access().await.unwrap().unwrap();
        assert_eq!(handle.label, "Backups");
        assert!(access.verify_writable(&handle).await);
        assert_eq!(
            access.cached_grant(&folder),
            Some(PermissionState::Granted)
        );
    }

    #[tokio::test]
    async fn cancelled_prompt_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        let access = FsFolderAccess::new(
            Box::new(FixedFolder::cancelled()),
            tmp.path().join("handle.json"),
        );
        assert!(access.request_access().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_directory_is_permission_denied() {
        let tmp = TempDir::new().unwrap();
        let access = access_for(&tmp.path().join("nope"), &tmp.path().join("handle.json"));
        let err = access.request_access().await.unwrap_err();
        assert!(matches!(err, SyncError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn read_missing_file_is_none() {
        let tmp = TempDir::new().unwrap();
        let access = access_for(tmp.path(), &tmp.path().join("handle.json"));
        let handle = FolderHandle::new(tmp.path());
        assert!(access.read_file(&handle, "backup.json").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn write_replaces_file_and_leaves_no_temp() {
        let tmp = TempDir::new().unwrap();
        let access = access_for(tmp.path(), &tmp.path().join("handle.json"));
        let handle = FolderHandle::new(tmp.path());

        access.write_file(&handle, "backup.json", "one").await.unwrap();
        access.write_file(&handle, "backup.json", "two").await.unwrap();

        let content = access.read_file(&handle, "backup.json").await.unwrap();
        assert_eq!(content.as_deref(), Some("two"));
        let names: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["backup.json".to_string()]);
    }

    #[tokio::test]
    async fn handle_store_round_trip_and_clear() {
        let tmp = TempDir::new().unwrap();
        let store = tmp.path().join("state").join("handle.json");
        let access = access_for(tmp.path(), &store);
        let handle = FolderHandle::new(tmp.path());

        assert!(access.load_persisted_handle().await.is_none());
        access.persist_handle(&handle).await.unwrap();
        assert_eq!(access.load_persisted_handle().await, Some(handle));

        access.clear_persisted_handle().await.unwrap();
        assert!(access.load_persisted_handle().await.is_none());
        access.clear_persisted_handle().await.unwrap();
    }

    #[tokio::test]
    async fn malformed_handle_store_fails_open() {
        let tmp = TempDir::new().unwrap();
        let store = tmp.path().join("handle.json");
        std::fs::write(&store, "{ not json").unwrap();
        let access = access_for(tmp.path(), &store);
        assert!(access.load_persisted_handle().await.is_none());
    }

    #[tokio::test]
    async fn handle_for_vanished_folder_fails_open() {
        let tmp = TempDir::new().unwrap();
        let folder = tmp.path().join("gone");
        std::fs::create_dir(&folder).unwrap();
        let store = tmp.path().join("handle.json");

        access_for(&folder, &store)
            .persist_handle(&FolderHandle::new(&folder))
            .await
            .unwrap();
        std::fs::remove_dir(&folder).unwrap();

        assert!(access_for(&folder, &store)
            .load_persisted_handle()
            .await
            .is_none());
    }
}

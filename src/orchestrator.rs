//! Folder sync orchestration.
//!
//! [`SyncOrchestrator`] owns the sync state for one session: the chosen
//! folder, the last-synced marker, and the debounce timer. It is created
//! once with its collaborators and cloned into whatever needs it.
//!
//! ```text
//!  Disabled ──enable──▶ Enabling ──granted──▶ Idle ◀──────────┐
//!     ▲                    │                   │ mutation      │ done
//!     │                    └──cancel/denied──▶ │               │
//!     │                                        ▼               │
//!     └──────────disable──────────────── SaveScheduled ──▶ Syncing
//! ```
//!
//! Every encode-and-write and every restore runs under one async gate, so
//! at most one of them touches the folder at a time. Mutations arriving
//! inside the debounce window restart it; only the last one schedules the
//! write. A timer that has fired no longer sits in the pending slot, so a
//! later mutation or `disable` cannot cancel a write in progress; `disable`
//! instead waits for it through the gate.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::conflict::{self, ConflictDecision};
use crate::error::{SyncError, SyncResult};
use crate::folder::{FolderAccess, FolderHandle};
use crate::models::{now_ms, Dataset, DatasetCounts};
use crate::snapshot::{self, DanglingReference, ReferenceKind, Snapshot};
use crate::store::Store;

/// Settings the orchestrator needs from the configuration.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub owner_id: String,
    pub debounce: Duration,
    pub backup_filename: String,
}

impl SyncSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            owner_id: config.user.id.clone(),
            debounce: config.sync.debounce(),
            backup_filename: config.sync.backup_filename.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Disabled,
    Enabling,
    Idle,
    SaveScheduled,
    Syncing,
}

/// Observable sync status, passed to subscribers on every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatus {
    pub enabled: bool,
    pub folder_label: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub is_syncing: bool,
    pub phase: SyncPhase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// Result of one snapshot write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub exported_at: DateTime<Utc>,
    pub counts: DatasetCounts,
    pub digest: String,
    pub bytes: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EnableOutcome {
    Enabled {
        folder_label: String,
        report: SyncReport,
    },
    /// The user cancelled the folder selection.
    Declined,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// No backup existed; the local dataset was written as the first one.
    Seeded(SyncReport),
    /// The backup was restored into the local store.
    Restored {
        exported_at: DateTime<Utc>,
        counts: DatasetCounts,
        skipped: usize,
    },
    /// A restore was offered and refused; local data is unchanged.
    Declined { remote_exported_at: DateTime<Utc> },
    /// The backup is not newer than the local data.
    LocalCurrent,
}

/// What a [`RestoreDecider`] is asked about.
#[derive(Debug, Clone)]
pub struct RestorePrompt {
    pub decision: ConflictDecision,
    pub remote_exported_at: DateTime<Utc>,
    pub local_synced_at: Option<DateTime<Utc>>,
    pub remote_counts: DatasetCounts,
    /// Owner recorded in the backup. Restored rows keep it, so rows of
    /// another owner do not show up in this owner's dataset.
    pub remote_owner_id: String,
}

impl RestorePrompt {
    pub fn owner_matches(&self, owner_id: &str) -> bool {
        self.remote_owner_id == owner_id
    }
}

/// Confirms or refuses a restore that would overwrite local rows.
pub trait RestoreDecider: Send + Sync {
    fn confirm_restore(&self, prompt: &RestorePrompt) -> bool;
}

impl<F> RestoreDecider for F
where
    F: Fn(&RestorePrompt) -> bool + Send + Sync,
{
    fn confirm_restore(&self, prompt: &RestorePrompt) -> bool {
        self(prompt)
    }
}

pub struct AlwaysRestore;

impl RestoreDecider for AlwaysRestore {
    fn confirm_restore(&self, _prompt: &RestorePrompt) -> bool {
        true
    }
}

pub struct NeverRestore;

impl RestoreDecider for NeverRestore {
    fn confirm_restore(&self, _prompt: &RestorePrompt) -> bool {
        false
    }
}

/// Receives a notification after every committed data mutation.
pub trait MutationHook: Send + Sync {
    fn mutation_committed(&self);
}

type Listener = Arc<dyn Fn(&SyncStatus) + Send + Sync>;

#[derive(Default)]
struct State {
    handle: Option<FolderHandle>,
    last_synced_at: Option<DateTime<Utc>>,
    pending: Option<JoinHandle<()>>,
    generation: u64,
    enabling: bool,
    syncing: bool,
    shut_down: bool,
}

impl State {
    fn phase(&self) -> SyncPhase {
        if self.enabling {
            SyncPhase::Enabling
        } else if self.handle.is_none() {
            SyncPhase::Disabled
        } else if self.syncing {
            SyncPhase::Syncing
        } else if self.pending.is_some() {
            SyncPhase::SaveScheduled
        } else {
            SyncPhase::Idle
        }
    }

    fn status(&self) -> SyncStatus {
        SyncStatus {
            enabled: self.handle.is_some(),
            folder_label: self.handle.as_ref().map(|h| h.label.clone()),
            last_synced_at: self.last_synced_at,
            is_syncing: self.syncing,
            phase: self.phase(),
        }
    }

    fn cancel_pending(&mut self) -> bool {
        self.generation += 1;
        match self.pending.take() {
            Some(task) => {
                task.abort();
                true
            }
            None => false,
        }
    }
}

#[derive(Default)]
struct Listeners {
    by_id: BTreeMap<u64, Listener>,
    last_emitted: Option<SyncStatus>,
}

struct Inner {
    store: Arc<dyn Store>,
    folder: Arc<dyn FolderAccess>,
    settings: SyncSettings,
    state: Mutex<State>,
    gate: tokio::sync::Mutex<()>,
    listeners: Mutex<Listeners>,
    next_listener: AtomicU64,
}

/// Sync state machine for one session. Cheap to clone.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl SyncOrchestrator {
    pub fn new(store: Arc<dyn Store>, folder: Arc<dyn FolderAccess>, settings: SyncSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                folder,
                settings,
                state: Mutex::new(State::default()),
                gate: tokio::sync::Mutex::new(()),
                listeners: Mutex::new(Listeners::default()),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    /// Restore the remembered folder and last-synced marker.
    pub async fn init(&self) -> SyncResult<SyncStatus> {
        let handle = self.inner.folder.load_persisted_handle().await;
        let last_synced_at = self.inner.store.last_synced_at().await?;

        {
            let mut st = self.inner.state.lock().unwrap();
            st.handle = handle;
            st.last_synced_at = last_synced_at;
            st.shut_down = false;
        }

        let status = self.status();
        match &status.folder_label {
            Some(label) => info!(folder = %label, "Folder sync active"),
            None => debug!("Folder sync disabled"),
        }
        self.emit();
        Ok(status)
    }

    /// Cancel the debounce timer and flush the save it was holding.
    /// Mutations notified afterwards are ignored.
    pub async fn shutdown(&self) {
        let flush = {
            let mut st = self.inner.state.lock().unwrap();
            st.shut_down = true;
            st.cancel_pending()
        };
        self.emit();

        // Also waits out a timer that already fired.
        let _gate = self.inner.gate.lock().await;
        if flush && self.is_enabled() {
            debug!("Flushing scheduled save on shutdown");
            if let Err(e) = self.run_sync_locked().await {
                error!(error = %e, "Final sync on shutdown failed");
            }
        }
    }

    /// Ask for a folder, remember it, and write the first backup.
    pub async fn enable(&self) -> SyncResult<EnableOutcome> {
        self.inner.state.lock().unwrap().enabling = true;
        self.emit();

        let requested = self.inner.folder.request_access().await;
        let handle = match requested {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                self.finish_enabling(None);
                info!("Folder selection cancelled; sync stays disabled");
                return Ok(EnableOutcome::Declined);
            }
            Err(e) => {
                self.finish_enabling(None);
                warn!(error = %e, "Folder access refused");
                return Err(e);
            }
        };

        if let Err(e) = self.inner.folder.persist_handle(&handle).await {
            self.finish_enabling(None);
            return Err(e);
        }

        let folder_label = handle.label.clone();
        info!(folder = %handle.path.display(), "Folder sync enabled");
        self.finish_enabling(Some(handle));

        let _gate = self.inner.gate.lock().await;
        let report = self.run_sync_locked().await?;
        Ok(EnableOutcome::Enabled {
            folder_label,
            report,
        })
    }

    fn finish_enabling(&self, handle: Option<FolderHandle>) {
        {
            let mut st = self.inner.state.lock().unwrap();
            st.enabling = false;
            if handle.is_some() {
                st.handle = handle;
            }
        }
        self.emit();
    }

    /// Stop syncing and forget the folder. The backup file is left alone.
    pub async fn disable(&self) -> SyncResult<()> {
        self.inner.state.lock().unwrap().cancel_pending();

        let _gate = self.inner.gate.lock().await;
        let was_enabled = {
            let mut st = self.inner.state.lock().unwrap();
            st.cancel_pending();
            st.handle.take().is_some()
        };
        self.emit();

        let cleared = self.inner.folder.clear_persisted_handle().await;
        if was_enabled {
            info!("Folder sync disabled");
        }
        cleared
    }

    /// Restart the debounce window. No-op while disabled or after shutdown.
    pub fn notify_mutation(&self) {
        let delay = self.inner.settings.debounce;
        {
            let mut st = self.inner.state.lock().unwrap();
            if st.shut_down || st.handle.is_none() {
                return;
            }
            st.cancel_pending();
            let generation = st.generation;
            let this = self.clone();
            st.pending = Some(tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                this.fire_scheduled(generation).await;
            }));
        }
        debug!(delay_ms = delay.as_millis() as u64, "Backup scheduled");
        self.emit();
    }

    async fn fire_scheduled(&self, generation: u64) {
        let _gate = self.inner.gate.lock().await;
        {
            let mut st = self.inner.state.lock().unwrap();
            if st.generation != generation || st.pending.is_none() {
                return;
            }
            // Detach: dropping the handle does not abort this task.
            st.pending = None;
        }
        if let Err(e) = self.run_sync_locked().await {
            warn!(error = %e, "Scheduled backup failed");
        }
    }

    /// Write a backup now. A scheduled save is folded into this one.
    pub async fn sync_now(&self) -> SyncResult<SyncReport> {
        if !self.is_enabled() {
            return Err(SyncError::NotEnabled);
        }
        if self.inner.state.lock().unwrap().cancel_pending() {
            self.emit();
        }

        let _gate = self.inner.gate.lock().await;
        self.run_sync_locked().await
    }

    /// Read the backup and decide whether to restore it, seed it, or leave
    /// it.
    pub async fn load_and_reconcile(
        &self,
        decider: &dyn RestoreDecider,
    ) -> SyncResult<ReconcileOutcome> {
        let _gate = self.inner.gate.lock().await;
        let (handle, local_synced_at) = {
            let st = self.inner.state.lock().unwrap();
            match &st.handle {
                Some(handle) => (handle.clone(), st.last_synced_at),
                None => return Err(SyncError::NotEnabled),
            }
        };

        let name = &self.inner.settings.backup_filename;
        let Some(text) = self.inner.folder.read_file(&handle, name).await? else {
            info!(folder = %handle.label, "No backup in folder; writing the first one");
            let report = self.run_sync_locked().await?;
            return Ok(ReconcileOutcome::Seeded(report));
        };

        let remote = snapshot::decode(&text)?;
        let decision = conflict::assess(remote.exported_at, local_synced_at);
        let remote_exported_at = match (decision, remote.exported_at) {
            (ConflictDecision::KeepLocal, _) | (_, None) => {
                debug!(?local_synced_at, remote = ?remote.exported_at, "Local data is current");
                return Ok(ReconcileOutcome::LocalCurrent);
            }
            (_, Some(at)) => at,
        };

        let prompt = RestorePrompt {
            decision,
            remote_exported_at,
            local_synced_at,
            remote_counts: remote.clone().into_dataset().counts(),
            remote_owner_id: remote.user.id.clone(),
        };
        if !prompt.owner_matches(&self.inner.settings.owner_id) {
            warn!(
                backup_owner = %prompt.remote_owner_id,
                owner = %self.inner.settings.owner_id,
                "Backup belongs to a different owner; restored rows will not be synced from this device"
            );
        }
        if !decider.confirm_restore(&prompt) {
            info!(%remote_exported_at, ?decision, "Restore declined");
            return Ok(ReconcileOutcome::Declined { remote_exported_at });
        }

        self.restore_locked(remote, remote_exported_at).await
    }

    async fn restore_locked(
        &self,
        remote: Snapshot,
        exported_at: DateTime<Utc>,
    ) -> SyncResult<ReconcileOutcome> {
        self.inner.state.lock().unwrap().syncing = true;
        self.emit();

        let result = async {
            let (dataset, skipped) = self.without_orphans(remote).await?;
            let counts = dataset.counts();
            self.inner.store.replace_by_id(&dataset).await?;
            self.inner.store.set_last_synced_at(exported_at).await?;
            Ok::<_, SyncError>((counts, skipped))
        }
        .await;

        {
            let mut st = self.inner.state.lock().unwrap();
            st.syncing = false;
            if result.is_ok() {
                st.last_synced_at = Some(exported_at);
            }
        }
        self.emit();

        let (counts, skipped) = result?;
        info!(%exported_at, %counts, skipped, "Backup restored");
        Ok(ReconcileOutcome::Restored {
            exported_at,
            counts,
            skipped,
        })
    }

    /// Drop rows whose references neither the snapshot nor the local store
    /// satisfy. Repeats until stable, since dropping a card orphans its
    /// images, links, and notes.
    async fn without_orphans(&self, mut remote: Snapshot) -> SyncResult<(Dataset, usize)> {
        let mut skipped = 0;
        loop {
            let mut orphans: HashSet<(ReferenceKind, String)> = HashSet::new();
            for reference in remote.dangling_references() {
                if !self.satisfied_locally(&reference).await? {
                    warn!(
                        kind = ?reference.kind,
                        source = %reference.source_id,
                        missing = %reference.target_id,
                        "Skipping backup row with a missing {} reference",
                        reference.kind.target()
                    );
                    orphans.insert((reference.kind, reference.source_id));
                }
            }
            if orphans.is_empty() {
                return Ok((remote.into_dataset(), skipped));
            }

            let is_orphan = |kind: ReferenceKind, id: &str| orphans.contains(&(kind, id.to_string()));
            let before = remote.cards.len()
                + remote.images.len()
                + remote.card_tags.len()
                + remote.interaction_notes.len();
            remote.cards.retain(|c| !is_orphan(ReferenceKind::CardProfile, &c.id));
            remote.images.retain(|i| !is_orphan(ReferenceKind::ImageCard, &i.id));
            remote.card_tags.retain(|l| {
                let key = format!("{}:{}", l.card_id, l.tag_id);
                !is_orphan(ReferenceKind::LinkCard, &key) && !is_orphan(ReferenceKind::LinkTag, &key)
            });
            remote
                .interaction_notes
                .retain(|n| !is_orphan(ReferenceKind::NoteCard, &n.id));
            let after = remote.cards.len()
                + remote.images.len()
                + remote.card_tags.len()
                + remote.interaction_notes.len();
            if after == before {
                return Ok((remote.into_dataset(), skipped));
            }
            skipped += before - after;
        }
    }

    async fn satisfied_locally(&self, reference: &DanglingReference) -> SyncResult<bool> {
        let store = &self.inner.store;
        let id = reference.target_id.as_str();
        let found = match reference.kind {
            ReferenceKind::CardProfile => store.get_profile(id).await?.is_some(),
            ReferenceKind::ImageCard | ReferenceKind::LinkCard | ReferenceKind::NoteCard => {
                store.get_card(id).await?.is_some()
            }
            ReferenceKind::LinkTag => store.get_tag(id).await?.is_some(),
        };
        Ok(found)
    }

    /// Encode the dataset and write it. The caller holds the gate.
    async fn run_sync_locked(&self) -> SyncResult<SyncReport> {
        let handle = {
            let mut st = self.inner.state.lock().unwrap();
            let handle = st.handle.clone().ok_or(SyncError::NotEnabled)?;
            st.syncing = true;
            handle
        };
        self.emit();

        let result = self.write_backup(&handle).await;

        {
            let mut st = self.inner.state.lock().unwrap();
            st.syncing = false;
            if let Ok(report) = &result {
                st.last_synced_at = Some(report.exported_at);
            }
        }
        self.emit();
        result
    }

    async fn write_backup(&self, handle: &FolderHandle) -> SyncResult<SyncReport> {
        let folder = &self.inner.folder;
        let store = &self.inner.store;
        let settings = &self.inner.settings;

        if !folder.verify_writable(handle).await {
            return Err(SyncError::permission_denied(format!(
                "cannot write to {}",
                handle.path.display()
            )));
        }

        let dataset = store.load_dataset(&settings.owner_id).await?;
        let counts = dataset.counts();
        let exported_at = now_ms();
        let snapshot = snapshot::encode(dataset, exported_at);
        let text = snapshot.to_json()?;

        folder
            .write_file(handle, &settings.backup_filename, &text)
            .await?;
        store.set_last_synced_at(exported_at).await?;

        info!(
            folder = %handle.label,
            %exported_at,
            %counts,
            bytes = text.len(),
            "Backup written"
        );
        Ok(SyncReport {
            exported_at,
            counts,
            digest: snapshot.content_digest(),
            bytes: text.len(),
        })
    }

    pub fn status(&self) -> SyncStatus {
        self.inner.state.lock().unwrap().status()
    }

    pub fn is_enabled(&self) -> bool {
        self.inner.state.lock().unwrap().handle.is_some()
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    /// Register a callback invoked synchronously on every status change.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&SyncStatus) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .unwrap()
            .by_id
            .insert(id, Arc::new(listener));
        SubscriptionId(id)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner
            .listeners
            .lock()
            .unwrap()
            .by_id
            .remove(&id.0)
            .is_some()
    }

    fn emit(&self) {
        let status = self.status();
        let listeners: Vec<Listener> = {
            let mut l = self.inner.listeners.lock().unwrap();
            if l.last_emitted.as_ref() == Some(&status) {
                return;
            }
            l.last_emitted = Some(status.clone());
            l.by_id.values().cloned().collect()
        };
        for listener in listeners {
            listener(&status);
        }
    }
}

impl MutationHook for SyncOrchestrator {
    fn mutation_committed(&self) {
        self.notify_mutation();
    }
}

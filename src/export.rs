//! Manual backup: export a snapshot to a file or stdout, import one back.
//!
//! These are one-shot operations independent of folder sync. Export writes
//! the same document the sync folder receives. Import upserts every
//! collection by id in one transaction and reports the change to the
//! mutation hook. The last-synced marker belongs to the orchestrator and is
//! only moved by a folder write or a folder restore, never by an import.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::path::Path;
use tracing::info;

use crate::models::{now_ms, DatasetCounts};
use crate::orchestrator::MutationHook;
use crate::snapshot;
use crate::store::Store;

/// What an export wrote.
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub exported_at: DateTime<Utc>,
    pub counts: DatasetCounts,
    pub bytes: usize,
}

/// What an import applied.
#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub exported_at: Option<DateTime<Utc>>,
    pub counts: DatasetCounts,
}

/// Export the owner's dataset as a snapshot document.
///
/// If `output` is `Some`, writes to that file path. Otherwise writes
/// to stdout for piping.
pub async fn run_export(
    store: &dyn Store,
    owner_id: &str,
    output: Option<&Path>,
) -> Result<ExportSummary> {
    let dataset = store.load_dataset(owner_id).await?;
    let counts = dataset.counts();
    let exported_at = now_ms();
    let json = snapshot::encode(dataset, exported_at).to_json()?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            std::fs::write(path, &json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Exported {} to {}", counts, path.display());
        }
        None => {
            println!("{}", json);
        }
    }

    Ok(ExportSummary {
        exported_at,
        counts,
        bytes: json.len(),
    })
}

/// Import a snapshot file. `confirm` receives the document's counts and
/// decides whether to go ahead; `Ok(None)` means it declined.
pub async fn run_import<C>(
    store: &dyn Store,
    hook: &dyn MutationHook,
    path: &Path,
    confirm: C,
) -> Result<Option<ImportSummary>>
where
    C: FnOnce(&DatasetCounts) -> bool,
{
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let snapshot = snapshot::decode(&text)
        .with_context(|| format!("{} is not a card backup", path.display()))?;

    let exported_at = snapshot.exported_at;
    let dataset = snapshot.into_dataset();
    let counts = dataset.counts();
    if counts.profiles == 0 && counts.cards > 0 {
        bail!("backup has cards but no profiles to file them under");
    }
    if !confirm(&counts) {
        return Ok(None);
    }

    store.replace_by_id(&dataset).await?;
    hook.mutation_committed();

    info!(path = %path.display(), %counts, "Backup imported");
    Ok(Some(ImportSummary {
        exported_at,
        counts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Profile;
    use crate::records::NoopHook;
    use crate::store::memory::InMemoryStore;

    fn profile(id: &str) -> Profile {
        Profile {
            id: id.into(),
            user_id: "u1".into(),
            company_name: "Acme".into(),
            position: None,
            email: None,
            phone: None,
            address: None,
            card_image: None,
            start_date: None,
            end_date: None,
            is_current: None,
            display_order: 1,
            created_at: now_ms(),
            updated_at: now_ms(),
        }
    }

    #[tokio::test]
    async fn export_then_import_into_fresh_store() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("out").join("backup.json");

        let source = InMemoryStore::new();
        source.upsert_profile(&profile("p1")).await.unwrap();
        let exported = run_export(&source, "u1", Some(file.as_path())).await.unwrap();
        assert_eq!(exported.counts.profiles, 1);

        let target = InMemoryStore::new();
        let imported = run_import(&target, &NoopHook, &file, |_| true)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(imported.counts.profiles, 1);
        assert_eq!(imported.exported_at, Some(exported.exported_at));
        assert_eq!(target.list_profiles("u1").await.unwrap().len(), 1);
        assert_eq!(target.last_synced_at().await.unwrap(), None);
    }

    #[tokio::test]
    async fn import_leaves_sync_marker_alone() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("old.json");
        let source = InMemoryStore::new();
        source.upsert_profile(&profile("p1")).await.unwrap();
        run_export(&source, "u1", Some(file.as_path())).await.unwrap();

        let target = InMemoryStore::new();
        let marker = now_ms() + chrono::Duration::days(1);
        target.set_last_synced_at(marker).await.unwrap();
        run_import(&target, &NoopHook, &file, |_| true).await.unwrap();
        assert_eq!(target.last_synced_at().await.unwrap(), Some(marker));
    }

    #[tokio::test]
    async fn declined_import_changes_nothing() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("backup.json");
        let source = InMemoryStore::new();
        source.upsert_profile(&profile("p1")).await.unwrap();
        run_export(&source, "u1", Some(file.as_path())).await.unwrap();

        let target = InMemoryStore::new();
        let result = run_import(&target, &NoopHook, &file, |_| false).await.unwrap();
        assert!(result.is_none());
        assert!(target.list_profiles("u1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn foreign_file_is_rejected() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("other.json");
        std::fs::write(&file, r#"{"items": []}"#).unwrap();
        let target = InMemoryStore::new();
        assert!(run_import(&target, &NoopHook, &file, |_| true).await.is_err());
    }
}

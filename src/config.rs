//! TOML configuration parsing and validation.
//!
//! The configuration file names the SQLite database, the owner whose data
//! is exported, and the folder-sync settings (debounce window, backup file
//! name, handle store location). Everything in `[sync]` has a default.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the backup file written into the sync folder.
pub const DEFAULT_BACKUP_FILENAME: &str = "my-card-manager-backup.json";

/// Delay between the last mutation of a burst and the sync it triggers.
pub const DEFAULT_DEBOUNCE_MS: u64 = 5000;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub user: UserConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// The account that owns the dataset. Profiles and tags are selected by
/// this id when a snapshot is encoded.
#[derive(Debug, Deserialize, Clone)]
pub struct UserConfig {
    pub id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_backup_filename")]
    pub backup_filename: String,
    /// Where the chosen folder handle is remembered between sessions.
    /// Defaults to `sync-handle.json` next to the database.
    #[serde(default)]
    pub handle_store: Option<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE_MS,
            backup_filename: DEFAULT_BACKUP_FILENAME.to_string(),
            handle_store: None,
        }
    }
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}
fn default_backup_filename() -> String {
    DEFAULT_BACKUP_FILENAME.to_string()
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl Config {
    /// Resolved location of the handle store file.
    pub fn handle_store_path(&self) -> PathBuf {
        match &self.sync.handle_store {
            Some(path) => path.clone(),
            None => self
                .db
                .path
                .parent()
                .map(|p| p.join("sync-handle.json"))
                .unwrap_or_else(|| PathBuf::from("sync-handle.json")),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.user.id.trim().is_empty() {
        anyhow::bail!("user.id must not be empty");
    }

    if config.sync.debounce_ms == 0 {
        anyhow::bail!("sync.debounce_ms must be > 0");
    }

    let name = config.sync.backup_filename.as_str();
    if name.is_empty() || name.contains('/') || name.contains('\\') || name == "." || name == ".."
    {
        anyhow::bail!(
            "sync.backup_filename must be a plain file name, got '{}'",
            name
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Result<Config> {
        let config: Config = toml::from_str(src)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn sync_section_is_optional() {
        let cfg = parse(
            r#"
            [db]
            path = "/tmp/cards/cards.sqlite"
            [user]
            id = "u-1"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.sync.debounce_ms, 5000);
        assert_eq!(cfg.sync.backup_filename, DEFAULT_BACKUP_FILENAME);
        assert_eq!(
            cfg.handle_store_path(),
            PathBuf::from("/tmp/cards/sync-handle.json")
        );
    }

    #[test]
    fn rejects_zero_debounce() {
        let err = parse(
            r#"
            [db]
            path = "cards.sqlite"
            [user]
            id = "u-1"
            [sync]
            debounce_ms = 0
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("debounce_ms"));
    }

    #[test]
    fn rejects_nested_backup_filename() {
        let err = parse(
            r#"
            [db]
            path = "cards.sqlite"
            [user]
            id = "u-1"
            [sync]
            backup_filename = "nested/backup.json"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("plain file name"));
    }

    #[test]
    fn rejects_blank_user() {
        assert!(parse(
            r#"
            [db]
            path = "cards.sqlite"
            [user]
            id = "  "
            "#,
        )
        .is_err());
    }
}

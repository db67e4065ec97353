//! Sync status reporting.
//!
//! Prints sync status changes while a command runs so users see when a
//! backup is scheduled, written, or restored. Reports go to **stderr** so
//! stdout stays parseable for scripts.

use std::io::Write;

use crate::orchestrator::{SyncOrchestrator, SyncPhase, SyncStatus, SubscriptionId};

/// Receives every status change of the orchestrator.
pub trait StatusReporter: Send + Sync {
    fn report(&self, status: &SyncStatus);
}

/// Human-friendly lines on stderr: "sync  syncing  (folder: Backups)".
pub struct StderrStatus;

impl StatusReporter for StderrStatus {
    fn report(&self, status: &SyncStatus) {
        let mut line = format!("sync  {}", phase_label(status.phase));
        if let Some(label) = &status.folder_label {
            line.push_str(&format!("  (folder: {})", label));
        }
        if status.phase == SyncPhase::Idle {
            if let Some(at) = status.last_synced_at {
                line.push_str(&format!("  last synced {}", at.to_rfc3339()));
            }
        }
        line.push('\n');
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable status: one JSON object per line on stderr.
pub struct JsonStatus;

impl StatusReporter for JsonStatus {
    fn report(&self, status: &SyncStatus) {
        let obj = serde_json::json!({
            "event": "sync_status",
            "phase": status.phase,
            "enabled": status.enabled,
            "folder": status.folder_label,
            "last_synced_at": status.last_synced_at,
            "is_syncing": status.is_syncing,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

pub struct NoStatus;

impl StatusReporter for NoStatus {
    fn report(&self, _status: &SyncStatus) {}
}

pub fn phase_label(phase: SyncPhase) -> &'static str {
    match phase {
        SyncPhase::Disabled => "disabled",
        SyncPhase::Enabling => "enabling",
        SyncPhase::Idle => "idle",
        SyncPhase::SaveScheduled => "save scheduled",
        SyncPhase::Syncing => "syncing",
    }
}

/// Reporting mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human output when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn StatusReporter> {
        match self {
            ProgressMode::Off => Box::new(NoStatus),
            ProgressMode::Human => Box::new(StderrStatus),
            ProgressMode::Json => Box::new(JsonStatus),
        }
    }

    /// Subscribe this mode's reporter to `sync`. Returns `None` when off.
    pub fn attach(&self, sync: &SyncOrchestrator) -> Option<SubscriptionId> {
        if *self == ProgressMode::Off {
            return None;
        }
        let reporter = self.reporter();
        Some(sync.subscribe(move |status| reporter.report(status)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_phase_has_a_label() {
        for phase in [
            SyncPhase::Disabled,
            SyncPhase::Enabling,
            SyncPhase::Idle,
            SyncPhase::SaveScheduled,
            SyncPhase::Syncing,
        ] {
            assert!(!phase_label(phase).is_empty());
        }
        assert_eq!(phase_label(SyncPhase::SaveScheduled), "save scheduled");
    }

    #[test]
    fn phase_serializes_snake_case() {
        let value = serde_json::to_value(SyncPhase::SaveScheduled).unwrap();
        assert_eq!(value, "save_scheduled");
    }
}

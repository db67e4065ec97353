//! Conflict policy between the backup in the folder and the local dataset.
//!
//! The only evidence is two timestamps: the backup's `exportedAt` and the
//! local last-synced marker. The policy never overwrites local data on its
//! own; a restore always needs confirmation from the caller.

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictDecision {
    /// Local data stays; the remote document is ignored.
    KeepLocal,
    /// This device has never synced. Restoring needs explicit confirmation.
    ConfirmFirstRun,
    /// The backup is newer than the last sync; offer to restore it.
    OfferRestore,
}

impl ConflictDecision {
    pub fn wants_confirmation(&self) -> bool {
        !matches!(self, ConflictDecision::KeepLocal)
    }
}

pub fn assess(
    remote_exported_at: Option<DateTime<Utc>>,
    local_synced_at: Option<DateTime<Utc>>,
) -> ConflictDecision {
    let Some(remote) = remote_exported_at else {
        return ConflictDecision::KeepLocal;
    };
    match local_synced_at {
        None => ConflictDecision::ConfirmFirstRun,
        Some(local) if remote > local => ConflictDecision::OfferRestore,
        Some(_) => ConflictDecision::KeepLocal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(ms: i64) -> Option<DateTime<Utc>> {
        Some(Utc.timestamp_millis_opt(ms).unwrap())
    }

    #[test]
    fn remote_without_timestamp_keeps_local() {
        assert_eq!(assess(None, None), ConflictDecision::KeepLocal);
        assert_eq!(assess(None, at(5)), ConflictDecision::KeepLocal);
    }

    #[test]
    fn first_run_needs_confirmation() {
        assert_eq!(assess(at(5), None), ConflictDecision::ConfirmFirstRun);
    }

    #[test]
    fn restore_offered_only_when_remote_is_newer() {
        assert_eq!(assess(at(2_000), at(1_000)), ConflictDecision::OfferRestore);
        assert_eq!(assess(at(1_000), at(1_000)), ConflictDecision::KeepLocal);
        assert_eq!(assess(at(999), at(1_000)), ConflictDecision::KeepLocal);
        assert_eq!(assess(at(1_001), at(1_000)), ConflictDecision::OfferRestore);
    }

    #[test]
    fn confirmation_flag() {
        assert!(!ConflictDecision::KeepLocal.wants_confirmation());
        assert!(ConflictDecision::ConfirmFirstRun.wants_confirmation());
        assert!(ConflictDecision::OfferRestore.wants_confirmation());
    }
}

//! Snapshot codec: the whole dataset as one portable JSON document.
//!
//! ```json
//! {
//!   "version": 1,
//!   "exportedAt": "2026-03-01T09:30:00.000Z",
//!   "user": { "id": "..." },
//!   "profiles": [...],
//!   "cards": [...],
//!   "images": [{ "...": "...", "imageData": "data:image/jpeg;base64,..." }],
//!   "tags": [...],
//!   "cardTags": [...],
//!   "interactionNotes": [...]
//! }
//! ```
//!
//! Encoding always writes every top-level array. Decoding requires
//! `version` and `profiles`; the other arrays may be missing or `null`.
//! Unknown fields are ignored so newer writers stay readable.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

use crate::error::{SyncError, SyncResult};
use crate::models::{Card, CardImage, CardTag, Dataset, InteractionNote, Profile, Tag};

/// Schema version written by [`encode`]. Documents with a higher version
/// are rejected.
pub const SNAPSHOT_VERSION: u64 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user: SnapshotUser,
    #[serde(deserialize_with = "null_as_empty")]
    pub profiles: Vec<Profile>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub cards: Vec<Card>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub images: Vec<CardImage>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<Tag>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub card_tags: Vec<CardTag>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub interaction_notes: Vec<InteractionNote>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnapshotUser {
    #[serde(default)]
    pub id: String,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Produce a snapshot of `dataset` stamped with `exported_at` (truncated
/// to milliseconds).
pub fn encode(dataset: Dataset, exported_at: DateTime<Utc>) -> Snapshot {
    Snapshot {
        version: SNAPSHOT_VERSION,
        exported_at: Some(exported_at.trunc_subsecs(3)),
        user: SnapshotUser {
            id: dataset.owner_id,
        },
        profiles: dataset.profiles,
        cards: dataset.cards,
        images: dataset.images,
        tags: dataset.tags,
        card_tags: dataset.card_tags,
        interaction_notes: dataset.notes,
    }
}

/// Parse a snapshot document.
///
/// Fails with [`SyncError::Format`] when the text is not a JSON object,
/// lacks `version` or `profiles`, has an unsupported version, or holds
/// entities that do not parse (including attachments that are not data
/// URLs).
pub fn decode(text: &str) -> SyncResult<Snapshot> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| SyncError::format(format!("not a JSON document: {}", e)))?;

    let obj = value
        .as_object()
        .ok_or_else(|| SyncError::format("document is not a JSON object"))?;

    let version = match obj.get("version") {
        None | Some(Value::Null) => return Err(SyncError::format("missing 'version'")),
        Some(v) => v
            .as_u64()
            .ok_or_else(|| SyncError::format(format!("'version' is not a number: {}", v)))?,
    };
    if version == 0 || version > SNAPSHOT_VERSION {
        return Err(SyncError::format(format!(
            "unsupported version {} (this build reads up to {})",
            version, SNAPSHOT_VERSION
        )));
    }

    if !obj.get("profiles").map(Value::is_array).unwrap_or(false) {
        return Err(SyncError::format("missing 'profiles' array"));
    }

    serde_json::from_value(value).map_err(|e| SyncError::format(e.to_string()))
}

impl Snapshot {
    /// Pretty-printed JSON text, two-space indented.
    pub fn to_json(&self) -> SyncResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| SyncError::format(e.to_string()))
    }

    pub fn into_dataset(self) -> Dataset {
        Dataset {
            owner_id: self.user.id,
            profiles: self.profiles,
            cards: self.cards,
            images: self.images,
            tags: self.tags,
            card_tags: self.card_tags,
            notes: self.interaction_notes,
        }
    }

    /// SHA-256 of the document with `exportedAt` left out. Two snapshots of
    /// an unchanged dataset have the same digest.
    pub fn content_digest(&self) -> String {
        let mut body = self.clone();
        body.exported_at = None;
        let bytes = serde_json::to_vec(&body).unwrap_or_default();
        hex::encode(Sha256::digest(&bytes))
    }

    /// References that the snapshot alone does not satisfy.
    pub fn dangling_references(&self) -> Vec<DanglingReference> {
        let profile_ids: HashSet<&str> = self.profiles.iter().map(|p| p.id.as_str()).collect();
        let card_ids: HashSet<&str> = self.cards.iter().map(|c| c.id.as_str()).collect();
        let tag_ids: HashSet<&str> = self.tags.iter().map(|t| t.id.as_str()).collect();

        let mut dangling = Vec::new();

        for card in &self.cards {
            if !profile_ids.contains(card.profile_id.as_str()) {
                dangling.push(DanglingReference {
                    kind: ReferenceKind::CardProfile,
                    source_id: card.id.clone(),
                    target_id: card.profile_id.clone(),
                });
            }
        }
        for image in &self.images {
            if !card_ids.contains(image.card_id.as_str()) {
                dangling.push(DanglingReference {
                    kind: ReferenceKind::ImageCard,
                    source_id: image.id.clone(),
                    target_id: image.card_id.clone(),
                });
            }
        }
        for link in &self.card_tags {
            if !card_ids.contains(link.card_id.as_str()) {
                dangling.push(DanglingReference {
                    kind: ReferenceKind::LinkCard,
                    source_id: format!("{}:{}", link.card_id, link.tag_id),
                    target_id: link.card_id.clone(),
                });
            }
            if !tag_ids.contains(link.tag_id.as_str()) {
                dangling.push(DanglingReference {
                    kind: ReferenceKind::LinkTag,
                    source_id: format!("{}:{}", link.card_id, link.tag_id),
                    target_id: link.tag_id.clone(),
                });
            }
        }
        for note in &self.interaction_notes {
            if !card_ids.contains(note.card_id.as_str()) {
                dangling.push(DanglingReference {
                    kind: ReferenceKind::NoteCard,
                    source_id: note.id.clone(),
                    target_id: note.card_id.clone(),
                });
            }
        }

        dangling
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    CardProfile,
    ImageCard,
    LinkCard,
    LinkTag,
    NoteCard,
}

impl ReferenceKind {
    /// Collection the reference points into.
    pub fn target(&self) -> &'static str {
        match self {
            ReferenceKind::CardProfile => "profiles",
            ReferenceKind::ImageCard | ReferenceKind::LinkCard | ReferenceKind::NoteCard => "cards",
            ReferenceKind::LinkTag => "tags",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingReference {
    pub kind: ReferenceKind,
    pub source_id: String,
    pub target_id: String,
}

//! Core data models for the card manager.
//!
//! Field names serialize in camelCase, which is the layout of the backup
//! document. Optional fields are omitted when absent.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::attachment::Attachment;

/// Current time truncated to millisecond precision, the resolution every
/// stored and exported timestamp uses.
pub fn now_ms() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

/// One of the user's own affiliations (company and role).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub user_id: String,
    pub company_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "crate::attachment::lenient_opt"
    )]
    pub card_image: Option<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_current: Option<bool>,
    pub display_order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A contact record taken from a scanned business card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub profile_id: String,
    pub person_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub person_name_kana: Option<String>,
    pub company_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub area: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meeting_place: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    /// 1 (lowest) to 5 (highest).
    pub priority: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageType {
    Front,
    Back,
    Other,
}

/// A scanned image belonging to exactly one card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardImage {
    pub id: String,
    pub card_id: String,
    pub image_data: Attachment,
    pub image_type: ImageType,
    pub display_order: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Association of a tag with a card, keyed by `(card_id, tag_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardTag {
    pub card_id: String,
    pub tag_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteType {
    Memo,
    Meeting,
    Email,
    Call,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionNote {
    pub id: String,
    pub card_id: String,
    pub content: String,
    /// When the interaction took place.
    pub date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub note_type: NoteType,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything one user owns, as read from or written to the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub owner_id: String,
    pub profiles: Vec<Profile>,
    pub cards: Vec<Card>,
    pub images: Vec<CardImage>,
    pub tags: Vec<Tag>,
    pub card_tags: Vec<CardTag>,
    pub notes: Vec<InteractionNote>,
}

impl Dataset {
    pub fn empty(owner_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            ..Self::default()
        }
    }

    pub fn counts(&self) -> DatasetCounts {
        DatasetCounts {
            profiles: self.profiles.len(),
            cards: self.cards.len(),
            images: self.images.len(),
            tags: self.tags.len(),
            card_tags: self.card_tags.len(),
            notes: self.notes.len(),
        }
    }
}

/// Per-collection row counts, used in reports and stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DatasetCounts {
    pub profiles: usize,
    pub cards: usize,
    pub images: usize,
    pub tags: usize,
    pub card_tags: usize,
    pub notes: usize,
}

impl fmt::Display for DatasetCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} profiles, {} cards, {} images, {} tags, {} tag links, {} notes",
            self.profiles, self.cards, self.images, self.tags, self.card_tags, self.notes
        )
    }
}

impl ImageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageType::Front => "front",
            ImageType::Back => "back",
            ImageType::Other => "other",
        }
    }
}

impl FromStr for ImageType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "front" => Ok(ImageType::Front),
            "back" => Ok(ImageType::Back),
            "other" => Ok(ImageType::Other),
            other => anyhow::bail!("Unknown image type: '{}'. Must be front, back, or other.", other),
        }
    }
}

impl NoteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoteType::Memo => "memo",
            NoteType::Meeting => "meeting",
            NoteType::Email => "email",
            NoteType::Call => "call",
            NoteType::Other => "other",
        }
    }
}

impl FromStr for NoteType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "memo" => Ok(NoteType::Memo),
            "meeting" => Ok(NoteType::Meeting),
            "email" => Ok(NoteType::Email),
            "call" => Ok(NoteType::Call),
            "other" => Ok(NoteType::Other),
            other => anyhow::bail!(
                "Unknown note type: '{}'. Must be memo, meeting, email, call, or other.",
                other
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn note_type_serializes_under_type_key() {
        let note = InteractionNote {
            id: "n1".into(),
            card_id: "c1".into(),
            content: "lunch".into(),
            date: now_ms(),
            note_type: NoteType::Meeting,
            created_at: now_ms(),
            updated_at: now_ms(),
        };
        let value = serde_json::to_value(&note).unwrap();
        assert_eq!(value["type"], "meeting");
        assert_eq!(value["cardId"], "c1");
    }

    #[test]
    fn enum_text_round_trips() {
        for t in [ImageType::Front, ImageType::Back, ImageType::Other] {
            assert_eq!(t.as_str().parse::<ImageType>().unwrap(), t);
        }
        assert!("sideways".parse::<ImageType>().is_err());
        assert_eq!("call".parse::<NoteType>().unwrap(), NoteType::Call);
    }
}

//! Storage abstraction for the card dataset.
//!
//! The [`Store`] trait is the dataset-access layer: per-entity reads,
//! upserts keyed by identifier, cascading deletes, the bulk
//! replace-by-identifier used by restore, and the persisted
//! last-synced marker. [`crate::sqlite_store::SqliteStore`] backs the
//! application; [`memory::InMemoryStore`] backs tests.
//!
//! Implementations must be `Send + Sync` so the sync orchestrator can hold
//! one behind an `Arc` across tasks.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Card, CardImage, CardTag, Dataset, InteractionNote, Profile, Tag};

/// Abstract storage backend.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`load_dataset`](Store::load_dataset) | Everything one owner has, for export |
/// | [`replace_by_id`](Store::replace_by_id) | Upsert every collection in one transaction |
/// | `upsert_*` | Insert or replace one row by id |
/// | `delete_*` | Delete one row; cards and tags cascade |
/// | [`last_synced_at`](Store::last_synced_at) | Marker of the last successful sync or restore |
#[async_trait]
pub trait Store: Send + Sync {
    /// Read the owner's dataset: profiles and tags by owner, cards by
    /// profile, images and notes by card, links by tag.
    async fn load_dataset(&self, owner_id: &str) -> Result<Dataset>;

    /// Upsert every entity of `dataset` by identifier, atomically. Rows
    /// absent from `dataset` are left alone.
    async fn replace_by_id(&self, dataset: &Dataset) -> Result<()>;

    async fn list_profiles(&self, owner_id: &str) -> Result<Vec<Profile>>;
    async fn get_profile(&self, id: &str) -> Result<Option<Profile>>;
    async fn upsert_profile(&self, profile: &Profile) -> Result<()>;
    async fn delete_profile(&self, id: &str) -> Result<bool>;

    async fn list_cards(&self, profile_id: &str) -> Result<Vec<Card>>;
    async fn get_card(&self, id: &str) -> Result<Option<Card>>;
    async fn upsert_card(&self, card: &Card) -> Result<()>;
    /// Delete a card with its images, tag links, and notes.
    async fn delete_card(&self, id: &str) -> Result<bool>;

    /// Images of a card ordered by display order.
    async fn list_images(&self, card_id: &str) -> Result<Vec<CardImage>>;
    async fn upsert_image(&self, image: &CardImage) -> Result<()>;
    async fn delete_image(&self, id: &str) -> Result<bool>;

    async fn list_tags(&self, owner_id: &str) -> Result<Vec<Tag>>;
    async fn get_tag(&self, id: &str) -> Result<Option<Tag>>;
    async fn upsert_tag(&self, tag: &Tag) -> Result<()>;
    /// Delete a tag with all its card links.
    async fn delete_tag(&self, id: &str) -> Result<bool>;

    async fn list_card_tags(&self, card_id: &str) -> Result<Vec<CardTag>>;
    /// Insert a link. Returns `false` if it already existed.
    async fn insert_card_tag(&self, link: &CardTag) -> Result<bool>;
    async fn delete_card_tag(&self, card_id: &str, tag_id: &str) -> Result<bool>;

    /// Notes of a card ordered by interaction date.
    async fn list_notes(&self, card_id: &str) -> Result<Vec<InteractionNote>>;
    async fn get_note(&self, id: &str) -> Result<Option<InteractionNote>>;
    async fn upsert_note(&self, note: &InteractionNote) -> Result<()>;
    async fn delete_note(&self, id: &str) -> Result<bool>;

    async fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>>;
    async fn set_last_synced_at(&self, at: DateTime<Utc>) -> Result<()>;
}

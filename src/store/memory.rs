//! In-memory [`Store`] implementation for tests.
//!
//! All tables sit behind a single `RwLock`, so `replace_by_id` and the
//! cascading deletes are atomic with respect to readers.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{Card, CardImage, CardTag, Dataset, InteractionNote, Profile, Tag};

use super::Store;

#[derive(Default)]
struct Tables {
    profiles: HashMap<String, Profile>,
    cards: HashMap<String, Card>,
    images: HashMap<String, CardImage>,
    tags: HashMap<String, Tag>,
    card_tags: BTreeMap<(String, String), CardTag>,
    notes: HashMap<String, InteractionNote>,
    last_synced_at: Option<DateTime<Utc>>,
}

/// In-memory store for tests.
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sorted_profiles(mut profiles: Vec<Profile>) -> Vec<Profile> {
    profiles.sort_by(|a, b| {
        a.display_order
            .cmp(&b.display_order)
            .then_with(|| a.id.cmp(&b.id))
    });
    profiles
}

fn sorted_cards(mut cards: Vec<Card>) -> Vec<Card> {
    cards.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    cards
}

fn sorted_images(mut images: Vec<CardImage>) -> Vec<CardImage> {
    images.sort_by(|a, b| {
        a.card_id
            .cmp(&b.card_id)
            .then_with(|| a.display_order.cmp(&b.display_order))
            .then_with(|| a.id.cmp(&b.id))
    });
    images
}

fn sorted_tags(mut tags: Vec<Tag>) -> Vec<Tag> {
    tags.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    tags
}

fn sorted_notes(mut notes: Vec<InteractionNote>) -> Vec<InteractionNote> {
    notes.sort_by(|a, b| {
        a.card_id
            .cmp(&b.card_id)
            .then_with(|| a.date.cmp(&b.date))
            .then_with(|| a.id.cmp(&b.id))
    });
    notes
}

#[async_trait]
impl Store for InMemoryStore {
    async fn load_dataset(&self, owner_id: &str) -> Result<Dataset> {
        let t = self.tables.read().unwrap();

        let profiles: Vec<Profile> = t
            .profiles
            .values()
            .filter(|p| p.user_id == owner_id)
            .cloned()
            .collect();
        let profile_ids: HashSet<&str> = profiles.iter().map(|p| p.id.as_str()).collect();

        let cards: Vec<Card> = t
            .cards
            .values()
            .filter(|c| profile_ids.contains(c.profile_id.as_str()))
            .cloned()
            .collect();
        let card_ids: HashSet<&str> = cards.iter().map(|c| c.id.as_str()).collect();

        let images = t
            .images
            .values()
            .filter(|i| card_ids.contains(i.card_id.as_str()))
            .cloned()
            .collect();

        let tags: Vec<Tag> = t
            .tags
            .values()
            .filter(|tag| tag.user_id == owner_id)
            .cloned()
            .collect();
        let tag_ids: HashSet<&str> = tags.iter().map(|tag| tag.id.as_str()).collect();

        let card_tags = t
            .card_tags
            .values()
            .filter(|l| tag_ids.contains(l.tag_id.as_str()))
            .cloned()
            .collect();

        let notes = t
            .notes
            .values()
            .filter(|n| card_ids.contains(n.card_id.as_str()))
            .cloned()
            .collect();

        Ok(Dataset {
            owner_id: owner_id.to_string(),
            profiles: sorted_profiles(profiles),
            cards: sorted_cards(cards),
            images: sorted_images(images),
            tags: sorted_tags(tags),
            card_tags,
            notes: sorted_notes(notes),
        })
    }

    async fn replace_by_id(&self, dataset: &Dataset) -> Result<()> {
        let mut t = self.tables.write().unwrap();
        for p in &dataset.profiles {
            t.profiles.insert(p.id.clone(), p.clone());
        }
        for c in &dataset.cards {
            t.cards.insert(c.id.clone(), c.clone());
        }
        for i in &dataset.images {
            t.images.insert(i.id.clone(), i.clone());
        }
        for tag in &dataset.tags {
            t.tags.insert(tag.id.clone(), tag.clone());
        }
        for l in &dataset.card_tags {
            t.card_tags
                .insert((l.card_id.clone(), l.tag_id.clone()), l.clone());
        }
        for n in &dataset.notes {
            t.notes.insert(n.id.clone(), n.clone());
        }
        Ok(())
    }

    async fn list_profiles(&self, owner_id: &str) -> Result<Vec<Profile>> {
        let t = self.tables.read().unwrap();
        Ok(sorted_profiles(
            t.profiles
                .values()
                .filter(|p| p.user_id == owner_id)
                .cloned()
                .collect(),
        ))
    }

    async fn get_profile(&self, id: &str) -> Result<Option<Profile>> {
        Ok(self.tables.read().unwrap().profiles.get(id).cloned())
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        self.tables
            .write()
            .unwrap()
            .profiles
            .insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn delete_profile(&self, id: &str) -> Result<bool> {
        Ok(self.tables.write().unwrap().profiles.remove(id).is_some())
    }

    async fn list_cards(&self, profile_id: &str) -> Result<Vec<Card>> {
        let t = self.tables.read().unwrap();
        Ok(sorted_cards(
            t.cards
                .values()
                .filter(|c| c.profile_id == profile_id)
                .cloned()
                .collect(),
        ))
    }

    async fn get_card(&self, id: &str) -> Result<Option<Card>> {
        Ok(self.tables.read().unwrap().cards.get(id).cloned())
    }

    async fn upsert_card(&self, card: &Card) -> Result<()> {
        self.tables
            .write()
            .unwrap()
            .cards
            .insert(card.id.clone(), card.clone());
        Ok(())
    }

    async fn delete_card(&self, id: &str) -> Result<bool> {
        let mut t = self.tables.write().unwrap();
        let existed = t.cards.remove(id).is_some();
        t.images.retain(|_, i| i.card_id != id);
        t.card_tags.retain(|(card_id, _), _| card_id != id);
        t.notes.retain(|_, n| n.card_id != id);
        Ok(existed)
    }

    async fn list_images(&self, card_id: &str) -> Result<Vec<CardImage>> {
        let t = self.tables.read().unwrap();
        Ok(sorted_images(
            t.images
                .values()
                .filter(|i| i.card_id == card_id)
                .cloned()
                .collect(),
        ))
    }

    async fn upsert_image(&self, image: &CardImage) -> Result<()> {
        self.tables
            .write()
            .unwrap()
            .images
            .insert(image.id.clone(), image.clone());
        Ok(())
    }

    async fn delete_image(&self, id: &str) -> Result<bool> {
        Ok(self.tables.write().unwrap().images.remove(id).is_some())
    }

    async fn list_tags(&self, owner_id: &str) -> Result<Vec<Tag>> {
        let t = self.tables.read().unwrap();
        Ok(sorted_tags(
            t.tags
                .values()
                .filter(|tag| tag.user_id == owner_id)
                .cloned()
                .collect(),
        ))
    }

    async fn get_tag(&self, id: &str) -> Result<Option<Tag>> {
        Ok(self.tables.read().unwrap().tags.get(id).cloned())
    }

    async fn upsert_tag(&self, tag: &Tag) -> Result<()> {
        self.tables
            .write()
            .unwrap()
            .tags
            .insert(tag.id.clone(), tag.clone());
        Ok(())
    }

    async fn delete_tag(&self, id: &str) -> Result<bool> {
        let mut t = self.tables.write().unwrap();
        t.card_tags.retain(|(_, tag_id), _| tag_id != id);
        Ok(t.tags.remove(id).is_some())
    }

    async fn list_card_tags(&self, card_id: &str) -> Result<Vec<CardTag>> {
        let t = self.tables.read().unwrap();
        Ok(t.card_tags
            .values()
            .filter(|l| l.card_id == card_id)
            .cloned()
            .collect())
    }

    async fn insert_card_tag(&self, link: &CardTag) -> Result<bool> {
        let mut t = self.tables.write().unwrap();
        let key = (link.card_id.clone(), link.tag_id.clone());
        if t.card_tags.contains_key(&key) {
            return Ok(false);
        }
        t.card_tags.insert(key, link.clone());
        Ok(true)
    }

    async fn delete_card_tag(&self, card_id: &str, tag_id: &str) -> Result<bool> {
        let mut t = self.tables.write().unwrap();
        Ok(t.card_tags
            .remove(&(card_id.to_string(), tag_id.to_string()))
            .is_some())
    }

    async fn list_notes(&self, card_id: &str) -> Result<Vec<InteractionNote>> {
        let t = self.tables.read().unwrap();
        Ok(sorted_notes(
            t.notes
                .values()
                .filter(|n| n.card_id == card_id)
                .cloned()
                .collect(),
        ))
    }

    async fn get_note(&self, id: &str) -> Result<Option<InteractionNote>> {
        Ok(self.tables.read().unwrap().notes.get(id).cloned())
    }

    async fn upsert_note(&self, note: &InteractionNote) -> Result<()> {
        self.tables
            .write()
            .unwrap()
            .notes
            .insert(note.id.clone(), note.clone());
        Ok(())
    }

    async fn delete_note(&self, id: &str) -> Result<bool> {
        Ok(self.tables.write().unwrap().notes.remove(id).is_some())
    }

    async fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.tables.read().unwrap().last_synced_at)
    }

    async fn set_last_synced_at(&self, at: DateTime<Utc>) -> Result<()> {
        self.tables.write().unwrap().last_synced_at = Some(at);
        Ok(())
    }
}

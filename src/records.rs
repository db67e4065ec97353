//! Data-owning operations on profiles, cards, images, tags and notes.
//!
//! Every operation commits through the [`Store`] and then tells the
//! [`MutationHook`] so that folder sync can schedule a backup. Reads do not
//! notify, and neither do operations that turn out to change nothing
//! (linking a tag that is already linked, deleting a missing row).

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::attachment::Attachment;
use crate::models::{
    now_ms, Card, CardImage, CardTag, ImageType, InteractionNote, NoteType, Profile, Tag,
};
use crate::orchestrator::MutationHook;
use crate::store::Store;

/// Most notes one card may receive for a single calendar day (UTC).
pub const MAX_NOTES_PER_DAY: usize = 50;

pub const DEFAULT_PRIORITY: i64 = 3;

/// Hook that ignores mutations, for when sync is not wired in.
pub struct NoopHook;

impl MutationHook for NoopHook {
    fn mutation_committed(&self) {}
}

/// Fields of a new profile. Identity, ordering and timestamps are assigned
/// on create.
#[derive(Debug, Clone, Default)]
pub struct ProfileDraft {
    pub company_name: String,
    pub position: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub card_image: Option<Attachment>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub is_current: Option<bool>,
}

/// Fields of a new card.
#[derive(Debug, Clone)]
pub struct CardDraft {
    pub profile_id: String,
    pub person_name: String,
    pub person_name_kana: Option<String>,
    pub company_name: String,
    pub department: Option<String>,
    pub position: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub mobile: Option<String>,
    pub address: Option<String>,
    pub website: Option<String>,
    pub industry: Option<String>,
    pub area: Option<String>,
    pub position_level: Option<String>,
    pub title: Option<String>,
    pub exchange_date: Option<DateTime<Utc>>,
    pub meeting_place: Option<String>,
    pub memo: Option<String>,
    pub priority: i64,
}

impl CardDraft {
    pub fn new(
        profile_id: impl Into<String>,
        person_name: impl Into<String>,
        company_name: impl Into<String>,
    ) -> Self {
        Self {
            profile_id: profile_id.into(),
            person_name: person_name.into(),
            person_name_kana: None,
            company_name: company_name.into(),
            department: None,
            position: None,
            email: None,
            phone: None,
            mobile: None,
            address: None,
            website: None,
            industry: None,
            area: None,
            position_level: None,
            title: None,
            exchange_date: None,
            meeting_place: None,
            memo: None,
            priority: DEFAULT_PRIORITY,
        }
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn check_priority(priority: i64) -> Result<()> {
    if !(1..=5).contains(&priority) {
        bail!("priority must be between 1 and 5, got {}", priority);
    }
    Ok(())
}

/// Record operations for one owner.
pub struct Records {
    store: Arc<dyn Store>,
    hook: Arc<dyn MutationHook>,
    owner_id: String,
}

impl Records {
    pub fn new(store: Arc<dyn Store>, hook: Arc<dyn MutationHook>, owner_id: impl Into<String>) -> Self {
        Self {
            store,
            hook,
            owner_id: owner_id.into(),
        }
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn committed(&self, what: &str) {
        debug!(what, "Mutation committed");
        self.hook.mutation_committed();
    }

    // ── profiles ─────────────────────────────────────────────────────

    pub async fn list_profiles(&self) -> Result<Vec<Profile>> {
        self.store.list_profiles(&self.owner_id).await
    }

    /// Create a profile placed after the owner's existing ones.
    pub async fn create_profile(&self, draft: ProfileDraft) -> Result<Profile> {
        if draft.company_name.trim().is_empty() {
            bail!("company name must not be empty");
        }
        let count = self.store.list_profiles(&self.owner_id).await?.len();
        let now = now_ms();
        let profile = Profile {
            id: new_id(),
            user_id: self.owner_id.clone(),
            company_name: draft.company_name,
            position: draft.position,
            email: draft.email,
            phone: draft.phone,
            address: draft.address,
            card_image: draft.card_image,
            start_date: draft.start_date,
            end_date: draft.end_date,
            is_current: draft.is_current,
            display_order: count as i64 + 1,
            created_at: now,
            updated_at: now,
        };
        self.store.upsert_profile(&profile).await?;
        self.committed("profile created");
        Ok(profile)
    }

    pub async fn update_profile<F>(&self, id: &str, edit: F) -> Result<Profile>
    where
        F: FnOnce(&mut Profile),
    {
        let Some(mut profile) = self.store.get_profile(id).await? else {
            bail!("profile not found: {}", id);
        };
        edit(&mut profile);
        profile.id = id.to_string();
        profile.updated_at = now_ms();
        self.store.upsert_profile(&profile).await?;
        self.committed("profile updated");
        Ok(profile)
    }

    /// Delete a profile. Refused while cards are still filed under it.
    pub async fn delete_profile(&self, id: &str) -> Result<bool> {
        let cards = self.store.list_cards(id).await?;
        if !cards.is_empty() {
            bail!(
                "profile {} still has {} card(s); delete or move them first",
                id,
                cards.len()
            );
        }
        let deleted = self.store.delete_profile(id).await?;
        if deleted {
            self.committed("profile deleted");
        }
        Ok(deleted)
    }

    /// Renumber profiles in the given order, starting at 1.
    pub async fn reorder_profiles(&self, ids: &[String]) -> Result<()> {
        let mut changed = Vec::new();
        for (index, id) in ids.iter().enumerate() {
            let Some(mut profile) = self.store.get_profile(id).await? else {
                bail!("profile not found: {}", id);
            };
            profile.display_order = index as i64 + 1;
            changed.push(profile);
        }
        for profile in &changed {
            self.store.upsert_profile(profile).await?;
        }
        if !changed.is_empty() {
            self.committed("profiles reordered");
        }
        Ok(())
    }

    // ── cards ────────────────────────────────────────────────────────

    pub async fn list_cards(&self, profile_id: &str) -> Result<Vec<Card>> {
        self.store.list_cards(profile_id).await
    }

    pub async fn get_card(&self, id: &str) -> Result<Option<Card>> {
        self.store.get_card(id).await
    }

    pub async fn create_card(&self, draft: CardDraft) -> Result<Card> {
        check_priority(draft.priority)?;
        if self.store.get_profile(&draft.profile_id).await?.is_none() {
            bail!("profile not found: {}", draft.profile_id);
        }

        let now = now_ms();
        let card = Card {
            id: new_id(),
            profile_id: draft.profile_id,
            person_name: draft.person_name,
            person_name_kana: draft.person_name_kana,
            company_name: draft.company_name,
            department: draft.department,
            position: draft.position,
            email: draft.email,
            phone: draft.phone,
            mobile: draft.mobile,
            address: draft.address,
            website: draft.website,
            industry: draft.industry,
            area: draft.area,
            position_level: draft.position_level,
            title: draft.title,
            exchange_date: draft.exchange_date,
            meeting_place: draft.meeting_place,
            memo: draft.memo,
            priority: draft.priority,
            created_at: now,
            updated_at: now,
        };
        self.store.upsert_card(&card).await?;
        self.committed("card created");
        Ok(card)
    }

    pub async fn update_card<F>(&self, id: &str, edit: F) -> Result<Card>
    where
        F: FnOnce(&mut Card),
    {
        let Some(mut card) = self.store.get_card(id).await? else {
            bail!("card not found: {}", id);
        };
        edit(&mut card);
        check_priority(card.priority)?;
        card.id = id.to_string();
        card.updated_at = now_ms();
        self.store.upsert_card(&card).await?;
        self.committed("card updated");
        Ok(card)
    }

    /// Delete a card together with its images, tag links and notes.
    pub async fn delete_card(&self, id: &str) -> Result<bool> {
        let deleted = self.store.delete_card(id).await?;
        if deleted {
            self.committed("card deleted");
        }
        Ok(deleted)
    }

    // ── images ───────────────────────────────────────────────────────

    pub async fn list_images(&self, card_id: &str) -> Result<Vec<CardImage>> {
        self.store.list_images(card_id).await
    }

    /// Attach an image after the card's existing ones.
    pub async fn add_image(
        &self,
        card_id: &str,
        data: Attachment,
        image_type: ImageType,
    ) -> Result<CardImage> {
        if self.store.get_card(card_id).await?.is_none() {
            bail!("card not found: {}", card_id);
        }
        let display_order = self.store.list_images(card_id).await?.len() as i64;
        let image = CardImage {
            id: new_id(),
            card_id: card_id.to_string(),
            image_data: data,
            image_type,
            display_order,
            created_at: now_ms(),
        };
        self.store.upsert_image(&image).await?;
        self.committed("image added");
        Ok(image)
    }

    pub async fn delete_image(&self, id: &str) -> Result<bool> {
        let deleted = self.store.delete_image(id).await?;
        if deleted {
            self.committed("image deleted");
        }
        Ok(deleted)
    }

    // ── tags ─────────────────────────────────────────────────────────

    pub async fn list_tags(&self) -> Result<Vec<Tag>> {
        self.store.list_tags(&self.owner_id).await
    }

    pub async fn create_tag(&self, name: &str, color: Option<String>) -> Result<Tag> {
        if name.trim().is_empty() {
            bail!("tag name must not be empty");
        }
        let now = now_ms();
        let tag = Tag {
            id: new_id(),
            user_id: self.owner_id.clone(),
            name: name.to_string(),
            color,
            created_at: now,
            updated_at: now,
        };
        self.store.upsert_tag(&tag).await?;
        self.committed("tag created");
        Ok(tag)
    }

    /// Delete a tag and unlink it from every card.
    pub async fn delete_tag(&self, id: &str) -> Result<bool> {
        let deleted = self.store.delete_tag(id).await?;
        if deleted {
            self.committed("tag deleted");
        }
        Ok(deleted)
    }

    /// Link a tag to a card. Returns `false` if the link already existed.
    pub async fn assign_tag(&self, card_id: &str, tag_id: &str) -> Result<bool> {
        if self.store.get_card(card_id).await?.is_none() {
            bail!("card not found: {}", card_id);
        }
        if self.store.get_tag(tag_id).await?.is_none() {
            bail!("tag not found: {}", tag_id);
        }

        let link = CardTag {
            card_id: card_id.to_string(),
            tag_id: tag_id.to_string(),
            created_at: now_ms(),
        };
        let inserted = self.store.insert_card_tag(&link).await?;
        if inserted {
            self.committed("tag assigned");
        }
        Ok(inserted)
    }

    pub async fn remove_tag(&self, card_id: &str, tag_id: &str) -> Result<bool> {
        let removed = self.store.delete_card_tag(card_id, tag_id).await?;
        if removed {
            self.committed("tag removed");
        }
        Ok(removed)
    }

    pub async fn tags_for_card(&self, card_id: &str) -> Result<Vec<Tag>> {
        let mut tags = Vec::new();
        for link in self.store.list_card_tags(card_id).await? {
            if let Some(tag) = self.store.get_tag(&link.tag_id).await? {
                tags.push(tag);
            }
        }
        Ok(tags)
    }

    // ── notes ────────────────────────────────────────────────────────

    pub async fn list_notes(&self, card_id: &str) -> Result<Vec<InteractionNote>> {
        self.store.list_notes(card_id).await
    }

    /// Record an interaction. At most [`MAX_NOTES_PER_DAY`] per card and
    /// calendar day.
    pub async fn add_note(
        &self,
        card_id: &str,
        content: &str,
        date: DateTime<Utc>,
        note_type: NoteType,
    ) -> Result<InteractionNote> {
        if self.store.get_card(card_id).await?.is_none() {
            bail!("card not found: {}", card_id);
        }

        let day = date.date_naive();
        let same_day = self
            .store
            .list_notes(card_id)
            .await?
            .iter()
            .filter(|n| n.date.date_naive() == day)
            .count();
        if same_day >= MAX_NOTES_PER_DAY {
            bail!(
                "daily note limit reached: card {} already has {} notes on {}",
                card_id,
                MAX_NOTES_PER_DAY,
                day
            );
        }

        let now = now_ms();
        let note = InteractionNote {
            id: new_id(),
            card_id: card_id.to_string(),
            content: content.to_string(),
            date,
            note_type,
            created_at: now,
            updated_at: now,
        };
        self.store.upsert_note(&note).await?;
        self.committed("note added");
        Ok(note)
    }

    pub async fn update_note(&self, id: &str, content: &str) -> Result<InteractionNote> {
        let Some(mut note) = self.store.get_note(id).await? else {
            bail!("note not found: {}", id);
        };
        note.content = content.to_string();
        note.updated_at = now_ms();
        self.store.upsert_note(&note).await?;
        self.committed("note updated");
        Ok(note)
    }

    pub async fn delete_note(&self, id: &str) -> Result<bool> {
        let deleted = self.store.delete_note(id).await?;
        if deleted {
            self.committed("note deleted");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::InMemoryStore;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingHook(AtomicUsize);

    impl MutationHook for CountingHook {
        fn mutation_committed(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn records() -> (Records, Arc<CountingHook>) {
        let hook = Arc::new(CountingHook::default());
        let records = Records::new(Arc::new(InMemoryStore::new()), hook.clone(), "u1");
        (records, hook)
    }

    fn draft(name: &str) -> ProfileDraft {
        ProfileDraft {
            company_name: name.into(),
            ..ProfileDraft::default()
        }
    }

    fn notified(hook: &CountingHook) -> usize {
        hook.0.load(Ordering::SeqCst)
    }

    #[tokio::test]
    async fn profiles_get_increasing_display_order() {
        let (records, hook) = records();
        let a = records.create_profile(draft("Acme")).await.unwrap();
        let b = records.create_profile(draft("Initech")).await.unwrap();
        assert_eq!((a.display_order, b.display_order), (1, 2));
        assert_eq!(notified(&hook), 2);

        records
            .reorder_profiles(&[b.id.clone(), a.id.clone()])
            .await
            .unwrap();
        let listed = records.list_profiles().await.unwrap();
        assert_eq!(listed[0].id, b.id);
    }

    #[tokio::test]
    async fn card_priority_is_validated() {
        let (records, _) = records();
        let p = records.create_profile(draft("Acme")).await.unwrap();

        let mut bad = CardDraft::new(&p.id, "Taro", "Initech");
        bad.priority = 6;
        assert!(records.create_card(bad).await.is_err());

        let card = records
            .create_card(CardDraft::new(&p.id, "Taro", "Initech"))
            .await
            .unwrap();
        assert_eq!(card.priority, DEFAULT_PRIORITY);
        assert!(records.update_card(&card.id, |c| c.priority = 0).await.is_err());
    }

    #[tokio::test]
    async fn duplicate_link_does_not_notify() {
        let (records, hook) = records();
        let p = records.create_profile(draft("Acme")).await.unwrap();
        let card = records
            .create_card(CardDraft::new(&p.id, "Taro", "Initech"))
            .await
            .unwrap();
        let tag = records.create_tag("partner", None).await.unwrap();
        let before = notified(&hook);

        assert!(records.assign_tag(&card.id, &tag.id).await.unwrap());
        assert!(!records.assign_tag(&card.id, &tag.id).await.unwrap());
        assert_eq!(notified(&hook), before + 1);
        assert_eq!(records.tags_for_card(&card.id).await.unwrap(), vec![tag.clone()]);

        assert!(records.assign_tag(&card.id, "missing").await.is_err());
    }

    #[tokio::test]
    async fn note_limit_per_day() {
        let (records, _) = records();
        let p = records.create_profile(draft("Acme")).await.unwrap();
        let card = records
            .create_card(CardDraft::new(&p.id, "Taro", "Initech"))
            .await
            .unwrap();

        let day = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        for _ in 0..MAX_NOTES_PER_DAY {
            records
                .add_note(&card.id, "hello", day, NoteType::Memo)
                .await
                .unwrap();
        }
        assert!(records
            .add_note(&card.id, "one more", day, NoteType::Memo)
            .await
            .is_err());

        let next_day = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        assert!(records
            .add_note(&card.id, "tomorrow", next_day, NoteType::Call)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn profile_with_cards_cannot_be_deleted() {
        let (records, _) = records();
        let p = records.create_profile(draft("Acme")).await.unwrap();
        let card = records
            .create_card(CardDraft::new(&p.id, "Taro", "Initech"))
            .await
            .unwrap();

        assert!(records.delete_profile(&p.id).await.is_err());
        assert!(records.delete_card(&card.id).await.unwrap());
        assert!(records.delete_profile(&p.id).await.unwrap());
    }

    #[tokio::test]
    async fn deleting_missing_rows_does_not_notify() {
        let (records, hook) = records();
        assert!(!records.delete_card("nope").await.unwrap());
        assert!(!records.delete_tag("nope").await.unwrap());
        assert!(!records.remove_tag("a", "b").await.unwrap());
        assert_eq!(notified(&hook), 0);
    }
}

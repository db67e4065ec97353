//! SQLite-backed [`Store`] implementation.
//!
//! Each entity maps to one table created by [`crate::migrate`]. Upserts use
//! `INSERT ... ON CONFLICT DO UPDATE` so the same statements serve both the
//! records service and the bulk restore, which runs them inside a single
//! transaction.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool};

use crate::attachment::Attachment;
use crate::models::{Card, CardImage, CardTag, Dataset, InteractionNote, Profile, Tag};
use crate::store::Store;

const LAST_SYNCED_KEY: &str = "last_synced_at";

/// SQLite implementation of the [`Store`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn fmt_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn fmt_opt_ts(ts: &Option<DateTime<Utc>>) -> Option<String> {
    ts.as_ref().map(fmt_ts)
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid timestamp in database: {}", raw))?
        .with_timezone(&Utc))
}

fn parse_opt_ts(raw: Option<String>) -> Result<Option<DateTime<Utc>>> {
    raw.as_deref().map(parse_ts).transpose()
}

fn row_to_profile(row: &SqliteRow) -> Result<Profile> {
    let image_mime: Option<String> = row.try_get("card_image_mime")?;
    let image: Option<Vec<u8>> = row.try_get("card_image")?;
    let card_image = match (image_mime, image) {
        (Some(mime), Some(bytes)) => Some(Attachment::new(mime, bytes)),
        _ => None,
    };
    let is_current: Option<i64> = row.try_get("is_current")?;

    Ok(Profile {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        company_name: row.try_get("company_name")?,
        position: row.try_get("position")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        address: row.try_get("address")?,
        card_image,
        start_date: parse_opt_ts(row.try_get("start_date")?)?,
        end_date: parse_opt_ts(row.try_get("end_date")?)?,
        is_current: is_current.map(|v| v != 0),
        display_order: row.try_get("display_order")?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_ts(&row.try_get::<String, _>("updated_at")?)?,
    })
}

fn row_to_card(row: &SqliteRow) -> Result<Card> {
    Ok(Card {
        id: row.try_get("id")?,
        profile_id: row.try_get("profile_id")?,
        person_name: row.try_get("person_name")?,
        person_name_kana: row.try_get("person_name_kana")?,
        company_name: row.try_get("company_name")?,
        department: row.try_get("department")?,
        position: row.try_get("position")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        mobile: row.try_get("mobile")?,
        address: row.try_get("address")?,
        website: row.try_get("website")?,
        industry: row.try_get("industry")?,
        area: row.try_get("area")?,
        position_level: row.try_get("position_level")?,
        title: row.try_get("title")?,
        exchange_date: parse_opt_ts(row.try_get("exchange_date")?)?,
        meeting_place: row.try_get("meeting_place")?,
        memo: row.try_get("memo")?,
        priority: row.try_get("priority")?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_ts(&row.try_get::<String, _>("updated_at")?)?,
    })
}

fn row_to_image(row: &SqliteRow) -> Result<CardImage> {
    let image_type: String = row.try_get("image_type")?;
    Ok(CardImage {
        id: row.try_get("id")?,
        card_id: row.try_get("card_id")?,
        image_data: Attachment::new(
            row.try_get::<String, _>("mime")?,
            row.try_get::<Vec<u8>, _>("data")?,
        ),
        image_type: image_type.parse()?,
        display_order: row.try_get("display_order")?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn row_to_tag(row: &SqliteRow) -> Result<Tag> {
    Ok(Tag {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        name: row.try_get("name")?,
        color: row.try_get("color")?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_ts(&row.try_get::<String, _>("updated_at")?)?,
    })
}

fn row_to_card_tag(row: &SqliteRow) -> Result<CardTag> {
    Ok(CardTag {
        card_id: row.try_get("card_id")?,
        tag_id: row.try_get("tag_id")?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn row_to_note(row: &SqliteRow) -> Result<InteractionNote> {
    let note_type: String = row.try_get("note_type")?;
    Ok(InteractionNote {
        id: row.try_get("id")?,
        card_id: row.try_get("card_id")?,
        content: row.try_get("content")?,
        date: parse_ts(&row.try_get::<String, _>("date")?)?,
        note_type: note_type.parse()?,
        created_at: parse_ts(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_ts(&row.try_get::<String, _>("updated_at")?)?,
    })
}

fn collect<T>(rows: &[SqliteRow], f: fn(&SqliteRow) -> Result<T>) -> Result<Vec<T>> {
    rows.iter().map(f).collect()
}

async fn write_profile<'e, E>(exec: E, p: &Profile) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO profiles (id, user_id, company_name, position, email, phone, address,
                              card_image_mime, card_image, start_date, end_date, is_current,
                              display_order, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            user_id = excluded.user_id,
            company_name = excluded.company_name,
            position = excluded.position,
            email = excluded.email,
            phone = excluded.phone,
            address = excluded.address,
            card_image_mime = excluded.card_image_mime,
            card_image = excluded.card_image,
            start_date = excluded.start_date,
            end_date = excluded.end_date,
            is_current = excluded.is_current,
            display_order = excluded.display_order,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&p.id)
    .bind(&p.user_id)
    .bind(&p.company_name)
    .bind(&p.position)
    .bind(&p.email)
    .bind(&p.phone)
    .bind(&p.address)
    .bind(p.card_image.as_ref().map(|a| a.mime.clone()))
    .bind(p.card_image.as_ref().map(|a| a.bytes.clone()))
    .bind(fmt_opt_ts(&p.start_date))
    .bind(fmt_opt_ts(&p.end_date))
    .bind(p.is_current)
    .bind(p.display_order)
    .bind(fmt_ts(&p.created_at))
    .bind(fmt_ts(&p.updated_at))
    .execute(exec)
    .await?;
    Ok(())
}

async fn write_card<'e, E>(exec: E, c: &Card) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO cards (id, profile_id, person_name, person_name_kana, company_name,
                           department, position, email, phone, mobile, address, website,
                           industry, area, position_level, title, exchange_date,
                           meeting_place, memo, priority, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            profile_id = excluded.profile_id,
            person_name = excluded.person_name,
            person_name_kana = excluded.person_name_kana,
            company_name = excluded.company_name,
            department = excluded.department,
            position = excluded.position,
            email = excluded.email,
            phone = excluded.phone,
            mobile = excluded.mobile,
            address = excluded.address,
            website = excluded.website,
            industry = excluded.industry,
            area = excluded.area,
            position_level = excluded.position_level,
            title = excluded.title,
            exchange_date = excluded.exchange_date,
            meeting_place = excluded.meeting_place,
            memo = excluded.memo,
            priority = excluded.priority,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&c.id)
    .bind(&c.profile_id)
    .bind(&c.person_name)
    .bind(&c.person_name_kana)
    .bind(&c.company_name)
    .bind(&c.department)
    .bind(&c.position)
    .bind(&c.email)
    .bind(&c.phone)
    .bind(&c.mobile)
    .bind(&c.address)
    .bind(&c.website)
    .bind(&c.industry)
    .bind(&c.area)
    .bind(&c.position_level)
    .bind(&c.title)
    .bind(fmt_opt_ts(&c.exchange_date))
    .bind(&c.meeting_place)
    .bind(&c.memo)
    .bind(c.priority)
    .bind(fmt_ts(&c.created_at))
    .bind(fmt_ts(&c.updated_at))
    .execute(exec)
    .await?;
    Ok(())
}

async fn write_image<'e, E>(exec: E, i: &CardImage) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO card_images (id, card_id, mime, data, image_type, display_order, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            card_id = excluded.card_id,
            mime = excluded.mime,
            data = excluded.data,
            image_type = excluded.image_type,
            display_order = excluded.display_order,
            created_at = excluded.created_at
        "#,
    )
    .bind(&i.id)
    .bind(&i.card_id)
    .bind(&i.image_data.mime)
    .bind(&i.image_data.bytes)
    .bind(i.image_type.as_str())
    .bind(i.display_order)
    .bind(fmt_ts(&i.created_at))
    .execute(exec)
    .await?;
    Ok(())
}

async fn write_tag<'e, E>(exec: E, t: &Tag) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO tags (id, user_id, name, color, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            user_id = excluded.user_id,
            name = excluded.name,
            color = excluded.color,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&t.id)
    .bind(&t.user_id)
    .bind(&t.name)
    .bind(&t.color)
    .bind(fmt_ts(&t.created_at))
    .bind(fmt_ts(&t.updated_at))
    .execute(exec)
    .await?;
    Ok(())
}

async fn write_card_tag<'e, E>(exec: E, l: &CardTag) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO card_tags (card_id, tag_id, created_at)
        VALUES (?, ?, ?)
        ON CONFLICT(card_id, tag_id) DO UPDATE SET
            created_at = excluded.created_at
        "#,
    )
    .bind(&l.card_id)
    .bind(&l.tag_id)
    .bind(fmt_ts(&l.created_at))
    .execute(exec)
    .await?;
    Ok(())
}

async fn write_note<'e, E>(exec: E, n: &InteractionNote) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO interaction_notes (id, card_id, content, date, note_type, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            card_id = excluded.card_id,
            content = excluded.content,
            date = excluded.date,
            note_type = excluded.note_type,
            created_at = excluded.created_at,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&n.id)
    .bind(&n.card_id)
    .bind(&n.content)
    .bind(fmt_ts(&n.date))
    .bind(n.note_type.as_str())
    .bind(fmt_ts(&n.created_at))
    .bind(fmt_ts(&n.updated_at))
    .execute(exec)
    .await?;
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    async fn load_dataset(&self, owner_id: &str) -> Result<Dataset> {
        let profiles = sqlx::query(
            "SELECT * FROM profiles WHERE user_id = ? ORDER BY display_order ASC, id ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let cards = sqlx::query(
            "SELECT * FROM cards \
             WHERE profile_id IN (SELECT id FROM profiles WHERE user_id = ?) \
             ORDER BY created_at ASC, id ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let images = sqlx::query(
            "SELECT * FROM card_images \
             WHERE card_id IN (SELECT c.id FROM cards c JOIN profiles p ON c.profile_id = p.id WHERE p.user_id = ?) \
             ORDER BY card_id ASC, display_order ASC, id ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let tags = sqlx::query(
            "SELECT * FROM tags WHERE user_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let card_tags = sqlx::query(
            "SELECT * FROM card_tags \
             WHERE tag_id IN (SELECT id FROM tags WHERE user_id = ?) \
             ORDER BY card_id ASC, tag_id ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        let notes = sqlx::query(
            "SELECT * FROM interaction_notes \
             WHERE card_id IN (SELECT c.id FROM cards c JOIN profiles p ON c.profile_id = p.id WHERE p.user_id = ?) \
             ORDER BY card_id ASC, date ASC, id ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Dataset {
            owner_id: owner_id.to_string(),
            profiles: collect(&profiles, row_to_profile)?,
            cards: collect(&cards, row_to_card)?,
            images: collect(&images, row_to_image)?,
            tags: collect(&tags, row_to_tag)?,
            card_tags: collect(&card_tags, row_to_card_tag)?,
            notes: collect(&notes, row_to_note)?,
        })
    }

    async fn replace_by_id(&self, dataset: &Dataset) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for p in &dataset.profiles {
            write_profile(&mut *tx, p).await?;
        }
        for c in &dataset.cards {
            write_card(&mut *tx, c).await?;
        }
        for i in &dataset.images {
            write_image(&mut *tx, i).await?;
        }
        for t in &dataset.tags {
            write_tag(&mut *tx, t).await?;
        }
        for l in &dataset.card_tags {
            write_card_tag(&mut *tx, l).await?;
        }
        for n in &dataset.notes {
            write_note(&mut *tx, n).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn list_profiles(&self, owner_id: &str) -> Result<Vec<Profile>> {
        let rows = sqlx::query(
            "SELECT * FROM profiles WHERE user_id = ? ORDER BY display_order ASC, id ASC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        collect(&rows, row_to_profile)
    }

    async fn get_profile(&self, id: &str) -> Result<Option<Profile>> {
        let row = sqlx::query("SELECT * FROM profiles WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_profile).transpose()
    }

    async fn upsert_profile(&self, profile: &Profile) -> Result<()> {
        write_profile(&self.pool, profile).await
    }

    async fn delete_profile(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM profiles WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_cards(&self, profile_id: &str) -> Result<Vec<Card>> {
        let rows = sqlx::query(
            "SELECT * FROM cards WHERE profile_id = ? ORDER BY created_at ASC, id ASC",
        )
        .bind(profile_id)
        .fetch_all(&self.pool)
        .await?;
        collect(&rows, row_to_card)
    }

    async fn get_card(&self, id: &str) -> Result<Option<Card>> {
        let row = sqlx::query("SELECT * FROM cards WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_card).transpose()
    }

    async fn upsert_card(&self, card: &Card) -> Result<()> {
        write_card(&self.pool, card).await
    }

    async fn delete_card(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM card_images WHERE card_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM card_tags WHERE card_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM interaction_notes WHERE card_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM cards WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_images(&self, card_id: &str) -> Result<Vec<CardImage>> {
        let rows = sqlx::query(
            "SELECT * FROM card_images WHERE card_id = ? ORDER BY display_order ASC, id ASC",
        )
        .bind(card_id)
        .fetch_all(&self.pool)
        .await?;
        collect(&rows, row_to_image)
    }

    async fn upsert_image(&self, image: &CardImage) -> Result<()> {
        write_image(&self.pool, image).await
    }

    async fn delete_image(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM card_images WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_tags(&self, owner_id: &str) -> Result<Vec<Tag>> {
        let rows =
            sqlx::query("SELECT * FROM tags WHERE user_id = ? ORDER BY created_at ASC, id ASC")
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await?;
        collect(&rows, row_to_tag)
    }

    async fn get_tag(&self, id: &str) -> Result<Option<Tag>> {
        let row = sqlx::query("SELECT * FROM tags WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_tag).transpose()
    }

    async fn upsert_tag(&self, tag: &Tag) -> Result<()> {
        write_tag(&self.pool, tag).await
    }

    async fn delete_tag(&self, id: &str) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM card_tags WHERE tag_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let result = sqlx::query("DELETE FROM tags WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_card_tags(&self, card_id: &str) -> Result<Vec<CardTag>> {
        let rows = sqlx::query("SELECT * FROM card_tags WHERE card_id = ? ORDER BY tag_id ASC")
            .bind(card_id)
            .fetch_all(&self.pool)
            .await?;
        collect(&rows, row_to_card_tag)
    }

    async fn insert_card_tag(&self, link: &CardTag) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO card_tags (card_id, tag_id, created_at) VALUES (?, ?, ?) \
             ON CONFLICT(card_id, tag_id) DO NOTHING",
        )
        .bind(&link.card_id)
        .bind(&link.tag_id)
        .bind(fmt_ts(&link.created_at))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_card_tag(&self, card_id: &str, tag_id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM card_tags WHERE card_id = ? AND tag_id = ?")
            .bind(card_id)
            .bind(tag_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_notes(&self, card_id: &str) -> Result<Vec<InteractionNote>> {
        let rows = sqlx::query(
            "SELECT * FROM interaction_notes WHERE card_id = ? ORDER BY date ASC, id ASC",
        )
        .bind(card_id)
        .fetch_all(&self.pool)
        .await?;
        collect(&rows, row_to_note)
    }

    async fn get_note(&self, id: &str) -> Result<Option<InteractionNote>> {
        let row = sqlx::query("SELECT * FROM interaction_notes WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_note).transpose()
    }

    async fn upsert_note(&self, note: &InteractionNote) -> Result<()> {
        write_note(&self.pool, note).await
    }

    async fn delete_note(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM interaction_notes WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn last_synced_at(&self) -> Result<Option<DateTime<Utc>>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM sync_meta WHERE key = ?")
            .bind(LAST_SYNCED_KEY)
            .fetch_optional(&self.pool)
            .await?;
        parse_opt_ts(value)
    }

    async fn set_last_synced_at(&self, at: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            "INSERT INTO sync_meta (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(LAST_SYNCED_KEY)
        .bind(fmt_ts(&at))
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ImageType, NoteType};
    use chrono::TimeZone;

    async fn open_store() -> (tempfile::TempDir, SqliteStore) {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = crate::db::connect_path(&tmp.path().join("cards.sqlite"))
            .await
            .unwrap();
        crate::migrate::apply(&pool).await.unwrap();
        (tmp, SqliteStore::new(pool))
    }

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn profile(id: &str, owner: &str) -> Profile {
        Profile {
            id: id.into(),
            user_id: owner.into(),
            company_name: "Acme".into(),
            position: None,
            email: None,
            phone: None,
            address: None,
            card_image: Some(Attachment::new("image/png", vec![9, 8, 7])),
            start_date: None,
            end_date: None,
            is_current: Some(false),
            display_order: 1,
            created_at: ts(100),
            updated_at: ts(100),
        }
    }

    fn card(id: &str, profile_id: &str) -> Card {
        Card {
            id: id.into(),
            profile_id: profile_id.into(),
            person_name: "Taro".into(),
            person_name_kana: None,
            company_name: "Initech".into(),
            department: Some("Sales".into()),
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
            exchange_date: Some(ts(500)),
            meeting_place: None,
            memo: None,
            priority: 3,
            created_at: ts(200),
            updated_at: ts(200),
        }
    }

    #[tokio::test]
    async fn dataset_round_trips_through_sqlite() {
        let (_tmp, store) = open_store().await;
        let dataset = Dataset {
            owner_id: "u1".into(),
            profiles: vec![profile("p1", "u1")],
            cards: vec![card("c1", "p1")],
            images: vec![CardImage {
                id: "i1".into(),
                card_id: "c1".into(),
                image_data: Attachment::new("image/jpeg", vec![0, 255, 1]),
                image_type: ImageType::Back,
                display_order: 1,
                created_at: ts(300),
            }],
            tags: vec![Tag {
                id: "t1".into(),
                user_id: "u1".into(),
                name: "partner".into(),
                color: None,
                created_at: ts(50),
                updated_at: ts(50),
            }],
            card_tags: vec![CardTag {
                card_id: "c1".into(),
                tag_id: "t1".into(),
                created_at: ts(400),
            }],
            notes: vec![InteractionNote {
                id: "n1".into(),
                card_id: "c1".into(),
                content: "call back".into(),
                date: ts(600),
                note_type: NoteType::Call,
                created_at: ts(600),
                updated_at: ts(600),
            }],
        };

        store.replace_by_id(&dataset).await.unwrap();
        assert_eq!(store.load_dataset("u1").await.unwrap(), dataset);
        assert!(store.load_dataset("someone-else").await.unwrap().cards.is_empty());
    }

    #[tokio::test]
    async fn delete_card_cascades() {
        let (_tmp, store) = open_store().await;
        store.upsert_profile(&profile("p1", "u1")).await.unwrap();
        store.upsert_card(&card("c1", "p1")).await.unwrap();
        store
            .upsert_image(&CardImage {
                id: "i1".into(),
                card_id: "c1".into(),
                image_data: Attachment::new("image/png", vec![1]),
                image_type: ImageType::Front,
                display_order: 0,
                created_at: ts(1),
            })
            .await
            .unwrap();

        assert!(store.delete_card("c1").await.unwrap());
        assert!(store.list_images("c1").await.unwrap().is_empty());
        assert!(!store.delete_card("c1").await.unwrap());
    }

    #[tokio::test]
    async fn card_tag_insert_reports_duplicates() {
        let (_tmp, store) = open_store().await;
        let link = CardTag {
            card_id: "c1".into(),
            tag_id: "t1".into(),
            created_at: ts(1),
        };
        assert!(store.insert_card_tag(&link).await.unwrap());
        assert!(!store.insert_card_tag(&link).await.unwrap());
        assert!(store.delete_card_tag("c1", "t1").await.unwrap());
    }

    #[tokio::test]
    async fn last_synced_marker_persists() {
        let (_tmp, store) = open_store().await;
        assert_eq!(store.last_synced_at().await.unwrap(), None);
        let at = Utc.timestamp_opt(1_700_000_000, 250_000_000).unwrap();
        store.set_last_synced_at(at).await.unwrap();
        assert_eq!(store.last_synced_at().await.unwrap(), Some(at));
    }
}

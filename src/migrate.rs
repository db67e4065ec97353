//! Database schema migrations.
//!
//! Every statement is idempotent, so `cardsync init` may run any number
//! of times. Timestamps are stored as RFC 3339 text with millisecond
//! precision; attachments as a MIME column plus a BLOB.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create all tables and indexes on an open pool.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS profiles (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            company_name TEXT NOT NULL,
            position TEXT,
            email TEXT,
            phone TEXT,
            address TEXT,
            card_image_mime TEXT,
            card_image BLOB,
            start_date TEXT,
            end_date TEXT,
            is_current INTEGER,
            display_order INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS cards (
            id TEXT PRIMARY KEY,
            profile_id TEXT NOT NULL,
            person_name TEXT NOT NULL,
            person_name_kana TEXT,
            company_name TEXT NOT NULL,
            department TEXT,
            position TEXT,
            email TEXT,
            phone TEXT,
            mobile TEXT,
            address TEXT,
            website TEXT,
            industry TEXT,
            area TEXT,
            position_level TEXT,
            title TEXT,
            exchange_date TEXT,
            meeting_place TEXT,
            memo TEXT,
            priority INTEGER NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS card_images (
            id TEXT PRIMARY KEY,
            card_id TEXT NOT NULL,
            mime TEXT NOT NULL,
            data BLOB NOT NULL,
            image_type TEXT NOT NULL,
            display_order INTEGER NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            name TEXT NOT NULL,
            color TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS card_tags (
            card_id TEXT NOT NULL,
            tag_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (card_id, tag_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS interaction_notes (
            id TEXT PRIMARY KEY,
            card_id TEXT NOT NULL,
            content TEXT NOT NULL,
            date TEXT NOT NULL,
            note_type TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Key/value table for sync bookkeeping (last_synced_at)
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sync_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_profiles_user_id ON profiles(user_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_cards_profile_id ON cards(profile_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_card_images_card_id ON card_images(card_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tags_user_id ON tags(user_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_card_tags_tag_id ON card_tags(tag_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_interaction_notes_card_date ON interaction_notes(card_id, date)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

//! Dataset statistics and sync overview.
//!
//! Summarizes what the local database holds and where folder sync stands.
//! Used by `cardsync stats`.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::folder::FolderHandle;
use crate::store::Store;

/// Print a summary of the owner's dataset and the sync state.
pub async fn run_stats(
    config: &Config,
    store: &dyn Store,
    folder: Option<&FolderHandle>,
) -> Result<()> {
    let dataset = store.load_dataset(&config.user.id).await?;
    let counts = dataset.counts();
    let image_bytes: usize = dataset
        .images
        .iter()
        .map(|i| i.image_data.bytes.len())
        .sum();
    let last_synced = store.last_synced_at().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("Card Sync Database Stats");
    println!("========================");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!("  Owner:       {}", config.user.id);
    println!();
    println!("  Profiles:    {}", counts.profiles);
    println!("  Cards:       {}", counts.cards);
    println!(
        "  Images:      {} ({})",
        counts.images,
        format_bytes(image_bytes as u64)
    );
    println!("  Tags:        {}", counts.tags);
    println!("  Tag links:   {}", counts.card_tags);
    println!("  Notes:       {}", counts.notes);

    if !dataset.profiles.is_empty() {
        println!();
        println!("  By profile:");
        println!("  {:<36} {:>6}", "PROFILE", "CARDS");
        println!("  {}", "-".repeat(44));
        for profile in &dataset.profiles {
            let n = dataset
                .cards
                .iter()
                .filter(|c| c.profile_id == profile.id)
                .count();
            println!("  {:<36} {:>6}", profile.company_name, n);
        }
    }

    println!();
    match folder {
        Some(handle) => println!("  Sync folder: {}", handle.path.display()),
        None => println!("  Sync folder: (disabled)"),
    }
    println!(
        "  Last sync:   {}",
        match last_synced {
            Some(at) => format_ts_relative(at),
            None => "never".to_string(),
        }
    );
    println!();

    Ok(())
}

/// Byte count with a binary unit: `512 B`, `2.0 KB`, `5.0 MB`.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];
    if bytes < 1024 {
        return format!("{} B", bytes);
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    let precision = if UNITS[unit] == "GB" { 2 } else { 1 };
    format!("{:.*} {}", precision, value, UNITS[unit])
}

/// Age of `ts` in words ("3 hours ago"); older than a month, or in the
/// future, falls back to the date.
pub fn format_ts_relative(ts: DateTime<Utc>) -> String {
    let age = Utc::now() - ts;
    let (n, unit) = match age.num_seconds() {
        s if s < 0 => return ts.format("%Y-%m-%d %H:%M").to_string(),
        0..=59 => return "just now".to_string(),
        s if s < 3600 => (age.num_minutes(), "min"),
        s if s < 86_400 => (age.num_hours(), "hour"),
        s if s < 86_400 * 30 => (age.num_days(), "day"),
        _ => return ts.format("%Y-%m-%d %H:%M").to_string(),
    };
    format!("{} {}{} ago", n, unit, if n == 1 { "" } else { "s" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn bytes_scale() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.0 MB");
    }

    #[test]
    fn relative_times() {
        let now = Utc::now();
        assert_eq!(format_ts_relative(now), "just now");
        assert_eq!(format_ts_relative(now - Duration::minutes(5)), "5 mins ago");
        assert_eq!(format_ts_relative(now - Duration::hours(1)), "1 hour ago");
        let old = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 0).unwrap();
        assert_eq!(format_ts_relative(old), "2020-01-02 03:04");
    }
}
